//! Page-table-routed memory bus.
//!
//! Every fault-returning access runs the same policy, in order:
//!
//! 1. unmapped page: [`FaultKind::Unmapped`];
//! 2. missing read or write permission: [`FaultKind::Permission`];
//! 3. fetch from a non-executable page while native mode enforces it:
//!    [`FaultKind::Nx`];
//! 4. a wide access straddling a page boundary is decomposed into byte cycles;
//! 5. [`AccessFlags::DECOMPOSE`] forces byte cycles;
//! 6. [`AccessFlags::ATOMIC`] uses the wide accessor when the target has one;
//! 7. otherwise legacy mode decomposes and native mode goes wide when it can.
//!
//! Debug intents bypass steps 2 to 7: they peek and poke byte by byte, cost
//! nothing, and read the floating bus where a target cannot answer without
//! side effects. Other intents flagged [`AccessFlags::NO_SIDE_EFFECTS`] take
//! the same peek and poke path, but only after steps 1 to 3 pass for every
//! byte they cover.

use std::fmt;

use tracing::{debug, trace};

use crate::memory::page::{MapError, PageEntry, PageTable, Permissions, RegionTag, TargetId};
use crate::timing::{access_cycles, AccessCostKind};
use crate::trace::{emit, SharedTraceSink, TraceEvent};
use crate::{
    AccessFlags, AccessIntent, AccessWidth, BusAccess, BusConfig, BusDiagnostics, BusFault,
    CpuMode, DeviceId, DeviceTarget, FaultKind, FloatingBusLatch, SharedFloatingBus,
};

/// Completed access: the value read (or written) and the cycles it consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessOutcome<T> {
    /// Value read, or the value written for write intents.
    pub value: T,
    /// Bus cycles consumed.
    pub cycles: u32,
}

impl<T> AccessOutcome<T> {
    /// Creates an outcome.
    #[must_use]
    pub const fn new(value: T, cycles: u32) -> Self {
        Self { value, cycles }
    }

    /// Maps the carried value, keeping the cycle count.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AccessOutcome<U> {
        AccessOutcome {
            value: f(self.value),
            cycles: self.cycles,
        }
    }
}

/// Result of a fault-returning bus access.
pub type BusResult<T> = Result<AccessOutcome<T>, BusFault>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    Checked,
    Trusted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Wide,
    Decomposed,
}

#[derive(Debug, Clone, Copy)]
struct Completed {
    value: u32,
    cycles: u32,
    decomposed: bool,
}

impl Completed {
    const fn outcome(self) -> AccessOutcome<u32> {
        AccessOutcome::new(self.value, self.cycles)
    }
}

/// Memory bus owning the page table and every mapped target.
///
/// The table is only mutated through `&mut self` map calls, and dispatch
/// borrows the bus mutably for its whole duration, so a target can never
/// remap pages from inside its own accessor.
pub struct MemoryBus {
    table: PageTable,
    targets: Vec<Box<dyn DeviceTarget>>,
    config: BusConfig,
    floating: SharedFloatingBus,
    floating_latch: Option<FloatingBusLatch>,
    diagnostics: BusDiagnostics,
    trace: Option<SharedTraceSink>,
}

impl fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBus")
            .field("config", &self.config)
            .field("mapped_pages", &self.table.mapped().count())
            .field("targets", &self.targets.len())
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl MemoryBus {
    /// Creates an empty bus.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::InvalidGeometry`] for unsupported geometry.
    pub fn new(config: BusConfig) -> Result<Self, MapError> {
        let table = PageTable::new(config.address_bits, config.page_shift)?;
        let (floating, floating_latch) = config.floating_bus.instantiate();
        debug!(
            address_bits = config.address_bits,
            page_shift = config.page_shift,
            pages = table.page_count(),
            "memory bus created"
        );
        Ok(Self {
            table,
            targets: Vec::new(),
            config,
            floating,
            floating_latch,
            diagnostics: BusDiagnostics::default(),
            trace: None,
        })
    }

    /// Bus policy.
    #[must_use]
    pub const fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Switches the CPU mode consulted by the wide-access and NX policies.
    pub fn set_cpu_mode(&mut self, mode: CpuMode) {
        debug!(?mode, "bus cpu mode changed");
        self.config.cpu_mode = mode;
    }

    /// Page table, read-only.
    #[must_use]
    pub const fn page_table(&self) -> &PageTable {
        &self.table
    }

    /// Shared floating-bus source, for composite targets that need it.
    #[must_use]
    pub fn floating_bus(&self) -> SharedFloatingBus {
        self.floating.clone()
    }

    /// Latch handle when the floating bus follows another subsystem.
    #[must_use]
    pub const fn floating_latch(&self) -> Option<&FloatingBusLatch> {
        self.floating_latch.as_ref()
    }

    /// Current floating-bus value for `address`.
    #[must_use]
    pub fn floating_value(&self, address: u32) -> u8 {
        self.floating.value(address)
    }

    /// Diagnostic counters.
    #[must_use]
    pub const fn diagnostics(&self) -> &BusDiagnostics {
        &self.diagnostics
    }

    /// Clears diagnostic counters.
    pub fn reset_diagnostics(&mut self) {
        self.diagnostics.reset();
    }

    /// Attaches or detaches the trace sink.
    pub fn set_trace_sink(&mut self, sink: Option<SharedTraceSink>) {
        self.trace = sink;
    }

    /// Registers a target and returns its id.
    pub fn add_target(&mut self, target: Box<dyn DeviceTarget>) -> TargetId {
        let id = TargetId(self.targets.len());
        debug!(target = id.index(), capabilities = ?target.capabilities(), "target registered");
        self.targets.push(target);
        id
    }

    /// Number of registered targets.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Registered target.
    #[must_use]
    pub fn target(&self, id: TargetId) -> Option<&dyn DeviceTarget> {
        self.targets.get(id.0).map(AsRef::as_ref)
    }

    /// Registered target, mutably.
    pub fn target_mut(&mut self, id: TargetId) -> Option<&mut (dyn DeviceTarget + 'static)> {
        self.targets.get_mut(id.0).map(AsMut::as_mut)
    }

    /// Builds an entry for `target` with the target's current capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::UnknownTarget`] when `target` was not registered here.
    pub fn page_entry(
        &self,
        target: TargetId,
        device: DeviceId,
        region: RegionTag,
        permissions: Permissions,
    ) -> Result<PageEntry, MapError> {
        let capabilities = self
            .target(target)
            .ok_or(MapError::UnknownTarget(target))?
            .capabilities();
        Ok(PageEntry {
            device,
            region,
            permissions,
            capabilities,
            target,
            physical_base: 0,
        })
    }

    /// Installs `entry` at page `index`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::UnknownTarget`] or [`MapError::IndexOutOfRange`].
    pub fn map_page(&mut self, index: usize, entry: PageEntry) -> Result<(), MapError> {
        self.check_target(entry.target)?;
        self.table.set(index, Some(entry))?;
        debug!(index, device = entry.device.0, region = ?entry.region, "page mapped");
        Ok(())
    }

    /// Maps `count` consecutive pages to one target with consecutive
    /// physical bases starting at `entry.physical_base`.
    ///
    /// The whole range is validated before any page changes.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::UnknownTarget`], [`MapError::EmptyRange`] or
    /// [`MapError::IndexOutOfRange`].
    pub fn map_page_range(
        &mut self,
        first: usize,
        count: usize,
        entry: PageEntry,
    ) -> Result<(), MapError> {
        self.check_target(entry.target)?;
        self.table.check_range(first, count)?;
        let page_size = self.table.page_size();
        let mut physical_base = entry.physical_base;
        for index in first..first + count {
            self.table
                .set(index, Some(entry.with_physical_base(physical_base)))?;
            physical_base = physical_base.wrapping_add(page_size);
        }
        debug!(first, count, device = entry.device.0, "page range mapped");
        Ok(())
    }

    /// Points an existing page at a different target and physical base.
    ///
    /// The replacement entry is built first and stored in one assignment, so
    /// no access ever sees a half-updated entry.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::UnknownTarget`], [`MapError::IndexOutOfRange`] or
    /// [`MapError::NotMapped`].
    pub fn remap_page(
        &mut self,
        index: usize,
        target: TargetId,
        physical_base: u32,
    ) -> Result<(), MapError> {
        let capabilities = self
            .target(target)
            .ok_or(MapError::UnknownTarget(target))?
            .capabilities();
        let page_count = self.table.page_count();
        if index >= page_count {
            return Err(MapError::IndexOutOfRange { index, page_count });
        }
        let previous = *self.table.get(index).ok_or(MapError::NotMapped(index))?;
        let entry = PageEntry {
            target,
            physical_base,
            capabilities,
            ..previous
        };
        self.table.set(index, Some(entry))?;
        debug!(index, target = target.index(), physical_base, "page remapped");
        Ok(())
    }

    /// Removes the entry at `index`, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::IndexOutOfRange`].
    pub fn unmap_page(&mut self, index: usize) -> Result<Option<PageEntry>, MapError> {
        let previous = self.table.get(index).copied();
        self.table.set(index, None)?;
        debug!(index, "page unmapped");
        Ok(previous)
    }

    /// Entry covering `address`.
    #[must_use]
    pub fn page_entry_for(&self, address: u32) -> Option<&PageEntry> {
        self.table.entry_for(address)
    }

    /// Entry at page `index`.
    #[must_use]
    pub fn page_entry_at(&self, index: usize) -> Option<&PageEntry> {
        self.table.get(index)
    }

    /// Page index of `address`.
    #[must_use]
    pub const fn page_index(&self, address: u32) -> usize {
        self.table.index_of(address)
    }

    /// Resets every registered target.
    pub fn reset(&mut self) {
        for target in &mut self.targets {
            target.reset();
        }
        debug!(targets = self.targets.len(), "bus targets reset");
    }

    /// Runs a fully described access through the fault-returning path.
    ///
    /// The bus applies its configured endianness on top of `access.flags`.
    /// For write intents the outcome carries the value written.
    ///
    /// # Errors
    ///
    /// Returns the first [`BusFault`] raised; `cycles` on the fault counts the
    /// byte cycles completed before it.
    pub fn access(&mut self, access: &BusAccess) -> BusResult<u32> {
        let access = self.normalize(*access);
        let result = self.execute(&access, Policy::Checked);
        self.observe(&access, result);
        result.map(Completed::outcome)
    }

    /// Records an access that a trap handler completed instead of the bus.
    ///
    /// It is counted and traced like any completed access; no target runs.
    pub fn record_trapped(&mut self, access: &BusAccess, outcome: AccessOutcome<u32>) {
        let access = self.normalize(*access);
        self.diagnostics.record_trapped();
        let completed = Completed {
            value: outcome.value,
            cycles: outcome.cycles,
            decomposed: false,
        };
        self.observe(&access, Ok(completed));
    }

    /// Reads a byte.
    ///
    /// # Errors
    ///
    /// See [`MemoryBus::access`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn try_read8(&mut self, address: u32, intent: AccessIntent) -> BusResult<u8> {
        self.access(&BusAccess::read(address, AccessWidth::Byte, intent))
            .map(|outcome| outcome.map(|value| value as u8))
    }

    /// Reads a 16-bit value.
    ///
    /// # Errors
    ///
    /// See [`MemoryBus::access`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn try_read16(&mut self, address: u32, intent: AccessIntent) -> BusResult<u16> {
        self.access(&BusAccess::read(address, AccessWidth::Word, intent))
            .map(|outcome| outcome.map(|value| value as u16))
    }

    /// Reads a 32-bit value.
    ///
    /// # Errors
    ///
    /// See [`MemoryBus::access`].
    pub fn try_read32(&mut self, address: u32, intent: AccessIntent) -> BusResult<u32> {
        self.access(&BusAccess::read(address, AccessWidth::Dword, intent))
    }

    /// Writes a byte as a CPU data store.
    ///
    /// # Errors
    ///
    /// See [`MemoryBus::access`].
    pub fn try_write8(&mut self, address: u32, value: u8) -> BusResult<()> {
        self.try_write(address, AccessWidth::Byte, u32::from(value))
    }

    /// Writes a 16-bit value as a CPU data store.
    ///
    /// # Errors
    ///
    /// See [`MemoryBus::access`].
    pub fn try_write16(&mut self, address: u32, value: u16) -> BusResult<()> {
        self.try_write(address, AccessWidth::Word, u32::from(value))
    }

    /// Writes a 32-bit value as a CPU data store.
    ///
    /// # Errors
    ///
    /// See [`MemoryBus::access`].
    pub fn try_write32(&mut self, address: u32, value: u32) -> BusResult<()> {
        self.try_write(address, AccessWidth::Dword, value)
    }

    /// Debugger read of one byte; never triggers device side effects.
    ///
    /// # Errors
    ///
    /// Returns [`FaultKind::Unmapped`] for unmapped addresses.
    pub fn peek8(&mut self, address: u32) -> Result<u8, BusFault> {
        self.try_read8(address, AccessIntent::DebugRead)
            .map(|outcome| outcome.value)
    }

    /// Debugger write of one byte; dropped by targets that cannot poke.
    ///
    /// # Errors
    ///
    /// Returns [`FaultKind::Unmapped`] for unmapped addresses.
    pub fn poke8(&mut self, address: u32, value: u8) -> Result<(), BusFault> {
        let access = BusAccess::write(
            address,
            AccessWidth::Byte,
            u32::from(value),
            AccessIntent::DebugWrite,
        );
        self.access(&access).map(|_| ())
    }

    /// Reads a byte on the trusted fast path.
    ///
    /// Permission and execute checks are skipped; the caller has already
    /// proven the address is mapped and readable.
    ///
    /// # Panics
    ///
    /// Panics when the address is unmapped or the device rejects the read.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read8(&mut self, address: u32) -> u8 {
        self.direct(BusAccess::read(address, AccessWidth::Byte, AccessIntent::DataRead)) as u8
    }

    /// Writes a byte on the trusted fast path.
    ///
    /// # Panics
    ///
    /// Panics when the address is unmapped or the device rejects the write.
    pub fn write8(&mut self, address: u32, value: u8) {
        self.direct(BusAccess::write(
            address,
            AccessWidth::Byte,
            u32::from(value),
            AccessIntent::DataWrite,
        ));
    }

    /// Reads a 16-bit value on the trusted fast path.
    ///
    /// # Panics
    ///
    /// Panics when any touched byte is unmapped or the device rejects the read.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read16(&mut self, address: u32) -> u16 {
        self.direct(BusAccess::read(address, AccessWidth::Word, AccessIntent::DataRead)) as u16
    }

    /// Writes a 16-bit value on the trusted fast path.
    ///
    /// # Panics
    ///
    /// Panics when any touched byte is unmapped or the device rejects the write.
    pub fn write16(&mut self, address: u32, value: u16) {
        self.direct(BusAccess::write(
            address,
            AccessWidth::Word,
            u32::from(value),
            AccessIntent::DataWrite,
        ));
    }

    /// Reads a 32-bit value on the trusted fast path.
    ///
    /// # Panics
    ///
    /// Panics when any touched byte is unmapped or the device rejects the read.
    pub fn read32(&mut self, address: u32) -> u32 {
        self.direct(BusAccess::read(address, AccessWidth::Dword, AccessIntent::DataRead))
    }

    /// Writes a 32-bit value on the trusted fast path.
    ///
    /// # Panics
    ///
    /// Panics when any touched byte is unmapped or the device rejects the write.
    pub fn write32(&mut self, address: u32, value: u32) {
        self.direct(BusAccess::write(
            address,
            AccessWidth::Dword,
            value,
            AccessIntent::DataWrite,
        ));
    }

    fn try_write(&mut self, address: u32, width: AccessWidth, value: u32) -> BusResult<()> {
        self.access(&BusAccess::write(
            address,
            width,
            value,
            AccessIntent::DataWrite,
        ))
        .map(|outcome| outcome.map(|_| ()))
    }

    fn direct(&mut self, access: BusAccess) -> u32 {
        let access = self.normalize(access);
        match self.execute(&access, Policy::Trusted) {
            Ok(completed) => completed.value,
            Err(fault) => panic!("direct bus access faulted: {fault}"),
        }
    }

    fn check_target(&self, target: TargetId) -> Result<(), MapError> {
        if target.0 < self.targets.len() {
            Ok(())
        } else {
            Err(MapError::UnknownTarget(target))
        }
    }

    fn normalize(&self, mut access: BusAccess) -> BusAccess {
        access.address &= self.table.address_mask();
        if self.config.little_endian {
            access.flags = access.flags.union(AccessFlags::LITTLE_ENDIAN);
        }
        access
    }

    fn observe(&mut self, access: &BusAccess, result: Result<Completed, BusFault>) {
        match result {
            Ok(completed) => {
                self.diagnostics.record_access(completed.decomposed);
                emit(
                    self.trace.as_ref(),
                    TraceEvent::BusAccess {
                        address: access.address,
                        width_bits: access.width.bits(),
                        intent: access.intent,
                        value: completed.value,
                        cycles: completed.cycles,
                        decomposed: completed.decomposed,
                    },
                );
            }
            Err(fault) => {
                trace!(
                    kind = %fault.kind,
                    address = fault.address,
                    width_bits = fault.width_bits,
                    intent = ?fault.intent,
                    cycles = fault.cycles,
                    "bus fault"
                );
                self.diagnostics.record_fault(fault);
                emit(self.trace.as_ref(), TraceEvent::BusFault(fault));
            }
        }
    }

    fn execute(&mut self, access: &BusAccess, policy: Policy) -> Result<Completed, BusFault> {
        if !access.side_effects_allowed() {
            if policy == Policy::Checked && !access.intent.is_debug() {
                self.check_lanes(access)?;
            }
            return self.side_effect_free(access);
        }
        let entry = self.resolve(access, policy)?;
        if access.width == AccessWidth::Byte {
            return self.dispatch(&entry, access).map(|(value, cycles)| Completed {
                value,
                cycles,
                decomposed: false,
            });
        }
        if policy == Policy::Checked
            && self.config.strict_alignment
            && access.address % access.width.bytes() != 0
        {
            return Err(BusFault::mapped(
                FaultKind::Misaligned,
                access,
                entry.device,
                entry.region,
            ));
        }
        match self.route(access, &entry) {
            Route::Wide => self.dispatch(&entry, access).map(|(value, cycles)| Completed {
                value,
                cycles,
                decomposed: false,
            }),
            Route::Decomposed => self.decompose(access, policy),
        }
    }

    fn resolve(&self, access: &BusAccess, policy: Policy) -> Result<PageEntry, BusFault> {
        let entry = *self
            .table
            .entry_for(access.address)
            .ok_or_else(|| BusFault::unmapped(access))?;
        if policy == Policy::Trusted {
            return Ok(entry);
        }
        if !entry.permissions.allows(access.intent) {
            return Err(BusFault::mapped(
                FaultKind::Permission,
                access,
                entry.device,
                entry.region,
            ));
        }
        if access.intent.is_fetch() && self.config.nx_active() && !entry.permissions.executable()
        {
            return Err(BusFault::mapped(
                FaultKind::Nx,
                access,
                entry.device,
                entry.region,
            ));
        }
        Ok(entry)
    }

    /// Permission and NX checks for every byte a quiet access covers.
    fn check_lanes(&self, access: &BusAccess) -> Result<(), BusFault> {
        let mask = self.table.address_mask();
        for index in 0..access.width.bytes() {
            let mut lane = access.byte_lane(index);
            lane.address &= mask;
            self.resolve(&lane, Policy::Checked)
                .map_err(|fault| fault.within(access, 0))?;
        }
        Ok(())
    }

    fn route(&self, access: &BusAccess, entry: &PageEntry) -> Route {
        let end = self.table.offset_in_page(access.address) + access.width.bytes();
        if end > self.table.page_size() || access.flags.contains(AccessFlags::DECOMPOSE) {
            return Route::Decomposed;
        }
        let wide = if entry.capabilities.wide {
            Route::Wide
        } else {
            Route::Decomposed
        };
        if access.flags.contains(AccessFlags::ATOMIC) {
            return wide;
        }
        match self.config.cpu_mode {
            CpuMode::Legacy => Route::Decomposed,
            CpuMode::Native => wide,
        }
    }

    fn device_offset(&self, entry: &PageEntry, address: u32) -> u32 {
        entry
            .physical_base
            .wrapping_add(self.table.offset_in_page(address))
    }

    fn target_fault(entry: &PageEntry, access: &BusAccess) -> BusFault {
        BusFault::mapped(FaultKind::DeviceFault, access, entry.device, entry.region)
    }

    /// One device cycle covering the full width of `access`.
    #[allow(clippy::cast_possible_truncation)]
    fn dispatch(&mut self, entry: &PageEntry, access: &BusAccess) -> Result<(u32, u32), BusFault> {
        let offset = self.device_offset(entry, access.address);
        let target = self
            .targets
            .get_mut(entry.target.0)
            .ok_or_else(|| Self::target_fault(entry, access))?;
        let value = access.value;
        let result = match (access.width, access.intent.is_write()) {
            (AccessWidth::Byte, true) => {
                target.write8(offset, value as u8, access).map(|()| value)
            }
            (AccessWidth::Byte, false) => target.read8(offset, access).map(u32::from),
            (AccessWidth::Word, true) => {
                target.write16(offset, value as u16, access).map(|()| value)
            }
            (AccessWidth::Word, false) => target.read16(offset, access).map(u32::from),
            (AccessWidth::Dword, true) => target.write32(offset, value, access).map(|()| value),
            (AccessWidth::Dword, false) => target.read32(offset, access),
        };
        result
            .map(|value| (value, access_cycles(AccessCostKind::atomic(access.width))))
            .map_err(|error| {
                BusFault::mapped(error.fault_kind(), access, entry.device, entry.region)
            })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn decompose(&mut self, access: &BusAccess, policy: Policy) -> Result<Completed, BusFault> {
        let mask = self.table.address_mask();
        let mut value = 0;
        let mut cycles = 0;
        for index in 0..access.width.bytes() {
            let mut lane = access.byte_lane(index);
            lane.address &= mask;
            let (byte, lane_cycles) = self
                .resolve(&lane, policy)
                .and_then(|entry| self.dispatch(&entry, &lane))
                .map_err(|fault| fault.within(access, cycles))?;
            cycles += lane_cycles;
            if !access.intent.is_write() {
                value = access.merge_lane(value, index, byte as u8);
            }
        }
        Ok(Completed {
            value: if access.intent.is_write() {
                access.value
            } else {
                value
            },
            cycles,
            decomposed: true,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn side_effect_free(&mut self, access: &BusAccess) -> Result<Completed, BusFault> {
        let mask = self.table.address_mask();
        let write = access.intent.is_write();
        let mut value = 0;
        for index in 0..access.width.bytes() {
            let mut lane = access.byte_lane(index);
            lane.address &= mask;
            let entry = *self
                .table
                .entry_for(lane.address)
                .ok_or_else(|| BusFault::unmapped(&lane).within(access, 0))?;
            let offset = self.device_offset(&entry, lane.address);
            let target = self
                .targets
                .get_mut(entry.target.0)
                .ok_or_else(|| Self::target_fault(&entry, access))?;
            if write {
                if entry.capabilities.peek {
                    target.poke8(offset, lane.value as u8);
                }
                continue;
            }
            let peeked = if entry.capabilities.peek {
                target.peek8(offset)
            } else {
                None
            };
            let byte = if let Some(byte) = peeked {
                byte
            } else {
                self.diagnostics.record_floating_read();
                self.floating.value(lane.address)
            };
            value = access.merge_lane(value, index, byte);
        }
        Ok(Completed {
            value: if write { access.value } else { value },
            cycles: access_cycles(AccessCostKind::Debug),
            decomposed: access.width != AccessWidth::Byte,
        })
    }
}
