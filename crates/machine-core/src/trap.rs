//! Address-keyed trap handlers consulted before the bus.
//!
//! A handler that returns [`TrapOutcome::Handled`] replaces the bus access
//! entirely, so the access's own side effects never happen. For addresses in
//! a slot ROM window that includes expansion-window selection. Under
//! [`TrapPolicy::Manual`] the handler calls
//! [`TrapContext::apply_slot_rom_selection`] itself; under
//! [`TrapPolicy::ReplaySelection`] the table does it after every handled
//! access.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, trace};

use crate::io_page::{IoWindow, SelectionEffect};
use crate::slots::SharedSlots;
use crate::{AccessOutcome, BusAccess, MemoryBus, SignalAggregator};

/// Who replays expansion-window selection for handled traps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TrapPolicy {
    /// Handlers replay selection themselves.
    #[default]
    Manual,
    /// The trap table replays selection after a handled access.
    ReplaySelection,
}

/// Result of running a trap handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapOutcome {
    /// The access is complete; the bus is not consulted.
    Handled {
        /// Value returned to the CPU (ignored for writes).
        value: u32,
        /// Cycles charged for the bypassed work.
        cycles: u32,
    },
    /// Continue with the normal bus access.
    PassThrough,
}

/// Machine state a trap handler may touch.
pub struct TrapContext<'a> {
    /// Memory bus, for handlers that emulate a routine's effects.
    pub bus: &'a mut MemoryBus,
    /// Control lines.
    pub signals: &'a mut SignalAggregator,
    /// Peripheral slots, when the machine has any.
    pub slots: Option<&'a SharedSlots>,
    /// Placement of the I/O page, when the machine has one.
    pub io_window: Option<&'a IoWindow>,
}

impl fmt::Debug for TrapContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrapContext")
            .field("io_window", &self.io_window)
            .finish_non_exhaustive()
    }
}

impl TrapContext<'_> {
    /// Applies the expansion-window selection a real access to `address`
    /// would have caused.
    pub fn apply_slot_rom_selection(&mut self, address: u32) -> SelectionEffect {
        let (Some(window), Some(slots)) = (self.io_window, self.slots) else {
            return SelectionEffect::None;
        };
        let Ok(mut slots) = slots.try_borrow_mut() else {
            return SelectionEffect::None;
        };
        window.apply_selection(address, &mut slots)
    }
}

/// Intercepts accesses to one address.
pub trait TrapHandler {
    /// Runs for every non-debug access to the trapped address.
    fn on_access(&mut self, access: &BusAccess, context: &mut TrapContext<'_>) -> TrapOutcome;
}

impl<F> TrapHandler for F
where
    F: FnMut(&BusAccess, &mut TrapContext<'_>) -> TrapOutcome,
{
    fn on_access(&mut self, access: &BusAccess, context: &mut TrapContext<'_>) -> TrapOutcome {
        self(access, context)
    }
}

/// Trap handlers keyed by exact bus address.
#[derive(Default)]
pub struct TrapTable {
    policy: TrapPolicy,
    handlers: BTreeMap<u32, Box<dyn TrapHandler>>,
}

impl fmt::Debug for TrapTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrapTable")
            .field("policy", &self.policy)
            .field("addresses", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TrapTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(policy: TrapPolicy) -> Self {
        Self {
            policy,
            handlers: BTreeMap::new(),
        }
    }

    /// Selection replay policy.
    #[must_use]
    pub const fn policy(&self) -> TrapPolicy {
        self.policy
    }

    /// Installs `handler` at `address`, returning the handler it replaced.
    pub fn install(
        &mut self,
        address: u32,
        handler: Box<dyn TrapHandler>,
    ) -> Option<Box<dyn TrapHandler>> {
        debug!(address, "trap installed");
        self.handlers.insert(address, handler)
    }

    /// Removes the handler at `address`.
    pub fn remove(&mut self, address: u32) -> Option<Box<dyn TrapHandler>> {
        debug!(address, "trap removed");
        self.handlers.remove(&address)
    }

    /// Returns `true` when `address` is trapped.
    #[must_use]
    pub fn contains(&self, address: u32) -> bool {
        self.handlers.contains_key(&address)
    }

    /// Number of trapped addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when no address is trapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler for `access`, if any.
    ///
    /// A wide access matches the lowest trapped address among the bytes it
    /// covers, up to the end of the address space; lanes the bus would wrap
    /// to address zero are not matched. `access.address` must already be
    /// masked to the bus width. Debug and side-effect-free accesses are never
    /// trapped. Returns `None` when the access must continue to the bus.
    pub fn dispatch(
        &mut self,
        access: &BusAccess,
        context: &mut TrapContext<'_>,
    ) -> Option<AccessOutcome<u32>> {
        if !access.side_effects_allowed() {
            return None;
        }
        let last = access
            .address
            .saturating_add(access.width.bytes().saturating_sub(1));
        let (_, handler) = self.handlers.range_mut(access.address..=last).next()?;
        match handler.on_access(access, context) {
            TrapOutcome::PassThrough => None,
            TrapOutcome::Handled { value, cycles } => {
                if self.policy == TrapPolicy::ReplaySelection {
                    context.apply_slot_rom_selection(access.address);
                }
                trace!(address = access.address, value, cycles, "trap handled");
                Some(AccessOutcome::new(value & access.width.value_mask(), cycles))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{TrapContext, TrapOutcome, TrapPolicy, TrapTable};
    use crate::io_page::{IoPageLayout, IoWindow, RomOverrideSwitch, SelectionEffect};
    use crate::slots::{Peripheral, SharedSlots, SlotManager};
    use crate::{
        AccessFlags, AccessIntent, AccessWidth, BusAccess, BusConfig, MemoryBus,
        SignalAggregator,
    };

    struct Blank;

    impl Peripheral for Blank {
        fn name(&self) -> &str {
            "blank"
        }
    }

    struct Fixture {
        bus: MemoryBus,
        signals: SignalAggregator,
        slots: SharedSlots,
        window: IoWindow,
    }

    impl Fixture {
        fn new() -> Self {
            let slots = SlotManager::new(7).shared();
            slots
                .borrow_mut()
                .install(6, Box::new(Blank))
                .expect("empty slot");
            Self {
                bus: MemoryBus::new(BusConfig::default()).expect("valid geometry"),
                signals: SignalAggregator::new(),
                slots,
                window: IoWindow {
                    base: 0xC000,
                    layout: IoPageLayout::CLASSIC,
                    overrides: RomOverrideSwitch::default(),
                },
            }
        }

        fn context(&mut self) -> TrapContext<'_> {
            TrapContext {
                bus: &mut self.bus,
                signals: &mut self.signals,
                slots: Some(&self.slots),
                io_window: Some(&self.window),
            }
        }
    }

    fn fetch(address: u32) -> BusAccess {
        BusAccess::read(address, AccessWidth::Byte, AccessIntent::InstructionFetch)
    }

    fn handled(_access: &BusAccess, _context: &mut TrapContext<'_>) -> TrapOutcome {
        TrapOutcome::Handled {
            value: 0x1EA,
            cycles: 40,
        }
    }

    #[test]
    fn manual_policy_leaves_selection_to_the_handler() {
        let mut fixture = Fixture::new();
        let mut table = TrapTable::new(TrapPolicy::Manual);
        table.install(0xC600, Box::new(handled));

        let outcome = table.dispatch(&fetch(0xC600), &mut fixture.context());
        let outcome = outcome.expect("trapped");
        assert_eq!((outcome.value, outcome.cycles), (0xEA, 40));
        assert_eq!(fixture.slots.borrow().active_expansion_slot(), None);

        table.install(
            0xC600,
            Box::new(|access: &BusAccess, context: &mut TrapContext<'_>| {
                assert_eq!(
                    context.apply_slot_rom_selection(access.address),
                    SelectionEffect::Selected(6)
                );
                TrapOutcome::Handled { value: 0, cycles: 1 }
            }),
        );
        table.dispatch(&fetch(0xC600), &mut fixture.context());
        assert_eq!(fixture.slots.borrow().active_expansion_slot(), Some(6));
    }

    #[test]
    fn replay_policy_selects_for_handled_accesses() {
        let mut fixture = Fixture::new();
        let mut table = TrapTable::new(TrapPolicy::ReplaySelection);
        table.install(0xC65C, Box::new(handled));
        table.dispatch(&fetch(0xC65C), &mut fixture.context());
        assert_eq!(fixture.slots.borrow().active_expansion_slot(), Some(6));
    }

    #[test]
    fn pass_through_and_debug_accesses_reach_the_bus() {
        let mut fixture = Fixture::new();
        let mut table = TrapTable::new(TrapPolicy::ReplaySelection);
        table.install(
            0xC600,
            Box::new(|_: &BusAccess, _: &mut TrapContext<'_>| TrapOutcome::PassThrough),
        );
        assert!(table.dispatch(&fetch(0xC600), &mut fixture.context()).is_none());
        assert_eq!(fixture.slots.borrow().active_expansion_slot(), None);

        table.install(0xC600, Box::new(handled));
        let peek = BusAccess::read(0xC600, AccessWidth::Byte, AccessIntent::DebugRead);
        assert!(table.dispatch(&peek, &mut fixture.context()).is_none());
        let quiet = fetch(0xC600).with_flags(AccessFlags::NO_SIDE_EFFECTS);
        assert!(table.dispatch(&quiet, &mut fixture.context()).is_none());
        assert!(table.dispatch(&fetch(0xC601), &mut fixture.context()).is_none());
        assert_eq!(table.len(), 1);
        assert!(table.remove(0xC600).is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn wide_accesses_match_any_covered_byte() {
        let mut fixture = Fixture::new();
        let mut table = TrapTable::new(TrapPolicy::Manual);
        table.install(0xC65C, Box::new(handled));

        let word = BusAccess::read(0xC65B, AccessWidth::Word, AccessIntent::InstructionFetch);
        let outcome = table.dispatch(&word, &mut fixture.context()).expect("covers 0xC65C");
        assert_eq!((outcome.value, outcome.cycles), (0x1EA, 40));
        let dword = BusAccess::read(0xC659, AccessWidth::Dword, AccessIntent::DataRead);
        assert!(table.dispatch(&dword, &mut fixture.context()).is_some());

        let below = BusAccess::read(0xC65A, AccessWidth::Word, AccessIntent::InstructionFetch);
        assert!(table.dispatch(&below, &mut fixture.context()).is_none());
        let above = BusAccess::read(0xC65D, AccessWidth::Dword, AccessIntent::DataRead);
        assert!(table.dispatch(&above, &mut fixture.context()).is_none());
    }

    #[test]
    fn selection_outside_the_window_is_a_no_op() {
        let mut fixture = Fixture::new();
        let mut context = fixture.context();
        assert_eq!(context.apply_slot_rom_selection(0x0600), SelectionEffect::None);
        assert_eq!(context.apply_slot_rom_selection(0xD600), SelectionEffect::None);
    }
}
