//! Machine aggregate: one bus, one scheduler, one set of control lines and
//! one slot manager sharing a single timeline.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::io_page::{IoPage, IoWindow};
use crate::scheduler::{EventDispatcher, HandlerId, ScheduledEvent};
use crate::slots::{Peripheral, SharedSlots, SlotError, SlotManager};
use crate::trace::SharedTraceSink;
use crate::trap::{TrapContext, TrapTable};
use crate::{
    BusAccess, BusResult, ConfigError, DeviceId, EventScheduler, MachineConfig, MapError,
    MemoryBus, Permissions, RegionTag, SignalAggregator, TargetId,
};

/// Device id the I/O page reports in faults.
pub const IO_PAGE_DEVICE: DeviceId = DeviceId(0xC0);

/// Errors from wiring a machine after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum MachineError {
    /// Page mapping failed.
    #[error(transparent)]
    Map(#[from] MapError),
    /// Card installation failed.
    #[error(transparent)]
    Slot(#[from] SlotError),
    /// The configuration has no I/O page.
    #[error("machine has no I/O page configured")]
    NoIoPage,
    /// The slot manager is borrowed elsewhere.
    #[error("slot manager is busy")]
    SlotsBusy,
    /// Every handler id is taken.
    #[error("event handler table is full")]
    HandlerTableFull,
}

/// Machine state an event handler may touch.
pub struct EventContext<'a> {
    /// Scheduler; `now()` is the event's due cycle.
    pub scheduler: &'a mut EventScheduler,
    /// Control lines.
    pub signals: &'a mut SignalAggregator,
    /// Memory bus, for DMA-style handlers.
    pub bus: &'a mut MemoryBus,
    /// Peripheral slots.
    pub slots: &'a SharedSlots,
}

impl fmt::Debug for EventContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("now", &self.scheduler.now())
            .finish_non_exhaustive()
    }
}

/// Receiver for scheduled events addressed to one [`HandlerId`].
pub trait EventHandler {
    /// Handles one due event.
    fn on_event(&mut self, event: &ScheduledEvent, context: &mut EventContext<'_>);
}

impl<F> EventHandler for F
where
    F: FnMut(&ScheduledEvent, &mut EventContext<'_>),
{
    fn on_event(&mut self, event: &ScheduledEvent, context: &mut EventContext<'_>) {
        self(event, context);
    }
}

/// Event handlers indexed by [`HandlerId`].
#[derive(Default)]
pub struct HandlerTable {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("len", &self.handlers.len())
            .finish()
    }
}

impl HandlerTable {
    /// Adds `handler`, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::HandlerTableFull`] once every id is taken.
    pub fn register(&mut self, handler: Box<dyn EventHandler>) -> Result<HandlerId, MachineError> {
        let id = u16::try_from(self.handlers.len()).map_err(|_| MachineError::HandlerTableFull)?;
        self.handlers.push(handler);
        Ok(HandlerId(id))
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn get_mut(&mut self, id: HandlerId) -> Option<&mut (dyn EventHandler + 'static)> {
        self.handlers.get_mut(usize::from(id.0)).map(AsMut::as_mut)
    }
}

struct Dispatch<'a> {
    handlers: &'a mut HandlerTable,
    signals: &'a mut SignalAggregator,
    bus: &'a mut MemoryBus,
    slots: &'a SharedSlots,
}

impl EventDispatcher for Dispatch<'_> {
    fn dispatch(&mut self, event: ScheduledEvent, scheduler: &mut EventScheduler) {
        let Some(handler) = self.handlers.get_mut(event.handler) else {
            warn!(handler = event.handler.0, tag = event.tag, "event for unknown handler dropped");
            return;
        };
        let mut context = EventContext {
            scheduler,
            signals: &mut *self.signals,
            bus: &mut *self.bus,
            slots: self.slots,
        };
        handler.on_event(&event, &mut context);
    }
}

/// One emulated machine.
pub struct Machine {
    config: MachineConfig,
    bus: MemoryBus,
    scheduler: EventScheduler,
    signals: SignalAggregator,
    slots: SharedSlots,
    traps: TrapTable,
    handlers: HandlerTable,
    io_window: Option<IoWindow>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .field("scheduler", &self.scheduler)
            .field("signals", &self.signals)
            .field("traps", &self.traps)
            .finish_non_exhaustive()
    }
}

impl Machine {
    /// Builds an empty machine: no pages mapped, no cards installed.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] reported by [`MachineConfig::validate`].
    pub fn new(config: MachineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let bus = MemoryBus::new(config.bus)?;
        debug!(slots = config.slot_count, policy = ?config.trap_policy, "machine created");
        Ok(Self {
            config,
            bus,
            scheduler: EventScheduler::new(),
            signals: SignalAggregator::new(),
            slots: SlotManager::new(config.slot_count).shared(),
            traps: TrapTable::new(config.trap_policy),
            handlers: HandlerTable::default(),
            io_window: None,
        })
    }

    /// Configuration the machine was built from.
    #[must_use]
    pub const fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Memory bus.
    #[must_use]
    pub const fn bus(&self) -> &MemoryBus {
        &self.bus
    }

    /// Memory bus, for mapping.
    pub fn bus_mut(&mut self) -> &mut MemoryBus {
        &mut self.bus
    }

    /// Event scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    /// Event scheduler, for scheduling.
    pub fn scheduler_mut(&mut self) -> &mut EventScheduler {
        &mut self.scheduler
    }

    /// Control lines.
    #[must_use]
    pub const fn signals(&self) -> &SignalAggregator {
        &self.signals
    }

    /// Control lines, for devices outside the event path.
    pub fn signals_mut(&mut self) -> &mut SignalAggregator {
        &mut self.signals
    }

    /// Shared slot manager.
    #[must_use]
    pub fn slots(&self) -> SharedSlots {
        Rc::clone(&self.slots)
    }

    /// Trap table.
    pub fn traps_mut(&mut self) -> &mut TrapTable {
        &mut self.traps
    }

    /// Placement of the installed I/O page.
    #[must_use]
    pub const fn io_window(&self) -> Option<&IoWindow> {
        self.io_window.as_ref()
    }

    /// Attaches one trace sink to the bus, slots, signals and scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::SlotsBusy`] when the slot manager is borrowed.
    pub fn set_trace_sink(&mut self, sink: Option<SharedTraceSink>) -> Result<(), MachineError> {
        self.slots
            .try_borrow_mut()
            .map_err(|_| MachineError::SlotsBusy)?
            .set_trace_sink(sink.clone());
        self.bus.set_trace_sink(sink.clone());
        self.signals.set_trace_sink(sink.clone());
        self.scheduler.set_trace_sink(sink);
        Ok(())
    }

    /// Registers a handler for scheduled events.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::HandlerTableFull`] once every id is taken.
    pub fn register_handler(
        &mut self,
        handler: Box<dyn EventHandler>,
    ) -> Result<HandlerId, MachineError> {
        self.handlers.register(handler)
    }

    /// Installs `card` in `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Slot`] for out-of-range or occupied slots.
    pub fn install_card(
        &mut self,
        slot: u8,
        card: Box<dyn Peripheral>,
    ) -> Result<(), MachineError> {
        self.slots
            .try_borrow_mut()
            .map_err(|_| MachineError::SlotsBusy)?
            .install(slot, card)?;
        Ok(())
    }

    /// Builds the composite I/O page, lets `build` attach built-in devices,
    /// and maps it read/write at the configured base.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::NoIoPage`] when the configuration has no I/O
    /// page, or the [`MapError`] from mapping it.
    pub fn install_io_page(
        &mut self,
        build: impl FnOnce(IoPage) -> IoPage,
    ) -> Result<TargetId, MachineError> {
        let io = self.config.io_page.ok_or(MachineError::NoIoPage)?;
        let page = build(IoPage::new(
            io.layout,
            Rc::clone(&self.slots),
            self.bus.floating_bus(),
        ));
        let overrides = page.overrides();
        let target = self.bus.add_target(Box::new(page));
        let entry = self
            .bus
            .page_entry(target, IO_PAGE_DEVICE, RegionTag::Io, Permissions::RW)?;
        let page_size = self.bus.page_table().page_size();
        let count = io.layout.span().div_ceil(page_size).max(1) as usize;
        self.bus
            .map_page_range(self.bus.page_index(io.base), count, entry)?;
        self.io_window = Some(IoWindow {
            base: io.base,
            layout: io.layout,
            overrides,
        });
        debug!(base = io.base, pages = count, "I/O page installed");
        Ok(target)
    }

    /// Runs one CPU access: trap table first, then the bus.
    ///
    /// Traps see the address after it is masked to the bus width, so every
    /// alias the bus folds onto a trapped address is intercepted. Trapped
    /// accesses are counted and traced like bus accesses.
    ///
    /// # Errors
    ///
    /// Returns the [`BusFault`](crate::BusFault) raised by the bus.
    pub fn cpu_access(&mut self, access: &BusAccess) -> BusResult<u32> {
        if self.traps.is_empty() {
            return self.bus.access(access);
        }
        let mut masked = *access;
        masked.address &= self.bus.page_table().address_mask();
        let mut context = TrapContext {
            bus: &mut self.bus,
            signals: &mut self.signals,
            slots: Some(&self.slots),
            io_window: self.io_window.as_ref(),
        };
        if let Some(outcome) = self.traps.dispatch(&masked, &mut context) {
            self.bus.record_trapped(&masked, outcome);
            return Ok(outcome);
        }
        self.bus.access(&masked)
    }

    /// Advances the timeline by the cycles one CPU step consumed and
    /// dispatches every event that became due.
    ///
    /// Returns the number of events dispatched.
    pub fn end_step(&mut self, cycles: u64) -> usize {
        let mut dispatch = Dispatch {
            handlers: &mut self.handlers,
            signals: &mut self.signals,
            bus: &mut self.bus,
            slots: &self.slots,
        };
        self.scheduler.advance(cycles, &mut dispatch)
    }

    /// Dispatches events already due without moving the clock.
    pub fn dispatch_due(&mut self) -> usize {
        let mut dispatch = Dispatch {
            handlers: &mut self.handlers,
            signals: &mut self.signals,
            bus: &mut self.bus,
            slots: &self.slots,
        };
        self.scheduler.dispatch_due(&mut dispatch)
    }

    /// Skips an idle CPU straight to the next event and dispatches it.
    ///
    /// Returns the cycles skipped, or `None` when nothing is scheduled.
    pub fn idle_until_next_event(&mut self) -> Option<u64> {
        let before = self.scheduler.now();
        let mut dispatch = Dispatch {
            handlers: &mut self.handlers,
            signals: &mut self.signals,
            bus: &mut self.bus,
            slots: &self.slots,
        };
        self.scheduler
            .jump_to_next_event_and_dispatch(&mut dispatch)
            .then(|| self.scheduler.now() - before)
    }

    /// Returns every component to its power-on state.
    ///
    /// Mappings, installed cards, traps and handlers stay in place.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::SlotsBusy`] when the slot manager is borrowed.
    pub fn reset(&mut self) -> Result<(), MachineError> {
        self.slots
            .try_borrow_mut()
            .map_err(|_| MachineError::SlotsBusy)?
            .reset();
        self.bus.reset();
        self.bus.reset_diagnostics();
        self.signals.reset();
        self.scheduler.reset();
        debug!("machine reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{EventContext, Machine, MachineError};
    use crate::scheduler::{EventKind, EventSpec, ScheduledEvent};
    use crate::{
        AccessIntent, AccessWidth, BusAccess, DeviceId, MachineConfig, SignalLine,
    };

    #[test]
    fn io_page_requires_configuration() {
        let mut machine = Machine::new(MachineConfig {
            io_page: None,
            ..MachineConfig::default()
        })
        .expect("valid config");
        assert_eq!(
            machine.install_io_page(|page| page).map(|_| ()),
            Err(MachineError::NoIoPage)
        );
    }

    #[test]
    fn io_page_covers_its_span() {
        let mut machine = Machine::new(MachineConfig::default()).expect("valid config");
        machine.install_io_page(|page| page).expect("mapped");
        assert!(machine.bus().page_entry_for(0xCFFF).is_some());
        assert!(machine.bus().page_entry_for(0xD000).is_none());
        let read = BusAccess::read(0xC0F0, AccessWidth::Byte, AccessIntent::DataRead);
        let outcome = machine.cpu_access(&read).expect("mapped");
        assert_eq!(outcome.value, 0xFF);
    }

    #[test]
    fn events_drive_signal_lines() {
        let mut machine = Machine::new(MachineConfig::default()).expect("valid config");
        let timer = machine
            .register_handler(Box::new(|event: &ScheduledEvent, context: &mut EventContext<'_>| {
                if event.tag == 1 {
                    context.signals.assert(SignalLine::Irq, DeviceId(3));
                } else {
                    context.signals.deassert(SignalLine::Irq, DeviceId(3));
                }
            }))
            .expect("room");
        let spec = EventSpec::new(timer, EventKind::InterruptLineChange);
        machine.scheduler_mut().schedule_after(10, spec.with_tag(1));
        machine.scheduler_mut().schedule_after(30, spec.with_tag(0));

        assert_eq!(machine.end_step(9), 0);
        assert!(!machine.signals().is_asserted(SignalLine::Irq));
        assert_eq!(machine.end_step(1), 1);
        assert!(machine.signals().is_asserted(SignalLine::Irq));
        assert_eq!(machine.idle_until_next_event(), Some(20));
        assert!(!machine.signals().is_asserted(SignalLine::Irq));
        assert_eq!(machine.idle_until_next_event(), None);
    }

    #[test]
    fn reset_clears_runtime_state() {
        let mut machine = Machine::new(MachineConfig::default()).expect("valid config");
        machine.signals_mut().assert(SignalLine::Nmi, DeviceId(1));
        let timer = EventSpec::new(super::HandlerId(9), EventKind::DeviceTimer);
        machine.scheduler_mut().schedule_after(5, timer);
        machine.end_step(3);
        machine.reset().expect("slots free");
        assert!(!machine.signals().is_asserted(SignalLine::Nmi));
        assert_eq!(machine.scheduler().now(), 0);
        assert_eq!(machine.scheduler().pending(), 0);
    }

    #[test]
    fn unknown_handler_events_are_dropped() {
        let mut machine = Machine::new(MachineConfig::default()).expect("valid config");
        let spec = EventSpec::new(super::HandlerId(4), EventKind::DeferredWork);
        machine.scheduler_mut().schedule_after(1, spec);
        assert_eq!(machine.end_step(1), 1);
        assert_eq!(machine.scheduler().pending(), 0);
    }
}
