//! Deterministic trace hooks.
//!
//! Components emit [`TraceEvent`] values to an attached [`TraceSink`] in the
//! order things happen on the machine timeline. Sinks only observe.

use std::cell::RefCell;
use std::rc::Rc;

use crate::{AccessIntent, BusFault, EventHandle, EventKind, SignalLine};

/// Observable machine event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// A bus access completed.
    BusAccess {
        /// Masked access address.
        address: u32,
        /// Access width in bits.
        width_bits: u8,
        /// Access intent.
        intent: AccessIntent,
        /// Value read or written.
        value: u32,
        /// Cycles charged.
        cycles: u32,
        /// The access reached the device as byte cycles.
        decomposed: bool,
    },
    /// A bus access faulted.
    BusFault(BusFault),
    /// A control line changed aggregate level.
    SignalChanged {
        /// Line that changed.
        line: SignalLine,
        /// New level.
        asserted: bool,
    },
    /// Ownership of the shared expansion window changed.
    ExpansionSlotChanged {
        /// Owner before the change.
        previous: Option<u8>,
        /// Owner after the change.
        current: Option<u8>,
    },
    /// The scheduler dispatched an event.
    EventDispatched {
        /// Handle of the dispatched event.
        handle: EventHandle,
        /// Cycle the event was due.
        due_cycle: u64,
        /// Profiling kind.
        kind: EventKind,
        /// Caller-supplied tag.
        tag: u32,
    },
}

/// Sink trait for deterministic trace hooks.
pub trait TraceSink {
    /// Records an event in timeline order.
    fn on_event(&mut self, event: TraceEvent);
}

/// Trace sink shared between the components of one machine.
pub type SharedTraceSink = Rc<RefCell<dyn TraceSink>>;

/// Sink that keeps every event in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceRecorder {
    events: Vec<TraceEvent>,
}

impl TraceRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty recorder already wrapped for sharing.
    #[must_use]
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Recorded events in emission order.
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Removes and returns all recorded events.
    pub fn take(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.events)
    }
}

impl TraceSink for TraceRecorder {
    fn on_event(&mut self, event: TraceEvent) {
        self.events.push(event);
    }
}

/// Delivers `event` to `sink` when one is attached.
///
/// A sink that is already borrowed (an emitter reached from inside the sink
/// itself) misses the event instead of panicking.
pub(crate) fn emit(sink: Option<&SharedTraceSink>, event: TraceEvent) {
    if let Some(sink) = sink {
        if let Ok(mut sink) = sink.try_borrow_mut() {
            sink.on_event(event);
        }
    }
}
