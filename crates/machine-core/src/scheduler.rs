//! Cycle-ordered event scheduler.
//!
//! Events are plain data ordered by `(due_cycle, sequence)`: equal-cycle
//! events fire in the order they were scheduled. Dispatch hands each event to
//! an [`EventDispatcher`], which may schedule or cancel further events.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use crate::trace::{emit, SharedTraceSink, TraceEvent};

/// Cancelable reference to a scheduled event.
///
/// Handles are never reused within one scheduler, across resets included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct EventHandle(u64);

impl EventHandle {
    /// Raw monotonic id.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Profiling category of an event. Never affects ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum EventKind {
    /// Device-internal timer expiry.
    DeviceTimer,
    /// Delayed control-line change.
    InterruptLineChange,
    /// Step of a DMA transfer.
    DmaPhase,
    /// Recurring tick such as a video frame.
    PeriodicTick,
    /// Work postponed out of an access path.
    DeferredWork,
    /// Host-defined category.
    Custom(u16),
}

/// Index into the machine's event handler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct HandlerId(pub u16);

/// What to run when an event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct EventSpec {
    /// Handler receiving the event.
    pub handler: HandlerId,
    /// Profiling category.
    pub kind: EventKind,
    /// Profiling priority.
    pub priority: u8,
    /// Caller-supplied payload.
    pub tag: u32,
}

impl EventSpec {
    /// Event for `handler` with zero priority and tag.
    #[must_use]
    pub const fn new(handler: HandlerId, kind: EventKind) -> Self {
        Self {
            handler,
            kind,
            priority: 0,
            tag: 0,
        }
    }

    /// Sets the profiling priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the payload tag.
    #[must_use]
    pub const fn with_tag(mut self, tag: u32) -> Self {
        self.tag = tag;
        self
    }
}

/// An event waiting in, or just taken from, the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ScheduledEvent {
    /// Cancel handle.
    pub handle: EventHandle,
    /// Cycle the event is due.
    pub due_cycle: u64,
    /// Insertion order; breaks ties between equal due cycles.
    pub sequence: u64,
    /// Profiling priority.
    pub priority: u8,
    /// Profiling category.
    pub kind: EventKind,
    /// Handler receiving the event.
    pub handler: HandlerId,
    /// Caller-supplied payload.
    pub tag: u32,
}

/// Receiver for dispatched events.
pub trait EventDispatcher {
    /// Handles one due event; `scheduler.now()` equals the event's due cycle
    /// unless the event was scheduled in the past.
    fn dispatch(&mut self, event: ScheduledEvent, scheduler: &mut EventScheduler);
}

impl<F> EventDispatcher for F
where
    F: FnMut(ScheduledEvent, &mut EventScheduler),
{
    fn dispatch(&mut self, event: ScheduledEvent, scheduler: &mut EventScheduler) {
        self(event, scheduler);
    }
}

type QueueKey = (u64, u64);

/// Deterministic cycle-numbered event queue.
#[derive(Default)]
pub struct EventScheduler {
    now: u64,
    next_handle: u64,
    next_sequence: u64,
    queue: BTreeMap<QueueKey, ScheduledEvent>,
    keys: HashMap<EventHandle, QueueKey>,
    dispatched: u64,
    trace: Option<SharedTraceSink>,
}

impl std::fmt::Debug for EventScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventScheduler")
            .field("now", &self.now)
            .field("pending", &self.queue.len())
            .field("dispatched", &self.dispatched)
            .finish_non_exhaustive()
    }
}

impl EventScheduler {
    /// Creates an empty scheduler at cycle zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches or detaches the trace sink notified on dispatch.
    pub fn set_trace_sink(&mut self, sink: Option<SharedTraceSink>) {
        self.trace = sink;
    }

    /// Current cycle.
    #[must_use]
    pub const fn now(&self) -> u64 {
        self.now
    }

    /// Number of events waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Events dispatched since creation or the last reset.
    #[must_use]
    pub const fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Due cycle of the earliest waiting event.
    #[must_use]
    pub fn peek_next_due(&self) -> Option<u64> {
        self.queue.first_key_value().map(|(&(due, _), _)| due)
    }

    /// Returns `true` while `handle` is still waiting.
    #[must_use]
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.keys.contains_key(&handle)
    }

    /// Queues an event for absolute cycle `due_cycle`.
    ///
    /// A cycle already in the past fires on the next dispatch pass.
    pub fn schedule_at(&mut self, due_cycle: u64, spec: EventSpec) -> EventHandle {
        self.next_handle += 1;
        let handle = EventHandle(self.next_handle);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let key = (due_cycle, sequence);
        self.queue.insert(
            key,
            ScheduledEvent {
                handle,
                due_cycle,
                sequence,
                priority: spec.priority,
                kind: spec.kind,
                handler: spec.handler,
                tag: spec.tag,
            },
        );
        self.keys.insert(handle, key);
        handle
    }

    /// Queues an event `delta` cycles from now.
    pub fn schedule_after(&mut self, delta: u64, spec: EventSpec) -> EventHandle {
        self.schedule_at(self.now.saturating_add(delta), spec)
    }

    /// Removes a waiting event.
    ///
    /// Returns `false` for handles that already fired, were canceled, or
    /// never existed.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.keys
            .remove(&handle)
            .and_then(|key| self.queue.remove(&key))
            .is_some()
    }

    /// Dispatches every event due at or before the current cycle, including
    /// events those handlers schedule for the current cycle.
    ///
    /// Returns the number of events dispatched.
    pub fn dispatch_due(&mut self, dispatcher: &mut dyn EventDispatcher) -> usize {
        self.dispatch_until(self.now, dispatcher)
    }

    /// Moves the clock forward `delta` cycles, dispatching events in order as
    /// their due cycles are reached.
    ///
    /// Returns the number of events dispatched.
    pub fn advance(&mut self, delta: u64, dispatcher: &mut dyn EventDispatcher) -> usize {
        let target = self.now.saturating_add(delta);
        let count = self.dispatch_until(target, dispatcher);
        self.now = target;
        count
    }

    /// Moves the clock to the earliest waiting event and dispatches every
    /// event due at that cycle.
    ///
    /// Returns `false` when nothing is waiting.
    pub fn jump_to_next_event_and_dispatch(
        &mut self,
        dispatcher: &mut dyn EventDispatcher,
    ) -> bool {
        let Some(due) = self.peek_next_due() else {
            return false;
        };
        self.now = self.now.max(due);
        self.dispatch_due(dispatcher);
        true
    }

    /// Drops every waiting event and returns the clock to zero.
    pub fn reset(&mut self) {
        debug!(dropped = self.queue.len(), now = self.now, "scheduler reset");
        self.queue.clear();
        self.keys.clear();
        self.now = 0;
        self.dispatched = 0;
    }

    fn dispatch_until(&mut self, limit: u64, dispatcher: &mut dyn EventDispatcher) -> usize {
        let mut count = 0;
        while let Some(event) = self.pop_due(limit) {
            self.now = self.now.max(event.due_cycle);
            self.dispatched = self.dispatched.saturating_add(1);
            count += 1;
            trace!(
                handle = event.handle.id(),
                due = event.due_cycle,
                kind = ?event.kind,
                tag = event.tag,
                "event dispatch"
            );
            emit(
                self.trace.as_ref(),
                TraceEvent::EventDispatched {
                    handle: event.handle,
                    due_cycle: event.due_cycle,
                    kind: event.kind,
                    tag: event.tag,
                },
            );
            dispatcher.dispatch(event, self);
        }
        count
    }

    fn pop_due(&mut self, limit: u64) -> Option<ScheduledEvent> {
        let (&(due, _), _) = self.queue.first_key_value()?;
        if due > limit {
            return None;
        }
        let (_, event) = self.queue.pop_first()?;
        self.keys.remove(&event.handle);
        Some(event)
    }
}
