//! Scheduler ordering and control-line suite.

#![allow(
    clippy::pedantic,
    clippy::nursery,
    clippy::cast_possible_truncation,
    clippy::too_many_lines
)]

use std::collections::BTreeSet;

use machine_core::{
    DeviceId, EventKind, EventScheduler, EventSpec, HandlerId, ScheduledEvent, SignalAggregator,
    SignalLine, TraceEvent, TraceRecorder,
};
use proptest::prelude::*;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

fn spec(tag: u32) -> EventSpec {
    EventSpec::new(HandlerId(0), EventKind::DeviceTimer).with_tag(tag)
}

fn drain(scheduler: &mut EventScheduler, delta: u64) -> Vec<u32> {
    let mut seen = Vec::new();
    let mut record = |event: ScheduledEvent, _: &mut EventScheduler| seen.push(event.tag);
    scheduler.advance(delta, &mut record);
    seen
}

#[test]
fn equal_due_cycles_fire_in_insertion_order_regardless_of_priority() {
    let mut scheduler = EventScheduler::new();
    scheduler.schedule_at(10, spec(0).with_priority(9));
    scheduler.schedule_at(5, spec(1));
    scheduler.schedule_at(10, spec(2).with_priority(0));
    scheduler.schedule_at(10, spec(3).with_priority(200));
    assert_eq!(drain(&mut scheduler, 10), vec![1, 0, 2, 3]);
    assert_eq!(scheduler.dispatched(), 4);
}

#[test]
fn clock_reads_each_event_due_cycle_during_advance() {
    let mut scheduler = EventScheduler::new();
    scheduler.schedule_after(3, spec(0));
    scheduler.schedule_after(7, spec(1));
    let mut observed = Vec::new();
    let mut record = |event: ScheduledEvent, scheduler: &mut EventScheduler| {
        observed.push((event.due_cycle, scheduler.now()));
    };
    assert_eq!(scheduler.advance(20, &mut record), 2);
    assert_eq!(observed, vec![(3, 3), (7, 7)]);
    assert_eq!(scheduler.now(), 20);
}

#[test]
fn handlers_can_chain_events_into_the_same_pass() {
    let mut scheduler = EventScheduler::new();
    scheduler.schedule_after(4, spec(0));
    let mut seen = Vec::new();
    let mut chain = |event: ScheduledEvent, scheduler: &mut EventScheduler| {
        seen.push((event.tag, scheduler.now()));
        if event.tag < 3 {
            scheduler.schedule_after(0, spec(event.tag + 1));
        }
    };
    assert_eq!(scheduler.advance(4, &mut chain), 4);
    assert_eq!(seen, vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
}

#[test]
fn handlers_can_cancel_later_events() {
    let mut scheduler = EventScheduler::new();
    scheduler.schedule_at(1, spec(0));
    let doomed = scheduler.schedule_at(2, spec(1));
    let mut seen = Vec::new();
    let mut cancel = |event: ScheduledEvent, scheduler: &mut EventScheduler| {
        seen.push(event.tag);
        assert!(scheduler.cancel(doomed));
    };
    scheduler.advance(5, &mut cancel);
    assert_eq!(seen, vec![0]);
    assert!(!scheduler.is_pending(doomed));
}

#[test]
fn past_due_events_fire_on_the_next_pass_without_rewinding() {
    let mut scheduler = EventScheduler::new();
    assert!(drain(&mut scheduler, 100).is_empty());
    scheduler.schedule_at(40, spec(7));
    let mut seen = Vec::new();
    let mut record = |event: ScheduledEvent, scheduler: &mut EventScheduler| {
        seen.push((event.tag, scheduler.now()));
    };
    assert_eq!(scheduler.dispatch_due(&mut record), 1);
    assert_eq!(seen, vec![(7, 100)]);
}

#[test]
fn jump_skips_idle_time_to_the_earliest_event() {
    let mut scheduler = EventScheduler::new();
    scheduler.schedule_at(90, spec(1));
    scheduler.schedule_at(30, spec(0));
    scheduler.schedule_at(30, spec(2));
    let mut seen = Vec::new();
    let mut record = |event: ScheduledEvent, _: &mut EventScheduler| seen.push(event.tag);
    assert!(scheduler.jump_to_next_event_and_dispatch(&mut record));
    assert_eq!(scheduler.now(), 30);
    assert!(scheduler.jump_to_next_event_and_dispatch(&mut record));
    assert_eq!(scheduler.now(), 90);
    assert!(!scheduler.jump_to_next_event_and_dispatch(&mut record));
    assert_eq!(seen, vec![0, 2, 1]);
}

#[test]
fn handles_stay_unique_across_reset() {
    let mut scheduler = EventScheduler::new();
    let before = scheduler.schedule_after(10, spec(0));
    scheduler.reset();
    assert_eq!(scheduler.now(), 0);
    assert_eq!(scheduler.pending(), 0);
    assert!(!scheduler.cancel(before));
    let after = scheduler.schedule_after(10, spec(0));
    assert!(after.id() > before.id());
    assert!(scheduler.cancel(after));
    assert!(!scheduler.cancel(after));
}

#[test]
fn dispatch_reaches_the_trace_sink_in_order() {
    let recorder = TraceRecorder::shared();
    let mut scheduler = EventScheduler::new();
    scheduler.set_trace_sink(Some(recorder.clone()));
    let first = scheduler.schedule_at(2, spec(5));
    let second = scheduler.schedule_at(1, EventSpec::new(HandlerId(1), EventKind::Custom(3)));
    drain(&mut scheduler, 2);
    assert_eq!(
        recorder.borrow().events(),
        &[
            TraceEvent::EventDispatched {
                handle: second,
                due_cycle: 1,
                kind: EventKind::Custom(3),
                tag: 0,
            },
            TraceEvent::EventDispatched {
                handle: first,
                due_cycle: 2,
                kind: EventKind::DeviceTimer,
                tag: 5,
            },
        ]
    );
}

#[rstest]
#[case::irq(SignalLine::Irq)]
#[case::nmi(SignalLine::Nmi)]
#[case::reset(SignalLine::Reset)]
#[case::rdy(SignalLine::Rdy)]
#[case::dma(SignalLine::DmaRequest)]
#[case::sync(SignalLine::Sync)]
fn line_stays_asserted_until_every_device_releases(#[case] line: SignalLine) {
    let mut signals = SignalAggregator::new();
    assert!(signals.assert(line, DeviceId(2)));
    assert!(!signals.assert(line, DeviceId(5)));
    assert!(!signals.deassert(line, DeviceId(9)));
    assert!(!signals.deassert(line, DeviceId(2)));
    assert!(signals.is_asserted(line));
    assert_eq!(signals.asserters(line).collect::<Vec<_>>(), vec![DeviceId(5)]);
    assert!(signals.deassert(line, DeviceId(5)));
    assert!(!signals.is_asserted(line));
    for other in SignalLine::ALL.into_iter().filter(|other| *other != line) {
        assert!(!signals.is_asserted(other));
    }
}

#[test]
fn nmi_edge_latches_once_per_rising_transition() {
    let mut signals = SignalAggregator::new();
    signals.assert(SignalLine::Nmi, DeviceId(1));
    signals.assert(SignalLine::Nmi, DeviceId(2));
    assert!(signals.consume_nmi_edge());
    assert!(!signals.consume_nmi_edge());

    signals.deassert(SignalLine::Nmi, DeviceId(1));
    signals.assert(SignalLine::Nmi, DeviceId(1));
    assert!(!signals.nmi_edge_pending());

    signals.deassert(SignalLine::Nmi, DeviceId(1));
    signals.deassert(SignalLine::Nmi, DeviceId(2));
    signals.assert(SignalLine::Nmi, DeviceId(3));
    assert!(signals.consume_nmi_edge());
}

#[derive(Debug, Clone, Copy)]
struct LineOp {
    line: usize,
    device: u16,
    assert: bool,
}

fn line_op() -> impl Strategy<Value = LineOp> {
    (0..SignalLine::ALL.len(), 0u16..4, any::<bool>()).prop_map(|(line, device, assert)| LineOp {
        line,
        device,
        assert,
    })
}

proptest! {
    #[test]
    fn dispatch_order_is_due_cycle_then_insertion(
        events in prop::collection::vec((0u64..48, any::<bool>()), 0..40),
    ) {
        let mut scheduler = EventScheduler::new();
        let handles: Vec<_> = events
            .iter()
            .enumerate()
            .map(|(tag, (due, _))| scheduler.schedule_at(*due, spec(tag as u32)))
            .collect();
        for (handle, (_, canceled)) in handles.iter().zip(&events) {
            if *canceled {
                prop_assert!(scheduler.cancel(*handle));
                prop_assert!(!scheduler.cancel(*handle));
            }
        }

        let mut expected: Vec<(u64, u32)> = events
            .iter()
            .enumerate()
            .filter(|(_, (_, canceled))| !canceled)
            .map(|(tag, (due, _))| (*due, tag as u32))
            .collect();
        expected.sort_by_key(|(due, _)| *due);

        let seen = drain(&mut scheduler, 48);
        prop_assert_eq!(seen, expected.into_iter().map(|(_, tag)| tag).collect::<Vec<_>>());
        prop_assert_eq!(scheduler.pending(), 0);
        for handle in handles {
            prop_assert!(!scheduler.cancel(handle));
        }
    }

    #[test]
    fn split_advances_match_one_long_advance(
        dues in prop::collection::vec(0u64..200, 0..24),
        steps in prop::collection::vec(1u64..30, 1..20),
    ) {
        let mut whole = EventScheduler::new();
        let mut stepped = EventScheduler::new();
        for (tag, due) in dues.iter().enumerate() {
            whole.schedule_at(*due, spec(tag as u32));
            stepped.schedule_at(*due, spec(tag as u32));
        }
        let total: u64 = steps.iter().sum();
        let mut seen = Vec::new();
        for step in steps {
            seen.extend(drain(&mut stepped, step));
        }
        prop_assert_eq!(drain(&mut whole, total), seen);
        prop_assert_eq!(whole.now(), stepped.now());
    }

    #[test]
    fn lines_follow_the_wired_or_model(ops in prop::collection::vec(line_op(), 0..64)) {
        let mut signals = SignalAggregator::new();
        let mut model: [BTreeSet<u16>; 6] = Default::default();
        let mut expected_edges = 0;
        let mut edges = 0;
        for op in ops {
            let line = SignalLine::ALL[op.line];
            let before = !model[op.line].is_empty();
            if op.assert {
                model[op.line].insert(op.device);
            } else {
                model[op.line].remove(&op.device);
            }
            let after = !model[op.line].is_empty();
            let changed = if op.assert {
                signals.assert(line, DeviceId(op.device))
            } else {
                signals.deassert(line, DeviceId(op.device))
            };
            prop_assert_eq!(changed, before != after);
            prop_assert_eq!(signals.is_asserted(line), after);
            if line == SignalLine::Nmi && !before && after {
                expected_edges += 1;
            }
            if signals.consume_nmi_edge() {
                edges += 1;
            }
        }
        prop_assert_eq!(edges, expected_edges);
        signals.reset();
        for line in SignalLine::ALL {
            prop_assert!(!signals.is_asserted(line));
        }
    }
}
