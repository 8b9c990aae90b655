//! Deterministic trace fingerprint used by CI cross-host comparison.
//!
//! Runs a fixed script of CPU accesses, slot selections and scheduled DMA
//! phases, then hashes every trace event. Two hosts must print the same hash.

#![allow(clippy::cast_possible_truncation)]

use machine_core::{
    AccessIntent, AccessWidth, BusAccess, CardRegion, DeviceId, DeviceTarget, EventContext,
    EventKind, EventSpec, Machine, MachineConfig, Peripheral, Permissions, Ram, RegionTag, Rom,
    ScheduledEvent, SignalLine, TraceEvent, TraceRecorder,
};
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

struct Card {
    rom: Rom,
    expansion: Rom,
}

impl Peripheral for Card {
    fn name(&self) -> &str {
        "fingerprint-card"
    }

    fn region_mut(&mut self, region: CardRegion) -> Option<&mut dyn DeviceTarget> {
        match region {
            CardRegion::Rom => Some(&mut self.rom),
            CardRegion::ExpansionRom => Some(&mut self.expansion),
            CardRegion::Io => None,
        }
    }

    fn region(&self, region: CardRegion) -> Option<&dyn DeviceTarget> {
        match region {
            CardRegion::Rom => Some(&self.rom),
            CardRegion::ExpansionRom => Some(&self.expansion),
            CardRegion::Io => None,
        }
    }
}

fn dma(event: &ScheduledEvent, context: &mut EventContext<'_>) {
    let write = BusAccess::write(
        0x0300 + event.tag,
        AccessWidth::Byte,
        event.tag.wrapping_mul(0x1D),
        AccessIntent::DmaWrite,
    );
    if context.bus.access(&write).is_err() {
        return;
    }
    if event.tag < 15 {
        let next = EventSpec::new(event.handler, EventKind::DmaPhase).with_tag(event.tag + 1);
        context.scheduler.schedule_after(3, next);
    } else {
        context.signals.assert(SignalLine::Irq, DeviceId(4));
    }
}

fn hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(0x1000_0000_01B3);
    }
}

fn hash_event(hash: &mut u64, event: &TraceEvent) {
    match *event {
        TraceEvent::BusAccess {
            address,
            width_bits,
            value,
            cycles,
            decomposed,
            ..
        } => {
            hash_bytes(hash, &[0x10, width_bits, u8::from(decomposed)]);
            hash_bytes(hash, &address.to_le_bytes());
            hash_bytes(hash, &value.to_le_bytes());
            hash_bytes(hash, &cycles.to_le_bytes());
        }
        TraceEvent::BusFault(fault) => {
            hash_bytes(hash, &[0x11, fault.kind.as_u8(), fault.width_bits]);
            hash_bytes(hash, &fault.address.to_le_bytes());
        }
        TraceEvent::SignalChanged { line, asserted } => {
            let index = SignalLine::ALL
                .iter()
                .position(|candidate| *candidate == line)
                .unwrap_or_default();
            hash_bytes(hash, &[0x12, index as u8, u8::from(asserted)]);
        }
        TraceEvent::ExpansionSlotChanged { previous, current } => {
            hash_bytes(
                hash,
                &[0x13, previous.unwrap_or(0xFF), current.unwrap_or(0xFF)],
            );
        }
        TraceEvent::EventDispatched {
            handle,
            due_cycle,
            tag,
            ..
        } => {
            hash_bytes(hash, &[0x14]);
            hash_bytes(hash, &handle.id().to_le_bytes());
            hash_bytes(hash, &due_cycle.to_le_bytes());
            hash_bytes(hash, &tag.to_le_bytes());
        }
    }
}

fn fingerprint() -> String {
    let mut machine = Machine::new(MachineConfig::default()).expect("default config is valid");
    let recorder = TraceRecorder::shared();
    machine
        .set_trace_sink(Some(recorder.clone()))
        .expect("slots are free");

    let bus = machine.bus_mut();
    let ram = bus.add_target(Box::new(Ram::new(0x4000)));
    let entry = bus
        .page_entry(ram, DeviceId(1), RegionTag::Ram, Permissions::RWX)
        .expect("ram registered");
    bus.map_page_range(0, 4, entry).expect("pages in range");
    machine.install_io_page(|page| page).expect("io page maps");
    for slot in [3u8, 6] {
        let card = Card {
            rom: Rom::new(vec![slot * 0x11; 0x100]),
            expansion: Rom::new((0..0x800).map(|i| (i as u8) ^ slot).collect::<Vec<_>>()),
        };
        machine
            .install_card(slot, Box::new(card))
            .expect("slot is empty");
    }
    let handler = machine.register_handler(Box::new(dma)).expect("table has room");
    machine
        .scheduler_mut()
        .schedule_after(7, EventSpec::new(handler, EventKind::DmaPhase));

    let script = [
        0xC600, 0xC800, 0xC9AB, 0xCFFF, 0xC300, 0xCA00, 0x0300, 0x5000, 0xC0F0, 0x0305,
    ];
    for round in 0..8 {
        for address in script {
            let read = BusAccess::read(
                address + round,
                AccessWidth::Byte,
                AccessIntent::InstructionFetch,
            );
            let cycles = machine.cpu_access(&read).map_or(1, |outcome| outcome.cycles);
            machine.end_step(u64::from(cycles));
        }
    }
    machine.idle_until_next_event();

    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    for event in recorder.borrow().events() {
        hash_event(&mut hash, event);
    }
    hash_bytes(&mut hash, &machine.scheduler().now().to_le_bytes());
    format!("{hash:016x}")
}

fn main() {
    println!("{}", fingerprint());
}
