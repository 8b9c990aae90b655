//! Bus throughput harness.
//!
//! Measures accesses per second through the checked path for the access
//! mixes a CPU core generates.
//!
//! ## Usage
//!
//! ```sh
//! cargo run -p machine-core --example bus_throughput --release
//! ```

#![allow(clippy::pedantic)]

use machine_core::{
    AccessIntent, AccessWidth, BusAccess, CpuPersonality, DeviceId, Machine, MachineConfig,
    Permissions, Ram, RegionTag,
};
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

use std::time::{Duration, Instant};

const ACCESSES_PER_RUN: u32 = 2_000_000;

#[derive(Debug, Clone, Copy)]
struct ThroughputResult {
    name: &'static str,
    accesses_per_second: f64,
    cycles_per_access: f64,
}

fn machine_for(personality: CpuPersonality) -> Machine {
    let mut machine =
        Machine::new(MachineConfig::for_personality(personality)).expect("valid config");
    let bus = machine.bus_mut();
    let page_size = bus.page_table().page_size() as usize;
    let ram = bus.add_target(Box::new(Ram::new(page_size)));
    let entry = bus
        .page_entry(ram, DeviceId(1), RegionTag::Ram, Permissions::RWX)
        .expect("ram registered");
    bus.map_page(0, entry).expect("page in range");
    machine
}

fn run(
    name: &'static str,
    personality: CpuPersonality,
    width: AccessWidth,
    intent: AccessIntent,
) -> ThroughputResult {
    let mut machine = machine_for(personality);
    let mut cycles = 0u64;
    let start = Instant::now();
    for i in 0..ACCESSES_PER_RUN {
        let address = (i.wrapping_mul(4)) & 0x0FFC;
        let access = if intent.is_write() {
            BusAccess::write(address, width, i, intent)
        } else {
            BusAccess::read(address, width, intent)
        };
        let outcome = machine.cpu_access(&access).expect("mapped ram");
        cycles += u64::from(outcome.cycles);
    }
    let elapsed = start.elapsed().max(Duration::from_nanos(1));
    ThroughputResult {
        name,
        accesses_per_second: f64::from(ACCESSES_PER_RUN) / elapsed.as_secs_f64(),
        cycles_per_access: cycles as f64 / f64::from(ACCESSES_PER_RUN),
    }
}

fn main() {
    let results = [
        run(
            "legacy8 byte fetch",
            CpuPersonality::Legacy8,
            AccessWidth::Byte,
            AccessIntent::InstructionFetch,
        ),
        run(
            "legacy8 word read (decomposed)",
            CpuPersonality::Legacy8,
            AccessWidth::Word,
            AccessIntent::DataRead,
        ),
        run(
            "native16 word write",
            CpuPersonality::Native16,
            AccessWidth::Word,
            AccessIntent::DataWrite,
        ),
        run(
            "native32 dword read",
            CpuPersonality::Native32,
            AccessWidth::Dword,
            AccessIntent::DataRead,
        ),
    ];
    println!("{:<34} {:>16} {:>14}", "mix", "accesses/s", "cycles/access");
    for result in results {
        println!(
            "{:<34} {:>16.0} {:>14.2}",
            result.name, result.accesses_per_second, result.cycles_per_access
        );
    }
}
