//! Hardware-abstraction core for a family of cycle-counted retro machines.
//!
//! A [`MemoryBus`] routes every CPU and DMA access through a flat page table
//! to a [`DeviceTarget`]. One page may be a composite [`IoPage`] that fans out
//! to soft switches, slot registers, slot ROM windows and a shared expansion
//! window owned by at most one card of the [`SlotManager`]. Control lines are
//! wired-OR through a [`SignalAggregator`], and all timed behaviour runs from
//! one [`EventScheduler`]. A [`Machine`] ties them to a single timeline.

/// Bus access descriptors: intent, width, flags and source.
pub mod access;
pub use access::{AccessFlags, AccessIntent, AccessMode, AccessWidth, BusAccess, SourceId};

/// Bus fault taxonomy and device-level rejections.
pub mod fault;
pub use fault::{BusFault, DeviceError, FaultClass, FaultKind};

/// Device-target contract.
pub mod device;
pub use device::{DeviceCapabilities, DeviceId, DeviceResult, DeviceTarget};

/// Page table, memory bus and plain memory targets.
pub mod memory;
pub use memory::{
    AccessOutcome, BankState, BusResult, LanguageCard, LanguageCardRam, MapError, MemoryBus,
    PageEntry, PageTable, Permissions, Ram, RegionTag, Rom, TargetId,
};

/// Deterministic access cycle-cost table.
pub mod timing;
pub use timing::{access_cycles, cycle_cost, AccessCostKind, ACCESS_COST_TABLE};

/// Floating-bus value sources.
pub mod floating;
pub use floating::{
    ConstantFloatingBus, FloatingBus, FloatingBusLatch, FloatingBusPolicy, SharedFloatingBus,
};

/// Bus fault and access counters.
pub mod diag;
pub use diag::BusDiagnostics;

/// Deterministic trace hooks.
pub mod trace;
pub use trace::{SharedTraceSink, TraceEvent, TraceRecorder, TraceSink};

/// Machine configuration and validation.
pub mod config;
pub use config::{BusConfig, ConfigError, CpuMode, CpuPersonality, IoPageConfig, MachineConfig};

/// Composite I/O page with slot ROM snooping.
pub mod io_page;
pub use io_page::{
    IoPage, IoPageLayout, IoRegion, IoWindow, RomOverrideSwitch, RomOverrides, SelectionEffect,
};

/// Peripheral slots and expansion-window ownership.
pub mod slots;
pub use slots::{
    CardRegion, ExpansionSelection, Peripheral, SharedSlots, SlotEntry, SlotError, SlotManager,
};

/// Wired-OR control lines.
pub mod signals;
pub use signals::{SignalAggregator, SignalLine};

/// Cycle-ordered event queue.
pub mod scheduler;
pub use scheduler::{
    EventDispatcher, EventHandle, EventKind, EventScheduler, EventSpec, HandlerId,
    ScheduledEvent,
};

/// Address-keyed trap handlers.
pub mod trap;
pub use trap::{TrapContext, TrapHandler, TrapOutcome, TrapPolicy, TrapTable};

/// Machine aggregate and event handler table.
pub mod machine;
pub use machine::{EventContext, EventHandler, HandlerTable, Machine, MachineError, IO_PAGE_DEVICE};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
