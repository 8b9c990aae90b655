//! Memory bus, page table and plain memory targets.

/// Bank-switched high memory with write-protect arming.
pub mod bank;
/// Page-table-routed bus with direct and fault-returning paths.
pub mod bus;
/// Flat page table and page permissions.
pub mod page;
/// RAM and ROM targets.
pub mod ram;

pub use bank::{BankState, LanguageCard, LanguageCardRam};
pub use bus::{AccessOutcome, BusResult, MemoryBus};
pub use page::{
    check_geometry, MapError, PageEntry, PageTable, Permissions, RegionTag, TargetId,
    MAX_ADDRESS_BITS, MAX_PAGE_COUNT, MIN_PAGE_SHIFT,
};
pub use ram::{Ram, Rom};
