//! Machine configuration and validation.

use thiserror::Error;

use crate::memory::page::check_geometry;
use crate::{FloatingBusPolicy, IoPageLayout, MapError, TrapPolicy};

/// Address-space width used by the default configuration.
pub const DEFAULT_ADDRESS_BITS: u8 = 16;
/// Page shift used by the default configuration (4 KiB pages).
pub const DEFAULT_PAGE_SHIFT: u8 = 12;
/// Number of peripheral slots on the default machine.
pub const DEFAULT_SLOT_COUNT: u8 = 7;
/// Base address of the composite I/O page on the default machine.
pub const DEFAULT_IO_PAGE_BASE: u32 = 0xC000;
/// Base address of the composite I/O page on 32-bit machines.
pub const NATIVE32_IO_PAGE_BASE: u32 = 0x50F0_0000;

/// CPU operating mode as seen by the bus policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CpuMode {
    /// Compatibility mode: wide accesses default to byte cycles and the
    /// no-execute bit is not enforced.
    #[default]
    Legacy,
    /// Native mode: wide accesses default to one atomic cycle when the
    /// target supports it.
    Native,
}

/// CPU personalities sharing one machine model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CpuPersonality {
    /// 8-bit CPU with a 16-bit little-endian address space.
    Legacy8,
    /// 16-bit CPU with a 24-bit little-endian address space.
    Native16,
    /// 32-bit CPU with a full big-endian address space and 64 KiB pages.
    Native32,
}

impl CpuPersonality {
    /// Bus configuration matching this personality.
    #[must_use]
    pub const fn bus_config(self) -> BusConfig {
        match self {
            Self::Legacy8 => BusConfig {
                address_bits: DEFAULT_ADDRESS_BITS,
                page_shift: DEFAULT_PAGE_SHIFT,
                cpu_mode: CpuMode::Legacy,
                enforce_nx: false,
                strict_alignment: false,
                little_endian: true,
                floating_bus: FloatingBusPolicy::Constant(0xFF),
            },
            Self::Native16 => BusConfig {
                address_bits: 24,
                page_shift: DEFAULT_PAGE_SHIFT,
                cpu_mode: CpuMode::Native,
                enforce_nx: true,
                strict_alignment: false,
                little_endian: true,
                floating_bus: FloatingBusPolicy::Constant(0xFF),
            },
            Self::Native32 => BusConfig {
                address_bits: 32,
                page_shift: 16,
                cpu_mode: CpuMode::Native,
                enforce_nx: true,
                strict_alignment: false,
                little_endian: false,
                floating_bus: FloatingBusPolicy::Constant(0xFF),
            },
        }
    }
}

/// Memory-bus geometry and policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct BusConfig {
    /// Width of the address space in bits.
    pub address_bits: u8,
    /// Log2 of the page size.
    pub page_shift: u8,
    /// CPU mode driving the default wide-access policy.
    pub cpu_mode: CpuMode,
    /// Fault instruction fetches from non-executable pages in native mode.
    pub enforce_nx: bool,
    /// Fault wide accesses that are not naturally aligned.
    pub strict_alignment: bool,
    /// Compose multi-byte values little-endian.
    pub little_endian: bool,
    /// Source of undriven reads.
    pub floating_bus: FloatingBusPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        CpuPersonality::Legacy8.bus_config()
    }
}

impl BusConfig {
    /// Returns `true` when `enforce_nx` is in effect for the current mode.
    #[must_use]
    pub const fn nx_active(&self) -> bool {
        self.enforce_nx && matches!(self.cpu_mode, CpuMode::Native)
    }
}

/// Placement of the composite I/O page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct IoPageConfig {
    /// Bus address of offset zero.
    pub base: u32,
    /// Sub-region layout.
    pub layout: IoPageLayout,
}

impl Default for IoPageConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_IO_PAGE_BASE,
            layout: IoPageLayout::CLASSIC,
        }
    }
}

/// Top-level immutable configuration for a machine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MachineConfig {
    /// Bus geometry and policy.
    pub bus: BusConfig,
    /// Number of peripheral slots; valid slots are `1..=slot_count`.
    pub slot_count: u8,
    /// Composite I/O page placement, when the machine has one.
    pub io_page: Option<IoPageConfig>,
    /// Whether traps replay expansion selection centrally.
    pub trap_policy: TrapPolicy,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            slot_count: DEFAULT_SLOT_COUNT,
            io_page: Some(IoPageConfig::default()),
            trap_policy: TrapPolicy::default(),
        }
    }
}

impl MachineConfig {
    /// Default machine for a CPU personality.
    #[must_use]
    pub fn for_personality(personality: CpuPersonality) -> Self {
        let base = match personality {
            CpuPersonality::Legacy8 | CpuPersonality::Native16 => DEFAULT_IO_PAGE_BASE,
            CpuPersonality::Native32 => NATIVE32_IO_PAGE_BASE,
        };
        Self {
            bus: personality.bus_config(),
            io_page: Some(IoPageConfig {
                base,
                layout: IoPageLayout::CLASSIC,
            }),
            ..Self::default()
        }
    }

    /// Checks the configuration before anything is built.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_geometry(self.bus.address_bits, self.bus.page_shift)?;
        let max_slots = self
            .io_page
            .map_or(u8::MAX, |io_page| io_page.layout.max_slot);
        if self.slot_count == 0 || self.slot_count > max_slots {
            return Err(ConfigError::SlotCount {
                slot_count: self.slot_count,
                max: max_slots,
            });
        }
        if let Some(io_page) = self.io_page {
            if !io_page.layout.is_well_formed() {
                return Err(ConfigError::IoPageLayout);
            }
            let page_size = 1u64 << self.bus.page_shift;
            let address_space = 1u64 << self.bus.address_bits;
            if u64::from(io_page.base) % page_size != 0 {
                return Err(ConfigError::IoPageMisaligned {
                    base: io_page.base,
                    page_size,
                });
            }
            if u64::from(io_page.base) + u64::from(io_page.layout.span()) > address_space {
                return Err(ConfigError::IoPageOutOfRange { base: io_page.base });
            }
        }
        Ok(())
    }
}

/// Configuration rejected before a machine is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ConfigError {
    /// Address width or page shift is unsupported.
    #[error(transparent)]
    Geometry(#[from] MapError),
    /// Slot count is zero or exceeds the I/O page layout.
    #[error("slot count {slot_count} outside 1..={max}")]
    SlotCount {
        /// Requested slot count.
        slot_count: u8,
        /// Largest slot the layout can address.
        max: u8,
    },
    /// The I/O page sub-regions overlap or leave gaps.
    #[error("I/O page layout is not contiguous")]
    IoPageLayout,
    /// The I/O page does not start on a page boundary.
    #[error("I/O page base {base:#x} not aligned to {page_size}-byte pages")]
    IoPageMisaligned {
        /// Requested base.
        base: u32,
        /// Page size in bytes.
        page_size: u64,
    },
    /// The I/O page extends past the end of the address space.
    #[error("I/O page at {base:#x} exceeds the address space")]
    IoPageOutOfRange {
        /// Requested base.
        base: u32,
    },
}
