//! Bus access descriptors shared by the CPU, DMA masters and device targets.

use std::ops::BitOr;

/// Why a bus master touches an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessIntent {
    /// CPU data load.
    DataRead,
    /// CPU data store.
    DataWrite,
    /// CPU opcode or operand fetch.
    InstructionFetch,
    /// Debugger peek; never triggers side effects.
    DebugRead,
    /// Debugger poke; never triggers side effects.
    DebugWrite,
    /// DMA master read.
    DmaRead,
    /// DMA master write.
    DmaWrite,
}

impl AccessIntent {
    /// Every intent, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::DataRead,
        Self::DataWrite,
        Self::InstructionFetch,
        Self::DebugRead,
        Self::DebugWrite,
        Self::DmaRead,
        Self::DmaWrite,
    ];

    /// Returns `true` for intents that store a value.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::DataWrite | Self::DebugWrite | Self::DmaWrite)
    }

    /// Returns `true` for debugger peeks and pokes.
    #[must_use]
    pub const fn is_debug(self) -> bool {
        matches!(self, Self::DebugRead | Self::DebugWrite)
    }

    /// Returns `true` for instruction fetches.
    #[must_use]
    pub const fn is_fetch(self) -> bool {
        matches!(self, Self::InstructionFetch)
    }
}

/// Per-access modifier bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AccessFlags(u8);

impl AccessFlags {
    /// No modifiers.
    pub const NONE: Self = Self(0);
    /// The access must not trigger device side effects.
    pub const NO_SIDE_EFFECTS: Self = Self(1 << 0);
    /// Request one wide device cycle when the target supports it.
    pub const ATOMIC: Self = Self(1 << 1);
    /// Force sequential byte cycles.
    pub const DECOMPOSE: Self = Self(1 << 2);
    /// Multi-byte values are little-endian; big-endian when clear.
    pub const LITTLE_ENDIAN: Self = Self(1 << 3);

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Builds flags from raw bits, dropping undefined bits.
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & 0x0F)
    }

    /// Returns `true` when every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns the flags with every bit of `other` cleared.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for AccessFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// How a device observes the access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessMode {
    /// One device cycle covers the full width.
    #[default]
    Atomic,
    /// The device sees one byte cycle of a wider access.
    Decomposed,
}

/// Architectural access width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessWidth {
    /// 8-bit access.
    Byte,
    /// 16-bit access.
    Word,
    /// 32-bit access.
    Dword,
}

impl AccessWidth {
    /// Width in bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Byte => 8,
            Self::Word => 16,
            Self::Dword => 32,
        }
    }

    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Dword => 4,
        }
    }

    /// Mask covering a value of this width.
    #[must_use]
    pub const fn value_mask(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Word => 0xFFFF,
            Self::Dword => u32::MAX,
        }
    }
}

/// Identifies the bus master that issued an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SourceId(pub u16);

impl SourceId {
    /// The primary CPU.
    pub const CPU: Self = Self(0);
    /// The default DMA master.
    pub const DMA: Self = Self(1);
    /// Debugger and tooling accesses.
    pub const DEBUGGER: Self = Self(0xFFFF);
}

/// Immutable description of one bus operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BusAccess {
    /// Target address.
    pub address: u32,
    /// Value to store for writes; ignored for reads.
    pub value: u32,
    /// Access width.
    pub width: AccessWidth,
    /// How the device observes the access.
    pub mode: AccessMode,
    /// Why the access is issued.
    pub intent: AccessIntent,
    /// Issuing bus master.
    pub source_id: SourceId,
    /// Cycle stamp at issue time.
    pub cycle: u64,
    /// Modifier bits.
    pub flags: AccessFlags,
}

impl BusAccess {
    /// Builds a read-style access (`value` is zero).
    #[must_use]
    pub const fn read(address: u32, width: AccessWidth, intent: AccessIntent) -> Self {
        Self {
            address,
            value: 0,
            width,
            mode: AccessMode::Atomic,
            intent,
            source_id: SourceId::CPU,
            cycle: 0,
            flags: AccessFlags::NONE,
        }
    }

    /// Builds a write-style access; `value` is truncated to `width`.
    #[must_use]
    pub const fn write(address: u32, width: AccessWidth, value: u32, intent: AccessIntent) -> Self {
        Self {
            address,
            value: value & width.value_mask(),
            width,
            mode: AccessMode::Atomic,
            intent,
            source_id: SourceId::CPU,
            cycle: 0,
            flags: AccessFlags::NONE,
        }
    }

    /// Returns the access with `flags` added.
    #[must_use]
    pub const fn with_flags(mut self, flags: AccessFlags) -> Self {
        self.flags = self.flags.union(flags);
        self
    }

    /// Returns the access issued by `source_id`.
    #[must_use]
    pub const fn from_source(mut self, source_id: SourceId) -> Self {
        self.source_id = source_id;
        self
    }

    /// Returns the access stamped with `cycle`.
    #[must_use]
    pub const fn at_cycle(mut self, cycle: u64) -> Self {
        self.cycle = cycle;
        self
    }

    /// Returns `true` when devices may observe side effects of this access.
    #[must_use]
    pub const fn side_effects_allowed(&self) -> bool {
        !self.intent.is_debug() && !self.flags.contains(AccessFlags::NO_SIDE_EFFECTS)
    }

    /// Returns `true` when multi-byte values are composed little-endian.
    #[must_use]
    pub const fn is_little_endian(&self) -> bool {
        self.flags.contains(AccessFlags::LITTLE_ENDIAN)
    }

    /// Bit shift of byte `index` inside a value of this access's width.
    #[must_use]
    pub const fn lane_shift(&self, index: u32) -> u32 {
        if self.is_little_endian() {
            index * 8
        } else {
            (self.width.bytes() - 1 - index) * 8
        }
    }

    /// Builds the byte sub-access for lane `index` of this access.
    ///
    /// Addresses wrap at the 32-bit boundary; the bus masks them to its
    /// own address width.
    #[must_use]
    pub const fn byte_lane(&self, index: u32) -> Self {
        let value = if self.intent.is_write() {
            (self.value >> self.lane_shift(index)) & 0xFF
        } else {
            0
        };
        Self {
            address: self.address.wrapping_add(index),
            value,
            width: AccessWidth::Byte,
            mode: AccessMode::Decomposed,
            intent: self.intent,
            source_id: self.source_id,
            cycle: self.cycle,
            flags: self.flags,
        }
    }

    /// Places `byte` into lane `index` of an accumulated wide value.
    #[must_use]
    pub const fn merge_lane(&self, accumulated: u32, index: u32, byte: u8) -> u32 {
        accumulated | ((byte as u32) << self.lane_shift(index))
    }
}
