//! Flat page table: one optional entry per fixed-size page.

use std::ops::BitOr;

use thiserror::Error;

use crate::{AccessIntent, DeviceCapabilities, DeviceId};

/// Smallest supported page shift (256-byte pages).
pub const MIN_PAGE_SHIFT: u8 = 8;
/// Largest supported address width in bits.
pub const MAX_ADDRESS_BITS: u8 = 32;
/// Largest page table the bus will allocate, in entries.
pub const MAX_PAGE_COUNT: usize = 1 << 20;

/// Read/write/execute permission bits for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Permissions(u8);

impl Permissions {
    /// No access.
    pub const NONE: Self = Self(0);
    /// Readable.
    pub const READ: Self = Self(1 << 0);
    /// Writable.
    pub const WRITE: Self = Self(1 << 1);
    /// Executable.
    pub const EXECUTE: Self = Self(1 << 2);
    /// Read/write data.
    pub const RW: Self = Self(0b011);
    /// Read/execute code.
    pub const RX: Self = Self(0b101);
    /// Full access.
    pub const RWX: Self = Self(0b111);

    /// Returns `true` when every bit of `other` is granted.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` when the page is readable.
    #[must_use]
    pub const fn readable(self) -> bool {
        self.contains(Self::READ)
    }

    /// Returns `true` when the page is writable.
    #[must_use]
    pub const fn writable(self) -> bool {
        self.contains(Self::WRITE)
    }

    /// Returns `true` when the page is executable.
    #[must_use]
    pub const fn executable(self) -> bool {
        self.contains(Self::EXECUTE)
    }

    /// Returns `true` when the read/write direction of `intent` is granted.
    ///
    /// Execute permission is a separate policy step and is not checked here.
    #[must_use]
    pub const fn allows(self, intent: AccessIntent) -> bool {
        if intent.is_write() {
            self.writable()
        } else {
            self.readable()
        }
    }
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Coarse classification of what a page holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RegionTag {
    /// Main memory.
    Ram,
    /// Firmware.
    Rom,
    /// Composite I/O page or register block.
    Io,
    /// Bank-switched expansion memory.
    Expansion,
    /// Machine-defined tag.
    Custom(u16),
}

/// Index of a target registered with a [`MemoryBus`](crate::MemoryBus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TargetId(pub(crate) usize);

impl TargetId {
    /// Returns the arena slot of this target.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Routing record for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PageEntry {
    /// Device credited with accesses and faults on this page.
    pub device: DeviceId,
    /// Region classification.
    pub region: RegionTag,
    /// Access permissions.
    pub permissions: Permissions,
    /// Capabilities of the target, captured at map time.
    pub capabilities: DeviceCapabilities,
    /// Target receiving dispatched accesses.
    pub target: TargetId,
    /// Offset added to the in-page offset before dispatch.
    pub physical_base: u32,
}

impl PageEntry {
    /// Returns the entry with a different physical base.
    #[must_use]
    pub const fn with_physical_base(mut self, physical_base: u32) -> Self {
        self.physical_base = physical_base;
        self
    }

    /// Returns the entry with different permissions.
    #[must_use]
    pub const fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }
}

/// Page-table configuration and mapping errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum MapError {
    /// Page shift or address width is outside the supported range.
    #[error("unsupported geometry: {address_bits}-bit address with {page_shift}-bit pages")]
    InvalidGeometry {
        /// Requested address width.
        address_bits: u8,
        /// Requested page shift.
        page_shift: u8,
    },
    /// The page index is outside the table.
    #[error("page index {index} out of range (table has {page_count} pages)")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of pages in the table.
        page_count: usize,
    },
    /// The target id was not issued by this bus.
    #[error("unknown target {0:?}")]
    UnknownTarget(TargetId),
    /// A range operation covered zero pages.
    #[error("empty page range")]
    EmptyRange,
    /// Remapping requires an existing entry.
    #[error("page {0} is not mapped")]
    NotMapped(usize),
}

/// Validates bus geometry without allocating.
///
/// # Errors
///
/// Returns [`MapError::InvalidGeometry`] when the page shift is below
/// [`MIN_PAGE_SHIFT`], not smaller than the address width, or the table would
/// exceed [`MAX_PAGE_COUNT`] entries.
pub const fn check_geometry(address_bits: u8, page_shift: u8) -> Result<usize, MapError> {
    let invalid = MapError::InvalidGeometry {
        address_bits,
        page_shift,
    };
    if address_bits == 0 || address_bits > MAX_ADDRESS_BITS {
        return Err(invalid);
    }
    if page_shift < MIN_PAGE_SHIFT || page_shift >= address_bits {
        return Err(invalid);
    }
    let page_count = 1usize << (address_bits - page_shift);
    if page_count > MAX_PAGE_COUNT {
        return Err(invalid);
    }
    Ok(page_count)
}

/// Flat page-indexed routing table.
#[derive(Debug, Clone)]
pub struct PageTable {
    entries: Box<[Option<PageEntry>]>,
    page_shift: u8,
    address_mask: u32,
}

impl PageTable {
    /// Allocates an empty table for the given geometry.
    ///
    /// # Errors
    ///
    /// See [`check_geometry`].
    pub fn new(address_bits: u8, page_shift: u8) -> Result<Self, MapError> {
        let page_count = check_geometry(address_bits, page_shift)?;
        let address_mask = if address_bits == MAX_ADDRESS_BITS {
            u32::MAX
        } else {
            (1u32 << address_bits) - 1
        };
        Ok(Self {
            entries: vec![None; page_count].into_boxed_slice(),
            page_shift,
            address_mask,
        })
    }

    /// Number of pages.
    #[must_use]
    pub const fn page_count(&self) -> usize {
        self.entries.len()
    }

    /// Page shift in bits.
    #[must_use]
    pub const fn page_shift(&self) -> u8 {
        self.page_shift
    }

    /// Page size in bytes.
    #[must_use]
    pub const fn page_size(&self) -> u32 {
        1 << self.page_shift
    }

    /// Mask applied to every address before indexing.
    #[must_use]
    pub const fn address_mask(&self) -> u32 {
        self.address_mask
    }

    /// Returns the page index for `address`; always within range.
    #[must_use]
    pub const fn index_of(&self, address: u32) -> usize {
        ((address & self.address_mask) >> self.page_shift) as usize
    }

    /// Returns the offset of `address` within its page.
    #[must_use]
    pub const fn offset_in_page(&self, address: u32) -> u32 {
        address & (self.page_size() - 1)
    }

    /// Returns the first address of page `index`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn base_of(&self, index: usize) -> u32 {
        (index as u32) << self.page_shift
    }

    /// Returns the entry covering `address`.
    #[must_use]
    pub fn entry_for(&self, address: u32) -> Option<&PageEntry> {
        self.entries[self.index_of(address)].as_ref()
    }

    /// Returns the entry at `index`, `None` when unmapped or out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PageEntry> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    /// Replaces the entry at `index` in one store.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::IndexOutOfRange`] for indices beyond the table.
    pub fn set(&mut self, index: usize, entry: Option<PageEntry>) -> Result<(), MapError> {
        let page_count = self.page_count();
        let slot = self
            .entries
            .get_mut(index)
            .ok_or(MapError::IndexOutOfRange { index, page_count })?;
        *slot = entry;
        Ok(())
    }

    /// Checks that `index..index + count` lies inside the table.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::EmptyRange`] or [`MapError::IndexOutOfRange`].
    pub fn check_range(&self, index: usize, count: usize) -> Result<(), MapError> {
        if count == 0 {
            return Err(MapError::EmptyRange);
        }
        let page_count = self.page_count();
        let last = index
            .checked_add(count - 1)
            .ok_or(MapError::IndexOutOfRange { index, page_count })?;
        if last >= page_count {
            return Err(MapError::IndexOutOfRange {
                index: last,
                page_count,
            });
        }
        Ok(())
    }

    /// Iterates over mapped pages as `(index, entry)`.
    pub fn mapped(&self) -> impl Iterator<Item = (usize, &PageEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|entry| (index, entry)))
    }
}
