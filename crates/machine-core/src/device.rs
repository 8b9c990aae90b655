//! Device-target contract shared by RAM, ROM, composite pages and cards.

use crate::{BusAccess, DeviceError};

/// Stable identifier for a device, used for fault attribution and signal lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DeviceId(pub u16);

/// Capability flags a target advertises to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct DeviceCapabilities {
    /// Target implements native 16/32-bit accessors.
    pub wide: bool,
    /// Target answers side-effect-free peeks and pokes.
    pub peek: bool,
    /// Reads or writes change device state beyond the stored byte.
    pub side_effects: bool,
    /// Target behaviour depends on the cycle stamp of the access.
    pub timing_sensitive: bool,
}

impl DeviceCapabilities {
    /// Plain storage: wide, peekable, no side effects.
    pub const MEMORY: Self = Self {
        wide: true,
        peek: true,
        side_effects: false,
        timing_sensitive: false,
    };

    /// Register-style I/O: byte-only with side effects.
    pub const IO: Self = Self {
        wide: false,
        peek: false,
        side_effects: true,
        timing_sensitive: true,
    };
}

/// Result of a single device access.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Addressable device seam.
///
/// `offset` is the page-relative offset plus the page's physical base, so one
/// target mapped over several pages sees a contiguous offset space. Only the
/// 8-bit accessors are required; wide accessors default to sequential byte
/// cycles composed with the access's endianness.
///
/// Implementations must not reach back into the bus that dispatched them: the
/// page table is borrowed mutably for the whole dispatch.
pub trait DeviceTarget {
    /// Capabilities advertised to the bus.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] when the device rejects the access.
    fn read8(&mut self, offset: u32, access: &BusAccess) -> DeviceResult<u8>;

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] when the device rejects the access.
    fn write8(&mut self, offset: u32, value: u8, access: &BusAccess) -> DeviceResult<()>;

    /// Reads a 16-bit value.
    ///
    /// # Errors
    ///
    /// Returns the first byte-cycle rejection.
    #[allow(clippy::cast_possible_truncation)]
    fn read16(&mut self, offset: u32, access: &BusAccess) -> DeviceResult<u16> {
        read_bytes(self, offset, access).map(|value| value as u16)
    }

    /// Writes a 16-bit value.
    ///
    /// # Errors
    ///
    /// Returns the first byte-cycle rejection.
    fn write16(&mut self, offset: u32, value: u16, access: &BusAccess) -> DeviceResult<()> {
        let mut access = *access;
        access.value = u32::from(value);
        write_bytes(self, offset, &access)
    }

    /// Reads a 32-bit value.
    ///
    /// # Errors
    ///
    /// Returns the first byte-cycle rejection.
    fn read32(&mut self, offset: u32, access: &BusAccess) -> DeviceResult<u32> {
        read_bytes(self, offset, access)
    }

    /// Writes a 32-bit value.
    ///
    /// # Errors
    ///
    /// Returns the first byte-cycle rejection.
    fn write32(&mut self, offset: u32, value: u32, access: &BusAccess) -> DeviceResult<()> {
        let mut access = *access;
        access.value = value;
        write_bytes(self, offset, &access)
    }

    /// Side-effect-free read; `None` means "not driven", and the bus falls
    /// back to the floating-bus value.
    fn peek8(&self, _offset: u32) -> Option<u8> {
        None
    }

    /// Side-effect-free write; returns `false` when the target ignores it.
    fn poke8(&mut self, _offset: u32, _value: u8) -> bool {
        false
    }

    /// Returns the device to its power-on state.
    fn reset(&mut self) {}
}

fn read_bytes<T: DeviceTarget + ?Sized>(
    target: &mut T,
    offset: u32,
    access: &BusAccess,
) -> DeviceResult<u32> {
    let mut value = 0;
    for index in 0..access.width.bytes() {
        let lane = access.byte_lane(index);
        let byte = target.read8(offset.wrapping_add(index), &lane)?;
        value = access.merge_lane(value, index, byte);
    }
    Ok(value)
}

#[allow(clippy::cast_possible_truncation)]
fn write_bytes<T: DeviceTarget + ?Sized>(
    target: &mut T,
    offset: u32,
    access: &BusAccess,
) -> DeviceResult<()> {
    for index in 0..access.width.bytes() {
        let lane = access.byte_lane(index);
        target.write8(offset.wrapping_add(index), lane.value as u8, &lane)?;
    }
    Ok(())
}
