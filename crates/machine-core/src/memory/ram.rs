//! Plain storage targets.

use crate::{BusAccess, DeviceCapabilities, DeviceError, DeviceResult, DeviceTarget};

fn load<const N: usize>(bytes: &[u8], offset: u32) -> DeviceResult<[u8; N]> {
    let start = offset as usize;
    let end = start.checked_add(N).ok_or(DeviceError::Failed)?;
    bytes
        .get(start..end)
        .and_then(|window| window.try_into().ok())
        .ok_or(DeviceError::Failed)
}

fn store(bytes: &mut [u8], offset: u32, value: &[u8]) -> DeviceResult<()> {
    let start = offset as usize;
    let end = start.checked_add(value.len()).ok_or(DeviceError::Failed)?;
    bytes
        .get_mut(start..end)
        .ok_or(DeviceError::Failed)?
        .copy_from_slice(value);
    Ok(())
}

fn load16(bytes: &[u8], offset: u32, access: &BusAccess) -> DeviceResult<u16> {
    let raw = load::<2>(bytes, offset)?;
    Ok(if access.is_little_endian() {
        u16::from_le_bytes(raw)
    } else {
        u16::from_be_bytes(raw)
    })
}

fn load32(bytes: &[u8], offset: u32, access: &BusAccess) -> DeviceResult<u32> {
    let raw = load::<4>(bytes, offset)?;
    Ok(if access.is_little_endian() {
        u32::from_le_bytes(raw)
    } else {
        u32::from_be_bytes(raw)
    })
}

/// Read/write memory.
///
/// Offsets past the end of the backing store are reported as
/// [`DeviceError::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ram {
    bytes: Box<[u8]>,
}

impl Ram {
    /// Allocates `size` zeroed bytes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size].into_boxed_slice(),
        }
    }

    /// Wraps existing contents.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Size in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for zero-sized memory.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Backing store.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable backing store, for loaders.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl DeviceTarget for Ram {
    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::MEMORY
    }

    fn read8(&mut self, offset: u32, _access: &BusAccess) -> DeviceResult<u8> {
        self.peek8(offset).ok_or(DeviceError::Failed)
    }

    fn write8(&mut self, offset: u32, value: u8, _access: &BusAccess) -> DeviceResult<()> {
        store(&mut self.bytes, offset, &[value])
    }

    fn read16(&mut self, offset: u32, access: &BusAccess) -> DeviceResult<u16> {
        load16(&self.bytes, offset, access)
    }

    fn write16(&mut self, offset: u32, value: u16, access: &BusAccess) -> DeviceResult<()> {
        let raw = if access.is_little_endian() {
            value.to_le_bytes()
        } else {
            value.to_be_bytes()
        };
        store(&mut self.bytes, offset, &raw)
    }

    fn read32(&mut self, offset: u32, access: &BusAccess) -> DeviceResult<u32> {
        load32(&self.bytes, offset, access)
    }

    fn write32(&mut self, offset: u32, value: u32, access: &BusAccess) -> DeviceResult<()> {
        let raw = if access.is_little_endian() {
            value.to_le_bytes()
        } else {
            value.to_be_bytes()
        };
        store(&mut self.bytes, offset, &raw)
    }

    fn peek8(&self, offset: u32) -> Option<u8> {
        self.bytes.get(offset as usize).copied()
    }

    fn poke8(&mut self, offset: u32, value: u8) -> bool {
        store(&mut self.bytes, offset, &[value]).is_ok()
    }
}

/// Read-only memory.
///
/// Bus writes are rejected with [`DeviceError::ReadOnly`]; debugger pokes
/// still patch the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rom {
    bytes: Box<[u8]>,
}

impl Rom {
    /// Wraps a ROM image.
    #[must_use]
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Size in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for an empty image.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// ROM image.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl DeviceTarget for Rom {
    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::MEMORY
    }

    fn read8(&mut self, offset: u32, _access: &BusAccess) -> DeviceResult<u8> {
        self.peek8(offset).ok_or(DeviceError::Failed)
    }

    fn write8(&mut self, _offset: u32, _value: u8, _access: &BusAccess) -> DeviceResult<()> {
        Err(DeviceError::ReadOnly)
    }

    fn read16(&mut self, offset: u32, access: &BusAccess) -> DeviceResult<u16> {
        load16(&self.bytes, offset, access)
    }

    fn write16(&mut self, _offset: u32, _value: u16, _access: &BusAccess) -> DeviceResult<()> {
        Err(DeviceError::ReadOnly)
    }

    fn read32(&mut self, offset: u32, access: &BusAccess) -> DeviceResult<u32> {
        load32(&self.bytes, offset, access)
    }

    fn write32(&mut self, _offset: u32, _value: u32, _access: &BusAccess) -> DeviceResult<()> {
        Err(DeviceError::ReadOnly)
    }

    fn peek8(&self, offset: u32) -> Option<u8> {
        self.bytes.get(offset as usize).copied()
    }

    fn poke8(&mut self, offset: u32, value: u8) -> bool {
        store(&mut self.bytes, offset, &[value]).is_ok()
    }
}
