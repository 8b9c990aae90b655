use thiserror::Error;

use crate::{AccessIntent, BusAccess, DeviceId, RegionTag, SourceId};

/// Fault classes used for diagnostics aggregation and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// No device answers for the address.
    Addressing,
    /// Page permissions or execute policy rejected the access.
    Protection,
    /// The resolved device rejected or failed the access.
    Device,
}

/// Stable bus fault taxonomy.
///
/// A successful access has no fault kind at all: it is the `Ok` arm of a
/// [`BusResult`](crate::BusResult).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum FaultKind {
    /// No page-table entry covers the address.
    #[error("access to unmapped page")]
    Unmapped = 0x01,
    /// The page does not grant read or write permission for the intent.
    #[error("access denied by page permissions")]
    Permission = 0x02,
    /// Instruction fetch from a page without execute permission.
    #[error("instruction fetch from non-executable page")]
    Nx = 0x03,
    /// Wide access violated alignment policy.
    #[error("misaligned wide access")]
    Misaligned = 0x04,
    /// The resolved device reported a failure.
    #[error("device rejected the access")]
    DeviceFault = 0x05,
}

impl FaultKind {
    /// Converts a fault kind to its stable wire code.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable wire code back into a fault kind.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Unmapped),
            0x02 => Some(Self::Permission),
            0x03 => Some(Self::Nx),
            0x04 => Some(Self::Misaligned),
            0x05 => Some(Self::DeviceFault),
            _ => None,
        }
    }

    /// Returns the diagnostics class for this fault kind.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::Unmapped => FaultClass::Addressing,
            Self::Permission | Self::Nx | Self::Misaligned => FaultClass::Protection,
            Self::DeviceFault => FaultClass::Device,
        }
    }
}

/// Rejection reported by a device target for a single access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum DeviceError {
    /// The addressed sub-region does not accept writes.
    #[error("target is read-only")]
    ReadOnly,
    /// The target only accepts naturally aligned wide accesses.
    #[error("target requires aligned access")]
    Misaligned,
    /// The device is in a state where it cannot complete the access.
    #[error("device reported a failure")]
    Failed,
}

impl DeviceError {
    /// Maps a device rejection to the bus fault kind reported to the caller.
    #[must_use]
    pub const fn fault_kind(self) -> FaultKind {
        match self {
            Self::ReadOnly => FaultKind::Permission,
            Self::Misaligned => FaultKind::Misaligned,
            Self::Failed => FaultKind::DeviceFault,
        }
    }
}

/// Fully described bus fault.
///
/// Faults are plain values; the bus never retries or repairs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[error("{kind} at {address:#x} ({width_bits}-bit {intent:?})")]
pub struct BusFault {
    /// Fault classification.
    pub kind: FaultKind,
    /// Address of the byte (or wide access) that faulted.
    pub address: u32,
    /// Width of the originating access in bits.
    pub width_bits: u8,
    /// Intent of the originating access.
    pub intent: AccessIntent,
    /// Bus master that issued the access.
    pub source_id: SourceId,
    /// Device owning the faulting page, `None` when unmapped.
    pub device: Option<DeviceId>,
    /// Region tag of the faulting page, `None` when unmapped.
    pub region: Option<RegionTag>,
    /// Cycle stamp carried by the originating access.
    pub cycle: u64,
    /// Cycles already consumed by completed sub-accesses before the fault.
    pub cycles: u32,
}

impl BusFault {
    /// Builds an [`FaultKind::Unmapped`] fault for `access`.
    #[must_use]
    pub const fn unmapped(access: &BusAccess) -> Self {
        Self {
            kind: FaultKind::Unmapped,
            address: access.address,
            width_bits: access.width.bits(),
            intent: access.intent,
            source_id: access.source_id,
            device: None,
            region: None,
            cycle: access.cycle,
            cycles: 0,
        }
    }

    /// Builds a fault of `kind` raised by a mapped page owned by `device`.
    #[must_use]
    pub const fn mapped(
        kind: FaultKind,
        access: &BusAccess,
        device: DeviceId,
        region: RegionTag,
    ) -> Self {
        Self {
            kind,
            address: access.address,
            width_bits: access.width.bits(),
            intent: access.intent,
            source_id: access.source_id,
            device: Some(device),
            region: Some(region),
            cycle: access.cycle,
            cycles: 0,
        }
    }

    /// Returns the fault re-attributed to a wider originating access.
    ///
    /// Used when a decomposed byte faults: the address stays on the faulting
    /// byte while width and consumed cycles describe the whole access.
    #[must_use]
    pub const fn within(mut self, origin: &BusAccess, cycles: u32) -> Self {
        self.width_bits = origin.width.bits();
        self.cycles = cycles;
        self
    }

    /// Returns `true` when device attribution agrees with the fault kind.
    #[must_use]
    pub const fn is_well_formed(&self) -> bool {
        match self.kind {
            FaultKind::Unmapped => self.device.is_none() && self.region.is_none(),
            _ => self.device.is_some() && self.region.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BusFault, DeviceError, FaultClass, FaultKind};
    use crate::{AccessIntent, AccessWidth, BusAccess, DeviceId, RegionTag};

    #[test]
    fn stable_code_roundtrip_is_bijective_for_defined_values() {
        for code in 0x01u8..=0x05 {
            let kind = FaultKind::from_u8(code).expect("defined taxonomy code");
            assert_eq!(kind.as_u8(), code);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(FaultKind::from_u8(0x00).is_none());
        assert!(FaultKind::from_u8(0x06).is_none());
    }

    #[test]
    fn class_mapping_matches_fault_taxonomy() {
        assert_eq!(FaultKind::Unmapped.class(), FaultClass::Addressing);
        assert_eq!(FaultKind::Permission.class(), FaultClass::Protection);
        assert_eq!(FaultKind::Nx.class(), FaultClass::Protection);
        assert_eq!(FaultKind::Misaligned.class(), FaultClass::Protection);
        assert_eq!(FaultKind::DeviceFault.class(), FaultClass::Device);
    }

    #[test]
    fn device_errors_map_to_bus_fault_kinds() {
        assert_eq!(DeviceError::ReadOnly.fault_kind(), FaultKind::Permission);
        assert_eq!(DeviceError::Misaligned.fault_kind(), FaultKind::Misaligned);
        assert_eq!(DeviceError::Failed.fault_kind(), FaultKind::DeviceFault);
    }

    #[test]
    fn constructed_faults_are_well_formed() {
        let access = BusAccess::read(0x1234, AccessWidth::Byte, AccessIntent::DataRead);
        let unmapped = BusFault::unmapped(&access);
        assert!(unmapped.is_well_formed());
        assert_eq!(unmapped.device, None);

        let denied = BusFault::mapped(
            FaultKind::Permission,
            &access,
            DeviceId(3),
            RegionTag::Rom,
        );
        assert!(denied.is_well_formed());
        assert_eq!(denied.device, Some(DeviceId(3)));
    }

    #[test]
    fn within_keeps_faulting_byte_address() {
        let wide = BusAccess::read(0x0FFF, AccessWidth::Word, AccessIntent::DataRead);
        let byte = wide.byte_lane(1);
        let fault = BusFault::unmapped(&byte).within(&wide, 1);
        assert_eq!(fault.address, 0x1000);
        assert_eq!(fault.width_bits, 16);
        assert_eq!(fault.cycles, 1);
    }

    #[test]
    fn display_names_kind_and_address() {
        let access = BusAccess::read(0xC0DE, AccessWidth::Byte, AccessIntent::InstructionFetch);
        let text = BusFault::unmapped(&access).to_string();
        assert!(text.contains("unmapped"));
        assert!(text.contains("0xc0de"));
    }
}
