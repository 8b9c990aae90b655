//! Bus diagnostics counters.

use crate::{BusFault, FaultKind};

/// Saturating counters maintained by the memory bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusDiagnostics {
    /// The most recent fault, if any.
    pub last_fault: Option<BusFault>,
    /// Completed accesses on the fault-returning path.
    pub access_count: u32,
    /// Completed accesses that reached the device as byte cycles.
    pub decomposed_count: u32,
    /// Reads answered by the floating-bus fallback.
    pub floating_read_count: u32,
    /// Completed accesses a trap handler answered instead of a target.
    pub trapped_count: u32,
    /// Saturating counter for unmapped-page faults.
    pub fault_count_unmapped: u16,
    /// Saturating counter for permission faults.
    pub fault_count_permission: u16,
    /// Saturating counter for no-execute faults.
    pub fault_count_nx: u16,
    /// Saturating counter for alignment faults.
    pub fault_count_misaligned: u16,
    /// Saturating counter for device-reported faults.
    pub fault_count_device: u16,
}

impl BusDiagnostics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fault, updating the last fault and its kind counter.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_fault(&mut self, fault: BusFault) {
        self.last_fault = Some(fault);
        let counter = match fault.kind {
            FaultKind::Unmapped => &mut self.fault_count_unmapped,
            FaultKind::Permission => &mut self.fault_count_permission,
            FaultKind::Nx => &mut self.fault_count_nx,
            FaultKind::Misaligned => &mut self.fault_count_misaligned,
            FaultKind::DeviceFault => &mut self.fault_count_device,
        };
        *counter = counter.saturating_add(1);
    }

    /// Records a completed access.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_access(&mut self, decomposed: bool) {
        self.access_count = self.access_count.saturating_add(1);
        if decomposed {
            self.decomposed_count = self.decomposed_count.saturating_add(1);
        }
    }

    /// Records a read answered by the floating bus.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_floating_read(&mut self) {
        self.floating_read_count = self.floating_read_count.saturating_add(1);
    }

    /// Records an access completed by a trap handler.
    #[allow(clippy::missing_const_for_fn)]
    pub fn record_trapped(&mut self) {
        self.trapped_count = self.trapped_count.saturating_add(1);
    }

    /// Returns the counter for `kind`.
    #[must_use]
    pub const fn fault_count(&self, kind: FaultKind) -> u16 {
        match kind {
            FaultKind::Unmapped => self.fault_count_unmapped,
            FaultKind::Permission => self.fault_count_permission,
            FaultKind::Nx => self.fault_count_nx,
            FaultKind::Misaligned => self.fault_count_misaligned,
            FaultKind::DeviceFault => self.fault_count_device,
        }
    }

    /// Resets all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::BusDiagnostics;
    use crate::{AccessIntent, AccessWidth, BusAccess, BusFault, FaultKind};

    fn unmapped() -> BusFault {
        BusFault::unmapped(&BusAccess::read(0x10, AccessWidth::Byte, AccessIntent::DataRead))
    }

    #[test]
    fn record_fault_updates_last_and_counter() {
        let mut diag = BusDiagnostics::new();
        diag.record_fault(unmapped());
        assert_eq!(diag.fault_count(FaultKind::Unmapped), 1);
        assert_eq!(diag.fault_count(FaultKind::Nx), 0);
        assert_eq!(diag.last_fault, Some(unmapped()));
    }

    #[test]
    fn record_fault_saturates_at_max() {
        let mut diag = BusDiagnostics::new();
        for _ in 0..0x20000 {
            diag.record_fault(unmapped());
        }
        assert_eq!(diag.fault_count_unmapped, u16::MAX);
    }

    #[test]
    fn access_counters_track_decomposition() {
        let mut diag = BusDiagnostics::new();
        diag.record_access(false);
        diag.record_access(true);
        diag.record_floating_read();
        diag.record_trapped();
        assert_eq!(diag.access_count, 2);
        assert_eq!(diag.trapped_count, 1);
        assert_eq!(diag.decomposed_count, 1);
        assert_eq!(diag.floating_read_count, 1);
        diag.reset();
        assert_eq!(diag, BusDiagnostics::default());
    }
}
