//! Wired-OR control lines.
//!
//! Each line keeps the set of devices currently pulling it. A line reads
//! asserted while that set is non-empty. NMI additionally latches a one-shot
//! edge on every low to high transition.

use std::collections::BTreeSet;

use tracing::trace;

use crate::trace::{emit, SharedTraceSink, TraceEvent};
use crate::DeviceId;

/// CPU control lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum SignalLine {
    /// Maskable interrupt request.
    Irq,
    /// Non-maskable interrupt, edge-sensitive.
    Nmi,
    /// System reset.
    Reset,
    /// Ready; asserted to stall the CPU.
    Rdy,
    /// DMA bus request.
    DmaRequest,
    /// Instruction-fetch sync.
    Sync,
}

impl SignalLine {
    /// Every line, in index order.
    pub const ALL: [Self; 6] = [
        Self::Irq,
        Self::Nmi,
        Self::Reset,
        Self::Rdy,
        Self::DmaRequest,
        Self::Sync,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Irq => 0,
            Self::Nmi => 1,
            Self::Reset => 2,
            Self::Rdy => 3,
            Self::DmaRequest => 4,
            Self::Sync => 5,
        }
    }
}

/// Control-line state for one machine.
#[derive(Default)]
pub struct SignalAggregator {
    asserters: [BTreeSet<DeviceId>; SignalLine::ALL.len()],
    nmi_edge: bool,
    trace: Option<SharedTraceSink>,
}

impl std::fmt::Debug for SignalAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalAggregator")
            .field("asserters", &self.asserters)
            .field("nmi_edge", &self.nmi_edge)
            .finish_non_exhaustive()
    }
}

impl SignalAggregator {
    /// Creates an aggregator with every line released.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches or detaches the trace sink notified on level changes.
    pub fn set_trace_sink(&mut self, sink: Option<SharedTraceSink>) {
        self.trace = sink;
    }

    /// Records that `device` pulls `line`.
    ///
    /// Returns `true` when the aggregate level changed.
    pub fn assert(&mut self, line: SignalLine, device: DeviceId) -> bool {
        let set = &mut self.asserters[line.index()];
        let was_asserted = !set.is_empty();
        set.insert(device);
        if was_asserted {
            return false;
        }
        if line == SignalLine::Nmi {
            self.nmi_edge = true;
        }
        self.changed(line, true);
        true
    }

    /// Records that `device` released `line`.
    ///
    /// Releasing a line the device never pulled is a no-op. Returns `true`
    /// when the aggregate level changed.
    pub fn deassert(&mut self, line: SignalLine, device: DeviceId) -> bool {
        let set = &mut self.asserters[line.index()];
        if !set.remove(&device) || !set.is_empty() {
            return false;
        }
        self.changed(line, false);
        true
    }

    /// Returns `true` while at least one device pulls `line`.
    #[must_use]
    pub fn is_asserted(&self, line: SignalLine) -> bool {
        !self.asserters[line.index()].is_empty()
    }

    /// Devices currently pulling `line`, in id order.
    pub fn asserters(&self, line: SignalLine) -> impl Iterator<Item = DeviceId> + '_ {
        self.asserters[line.index()].iter().copied()
    }

    /// Returns `true` once per NMI low to high transition.
    pub fn consume_nmi_edge(&mut self) -> bool {
        std::mem::take(&mut self.nmi_edge)
    }

    /// Returns `true` when an NMI edge is waiting to be consumed.
    #[must_use]
    pub const fn nmi_edge_pending(&self) -> bool {
        self.nmi_edge
    }

    /// Releases every line and drops a pending NMI edge.
    ///
    /// Lines that were asserted report their release to the trace sink.
    pub fn reset(&mut self) {
        for line in SignalLine::ALL {
            let set = &mut self.asserters[line.index()];
            if set.is_empty() {
                continue;
            }
            set.clear();
            self.changed(line, false);
        }
        self.nmi_edge = false;
    }

    fn changed(&self, line: SignalLine, asserted: bool) {
        trace!(?line, asserted, "signal level");
        emit(
            self.trace.as_ref(),
            TraceEvent::SignalChanged { line, asserted },
        );
    }
}
