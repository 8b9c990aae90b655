//! Floating-bus fallback sources.
//!
//! When nothing drives a read (debug peek of a side-effecting device, a
//! deselected expansion window, an empty slot) the value comes from a
//! pluggable source. Machines differ on what real hardware returns, so the
//! source is chosen by [`FloatingBusPolicy`].

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Source of the value returned when no device drives the bus.
pub trait FloatingBus {
    /// Value observed on an undriven read of `address`.
    fn value(&self, address: u32) -> u8;
}

/// Shared floating-bus source handed to the bus and composite pages.
pub type SharedFloatingBus = Rc<dyn FloatingBus>;

/// Always returns the same byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantFloatingBus(pub u8);

impl FloatingBus for ConstantFloatingBus {
    fn value(&self, _address: u32) -> u8 {
        self.0
    }
}

/// Returns the last byte some other subsystem drove onto the bus.
///
/// Clones share one latch; a video fetch unit holds one clone and calls
/// [`FloatingBusLatch::drive`], the bus holds another.
#[derive(Clone, Default)]
pub struct FloatingBusLatch(Rc<Cell<u8>>);

impl FloatingBusLatch {
    /// Creates a latch holding `initial`.
    #[must_use]
    pub fn new(initial: u8) -> Self {
        Self(Rc::new(Cell::new(initial)))
    }

    /// Records the byte most recently driven onto the bus.
    pub fn drive(&self, value: u8) {
        self.0.set(value);
    }

    /// Returns the latched byte.
    #[must_use]
    pub fn last(&self) -> u8 {
        self.0.get()
    }
}

impl fmt::Debug for FloatingBusLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FloatingBusLatch").field(&self.last()).finish()
    }
}

impl FloatingBus for FloatingBusLatch {
    fn value(&self, _address: u32) -> u8 {
        self.last()
    }
}

/// Selects the floating-bus source for a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FloatingBusPolicy {
    /// Fixed value, e.g. `0xFF` for pulled-up data lines.
    Constant(u8),
    /// Last value driven by another subsystem.
    Latched {
        /// Latch content before anything drives it.
        initial: u8,
    },
}

impl Default for FloatingBusPolicy {
    fn default() -> Self {
        Self::Constant(0xFF)
    }
}

impl FloatingBusPolicy {
    /// Builds the shared source, plus the latch handle for latched policies.
    #[must_use]
    pub fn instantiate(self) -> (SharedFloatingBus, Option<FloatingBusLatch>) {
        match self {
            Self::Constant(value) => (Rc::new(ConstantFloatingBus(value)), None),
            Self::Latched { initial } => {
                let latch = FloatingBusLatch::new(initial);
                (Rc::new(latch.clone()), Some(latch))
            }
        }
    }
}
