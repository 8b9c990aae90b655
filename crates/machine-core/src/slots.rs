//! Peripheral slots and the shared expansion-ROM window owner.
//!
//! Slots `1..=slot_count` hold at most one card each. At most one card owns
//! the shared expansion window at any time; selecting another card hands the
//! window over without an explicit deselect.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::trace::{emit, SharedTraceSink, TraceEvent};
use crate::DeviceTarget;

/// Address sub-ranges a card may decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CardRegion {
    /// Per-slot register block.
    Io,
    /// Per-slot firmware window.
    Rom,
    /// Shared expansion window, visible only while the card owns it.
    ExpansionRom,
}

/// Contract for cards installed in a slot.
///
/// Every region is optional; a card without a region leaves it undriven and
/// reads fall back to the floating bus.
pub trait Peripheral {
    /// Short human-readable card name.
    fn name(&self) -> &str;

    /// Target decoding `region`, mutably.
    fn region_mut(&mut self, _region: CardRegion) -> Option<&mut dyn DeviceTarget> {
        None
    }

    /// Target decoding `region`, for side-effect-free peeks.
    fn region(&self, _region: CardRegion) -> Option<&dyn DeviceTarget> {
        None
    }

    /// Called once the card sits in `slot`.
    ///
    /// This is the only place a card learns its slot number; cards that
    /// decode slot-relative addresses keep it themselves. From outside,
    /// [`SlotEntry::slot`] reports where each card sits.
    fn on_installed(&mut self, _slot: u8) {}

    /// Called when the card takes over the shared expansion window.
    fn on_expansion_rom_selected(&mut self) {}

    /// Called when the card loses the shared expansion window.
    fn on_expansion_rom_deselected(&mut self) {}

    /// Returns the card to its power-on state.
    fn reset(&mut self) {}
}

/// Ownership state of the shared expansion window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ExpansionSelection {
    /// Nobody drives the window.
    #[default]
    Deselected,
    /// The card in this slot drives the window.
    Selected(u8),
}

impl ExpansionSelection {
    /// Owning slot, if any.
    #[must_use]
    pub const fn slot(self) -> Option<u8> {
        match self {
            Self::Deselected => None,
            Self::Selected(slot) => Some(slot),
        }
    }
}

/// Slot installation errors, reported at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum SlotError {
    /// The slot number is outside `1..=max`.
    #[error("slot {slot} outside 1..={max}")]
    OutOfRange {
        /// Requested slot.
        slot: u8,
        /// Highest valid slot.
        max: u8,
    },
    /// The slot already holds a card.
    #[error("slot {0} is occupied")]
    Occupied(u8),
    /// The slot holds no card.
    #[error("slot {0} is empty")]
    Empty(u8),
}

/// One slot and its optional card.
pub struct SlotEntry {
    slot: u8,
    card: Option<Box<dyn Peripheral>>,
}

impl SlotEntry {
    /// Slot number.
    #[must_use]
    pub const fn slot(&self) -> u8 {
        self.slot
    }

    /// Installed card.
    #[must_use]
    pub fn card(&self) -> Option<&dyn Peripheral> {
        self.card.as_deref()
    }
}

impl fmt::Debug for SlotEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotEntry")
            .field("slot", &self.slot)
            .field("card", &self.card.as_ref().map(|card| card.name()))
            .finish()
    }
}

/// Slot manager shared between the composite I/O page, traps and the machine.
pub type SharedSlots = Rc<RefCell<SlotManager>>;

/// Owns installed cards and the expansion-window state machine.
pub struct SlotManager {
    slots: Vec<SlotEntry>,
    selection: ExpansionSelection,
    trace: Option<SharedTraceSink>,
}

impl fmt::Debug for SlotManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotManager")
            .field("slots", &self.slots)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

impl SlotManager {
    /// Creates `slot_count` empty slots, numbered from one.
    #[must_use]
    pub fn new(slot_count: u8) -> Self {
        Self {
            slots: (1..=slot_count)
                .map(|slot| SlotEntry { slot, card: None })
                .collect(),
            selection: ExpansionSelection::Deselected,
            trace: None,
        }
    }

    /// Wraps the manager for sharing.
    #[must_use]
    pub fn shared(self) -> SharedSlots {
        Rc::new(RefCell::new(self))
    }

    /// Attaches or detaches the trace sink.
    pub fn set_trace_sink(&mut self, sink: Option<SharedTraceSink>) {
        self.trace = sink;
    }

    /// Highest valid slot number.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn slot_count(&self) -> u8 {
        self.slots.len() as u8
    }

    /// All slots in ascending order.
    pub fn slots(&self) -> impl Iterator<Item = &SlotEntry> + '_ {
        self.slots.iter()
    }

    /// Installs `card` into `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::OutOfRange`] or [`SlotError::Occupied`]; the
    /// existing card stays in place.
    pub fn install(&mut self, slot: u8, mut card: Box<dyn Peripheral>) -> Result<(), SlotError> {
        let entry = self.entry_mut(slot)?;
        if entry.card.is_some() {
            return Err(SlotError::Occupied(slot));
        }
        card.on_installed(slot);
        debug!(slot, card = card.name(), "card installed");
        entry.card = Some(card);
        Ok(())
    }

    /// Removes and returns the card in `slot`, releasing the expansion
    /// window if the card owned it.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::OutOfRange`] or [`SlotError::Empty`].
    pub fn remove(&mut self, slot: u8) -> Result<Box<dyn Peripheral>, SlotError> {
        self.entry_mut(slot)?;
        if self.selection == ExpansionSelection::Selected(slot) {
            self.deselect_expansion_slot();
        }
        let card = self
            .entry_mut(slot)?
            .card
            .take()
            .ok_or(SlotError::Empty(slot))?;
        debug!(slot, card = card.name(), "card removed");
        Ok(card)
    }

    /// Card in `slot`.
    #[must_use]
    pub fn card(&self, slot: u8) -> Option<&dyn Peripheral> {
        self.entry(slot).ok().and_then(SlotEntry::card)
    }

    /// Card in `slot`, mutably.
    pub fn card_mut(&mut self, slot: u8) -> Option<&mut (dyn Peripheral + 'static)> {
        self.entry_mut(slot).ok().and_then(|entry| entry.card.as_deref_mut())
    }

    /// Returns `true` when `slot` holds a card.
    #[must_use]
    pub fn is_occupied(&self, slot: u8) -> bool {
        self.card(slot).is_some()
    }

    /// Current owner of the expansion window.
    #[must_use]
    pub const fn selection(&self) -> ExpansionSelection {
        self.selection
    }

    /// Slot owning the expansion window, if any.
    #[must_use]
    pub const fn active_expansion_slot(&self) -> Option<u8> {
        self.selection.slot()
    }

    /// Gives the expansion window to the card in `slot`.
    ///
    /// Any previous owner is notified and loses the window first. Selecting
    /// the current owner again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::OutOfRange`] or [`SlotError::Empty`].
    pub fn select_expansion_slot(&mut self, slot: u8) -> Result<(), SlotError> {
        if self.entry(slot)?.card.is_none() {
            return Err(SlotError::Empty(slot));
        }
        if self.selection == ExpansionSelection::Selected(slot) {
            return Ok(());
        }
        let previous = self.selection;
        if let Some(owner) = previous.slot() {
            if let Some(card) = self.card_mut(owner) {
                card.on_expansion_rom_deselected();
            }
        }
        if let Some(card) = self.card_mut(slot) {
            card.on_expansion_rom_selected();
        }
        self.transition(previous, ExpansionSelection::Selected(slot));
        Ok(())
    }

    /// Releases the expansion window; a no-op when nobody owns it.
    pub fn deselect_expansion_slot(&mut self) {
        let previous = self.selection;
        let Some(owner) = previous.slot() else {
            return;
        };
        if let Some(card) = self.card_mut(owner) {
            card.on_expansion_rom_deselected();
        }
        self.transition(previous, ExpansionSelection::Deselected);
    }

    /// Selects `slot` as a side effect of a snooped ROM access.
    ///
    /// Empty and out-of-range slots leave the selection unchanged. Returns
    /// `true` when `slot` owns the window afterwards.
    pub fn snoop_rom_access(&mut self, slot: u8) -> bool {
        self.select_expansion_slot(slot).is_ok()
    }

    /// Resets every installed card and releases the expansion window.
    pub fn reset(&mut self) {
        self.deselect_expansion_slot();
        for card in self.slots.iter_mut().filter_map(|entry| entry.card.as_mut()) {
            card.reset();
        }
        debug!(slots = self.slots.len(), "slots reset");
    }

    fn transition(&mut self, previous: ExpansionSelection, next: ExpansionSelection) {
        self.selection = next;
        trace!(previous = ?previous.slot(), current = ?next.slot(), "expansion window owner");
        emit(
            self.trace.as_ref(),
            TraceEvent::ExpansionSlotChanged {
                previous: previous.slot(),
                current: next.slot(),
            },
        );
    }

    fn index(&self, slot: u8) -> Result<usize, SlotError> {
        let max = self.slot_count();
        if slot == 0 || slot > max {
            return Err(SlotError::OutOfRange { slot, max });
        }
        Ok(usize::from(slot - 1))
    }

    fn entry(&self, slot: u8) -> Result<&SlotEntry, SlotError> {
        let index = self.index(slot)?;
        Ok(&self.slots[index])
    }

    fn entry_mut(&mut self, slot: u8) -> Result<&mut SlotEntry, SlotError> {
        let index = self.index(slot)?;
        Ok(&mut self.slots[index])
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{ExpansionSelection, Peripheral, SlotError, SlotManager};

    #[derive(Default)]
    struct Log {
        entries: Vec<String>,
    }

    struct Card {
        name: &'static str,
        log: Rc<RefCell<Log>>,
    }

    impl Card {
        fn boxed(name: &'static str, log: &Rc<RefCell<Log>>) -> Box<Self> {
            Box::new(Self {
                name,
                log: Rc::clone(log),
            })
        }

        fn note(&self, what: &str) {
            self.log
                .borrow_mut()
                .entries
                .push(format!("{}:{what}", self.name));
        }
    }

    impl Peripheral for Card {
        fn name(&self) -> &str {
            self.name
        }

        fn on_installed(&mut self, slot: u8) {
            self.note(&format!("installed{slot}"));
        }

        fn on_expansion_rom_selected(&mut self) {
            self.note("selected");
        }

        fn on_expansion_rom_deselected(&mut self) {
            self.note("deselected");
        }

        fn reset(&mut self) {
            self.note("reset");
        }
    }

    fn entries(log: &Rc<RefCell<Log>>) -> Vec<String> {
        std::mem::take(&mut log.borrow_mut().entries)
    }

    #[test]
    fn install_rejects_occupied_and_out_of_range_slots() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut slots = SlotManager::new(7);
        slots.install(6, Card::boxed("a", &log)).expect("empty slot");
        assert_eq!(
            slots.install(6, Card::boxed("b", &log)).err(),
            Some(SlotError::Occupied(6))
        );
        assert_eq!(slots.card(6).map(|card| card.name()), Some("a"));
        assert_eq!(
            slots.install(0, Card::boxed("c", &log)).err(),
            Some(SlotError::OutOfRange { slot: 0, max: 7 })
        );
        assert!(slots.install(8, Card::boxed("d", &log)).is_err());
        assert_eq!(entries(&log), ["a:installed6"]);
    }

    #[test]
    fn cards_learn_the_slot_their_entry_reports() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut slots = SlotManager::new(7);
        slots.install(3, Card::boxed("a", &log)).expect("empty slot");
        slots.install(7, Card::boxed("b", &log)).expect("empty slot");
        let occupied: Vec<_> = slots
            .slots()
            .filter_map(|entry| {
                let card = entry.card()?;
                Some(format!("{}:installed{}", card.name(), entry.slot()))
            })
            .collect();
        assert_eq!(entries(&log), occupied);
    }

    #[test]
    fn selecting_another_slot_hands_over_the_window() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut slots = SlotManager::new(7);
        slots.install(4, Card::boxed("four", &log)).expect("empty slot");
        slots.install(6, Card::boxed("six", &log)).expect("empty slot");
        entries(&log);

        slots.select_expansion_slot(4).expect("occupied");
        slots.select_expansion_slot(4).expect("occupied");
        slots.select_expansion_slot(6).expect("occupied");
        assert_eq!(slots.selection(), ExpansionSelection::Selected(6));
        assert_eq!(
            entries(&log),
            ["four:selected", "four:deselected", "six:selected"]
        );

        slots.deselect_expansion_slot();
        slots.deselect_expansion_slot();
        assert_eq!(slots.active_expansion_slot(), None);
        assert_eq!(entries(&log), ["six:deselected"]);
    }

    #[test]
    fn snooping_an_empty_slot_keeps_the_selection() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut slots = SlotManager::new(7);
        slots.install(2, Card::boxed("two", &log)).expect("empty slot");
        assert!(slots.snoop_rom_access(2));
        assert!(!slots.snoop_rom_access(3));
        assert!(!slots.snoop_rom_access(9));
        assert_eq!(slots.active_expansion_slot(), Some(2));
    }

    #[test]
    fn remove_releases_an_owned_window() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut slots = SlotManager::new(7);
        slots.install(5, Card::boxed("five", &log)).expect("empty slot");
        slots.select_expansion_slot(5).expect("occupied");
        let card = slots.remove(5).expect("occupied");
        assert_eq!(card.name(), "five");
        assert_eq!(slots.active_expansion_slot(), None);
        assert_eq!(slots.remove(5).err(), Some(SlotError::Empty(5)));
    }

    #[test]
    fn reset_cascades_and_deselects() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut slots = SlotManager::new(3);
        slots.install(1, Card::boxed("one", &log)).expect("empty slot");
        slots.install(3, Card::boxed("three", &log)).expect("empty slot");
        slots.select_expansion_slot(3).expect("occupied");
        entries(&log);

        slots.reset();
        assert_eq!(slots.selection(), ExpansionSelection::Deselected);
        assert_eq!(
            entries(&log),
            ["three:deselected", "one:reset", "three:reset"]
        );
    }
}
