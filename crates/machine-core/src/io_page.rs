//! Composite I/O page.
//!
//! One mapped page fans out to soft switches, per-slot register blocks,
//! per-slot ROM windows and a shared expansion window. Two access rules carry
//! the hardware behaviour software relies on:
//!
//! - any access to a card's ROM window selects that card's expansion window,
//!   before the access itself is resolved (a rejected ROM write still
//!   switches banks);
//! - any access to the sentinel offset releases the expansion window first.
//!
//! ROM overrides are consulted before either rule: a slot whose ROM is
//! replaced by built-in firmware never selects its card.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::slots::{CardRegion, SharedSlots, SlotManager};
use crate::{
    BusAccess, DeviceCapabilities, DeviceError, DeviceResult, DeviceTarget, SharedFloatingBus,
};

/// Offsets of the sub-regions inside the composite page.
///
/// Slot 0's register block belongs to the machine itself; slot ROM windows
/// exist for slots `1..=max_slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct IoPageLayout {
    /// End (exclusive) of the soft-switch block starting at offset zero.
    pub soft_switch_end: u32,
    /// Start of the per-slot register blocks.
    pub slot_io_base: u32,
    /// Size of one slot register block.
    pub slot_io_size: u32,
    /// Size of one slot ROM window; slot `n` starts at `n * slot_rom_size`.
    pub slot_rom_size: u32,
    /// Start of the shared expansion window.
    pub expansion_base: u32,
    /// End (exclusive) of the shared expansion window and of the page.
    pub expansion_end: u32,
    /// Offset whose access releases the expansion window.
    pub deselect_offset: u32,
    /// Highest slot number the layout decodes.
    pub max_slot: u8,
}

impl IoPageLayout {
    /// Layout of the classic 4 KiB slot I/O page.
    pub const CLASSIC: Self = Self {
        soft_switch_end: 0x080,
        slot_io_base: 0x080,
        slot_io_size: 0x10,
        slot_rom_size: 0x100,
        expansion_base: 0x800,
        expansion_end: 0x1000,
        deselect_offset: 0xFFF,
        max_slot: 7,
    };

    /// Bytes covered by the page.
    #[must_use]
    pub const fn span(self) -> u32 {
        self.expansion_end
    }

    /// Returns `true` when the sub-regions are contiguous, ordered and the
    /// sentinel lies inside the expansion window.
    #[must_use]
    pub const fn is_well_formed(self) -> bool {
        let slots = self.max_slot as u32 + 1;
        self.max_slot > 0
            && self.soft_switch_end == self.slot_io_base
            && self.slot_io_size > 0
            && self.slot_io_base + slots * self.slot_io_size == self.slot_rom_size
            && slots * self.slot_rom_size == self.expansion_base
            && self.expansion_base < self.expansion_end
            && self.deselect_offset >= self.expansion_base
            && self.deselect_offset < self.expansion_end
    }

    /// Classifies a page offset.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn classify(self, offset: u32) -> IoRegion {
        let slots = self.max_slot as u32 + 1;
        if offset < self.soft_switch_end {
            IoRegion::SoftSwitch(offset)
        } else if offset >= self.slot_io_base
            && offset < self.slot_io_base + slots * self.slot_io_size
        {
            let relative = offset - self.slot_io_base;
            IoRegion::SlotIo {
                slot: (relative / self.slot_io_size) as u8,
                offset: relative % self.slot_io_size,
            }
        } else if offset >= self.slot_rom_size && offset < self.expansion_base {
            IoRegion::SlotRom {
                slot: (offset / self.slot_rom_size) as u8,
                offset: offset % self.slot_rom_size,
            }
        } else if offset >= self.expansion_base && offset < self.expansion_end {
            IoRegion::Expansion(offset - self.expansion_base)
        } else {
            IoRegion::Unassigned
        }
    }
}

const _: () = assert_classic_layout();

const fn assert_classic_layout() {
    let layout = IoPageLayout::CLASSIC;
    assert!(layout.is_well_formed(), "classic layout must be contiguous");
    assert!(layout.span() == 0x1000, "classic page spans 4 KiB");
    assert!(
        matches!(layout.classify(0x07F), IoRegion::SoftSwitch(0x7F)),
        "soft switches end below slot registers"
    );
    assert!(
        matches!(layout.classify(0x0E5), IoRegion::SlotIo { slot: 6, offset: 5 }),
        "slot 6 registers start at 0x0E0"
    );
    assert!(
        matches!(layout.classify(0x600), IoRegion::SlotRom { slot: 6, offset: 0 }),
        "slot 6 ROM starts at 0x600"
    );
    assert!(
        matches!(layout.classify(0xFFF), IoRegion::Expansion(0x7FF)),
        "sentinel is the last expansion byte"
    );
}

/// Sub-region an offset falls in; carried offsets are region-relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoRegion {
    /// Machine soft switches.
    SoftSwitch(u32),
    /// Register block of a slot; slot 0 is built in.
    SlotIo {
        /// Slot number.
        slot: u8,
        /// Offset inside the block.
        offset: u32,
    },
    /// ROM window of a slot.
    SlotRom {
        /// Slot number.
        slot: u8,
        /// Offset inside the window.
        offset: u32,
    },
    /// Shared expansion window.
    Expansion(u32),
    /// Past the end of the layout.
    Unassigned,
}

/// Built-in firmware overrides for card ROM windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RomOverrides {
    /// Built-in firmware replaces every slot ROM and the expansion window.
    pub internal_all: bool,
    /// Bit `n` set: built-in firmware replaces slot `n`'s ROM window.
    pub internal_slot_mask: u16,
}

impl RomOverrides {
    /// Returns `true` when slot `slot`'s ROM window shows built-in firmware.
    #[must_use]
    pub const fn internal_for_slot(self, slot: u8) -> bool {
        if self.internal_all {
            return true;
        }
        match 1u16.checked_shl(slot as u32) {
            Some(bit) => self.internal_slot_mask & bit != 0,
            None => false,
        }
    }
}

/// Shared handle to the override switches of one I/O page.
///
/// Soft-switch devices hold a clone and flip it on their own writes.
#[derive(Debug, Clone, Default)]
pub struct RomOverrideSwitch(Rc<Cell<RomOverrides>>);

impl RomOverrideSwitch {
    /// Current overrides.
    #[must_use]
    pub fn get(&self) -> RomOverrides {
        self.0.get()
    }

    /// Replaces all overrides.
    pub fn set(&self, overrides: RomOverrides) {
        self.0.set(overrides);
    }

    /// Routes every slot ROM and the expansion window to built-in firmware.
    pub fn set_internal_all(&self, enabled: bool) {
        let mut overrides = self.get();
        overrides.internal_all = enabled;
        self.set(overrides);
    }

    /// Routes one slot's ROM window to built-in firmware.
    pub fn set_internal_slot(&self, slot: u8, enabled: bool) {
        let Some(bit) = 1u16.checked_shl(u32::from(slot)) else {
            return;
        };
        let mut overrides = self.get();
        if enabled {
            overrides.internal_slot_mask |= bit;
        } else {
            overrides.internal_slot_mask &= !bit;
        }
        self.set(overrides);
    }
}

/// Expansion-window change caused by one access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionEffect {
    /// The access does not touch selection.
    None,
    /// The sentinel released the window.
    Deselected,
    /// A ROM-window access selected this slot.
    Selected(u8),
}

/// Applies the selection side effect of touching page `offset`.
///
/// This is the single implementation used by real accesses and by trap
/// handlers replaying a bypassed access.
pub fn apply_selection(
    layout: IoPageLayout,
    overrides: RomOverrides,
    offset: u32,
    slots: &mut SlotManager,
) -> SelectionEffect {
    match layout.classify(offset) {
        IoRegion::Expansion(_) if offset == layout.deselect_offset => {
            slots.deselect_expansion_slot();
            SelectionEffect::Deselected
        }
        IoRegion::SlotRom { slot, .. }
            if !overrides.internal_for_slot(slot) && slots.snoop_rom_access(slot) =>
        {
            SelectionEffect::Selected(slot)
        }
        _ => SelectionEffect::None,
    }
}

/// Placement of an I/O page on the bus, for code that replays its side
/// effects from outside the page.
#[derive(Debug, Clone)]
pub struct IoWindow {
    /// Bus address of offset zero.
    pub base: u32,
    /// Sub-region layout.
    pub layout: IoPageLayout,
    /// Override switches of the page.
    pub overrides: RomOverrideSwitch,
}

impl IoWindow {
    /// Page offset of `address`, when it falls inside the page.
    #[must_use]
    pub fn offset_of(&self, address: u32) -> Option<u32> {
        address
            .checked_sub(self.base)
            .filter(|offset| *offset < self.layout.span())
    }

    /// Applies the selection side effect an access to `address` would have.
    pub fn apply_selection(&self, address: u32, slots: &mut SlotManager) -> SelectionEffect {
        self.offset_of(address).map_or(SelectionEffect::None, |offset| {
            apply_selection(self.layout, self.overrides.get(), offset, slots)
        })
    }
}

fn attached(target: &mut Option<Box<dyn DeviceTarget>>) -> Option<&mut dyn DeviceTarget> {
    target
        .as_mut()
        .map(|target| -> &mut dyn DeviceTarget { &mut **target })
}

/// Composite target for the I/O page.
pub struct IoPage {
    layout: IoPageLayout,
    slots: SharedSlots,
    floating: SharedFloatingBus,
    overrides: RomOverrideSwitch,
    soft_switches: Option<Box<dyn DeviceTarget>>,
    builtin_io: Option<Box<dyn DeviceTarget>>,
    internal_rom: Option<Box<dyn DeviceTarget>>,
}

impl fmt::Debug for IoPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoPage")
            .field("layout", &self.layout)
            .field("overrides", &self.overrides.get())
            .field("soft_switches", &self.soft_switches.is_some())
            .field("builtin_io", &self.builtin_io.is_some())
            .field("internal_rom", &self.internal_rom.is_some())
            .finish_non_exhaustive()
    }
}

impl IoPage {
    /// Creates a page with no built-in devices.
    #[must_use]
    pub fn new(layout: IoPageLayout, slots: SharedSlots, floating: SharedFloatingBus) -> Self {
        Self {
            layout,
            slots,
            floating,
            overrides: RomOverrideSwitch::default(),
            soft_switches: None,
            builtin_io: None,
            internal_rom: None,
        }
    }

    /// Attaches the soft-switch block; it sees block-relative offsets.
    #[must_use]
    pub fn with_soft_switches(mut self, target: Box<dyn DeviceTarget>) -> Self {
        self.soft_switches = Some(target);
        self
    }

    /// Attaches the slot-0 register block; it sees block-relative offsets.
    #[must_use]
    pub fn with_builtin_io(mut self, target: Box<dyn DeviceTarget>) -> Self {
        self.builtin_io = Some(target);
        self
    }

    /// Attaches built-in firmware; it sees page offsets.
    #[must_use]
    pub fn with_internal_rom(mut self, target: Box<dyn DeviceTarget>) -> Self {
        self.internal_rom = Some(target);
        self
    }

    /// Layout.
    #[must_use]
    pub const fn layout(&self) -> IoPageLayout {
        self.layout
    }

    /// Handle to the override switches.
    #[must_use]
    pub fn overrides(&self) -> RomOverrideSwitch {
        self.overrides.clone()
    }

    /// Slot manager shared with this page.
    #[must_use]
    pub fn slots(&self) -> SharedSlots {
        Rc::clone(&self.slots)
    }

    fn dispatch(
        &mut self,
        offset: u32,
        access: &BusAccess,
        op: &mut dyn FnMut(&mut dyn DeviceTarget, u32) -> DeviceResult<u8>,
    ) -> DeviceResult<Option<u8>> {
        let overrides = self.overrides.get();
        let mut slots = self
            .slots
            .try_borrow_mut()
            .map_err(|_| DeviceError::Failed)?;
        let effect = apply_selection(self.layout, overrides, offset, &mut slots);
        if effect != SelectionEffect::None {
            trace!(offset, ?effect, address = access.address, "expansion window snoop");
        }
        let region = self.layout.classify(offset);
        let target: Option<(&mut dyn DeviceTarget, u32)> = match region {
            IoRegion::SoftSwitch(relative) => {
                attached(&mut self.soft_switches).map(|target| (target, relative))
            }
            IoRegion::SlotIo { slot: 0, offset: relative } => {
                attached(&mut self.builtin_io).map(|target| (target, relative))
            }
            IoRegion::SlotIo { slot, offset: relative } => slots
                .card_mut(slot)
                .and_then(|card| card.region_mut(CardRegion::Io))
                .map(|target| (target, relative)),
            IoRegion::SlotRom { slot, .. } if overrides.internal_for_slot(slot) => {
                attached(&mut self.internal_rom).map(|target| (target, offset))
            }
            IoRegion::SlotRom { slot, offset: relative } => slots
                .card_mut(slot)
                .and_then(|card| card.region_mut(CardRegion::Rom))
                .map(|target| (target, relative)),
            IoRegion::Expansion(_) if overrides.internal_all => {
                attached(&mut self.internal_rom).map(|target| (target, offset))
            }
            IoRegion::Expansion(relative) => match slots.active_expansion_slot() {
                Some(owner) => slots
                    .card_mut(owner)
                    .and_then(|card| card.region_mut(CardRegion::ExpansionRom))
                    .map(|target| (target, relative)),
                None => None,
            },
            IoRegion::Unassigned => None,
        };
        match target {
            Some((target, relative)) => op(target, relative).map(Some),
            None => Ok(None),
        }
    }

    fn resolve_peek(&self, offset: u32) -> Option<(&dyn DeviceTarget, u32)> {
        let overrides = self.overrides.get();
        match self.layout.classify(offset) {
            IoRegion::SoftSwitch(relative) => {
                self.soft_switches.as_deref().map(|target| (target, relative))
            }
            IoRegion::SlotIo { slot: 0, offset: relative } => {
                self.builtin_io.as_deref().map(|target| (target, relative))
            }
            IoRegion::SlotRom { slot, .. } if overrides.internal_for_slot(slot) => {
                self.internal_rom.as_deref().map(|target| (target, offset))
            }
            IoRegion::Expansion(_) if overrides.internal_all => {
                self.internal_rom.as_deref().map(|target| (target, offset))
            }
            _ => None,
        }
    }

    fn peek_card(&self, offset: u32) -> Option<u8> {
        let slots = self.slots.try_borrow().ok()?;
        let (slot, region, relative) = match self.layout.classify(offset) {
            IoRegion::SlotIo { slot, offset } if slot > 0 => (slot, CardRegion::Io, offset),
            IoRegion::SlotRom { slot, offset } => (slot, CardRegion::Rom, offset),
            IoRegion::Expansion(relative) => (
                slots.active_expansion_slot()?,
                CardRegion::ExpansionRom,
                relative,
            ),
            _ => return None,
        };
        slots.card(slot)?.region(region)?.peek8(relative)
    }
}

impl DeviceTarget for IoPage {
    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            wide: false,
            peek: true,
            side_effects: true,
            timing_sensitive: true,
        }
    }

    fn read8(&mut self, offset: u32, access: &BusAccess) -> DeviceResult<u8> {
        let driven = self.dispatch(offset, access, &mut |target, relative| {
            target.read8(relative, access)
        })?;
        Ok(driven.unwrap_or_else(|| self.floating.value(access.address)))
    }

    fn write8(&mut self, offset: u32, value: u8, access: &BusAccess) -> DeviceResult<()> {
        self.dispatch(offset, access, &mut |target, relative| {
            target.write8(relative, value, access).map(|()| value)
        })
        .map(|_| ())
    }

    fn peek8(&self, offset: u32) -> Option<u8> {
        if let Some((target, relative)) = self.resolve_peek(offset) {
            return target.peek8(relative);
        }
        self.peek_card(offset)
    }

    fn poke8(&mut self, offset: u32, value: u8) -> bool {
        let overrides = self.overrides.get();
        let relative_target = match self.layout.classify(offset) {
            IoRegion::SlotRom { slot, .. } if overrides.internal_for_slot(slot) => {
                attached(&mut self.internal_rom).map(|target| (target, offset))
            }
            IoRegion::Expansion(_) if overrides.internal_all => {
                attached(&mut self.internal_rom).map(|target| (target, offset))
            }
            _ => None,
        };
        if let Some((target, relative)) = relative_target {
            return target.poke8(relative, value);
        }
        let Ok(mut slots) = self.slots.try_borrow_mut() else {
            return false;
        };
        let (slot, region, relative) = match self.layout.classify(offset) {
            IoRegion::SlotRom { slot, offset } => (slot, CardRegion::Rom, offset),
            IoRegion::Expansion(relative) => match slots.active_expansion_slot() {
                Some(owner) => (owner, CardRegion::ExpansionRom, relative),
                None => return false,
            },
            _ => return false,
        };
        slots
            .card_mut(slot)
            .and_then(|card| card.region_mut(region))
            .is_some_and(|target| target.poke8(relative, value))
    }

    fn reset(&mut self) {
        self.overrides.set(RomOverrides::default());
        for target in [
            &mut self.soft_switches,
            &mut self.builtin_io,
            &mut self.internal_rom,
        ]
        .into_iter()
        .flatten()
        {
            target.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::{
        apply_selection, IoPage, IoPageLayout, IoRegion, IoWindow, RomOverrideSwitch,
        RomOverrides, SelectionEffect,
    };
    use crate::slots::{CardRegion, Peripheral, SlotManager};
    use crate::{
        AccessIntent, AccessWidth, BusAccess, ConstantFloatingBus, DeviceError, DeviceTarget,
        Ram, Rom,
    };

    struct RomCard {
        rom: Rom,
        expansion: Rom,
    }

    impl RomCard {
        fn boxed(fill: u8) -> Box<Self> {
            Box::new(Self {
                rom: Rom::new(vec![fill; 0x100]),
                expansion: Rom::new(vec![fill.wrapping_add(1); 0x800]),
            })
        }
    }

    impl Peripheral for RomCard {
        fn name(&self) -> &str {
            "rom-card"
        }

        fn region_mut(&mut self, region: CardRegion) -> Option<&mut dyn DeviceTarget> {
            match region {
                CardRegion::Rom => Some(&mut self.rom),
                CardRegion::ExpansionRom => Some(&mut self.expansion),
                CardRegion::Io => None,
            }
        }

        fn region(&self, region: CardRegion) -> Option<&dyn DeviceTarget> {
            match region {
                CardRegion::Rom => Some(&self.rom),
                CardRegion::ExpansionRom => Some(&self.expansion),
                CardRegion::Io => None,
            }
        }
    }

    fn read(offset: u32) -> BusAccess {
        BusAccess::read(0xC000 + offset, AccessWidth::Byte, AccessIntent::DataRead)
    }

    fn write(offset: u32) -> BusAccess {
        BusAccess::write(0xC000 + offset, AccessWidth::Byte, 0, AccessIntent::DataWrite)
    }

    fn page_with_cards() -> IoPage {
        let slots = SlotManager::new(7).shared();
        slots
            .borrow_mut()
            .install(6, RomCard::boxed(0x60))
            .expect("empty slot");
        slots
            .borrow_mut()
            .install(2, RomCard::boxed(0x20))
            .expect("empty slot");
        IoPage::new(
            IoPageLayout::CLASSIC,
            slots,
            Rc::new(ConstantFloatingBus(0xFF)),
        )
    }

    #[test]
    fn classify_covers_every_region() {
        let layout = IoPageLayout::CLASSIC;
        assert_eq!(layout.classify(0x000), IoRegion::SoftSwitch(0));
        assert_eq!(layout.classify(0x08C), IoRegion::SlotIo { slot: 0, offset: 0xC });
        assert_eq!(layout.classify(0x0F0), IoRegion::SlotIo { slot: 7, offset: 0 });
        assert_eq!(layout.classify(0x1FF), IoRegion::SlotRom { slot: 1, offset: 0xFF });
        assert_eq!(layout.classify(0x800), IoRegion::Expansion(0));
        assert_eq!(layout.classify(0x1000), IoRegion::Unassigned);
    }

    #[test]
    fn rom_access_selects_and_sentinel_deselects() {
        let mut page = page_with_cards();
        let slots = page.slots();
        assert_eq!(page.read8(0x805, &read(0x805)), Ok(0xFF));

        assert_eq!(page.read8(0x600, &read(0x600)), Ok(0x60));
        assert_eq!(slots.borrow().active_expansion_slot(), Some(6));
        assert_eq!(page.read8(0x805, &read(0x805)), Ok(0x61));

        assert_eq!(page.read8(0x2AA, &read(0x2AA)), Ok(0x20));
        assert_eq!(slots.borrow().active_expansion_slot(), Some(2));

        assert_eq!(page.read8(0xFFF, &read(0xFFF)), Ok(0xFF));
        assert_eq!(slots.borrow().active_expansion_slot(), None);
        assert_eq!(page.read8(0x805, &read(0x805)), Ok(0xFF));
    }

    #[test]
    fn rejected_rom_write_still_selects() {
        let mut page = page_with_cards();
        assert_eq!(
            page.write8(0x610, 0x00, &write(0x610)),
            Err(DeviceError::ReadOnly)
        );
        assert_eq!(page.slots().borrow().active_expansion_slot(), Some(6));
    }

    #[test]
    fn empty_slot_rom_reads_float_and_keep_selection() {
        let mut page = page_with_cards();
        page.read8(0x600, &read(0x600)).expect("card rom");
        assert_eq!(page.read8(0x300, &read(0x300)), Ok(0xFF));
        assert_eq!(page.slots().borrow().active_expansion_slot(), Some(6));
    }

    #[test]
    fn overrides_win_over_card_selection() {
        let mut page =
            page_with_cards().with_internal_rom(Box::new(Rom::new(vec![0xC3; 0x1000])));
        let overrides = page.overrides();
        overrides.set_internal_slot(6, true);
        assert_eq!(page.read8(0x600, &read(0x600)), Ok(0xC3));
        assert_eq!(page.slots().borrow().active_expansion_slot(), None);

        overrides.set_internal_all(true);
        assert_eq!(page.read8(0x200, &read(0x200)), Ok(0xC3));
        assert_eq!(page.read8(0x900, &read(0x900)), Ok(0xC3));
        assert_eq!(page.slots().borrow().active_expansion_slot(), None);

        page.reset();
        assert_eq!(page.overrides().get(), RomOverrides::default());
    }

    #[test]
    fn peek_never_selects() {
        let page = page_with_cards();
        assert_eq!(page.peek8(0x600), Some(0x60));
        assert_eq!(page.peek8(0x805), None);
        assert_eq!(page.slots().borrow().active_expansion_slot(), None);
    }

    #[test]
    fn soft_switches_and_builtin_io_see_block_offsets() {
        let mut page = page_with_cards()
            .with_soft_switches(Box::new(Ram::new(0x80)))
            .with_builtin_io(Box::new(Ram::new(0x10)));
        page.write8(0x010, 0xAB, &write(0x010)).expect("ram");
        page.write8(0x08F, 0xCD, &write(0x08F)).expect("ram");
        assert_eq!(page.peek8(0x010), Some(0xAB));
        assert_eq!(page.peek8(0x08F), Some(0xCD));
        assert_eq!(page.read8(0x0E0, &read(0x0E0)), Ok(0xFF));
    }

    #[test]
    fn busy_slot_manager_is_a_device_failure() {
        let mut page = page_with_cards();
        let slots = page.slots();
        let _guard = slots.borrow_mut();
        assert_eq!(page.read8(0x600, &read(0x600)), Err(DeviceError::Failed));
    }

    #[test]
    fn window_replays_selection_from_bus_addresses() {
        let mut slots = SlotManager::new(7);
        slots.install(6, RomCard::boxed(0)).expect("empty slot");
        let window = IoWindow {
            base: 0xC000,
            layout: IoPageLayout::CLASSIC,
            overrides: RomOverrideSwitch::default(),
        };
        assert_eq!(window.apply_selection(0xC6FF, &mut slots), SelectionEffect::Selected(6));
        assert_eq!(window.apply_selection(0xB6FF, &mut slots), SelectionEffect::None);
        assert_eq!(window.apply_selection(0xCFFF, &mut slots), SelectionEffect::Deselected);
        assert_eq!(
            apply_selection(IoPageLayout::CLASSIC, RomOverrides::default(), 0x500, &mut slots),
            SelectionEffect::None
        );
    }
}
