//! Bank-switched high memory with write-protect double-read arming.
//!
//! A [`LanguageCard`] control target decodes sixteen switch offsets; a
//! [`LanguageCardRam`] target is mapped over the high memory window. Both see
//! one [`BankState`] cell, so switching never touches the page table.
//!
//! Switch offset bits:
//!
//! - bit 3 clear selects the second 4 KiB bank of the low window;
//! - `offset & 3` of 0 or 3 reads RAM, 1 or 2 reads ROM;
//! - bit 0 set arms writing: two consecutive reads of odd offsets enable it,
//!   a write to any odd offset breaks the sequence, and any even offset
//!   disables writing.

use std::cell::Cell;
use std::rc::Rc;

use tracing::trace;

use crate::{
    BusAccess, DeviceCapabilities, DeviceError, DeviceResult, DeviceTarget, SharedFloatingBus,
};

/// Size of one switched bank in the low window.
pub const BANK_SIZE: usize = 0x1000;
/// Size of the unswitched upper part of the window.
pub const HIGH_SIZE: usize = 0x2000;
/// Size of the whole window, and of the ROM image behind it.
pub const WINDOW_SIZE: usize = BANK_SIZE + HIGH_SIZE;
/// Number of switch offsets decoded by the control target.
pub const SWITCH_COUNT: u32 = 16;

/// Current banking configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BankState {
    /// Reads come from RAM rather than ROM.
    pub read_ram: bool,
    /// Writes reach RAM.
    pub write_enabled: bool,
    /// The second low bank is visible.
    pub bank2: bool,
    /// One qualifying read has been seen towards enabling writes.
    pub prewrite: bool,
}

impl Default for BankState {
    /// Power-on state: ROM reads, RAM writes into bank 2.
    fn default() -> Self {
        Self {
            read_ram: false,
            write_enabled: true,
            bank2: true,
            prewrite: false,
        }
    }
}

impl BankState {
    /// Applies one access to switch `offset`.
    #[must_use]
    pub const fn switched(self, offset: u32, write: bool) -> Self {
        let offset = offset % SWITCH_COUNT;
        let bank2 = offset & 8 == 0;
        let read_ram = matches!(offset & 3, 0 | 3);
        let (write_enabled, prewrite) = if offset & 1 == 0 {
            (false, false)
        } else if write {
            (self.write_enabled, false)
        } else {
            (self.write_enabled || self.prewrite, true)
        };
        Self {
            read_ram,
            write_enabled,
            bank2,
            prewrite,
        }
    }
}

/// Switch decoder for the banked window.
pub struct LanguageCard {
    state: Rc<Cell<BankState>>,
    floating: SharedFloatingBus,
}

impl std::fmt::Debug for LanguageCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageCard")
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl LanguageCard {
    /// Builds the switch decoder and its memory window over `rom`.
    ///
    /// `rom` is padded or truncated to [`WINDOW_SIZE`].
    #[must_use]
    pub fn new(rom: &[u8], floating: SharedFloatingBus) -> (Self, LanguageCardRam) {
        let state = Rc::new(Cell::new(BankState::default()));
        let mut image = vec![0; WINDOW_SIZE];
        let len = rom.len().min(WINDOW_SIZE);
        image[..len].copy_from_slice(&rom[..len]);
        let ram = LanguageCardRam {
            state: Rc::clone(&state),
            bank1: vec![0; BANK_SIZE].into_boxed_slice(),
            bank2: vec![0; BANK_SIZE].into_boxed_slice(),
            high: vec![0; HIGH_SIZE].into_boxed_slice(),
            rom: image.into_boxed_slice(),
        };
        (Self { state, floating }, ram)
    }

    /// Current banking configuration.
    #[must_use]
    pub fn state(&self) -> BankState {
        self.state.get()
    }

    fn switch(&self, offset: u32, write: bool) {
        let previous = self.state.get();
        let next = previous.switched(offset, write);
        if next != previous {
            trace!(offset, ?next, "bank switch");
        }
        self.state.set(next);
    }
}

impl DeviceTarget for LanguageCard {
    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::IO
    }

    fn read8(&mut self, offset: u32, access: &BusAccess) -> DeviceResult<u8> {
        self.switch(offset, false);
        Ok(self.floating.value(access.address))
    }

    fn write8(&mut self, offset: u32, _value: u8, _access: &BusAccess) -> DeviceResult<()> {
        self.switch(offset, true);
        Ok(())
    }

    fn reset(&mut self) {
        self.state.set(BankState::default());
    }
}

/// Memory window whose content follows the [`LanguageCard`] switches.
///
/// Offsets `0..0x1000` are the switched bank, `0x1000..0x3000` the fixed
/// upper RAM. Writes while writing is disabled are ignored, as on hardware.
pub struct LanguageCardRam {
    state: Rc<Cell<BankState>>,
    bank1: Box<[u8]>,
    bank2: Box<[u8]>,
    high: Box<[u8]>,
    rom: Box<[u8]>,
}

impl std::fmt::Debug for LanguageCardRam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageCardRam")
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl LanguageCardRam {
    /// Current banking configuration.
    #[must_use]
    pub fn state(&self) -> BankState {
        self.state.get()
    }

    fn ram_cell(&mut self, offset: u32) -> Option<&mut u8> {
        let offset = offset as usize;
        if offset < BANK_SIZE {
            let bank = if self.state.get().bank2 {
                &mut self.bank2
            } else {
                &mut self.bank1
            };
            bank.get_mut(offset)
        } else {
            self.high.get_mut(offset - BANK_SIZE)
        }
    }

    fn visible(&self, offset: u32) -> Option<u8> {
        let state = self.state.get();
        let offset = offset as usize;
        if !state.read_ram {
            return self.rom.get(offset).copied();
        }
        if offset < BANK_SIZE {
            let bank = if state.bank2 { &self.bank2 } else { &self.bank1 };
            bank.get(offset).copied()
        } else {
            self.high.get(offset - BANK_SIZE).copied()
        }
    }
}

impl DeviceTarget for LanguageCardRam {
    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            wide: false,
            peek: true,
            side_effects: false,
            timing_sensitive: false,
        }
    }

    fn read8(&mut self, offset: u32, _access: &BusAccess) -> DeviceResult<u8> {
        self.visible(offset).ok_or(DeviceError::Failed)
    }

    fn write8(&mut self, offset: u32, value: u8, _access: &BusAccess) -> DeviceResult<()> {
        if !self.state.get().write_enabled {
            return Ok(());
        }
        let cell = self.ram_cell(offset).ok_or(DeviceError::Failed)?;
        *cell = value;
        Ok(())
    }

    fn peek8(&self, offset: u32) -> Option<u8> {
        self.visible(offset)
    }

    fn poke8(&mut self, offset: u32, value: u8) -> bool {
        self.ram_cell(offset).map(|cell| *cell = value).is_some()
    }

    fn reset(&mut self) {
        self.state.set(BankState::default());
    }
}
