/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! The memory manager: ROM and RAM pages, paging latches and memory windows.
use core::cell::Cell;
use core::fmt;
use core::ops::Range;
use std::io::{self, Read};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};
#[cfg(feature = "snapshot")]
use ::serde::{Serialize, Deserialize};

use crate::arch::Architecture;
use crate::clock::ContentionMask;

#[cfg(feature = "snapshot")]
pub mod serde;

/// The size of a single memory page, ROM or RAM.
pub const PAGE_SIZE: usize = 0x4000;
/// The number of machine ROM pages.
pub const ROM_PAGES: usize = 5;
/// The number of RAM banks.
pub const RAM_BANKS: usize = 8;
/// The index of the TR-DOS ROM page.
pub const TRDOS_ROM: u8 = 4;
/// The value of `paging_mode_2a3` when the +2A/+3 all-RAM mode is active.
pub const SPECIAL_PAGING_MODE: u8 = 0xFF;
/// An extra ROM page holding a ROM embedded in a snapshot.
const CUSTOM_ROM: u8 = ROM_PAGES as u8;
/// RAM banks in memory windows 0..=3 for each of the +2A/+3 all-RAM configurations.
pub const SPECIAL_PAGING: [[u8; 4]; 4] = [
    [0, 1, 2, 3],
    [4, 5, 6, 7],
    [4, 5, 6, 3],
    [4, 7, 6, 3],
];

/// An error returned by memory loading and inspection methods.
#[non_exhaustive]
#[derive(Debug)]
pub enum ZxMemoryError {
    InvalidPageIndex,
    InvalidBankIndex,
    UnsupportedAddressRange,
    Io(io::Error)
}

/// A type returned by some of [MemoryManager] methods.
pub type Result<T> = core::result::Result<T, ZxMemoryError>;

/// A memory page mapped into one of the four 16kb CPU memory windows.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Page {
    Rom(u8),
    Ram(u8)
}

/// The state of all paging latches.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Latches {
    /// The RAM bank paged into the top memory window.
    pub bank: u8,
    /// `0` when bank 5 is displayed, `1` for bank 7.
    pub video: u8,
    /// The ROM selection latch, on +2A/+3 it's 2 bits wide.
    pub rom: u8,
    /// The ROM page actually paged in, [TRDOS_ROM] while TR-DOS is active.
    pub rom_in_use: u8,
    pub paging_lock: bool,
    /// `0` in the normal mode, [SPECIAL_PAGING_MODE] in the +2A/+3 all-RAM mode.
    pub paging_mode_2a3: u8,
    /// The last value written to the 0x7FFD port.
    pub last_7ffd: u8,
    /// The last value written to the +2A/+3 0x1FFD port.
    pub last_1ffd: u8,
}

/// Owns all ROM and RAM pages of the emulated machine and resolves CPU addresses through
/// the currently paged memory windows.
///
/// Bank switching is exposed only as the per-architecture paging port operations.
/// Every latch change updates the memory windows and the screen page immediately.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone)]
pub struct MemoryManager {
    arch: Architecture,
    #[cfg_attr(feature = "snapshot", serde(serialize_with = "self::serde::serialize_mem",
                                          deserialize_with = "self::serde::deserialize_mem"))]
    rom: Box<[u8]>,
    #[cfg_attr(feature = "snapshot", serde(serialize_with = "self::serde::serialize_mem",
                                          deserialize_with = "self::serde::deserialize_mem"))]
    ram: Box<[u8]>,
    windows: [Page; 4],
    contended: [bool; 4],
    latches: Latches,
    custom_rom: bool,
    /// Banks paged in since the last call to [MemoryManager::take_changed_banks].
    changed_banks: u8,
    last_contended_rw: Cell<u8>,
}

impl std::error::Error for ZxMemoryError {}

impl fmt::Display for ZxMemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", match self {
            ZxMemoryError::InvalidPageIndex => "Memory page index is out of range",
            ZxMemoryError::InvalidBankIndex => "Memory bank index is out of range",
            ZxMemoryError::UnsupportedAddressRange => "Address range is not supported",
            ZxMemoryError::Io(err) => return err.fmt(f)
        })
    }
}

impl From<ZxMemoryError> for io::Error {
    fn from(err: ZxMemoryError) -> Self {
        match err {
            ZxMemoryError::Io(err) => err,
            e => io::Error::new(io::ErrorKind::InvalidInput, e)
        }
    }
}

impl From<io::Error> for ZxMemoryError {
    fn from(err: io::Error) -> Self {
        ZxMemoryError::Io(err)
    }
}

impl fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryManager")
         .field("arch", &self.arch)
         .field("windows", &self.windows)
         .field("contended", &self.contended)
         .field("latches", &self.latches)
         .field("custom_rom", &self.custom_rom)
         .finish()
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        MemoryManager::new(Architecture::default())
    }
}

impl MemoryManager {
    /// Allocates all memory pages and resets the paging state for the given architecture.
    ///
    /// ROM pages are zero-filled, use [MemoryManager::load_rom] to populate them.
    pub fn new(arch: Architecture) -> Self {
        let mut mem = MemoryManager {
            arch,
            rom: vec![0u8; (ROM_PAGES + 1) * PAGE_SIZE].into_boxed_slice(),
            ram: vec![0u8; RAM_BANKS * PAGE_SIZE].into_boxed_slice(),
            windows: [Page::Rom(0), Page::Ram(5), Page::Ram(2), Page::Ram(0)],
            contended: [false; 4],
            latches: Latches::default(),
            custom_rom: false,
            changed_banks: 0,
            last_contended_rw: Cell::new(0xFF),
        };
        mem.reset(arch);
        mem
    }

    #[inline]
    pub fn arch(&self) -> Architecture {
        self.arch
    }

    /// Restores the power-on paging state of the `arch` machine and clears all RAM.
    ///
    /// A ROM loaded from a snapshot is discarded.
    pub fn reset(&mut self, arch: Architecture) {
        if arch != self.arch {
            info!("memory: switching architecture {} -> {}", self.arch, arch);
        }
        self.arch = arch;
        self.latches = Latches {
            paging_lock: arch.is_paging_locked_at_reset(),
            ..Latches::default()
        };
        self.custom_rom = false;
        self.windows = [Page::Rom(0), Page::Ram(5), Page::Ram(2), Page::Ram(0)];
        self.contended = [false, arch != Architecture::Pentagon, false, false];
        self.ram.iter_mut().for_each(|p| *p = 0);
        self.changed_banks = !0;
        self.last_contended_rw.set(0xFF);
    }

    /// Loads a machine ROM page from `rd`.
    ///
    /// Page [TRDOS_ROM] holds the TR-DOS ROM. Other pages are the machine ROMs in
    /// the order they are selected by the ROM latch.
    pub fn load_rom<R: Read>(&mut self, page: u8, mut rd: R) -> Result<()> {
        if page as usize >= ROM_PAGES {
            return Err(ZxMemoryError::InvalidPageIndex)
        }
        rd.read_exact(rom_page_mut(&mut self.rom, page))?;
        Ok(())
    }

    /// Loads a 48k ROM embedded in a snapshot, replacing the ROM page 0 until the next reset.
    pub fn load_custom_rom<R: Read>(&mut self, mut rd: R) -> Result<()> {
        rd.read_exact(rom_page_mut(&mut self.rom, CUSTOM_ROM))?;
        self.custom_rom = true;
        self.update_rom_window();
        Ok(())
    }

    /// Returns `true` if the ROM page 0 has been replaced by a snapshot ROM.
    #[inline]
    pub fn is_custom_rom(&self) -> bool {
        self.custom_rom
    }

    /// Returns the ROM `page` content as the CPU sees it when paged in.
    pub fn rom_ref(&self, page: u8) -> Result<&[u8]> {
        if page as usize >= ROM_PAGES {
            return Err(ZxMemoryError::InvalidPageIndex)
        }
        Ok(rom_page(&self.rom, self.effective_rom(page)))
    }

    /// Returns a slice of the linear RAM space where each bank `n` occupies
    /// `n * PAGE_SIZE..(n + 1) * PAGE_SIZE`.
    pub fn ram_ref(&self, range: Range<usize>) -> Result<&[u8]> {
        self.ram.get(range).ok_or(ZxMemoryError::UnsupportedAddressRange)
    }

    pub fn ram_mut(&mut self, range: Range<usize>) -> Result<&mut [u8]> {
        self.ram.get_mut(range).ok_or(ZxMemoryError::UnsupportedAddressRange)
    }

    /// Fills the linear RAM `range` (see [MemoryManager::ram_ref]) with data from `rd`.
    pub fn load_into_ram<R: Read>(&mut self, range: Range<usize>, mut rd: R) -> Result<()> {
        let slice = self.ram_mut(range)?;
        rd.read_exact(slice)?;
        Ok(())
    }

    #[inline]
    pub fn ram_bank(&self, bank: u8) -> &[u8] {
        ram_bank(&self.ram, bank)
    }

    #[inline]
    pub fn ram_bank_mut(&mut self, bank: u8) -> &mut [u8] {
        ram_bank_mut(&mut self.ram, bank)
    }

    /// Returns the RAM bank currently displayed by the video circuit.
    #[inline]
    pub fn screen(&self) -> &[u8] {
        self.ram_bank(if self.latches.video != 0 { 7 } else { 5 })
    }

    #[inline]
    pub fn latches(&self) -> &Latches {
        &self.latches
    }

    #[inline]
    pub fn window(&self, index: usize) -> Page {
        self.windows[index & 3]
    }

    #[inline]
    pub fn is_window_contended(&self, index: usize) -> bool {
        self.contended[index & 3]
    }

    /// Returns `true` if `address` is in a memory window mapped to a contended bank.
    #[inline]
    pub fn is_contended(&self, address: u16) -> bool {
        self.contended[(address >> 14) as usize]
    }

    pub fn contention_mask(&self) -> ContentionMask {
        self.contended.iter().enumerate().fold(ContentionMask::empty(),
            |mask, (window, &contended)| mask.with_window(window, contended))
    }

    /// Returns the last byte transferred on the contended memory bus, used by the +2A/+3 floating bus.
    #[inline]
    pub fn last_contended_rw(&self) -> u8 {
        self.last_contended_rw.get()
    }

    /// Records a contended memory transfer. It's a no-op on machines other than +2A/+3.
    #[inline]
    pub fn note_contended_rw(&self, address: u16, data: u8) {
        if self.arch == Architecture::Plus2A && self.is_contended(address) {
            self.last_contended_rw.set(data);
        }
    }

    #[inline]
    pub fn read_byte(&self, address: u16) -> u8 {
        let offset = address as usize & (PAGE_SIZE - 1);
        match self.windows[(address >> 14) as usize] {
            Page::Rom(page) => rom_page(&self.rom, page)[offset],
            Page::Ram(bank) => ram_bank(&self.ram, bank)[offset]
        }
    }

    /// Writes a byte through the memory windows.
    ///
    /// Writes are silently dropped when the window index equals `paging_mode_2a3`, that
    /// is into window 0 unless the +2A/+3 all-RAM mode is active, and into any ROM page.
    #[inline]
    pub fn write_byte(&mut self, address: u16, value: u8) {
        let window = (address >> 14) as usize;
        if window == self.latches.paging_mode_2a3 as usize {
            return
        }
        if let Page::Ram(bank) = self.windows[window] {
            ram_bank_mut(&mut self.ram, bank)[address as usize & (PAGE_SIZE - 1)] = value;
        }
    }

    #[inline]
    pub fn read_word(&self, address: u16) -> u16 {
        u16::from_le_bytes([self.read_byte(address), self.read_byte(address.wrapping_add(1))])
    }

    #[inline]
    pub fn write_word(&mut self, address: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write_byte(address, lo);
        self.write_byte(address.wrapping_add(1), hi);
    }

    /// Returns the bit mask of RAM banks paged in since the last call and clears it.
    pub fn take_changed_banks(&mut self) -> u8 {
        core::mem::replace(&mut self.changed_banks, 0)
    }

    /// Applies a write to the 128k/Pentagon 0x7FFD paging port.
    ///
    /// Returns `false` if paging is locked.
    pub fn page_128(&mut self, data: u8) -> bool {
        self.latches.last_7ffd = data;
        if self.latches.paging_lock {
            return false
        }
        self.latches.paging_lock = data & 0x20 != 0;
        self.select_bank(data & 7);
        self.latches.rom = (data >> 4) & 1;
        if self.latches.rom_in_use != TRDOS_ROM {
            self.latches.rom_in_use = self.latches.rom;
        }
        self.update_rom_window();
        self.select_video((data >> 3) & 1);
        debug!("paging 128: 0x{:02x} {:?}", data, self.windows);
        true
    }

    /// Applies a 0x7FFD paging write performed by the 128k when it reads an unattached port.
    ///
    /// Unlike [MemoryManager::page_128] the last value written to the port is preserved.
    pub fn page_128_readback(&mut self, data: u8) -> bool {
        let last_7ffd = self.latches.last_7ffd;
        let paged = self.page_128(data);
        self.latches.last_7ffd = last_7ffd;
        paged
    }

    /// Applies a write to the +2A/+3 0x7FFD paging port.
    ///
    /// Returns `false` if paging is locked.
    pub fn page_plus2a_7ffd(&mut self, data: u8) -> bool {
        self.latches.last_7ffd = data;
        if self.latches.paging_lock {
            return false
        }
        self.latches.paging_lock = data & 0x20 != 0;
        self.latches.rom = ((self.latches.last_1ffd >> 1) & 2) | ((data >> 4) & 1);
        self.latches.rom_in_use = self.latches.rom & 3;
        let bank = data & 7;
        if bank != self.latches.bank {
            self.changed_banks |= 1 << bank;
        }
        self.latches.bank = bank;
        if self.latches.paging_mode_2a3 == 0 {
            self.windows[0] = Page::Rom(self.effective_rom(self.latches.rom_in_use));
            self.contended[0] = false;
            self.windows[3] = Page::Ram(bank);
            self.contended[3] = self.arch.is_bank_contended(bank);
        }
        self.select_video((data >> 3) & 1);
        debug!("paging +2A 7ffd: 0x{:02x} {:?}", data, self.windows);
        true
    }

    /// Applies a write to the +2A/+3 0x1FFD paging port.
    ///
    /// Returns `false` if paging is locked.
    pub fn page_plus2a_1ffd(&mut self, data: u8) -> bool {
        self.latches.last_1ffd = data;
        if self.latches.paging_lock {
            return false
        }
        if data & 1 == 0 {
            self.latches.paging_mode_2a3 = 0;
            self.latches.rom = ((data >> 1) & 2) | ((self.latches.last_7ffd >> 4) & 1);
            self.latches.rom_in_use = self.latches.rom & 3;
            let bank = self.latches.bank;
            self.windows = [Page::Rom(self.effective_rom(self.latches.rom_in_use)),
                            Page::Ram(5), Page::Ram(2), Page::Ram(bank)];
            self.contended = [false, true, false, self.arch.is_bank_contended(bank)];
        }
        else {
            self.latches.paging_mode_2a3 = SPECIAL_PAGING_MODE;
            let banks = SPECIAL_PAGING[((data & 6) >> 1) as usize];
            for (window, &bank) in banks.iter().enumerate() {
                self.windows[window] = Page::Ram(bank);
                self.contended[window] = self.arch.is_bank_contended(bank);
                self.changed_banks |= 1 << bank;
            }
        }
        debug!("paging +2A 1ffd: 0x{:02x} {:?}", data, self.windows);
        true
    }

    /// Pages the TR-DOS ROM in or out of memory window 0.
    pub fn page_trdos(&mut self, page_in: bool) {
        self.latches.rom_in_use = if page_in {
            TRDOS_ROM
        }
        else {
            self.latches.rom & 3
        };
        self.update_rom_window();
    }

    #[inline]
    pub fn is_trdos_paged_in(&self) -> bool {
        self.latches.rom_in_use == TRDOS_ROM
    }

    /// Replaces all latches and rebuilds memory windows from them.
    pub fn restore_latches(&mut self, latches: Latches) {
        self.latches = latches;
        let bank = latches.bank & 7;
        if latches.paging_mode_2a3 == SPECIAL_PAGING_MODE {
            let banks = SPECIAL_PAGING[((latches.last_1ffd & 6) >> 1) as usize];
            for (window, &bank) in banks.iter().enumerate() {
                self.windows[window] = Page::Ram(bank);
                self.contended[window] = self.arch.is_bank_contended(bank);
            }
        }
        else {
            self.windows = [Page::Rom(self.effective_rom(latches.rom_in_use)),
                            Page::Ram(5), Page::Ram(2), Page::Ram(bank)];
            self.contended = [false, self.arch != Architecture::Pentagon, false,
                              self.arch.is_bank_contended(bank)];
        }
    }

    fn select_bank(&mut self, bank: u8) {
        if bank != self.latches.bank {
            self.changed_banks |= 1 << bank;
            self.latches.bank = bank;
        }
        self.windows[3] = Page::Ram(bank);
        self.contended[3] = self.arch.is_bank_contended(bank);
    }

    fn select_video(&mut self, video: u8) {
        if video != self.latches.video {
            self.changed_banks |= if video != 0 { 1 << 7 } else { 1 << 5 };
            self.latches.video = video;
        }
    }

    fn update_rom_window(&mut self) {
        if self.latches.paging_mode_2a3 != SPECIAL_PAGING_MODE {
            self.windows[0] = Page::Rom(self.effective_rom(self.latches.rom_in_use));
        }
    }

    #[inline]
    fn effective_rom(&self, page: u8) -> u8 {
        if page == 0 && self.custom_rom {
            CUSTOM_ROM
        }
        else {
            page
        }
    }
}

#[inline(always)]
fn rom_page(rom: &[u8], page: u8) -> &[u8] {
    let offset = page as usize * PAGE_SIZE;
    &rom[offset..offset + PAGE_SIZE]
}

#[inline(always)]
fn rom_page_mut(rom: &mut [u8], page: u8) -> &mut [u8] {
    let offset = page as usize * PAGE_SIZE;
    &mut rom[offset..offset + PAGE_SIZE]
}

#[inline(always)]
fn ram_bank(ram: &[u8], bank: u8) -> &[u8] {
    let offset = (bank as usize & (RAM_BANKS - 1)) * PAGE_SIZE;
    &ram[offset..offset + PAGE_SIZE]
}

#[inline(always)]
fn ram_bank_mut(ram: &mut [u8], bank: u8) -> &mut [u8] {
    let offset = (bank as usize & (RAM_BANKS - 1)) * PAGE_SIZE;
    &mut ram[offset..offset + PAGE_SIZE]
}
