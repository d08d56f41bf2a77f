/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! Common snapshot formats utilities.
use core::ops::Range;
use std::io::{self, Read};

use espectrum_core::arch::Architecture;
use espectrum_core::memory::{Latches, ZxMemoryError, PAGE_SIZE};
use espectrum_core::z80emu::{Cpu, CpuFlags, InterruptMode, Prefix, StkReg16, Z80NMOS};
use espectrum_peripherals::ay::AyRegister;

/// The memory range specifies which part of the emulated hardware the data should be loaded to.
#[non_exhaustive]
#[derive(Debug,Clone,PartialEq,Eq,Hash)]
pub enum MemoryRange {
    /// Load into the machine ROM pages.
    /// The address space starts from the top of the first ROM page and extends towards the last ROM page.
    Rom(Range<usize>),
    /// Load into the RAM.
    /// The address space starts from the top of the RAM bank 0 and extends towards the bank 7.
    Ram(Range<usize>),
    /// Load a 16kb ROM embedded in a snapshot, replacing the 48k ROM until the next reset.
    CustomRom,
}

impl MemoryRange {
    /// Returns the range covering the whole RAM `bank`.
    pub fn ram_bank(bank: u8) -> Self {
        let start = (bank & 7) as usize * PAGE_SIZE;
        MemoryRange::Ram(start..start + PAGE_SIZE)
    }
}

/// RAM banks holding the 48k address space 0x4000..=0xFFFF, in address order.
pub const BANKS_48K: [u8; 3] = [5, 2, 0];

/// An interface for inspecting the emulated machine while creating a snapshot.
///
/// The methods can be called more than one time.
pub trait SnapshotCreator {
    fn arch(&self) -> Architecture;
    fn cpu(&self) -> &Z80NMOS;
    /// The border color (0..=7).
    fn border(&self) -> u8;
    /// Returns `true` if the 48k Issue 2 keyboard is being emulated.
    fn issue2(&self) -> bool { false }
    fn memory_ref(&self, range: MemoryRange) -> Result<&[u8], ZxMemoryError>;
    fn latches(&self) -> Latches;
    /// Returns `true` if the 48k ROM has been replaced by a snapshot ROM.
    fn is_custom_rom(&self) -> bool;
    fn is_tr_dos_rom_paged_in(&self) -> bool;
    /// Returns the selected register and the register values of the AY chip, if one is attached.
    fn ay_state(&self) -> Option<(AyRegister, &[u8;16])> { None }
}

/// Implement this trait to be able to load snapshots from files supported by this crate.
///
/// The method [SnapshotLoader::select_arch] is always being called first.
/// Then the other methods are being called in unspecified order, apart from paging port writes
/// which always come after the memory has been loaded.
pub trait SnapshotLoader {
    /// The error type returned by the [SnapshotLoader::select_arch] method.
    type Error: Into<Box<(dyn std::error::Error + Send + Sync + 'static)>>;
    /// Should return the architecture of the currently emulated machine.
    ///
    /// Formats use it to decide if the machine can keep its architecture.
    fn current_arch(&self) -> Architecture;
    /// Should reset the machine as the `arch` model and set the `border` color.
    ///
    /// If the architecture can not be emulated this method should return an `Err(Self::Error)`.
    fn select_arch(&mut self, arch: Architecture, border: u8) -> Result<(), Self::Error>;
    /// Should read a memory chunk from the given `reader` source according to the specified `range`.
    fn read_into_memory<R: Read>(&mut self, range: MemoryRange, reader: R) -> Result<(), ZxMemoryError>;
    /// Should attach an instance of the `cpu`.
    fn assign_cpu(&mut self, cpu: Z80NMOS);
    /// Should apply the `data` to the paging `port` (0x7ffd or 0x1ffd) without any side effects
    /// other than the paging itself.
    fn write_port(&mut self, port: u16, data: u8);
    /// Should select the 48k keyboard issue. Default implementation does nothing.
    fn set_issue2(&mut self, _issue2: bool) {}
    /// Should initialize the AY chip from the given arguments if one is available.
    ///
    /// Default implementation does nothing.
    fn setup_ay(&mut self, _reg_selected: AyRegister, _reg_values: &[u8;16]) {}
    /// Should page in the TR-DOS ROM.
    fn tr_dos_rom_paged_in(&mut self);
    /// Should return the ROM paged in at 0x0000 after [SnapshotLoader::select_arch].
    ///
    /// Used by the 48k formats to pop the PC from a stack reaching into the ROM.
    /// Default implementation returns `None` and such bytes read as 0xFF.
    fn paged_rom(&self) -> Option<&[u8]> { None }
    /// Should start the ZX81+ ROM of the 128k and bring it to the point where it waits for
    /// a ZX81 program. Called by the **P** loader after [SnapshotLoader::select_arch] and
    /// before the program is read into memory.
    ///
    /// Default implementation does nothing.
    fn zx81_loader(&mut self) -> Result<(), Self::Error> { Ok(()) }
}

/// Returns `true` if a `cpu` is safe for a snapshot using lossy formats.
///
/// The formats can't preserve the state of the CPU after executing one of the `0xDD` or `0xFD`
/// prefixes, before executing the prefixed instruction.
pub fn is_cpu_safe_for_snapshot<C: Cpu>(cpu: &C) -> bool {
    !cpu.is_after_prefix()
}

/// Converts an error returned by [SnapshotLoader::select_arch].
pub(crate) fn select_arch_error<E>(err: E) -> io::Error
    where E: Into<Box<(dyn std::error::Error + Send + Sync + 'static)>>
{
    io::Error::new(io::ErrorKind::Other, err)
}

pub(crate) fn invalid_data(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

pub(crate) fn invalid_input(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

pub(crate) fn interrupt_mode_from(im: u8) -> InterruptMode {
    match im & 3 {
        0 => InterruptMode::Mode0,
        1 => InterruptMode::Mode1,
        _ => InterruptMode::Mode2
    }
}

pub(crate) fn interrupt_mode_to(im: InterruptMode) -> u8 {
    match im {
        InterruptMode::Mode0 => 0,
        InterruptMode::Mode1 => 1,
        InterruptMode::Mode2 => 2,
    }
}

/// The CPU registers as stored by all snapshot formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Registers {
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub af_alt: u16,
    pub bc_alt: u16,
    pub de_alt: u16,
    pub hl_alt: u16,
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub i: u8,
    pub r: u8,
    pub iff1: bool,
    pub iff2: bool,
    pub im: InterruptMode,
}

impl Registers {
    pub fn from_cpu<C: Cpu>(cpu: &C) -> Self {
        let (iff1, iff2) = cpu.get_iffs();
        let (a, f) = cpu.get_reg2(StkReg16::AF);
        let (a_alt, f_alt) = cpu.get_alt_reg2(StkReg16::AF);
        Registers {
            af: u16::from_le_bytes([f, a]),
            bc: cpu.get_reg16(StkReg16::BC),
            de: cpu.get_reg16(StkReg16::DE),
            hl: cpu.get_reg16(StkReg16::HL),
            af_alt: u16::from_le_bytes([f_alt, a_alt]),
            bc_alt: cpu.get_alt_reg16(StkReg16::BC),
            de_alt: cpu.get_alt_reg16(StkReg16::DE),
            hl_alt: cpu.get_alt_reg16(StkReg16::HL),
            ix: cpu.get_index16(Prefix::Xdd),
            iy: cpu.get_index16(Prefix::Yfd),
            sp: cpu.get_sp(),
            pc: cpu.get_pc(),
            i: cpu.get_i(),
            r: cpu.get_r(),
            iff1,
            iff2,
            im: cpu.get_im(),
        }
    }

    pub fn into_cpu(self) -> Z80NMOS {
        let mut cpu = Z80NMOS::default();
        cpu.reset();
        cpu.set_i(self.i);
        cpu.set_reg16(StkReg16::HL, self.hl_alt);
        cpu.set_reg16(StkReg16::DE, self.de_alt);
        cpu.set_reg16(StkReg16::BC, self.bc_alt);
        cpu.exx();
        let [f_alt, a_alt] = self.af_alt.to_le_bytes();
        cpu.set_acc(a_alt);
        cpu.set_flags(CpuFlags::from_bits_truncate(f_alt));
        cpu.ex_af_af();
        cpu.set_reg16(StkReg16::HL, self.hl);
        cpu.set_reg16(StkReg16::DE, self.de);
        cpu.set_reg16(StkReg16::BC, self.bc);
        cpu.set_index16(Prefix::Yfd, self.iy);
        cpu.set_index16(Prefix::Xdd, self.ix);
        cpu.set_iffs(self.iff1, self.iff2);
        cpu.set_r(self.r);
        let [f, a] = self.af.to_le_bytes();
        cpu.set_acc(a);
        cpu.set_flags(CpuFlags::from_bits_truncate(f));
        cpu.set_sp(self.sp);
        cpu.set_im(self.im);
        cpu.set_pc(self.pc);
        cpu
    }
}
