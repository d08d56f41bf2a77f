/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! **SP** snapshot format utilities.
//!
//! The format holds 48k snapshots only, optionally with an embedded 16kb ROM.
use std::io::{Read, Write, Result};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use espectrum_core::arch::Architecture;
use espectrum_core::memory::PAGE_SIZE;
use espectrum_core::z80emu::InterruptMode;

use crate::{StructRead, StructWrite};
use super::snapshot::*;
/*
   Offset   Size   Description
   ------------------------------------------------------------------------
   0        2      bytes  "SP" signature
   2        2      word   Data size: 49152, or 0 if a ROM page precedes RAM
   4        2      word   Start address: 16384, or 0 if a ROM page precedes RAM
   6        6      word   BC, DE, HL
   12       2      byte   F, A
   14       4      word   IX, IY
   18       6      word   BC', DE', HL'
   24       2      byte   F', A'
   26       2      byte   R, I
   28       4      word   SP, PC
   32       2      word   reserved
   34       1      byte   Border color (0..=7)
   35       1      byte   reserved
   36       2      word   Flags: bit 0 = IFF1, bit 1 = IM 2 (otherwise IM 1), bit 2 = IFF2
   38       16Kb   bytes  ROM, if present
   ...      48Kb   bytes  RAM 16384..=65535
   ------------------------------------------------------------------------
*/
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
#[repr(packed)]
struct SpHeader {
    signature: [u8;2],
    data_size: [u8;2],
    start: [u8;2],
    bc: [u8;2],
    de: [u8;2],
    hl: [u8;2],
    af: [u8;2],
    ix: [u8;2],
    iy: [u8;2],
    bc_alt: [u8;2],
    de_alt: [u8;2],
    hl_alt: [u8;2],
    af_alt: [u8;2],
    r: u8,
    i: u8,
    sp: [u8;2],
    pc: [u8;2],
    reserved1: [u8;2],
    border: u8,
    reserved2: u8,
    flags: [u8;2]
}

// Structs must be packed and consist of `u8` or/and arrays of `u8` primitives only.
unsafe impl StructRead for SpHeader {}
unsafe impl StructWrite for SpHeader {}

const SP_SIGNATURE: &[u8;2] = b"SP";
const SP_DATA_SIZE: u16 = 49152;
const SP_START: u16 = 16384;

const FLAG_IFF1: u16 = 0b001;
const FLAG_IM2:  u16 = 0b010;
const FLAG_IFF2: u16 = 0b100;

impl SpHeader {
    fn has_rom(&self) -> bool {
        self.data_size == [0, 0] && self.start == [0, 0]
    }

    fn registers(&self) -> Registers {
        let flags = u16::from_le_bytes(self.flags);
        Registers {
            af: u16::from_le_bytes(self.af),
            bc: u16::from_le_bytes(self.bc),
            de: u16::from_le_bytes(self.de),
            hl: u16::from_le_bytes(self.hl),
            af_alt: u16::from_le_bytes(self.af_alt),
            bc_alt: u16::from_le_bytes(self.bc_alt),
            de_alt: u16::from_le_bytes(self.de_alt),
            hl_alt: u16::from_le_bytes(self.hl_alt),
            ix: u16::from_le_bytes(self.ix),
            iy: u16::from_le_bytes(self.iy),
            sp: u16::from_le_bytes(self.sp),
            pc: u16::from_le_bytes(self.pc),
            i: self.i,
            r: self.r,
            iff1: flags & FLAG_IFF1 != 0,
            iff2: flags & FLAG_IFF2 != 0,
            im: if flags & FLAG_IM2 != 0 { InterruptMode::Mode2 } else { InterruptMode::Mode1 },
        }
    }

    fn new(regs: &Registers, border: u8, with_rom: bool) -> Self {
        let (data_size, start) = if with_rom { (0, 0) } else { (SP_DATA_SIZE, SP_START) };
        let mut flags = 0;
        if regs.iff1 { flags |= FLAG_IFF1 }
        if regs.im == InterruptMode::Mode2 { flags |= FLAG_IM2 }
        if regs.iff2 { flags |= FLAG_IFF2 }
        SpHeader {
            signature: *SP_SIGNATURE,
            data_size: data_size.to_le_bytes(),
            start: start.to_le_bytes(),
            bc: regs.bc.to_le_bytes(),
            de: regs.de.to_le_bytes(),
            hl: regs.hl.to_le_bytes(),
            af: regs.af.to_le_bytes(),
            ix: regs.ix.to_le_bytes(),
            iy: regs.iy.to_le_bytes(),
            bc_alt: regs.bc_alt.to_le_bytes(),
            de_alt: regs.de_alt.to_le_bytes(),
            hl_alt: regs.hl_alt.to_le_bytes(),
            af_alt: regs.af_alt.to_le_bytes(),
            r: regs.r,
            i: regs.i,
            sp: regs.sp.to_le_bytes(),
            pc: regs.pc.to_le_bytes(),
            reserved1: [0, 0],
            border: border & 7,
            reserved2: 0,
            flags: flags.to_le_bytes()
        }
    }
}

/// Loads a **SP** file into the provided snapshot `loader` from a source.
///
/// A 48k class machine is kept, otherwise the 48k architecture is selected.
pub fn load_sp<R: Read, S: SnapshotLoader>(
        mut rd: R,
        loader: &mut S
    ) -> Result<()>
{
    let header = SpHeader::read_new_struct(rd.by_ref())?;
    if &header.signature != SP_SIGNATURE {
        return Err(invalid_data("SP: invalid signature"))
    }
    let data_size = u16::from_le_bytes(header.data_size);
    let start = u16::from_le_bytes(header.start);
    if (data_size != 0 && data_size != SP_DATA_SIZE) || (start != 0 && start != SP_START) {
        return Err(invalid_data("SP: unsupported memory layout"))
    }

    let current = loader.current_arch();
    let arch = if current.is_48k_class() { current } else { Architecture::Spec48 };
    loader.select_arch(arch, header.border & 7).map_err(select_arch_error)?;
    if header.has_rom() {
        loader.read_into_memory(MemoryRange::CustomRom, rd.by_ref().take(PAGE_SIZE as u64))?;
    }
    for &bank in BANKS_48K.iter() {
        loader.read_into_memory(MemoryRange::ram_bank(bank), rd.by_ref().take(PAGE_SIZE as u64))?;
    }
    let regs = header.registers();
    loader.assign_cpu(regs.into_cpu());
    info!("SP: loaded snapshot, PC: 0x{:04x}", regs.pc);
    Ok(())
}

/// Saves a **SP** file from the provided `snapshot` instance into `wr`.
///
/// Only the 48k class machines can be saved. The ROM is embedded when it's been loaded
/// from a snapshot or when `force_rom` is `true`.
pub fn save_sp<C: SnapshotCreator, W: Write>(
        snapshot: &C,
        mut wr: W,
        force_rom: bool
    ) -> Result<()>
{
    if !snapshot.arch().is_48k_class() {
        return Err(invalid_input("SP: only 48k machines can be saved"))
    }
    let cpu = snapshot.cpu();
    if !is_cpu_safe_for_snapshot(cpu) {
        return Err(invalid_input("SP: can't safely snapshot the CPU state"))
    }
    let regs = Registers::from_cpu(cpu);
    let with_rom = snapshot.is_custom_rom() || force_rom;
    SpHeader::new(&regs, snapshot.border(), with_rom).write_struct(wr.by_ref())?;
    if snapshot.is_custom_rom() {
        wr.write_all(snapshot.memory_ref(MemoryRange::CustomRom)?)?;
    }
    else if force_rom {
        wr.write_all(snapshot.memory_ref(MemoryRange::Rom(0..PAGE_SIZE))?)?;
    }
    for &bank in BANKS_48K.iter() {
        wr.write_all(snapshot.memory_ref(MemoryRange::ram_bank(bank))?)?;
    }
    wr.flush()
}
