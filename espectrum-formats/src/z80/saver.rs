/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
use std::io::{Write, Result};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use espectrum_core::arch::Architecture;
use espectrum_core::memory::PAGE_SIZE;

use crate::snapshot::*;
use crate::StructWrite;
use super::common::*;
use super::compress::*;

fn init_z80_header(header: &mut Header, regs: &Registers, border: u8, issue2: bool) {
    let flags1 = Flags1::empty()
                 .with_border_color(border)
                 .with_refresh_high_bit(regs.r);
    let flags2 = Flags2::empty()
                 .with_interrupt_mode(interrupt_mode_to(regs.im))
                 .with_issue2_emulation(issue2);
    let [f, a] = regs.af.to_le_bytes();
    header.a = a;
    header.f = f;
    header.bc = regs.bc.to_le_bytes();
    header.hl = regs.hl.to_le_bytes();
    header.pc = [0, 0];
    header.sp = regs.sp.to_le_bytes();
    header.i = regs.i;
    header.r7 = regs.r & 0x7F;
    header.flags1 = flags1.bits();
    header.de = regs.de.to_le_bytes();
    header.bc_alt = regs.bc_alt.to_le_bytes();
    header.de_alt = regs.de_alt.to_le_bytes();
    header.hl_alt = regs.hl_alt.to_le_bytes();
    let [f_alt, a_alt] = regs.af_alt.to_le_bytes();
    header.a_alt = a_alt;
    header.f_alt = f_alt;
    header.iy = regs.iy.to_le_bytes();
    header.ix = regs.ix.to_le_bytes();
    header.iff1 = regs.iff1 as u8;
    header.iff2 = regs.iff2 as u8;
    header.flags2 = flags2.bits();
}

fn init_z80_header_ex<C: SnapshotCreator>(header_ex: &mut HeaderEx, snapshot: &C, pc: u16) {
    let arch = snapshot.arch();
    header_ex.pc = pc.to_le_bytes();
    header_ex.hw_mode = hw_mode_from_arch(arch);
    if arch.is_128k_class() {
        let latches = snapshot.latches();
        header_ex.port1 = (latches.bank & 7) | (latches.video & 1) << 3 | (latches.rom & 1) << 4
                        | (latches.paging_lock as u8) << 5;
    }
    if let Some((reg, regs)) = snapshot.ay_state() {
        if arch.is_48k_class() {
            header_ex.flags3 = Flags3::AY_SOUND_EMU.bits();
        }
        header_ex.ay_sel_reg = reg.into();
        header_ex.ay_regs = *regs;
    }
    if arch == Architecture::Plus2A {
        header_ex.port2 = snapshot.latches().last_1ffd;
    }
}

/// Writes a memory block, raw if the compression doesn't make it any shorter.
fn write_mem_block<W: Write>(mut wr: W, data: &[u8], page: u8, buf: &mut Vec<u8>) -> Result<()> {
    buf.clear();
    compress_write_all(data, &mut *buf)?;
    if buf.len() >= PAGE_SIZE {
        MemoryHeader::new(MEMORY_RAW_LENGTH, page).write_struct(wr.by_ref())?;
        wr.write_all(data)
    }
    else {
        MemoryHeader::new(buf.len() as u16, page).write_struct(wr.by_ref())?;
        wr.write_all(buf)
    }
}

/// Saves a version 3 **Z80** file from the provided `snapshot` instance into `wr`.
///
/// The 48k machines save the ROM as page 0 when it's been loaded from a snapshot or when
/// `force_rom` is `true`.
///
/// Returns an error with [std::io::ErrorKind::InvalidInput] if the CPU is in the middle
/// of a prefixed instruction.
pub fn save_z80<C: SnapshotCreator, W: Write>(
        snapshot: &C,
        mut wr: W,
        force_rom: bool
    ) -> Result<()>
{
    let cpu = snapshot.cpu();
    if !is_cpu_safe_for_snapshot(cpu) {
        return Err(invalid_input("Z80: can't safely snapshot the CPU state"))
    }
    let arch = snapshot.arch();
    let regs = Registers::from_cpu(cpu);

    let mut header = Header::default();
    init_z80_header(&mut header, &regs, snapshot.border(),
                    arch.is_48k_class() && snapshot.issue2());
    header.write_struct(wr.by_ref())?;

    let mut header_ex = HeaderEx::default();
    init_z80_header_ex(&mut header_ex, snapshot, regs.pc);
    wr.write_all(&HEADER_EX_V3_LENGTH.to_le_bytes())?;
    header_ex.write_struct_with_limit(wr.by_ref(), HEADER_EX_V3_LENGTH as usize)?;

    let mut buf = Vec::with_capacity(PAGE_SIZE);
    if arch.is_48k_class() {
        if snapshot.is_custom_rom() {
            write_mem_block(wr.by_ref(), snapshot.memory_ref(MemoryRange::CustomRom)?, 0, &mut buf)?;
        }
        else if force_rom {
            write_mem_block(wr.by_ref(), snapshot.memory_ref(MemoryRange::Rom(0..PAGE_SIZE))?, 0, &mut buf)?;
        }
        for &(page, bank) in [(4, 2), (5, 0), (8, 5)].iter() {
            write_mem_block(wr.by_ref(), snapshot.memory_ref(MemoryRange::ram_bank(bank))?, page, &mut buf)?;
        }
    }
    else {
        for bank in 0..8 {
            write_mem_block(wr.by_ref(), snapshot.memory_ref(MemoryRange::ram_bank(bank))?, bank + 3, &mut buf)?;
        }
    }
    wr.flush()?;
    debug!("Z80: saved {} snapshot, PC: 0x{:04x}", arch, regs.pc);
    Ok(())
}
