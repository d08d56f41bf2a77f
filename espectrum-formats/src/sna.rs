/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! **SNA** snapshot format utilities.
use std::io::{Read, Write, Seek, SeekFrom, Result};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use espectrum_core::arch::Architecture;
use espectrum_core::memory::PAGE_SIZE;
use espectrum_peripherals::ay::AyRegister;

use crate::{StructRead, StructWrite};
use super::snapshot::*;
/*
   Offset   Size   Description
   ------------------------------------------------------------------------
   0        1      byte   I
   1        8      word   HL', DE', BC', AF'
   9        10     word   HL, DE, BC, IY, IX
   19       1      byte   Interrupt (bit 2 = IFF2)
   20       1      byte   R
   21       4      word   AF
   23       4      word   SP
   25       1      byte   IntMode (0=IM0|1=IM1|2=IM2)
   26       1      byte   BorderColor (0..=7)
   27       49152  bytes  RAM 16384..=65535
   ------------------------------------------------------------------------
   Size: 49179 bytes, or 65563 bytes with a 16kb ROM between the header and RAM

   Offset   Size   Description
   ------------------------------------------------------------------------
   0        27     bytes  SNA header (see above)
   27       16Kb   bytes  RAM bank 5
   16411    16Kb   bytes  RAM bank 2
   32795    16Kb   bytes  RAM bank n / (currently paged bank)
   49179    2      word   PC
   49181    1      byte   port OUT 0x7ffd
   49182    1      byte   TR-DOS rom paged (1) or not (0)
   49183    16Kb   bytes  remaining RAM banks in ascending order
   ...
   +2A/+3 only:
   131103   1      byte   port OUT 0x1ffd
   131104   1      byte   AY selected register
   131105   16     bytes  AY registers
   ------------------------------------------------------------------------
   Size: 131103 or 147487 bytes, 131121 bytes for +2A/+3
*/
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
#[repr(packed)]
struct SnaHeader {
    i: u8,
    hl_alt: [u8;2],
    de_alt: [u8;2],
    bc_alt: [u8;2],
    af_alt: [u8;2],
    hl: [u8;2],
    de: [u8;2],
    bc: [u8;2],
    iy: [u8;2],
    ix: [u8;2],
    iffs: u8,
    r: u8,
    af: [u8;2],
    sp: [u8;2],
    im: u8,
    border: u8
}

#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
#[repr(packed)]
struct SnaHeader128 {
    pc: [u8;2],
    port_data: u8,
    trdos_rom: u8
}

#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
#[repr(packed)]
struct SnaHeaderPlus2A {
    port_1ffd: u8,
    ay_sel_reg: u8,
    ay_regs: [u8;16]
}

// Structs must be packed and consist of `u8` or/and arrays of `u8` primitives only.
unsafe impl StructRead for SnaHeader {}
unsafe impl StructRead for SnaHeader128 {}
unsafe impl StructRead for SnaHeaderPlus2A {}
unsafe impl StructWrite for SnaHeader {}
unsafe impl StructWrite for SnaHeader128 {}
unsafe impl StructWrite for SnaHeaderPlus2A {}

/// The length in bytes of the 48k **SNA** file.
pub const SNA_LENGTH: u64 = 49179;
/// The length in bytes of the 48k **SNA** file with an embedded ROM.
pub const SNA_WITH_ROM_LENGTH: u64 = 65563;
/// The length in bytes of the 128k **SNA** file.
pub const SNA_128_LENGTH: u64 = 131103;
/// The length in bytes of the 128k **SNA** file when the paged bank is 2 or 5.
pub const SNA_128_DUP_LENGTH: u64 = 147487;
/// The length in bytes of the +2A/+3 **SNA** file.
pub const SNA_PLUS2A_LENGTH: u64 = 131121;

const RAM48_SIZE: usize = 3 * PAGE_SIZE;

impl SnaHeader {
    fn registers(&self) -> Registers {
        let iff = self.iffs & (1 << 2) != 0;
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
            pc: 0,
            i: self.i,
            r: self.r,
            iff1: iff,
            iff2: iff,
            im: interrupt_mode_from(self.im),
        }
    }

    fn from_registers(regs: &Registers, border: u8) -> Self {
        SnaHeader {
            i: regs.i,
            hl_alt: regs.hl_alt.to_le_bytes(),
            de_alt: regs.de_alt.to_le_bytes(),
            bc_alt: regs.bc_alt.to_le_bytes(),
            af_alt: regs.af_alt.to_le_bytes(),
            hl: regs.hl.to_le_bytes(),
            de: regs.de.to_le_bytes(),
            bc: regs.bc.to_le_bytes(),
            iy: regs.iy.to_le_bytes(),
            ix: regs.ix.to_le_bytes(),
            iffs: (regs.iff2 as u8) << 2,
            r: regs.r,
            af: regs.af.to_le_bytes(),
            sp: regs.sp.to_le_bytes(),
            im: interrupt_mode_to(regs.im),
            border: border & 7
        }
    }
}

/// Returns the length of the remaining data in the stream without moving its cursor.
fn stream_len<R: Seek>(mut rd: R) -> Result<u64> {
    let cur_pos = rd.seek(SeekFrom::Current(0))?;
    let end_pos = rd.seek(SeekFrom::End(0))?;
    rd.seek(SeekFrom::Start(cur_pos))?;
    Ok(end_pos.saturating_sub(cur_pos))
}

/// Loads a **SNA** file into the provided snapshot `loader` from a source.
///
/// Requires both [Read] and [Seek] source to determine the file variant from its length.
///
/// The machine architecture is switched only if the current one can't run the snapshot:
/// a 48k snapshot keeps the 48k or TK machines, a 128k snapshot keeps the 128k and Pentagon
/// machines, otherwise Pentagon is selected. The +2A/+3 variant always needs the +2A/+3.
pub fn load_sna<R: Read + Seek, S: SnapshotLoader>(
        mut rd: R,
        loader: &mut S
    ) -> Result<()>
{
    let length = stream_len(rd.by_ref())?;
    let current = loader.current_arch();
    match length {
        SNA_LENGTH|SNA_WITH_ROM_LENGTH => {
            let arch = if current.is_48k_class() { current } else { Architecture::Spec48 };
            load_sna48(rd, loader, arch, length == SNA_WITH_ROM_LENGTH)
        }
        SNA_128_LENGTH|SNA_128_DUP_LENGTH => {
            let arch = match current {
                Architecture::Spec128|Architecture::Pentagon => current,
                _ => Architecture::Pentagon
            };
            load_sna128(rd, loader, arch, false)
        }
        SNA_PLUS2A_LENGTH => {
            load_sna128(rd, loader, Architecture::Plus2A, true)
        }
        _ => Err(invalid_data("SNA: wrong size of the supplied stream"))
    }
}

/// Returns the byte at `address` of the 48k address space made of the `rom` and `ram` images.
///
/// A missing ROM reads as 0xFF.
fn peek48(rom: Option<&[u8]>, ram: &[u8], address: u16) -> u8 {
    let address = address as usize;
    match address.checked_sub(PAGE_SIZE) {
        Some(offset) => ram[offset],
        None => rom.and_then(|rom| rom.get(address)).copied().unwrap_or(u8::max_value())
    }
}

/// Loads a 48k **SNA** file into the provided snapshot `loader` from a source.
///
/// The PC register is popped from the stack through the 48k memory map, wrapping at 0xFFFF,
/// so a stack located in the ROM is read from the embedded or the machine ROM.
/// The memory is left intact.
///
/// # Note
/// This method assumes the provided stream contains the 48k **SNA** version.
pub fn load_sna48<R: Read, S: SnapshotLoader>(
        mut rd: R,
        loader: &mut S,
        arch: Architecture,
        with_rom: bool
    ) -> Result<()>
{
    let sna = SnaHeader::read_new_struct(rd.by_ref())?;
    let mut regs = sna.registers();
    let sp = regs.sp;

    loader.select_arch(arch, sna.border & 7).map_err(select_arch_error)?;
    let mut embedded_rom = None;
    if with_rom {
        let mut rom = vec![0u8; PAGE_SIZE];
        rd.read_exact(&mut rom)?;
        loader.read_into_memory(MemoryRange::CustomRom, &rom[..])?;
        embedded_rom = Some(rom);
    }

    let mut ram = vec![0u8; RAM48_SIZE];
    rd.read_exact(&mut ram)?;
    regs.pc = {
        let rom = embedded_rom.as_deref().or_else(|| loader.paged_rom());
        u16::from_le_bytes([peek48(rom, &ram, sp), peek48(rom, &ram, sp.wrapping_add(1))])
    };
    if sp < 0x4000 || sp == 0xFFFF {
        debug!("SNA: PC popped from the ROM, SP: 0x{:04x}", sp);
    }
    regs.sp = sp.wrapping_add(2);
    for (chunk, &bank) in ram.chunks(PAGE_SIZE).zip(BANKS_48K.iter()) {
        loader.read_into_memory(MemoryRange::ram_bank(bank), chunk)?;
    }
    loader.assign_cpu(regs.into_cpu());
    info!("SNA: loaded 48k snapshot, PC: 0x{:04x}", regs.pc);
    Ok(())
}

fn load_sna128<R: Read, S: SnapshotLoader>(
        mut rd: R,
        loader: &mut S,
        arch: Architecture,
        plus2a: bool
    ) -> Result<()>
{
    let sna = SnaHeader::read_new_struct(rd.by_ref())?;
    let mut regs = sna.registers();
    loader.select_arch(arch, sna.border & 7).map_err(select_arch_error)?;

    loader.read_into_memory(MemoryRange::ram_bank(5), rd.by_ref().take(PAGE_SIZE as u64))?;
    loader.read_into_memory(MemoryRange::ram_bank(2), rd.by_ref().take(PAGE_SIZE as u64))?;
    let mut paged = vec![0u8; PAGE_SIZE];
    rd.read_exact(&mut paged)?;

    let sna_ext = SnaHeader128::read_new_struct(rd.by_ref())?;
    regs.pc = u16::from_le_bytes(sna_ext.pc);
    let last_bank = sna_ext.port_data & 7;
    loader.read_into_memory(MemoryRange::ram_bank(last_bank), &paged[..])?;

    for bank in (0..8).filter(|&n| n != 2 && n != 5 && n != last_bank) {
        loader.read_into_memory(MemoryRange::ram_bank(bank), rd.by_ref().take(PAGE_SIZE as u64))?;
    }

    if plus2a {
        let sna_p2a = SnaHeaderPlus2A::read_new_struct(rd.by_ref())?;
        loader.write_port(0x1ffd, sna_p2a.port_1ffd);
        loader.setup_ay(AyRegister::from(sna_p2a.ay_sel_reg), &sna_p2a.ay_regs);
    }
    loader.write_port(0x7ffd, sna_ext.port_data);
    if sna_ext.trdos_rom != 0 {
        loader.tr_dos_rom_paged_in();
    }
    loader.assign_cpu(regs.into_cpu());
    info!("SNA: loaded {} snapshot, PC: 0x{:04x}, 7ffd: 0x{:02x}", arch, regs.pc, sna_ext.port_data);
    Ok(())
}

/// Saves a **SNA** file from the provided `snapshot` instance into `wr`.
///
/// The 48k machines store the PC register on the stack, the machine memory is not modified
/// though, the PC is patched into the written stream. Stack bytes falling into the ROM are
/// lost, like on the real machine. The ROM is embedded in the 48k variant
/// when it's been loaded from a snapshot or when `force_rom` is `true`.
pub fn save_sna<C: SnapshotCreator, W: Write>(
        snapshot: &C,
        mut wr: W,
        force_rom: bool
    ) -> Result<()>
{
    let cpu = snapshot.cpu();
    if !is_cpu_safe_for_snapshot(cpu) {
        return Err(invalid_input("SNA: can't safely snapshot the CPU state"))
    }
    let arch = snapshot.arch();
    let mut regs = Registers::from_cpu(cpu);
    let border = snapshot.border();

    if arch.is_48k_class() {
        let sp = regs.sp.wrapping_sub(2);
        regs.sp = sp;
        SnaHeader::from_registers(&regs, border).write_struct(wr.by_ref())?;
        if snapshot.is_custom_rom() {
            wr.write_all(snapshot.memory_ref(MemoryRange::CustomRom)?)?;
        }
        else if force_rom {
            wr.write_all(snapshot.memory_ref(MemoryRange::Rom(0..PAGE_SIZE))?)?;
        }
        let mut ram = Vec::with_capacity(RAM48_SIZE);
        for &bank in BANKS_48K.iter() {
            ram.extend_from_slice(snapshot.memory_ref(MemoryRange::ram_bank(bank))?);
        }
        for (address, &byte) in [sp, sp.wrapping_add(1)].iter().zip(regs.pc.to_le_bytes().iter()) {
            if let Some(offset) = (*address as usize).checked_sub(PAGE_SIZE) {
                ram[offset] = byte;
            }
        }
        wr.write_all(&ram)?;
        wr.flush()?;
        return Ok(())
    }

    let latches = snapshot.latches();
    let last_bank = latches.bank & 7;
    let sna_ext = SnaHeader128 {
        pc: regs.pc.to_le_bytes(),
        port_data: last_bank | (latches.video & 1) << 3 | (latches.rom & 1) << 4
                   | (latches.paging_lock as u8) << 5,
        trdos_rom: snapshot.is_tr_dos_rom_paged_in() as u8
    };

    SnaHeader::from_registers(&regs, border).write_struct(wr.by_ref())?;
    for &bank in [5, 2, last_bank].iter() {
        wr.write_all(snapshot.memory_ref(MemoryRange::ram_bank(bank))?)?;
    }
    sna_ext.write_struct(wr.by_ref())?;
    for bank in (0..8).filter(|&n| n != 2 && n != 5 && n != last_bank) {
        wr.write_all(snapshot.memory_ref(MemoryRange::ram_bank(bank))?)?;
    }

    if arch == Architecture::Plus2A {
        let mut sna_p2a = SnaHeaderPlus2A {
            port_1ffd: latches.last_1ffd,
            ..Default::default()
        };
        if let Some((reg, regs)) = snapshot.ay_state() {
            sna_p2a.ay_sel_reg = reg.into();
            sna_p2a.ay_regs = *regs;
        }
        sna_p2a.write_struct(wr.by_ref())?;
    }
    wr.flush()?;
    Ok(())
}
