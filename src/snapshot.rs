/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! Snapshot loading and saving of the [Machine].
use core::convert::Infallible;
use core::fmt;
use core::str::FromStr;
use std::fs::File;
use std::io::{self, Read, Seek, Write, BufReader, BufWriter};
use std::path::Path;

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use crate::arch::Architecture;
use crate::formats::{
    p, sna, sp, z80,
    snapshot::{MemoryRange, SnapshotCreator, SnapshotLoader}
};
use crate::machine::Machine;
use crate::memory::{Latches, ZxMemoryError, PAGE_SIZE};
use crate::peripherals::ay::AyRegister;
use crate::z80emu::Z80NMOS;

/// Snapshot file formats recognized by their file name extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Sna,
    Z80,
    Sp,
    /// A ZX81 program run by the ZX81+ ROM of the 128k, can only be loaded.
    P,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseSnapshotKindError;

impl fmt::Display for ParseSnapshotKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unrecognized snapshot format")
    }
}

impl std::error::Error for ParseSnapshotKindError {}

impl FromStr for SnapshotKind {
    type Err = ParseSnapshotKindError;

    fn from_str(ext: &str) -> Result<Self, Self::Err> {
        if ext.eq_ignore_ascii_case("sna") {
            Ok(SnapshotKind::Sna)
        }
        else if ext.eq_ignore_ascii_case("z80") {
            Ok(SnapshotKind::Z80)
        }
        else if ext.eq_ignore_ascii_case("sp") {
            Ok(SnapshotKind::Sp)
        }
        else if ext.eq_ignore_ascii_case("p") {
            Ok(SnapshotKind::P)
        }
        else {
            Err(ParseSnapshotKindError)
        }
    }
}

impl SnapshotKind {
    /// Returns the format of the file at `path` from its extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        path.as_ref().extension()?.to_str()?.parse().ok()
    }
}

/// Key strokes making the ZX81+ ROM ready for a ZX81 program: the keys as (half-row, bit),
/// the number of frames they are held down, then the number of frames after releasing them.
///
/// Enters the ZX81 mode, then types `PAUSE 5000`.
const ZX81_LOADER_KEYS: &[(&[(usize, u8)], u32, u32)] = &[
    (&[], 0, 15),
    (&[(0, 0), (4, 4)], 1, 1),
    (&[(0, 0), (4, 4)], 1, 1),
    (&[(0, 0), (4, 4)], 1, 1),
    (&[(0, 0), (4, 4)], 1, 1),
    (&[(6, 0)], 1, 1),
    (&[], 0, 142),
    (&[(7, 2)], 2, 4),
    (&[(3, 4)], 2, 4),
    (&[(4, 0)], 2, 4),
    (&[(4, 0)], 2, 4),
    (&[(4, 0)], 2, 4),
    (&[(6, 0)], 2, 4),
    (&[], 0, 22),
];

fn unsupported_format() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, ParseSnapshotKindError)
}

impl SnapshotLoader for Machine {
    type Error = Infallible;

    fn current_arch(&self) -> Architecture {
        self.config().arch
    }

    fn select_arch(&mut self, arch: Architecture, border: u8) -> Result<(), Self::Error> {
        if arch != self.config().arch {
            let config = crate::config::MachineConfig { arch, ..self.config().clone() };
            self.set_config(config);
        }
        self.reset(true);
        self.ports_mut().set_border(border);
        Ok(())
    }

    fn read_into_memory<R: Read>(&mut self, range: MemoryRange, reader: R) -> Result<(), ZxMemoryError> {
        let memory = self.memory_mut();
        match range {
            MemoryRange::Ram(range) => memory.load_into_ram(range, reader),
            MemoryRange::CustomRom => memory.load_custom_rom(reader),
            MemoryRange::Rom(range) if range.start % PAGE_SIZE == 0 && range.len() == PAGE_SIZE => {
                memory.load_rom((range.start / PAGE_SIZE) as u8, reader)
            }
            _ => Err(ZxMemoryError::UnsupportedAddressRange)
        }
    }

    fn assign_cpu(&mut self, cpu: Z80NMOS) {
        *self.cpu_mut() = cpu;
    }

    fn write_port(&mut self, port: u16, data: u8) {
        let arch = self.config().arch;
        let memory = self.memory_mut();
        match (port, arch) {
            (0x7ffd, Architecture::Plus2A) => { memory.page_plus2a_7ffd(data); }
            (0x7ffd, _) => { memory.page_128(data); }
            (0x1ffd, Architecture::Plus2A) => { memory.page_plus2a_1ffd(data); }
            _ => warn!("snapshot: ignored write to port 0x{:04x}", port)
        }
    }

    fn set_issue2(&mut self, issue2: bool) {
        if issue2 != self.config().issue2 {
            let config = crate::config::MachineConfig { issue2, ..self.config().clone() };
            self.set_config(config);
        }
    }

    fn setup_ay(&mut self, reg_selected: AyRegister, reg_values: &[u8;16]) {
        self.ports_mut().ay.set_registers(reg_selected as u8, reg_values);
    }

    fn tr_dos_rom_paged_in(&mut self) {
        self.memory_mut().page_trdos(true);
    }

    fn paged_rom(&self) -> Option<&[u8]> {
        let memory = self.memory();
        memory.rom_ref(memory.latches().rom_in_use).ok()
    }

    fn zx81_loader(&mut self) -> Result<(), Self::Error> {
        if !self.config().zx81_ay {
            let config = crate::config::MachineConfig { zx81_ay: true, ..self.config().clone() };
            self.set_config(config);
        }
        for &(keys, held, released) in ZX81_LOADER_KEYS {
            for &(row, bit) in keys {
                self.ports_mut().keyboard.press(row, bit);
            }
            (0..held).for_each(|_| self.run_frame());
            for &(row, bit) in keys {
                self.ports_mut().keyboard.release(row, bit);
            }
            (0..released).for_each(|_| self.run_frame());
        }
        debug!("snapshot: ZX81+ ready after {} frames", self.frame_count());
        Ok(())
    }
}

impl SnapshotCreator for Machine {
    fn arch(&self) -> Architecture {
        self.config().arch
    }

    fn cpu(&self) -> &Z80NMOS {
        Machine::cpu(self)
    }

    fn border(&self) -> u8 {
        Machine::border(self)
    }

    fn issue2(&self) -> bool {
        self.config().issue2
    }

    fn memory_ref(&self, range: MemoryRange) -> Result<&[u8], ZxMemoryError> {
        let memory = self.memory();
        match range {
            MemoryRange::Ram(range) => memory.ram_ref(range),
            MemoryRange::CustomRom if memory.is_custom_rom() => memory.rom_ref(0),
            MemoryRange::Rom(range) => {
                let page = range.start / PAGE_SIZE;
                let offset = range.start % PAGE_SIZE;
                let rom = memory.rom_ref(page as u8)?;
                rom.get(offset..offset + range.len()).ok_or(ZxMemoryError::UnsupportedAddressRange)
            }
            _ => Err(ZxMemoryError::UnsupportedAddressRange)
        }
    }

    fn latches(&self) -> Latches {
        *self.memory().latches()
    }

    fn is_custom_rom(&self) -> bool {
        self.memory().is_custom_rom()
    }

    fn is_tr_dos_rom_paged_in(&self) -> bool {
        self.memory().is_trdos_paged_in()
    }

    fn ay_state(&self) -> Option<(AyRegister, &[u8;16])> {
        if self.config().has_ay() {
            let ay = &self.ports().ay;
            Some((ay.selected_register(), ay.registers()))
        }
        else {
            None
        }
    }
}

impl Machine {
    /// Loads a snapshot of the given format from a source.
    pub fn load_snapshot_from<R: Read + Seek>(&mut self, kind: SnapshotKind, rd: R) -> io::Result<()> {
        match kind {
            SnapshotKind::Sna => sna::load_sna(rd, self)?,
            SnapshotKind::Z80 => z80::load_z80(rd, self)?,
            SnapshotKind::Sp => sp::load_sp(rd, self)?,
            SnapshotKind::P => p::load_p(rd, self)?,
        }
        self.set_current_tstate(0);
        info!("snapshot: {:?} loaded, {}", kind, self.config().arch);
        Ok(())
    }
    /// Saves a snapshot of the given format into a destination.
    ///
    /// Saving [SnapshotKind::P] is not supported.
    ///
    /// The 48k ROM is embedded into the snapshot if it's been loaded from a snapshot or
    /// when `force_rom` is `true`, provided the format supports it.
    pub fn save_snapshot_to<W: Write>(&self, kind: SnapshotKind, wr: W, force_rom: bool) -> io::Result<()> {
        match kind {
            SnapshotKind::Sna => sna::save_sna(self, wr, force_rom),
            SnapshotKind::Z80 => z80::save_z80(self, wr, force_rom),
            SnapshotKind::Sp => sp::save_sp(self, wr, force_rom),
            SnapshotKind::P => Err(unsupported_format()),
        }
    }
    /// Loads a snapshot file, the format is selected by the file name extension.
    pub fn load_snapshot<P: AsRef<Path>>(&mut self, path: P) -> io::Result<SnapshotKind> {
        let path = path.as_ref();
        let kind = SnapshotKind::from_path(path).ok_or_else(unsupported_format)?;
        let file = BufReader::new(File::open(path)?);
        self.load_snapshot_from(kind, file)?;
        Ok(kind)
    }
    /// Saves a snapshot file, the format is selected by the file name extension.
    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P, force_rom: bool) -> io::Result<SnapshotKind> {
        let path = path.as_ref();
        let kind = SnapshotKind::from_path(path).ok_or_else(unsupported_format)?;
        let mut file = BufWriter::new(File::create(path)?);
        self.save_snapshot_to(kind, file.by_ref(), force_rom)?;
        file.flush()?;
        info!("snapshot: {:?} saved to {}", kind, path.display());
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::config::MachineConfig;
    use crate::memory::Page;
    use crate::z80emu::{Cpu, StkReg16};

    fn machine(arch: Architecture) -> Machine {
        let mut machine = Machine::new(MachineConfig { arch, ..Default::default() });
        for bank in 0..8 {
            machine.memory_mut().ram_bank_mut(bank).iter_mut().enumerate()
                   .for_each(|(i, p)| *p = (i as u8).wrapping_mul(bank + 3));
        }
        let cpu = machine.cpu_mut();
        cpu.set_reg16(StkReg16::BC, 0x1234);
        cpu.set_sp(0x8000);
        cpu.set_pc(0x6789);
        cpu.set_i(0x3F);
        machine.ports_mut().set_border(3);
        machine
    }

    #[test]
    fn snapshot_kind_works() {
        assert_eq!(SnapshotKind::from_path("game.SNA"), Some(SnapshotKind::Sna));
        assert_eq!(SnapshotKind::from_path("dir/game.z80"), Some(SnapshotKind::Z80));
        assert_eq!(SnapshotKind::from_path("game.sp"), Some(SnapshotKind::Sp));
        assert_eq!(SnapshotKind::from_path("prog.P"), Some(SnapshotKind::P));
        assert_eq!(SnapshotKind::from_path("game.tap"), None);
        assert_eq!(SnapshotKind::from_path("game"), None);
        assert_eq!("Sp".parse::<SnapshotKind>(), Ok(SnapshotKind::Sp));
    }

    #[test]
    fn machine_z80_snapshot_works() {
        let mut src = machine(Architecture::Spec128);
        src.memory_mut().page_128(0x1B);
        src.ports_mut().ay.set_registers(7, &[3; 16]);
        let mut data = Vec::new();
        src.save_snapshot_to(SnapshotKind::Z80, &mut data, false).unwrap();
        let mut dst = Machine::new(MachineConfig::default());
        dst.load_snapshot_from(SnapshotKind::Z80, Cursor::new(&data)).unwrap();
        assert_eq!(dst.config().arch, Architecture::Spec128);
        assert_eq!(dst.border(), 3);
        assert_eq!(dst.cpu().get_reg16(StkReg16::BC), 0x1234);
        assert_eq!(dst.cpu().get_pc(), 0x6789);
        assert_eq!(dst.memory().window(3), Page::Ram(3));
        assert_eq!(dst.memory().latches().video, 1);
        assert_eq!(dst.memory().ram_ref(0..8 * PAGE_SIZE).unwrap(),
                   src.memory().ram_ref(0..8 * PAGE_SIZE).unwrap());
        assert_eq!(dst.ports().ay.selected_register(), AyRegister::MixerControl);
        assert_eq!(dst.ports().ay.registers(), src.ports().ay.registers());
    }

    #[test]
    fn machine_sna_snapshot_works() {
        let src = machine(Architecture::Spec48);
        let mut data = Vec::new();
        src.save_snapshot_to(SnapshotKind::Sna, &mut data, false).unwrap();
        assert_eq!(data.len(), 49179);
        let mut dst = Machine::new(MachineConfig { arch: Architecture::Pentagon, ..Default::default() });
        dst.load_snapshot_from(SnapshotKind::Sna, Cursor::new(&data)).unwrap();
        assert_eq!(dst.config().arch, Architecture::Spec48);
        assert_eq!(dst.cpu().get_pc(), 0x6789);
        assert_eq!(dst.cpu().get_sp(), 0x8000);
        assert_eq!(dst.border(), 3);
        for &bank in &[2, 0] {
            assert_eq!(dst.memory().ram_bank(bank), src.memory().ram_bank(bank));
        }
        // the PC pushed on the stack stays in the memory
        assert_eq!(dst.memory().ram_bank(5)[..0x3FFE], src.memory().ram_bank(5)[..0x3FFE]);
        assert_eq!(dst.memory().read_word(0x7FFE), 0x6789);
        let mut data2 = Vec::new();
        dst.save_snapshot_to(SnapshotKind::Sna, &mut data2, false).unwrap();
        assert_eq!(data, data2);
    }

    #[test]
    fn machine_sna_stack_at_rom_boundary_works() {
        let mut src = machine(Architecture::Spec48);
        let mut rom = vec![0u8; PAGE_SIZE];
        rom[0x3FFF] = 0x34;
        src.memory_mut().load_rom(0, &rom[..]).unwrap();
        src.cpu_mut().set_sp(0x4001);
        src.cpu_mut().set_pc(0x1299);
        let mut data = Vec::new();
        src.save_snapshot_to(SnapshotKind::Sna, &mut data, false).unwrap();
        // the low byte of the PC lands in the ROM and is lost
        assert_eq!(data[27], 0x12);
        let mut dst = Machine::new(MachineConfig::default());
        dst.memory_mut().load_rom(0, &rom[..]).unwrap();
        dst.load_snapshot_from(SnapshotKind::Sna, Cursor::new(&data)).unwrap();
        assert_eq!(dst.cpu().get_pc(), 0x1234);
        assert_eq!(dst.cpu().get_sp(), 0x4001);
    }

    #[test]
    fn machine_p_load_works() {
        let mut machine = Machine::new(MachineConfig::default());
        let program = [0x00, 0x76, 0xAB, 0xCD];
        machine.load_snapshot_from(SnapshotKind::P, Cursor::new(&program[..])).unwrap();
        assert_eq!(machine.config().arch, Architecture::Spec128);
        assert!(machine.config().zx81_ay);
        assert!(machine.frame_count() >= 200);
        assert_eq!(machine.memory().window(1), Page::Ram(5));
        assert_eq!(machine.memory().read_byte(0x4008), 0);
        for (i, &b) in program.iter().enumerate() {
            assert_eq!(machine.memory().read_byte(0x4009 + i as u16), b);
        }
        assert_eq!(machine.ports().keyboard.read_keyboard(0), 0xBF);
        assert!(machine.save_snapshot_to(SnapshotKind::P, io::sink(), false).is_err());

        let mut machine = Machine::new(MachineConfig::default());
        let program = vec![0u8; 0x4000 - 8];
        assert!(machine.load_snapshot_from(SnapshotKind::P, Cursor::new(&program)).is_err());
        assert_eq!(machine.config().arch, Architecture::Spec48);
        assert!(!machine.config().zx81_ay);
    }

    #[test]
    fn machine_sp_snapshot_works() {
        let src = machine(Architecture::Spec128);
        assert!(src.save_snapshot_to(SnapshotKind::Sp, io::sink(), false).is_err());
        let src = machine(Architecture::Tk90x);
        let mut data = Vec::new();
        src.save_snapshot_to(SnapshotKind::Sp, &mut data, false).unwrap();
        let mut dst = Machine::new(MachineConfig { arch: Architecture::Tk90x, ..Default::default() });
        dst.load_snapshot_from(SnapshotKind::Sp, Cursor::new(&data)).unwrap();
        assert_eq!(dst.config().arch, Architecture::Tk90x);
        assert_eq!(dst.cpu().get_pc(), 0x6789);
        assert_eq!(dst.memory().ram_bank(2), src.memory().ram_bank(2));
    }
}
