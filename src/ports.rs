/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! The I/O port engine: decodes port accesses, dispatches them to the attached devices
//! and accounts for the I/O contention of the emulated machine.
#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use crate::arch::Architecture;
use crate::clock::{FTs, ContentionTable, tk_io_contention};
use crate::config::MachineConfig;
use crate::floating_bus::FloatingBus;
use crate::keyboard::Keyboard;
use crate::memory::MemoryManager;
use crate::peripherals::{
    ay::Ay3_8912,
    beeper::{Beeper, speaker_level, LOAD_MONITOR_LEVEL},
    covox::Covox,
    joystick::{KempstonJoystick, FullerJoystick, JoystickInterface, is_kempston_port, is_fuller_port},
    mouse::KempstonMouse,
    realtape::RealTape,
    wd1793::Wd1793
};

/// Advances through the T-states of a single I/O cycle, applying contention.
struct IoCursor<'a> {
    ts: FTs,
    table: &'a ContentionTable,
}

impl<'a> IoCursor<'a> {
    #[inline]
    fn draw(&mut self, ts: FTs, contended: bool) {
        if contended {
            self.ts += self.table.delay(self.ts);
        }
        self.ts += ts;
    }
    /// The last 3 T-states of a port access not decoded by the ULA.
    #[inline]
    fn late(&mut self, contended: bool) {
        if contended {
            for _ in 0..3 {
                self.draw(1, true);
            }
        }
        else {
            self.draw(3, false);
        }
    }
}

/// All port-mapped devices of the emulated machine.
///
/// Input devices are exposed as public fields so the host can update their state
/// between frames.
#[derive(Debug)]
pub struct Ports {
    config: MachineConfig,
    table: ContentionTable,
    floating_bus: FloatingBus,
    port254: u8,
    border: u8,
    border_changes: Vec<(FTs, u8)>,
    ear_in: bool,
    pub keyboard: Keyboard,
    pub beeper: Beeper,
    pub ay: Ay3_8912,
    pub covox: Covox,
    pub kempston: KempstonJoystick,
    pub fuller: FullerJoystick,
    pub mouse: KempstonMouse,
    pub betadisk: Wd1793,
    /// The real tape capture ring driving the EAR input, if attached.
    pub realtape: Option<RealTape>,
}

impl Ports {
    pub fn new(config: &MachineConfig) -> Self {
        Ports {
            config: config.clone(),
            table: ContentionTable::new(config.arch, config.tk_alu),
            floating_bus: FloatingBus::new(config.arch, config.tk_alu),
            port254: 0,
            border: 7,
            border_changes: Vec::new(),
            ear_in: false,
            keyboard: Keyboard::default(),
            beeper: Beeper::default(),
            ay: Ay3_8912::default(),
            covox: Covox::new(config.covox),
            kempston: KempstonJoystick::default(),
            fuller: FullerJoystick::default(),
            mouse: KempstonMouse::default(),
            betadisk: Wd1793::default(),
            realtape: None,
        }
    }
    /// Applies a new configuration, keeping the state of the attached devices.
    pub fn reconfigure(&mut self, config: &MachineConfig) {
        self.table = ContentionTable::new(config.arch, config.tk_alu);
        self.floating_bus = FloatingBus::new(config.arch, config.tk_alu);
        self.covox.mode = config.covox;
        self.config = config.clone();
    }
    /// Resets the device state to the power-on values.
    pub fn reset(&mut self) {
        self.port254 = 0;
        self.border = 7;
        self.border_changes.clear();
        self.beeper.reset();
        self.ay.reset();
        self.covox.reset();
        self.betadisk.reset();
    }
    #[inline]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }
    #[inline]
    pub fn contention_table(&self) -> &ContentionTable {
        &self.table
    }
    /// Returns the current border color (0..=7).
    #[inline]
    pub fn border(&self) -> u8 {
        self.border
    }
    /// Sets the border color without recording a change, e.g. from a snapshot.
    pub fn set_border(&mut self, border: u8) {
        self.border = border & 7;
        self.port254 = (self.port254 & !7) | self.border;
    }
    /// Returns border color changes recorded during the current frame.
    #[inline]
    pub fn border_changes(&self) -> &[(FTs, u8)] {
        &self.border_changes
    }
    /// Returns the last value written to the ULA port.
    #[inline]
    pub fn port254(&self) -> u8 {
        self.port254
    }
    /// Sets the EAR input level coming from the tape player.
    #[inline]
    pub fn set_ear_in(&mut self, ear: bool) {
        self.ear_in = ear;
    }
    #[inline]
    pub fn ear_in(&self) -> bool {
        self.ear_in
    }
    /// Clears all changes recorded during the current frame.
    pub fn next_frame(&mut self) {
        self.border_changes.clear();
        self.beeper.next_frame();
        self.ay.next_frame();
        self.covox.next_frame();
    }

    #[inline]
    fn has_ula_contention(&self, memory: &MemoryManager, address: u16) -> bool {
        self.config.arch.has_io_contention() && memory.is_window_contended((address >> 14) as usize)
    }

    #[inline]
    fn tk_io(&self, cursor: &IoCursor, address: u16) -> FTs {
        tk_io_contention(cursor.ts, address, self.config.tk_alu)
    }

    /// Reads a port at the frame T-state `ts`.
    ///
    /// Returns the data, `true` if the memory paging has changed and the total number
    /// of T-states the I/O cycle took. Only the 128k pages memory when reading unattached
    /// ports, see [MemoryManager::page_128_readback].
    pub fn input(&mut self, memory: &mut MemoryManager, address: u16, ts: FTs) -> (u8, bool, FTs) {
        let table = self.table;
        let mut cursor = IoCursor { ts, table: &table };
        let contended = self.has_ula_contention(memory, address);
        cursor.draw(1, contended);
        let (data, paged) = if address & 1 == 0 {
            (self.read_ula(address, &mut cursor), false)
        }
        else {
            self.read_odd(memory, address, &mut cursor, contended)
        };
        trace!("in 0x{:04x} -> 0x{:02x} at {}", address, data, ts);
        (data, paged, cursor.ts - ts)
    }

    fn read_ula(&mut self, address: u16, cursor: &mut IoCursor) -> u8 {
        if self.config.has_tk_io_contention() {
            let delay = self.tk_io(cursor, address);
            cursor.draw(3 + delay, false);
        }
        else {
            cursor.draw(3, self.config.arch.has_io_contention());
        }
        let mut data = self.keyboard.read_keyboard((address >> 8) as u8) & self.config.ula_idle_bits();
        let ear = match self.realtape {
            Some(ref realtape) if self.config.tape_player_enabled && realtape.is_enabled() => {
                realtape.level(cursor.ts.max(0) as u32)
            }
            _ => self.ear_in
        };
        let arch = self.config.arch;
        if arch.is_48k_class() && self.config.issue2 {
            if self.port254 & 0x18 != 0 {
                data |= 0x40;
            }
        }
        else if arch != Architecture::Plus2A && self.port254 & 0x10 != 0 {
            data |= 0x40;
        }
        if ear {
            data ^= 0x40;
        }
        data
    }

    fn read_odd(&mut self, memory: &mut MemoryManager, address: u16, cursor: &mut IoCursor, contended: bool) -> (u8, bool) {
        if self.config.has_tk_io_contention() {
            let delay = self.tk_io(cursor, address);
            cursor.draw(3 + delay, false);
        }
        else {
            cursor.late(contended);
        }
        if let Some(data) = self.read_device(memory, address) {
            return (data, false)
        }
        match self.config.arch {
            Architecture::Plus2A => {
                let data = if memory.latches().paging_lock || (address & 4093) != address {
                    0xFF
                }
                else {
                    self.floating_bus.sample(cursor.ts, memory.screen(), memory.last_contended_rw())
                };
                (data, false)
            }
            arch => {
                let data = self.floating_bus.sample(cursor.ts, memory.screen(), memory.last_contended_rw());
                let paged = arch == Architecture::Spec128 && address & 0x8002 == 0
                            && memory.page_128_readback(data);
                if paged {
                    debug!("paging by reading 0x{:04x}: 0x{:02x}", address, data);
                }
                (data, paged)
            }
        }
    }

    /// Returns the data of a device decoding the odd port `address`.
    fn read_device(&mut self, memory: &MemoryManager, address: u16) -> Option<u8> {
        let trdos = self.config.betadisk && memory.is_trdos_paged_in();
        if trdos {
            match address & 0xE3 {
                0x03 => return Some(self.betadisk.read_status_reg()),
                0x23 => return Some(self.betadisk.read_track_reg()),
                0x43 => return Some(self.betadisk.read_sector_reg()),
                0x63 => return Some(self.betadisk.read_data_reg()),
                0xE3 => return Some(self.betadisk.read_system_reg()),
                _ => {}
            }
        }
        if self.config.mouse {
            if let Some(data) = self.mouse.port_read(address) {
                return Some(data)
            }
        }
        if self.config.kempston_joystick && is_kempston_port(address) {
            return Some(self.kempston.port_read())
        }
        if self.config.fuller_joystick && !trdos && is_fuller_port(address) {
            return Some(self.fuller.port_read())
        }
        if self.config.has_ay() {
            let lo = address & 0xFF;
            if (self.config.zx81_ay && (lo == 0xCF || lo == 0xDF))
               || (!trdos && lo == 0x3F)
               || address & 0xC002 == 0xC000
               || (self.config.arch == Architecture::Plus2A && address & 0xC002 == 0x8000) {
                return Some(self.ay.data_port_read())
            }
        }
        None
    }

    /// Writes `data` to a port at the frame T-state `ts`.
    ///
    /// Returns `true` if the memory paging has changed and the total number of T-states
    /// the I/O cycle took.
    pub fn output(&mut self, memory: &mut MemoryManager, address: u16, data: u8, ts: FTs) -> (bool, FTs) {
        let table = self.table;
        let mut cursor = IoCursor { ts, table: &table };
        let contended = self.has_ula_contention(memory, address);
        cursor.draw(1, contended);
        trace!("out 0x{:04x} <- 0x{:02x} at {}", address, data, ts);
        let proceed = if address & 1 == 0 {
            self.write_ula(memory, address, data, &mut cursor)
        }
        else {
            self.write_odd(memory, address, data, &mut cursor, contended)
        };
        let paged = proceed && self.write_paging(memory, address, data);
        (paged, cursor.ts - ts)
    }

    /// Returns `false` if the port was fully decoded and the paging ports must be skipped.
    fn write_ula(&mut self, memory: &MemoryManager, address: u16, data: u8, cursor: &mut IoCursor) -> bool {
        let config = &self.config;
        let tk_io = config.has_tk_io_contention();
        self.port254 = data;
        if data & 7 != self.border {
            self.border = data & 7;
            self.border_changes.push((cursor.ts, self.border));
            if config.arch.has_io_contention() {
                if tk_io {
                    let delay = tk_io_contention(cursor.ts, address, config.tk_alu);
                    cursor.draw(delay, false);
                }
                else {
                    cursor.draw(0, true);
                }
            }
        }
        if !config.turbo {
            let level = if config.load_monitor {
                if self.ear_in { LOAD_MONITOR_LEVEL } else { 0 }
            }
            else {
                speaker_level(data, self.ear_in)
            };
            self.beeper.set_level(level, cursor.ts);
        }
        let late = |cursor: &mut IoCursor| {
            if tk_io {
                let delay = tk_io_contention(cursor.ts, address, config.tk_alu);
                cursor.draw(3 + delay, false);
            }
            else {
                cursor.draw(3, config.arch.has_io_contention());
            }
        };
        let lo = address & 0xFF;
        if config.has_ay() {
            if config.zx81_ay && matches!(lo, 0xCF|0xDF|0x1F|0x0F) {
                zx81_ay_write(&mut self.ay, lo, data, cursor.ts);
                cursor.draw(3, true);
                return false
            }
            if !memory.is_trdos_paged_in() && (lo == 0x3F || lo == 0x5F) {
                fullerbox_write(&mut self.ay, lo, data, cursor.ts);
                if tk_io {
                    late(cursor);
                }
                else {
                    cursor.draw(3, true);
                }
                return false
            }
            if address & 0x8002 == 0x8000 {
                ay_write(&mut self.ay, address, data, cursor.ts);
                late(cursor);
                return false
            }
        }
        late(cursor);
        true
    }

    fn write_odd(&mut self, memory: &MemoryManager, address: u16, data: u8, cursor: &mut IoCursor, contended: bool) -> bool {
        let tk_io = self.config.has_tk_io_contention();
        let tk_alu = self.config.tk_alu;
        let late = |cursor: &mut IoCursor| {
            if tk_io {
                let delay = tk_io_contention(cursor.ts, address, tk_alu);
                cursor.draw(3 + delay, false);
            }
            else {
                cursor.late(contended);
            }
        };
        let lo = address & 0xFF;
        let trdos = self.config.betadisk && memory.is_trdos_paged_in();
        if self.config.has_ay() {
            if self.config.zx81_ay && matches!(lo, 0xCF|0xDF|0x1F|0x0F) {
                zx81_ay_write(&mut self.ay, lo, data, cursor.ts);
                cursor.late(memory.is_window_contended((address >> 14) as usize));
                return false
            }
            if !trdos && (lo == 0x3F || lo == 0x5F) {
                fullerbox_write(&mut self.ay, lo, data, cursor.ts);
                late(cursor);
                return false
            }
            if address & 0x8002 == 0x8000 {
                ay_write(&mut self.ay, address, data, cursor.ts);
                late(cursor);
                return true
            }
        }
        if trdos {
            let decoded = match lo {
                0xFF => { self.betadisk.write_system_reg(data); true }
                0x1F => { self.betadisk.write_command_reg(data); true }
                0x3F => { self.betadisk.write_track_reg(data); true }
                0x5F => { self.betadisk.write_sector_reg(data); true }
                0x7F => { self.betadisk.write_data_reg(data); true }
                _ => false
            };
            if decoded {
                late(cursor);
                return true
            }
        }
        self.covox.write_io(address, data, cursor.ts);
        late(cursor);
        true
    }

    fn write_paging(&mut self, memory: &mut MemoryManager, address: u16, data: u8) -> bool {
        match self.config.arch {
            Architecture::Spec128|Architecture::Pentagon if address & 0x8002 == 0 => {
                memory.page_128(data)
            }
            Architecture::Plus2A if address & 0xC002 == 0x4000 => {
                memory.page_plus2a_7ffd(data)
            }
            Architecture::Plus2A if address & 0xF002 == 0x1000 => {
                memory.page_plus2a_1ffd(data)
            }
            _ => false
        }
    }
}

#[inline]
fn ay_write(ay: &mut Ay3_8912, address: u16, data: u8, ts: FTs) {
    if address & 0x4000 != 0 {
        ay.select_port_write(data);
    }
    else {
        ay.data_port_write(data, ts);
    }
}

#[inline]
fn zx81_ay_write(ay: &mut Ay3_8912, lo: u16, data: u8, ts: FTs) {
    if lo & 0x80 != 0 {
        ay.select_port_write(data);
    }
    else {
        ay.data_port_write(data, ts);
    }
}

#[inline]
fn fullerbox_write(ay: &mut Ay3_8912, lo: u16, data: u8, ts: FTs) {
    if lo == 0x3F {
        ay.select_port_write(data);
    }
    else {
        ay.data_port_write(data, ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CovoxMode;
    use crate::peripherals::ay::AyRegister;
    use crate::peripherals::joystick::Directions;
    use crate::memory::Page;

    fn ports(arch: Architecture) -> (Ports, MemoryManager) {
        let config = MachineConfig { arch, ..Default::default() };
        (Ports::new(&config), MemoryManager::new(arch))
    }

    #[test]
    fn ula_port_read_works() {
        let (mut ports, mut mem) = ports(Architecture::Spec48);
        let (data, _, ts) = ports.input(&mut mem, 0xFEFE, 0);
        assert_eq!(data, 0xBF);
        assert_eq!(ts, 4);
        ports.keyboard.press(0, 1);
        let (data, _, _) = ports.input(&mut mem, 0xFEFE, 0);
        assert_eq!(data, 0xBD);
        let (data, _, _) = ports.input(&mut mem, 0x7FFE, 0);
        assert_eq!(data, 0xBF);
        ports.set_ear_in(true);
        let (data, _, _) = ports.input(&mut mem, 0x7FFE, 0);
        assert_eq!(data, 0xFF);
        ports.set_ear_in(false);
        ports.output(&mut mem, 0x00FE, 0x10, 0);
        let (data, _, _) = ports.input(&mut mem, 0x7FFE, 0);
        assert_eq!(data, 0xFF);
        ports.output(&mut mem, 0x00FE, 0x08, 0);
        let (data, _, _) = ports.input(&mut mem, 0x7FFE, 0);
        assert_eq!(data, 0xBF);
        ports.reconfigure(&MachineConfig { issue2: true, ..Default::default() });
        let (data, _, _) = ports.input(&mut mem, 0x7FFE, 0);
        assert_eq!(data, 0xFF);
    }

    #[test]
    fn ula_port_contention_works() {
        let (mut ports, mut mem) = ports(Architecture::Spec48);
        // the screen fetch starts at 14335
        let (_, _, ts) = ports.input(&mut mem, 0x00FE, 14335);
        assert_eq!(ts, 1 + 3 + 5);
        let (_, _, ts) = ports.input(&mut mem, 0x40FE, 14335);
        assert_eq!(ts, 6 + 1 + 3);
        let (_, _, ts) = ports.input(&mut mem, 0x40FF, 14335);
        assert_eq!(ts, 6 + 1 + 1 + 6 + 1 + 1);
        let (_, _, ts) = ports.input(&mut mem, 0x00FF, 14335);
        assert_eq!(ts, 4);
        let (_, _, ts) = ports.input(&mut mem, 0x00FF, 1000);
        assert_eq!(ts, 4);
        let (mut ports, mut mem) = self::ports(Architecture::Pentagon);
        let (_, _, ts) = ports.input(&mut mem, 0x40FE, 17984);
        assert_eq!(ts, 4);
    }

    #[test]
    fn border_works() {
        let (mut ports, mut mem) = ports(Architecture::Spec48);
        assert_eq!(ports.border(), 7);
        let (paged, ts) = ports.output(&mut mem, 0x00FE, 0x02, 100);
        assert!(!paged);
        assert_eq!(ts, 4);
        assert_eq!(ports.border(), 2);
        assert_eq!(ports.border_changes(), &[(101, 2)]);
        ports.output(&mut mem, 0x00FE, 0x12, 200);
        assert_eq!(ports.border_changes().len(), 1);
        assert_eq!(ports.beeper.changes().len(), 2);
        ports.next_frame();
        assert!(ports.border_changes().is_empty());
        assert!(ports.beeper.changes().is_empty());
        let (_, ts) = ports.output(&mut mem, 0x00FE, 0x05, 14335);
        assert_eq!(ts, 1 + 5 + 3);
    }

    #[test]
    fn floating_bus_port_works() {
        let (mut ports, mut mem) = ports(Architecture::Spec48);
        ports.config.kempston_joystick = false;
        mem.ram_bank_mut(5)[0] = 0x5A;
        assert_eq!(mem.screen()[0], 0x5A);
        let (data, _, _) = ports.input(&mut mem, 0x00FF, 0);
        assert_eq!(data, 0xFF);
        // the first bitmap byte is fetched at 14339
        let (data, _, ts) = ports.input(&mut mem, 0x00FF, 14339 - 4);
        assert_eq!(ts, 4);
        assert_eq!(data, 0x5A);
    }

    #[test]
    fn paging_works() {
        let (mut ports, mut mem) = ports(Architecture::Spec128);
        let (paged, _) = ports.output(&mut mem, 0x7FFD, 0x13, 0);
        assert!(paged);
        assert_eq!(mem.window(3), Page::Ram(3));
        assert_eq!(mem.window(0), Page::Rom(1));
        let (paged, _) = ports.output(&mut mem, 0x7FFD, 0x34, 0);
        assert!(paged);
        assert_eq!(mem.window(3), Page::Ram(4));
        assert!(mem.latches().paging_lock);
        let (paged, _) = ports.output(&mut mem, 0x7FFD, 0x01, 0);
        assert!(!paged);
        assert_eq!(mem.window(3), Page::Ram(4));
        assert_eq!(mem.latches().last_7ffd, 0x01);
        let (paged, _) = ports.output(&mut mem, 0x00FE, 0x01, 0);
        assert!(!paged);
    }

    #[test]
    fn plus2a_ports_work() {
        let (mut ports, mut mem) = ports(Architecture::Plus2A);
        ports.config.kempston_joystick = false;
        let (paged, _) = ports.output(&mut mem, 0x1FFD, 0x01, 0);
        assert!(paged);
        assert_eq!(mem.window(0), Page::Ram(0));
        let (paged, _) = ports.output(&mut mem, 0x1FFD, 0x04, 0);
        assert!(paged);
        assert_eq!(mem.window(0), Page::Rom(2));
        let (data, _, _) = ports.input(&mut mem, 0x0FFD, 0);
        assert_eq!(data, 0x01);
        let (data, _, _) = ports.input(&mut mem, 0x0FFF, 0);
        assert_eq!(data, 0xFF);
        ports.output(&mut mem, 0x7FFD, 0x20, 0);
        assert!(mem.latches().paging_lock);
        let (data, _, _) = ports.input(&mut mem, 0x0FFD, 0);
        assert_eq!(data, 0xFF);
    }

    #[test]
    fn ay_ports_work() {
        let (mut ports, mut mem) = ports(Architecture::Spec128);
        ports.output(&mut mem, 0xFFFD, 7, 0);
        assert_eq!(ports.ay.selected_register(), AyRegister::MixerControl);
        ports.output(&mut mem, 0xBFFD, 0x3E, 10);
        assert_eq!(ports.ay.get(AyRegister::MixerControl), 0x3E);
        assert_eq!(ports.ay.changes().len(), 1);
        assert_eq!(ports.ay.changes()[0].time, 11);
        let (data, _, _) = ports.input(&mut mem, 0xFFFD, 0);
        assert_eq!(data, 0x3E);
        let (mut ports, mut mem) = self::ports(Architecture::Spec48);
        ports.output(&mut mem, 0xFFFD, 7, 0);
        assert_eq!(ports.ay.selected_register(), AyRegister::ToneFineA);
        ports.reconfigure(&MachineConfig { ay48: true, zx81_ay: true, ..Default::default() });
        ports.output(&mut mem, 0x00CF, 8, 0);
        ports.output(&mut mem, 0x000F, 0x0F, 0);
        assert_eq!(ports.ay.get(AyRegister::AmpLevelA), 0x0F);
    }

    #[test]
    fn read_back_paging_works() {
        let (mut ports, mut mem) = ports(Architecture::Spec128);
        ports.config.kempston_joystick = false;
        mem.page_128(0x02);
        let (data, paged, _) = ports.input(&mut mem, 0x7FFD, 0);
        assert_eq!(data, 0xFF);
        assert!(paged);
        assert_eq!(mem.window(3), Page::Ram(7));
        assert_eq!(mem.window(0), Page::Rom(1));
        assert!(mem.latches().paging_lock);
        assert_eq!(mem.latches().last_7ffd, 0x02);
        let (_, paged, _) = ports.input(&mut mem, 0x7FFD, 0);
        assert!(!paged);
        for &arch in &[Architecture::Plus2A, Architecture::Pentagon] {
            let (mut ports, mut mem) = self::ports(arch);
            let (_, paged, _) = ports.input(&mut mem, 0x7FFD, 0);
            assert!(!paged);
            assert_eq!(mem.window(3), Page::Ram(0));
        }
    }

    #[test]
    fn fullerbox_ports_work() {
        let (mut ports, mut mem) = ports(Architecture::Spec128);
        let (paged, ts) = ports.output(&mut mem, 0x003F, 8, 0);
        assert!(!paged);
        assert_eq!(ts, 4);
        assert_eq!(ports.ay.selected_register(), AyRegister::AmpLevelA);
        ports.output(&mut mem, 0x005F, 0x0C, 10);
        assert_eq!(ports.ay.get(AyRegister::AmpLevelA), 0x0C);
        let (data, _, _) = ports.input(&mut mem, 0x003F, 0);
        assert_eq!(data, 0x0C);
        // the screen fetch of the 128k starts at 14361
        let (_, ts) = ports.output(&mut mem, 0x403F, 9, 14361);
        assert_eq!(ts, 6 + 1 + 1 + 6 + 1 + 1);
        assert_eq!(ports.ay.selected_register(), AyRegister::AmpLevelB);
        // the AY ports are detached in the load monitor mode
        ports.reconfigure(&MachineConfig { arch: Architecture::Spec128, load_monitor: true, ..Default::default() });
        ports.output(&mut mem, 0x003F, 10, 0);
        assert_eq!(ports.ay.selected_register(), AyRegister::AmpLevelB);
        ports.output(&mut mem, 0xFFFD, 10, 0);
        assert_eq!(ports.ay.selected_register(), AyRegister::AmpLevelB);
        // the 48k decodes them only with the AY attached
        let (mut ports, mut mem) = self::ports(Architecture::Spec48);
        ports.output(&mut mem, 0x003F, 8, 0);
        assert_eq!(ports.ay.selected_register(), AyRegister::ToneFineA);
        ports.reconfigure(&MachineConfig { ay48: true, ..Default::default() });
        ports.output(&mut mem, 0x003F, 8, 0);
        assert_eq!(ports.ay.selected_register(), AyRegister::AmpLevelA);
    }

    #[test]
    fn tk_portuguese_rom_port_works() {
        let config = MachineConfig { arch: Architecture::Tk90x, tk_portuguese_rom: true, ..Default::default() };
        let mut ports = Ports::new(&config);
        let mut mem = MemoryManager::new(Architecture::Tk90x);
        let (data, _, _) = ports.input(&mut mem, 0xFEFE, 0);
        assert_eq!(data, 0x3F);
        ports.keyboard.press(0, 1);
        let (data, _, _) = ports.input(&mut mem, 0xFEFE, 0);
        assert_eq!(data, 0x3D);
        ports.set_ear_in(true);
        let (data, _, _) = ports.input(&mut mem, 0x7FFE, 0);
        assert_eq!(data, 0x7F);
        ports.reconfigure(&MachineConfig { tk_portuguese_rom: false, ..config });
        let (data, _, _) = ports.input(&mut mem, 0x7FFE, 0);
        assert_eq!(data, 0xFF);
    }

    #[test]
    fn input_devices_work() {
        let (mut ports, mut mem) = ports(Architecture::Spec48);
        ports.kempston.set_directions(Directions::UP);
        ports.kempston.fire(true);
        let (data, _, _) = ports.input(&mut mem, 0x001F, 0);
        assert_eq!(data, 0b0001_1000);
        ports.reconfigure(&MachineConfig { fuller_joystick: true, mouse: true, ..Default::default() });
        ports.fuller.fire(true);
        let (data, _, _) = ports.input(&mut mem, 0x007F, 0);
        assert_eq!(data, 0x7F);
        ports.mouse.move_mouse(5, -1);
        let (data, _, _) = ports.input(&mut mem, 0xFBDF, 0);
        assert_eq!(data, 5);
        let (data, _, _) = ports.input(&mut mem, 0xFFDF, 0);
        assert_eq!(data, 0xFF);
    }

    #[test]
    fn betadisk_ports_work() {
        let config = MachineConfig { arch: Architecture::Pentagon, betadisk: true, ..Default::default() };
        let mut ports = Ports::new(&config);
        let mut mem = MemoryManager::new(Architecture::Pentagon);
        ports.output(&mut mem, 0x003F, 5, 0);
        assert_eq!(ports.betadisk.read_track_reg(), 0);
        mem.page_trdos(true);
        ports.output(&mut mem, 0x003F, 5, 0);
        ports.output(&mut mem, 0x005F, 9, 0);
        let (data, _, _) = ports.input(&mut mem, 0x003F, 0);
        assert_eq!(data, 5);
        let (data, _, _) = ports.input(&mut mem, 0x005F, 0);
        assert_eq!(data, 9);
    }

    #[test]
    fn covox_port_works() {
        let config = MachineConfig { arch: Architecture::Pentagon, covox: CovoxMode::Mono, ..Default::default() };
        let mut ports = Ports::new(&config);
        let mut mem = MemoryManager::new(Architecture::Pentagon);
        ports.output(&mut mem, 0x00FB, 0x80, 7);
        assert_eq!(ports.covox.channels(), &[0x80; 4]);
        assert_eq!(ports.covox.changes(), &[(8, 0x80)]);
    }
}
