/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! The emulated machine: the Z80 CPU bound to the memory manager and the port engine.
use core::num::NonZeroU16;

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use crate::arch::Architecture;
use crate::clock::{FTs, FrameClock};
use crate::config::MachineConfig;
use crate::memory::{Latches, MemoryManager};
use crate::ports::Ports;
use crate::z80emu::{Cpu, CpuDebugFn, Io, Memory, BreakCause, Z80NMOS, host::cycles::M1_CYCLE_TS};

/// The address range of the 48k BASIC ROM which pages in the TR-DOS ROM when executed.
const TRDOS_ENTRY_PAGE: u16 = 0x3D00;

/// Everything the CPU can reach: the paged memory and the port-mapped devices.
#[derive(Debug)]
pub struct MachineBus {
    pub memory: MemoryManager,
    pub ports: Ports,
    irq_length: FTs,
    betadisk: bool,
    /// Set when a port read has changed the memory paging.
    read_paged: bool,
}

/// A ZX Spectrum machine of the configured architecture.
///
/// The emulation advances in frames. Between frames the host may inspect and modify the
/// machine state, load and save snapshots, apply cheats or travel back in time.
#[derive(Debug)]
pub struct Machine {
    cpu: Z80NMOS,
    bus: MachineBus,
    config: MachineConfig,
    frame_tstates: FTs,
    ts: FTs,
    frames: u64,
}

impl MachineBus {
    fn new(config: &MachineConfig) -> Self {
        MachineBus {
            memory: MemoryManager::new(config.arch),
            ports: Ports::new(config),
            irq_length: config.arch.irq_length(),
            betadisk: config.betadisk,
            read_paged: false,
        }
    }

    fn reconfigure(&mut self, config: &MachineConfig) {
        self.ports.reconfigure(config);
        self.irq_length = config.arch.irq_length();
        self.betadisk = config.betadisk;
    }

    /// Returns `true` if reading an unattached port may change the memory paging.
    #[inline]
    fn pages_on_io_read(&self) -> bool {
        self.memory.arch() == Architecture::Spec128 && !self.memory.latches().paging_lock
    }

    #[inline]
    fn take_read_paged(&mut self) -> bool {
        core::mem::replace(&mut self.read_paged, false)
    }

    /// Returns `true` if the ROM containing the 48k BASIC is selected.
    fn is_basic48_rom_selected(&self) -> bool {
        let latches = self.memory.latches();
        if latches.paging_mode_2a3 != 0 {
            return false
        }
        match self.memory.arch() {
            Architecture::Plus2A => latches.rom & 3 == 3,
            Architecture::Spec128|Architecture::Pentagon => latches.rom == 1,
            _ => true
        }
    }

    #[inline]
    fn trdos_auto_paging(&mut self, pc: u16) {
        if self.memory.is_trdos_paged_in() {
            if pc >= 0x4000 {
                self.memory.page_trdos(false);
                debug!("TR-DOS paged out at 0x{:04x}", pc);
            }
        }
        else if pc & 0xFF00 == TRDOS_ENTRY_PAGE && self.is_basic48_rom_selected() {
            self.memory.page_trdos(true);
            debug!("TR-DOS paged in at 0x{:04x}", pc);
        }
    }
}

impl Io for MachineBus {
    type Timestamp = FTs;
    type WrIoBreak = ();
    type RetiBreak = ();

    #[inline(always)]
    fn is_irq(&mut self, ts: FTs) -> bool {
        ts >= 0 && ts < self.irq_length
    }

    fn read_io(&mut self, port: u16, ts: FTs) -> (u8, Option<NonZeroU16>) {
        let (data, paged, delay) = self.ports.input(&mut self.memory, port, ts);
        self.read_paged |= paged;
        (data, NonZeroU16::new(delay as u16))
    }

    fn write_io(&mut self, port: u16, data: u8, ts: FTs) -> (Option<()>, Option<NonZeroU16>) {
        let (paged, delay) = self.ports.output(&mut self.memory, port, data, ts);
        (if paged { Some(()) } else { None }, NonZeroU16::new(delay as u16))
    }
}

impl Memory for MachineBus {
    type Timestamp = FTs;

    #[inline]
    fn read_debug(&self, addr: u16) -> u8 {
        self.memory.read_byte(addr)
    }

    #[inline]
    fn read_mem(&self, addr: u16, _ts: FTs) -> u8 {
        let data = self.memory.read_byte(addr);
        self.memory.note_contended_rw(addr, data);
        data
    }

    #[inline]
    fn read_mem16(&self, addr: u16, _ts: FTs) -> u16 {
        let [lo, hi] = self.memory.read_word(addr).to_le_bytes();
        self.memory.note_contended_rw(addr, lo);
        self.memory.note_contended_rw(addr.wrapping_add(1), hi);
        u16::from_le_bytes([lo, hi])
    }

    #[inline]
    fn read_opcode(&mut self, pc: u16, _ir: u16, _ts: FTs) -> u8 {
        if self.betadisk {
            self.trdos_auto_paging(pc);
        }
        let data = self.memory.read_byte(pc);
        self.memory.note_contended_rw(pc, data);
        data
    }

    #[inline]
    fn write_mem(&mut self, addr: u16, val: u8, _ts: FTs) {
        self.memory.write_byte(addr, val);
        self.memory.note_contended_rw(addr, val);
    }
}

impl Machine {
    /// Creates a powered-on machine with the given configuration.
    ///
    /// The ROM pages are empty, load them with [MemoryManager::load_rom].
    pub fn new(config: MachineConfig) -> Self {
        let bus = MachineBus::new(&config);
        let mut machine = Machine {
            cpu: Z80NMOS::default(),
            bus,
            frame_tstates: config.frame_tstates(),
            config,
            ts: 0,
            frames: 0,
        };
        machine.reset(true);
        machine
    }

    #[inline]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }
    /// Applies a new configuration.
    ///
    /// Changing the architecture resets the machine and clears the memory. ROM pages are kept.
    pub fn set_config(&mut self, config: MachineConfig) {
        let arch_changed = config.arch != self.config.arch || config.tk_alu != self.config.tk_alu;
        self.bus.reconfigure(&config);
        self.frame_tstates = config.frame_tstates();
        self.config = config;
        if arch_changed {
            info!("machine: {} selected", self.config.arch);
            self.reset(true);
        }
    }
    /// Resets the CPU, the paging latches and the devices.
    ///
    /// A `hard` reset also clears the RAM and discards a ROM loaded from a snapshot.
    pub fn reset(&mut self, hard: bool) {
        let arch = self.config.arch;
        self.cpu.reset();
        if hard {
            self.bus.memory.reset(arch);
        }
        else {
            self.bus.memory.restore_latches(Latches {
                paging_lock: arch.is_paging_locked_at_reset(),
                ..Latches::default()
            });
        }
        self.bus.ports.reset();
        self.ts = 0;
        debug!("machine: reset, hard: {}", hard);
    }

    #[inline]
    pub fn cpu(&self) -> &Z80NMOS {
        &self.cpu
    }
    #[inline]
    pub fn cpu_mut(&mut self) -> &mut Z80NMOS {
        &mut self.cpu
    }
    #[inline]
    pub fn bus(&self) -> &MachineBus {
        &self.bus
    }
    #[inline]
    pub fn bus_mut(&mut self) -> &mut MachineBus {
        &mut self.bus
    }
    #[inline]
    pub fn memory(&self) -> &MemoryManager {
        &self.bus.memory
    }
    #[inline]
    pub fn memory_mut(&mut self) -> &mut MemoryManager {
        &mut self.bus.memory
    }
    #[inline]
    pub fn ports(&self) -> &Ports {
        &self.bus.ports
    }
    #[inline]
    pub fn ports_mut(&mut self) -> &mut Ports {
        &mut self.bus.ports
    }
    /// Returns the current border color.
    #[inline]
    pub fn border(&self) -> u8 {
        self.bus.ports.border()
    }
    #[inline]
    pub fn frame_tstates(&self) -> FTs {
        self.frame_tstates
    }
    /// Returns the T-state counter relative to the beginning of the current frame.
    #[inline]
    pub fn current_tstate(&self) -> FTs {
        self.ts
    }
    /// Returns the number of completed frames.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frames
    }
    /// Returns the number of T-states elapsed since the machine was created.
    pub fn global_tstates(&self) -> u64 {
        self.frames * self.frame_tstates as u64 + self.ts.max(0) as u64
    }

    fn ensure_next_frame(&mut self) {
        if self.ts >= self.frame_tstates {
            self.ts -= self.frame_tstates;
            self.frames += 1;
            self.bus.ports.next_frame();
        }
    }

    /// Executes instructions until the end of the current frame.
    ///
    /// Changes recorded by the devices during the frame are available until the next call.
    pub fn run_frame(&mut self) {
        self.ensure_next_frame();
        let global = self.global_tstates();
        if let Some(realtape) = self.bus.ports.realtape.as_mut() {
            realtape.prepare_frame(global);
        }
        let limit = self.frame_tstates;
        let mut clock: FrameClock = FrameClock::new(self.ts, *self.bus.ports.contention_table());
        clock.contention = self.bus.memory.contention_mask();
        loop {
            let res = if self.bus.pages_on_io_read() {
                self.execute_steps_with_limit(&mut clock, limit)
            }
            else {
                self.cpu.execute_with_limit(&mut self.bus, &mut clock, limit)
            };
            match res {
                Ok(()) => break,
                Err(BreakCause::Halt) => {
                    let ts = limit + (clock.ts - limit).rem_euclid(M1_CYCLE_TS as FTs);
                    if ts > clock.ts {
                        let r_incr = (ts - clock.ts) / M1_CYCLE_TS as FTs;
                        self.cpu.add_r(r_incr);
                        clock.ts = ts;
                    }
                    break;
                }
                Err(_) => {
                    clock.contention = self.bus.memory.contention_mask();
                }
            }
        }
        self.ts = clock.ts;
    }

    /// Executes single instructions until the `limit`, updating the memory contention
    /// as soon as a port read changes the memory paging.
    fn execute_steps_with_limit(&mut self, clock: &mut FrameClock, limit: FTs) -> Result<(), BreakCause<(), ()>> {
        const DEBUG: Option<CpuDebugFn> = None;
        self.bus.take_read_paged();
        while clock.ts < limit {
            self.cpu.execute_next(&mut self.bus, clock, DEBUG)?;
            if self.bus.take_read_paged() {
                clock.contention = self.bus.memory.contention_mask();
            }
        }
        Ok(())
    }

    /// Restores the frame T-state counter, e.g. after loading a snapshot.
    pub fn set_current_tstate(&mut self, ts: FTs) {
        self.ts = ts.max(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Page, PAGE_SIZE, TRDOS_ROM};
    use crate::z80emu::StkReg16;

    fn rom_with(code: &[(usize, &[u8])]) -> Vec<u8> {
        let mut rom = vec![0u8; PAGE_SIZE];
        for &(addr, bytes) in code {
            rom[addr..addr + bytes.len()].copy_from_slice(bytes);
        }
        rom
    }

    fn machine(config: MachineConfig, rom: &[u8]) -> Machine {
        let mut machine = Machine::new(config);
        machine.memory_mut().load_rom(0, rom).unwrap();
        machine
    }

    #[test]
    fn halt_fast_forwards_to_the_frame_end() {
        // DI; HALT
        let rom = rom_with(&[(0, &[0xF3, 0x76])]);
        let mut machine = machine(MachineConfig::default(), &rom);
        machine.run_frame();
        assert!(machine.cpu().is_halt());
        assert_eq!(machine.current_tstate(), 69888);
        assert_eq!(machine.frame_count(), 0);
        machine.run_frame();
        assert_eq!(machine.frame_count(), 1);
        assert!(machine.current_tstate() >= 69888);
        assert!(machine.global_tstates() >= 2 * 69888);
    }

    #[test]
    fn border_out_works() {
        // DI; LD A,2; OUT (0xFE),A; HALT
        let rom = rom_with(&[(0, &[0xF3, 0x3E, 0x02, 0xD3, 0xFE, 0x76])]);
        let mut machine = machine(MachineConfig::default(), &rom);
        assert_eq!(machine.border(), 7);
        machine.run_frame();
        assert_eq!(machine.border(), 2);
        assert_eq!(machine.ports().border_changes(), &[(4 + 7 + 7 + 1, 2)]);
    }

    #[test]
    fn interrupts_work() {
        // IM 1; LD B,0; DJNZ $; EI; HALT ... 0x38: LD A,5; OUT (0xFE),A; HALT
        let rom = rom_with(&[(0, &[0xED, 0x56, 0x06, 0x00, 0x10, 0xFE, 0xFB, 0x76]),
                             (0x38, &[0x3E, 0x05, 0xD3, 0xFE, 0x76])]);
        let mut machine = machine(MachineConfig::default(), &rom);
        machine.run_frame();
        assert_eq!(machine.border(), 7);
        machine.run_frame();
        assert_eq!(machine.border(), 5);
        assert_eq!(machine.frame_count(), 1);
    }

    #[test]
    fn paging_out_works() {
        // DI; LD BC,0x7FFD; LD A,0x13; OUT (C),A; HALT
        let rom = rom_with(&[(0, &[0xF3, 0x01, 0xFD, 0x7F, 0x3E, 0x13, 0xED, 0x79, 0x76])]);
        let config = MachineConfig { arch: Architecture::Spec128, ..Default::default() };
        let mut machine = machine(config, &rom);
        machine.memory_mut().load_rom(1, &rom[..]).unwrap();
        machine.run_frame();
        assert!(machine.cpu().is_halt());
        assert_eq!(machine.memory().window(0), Page::Rom(1));
        assert_eq!(machine.memory().window(3), Page::Ram(3));
        assert!(machine.current_tstate() >= 70908);
    }

    #[test]
    fn paging_by_port_read_updates_contention() {
        // DI; LD BC,0x7FFD; IN A,(C); LD HL,0xC000; LD DE,0; loop: LD A,(HL); INC DE; JR loop
        let rom = rom_with(&[(0, &[0xF3, 0x01, 0xFD, 0x7F, 0xED, 0x78, 0x21, 0x00, 0xC0,
                                   0x11, 0x00, 0x00, 0x7E, 0x13, 0x18, 0xFC])]);
        let count_loops = |paging: Option<u8>| {
            let config = MachineConfig { arch: Architecture::Spec128, ..Default::default() };
            let mut machine = machine(config, &rom);
            machine.memory_mut().load_rom(1, &rom[..]).unwrap();
            if let Some(data) = paging {
                assert!(machine.memory_mut().page_128(data));
            }
            machine.run_frame();
            (machine.cpu().get_reg16(StkReg16::DE), *machine.memory().latches())
        };
        // the idle bus reads 0xFF: bank 7 and the lock
        let (by_read, latches) = count_loops(None);
        assert_eq!(latches.bank, 7);
        assert!(latches.paging_lock);
        assert_eq!(latches.last_7ffd, 0);
        let (by_write, _) = count_loops(Some(0x3F));
        assert_eq!(by_read, by_write);
        let (uncontended, _) = count_loops(Some(0x30));
        assert!(uncontended > by_read);
    }

    #[test]
    fn trdos_auto_paging_works() {
        // DI; JP 0x3D00
        let rom = rom_with(&[(0, &[0xF3, 0xC3, 0x00, 0x3D])]);
        // HALT
        let trdos = rom_with(&[(0x3D00, &[0x76])]);
        let config = MachineConfig { betadisk: true, ..Default::default() };
        let mut machine = machine(config.clone(), &rom);
        machine.memory_mut().load_rom(TRDOS_ROM, &trdos[..]).unwrap();
        machine.run_frame();
        assert!(machine.memory().is_trdos_paged_in());
        assert_eq!(machine.memory().window(0), Page::Rom(TRDOS_ROM));
        // JP 0x8000
        let trdos = rom_with(&[(0x3D00, &[0xC3, 0x00, 0x80])]);
        let mut machine = self::machine(config, &rom);
        machine.memory_mut().load_rom(TRDOS_ROM, &trdos[..]).unwrap();
        machine.memory_mut().write_byte(0x8000, 0x76);
        machine.run_frame();
        assert!(!machine.memory().is_trdos_paged_in());
        assert!(machine.cpu().is_halt());
        // without the interface the ROM stays in
        let mut machine = self::machine(MachineConfig::default(), &rom);
        machine.memory_mut().load_rom(TRDOS_ROM, &trdos[..]).unwrap();
        machine.run_frame();
        assert!(!machine.memory().is_trdos_paged_in());
    }

    #[test]
    fn set_config_works() {
        let mut machine = Machine::new(MachineConfig::default());
        machine.memory_mut().write_byte(0x8000, 0xAA);
        machine.set_config(MachineConfig { mouse: true, ..Default::default() });
        assert_eq!(machine.memory().read_byte(0x8000), 0xAA);
        machine.set_config(MachineConfig { arch: Architecture::Pentagon, ..Default::default() });
        assert_eq!(machine.memory().read_byte(0x8000), 0);
        assert_eq!(machine.frame_tstates(), 71680);
        assert!(!machine.memory().latches().paging_lock);
        machine.memory_mut().page_128(0x23);
        assert!(machine.memory().latches().paging_lock);
        machine.reset(false);
        assert!(!machine.memory().latches().paging_lock);
        assert_eq!(machine.memory().window(3), Page::Ram(0));
    }
}
