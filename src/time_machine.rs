/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! The time machine keeps a short history of the machine state for rewinding.
//!
//! A snapshot slot is captured every [CAPTURE_INTERVAL] frames. Each slot holds only the RAM
//! banks that might have changed since the previous capture, the oldest slot always holds
//! every bank.
use arrayvec::ArrayVec;

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use crate::clock::FTs;
use crate::machine::Machine;
use crate::memory::{Latches, Page, RAM_BANKS};
use crate::z80emu::Z80NMOS;

/// The maximum number of slots kept.
pub const TIME_MACHINE_SLOTS: usize = 8;
/// The number of frames between two captures.
pub const CAPTURE_INTERVAL: u32 = 250;

const ALL_BANKS: u8 = !0;
/// Bank 2 is always mapped at 0x8000 outside of the +2A/+3 special mode.
const BANK_2: u8 = 1 << 2;

type BankData = Box<[u8]>;

#[derive(Clone)]
struct Slot {
    cpu: Z80NMOS,
    border: u8,
    ts: FTs,
    latches: Latches,
    banks: [Option<BankData>; RAM_BANKS],
}

/// A ring of the most recent machine states.
#[derive(Clone, Default)]
pub struct TimeMachine {
    slots: ArrayVec<Slot, TIME_MACHINE_SLOTS>,
    frames: u32,
    /// Banks mapped at the time of the last capture.
    mapped: u8,
}

impl Slot {
    fn stored_banks(&self) -> u8 {
        self.banks.iter().enumerate()
                  .filter(|(_, bank)| bank.is_some())
                  .fold(0, |mask, (n, _)| mask | 1 << n)
    }
}

/// Returns a mask of the RAM banks currently visible to the CPU or the video circuit.
fn mapped_banks(machine: &Machine) -> u8 {
    let memory = machine.memory();
    let video = if memory.latches().video != 0 { 1 << 7 } else { 1 << 5 };
    (0..4).fold(BANK_2 | video, |mask, window| match memory.window(window) {
        Page::Ram(bank) => mask | 1 << (bank & 7),
        Page::Rom(_) => mask
    })
}

impl TimeMachine {
    pub fn new() -> Self {
        TimeMachine::default()
    }
    /// Returns the number of captured slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
    /// Discards all slots, e.g. after loading a snapshot.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.frames = 0;
        self.mapped = 0;
    }
    /// Returns a mask of the RAM banks stored in the slot `back` captures ago, counting from 1.
    pub fn stored_banks(&self, back: usize) -> Option<u8> {
        let index = self.slot_index(back)?;
        Some(self.slots[index].stored_banks())
    }
    /// Should be called after each completed frame. Returns `true` if a slot was captured.
    pub fn tick(&mut self, machine: &mut Machine) -> bool {
        self.frames += 1;
        if self.frames < CAPTURE_INTERVAL {
            return false
        }
        self.capture(machine);
        true
    }
    /// Captures the state of the `machine` into a new slot, dropping the oldest one if the ring
    /// is full.
    pub fn capture(&mut self, machine: &mut Machine) {
        self.frames = 0;
        let changed = machine.memory_mut().take_changed_banks();
        let now_mapped = mapped_banks(machine);
        let mask = if self.slots.is_empty() {
            ALL_BANKS
        }
        else {
            changed | self.mapped | now_mapped
        };
        self.mapped = now_mapped;

        let memory = machine.memory();
        let mut banks: [Option<BankData>; RAM_BANKS] = Default::default();
        for (n, bank) in banks.iter_mut().enumerate() {
            if mask & (1 << n) != 0 {
                *bank = Some(memory.ram_bank(n as u8).into());
            }
        }
        let slot = Slot {
            cpu: machine.cpu().clone(),
            border: machine.border(),
            ts: machine.current_tstate(),
            latches: *memory.latches(),
            banks
        };
        if self.slots.is_full() {
            self.drop_oldest();
        }
        self.slots.push(slot);
        debug!("time machine: captured {} slot(s), banks: {:08b}", self.slots.len(), mask);
    }
    /// Restores the state captured `back` slots ago, counting from 1 for the most recent one.
    ///
    /// Slots newer than the restored one are discarded. Returns `false` if there is no such slot.
    pub fn restore(&mut self, machine: &mut Machine, back: usize) -> bool {
        let index = match self.slot_index(back) {
            Some(index) => index,
            None => return false
        };
        for n in 0..RAM_BANKS {
            let data = self.slots[..=index].iter().rev()
                           .find_map(|slot| slot.banks[n].as_ref());
            if let Some(data) = data {
                machine.memory_mut().ram_bank_mut(n as u8).copy_from_slice(data);
            }
        }
        self.slots.truncate(index + 1);
        let slot = &self.slots[index];
        *machine.cpu_mut() = slot.cpu.clone();
        machine.ports_mut().set_border(slot.border);
        machine.set_current_tstate(slot.ts);
        let memory = machine.memory_mut();
        memory.restore_latches(slot.latches);
        memory.take_changed_banks();
        self.mapped = mapped_banks(machine);
        self.frames = 0;
        info!("time machine: went back {} slot(s)", back);
        true
    }

    fn slot_index(&self, back: usize) -> Option<usize> {
        if back == 0 || back > self.slots.len() {
            return None
        }
        Some(self.slots.len() - back)
    }

    fn drop_oldest(&mut self) {
        let mut oldest = self.slots.remove(0);
        if let Some(next) = self.slots.first_mut() {
            for (bank, data) in next.banks.iter_mut().zip(oldest.banks.iter_mut()) {
                if bank.is_none() {
                    *bank = data.take();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Architecture;
    use crate::config::MachineConfig;
    use crate::z80emu::Cpu;

    fn machine(arch: Architecture) -> Machine {
        Machine::new(MachineConfig { arch, ..MachineConfig::default() })
    }

    #[test]
    fn time_machine_ticks_work() {
        let mut machine = machine(Architecture::Spec48);
        let mut tm = TimeMachine::new();
        for _ in 1..CAPTURE_INTERVAL {
            assert!(!tm.tick(&mut machine));
        }
        assert!(tm.is_empty());
        assert!(tm.tick(&mut machine));
        assert_eq!(tm.len(), 1);
        assert_eq!(tm.stored_banks(1), Some(ALL_BANKS));
        assert!(!tm.tick(&mut machine));
        tm.clear();
        assert!(tm.is_empty());
        assert!(!tm.restore(&mut machine, 1));
    }

    #[test]
    fn time_machine_48k_works() {
        let mut machine = machine(Architecture::Spec48);
        let mut tm = TimeMachine::new();
        machine.memory_mut().write_byte(0x8000, 1);
        machine.memory_mut().write_byte(0xC000, 1);
        machine.cpu_mut().set_pc(0x1234);
        machine.ports_mut().set_border(3);
        tm.capture(&mut machine);

        machine.memory_mut().write_byte(0x8000, 2);
        machine.memory_mut().write_byte(0x4000, 2);
        machine.cpu_mut().set_pc(0x2345);
        machine.ports_mut().set_border(4);
        tm.capture(&mut machine);
        // 48K maps banks 5, 2 and 0 only
        assert_eq!(tm.stored_banks(1), Some((1 << 5) | (1 << 2) | 1));

        machine.memory_mut().write_byte(0x8000, 3);
        machine.memory_mut().write_byte(0xC000, 3);
        machine.cpu_mut().set_pc(0);
        assert!(!tm.restore(&mut machine, 3));
        assert!(!tm.restore(&mut machine, 0));

        assert!(tm.restore(&mut machine, 1));
        assert_eq!(tm.len(), 2);
        assert_eq!(machine.memory().read_byte(0x8000), 2);
        assert_eq!(machine.memory().read_byte(0x4000), 2);
        assert_eq!(machine.memory().read_byte(0xC000), 1);
        assert_eq!(machine.cpu().get_pc(), 0x2345);
        assert_eq!(machine.border(), 4);

        assert!(tm.restore(&mut machine, 2));
        assert_eq!(tm.len(), 1);
        assert_eq!(machine.memory().read_byte(0x8000), 1);
        assert_eq!(machine.memory().read_byte(0x4000), 0);
        assert_eq!(machine.cpu().get_pc(), 0x1234);
        assert_eq!(machine.border(), 3);
    }

    #[test]
    fn time_machine_ring_works() {
        let mut machine = machine(Architecture::Spec128);
        let mut tm = TimeMachine::new();
        for i in 0..12u8 {
            let bank = i % 8;
            assert!(machine.memory_mut().page_128(bank));
            machine.memory_mut().write_byte(0xC000, i);
            machine.memory_mut().write_byte(0x8000, i);
            machine.memory_mut().write_byte(0x4001, i);
            machine.cpu_mut().set_pc(0x1000 + i as u16);
            tm.capture(&mut machine);
            assert_eq!(tm.len(), (i as usize + 1).min(TIME_MACHINE_SLOTS));
        }
        assert_eq!(tm.stored_banks(TIME_MACHINE_SLOTS), Some(ALL_BANKS));
        for bank in 0..8 {
            machine.memory_mut().ram_bank_mut(bank).iter_mut().for_each(|b| *b = 0xEE);
        }
        // the oldest remaining slot is the capture #4
        assert!(tm.restore(&mut machine, TIME_MACHINE_SLOTS));
        assert_eq!(tm.len(), 1);
        assert_eq!(machine.cpu().get_pc(), 0x1004);
        assert_eq!(machine.memory().latches().bank, 4);
        let memory = machine.memory();
        let expected = [0, 1, 4, 3, 4, 0, 0, 0];
        for (bank, &value) in expected.iter().enumerate() {
            assert_eq!(memory.ram_bank(bank as u8)[0], value, "bank: {}", bank);
        }
        assert_eq!(memory.ram_bank(5)[1], 4);
        assert_eq!(memory.ram_bank(1)[1], 0);
        assert_eq!(memory.read_byte(0xC000), 4);
    }
}
