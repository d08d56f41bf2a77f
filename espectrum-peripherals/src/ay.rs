/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! The **AY-3-8912** programmable sound generator register file.
//!
//! Sound synthesis is left to the audio collaborator, which consumes recorded
//! register changes with their frame timestamps.
#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use espectrum_core::clock::FTs;

/// An enumeration of AY-3-8912 registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum AyRegister {
      ToneFineA      =  0,
      ToneCoarseA    =  1,
      ToneFineB      =  2,
      ToneCoarseB    =  3,
      ToneFineC      =  4,
      ToneCoarseC    =  5,
      NoisePeriod    =  6,
      MixerControl   =  7,
      AmpLevelA      =  8,
      AmpLevelB      =  9,
      AmpLevelC      = 10,
      EnvPerFine     = 11,
      EnvPerCoarse   = 12,
      EnvShape       = 13,
      IoA            = 14,
      IoB            = 15,
}

pub const NUM_SOUND_GEN_REGISTERS: usize = 14;

const REG_MASKS: [u8;16] = [
    0xff, 0x0f, 0xff, 0x0f, 0xff, 0x0f, 0x1f, 0xff,
    0x1f, 0x1f, 0x1f, 0xff, 0xff, 0x0f, 0xff, 0xff
];

const REGISTERS: [AyRegister;16] = [
    AyRegister::ToneFineA, AyRegister::ToneCoarseA,
    AyRegister::ToneFineB, AyRegister::ToneCoarseB,
    AyRegister::ToneFineC, AyRegister::ToneCoarseC,
    AyRegister::NoisePeriod, AyRegister::MixerControl,
    AyRegister::AmpLevelA, AyRegister::AmpLevelB, AyRegister::AmpLevelC,
    AyRegister::EnvPerFine, AyRegister::EnvPerCoarse, AyRegister::EnvShape,
    AyRegister::IoA, AyRegister::IoB
];

/// A timestamped change to one of the AY-3-8912 sound generator registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AyRegChange {
    /// A timestamp in T-states, relative to the beginning of the current frame.
    pub time: FTs,
    pub reg: AyRegister,
    /// A new value loaded into the register, masked to the register's width.
    pub val: u8
}

/// The AY-3-8912 register file with its register selection latch.
///
/// Writes to the sound generator registers are recorded so the audio collaborator can
/// render them with T-state precision. Writes to the I/O port registers are not recorded.
#[derive(Default, Clone, Debug)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "snapshot", serde(rename_all = "camelCase"))]
pub struct Ay3_8912 {
    regs: [u8; 16],
    selected_reg: AyRegister,
    #[cfg_attr(feature = "snapshot", serde(skip))]
    changes: Vec<AyRegChange>,
}

impl Ay3_8912 {
    /// Resets all registers and the register selection.
    ///
    /// Recorded changes are left intact.
    pub fn reset(&mut self) {
        self.regs = Default::default();
        self.selected_reg = Default::default();
    }
    /// Retrieves the current value of the indicated register.
    #[inline]
    pub fn get(&self, reg: AyRegister) -> u8 {
        self.regs[usize::from(reg)]
    }
    /// Sets the value of the indicated register without recording the change.
    #[inline]
    pub fn set(&mut self, reg: AyRegister, val: u8) {
        let index = usize::from(reg);
        self.regs[index] = val & REG_MASKS[index];
    }
    #[inline]
    pub fn registers(&self) -> &[u8;16] {
        &self.regs
    }
    /// Restores all registers and the register selection, e.g. from a snapshot.
    pub fn set_registers(&mut self, selected: u8, regs: &[u8;16]) {
        for (reg, &val) in REGISTERS.iter().zip(regs.iter()) {
            self.set(*reg, val);
        }
        self.selected_reg = AyRegister::from(selected);
    }
    #[inline]
    pub fn selected_register(&self) -> AyRegister {
        self.selected_reg
    }
    /// Bits 0-3 of `data` select a register to be read from or written to.
    #[inline]
    pub fn select_port_write(&mut self, data: u8) {
        self.selected_reg = AyRegister::from(data)
    }
    /// Writes data to the previously selected register at frame T-state `time`.
    pub fn data_port_write(&mut self, data: u8, time: FTs) {
        let reg = self.selected_reg;
        self.set(reg, data);
        if usize::from(reg) < NUM_SOUND_GEN_REGISTERS {
            self.changes.push(AyRegChange { time, reg, val: self.get(reg) });
        }
    }
    /// Reads data from the previously selected register.
    #[inline]
    pub fn data_port_read(&self) -> u8 {
        self.get(self.selected_reg)
    }
    /// Returns sound generator register changes recorded during the current frame.
    #[inline]
    pub fn changes(&self) -> &[AyRegChange] {
        &self.changes
    }
    /// Clears recorded changes, should be called at the end of each frame.
    pub fn next_frame(&mut self) {
        self.changes.clear();
    }
}

impl AyRegister {
    /// Returns an iterator of all [AyRegister] values in an ascending order.
    pub fn enumerate() -> impl Iterator<Item=AyRegister> {
        REGISTERS.iter().copied()
    }
}

impl Default for AyRegister {
    fn default() -> Self {
        AyRegister::ToneFineA
    }
}

impl From<u8> for AyRegister {
    #[inline]
    fn from(value: u8) -> Self {
        REGISTERS[(value & 0x0F) as usize]
    }
}

macro_rules! impl_from_ay_reg {
    ($($ty:ty),*) => { $(
        impl From<AyRegister> for $ty {
            #[inline(always)]
            fn from(reg: AyRegister) -> $ty {
                reg as $ty
            }
        }
    )* };
}
impl_from_ay_reg!(u8, u16, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ay_registers_work() {
        let mut ay = Ay3_8912::default();
        assert_eq!(AyRegister::enumerate().count(), 16);
        for (n, reg) in AyRegister::enumerate().enumerate() {
            assert_eq!(usize::from(reg), n);
            assert_eq!(AyRegister::from(n as u8 | 0xF0), reg);
        }
        ay.select_port_write(0x11);
        assert_eq!(ay.selected_register(), AyRegister::ToneCoarseA);
        ay.data_port_write(0xFF, 100);
        assert_eq!(ay.data_port_read(), 0x0F);
        ay.select_port_write(14);
        ay.data_port_write(0xAA, 200);
        assert_eq!(ay.data_port_read(), 0xAA);
        assert_eq!(ay.changes(), &[AyRegChange { time: 100, reg: AyRegister::ToneCoarseA, val: 0x0F }]);
        ay.next_frame();
        assert!(ay.changes().is_empty());
        assert_eq!(ay.get(AyRegister::IoA), 0xAA);
        ay.reset();
        assert_eq!(ay.registers(), &[0u8;16]);
        assert_eq!(ay.selected_register(), AyRegister::ToneFineA);
    }

    #[test]
    fn ay_set_registers_masks_values() {
        let mut ay = Ay3_8912::default();
        ay.set_registers(7, &[0xFF;16]);
        assert_eq!(ay.registers(), &REG_MASKS);
        assert_eq!(ay.selected_register(), AyRegister::MixerControl);
        assert!(ay.changes().is_empty());
    }
}
