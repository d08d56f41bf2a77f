/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! The ULA beeper output level.
#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use espectrum_core::clock::FTs;

const SPK_VAL: u8 = 0xA0;
const MIC_VAL: u8 = 0x50;
const EAR_VAL: u8 = 0x0F;

/// Output levels indexed by `SPK|MIC|EAR` bits: `((port254 >> 2) & 6) | ear`.
pub const SPEAKER_VALUES: [u8; 8] = [
              MIC_VAL          , // 000
              MIC_VAL + EAR_VAL, // 001
    0                          , // 010
                        EAR_VAL, // 011
    SPK_VAL + MIC_VAL          , // 100
    SPK_VAL + MIC_VAL + EAR_VAL, // 101
    SPK_VAL                    , // 110
    SPK_VAL +           EAR_VAL  // 111
];

/// The level used by the tape load monitor when the EAR input is high.
pub const LOAD_MONITOR_LEVEL: u8 = 0xFF;

/// Returns the beeper level from the last ULA port write and the current EAR input.
#[inline]
pub fn speaker_level(port254: u8, ear: bool) -> u8 {
    SPEAKER_VALUES[(((port254 >> 2) & 6) | ear as u8) as usize]
}

/// Tracks the beeper level and records its changes during the current frame.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
pub struct Beeper {
    level: u8,
    #[cfg_attr(feature = "snapshot", serde(skip))]
    changes: Vec<(FTs, u8)>,
}

impl Beeper {
    #[inline]
    pub fn level(&self) -> u8 {
        self.level
    }
    /// Sets a new level at `time`. Returns `true` and records the change if the level differs.
    pub fn set_level(&mut self, level: u8, time: FTs) -> bool {
        if level != self.level {
            self.level = level;
            self.changes.push((time, level));
            true
        }
        else {
            false
        }
    }
    #[inline]
    pub fn changes(&self) -> &[(FTs, u8)] {
        &self.changes
    }
    pub fn next_frame(&mut self) {
        self.changes.clear();
    }
    pub fn reset(&mut self) {
        self.level = 0;
        self.changes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_levels_work() {
        assert_eq!(SPEAKER_VALUES, [0x50, 0x5F, 0x00, 0x0F, 0xF0, 0xFF, 0xA0, 0xAF]);
        assert_eq!(speaker_level(0x00, false), 0x50);
        assert_eq!(speaker_level(0x08, false), 0x00);
        assert_eq!(speaker_level(0x10, true), 0xFF);
        assert_eq!(speaker_level(0x18, true), 0xAF);
        assert_eq!(speaker_level(0x07, false), 0x50);
    }

    #[test]
    fn beeper_records_changes() {
        let mut beeper = Beeper::default();
        assert!(beeper.set_level(0x50, 10));
        assert!(!beeper.set_level(0x50, 20));
        assert!(beeper.set_level(0xF0, 30));
        assert_eq!(beeper.changes(), &[(10, 0x50), (30, 0xF0)]);
        beeper.next_frame();
        assert!(beeper.changes().is_empty());
        assert_eq!(beeper.level(), 0xF0);
    }
}
