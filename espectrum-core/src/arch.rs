/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! Emulated machine variants and their frame geometry.
use core::fmt;
use core::str::FromStr;
use std::error::Error;

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use crate::clock::FTs;

/// The hardware variant of the emulated computer.
///
/// The variant is selected once at machine configuration time and every timing or
/// decoding quirk is resolved by matching on it.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Architecture {
    Spec48,
    Spec128,
    /// Amstrad +2A and +3 share the same gate array.
    Plus2A,
    Pentagon,
    Tk90x,
    Tk95,
}

/// The error returned when parsing an unknown architecture name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseArchitectureError(String);

/// A number of video scan lines with contended memory access.
pub const CONTENDED_LINES: FTs = 192;
/// A number of T-states per scan line with contended memory access.
pub const CONTENDED_LINE_TS: FTs = 128;

/// Scan line of the first pixel line on TK machines, indexed by the ULA (ALU) revision.
const TK_PIXEL_LINE: [FTs; 3] = [38, 64, 38];
/// Total scan lines on TK machines, indexed by the ULA (ALU) revision.
const TK_FRAME_LINES: [FTs; 3] = [262, 312, 262];

impl Default for Architecture {
    fn default() -> Self {
        Architecture::Spec48
    }
}

impl Architecture {
    pub const ALL: [Architecture; 6] = [
        Architecture::Spec48,
        Architecture::Spec128,
        Architecture::Plus2A,
        Architecture::Pentagon,
        Architecture::Tk90x,
        Architecture::Tk95,
    ];

    /// Returns `true` for machines with 48k memory model: the original 48k and the TK clones.
    #[inline]
    pub fn is_48k_class(self) -> bool {
        matches!(self, Architecture::Spec48|Architecture::Tk90x|Architecture::Tk95)
    }

    #[inline]
    pub fn is_128k_class(self) -> bool {
        !self.is_48k_class()
    }

    #[inline]
    pub fn is_tk(self) -> bool {
        matches!(self, Architecture::Tk90x|Architecture::Tk95)
    }

    /// Returns `true` if I/O cycles are subject to the Sinclair ULA contention.
    ///
    /// Pentagon has no contention at all and the +2A gate array doesn't contend I/O.
    #[inline]
    pub fn has_io_contention(self) -> bool {
        !matches!(self, Architecture::Pentagon|Architecture::Plus2A)
    }

    /// Returns `true` if the paging port is locked right after reset.
    #[inline]
    pub fn is_paging_locked_at_reset(self) -> bool {
        self.is_48k_class()
    }

    /// Returns `true` if the RAM `bank` is contended when paged into the top memory window.
    #[inline]
    pub fn is_bank_contended(self, bank: u8) -> bool {
        match self {
            Architecture::Pentagon => false,
            Architecture::Plus2A => bank & 7 > 3,
            _ => bank & 1 != 0
        }
    }

    /// Returns the number of T-states per video scan line.
    #[inline]
    pub fn line_tstates(self) -> FTs {
        match self {
            Architecture::Spec48|Architecture::Pentagon => 224,
            _ => 228
        }
    }

    /// Returns the number of video scan lines per frame.
    pub fn frame_lines(self, tk_alu: u8) -> FTs {
        match self {
            Architecture::Spec48 => 312,
            Architecture::Spec128|Architecture::Plus2A => 311,
            Architecture::Pentagon => 320,
            Architecture::Tk90x|Architecture::Tk95 => TK_FRAME_LINES[tk_alu_index(tk_alu)]
        }
    }

    /// Returns the number of T-states per video frame.
    #[inline]
    pub fn frame_tstates(self, tk_alu: u8) -> FTs {
        self.frame_lines(tk_alu) * self.line_tstates()
    }

    /// Returns the duration of the maskable interrupt request signal in T-states.
    #[inline]
    pub fn irq_length(self) -> FTs {
        match self {
            Architecture::Spec128 => 36,
            _ => 32
        }
    }

    /// Returns the scan line of the first pixel line on TK machines.
    #[inline]
    pub fn tk_pixel_line(tk_alu: u8) -> FTs {
        TK_PIXEL_LINE[tk_alu_index(tk_alu)]
    }
}

#[inline]
fn tk_alu_index(tk_alu: u8) -> usize {
    (tk_alu as usize).min(2)
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Architecture::Spec48 => "48K",
            Architecture::Spec128 => "128K",
            Architecture::Plus2A => "+2A",
            Architecture::Pentagon => "Pentagon",
            Architecture::Tk90x => "TK90X",
            Architecture::Tk95 => "TK95",
        })
    }
}

impl FromStr for Architecture {
    type Err = ParseArchitectureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Architecture::ALL.iter().copied()
        .find(|arch| arch.to_string().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| ParseArchitectureError(s.into()))
    }
}

impl fmt::Display for ParseArchitectureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown machine architecture: {:?}", self.0)
    }
}

impl Error for ParseArchitectureError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arch_names_work() {
        for arch in Architecture::ALL.iter() {
            assert_eq!(*arch, arch.to_string().parse().unwrap());
        }
        assert_eq!(Architecture::Plus2A, "+2a".parse().unwrap());
        assert_eq!(Architecture::Pentagon, " pentagon ".parse().unwrap());
        assert!("Spectrum".parse::<Architecture>().is_err());
    }

    #[test]
    fn frame_geometry_works() {
        assert_eq!(Architecture::Spec48.frame_tstates(0), 69888);
        assert_eq!(Architecture::Spec128.frame_tstates(0), 70908);
        assert_eq!(Architecture::Plus2A.frame_tstates(0), 70908);
        assert_eq!(Architecture::Pentagon.frame_tstates(0), 71680);
        assert_eq!(Architecture::Tk90x.frame_tstates(1), 71136);
        assert_eq!(Architecture::Tk95.frame_tstates(0), 59736);
        assert_eq!(Architecture::Tk95.frame_tstates(7), 59736);
        assert_eq!(Architecture::tk_pixel_line(1), 64);
        assert_eq!(Architecture::tk_pixel_line(2), 38);
    }

    #[test]
    fn bank_contention_works() {
        for bank in 0..8 {
            assert!(!Architecture::Pentagon.is_bank_contended(bank));
            assert_eq!(Architecture::Spec128.is_bank_contended(bank), bank & 1 == 1);
            assert_eq!(Architecture::Plus2A.is_bank_contended(bank), bank >= 4);
        }
        assert!(Architecture::Tk90x.is_48k_class());
        assert!(Architecture::Tk90x.has_io_contention());
        assert!(!Architecture::Plus2A.has_io_contention());
    }
}
