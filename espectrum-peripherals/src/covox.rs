/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! Covox and Soundrive 8-bit DAC interfaces.
use core::fmt;
use core::str::FromStr;

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use espectrum_core::clock::FTs;

/// The DAC interface variant, selecting how port addresses are decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
pub enum CovoxMode {
    None,
    /// Port `FB` drives all channels.
    Mono,
    /// Port `0F` drives the left pair, `4F` the right pair.
    Stereo,
    /// Soundrive 1.05 in mode 1: ports `0F`, `1F`, `4F`, `5F`.
    SoundDrive1,
    /// Soundrive 1.05 in mode 2: ports `F1`, `F3`, `F9`, `FB`.
    SoundDrive2,
}

/// The error returned when parsing an unknown Covox mode name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseCovoxModeError;

/// Four DAC channels, latched by port writes.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
pub struct Covox {
    pub mode: CovoxMode,
    channels: [u8; 4],
    #[cfg_attr(feature = "snapshot", serde(skip))]
    changes: Vec<(FTs, u8)>,
}

impl Default for CovoxMode {
    fn default() -> Self {
        CovoxMode::None
    }
}

impl Covox {
    pub fn new(mode: CovoxMode) -> Self {
        Covox { mode, ..Default::default() }
    }
    /// Decodes a port write for the current mode.
    ///
    /// Returns `true` if the port belongs to the interface and the data was latched.
    pub fn write_io(&mut self, address: u16, data: u8, time: FTs) -> bool {
        let channels = match self.mode {
            CovoxMode::None => return false,
            CovoxMode::Mono => match address & 0xFF {
                0xFB => 0..4,
                _ => return false
            }
            CovoxMode::Stereo => match address & 0xFF {
                0x0F => 0..2,
                0x4F => 2..4,
                _ => return false
            }
            CovoxMode::SoundDrive1 if address & 0xAF == 0x0F => match address & 0x50 {
                0x00 => 0..1,
                0x10 => 1..2,
                0x40 => 2..3,
                _    => 3..4
            }
            CovoxMode::SoundDrive2 if address & 0xF1 == 0xF1 => match address & 0x0A {
                0x0 => 0..1,
                0x2 => 1..2,
                0x8 => 2..3,
                _   => 3..4
            }
            _ => return false
        };
        self.channels[channels].iter_mut().for_each(|ch| *ch = data);
        self.changes.push((time, self.mix()));
        true
    }
    #[inline]
    pub fn channels(&self) -> &[u8; 4] {
        &self.channels
    }
    /// Returns the average of all channels.
    #[inline]
    pub fn mix(&self) -> u8 {
        (self.channels.iter().map(|&ch| ch as u16).sum::<u16>() >> 2) as u8
    }
    /// Returns mixed levels recorded during the current frame.
    #[inline]
    pub fn changes(&self) -> &[(FTs, u8)] {
        &self.changes
    }
    pub fn next_frame(&mut self) {
        self.changes.clear();
    }
    pub fn reset(&mut self) {
        self.channels = [0; 4];
        self.changes.clear();
    }
}

impl fmt::Display for CovoxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CovoxMode::None => "None",
            CovoxMode::Mono => "Mono",
            CovoxMode::Stereo => "Stereo",
            CovoxMode::SoundDrive1 => "SoundDrive1",
            CovoxMode::SoundDrive2 => "SoundDrive2",
        })
    }
}

impl FromStr for CovoxMode {
    type Err = ParseCovoxModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [CovoxMode::None, CovoxMode::Mono, CovoxMode::Stereo,
         CovoxMode::SoundDrive1, CovoxMode::SoundDrive2].iter().copied()
        .find(|mode| mode.to_string().eq_ignore_ascii_case(s.trim()))
        .ok_or(ParseCovoxModeError)
    }
}

impl fmt::Display for ParseCovoxModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown Covox mode")
    }
}

impl std::error::Error for ParseCovoxModeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covox_mono_works() {
        let mut covox = Covox::new(CovoxMode::Mono);
        assert!(!covox.write_io(0x00FD, 0x80, 0));
        assert!(covox.write_io(0x12FB, 0x80, 10));
        assert_eq!(covox.channels(), &[0x80;4]);
        assert_eq!(covox.mix(), 0x80);
        assert_eq!(covox.changes(), &[(10, 0x80)]);
    }

    #[test]
    fn covox_stereo_works() {
        let mut covox = Covox::new(CovoxMode::Stereo);
        assert!(covox.write_io(0x000F, 0x40, 0));
        assert!(covox.write_io(0x004F, 0xC0, 0));
        assert_eq!(covox.channels(), &[0x40, 0x40, 0xC0, 0xC0]);
        assert!(!covox.write_io(0x00FB, 0, 0));
    }

    #[test]
    fn soundrive_works() {
        let mut covox = Covox::new(CovoxMode::SoundDrive1);
        for (n, port) in [0x0F, 0x1F, 0x4F, 0x5F].iter().enumerate() {
            assert!(covox.write_io(*port, n as u8 + 1, 0));
        }
        assert_eq!(covox.channels(), &[1, 2, 3, 4]);
        assert!(!covox.write_io(0x2F, 0, 0));
        let mut covox = Covox::new(CovoxMode::SoundDrive2);
        for (n, port) in [0xF1, 0xF3, 0xF9, 0xFB].iter().enumerate() {
            assert!(covox.write_io(*port, n as u8 + 1, 0));
        }
        assert_eq!(covox.channels(), &[1, 2, 3, 4]);
        assert!(!covox.write_io(0xF0, 0, 0));
        let mut covox = Covox::new(CovoxMode::None);
        assert!(!covox.write_io(0xFB, 0, 0));
    }

    #[test]
    fn covox_mode_names_work() {
        assert_eq!("stereo".parse(), Ok(CovoxMode::Stereo));
        assert_eq!("SoundDrive2".parse(), Ok(CovoxMode::SoundDrive2));
        assert_eq!("covox".parse::<CovoxMode>(), Err(ParseCovoxModeError));
    }
}
