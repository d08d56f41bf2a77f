/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! Machine configuration.
#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use crate::arch::Architecture;
use crate::clock::FTs;
use crate::keyboard::ROW_IDLE;
pub use crate::peripherals::covox::CovoxMode;

/// The CPU clock frequency of all emulated machines in Hz.
pub const CPU_HZ: u32 = 3_500_000;
/// The idle ULA port bits of the TK90X/95 with the Portuguese ROM.
pub const TK_PORTUGUESE_ULA_IDLE: u8 = 0x3F;

/// Selects the emulated hardware and the attached peripherals.
///
/// The configuration is applied when a [Machine][crate::machine::Machine] is created or
/// reconfigured. Fields missing from a deserialized configuration take their default values.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "snapshot", serde(rename_all = "camelCase", default))]
pub struct MachineConfig {
    pub arch: Architecture,
    /// The TK90X/95 ULA revision (0..=2), ignored on other machines.
    pub tk_alu: u8,
    /// Emulates the keyboard of the 48k Issue 2 when reading the EAR bit.
    pub issue2: bool,
    /// The Portuguese ROM of the TK90X (v1, v2) or the TK95 is installed, the ULA port
    /// reads bit 7 as 0. Ignored on other machines.
    pub tk_portuguese_rom: bool,
    /// Attaches the AY-3-8912 to the 48k class machines.
    pub ay48: bool,
    /// Decodes the AY ports of the ZX81+ interface: `CF`, `DF`, `1F` and `0F`.
    pub zx81_ay: bool,
    pub kempston_joystick: bool,
    pub fuller_joystick: bool,
    /// Attaches the Kempston mouse.
    pub mouse: bool,
    pub covox: CovoxMode,
    /// Disables the beeper while running at an increased speed.
    pub turbo: bool,
    /// The beeper follows the EAR input when the tape is being loaded.
    ///
    /// The AY chip is detached in this mode.
    pub load_monitor: bool,
    /// The EAR input is driven by the real tape capture ring.
    pub tape_player_enabled: bool,
    /// Attaches the Beta-disk interface with the TR-DOS ROM.
    pub betadisk: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            arch: Architecture::Spec48,
            tk_alu: 0,
            issue2: false,
            tk_portuguese_rom: false,
            ay48: false,
            zx81_ay: false,
            kempston_joystick: true,
            fuller_joystick: false,
            mouse: false,
            covox: CovoxMode::None,
            turbo: false,
            load_monitor: false,
            tape_player_enabled: false,
            betadisk: false,
        }
    }
}

impl MachineConfig {
    /// Returns `true` if the AY chip is attached to the configured machine.
    ///
    /// The AY ports of the Fuller Box (`3F` and `5F`) are decoded whenever the chip is
    /// attached and the TR-DOS ROM is paged out.
    #[inline]
    pub fn has_ay(&self) -> bool {
        !self.load_monitor && (self.arch.is_128k_class() || self.ay48)
    }
    /// Returns the ULA port bits read when no key is pressed and the EAR input is low.
    #[inline]
    pub fn ula_idle_bits(&self) -> u8 {
        if self.tk_portuguese_rom && self.arch.is_tk() {
            TK_PORTUGUESE_ULA_IDLE
        }
        else {
            ROW_IDLE
        }
    }
    /// Returns `true` if the TK ULA I/O contention tables apply.
    #[inline]
    pub fn has_tk_io_contention(&self) -> bool {
        self.arch.is_tk() && self.tk_alu > 0
    }
    /// Returns the number of T-states per frame of the configured machine.
    #[inline]
    pub fn frame_tstates(&self) -> FTs {
        self.arch.frame_tstates(self.tk_alu)
    }
    /// Returns the duration of a single frame in nanoseconds.
    pub fn frame_duration_nanos(&self) -> u32 {
        (self.frame_tstates() as u64 * 1_000_000_000 / CPU_HZ as u64) as u32
    }
}
