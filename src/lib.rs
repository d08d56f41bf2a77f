/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    ESPECTRUM is free software: you can redistribute it and/or modify it under
    the terms of the GNU Lesser General Public License (LGPL) as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    ESPECTRUM is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Lesser General Public License for more details.

    You should have received a copy of the GNU Lesser General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.

    Author contact information: see Cargo.toml file, section [package.authors].
*/
//! ESPECTRUM is a cycle-accurate emulation core of the ZX Spectrum 48K, 128K, +2A/+3,
//! Pentagon and TK90X/95 computers.
//!
//! The [machine::Machine] binds the [z80emu] CPU to the memory manager and the I/O port
//! engine of the selected [arch::Architecture]. Snapshots, cheats and the time machine
//! operate on a machine between frames.
//!
//! ```no_run
//! use espectrum::{arch::Architecture, config::MachineConfig, machine::Machine};
//!
//! let mut machine = Machine::new(MachineConfig { arch: Architecture::Spec128, ..Default::default() });
//! let rom = std::fs::read("128-0.rom").unwrap();
//! machine.memory_mut().load_rom(0, &rom[..]).unwrap();
//! loop {
//!     machine.run_frame();
//! }
//! ```
pub mod cheats;
pub mod config;
pub mod floating_bus;
pub mod keyboard;
pub mod machine;
pub mod ports;
pub mod snapshot;
pub mod time_machine;

pub use espectrum_core::{arch, clock, memory, z80emu};
pub use espectrum_formats as formats;
pub use espectrum_peripherals as peripherals;
