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
//! The core components of the ESPECTRUM emulation core.
pub mod arch;
pub mod clock;
pub mod memory;

pub use z80emu;
