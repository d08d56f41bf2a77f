/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! **Z80** snapshot format utilities.
//!
//! See the format reference on [World of Spectrum](https://worldofspectrum.org/faq/reference/z80format.htm).
//!
//! ## Implementation specifics
//!
//! When reading from the **Z80** file:
//!
//! * Versions 1, 2 and 3 are recognized. The machine byte selects the 48k, 128k, +2A/+3
//!   or Pentagon architecture.
//! * Memory pages unknown to the selected architecture are skipped.
//! * Compressed pages are decoded up to the page size and up to the end of the block data.
//!
//! When writing to the **Z80** file:
//!
//! * The version 3 with the 55 bytes long extended header is always created.
//! * A page is stored uncompressed if compression doesn't make it smaller than 16kb.
mod common;
mod compress;
mod decompress;
mod loader;
mod saver;

pub use loader::*;
pub use saver::*;
