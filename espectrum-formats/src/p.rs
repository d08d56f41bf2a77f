/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! **P** ZX81 program loader.
//!
//! A **P** file is a raw dump of the ZX81 memory starting from the system variable VERSN at
//! 16393 (0x4009). The program runs on the 128k under the ZX81+ ROM, which emulates the ZX81
//! and maps the ZX81 memory at the same addresses.
use std::io::{Read, Result};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use espectrum_core::arch::Architecture;
use espectrum_core::memory::PAGE_SIZE;

use super::snapshot::*;

/// The offset of the program data in the memory window 0x4000..=0x7FFF.
pub const P_DATA_OFFSET: usize = 9;
/// The maximum size of a **P** file in bytes.
pub const P_MAX_LENGTH: usize = PAGE_SIZE - P_DATA_OFFSET;
/// The RAM bank mapped at 0x4000 on the 128k.
const WINDOW1_BANK: usize = 5;

/// Loads a **P** file into the provided snapshot `loader` from a source.
///
/// Selects the 128k, lets the `loader` start the ZX81+ ROM with [SnapshotLoader::zx81_loader],
/// then reads the program to 0x4009. Files longer than [P_MAX_LENGTH] are rejected before
/// the machine is touched.
pub fn load_p<R: Read, S: SnapshotLoader>(rd: R, loader: &mut S) -> Result<()> {
    let mut data = Vec::with_capacity(P_MAX_LENGTH);
    rd.take(P_MAX_LENGTH as u64 + 1).read_to_end(&mut data)?;
    if data.len() > P_MAX_LENGTH {
        return Err(invalid_data("P: file too large"))
    }
    loader.select_arch(Architecture::Spec128, 7).map_err(select_arch_error)?;
    loader.zx81_loader().map_err(select_arch_error)?;
    let start = WINDOW1_BANK * PAGE_SIZE + P_DATA_OFFSET;
    loader.read_into_memory(MemoryRange::Ram(start..start + data.len()), &data[..])?;
    info!("P: loaded {} bytes", data.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::snapshot::tests::TestMachine;

    #[test]
    fn p_load_works() {
        let program: Vec<u8> = (0..1000u32).map(|i| (i % 253) as u8).collect();
        let mut machine = TestMachine::new(Architecture::Spec48);
        load_p(Cursor::new(&program), &mut machine).unwrap();
        assert_eq!(machine.arch, Architecture::Spec128);
        assert!(machine.zx81);
        let bank5 = &machine.ram[5 * PAGE_SIZE..6 * PAGE_SIZE];
        assert_eq!(&bank5[..9], &[0u8; 9]);
        assert_eq!(&bank5[9..1009], &program[..]);
        assert!(bank5[1009..].iter().all(|&b| b == 0));
        // the largest file fills the window up to 0x7FFF
        let program = vec![0xAA; P_MAX_LENGTH];
        load_p(Cursor::new(&program), &mut machine).unwrap();
        assert_eq!(machine.ram[6 * PAGE_SIZE - 1], 0xAA);
        assert_eq!(machine.ram[5 * PAGE_SIZE + 8], 0);
    }

    #[test]
    fn p_rejects_large_files() {
        let mut machine = TestMachine::new(Architecture::Spec48);
        let err = load_p(Cursor::new(vec![0u8; P_MAX_LENGTH + 1]), &mut machine).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        // the machine is untouched
        assert_eq!(machine.arch, Architecture::Spec48);
        assert!(!machine.zx81);
        assert_eq!(P_MAX_LENGTH, 0x4000 - 9);
    }
}
