/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! The cheat engine applies and reverts **POK** file pokes on top of the live memory.
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use crate::formats::pok::{PokFile, Poke, CheatError, POKE_BANK_ABSOLUTE};
use crate::memory::{MemoryManager, PAGE_SIZE};

/// The name of the directory containing cheat files, next to the snapshot files.
pub const POKES_DIR: &str = "POKES";

/// Holds the cheats of the currently running program.
///
/// The engine operates only between frames. A cheat file that can't be loaded leaves
/// the engine empty.
#[derive(Clone, Debug, Default)]
pub struct CheatEngine {
    file: Option<PokFile>,
}

/// Returns the path of the cheat file of the given snapshot: `<dir>/POKES/<stem>.pok`.
pub fn pok_path_for<P: AsRef<Path>>(snapshot_path: P) -> PathBuf {
    let path = snapshot_path.as_ref();
    let mut pok = path.parent().unwrap_or_else(|| Path::new("")).join(POKES_DIR);
    pok.push(path.file_stem().unwrap_or_default());
    pok.set_extension("pok");
    pok
}

#[inline]
fn ram_offset(address: u16) -> usize {
    address as usize & (PAGE_SIZE - 1)
}

fn peek(memory: &MemoryManager, poke: &Poke) -> u8 {
    if poke.bank & POKE_BANK_ABSOLUTE != 0 {
        memory.read_byte(poke.address)
    }
    else {
        memory.ram_bank(poke.bank & 7)[ram_offset(poke.address)]
    }
}

fn poke(memory: &mut MemoryManager, poke: &Poke, value: u8) {
    if poke.bank & POKE_BANK_ABSOLUTE != 0 {
        memory.write_byte(poke.address, value);
    }
    else {
        memory.ram_bank_mut(poke.bank & 7)[ram_offset(poke.address)] = value;
    }
}

impl CheatEngine {
    pub fn new() -> Self {
        CheatEngine::default()
    }
    /// Loads cheats from the file at `path`, replacing the current cheats.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CheatError> {
        self.clear();
        let file = File::open(path.as_ref())?;
        self.load_from(file)?;
        info!("cheats: {} loaded from {}", self.cheat_count(), path.as_ref().display());
        Ok(())
    }
    /// Loads cheats from the `rd` source, replacing the current cheats.
    pub fn load_from<R: Read>(&mut self, rd: R) -> Result<(), CheatError> {
        self.clear();
        match PokFile::read(rd) {
            Ok(file) => {
                self.file = Some(file);
                Ok(())
            }
            Err(err) => {
                warn!("cheats: {}", err);
                Err(err)
            }
        }
    }
    /// Removes all cheats without touching the memory.
    pub fn clear(&mut self) {
        self.file = None;
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cheat_count() == 0
    }
    pub fn cheat_count(&self) -> usize {
        self.file.as_ref().map_or(0, |file| file.cheats().len())
    }
    pub fn poke_count(&self) -> usize {
        self.file.as_ref().map_or(0, |file| file.pokes().len())
    }
    pub fn cheat_name(&self, index: usize) -> Option<&str> {
        self.file.as_ref()?.cheat_name(index)
    }
    pub fn is_enabled(&self, index: usize) -> bool {
        self.file.as_ref()
                 .and_then(|file| file.cheats().get(index))
                 .map_or(false, |cheat| cheat.enabled)
    }
    /// Enables or disables the cheat at `index`. Returns the new state.
    ///
    /// The memory is modified only by [CheatEngine::apply_cheats].
    pub fn toggle_cheat(&mut self, index: usize) -> bool {
        match self.file.as_mut().and_then(|file| file.cheats_mut().get_mut(index)) {
            Some(cheat) => {
                cheat.enabled = !cheat.enabled;
                debug!("cheats: #{} enabled: {}", index, cheat.enabled);
                cheat.enabled
            }
            None => false
        }
    }
    pub fn pokes_for_cheat(&self, index: usize) -> &[Poke] {
        match self.file {
            Some(ref file) => file.pokes_for_cheat(index),
            None => &[]
        }
    }
    /// Returns the pokes of the cheat at `index` requiring a value from the user.
    pub fn input_pokes(&self, index: usize) -> impl Iterator<Item=&Poke> {
        self.pokes_for_cheat(index).iter().filter(|poke| poke.is_input)
    }
    /// Sets the value of the `input_index`-th input poke of the cheat at `index`.
    ///
    /// Returns `false` if there is no such poke.
    pub fn set_poke_value(&mut self, index: usize, input_index: usize, value: u8) -> bool {
        match self.file.as_mut().and_then(|file| file.input_poke_mut(index, input_index)) {
            Some(poke) => {
                poke.value = value;
                true
            }
            None => false
        }
    }
    /// Captures the live memory byte of every poke with an unknown original value.
    pub fn fetch_original_values_from_mem(&mut self, memory: &MemoryManager) {
        if let Some(file) = self.file.as_mut() {
            for poke in file.pokes_mut().iter_mut()
                            .filter(|poke| !(poke.orig_from_mem || poke.orig_from_file))
            {
                poke.original = peek(memory, poke);
                poke.orig_from_mem = true;
            }
        }
    }
    /// Writes the values of the enabled cheats and the known originals of the disabled ones.
    pub fn apply_cheats(&self, memory: &mut MemoryManager) {
        let file = match self.file {
            Some(ref file) => file,
            None => return
        };
        for cheat in file.cheats() {
            for p in &file.pokes()[cheat.pokes.clone()] {
                if cheat.enabled {
                    poke(memory, p, p.value);
                }
                else if p.orig_from_mem || p.orig_from_file {
                    poke(memory, p, p.original);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Architecture;

    const POK: &str = "NInfinite lives\n\
                       M 8 35136 0 53\n\
                       Z 8 35137 256 0\n\
                       NAmmo\n\
                       Z 2 1000 7 0\n\
                       Y\n";

    fn memory() -> MemoryManager {
        let mut memory = MemoryManager::new(Architecture::Spec48);
        memory.write_byte(35136, 53);
        memory.write_byte(35137, 3);
        memory.ram_bank_mut(2)[1000] = 9;
        memory
    }

    fn bytes(memory: &MemoryManager) -> [u8; 3] {
        [memory.read_byte(35136), memory.read_byte(35137), memory.ram_bank(2)[1000]]
    }

    #[test]
    fn pok_path_works() {
        assert_eq!(pok_path_for("games/jetpac.z80"), Path::new("games/POKES/jetpac.pok"));
        assert_eq!(pok_path_for("jetpac.sna"), Path::new("POKES/jetpac.pok"));
    }

    #[test]
    fn cheat_engine_works() {
        let mut engine = CheatEngine::new();
        assert!(engine.is_empty());
        engine.load_from(POK.as_bytes()).unwrap();
        assert_eq!(engine.cheat_count(), 2);
        assert_eq!(engine.poke_count(), 3);
        assert_eq!(engine.cheat_name(0), Some("Infinite lives"));
        assert_eq!(engine.cheat_name(1), Some("Ammo"));
        assert_eq!(engine.cheat_name(2), None);
        assert_eq!(engine.input_pokes(0).count(), 1);
        assert_eq!(engine.input_pokes(1).count(), 0);
        assert_eq!(engine.pokes_for_cheat(1).len(), 1);
        assert!(engine.set_poke_value(0, 0, 99));
        assert!(!engine.set_poke_value(1, 0, 99));

        let mut memory = memory();
        engine.fetch_original_values_from_mem(&memory);
        assert_eq!(engine.pokes_for_cheat(0)[1].original, 3);
        assert!(engine.pokes_for_cheat(0)[1].orig_from_mem);
        assert_eq!(engine.pokes_for_cheat(1)[0].original, 9);
        assert!(!engine.pokes_for_cheat(0)[0].orig_from_mem);
        engine.apply_cheats(&mut memory);
        assert_eq!(bytes(&memory), [53, 3, 9]);

        assert!(engine.toggle_cheat(0));
        assert!(engine.toggle_cheat(1));
        engine.apply_cheats(&mut memory);
        assert_eq!(bytes(&memory), [0, 99, 7]);
        engine.apply_cheats(&mut memory);
        assert_eq!(bytes(&memory), [0, 99, 7]);
        // the originals are captured only once
        engine.fetch_original_values_from_mem(&memory);
        assert_eq!(engine.pokes_for_cheat(1)[0].original, 9);

        assert!(!engine.toggle_cheat(0));
        assert!(!engine.toggle_cheat(1));
        engine.apply_cheats(&mut memory);
        assert_eq!(bytes(&memory), [53, 3, 9]);
        engine.toggle_cheat(1);
        engine.apply_cheats(&mut memory);
        assert_eq!(bytes(&memory), [53, 3, 7]);
        assert!(engine.is_enabled(1));
        assert!(!engine.is_enabled(0));
        assert!(!engine.toggle_cheat(5));
    }

    #[test]
    fn failed_load_leaves_engine_empty() {
        let mut engine = CheatEngine::new();
        engine.load_from(POK.as_bytes()).unwrap();
        assert!(engine.load("/nonexistent/POKES/none.pok").is_err());
        assert!(engine.is_empty());
        assert!(engine.load_from(&b"NNo pokes\nY\n"[..]).is_err());
        assert!(engine.is_empty());
        assert_eq!(engine.poke_count(), 0);
        assert!(engine.pokes_for_cheat(0).is_empty());
        let mut memory = memory();
        engine.apply_cheats(&mut memory);
        assert_eq!(bytes(&memory), [53, 3, 9]);
    }
}
