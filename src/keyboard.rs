/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! The ZX Spectrum keyboard matrix.
use bitflags::bitflags;

bitflags! {
    /// All 40 keys of the ZX Spectrum keyboard.
    ///
    /// Each byte of the map holds a single key column of all eight half-rows, the lowest byte
    /// being the column of the keys farthest from the keyboard edge.
    #[derive(Default, Debug, PartialEq, Eq, Hash, Clone, Copy)]
    pub struct ZxKeyboardMap: u64 {
        const V  = 0x0000000001;
        const G  = 0x0000000002;
        const T  = 0x0000000004;
        const N5 = 0x0000000008;
        const N6 = 0x0000000010;
        const Y  = 0x0000000020;
        const H  = 0x0000000040;
        const B  = 0x0000000080;
        const C  = 0x0000000100;
        const F  = 0x0000000200;
        const R  = 0x0000000400;
        const N4 = 0x0000000800;
        const N7 = 0x0000001000;
        const U  = 0x0000002000;
        const J  = 0x0000004000;
        const N  = 0x0000008000;
        const X  = 0x0000010000;
        const D  = 0x0000020000;
        const E  = 0x0000040000;
        const N3 = 0x0000080000;
        const N8 = 0x0000100000;
        const I  = 0x0000200000;
        const K  = 0x0000400000;
        const M  = 0x0000800000;
        const Z  = 0x0001000000;
        const S  = 0x0002000000;
        const W  = 0x0004000000;
        const N2 = 0x0008000000;
        const N9 = 0x0010000000;
        const O  = 0x0020000000;
        const L  = 0x0040000000;
        const SS = 0x0080000000;
        const CS = 0x0100000000;
        const A  = 0x0200000000;
        const Q  = 0x0400000000;
        const N1 = 0x0800000000;
        const N0 = 0x1000000000;
        const P  = 0x2000000000;
        const EN = 0x4000000000;
        const BR = 0x8000000000;
    }
}

/// The value of an idle keyboard half-row, including the unused bits 5 and 7 set.
pub const ROW_IDLE: u8 = 0xBF;
/// The bits of a half-row that are always read as 1.
pub const ROW_UNUSED: u8 = 0xE0;

/// The keyboard matrix as seen by the ULA.
///
/// ```text
/// row  port  b4   b3   b2   b1   b0
///  0   FEFE  [V]  [C]  [X]  [Z]  [CS]
///  1   FDFE  [G]  [F]  [D]  [S]  [A]
///  2   FBFE  [T]  [R]  [E]  [W]  [Q]
///  3   F7FE  [5]  [4]  [3]  [2]  [1]
///  4   EFFE  [6]  [7]  [8]  [9]  [0]
///  5   DFFE  [Y]  [U]  [I]  [O]  [P]
///  6   BFFE  [H]  [J]  [K]  [L]  [EN]
///  7   7FFE  [B]  [N]  [M]  [SS] [BR]
/// ```
///
/// Keys are active low: a pressed key clears its bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Keyboard {
    rows: [u8; 8],
}

/// An interface for providing the keyboard state.
pub trait KeyboardInterface {
    fn get_key_state(&self) -> ZxKeyboardMap;
    fn set_key_state(&mut self, keymap: ZxKeyboardMap);
}

impl Default for Keyboard {
    fn default() -> Self {
        Keyboard { rows: [ROW_IDLE; 8] }
    }
}

impl Keyboard {
    /// Releases all keys.
    pub fn reset(&mut self) {
        self.rows = [ROW_IDLE; 8];
    }
    /// Presses the key at the `bit` (0..=4) of the half-`row` (0..=7).
    #[inline]
    pub fn press(&mut self, row: usize, bit: u8) {
        let row = &mut self.rows[row & 7];
        *row = (*row & !(1 << (bit % 5))) | ROW_UNUSED;
    }
    /// Releases the key at the `bit` (0..=4) of the half-`row` (0..=7).
    #[inline]
    pub fn release(&mut self, row: usize, bit: u8) {
        let row = &mut self.rows[row & 7];
        *row |= (1 << (bit % 5)) | ROW_UNUSED;
    }
    #[inline]
    pub fn row(&self, row: usize) -> u8 {
        self.rows[row & 7]
    }
    #[inline]
    pub fn rows(&self) -> &[u8; 8] {
        &self.rows
    }
    /// Returns the ULA data of the rows selected by the cleared bits of the port address high byte.
    pub fn read_keyboard(&self, line: u8) -> u8 {
        let mut data = ROW_IDLE;
        let mut selected = !line;
        for row in self.rows.iter() {
            if selected & 1 != 0 {
                data &= row;
            }
            selected >>= 1;
        }
        data
    }
}

impl KeyboardInterface for Keyboard {
    fn get_key_state(&self) -> ZxKeyboardMap {
        let mut bits = 0u64;
        for (row, &data) in self.rows.iter().enumerate() {
            for bit in 0..5usize {
                if data & (1 << bit) == 0 {
                    bits |= 1 << ((4 - bit) * 8 + row);
                }
            }
        }
        ZxKeyboardMap::from_bits_truncate(bits)
    }

    fn set_key_state(&mut self, keymap: ZxKeyboardMap) {
        let bits = keymap.bits();
        for (row, data) in self.rows.iter_mut().enumerate() {
            let mut value = ROW_IDLE;
            for bit in 0..5usize {
                if bits & (1 << ((4 - bit) * 8 + row)) != 0 {
                    value &= !(1 << bit);
                }
            }
            *data = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_works() {
        let mut keyboard = Keyboard::default();
        assert_eq!(keyboard.read_keyboard(0x00), 0xBF);
        keyboard.press(0, 0);
        assert_eq!(keyboard.row(0), 0xFE);
        assert_eq!(keyboard.read_keyboard(0xFE), 0xBE);
        assert_eq!(keyboard.read_keyboard(0x7F), 0xBF);
        assert_eq!(keyboard.read_keyboard(0x00), 0xBE);
        keyboard.press(7, 4);
        assert_eq!(keyboard.read_keyboard(0x7F), 0xAF);
        assert_eq!(keyboard.read_keyboard(0x7E), 0xAE);
        assert_eq!(keyboard.get_key_state(), ZxKeyboardMap::CS|ZxKeyboardMap::B);
        keyboard.release(0, 0);
        assert_eq!(keyboard.row(0), 0xFF);
        assert_eq!(keyboard.read_keyboard(0xFE), 0xBF);
        keyboard.reset();
        assert_eq!(keyboard.rows(), &[0xBF; 8]);
    }

    #[test]
    fn keyboard_map_works() {
        let mut keyboard = Keyboard::default();
        keyboard.set_key_state(ZxKeyboardMap::Q|ZxKeyboardMap::EN|ZxKeyboardMap::N5);
        assert_eq!(keyboard.row(2), 0xBE);
        assert_eq!(keyboard.row(6), 0xBE);
        assert_eq!(keyboard.row(3), 0xAF);
        assert_eq!(keyboard.row(0), 0xBF);
        assert_eq!(keyboard.get_key_state(), ZxKeyboardMap::Q|ZxKeyboardMap::EN|ZxKeyboardMap::N5);
        keyboard.set_key_state(ZxKeyboardMap::empty());
        assert_eq!(keyboard.rows(), &[0xBF; 8]);
    }

    #[test]
    fn keyboard_map_flags_work() {
        assert_eq!(ZxKeyboardMap::default(), ZxKeyboardMap::empty());
        assert_eq!(ZxKeyboardMap::all().bits(), 0xFF_FFFF_FFFF);
        assert_eq!(ZxKeyboardMap::from_bits_truncate(!0), ZxKeyboardMap::all());
        let map = ZxKeyboardMap::CS|ZxKeyboardMap::SS;
        let copy = map;
        assert!(map.contains(ZxKeyboardMap::SS));
        assert_eq!(copy - ZxKeyboardMap::SS, ZxKeyboardMap::CS);
        let mut keyboard = Keyboard::default();
        keyboard.set_key_state(ZxKeyboardMap::all());
        assert_eq!(keyboard.rows(), &[0xA0; 8]);
        assert_eq!(keyboard.get_key_state(), ZxKeyboardMap::all());
    }
}
