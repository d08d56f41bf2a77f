/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! The floating bus: reading unattached ports returns the byte the video circuit is fetching.
use crate::arch::Architecture;
use crate::clock::FTs;

/// The number of pixel lines of the screen.
const PIXEL_LINES: u32 = 192;
/// The offset of the attributes in the screen memory.
const ATTRS_OFFSET: usize = 0x1800;

/// The floating bus model, selected once from the emulated architecture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FloatingBus {
    Ula48,
    Ula128,
    Pentagon,
    /// The +2A/+3 gate array, returning the last contended memory transfer with bit 0 set
    /// outside of the screen fetch.
    Plus2A,
    Tk { first_line: u32 },
}

/// Returns the screen memory offset of the bitmap of the pixel `line`.
#[inline]
pub fn bitmap_line_offset(line: u32) -> usize {
    let line = line as usize;
    ((line & 0xC0) << 5) | ((line & 0x07) << 8) | ((line & 0x38) << 2)
}

/// Returns the screen memory offset of the attributes of the pixel `line`.
#[inline]
pub fn attr_line_offset(line: u32) -> usize {
    ATTRS_OFFSET + ((line as usize >> 3) << 5)
}

/// Returns the byte fetched at the `halfpix` cycle of the pixel `line`.
///
/// Odd cycles fetch attributes, even cycles fetch the bitmap. Each group of 4 cycles
/// fetches two columns.
#[inline]
fn fetched_byte(screen: &[u8], line: u32, halfpix: u8) -> u8 {
    let base = if halfpix & 1 != 0 {
        attr_line_offset(line)
    }
    else {
        bitmap_line_offset(line)
    };
    let offset = base + (halfpix >> 2) as usize + ((halfpix >> 1) & 1) as usize;
    screen.get(offset).copied().unwrap_or(u8::max_value())
}

impl FloatingBus {
    pub fn new(arch: Architecture, tk_alu: u8) -> Self {
        match arch {
            Architecture::Spec48 => FloatingBus::Ula48,
            Architecture::Spec128 => FloatingBus::Ula128,
            Architecture::Pentagon => FloatingBus::Pentagon,
            Architecture::Plus2A => FloatingBus::Plus2A,
            Architecture::Tk90x|Architecture::Tk95 => FloatingBus::Tk {
                first_line: Architecture::tk_pixel_line(tk_alu) as u32
            }
        }
    }

    /// Returns the floating bus value sampled at the frame T-state `ts`.
    ///
    /// `screen` is the currently displayed RAM bank, `last_rw` is the last byte transferred
    /// on the contended memory bus, used only by the +2A/+3.
    pub fn sample(self, ts: FTs, screen: &[u8], last_rw: u8) -> u8 {
        const IDLE: u8 = u8::max_value();
        let ts = if ts < 0 { u32::max_value() } else { ts as u32 };
        match self {
            FloatingBus::Ula48 => {
                let line = ts / 224;
                if !(64..64 + PIXEL_LINES).contains(&line) {
                    return IDLE
                }
                let halfpix = (ts % 224) as u8;
                if halfpix & 0x80 != 0 {
                    return IDLE
                }
                let halfpix = halfpix.wrapping_sub(3);
                if halfpix & 0x04 != 0 {
                    return IDLE
                }
                fetched_byte(screen, line - 64, halfpix)
            }
            FloatingBus::Ula128 => {
                let ts = ts.wrapping_sub(1);
                let line = ts / 228;
                if !(63..63 + PIXEL_LINES).contains(&line) {
                    return IDLE
                }
                let halfpix = (ts % 228) as u8;
                if halfpix & 0x84 != 0 {
                    return IDLE
                }
                fetched_byte(screen, line - 63, halfpix)
            }
            FloatingBus::Pentagon => {
                let line = ts / 224;
                if !(80..80 + PIXEL_LINES).contains(&line) {
                    return IDLE
                }
                let halfpix = ((ts % 224) as u8).wrapping_sub(63);
                if halfpix & 0x80 != 0 {
                    return IDLE
                }
                let halfpix = halfpix.wrapping_sub(3);
                if halfpix & 0x04 != 0 {
                    return IDLE
                }
                fetched_byte(screen, line - 80, halfpix)
            }
            FloatingBus::Plus2A => {
                let ts = ts.wrapping_sub(4);
                let line = ts / 228;
                if !(63..63 + PIXEL_LINES).contains(&line) {
                    return last_rw | 1
                }
                let halfpix = (ts % 228) as u8;
                if halfpix & 0x84 != 0 {
                    return last_rw | 1
                }
                fetched_byte(screen, line - 63, halfpix) | 1
            }
            FloatingBus::Tk { first_line } => {
                let line = (ts / 228).wrapping_sub(first_line);
                if line >= PIXEL_LINES {
                    return IDLE
                }
                let halfpix = ((ts % 228) as u8).wrapping_sub(99);
                if halfpix >= 125 || halfpix & 0x04 != 0 {
                    return IDLE
                }
                fetched_byte(screen, line, halfpix)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PAGE_SIZE;

    fn screen() -> Vec<u8> {
        (0..PAGE_SIZE).map(|i| (i ^ (i >> 8)) as u8 & 0xFE).collect()
    }

    #[test]
    fn screen_offsets_work() {
        assert_eq!(bitmap_line_offset(0), 0x0000);
        assert_eq!(bitmap_line_offset(1), 0x0100);
        assert_eq!(bitmap_line_offset(8), 0x0020);
        assert_eq!(bitmap_line_offset(64), 0x0800);
        assert_eq!(bitmap_line_offset(191), 0x17E0);
        assert_eq!(attr_line_offset(0), 0x1800);
        assert_eq!(attr_line_offset(7), 0x1800);
        assert_eq!(attr_line_offset(191), 0x1AE0);
    }

    #[test]
    fn floating_bus_48k_works() {
        let screen = screen();
        let bus = FloatingBus::new(Architecture::Spec48, 0);
        let start = 64 * 224 + 3;
        assert_eq!(bus.sample(start - 4, &screen, 0), 0xFF);
        assert_eq!(bus.sample(start, &screen, 0), screen[0]);
        assert_eq!(bus.sample(start + 1, &screen, 0), screen[0x1800]);
        assert_eq!(bus.sample(start + 2, &screen, 0), screen[1]);
        assert_eq!(bus.sample(start + 3, &screen, 0), screen[0x1801]);
        for ts in start + 4..start + 8 {
            assert_eq!(bus.sample(ts, &screen, 0), 0xFF);
        }
        assert_eq!(bus.sample(start + 8, &screen, 0), screen[2]);
        assert_eq!(bus.sample(start + 224, &screen, 0), screen[0x100]);
        assert_eq!(bus.sample(start + 125, &screen, 0), 0xFF);
        assert_eq!(bus.sample(256 * 224 + 3, &screen, 0), 0xFF);
        assert_eq!(bus.sample(0, &screen, 0), 0xFF);
        assert_eq!(bus.sample(-1, &screen, 0), 0xFF);
    }

    #[test]
    fn floating_bus_128k_works() {
        let screen = screen();
        let bus = FloatingBus::new(Architecture::Spec128, 0);
        let start = 63 * 228 + 1;
        assert_eq!(bus.sample(start - 1, &screen, 0), 0xFF);
        assert_eq!(bus.sample(start, &screen, 0), screen[0]);
        assert_eq!(bus.sample(start + 3, &screen, 0), screen[0x1801]);
        assert_eq!(bus.sample(start + 4, &screen, 0), 0xFF);
        assert_eq!(bus.sample(start + 128, &screen, 0), 0xFF);
        assert_eq!(bus.sample(start + 191 * 228, &screen, 0), screen[0x17E0]);
        assert_eq!(bus.sample(start + 192 * 228, &screen, 0), 0xFF);
    }

    #[test]
    fn floating_bus_pentagon_works() {
        let screen = screen();
        let bus = FloatingBus::new(Architecture::Pentagon, 0);
        let start = 80 * 224 + 66;
        assert_eq!(bus.sample(start, &screen, 0), screen[0]);
        assert_eq!(bus.sample(start + 2, &screen, 0), screen[1]);
        assert_eq!(bus.sample(start - 1, &screen, 0), 0xFF);
        assert_eq!(bus.sample(64 * 224 + 66, &screen, 0), 0xFF);
    }

    #[test]
    fn floating_bus_plus2a_works() {
        let screen = screen();
        let bus = FloatingBus::new(Architecture::Plus2A, 0);
        let start = 63 * 228 + 4;
        assert_eq!(bus.sample(start, &screen, 0x40), screen[0] | 1);
        assert_eq!(bus.sample(start + 1, &screen, 0x40), screen[0x1800] | 1);
        assert_eq!(bus.sample(start + 4, &screen, 0x40), 0x41);
        assert_eq!(bus.sample(0, &screen, 0x40), 0x41);
        assert_eq!(bus.sample(0, &screen, 0xFF), 0xFF);
        assert_eq!(bus.sample(start + 192 * 228, &screen, 0x22), 0x23);
    }

    #[test]
    fn floating_bus_tk_works() {
        let screen = screen();
        for &(alu, first_line) in &[(0, 38), (1, 64), (2, 38)] {
            let bus = FloatingBus::new(Architecture::Tk90x, alu);
            let start = first_line * 228 + 99;
            assert_eq!(bus.sample(start, &screen, 0), screen[0]);
            assert_eq!(bus.sample(start + 1, &screen, 0), screen[0x1800]);
            assert_eq!(bus.sample(start + 4, &screen, 0), 0xFF);
            assert_eq!(bus.sample(start - 1, &screen, 0), 0xFF);
            assert_eq!(bus.sample(start + 125, &screen, 0), 0xFF);
            assert_eq!(bus.sample(start + 192 * 228, &screen, 0), 0xFF);
        }
    }
}
