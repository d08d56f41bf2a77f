/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
use std::io::{self, Read, Result};

use bitflags::bitflags;

use espectrum_core::arch::Architecture;
use espectrum_core::memory::PAGE_SIZE;

use crate::{ReadExactEx, StructRead, StructWrite};
use crate::snapshot::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Z80Version { V1, V2, V3 }

bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags1: u8 {
        const R_HIGH_BIT     = 0b0000_0001;
        const BORDER_COLOR   = 0b0000_1110;
        const BASIC_SAMROM   = 0b0001_0000;
        const MEM_COMPRESSED = 0b0010_0000;
    }
}

bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags2: u8 {
        const INTR_MODE_MASK   = 0b0000_0011;
        const ISSUE2_EMULATION = 0b0000_0100;
        const DOUBLE_INTERRUPT = 0b0000_1000;
        const VIDEO_SYNC       = 0b0011_0000;
        const JOYSTICK_MODEL   = 0b1100_0000;
    }
}

bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags3: u8 {
        const REG_R_EMU     = 0b0000_0001;
        const LDIR_EMU      = 0b0000_0010;
        const AY_SOUND_EMU  = 0b0000_0100;
        const AY_FULLER_BOX = 0b0100_0000;
        const ALT_HW_MODE   = 0b1000_0000;
    }
}

#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
#[repr(packed)]
pub struct Header {
    pub a: u8,
    pub f: u8,
    pub bc: [u8;2],
    pub hl: [u8;2],
    pub pc: [u8;2],
    pub sp: [u8;2],
    pub i: u8,
    pub r7: u8,
    pub flags1: u8,
    pub de: [u8;2],
    pub bc_alt: [u8;2],
    pub de_alt: [u8;2],
    pub hl_alt: [u8;2],
    pub a_alt: u8,
    pub f_alt: u8,
    pub iy: [u8;2],
    pub ix: [u8;2],
    pub iff1: u8,
    pub iff2: u8,
    pub flags2: u8
}

#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
#[repr(packed)]
pub struct HeaderEx {
    // version 2,3
    pub pc: [u8;2],
    pub hw_mode: u8,
    pub port1: u8,
    pub ifrom: u8,
    pub flags3: u8,
    pub ay_sel_reg: u8,
    pub ay_regs: [u8;16],
    // version 3
    pub ts_lo: [u8;2],
    pub ts_hi: u8,
    pub flags4: u8,
    pub mgt_rom: u8,
    pub mf_rom: u8,
    pub fn1: u8,
    pub fn2: u8,
    pub joy_bindings: [u8;10],
    pub joy_ascii: [u8;10],
    pub mgt_type: u8,
    pub disciple1: u8,
    pub disciple2: u8,
    // version 3 with 55 bytes long header
    pub port2: u8,
}

#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
#[repr(packed)]
pub struct MemoryHeader {
    length: [u8;2],
    page: u8
}

/// The length of the extended header of version 3 files created by this crate.
pub const HEADER_EX_V3_LENGTH: u16 = 55;
/// The end marker of the compressed memory of version 1 files.
pub const MEMORY_V1_TERM: &[u8] = &[0, 0xED, 0xED, 0];
/// The length of a memory block stored without compression.
pub const MEMORY_RAW_LENGTH: u16 = 0xFFFF;

// Structs must be packed and consist of `u8` or/and arrays of `u8` primitives only.
unsafe impl StructRead for Header {}
unsafe impl StructRead for HeaderEx {}
unsafe impl StructRead for MemoryHeader {}
unsafe impl StructWrite for Header {}
unsafe impl StructWrite for HeaderEx {}
unsafe impl StructWrite for MemoryHeader {}

impl From<u8> for Flags1 {
    fn from(mut byte: u8) -> Self {
        // for compatibility, 255 is read as 1
        if byte == u8::max_value() {
            byte = 1;
        }
        Flags1::from_bits_truncate(byte)
    }
}

impl Flags1 {
    pub fn with_border_color(self, border: u8) -> Self {
        (self & !Flags1::BORDER_COLOR) | Flags1::from_bits_truncate((border & 7) << 1)
    }

    pub fn with_refresh_high_bit(mut self, r: u8) -> Self {
        self.set(Flags1::R_HIGH_BIT, (r & 0x80) != 0);
        self
    }

    pub fn border_color(self) -> u8 {
        (self & Flags1::BORDER_COLOR).bits() >> 1
    }

    pub fn is_mem_compressed(self) -> bool {
        self.intersects(Flags1::MEM_COMPRESSED)
    }

    pub fn mix_r(self, r: u8) -> u8 {
        (r & 0x7F) | ((self & Flags1::R_HIGH_BIT).bits() << 7)
    }
}

impl Flags2 {
    pub fn with_interrupt_mode(self, im: u8) -> Self {
        (self & !Flags2::INTR_MODE_MASK) | Flags2::from_bits_truncate(im & 3)
    }

    pub fn with_issue2_emulation(mut self, issue2: bool) -> Self {
        self.set(Flags2::ISSUE2_EMULATION, issue2);
        self
    }

    pub fn interrupt_mode(self) -> u8 {
        (self & Flags2::INTR_MODE_MASK).bits()
    }

    pub fn is_issue2_emulation(self) -> bool {
        self.intersects(Flags2::ISSUE2_EMULATION)
    }
}

impl Flags3 {
    pub fn is_ay_in_use(self) -> bool {
        self.intersects(Flags3::AY_SOUND_EMU)
    }
}

impl Header {
    pub(crate) fn registers(&self) -> Registers {
        let flags1 = Flags1::from(self.flags1);
        Registers {
            af: u16::from_le_bytes([self.f, self.a]),
            bc: u16::from_le_bytes(self.bc),
            de: u16::from_le_bytes(self.de),
            hl: u16::from_le_bytes(self.hl),
            af_alt: u16::from_le_bytes([self.f_alt, self.a_alt]),
            bc_alt: u16::from_le_bytes(self.bc_alt),
            de_alt: u16::from_le_bytes(self.de_alt),
            hl_alt: u16::from_le_bytes(self.hl_alt),
            ix: u16::from_le_bytes(self.ix),
            iy: u16::from_le_bytes(self.iy),
            sp: u16::from_le_bytes(self.sp),
            pc: u16::from_le_bytes(self.pc),
            i: self.i,
            r: flags1.mix_r(self.r7),
            iff1: self.iff1 != 0,
            iff2: self.iff2 != 0,
            im: interrupt_mode_from(Flags2::from_bits_truncate(self.flags2).interrupt_mode()),
        }
    }
}

/// Returns the architecture stored in the machine byte of the extended header.
pub fn arch_from_hw_mode(version: Z80Version, hw_mode: u8) -> Option<Architecture> {
    use Z80Version::*;
    Some(match (version, hw_mode) {
        (V1, _) => Architecture::Spec48,
        (V2, 0)|(V2, 1) => Architecture::Spec48,
        (V2, 3)|(V2, 4) => Architecture::Spec128,
        (V3, 0)|(V3, 1)|(V3, 3) => Architecture::Spec48,
        (V3, 4)|(V3, 5)|(V3, 6)|(V3, 12) => Architecture::Spec128,
        (V3, 7)|(V3, 13) => Architecture::Plus2A,
        (V3, 9) => Architecture::Pentagon,
        _ => return None
    })
}

/// Returns the machine byte of the version 3 extended header for `arch`.
pub fn hw_mode_from_arch(arch: Architecture) -> u8 {
    match arch {
        Architecture::Spec48|Architecture::Tk90x|Architecture::Tk95 => 0,
        Architecture::Spec128 => 4,
        Architecture::Pentagon => 9,
        Architecture::Plus2A => 13,
    }
}

/// Maps a page number of a memory block to a memory range.
///
/// Returns `None` for pages that should be skipped.
pub fn mem_page_to_range(page: u8, arch: Architecture) -> Option<MemoryRange> {
    if arch.is_48k_class() {
        match page {
            0 => Some(MemoryRange::CustomRom),
            4 => Some(MemoryRange::ram_bank(2)),
            5 => Some(MemoryRange::ram_bank(0)),
            8 => Some(MemoryRange::ram_bank(5)),
            _ => None
        }
    }
    else {
        match page {
            3..=10 => Some(MemoryRange::ram_bank(page - 3)),
            _ => None
        }
    }
}

pub fn load_header_ex<R: Read>(mut rd: R) -> Result<(Z80Version, u16, HeaderEx)> {
    let mut header_length = [0u8;2];
    rd.read_exact(&mut header_length)?;
    let header_length = u16::from_le_bytes(header_length);
    let version = match header_length {
        23    => Z80Version::V2,
        54|55 => Z80Version::V3,
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "Z80: invalid extended header size"))
    };
    let mut header_ex = HeaderEx::default();
    header_ex.read_struct_with_limit(rd.by_ref(), header_length as usize)?;
    Ok((version, header_length, header_ex))
}

/// Reads a **Z80** V2/V3 memory header and returns `(length, page, is_compressed)` on success.
pub fn load_mem_header<R: Read>(rd: R) -> Result<Option<(usize, u8, bool)>> {
    let mut header = MemoryHeader::default();
    if header.read_struct_or_nothing(rd)? {
        let length = u16::from_le_bytes(header.length);
        if length == MEMORY_RAW_LENGTH {
            Ok(Some((PAGE_SIZE, header.page, false)))
        }
        else {
            Ok(Some((length as usize, header.page, true)))
        }
    }
    else {
        Ok(None)
    }
}

/// Reads the rest of the source and returns it, without the version 1 end marker.
pub fn read_v1_memory<R: Read>(mut rd: R, is_compressed: bool) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    rd.read_to_end(&mut buf)?;
    if is_compressed && buf.ends_with(MEMORY_V1_TERM) {
        buf.truncate(buf.len() - MEMORY_V1_TERM.len());
    }
    Ok(buf)
}

/// Fills a whole memory page from `rd`, the bytes missing in the source are left zeroed.
pub fn read_page<R: Read>(mut rd: R) -> Result<(Vec<u8>, usize)> {
    let mut page = vec![0u8; PAGE_SIZE];
    let len = rd.read_exact_or_to_end(&mut page)?;
    Ok((page, len))
}

impl MemoryHeader {
    pub fn new(length: u16, page: u8) -> Self {
        let length = length.to_le_bytes();
        MemoryHeader { length, page }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z80_machine_bytes_work() {
        assert_eq!(arch_from_hw_mode(Z80Version::V2, 3), Some(Architecture::Spec128));
        assert_eq!(arch_from_hw_mode(Z80Version::V3, 3), Some(Architecture::Spec48));
        assert_eq!(arch_from_hw_mode(Z80Version::V3, 12), Some(Architecture::Spec128));
        assert_eq!(arch_from_hw_mode(Z80Version::V3, 7), Some(Architecture::Plus2A));
        assert_eq!(arch_from_hw_mode(Z80Version::V3, 9), Some(Architecture::Pentagon));
        assert_eq!(arch_from_hw_mode(Z80Version::V2, 9), None);
        assert_eq!(arch_from_hw_mode(Z80Version::V3, 2), None);
        for &arch in Architecture::ALL.iter() {
            let expected = if arch.is_tk() { Architecture::Spec48 } else { arch };
            assert_eq!(arch_from_hw_mode(Z80Version::V3, hw_mode_from_arch(arch)), Some(expected));
        }
    }

    #[test]
    fn z80_pages_work() {
        assert_eq!(mem_page_to_range(8, Architecture::Spec48), Some(MemoryRange::ram_bank(5)));
        assert_eq!(mem_page_to_range(4, Architecture::Tk90x), Some(MemoryRange::ram_bank(2)));
        assert_eq!(mem_page_to_range(5, Architecture::Spec48), Some(MemoryRange::ram_bank(0)));
        assert_eq!(mem_page_to_range(0, Architecture::Spec48), Some(MemoryRange::CustomRom));
        assert_eq!(mem_page_to_range(3, Architecture::Spec48), None);
        assert_eq!(mem_page_to_range(3, Architecture::Spec128), Some(MemoryRange::ram_bank(0)));
        assert_eq!(mem_page_to_range(10, Architecture::Plus2A), Some(MemoryRange::ram_bank(7)));
        assert_eq!(mem_page_to_range(0, Architecture::Pentagon), None);
        assert_eq!(mem_page_to_range(11, Architecture::Spec128), None);
    }

    #[test]
    fn z80_flags_work() {
        let flags1 = Flags1::from(0xFF);
        assert_eq!(flags1, Flags1::R_HIGH_BIT);
        let flags1 = Flags1::empty().with_border_color(5).with_refresh_high_bit(0x80);
        assert_eq!(flags1.bits(), 0b0000_1011);
        assert_eq!(flags1.border_color(), 5);
        assert_eq!(flags1.mix_r(0x7F), 0xFF);
        let flags2 = Flags2::empty().with_interrupt_mode(2).with_issue2_emulation(true);
        assert_eq!(flags2.bits(), 0b110);
        assert_eq!(flags2.interrupt_mode(), 2);
        assert!(flags2.is_issue2_emulation());
    }
}
