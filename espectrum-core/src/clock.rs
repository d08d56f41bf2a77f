/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! T-state timestamps, memory contention tables and the CPU clock.
use core::fmt::Debug;
use core::num::{NonZeroU8, NonZeroU16};

use bitflags::bitflags;
use z80emu::{Clock, host::cycles::*};

use crate::arch::{Architecture, CONTENDED_LINES, CONTENDED_LINE_TS};

/// A linear T-state timestamp type, relative to the beginning of the current frame.
pub type FTs = i32;

/// TK90X/95 I/O contention at the ULA port, indexed by the column T-state modulo 8.
pub const TK_CONTENTION2: [u8; 8] = [6, 6, 5, 4, 3, 2, 1, 0];
/// TK90X/95 I/O contention of the screen memory window, indexed by the column T-state.
pub const TK_CONTENTION3: [u8; 129] = [
    6,  6,  12, 12, 11, 10, 9,  8,  7,  6,  12, 12, 11, 10, 9,  8,  7,  6,  12,
    12, 11, 10, 9,  8,  7,  6,  12, 12, 11, 10, 9,  8,  7,  6,  12, 12, 11, 10,
    9,  8,  7,  6,  12, 12, 11, 10, 9,  8,  7,  6,  12, 12, 11, 10, 9,  8,  7,
    6,  12, 12, 11, 10, 9,  8,  7,  6,  12, 12, 11, 10, 9,  8,  7,  6,  12, 12,
    11, 10, 9,  8,  7,  6,  12, 12, 11, 10, 9,  8,  7,  6,  12, 12, 11, 10, 9,
    8,  7,  6,  12, 12, 11, 10, 9,  8,  7,  6,  12, 12, 11, 10, 9,  8,  7,  6,
    12, 12, 11, 10, 9,  8,  7,  6,  6,  6,  5,  4,  3,  2,  1];

/// The column of the first contended T-state on a TK pixel line.
const TK_CONTENDED_COLUMN: FTs = 93;

const ULA_PATTERN: [u8; 8] = [6, 5, 4, 3, 2, 1, 0, 0];
const PLUS2A_PATTERN: [u8; 8] = [1, 0, 7, 6, 5, 4, 3, 2];

/// A trait used by [FrameClock] for checking if an `address` is a contended one.
pub trait MemoryContention: Copy + Debug {
    fn is_contended_address(self, address: u16) -> bool;
}

bitflags! {
    /// Flags of the 16kb memory windows currently mapped to contended RAM banks.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ContentionMask: u8 {
        const WINDOW0 = 0b0001;
        const WINDOW1 = 0b0010;
        const WINDOW2 = 0b0100;
        const WINDOW3 = 0b1000;
    }
}

/// A memory contention delay table of a single machine variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentionTable {
    /// The frame T-state of the first contended cycle.
    start: FTs,
    line_ts: FTs,
    pattern: Option<[u8; 8]>,
}

/// The CPU clock counting frame T-states including memory contention.
///
/// Implements [Clock] for counting T-states when code is being executed by [z80emu::Cpu].
/// I/O cycles are not counted by [Clock::add_io], the port engine returns the whole
/// I/O cycle duration, contention included, as wait states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameClock<C=ContentionMask> {
    pub ts: FTs,
    pub table: ContentionTable,
    pub contention: C,
}

impl MemoryContention for ContentionMask {
    #[inline(always)]
    fn is_contended_address(self, address: u16) -> bool {
        self.bits() & (1 << (address >> 14)) != 0
    }
}

impl ContentionMask {
    /// Returns a mask with a single memory `window` set or cleared.
    #[inline]
    pub fn with_window(mut self, window: usize, contended: bool) -> Self {
        self.set(ContentionMask::from_bits_truncate(1 << (window & 3)), contended);
        self
    }
}

impl ContentionTable {
    /// Returns the contention table of the given machine.
    pub fn new(arch: Architecture, tk_alu: u8) -> Self {
        use Architecture::*;
        let line_ts = arch.line_tstates();
        let (start, pattern) = match arch {
            Spec48 => (14335, Some(ULA_PATTERN)),
            Spec128 => (14361, Some(ULA_PATTERN)),
            Plus2A => (14365, Some(PLUS2A_PATTERN)),
            Pentagon => (0, None),
            Tk90x|Tk95 => (
                Architecture::tk_pixel_line(tk_alu) * line_ts + TK_CONTENDED_COLUMN,
                Some(TK_CONTENTION2)
            )
        };
        ContentionTable { start, line_ts, pattern }
    }
    /// Returns `true` if the table ever adds a delay.
    #[inline]
    pub fn is_contended(&self) -> bool {
        self.pattern.is_some()
    }
    /// Returns the number of T-states a contended access at `ts` is delayed by.
    #[inline]
    pub fn delay(&self, ts: FTs) -> FTs {
        let pattern = match self.pattern {
            Some(ref pattern) => pattern,
            None => return 0
        };
        let offset = ts - self.start;
        if offset < 0 {
            return 0
        }
        let line = offset / self.line_ts;
        let column = offset % self.line_ts;
        if line < CONTENDED_LINES && column < CONTENDED_LINE_TS {
            pattern[(column & 7) as usize] as FTs
        }
        else {
            0
        }
    }
}

/// Returns the additional I/O contention of the TK90X/95 ULA for the port `address` accessed at `ts`.
pub fn tk_io_contention(ts: FTs, address: u16, tk_alu: u8) -> FTs {
    const LINE_TS: FTs = 228;
    let column = ts.rem_euclid(LINE_TS) - TK_CONTENDED_COLUMN;
    let line = ts.div_euclid(LINE_TS) - Architecture::tk_pixel_line(tk_alu);
    if column < 0 || !(0..CONTENDED_LINES).contains(&line) {
        return 0
    }
    let column = column as usize;
    if address & 0xC000 == 0x4000 {
        TK_CONTENTION3.get(column).copied().unwrap_or(0) as FTs
    }
    else if address & 1 != 0 {
        0
    }
    else if column < CONTENDED_LINE_TS as usize {
        TK_CONTENTION2[column & 7] as FTs
    }
    else {
        0
    }
}

impl<C: MemoryContention + Default> FrameClock<C> {
    pub fn new(ts: FTs, table: ContentionTable) -> Self {
        FrameClock { ts, table, contention: C::default() }
    }
}

impl<C: MemoryContention> FrameClock<C> {
    #[inline(always)]
    fn contend(&self, address: u16) -> FTs {
        if self.contention.is_contended_address(address) {
            self.table.delay(self.ts)
        }
        else {
            0
        }
    }
}

impl<C: MemoryContention> Clock for FrameClock<C> {
    type Limit = FTs;
    type Timestamp = FTs;

    #[inline(always)]
    fn is_past_limit(&self, limit: Self::Limit) -> bool {
        self.ts >= limit
    }

    fn add_irq(&mut self, _pc: u16) -> Self::Timestamp {
        self.ts += IRQ_ACK_CYCLE_TS as FTs;
        self.ts
    }

    fn add_no_mreq(&mut self, address: u16, add_ts: NonZeroU8) {
        if self.contention.is_contended_address(address) {
            for _ in 0..add_ts.get() {
                self.ts += self.table.delay(self.ts) + 1;
            }
        }
        else {
            self.ts += add_ts.get() as FTs;
        }
    }

    fn add_m1(&mut self, address: u16) -> Self::Timestamp {
        self.ts += self.contend(address) + M1_CYCLE_TS as FTs;
        self.ts
    }

    fn add_mreq(&mut self, address: u16) -> Self::Timestamp {
        self.ts += self.contend(address) + MEMRW_CYCLE_TS as FTs;
        self.ts
    }

    #[inline(always)]
    fn add_io(&mut self, _port: u16) -> Self::Timestamp {
        self.ts
    }

    fn add_wait_states(&mut self, _bus: u16, wait_states: NonZeroU16) {
        self.ts += wait_states.get() as FTs;
    }

    #[inline(always)]
    fn as_timestamp(&self) -> Self::Timestamp {
        self.ts
    }
}
