/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
use std::io::{Read, Result};
use memchr::memchr;

/// Decompresses the **Z80** run-length encoded memory while being read.
///
/// The input is never read beyond its end and a truncated escape sequence ends the stream.
pub(super) struct MemDecompress<'a> {
    fill: u8,
    repeat: usize,
    pending: Option<u8>,
    cursor: usize,
    data: &'a [u8]
}

impl<'a> Read for MemDecompress<'a> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut len = 0;
        while len < buf.len() {
            let room = &mut buf[len..];
            if self.repeat != 0 {
                let count = self.repeat.min(room.len());
                for p in room[..count].iter_mut() {
                    *p = self.fill;
                }
                self.repeat -= count;
                len += count;
                continue;
            }
            if let Some(byte) = self.pending.take() {
                room[0] = byte;
                len += 1;
                continue;
            }
            let data = &self.data[self.cursor..];
            match data {
                [] => break,
                [0xED, 0xED, repeat, fill, ..] => {
                    self.repeat = *repeat as usize;
                    self.fill = *fill;
                    self.cursor += 4;
                }
                // truncated
                [0xED, 0xED]|[0xED, 0xED, _] => {
                    self.cursor = self.data.len();
                    break;
                }
                [0xED, next, ..] => {
                    room[0] = 0xED;
                    len += 1;
                    self.pending = Some(*next);
                    self.cursor += 2;
                }
                [0xED] => {
                    room[0] = 0xED;
                    len += 1;
                    self.cursor += 1;
                }
                _ => {
                    let literal = memchr(0xED, data).unwrap_or(data.len()).min(room.len());
                    room[..literal].copy_from_slice(&data[..literal]);
                    len += literal;
                    self.cursor += literal;
                }
            }
        }
        Ok(len)
    }
}

impl<'a> MemDecompress<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        MemDecompress {
            fill: 0, repeat: 0, pending: None, cursor: 0, data
        }
    }
}
