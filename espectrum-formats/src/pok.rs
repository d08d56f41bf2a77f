/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! **POK** cheat file parser.
//!
//! A cheat file is a line oriented text:
//!
//! * `N<name>` starts a new cheat,
//! * `M <bank> <address> <value> <original>` adds a poke to the current cheat, the last poke
//!   of each cheat is usually marked with `Z` instead of `M`,
//! * `Y` ends the file.
//!
//! A `value` of 256 requests the value from the user. The `original` of 0 is unknown.
//! A `bank` with bit 3 set addresses the memory as currently paged in, otherwise it selects
//! a RAM bank.
use core::fmt;
use core::ops::Range;
use std::io::{self, Read};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use nom::IResult;
use nom::character::complete::{digit1, one_of, space0, space1};
use nom::combinator::{all_consuming, map_res};
use nom::sequence::{preceded, terminated, tuple};

/// The poke value requesting the input from the user.
pub const POKE_INPUT_VALUE: u16 = 256;
/// Set in [Poke::bank] when the address is resolved through the live memory windows.
pub const POKE_BANK_ABSOLUTE: u8 = 0x08;

/// A single memory modification of a cheat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Poke {
    pub bank: u8,
    pub address: u16,
    pub value: u8,
    pub original: u8,
    /// The value is entered by the user.
    pub is_input: bool,
    /// The original value has been fetched from the memory.
    pub orig_from_mem: bool,
    /// The original value has been provided by the cheat file.
    pub orig_from_file: bool,
}

/// A named group of pokes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cheat {
    /// The byte offset of the cheat name in the source text.
    pub name_offset: usize,
    /// The range of the cheat pokes in [PokFile::pokes].
    pub pokes: Range<usize>,
    pub enabled: bool,
    /// The number of pokes with values entered by the user.
    pub input_count: usize,
}

/// A parsed cheat file, retaining its source text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PokFile {
    source: String,
    cheats: Vec<Cheat>,
    pokes: Vec<Poke>,
}

/// The error returned when the whole cheat file is unusable.
#[derive(Debug)]
pub enum CheatError {
    Io(io::Error),
    /// The file doesn't contain any cheat with pokes.
    NoCheats,
}

impl std::error::Error for CheatError {}

impl fmt::Display for CheatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheatError::Io(err) => write!(f, "POK: {}", err),
            CheatError::NoCheats => f.write_str("POK: no cheats found"),
        }
    }
}

impl From<io::Error> for CheatError {
    fn from(err: io::Error) -> Self {
        CheatError::Io(err)
    }
}

type PokeFields = (u8, u16, u16, u8);

fn number<T: core::str::FromStr>(input: &str) -> IResult<&str, T> {
    map_res(digit1, |digits: &str| digits.parse::<T>())(input)
}

/// Parses `<tag> <bank> <address> <value> <original>`.
fn poke_line(input: &str) -> IResult<&str, PokeFields> {
    all_consuming(terminated(preceded(one_of("MZ"), tuple((
        preceded(space1, number::<u8>),
        preceded(space1, number::<u16>),
        preceded(space1, number::<u16>),
        preceded(space1, number::<u8>),
    ))), space0))(input)
}

fn parse_poke(line: &str) -> Option<Poke> {
    let (_, (bank, address, value, original)) = poke_line(line).ok()?;
    if value > POKE_INPUT_VALUE {
        return None
    }
    let is_input = value == POKE_INPUT_VALUE;
    let orig_from_file = original != 0;
    Some(Poke {
        bank, address,
        value: if is_input { original } else { value as u8 },
        original,
        is_input,
        orig_from_mem: false,
        orig_from_file,
    })
}

/// Iterates over lines with their byte offsets, stripped of line terminators.
fn lines_with_offsets(source: &str) -> impl Iterator<Item=(usize, &str)> {
    source.split('\n').scan(0, |offset, line| {
        let start = *offset;
        *offset += line.len() + 1;
        Some((start, line.trim_end_matches('\r')))
    })
}

impl PokFile {
    /// Parses the cheat file text.
    ///
    /// Malformed poke lines are skipped, cheats without pokes are dropped.
    pub fn parse(source: String) -> Result<Self, CheatError> {
        // count pass
        let (mut ncheats, mut npokes) = (0, 0);
        for (_, line) in lines_with_offsets(&source) {
            match line.as_bytes().first() {
                Some(b'N') => ncheats += 1,
                Some(b'M')|Some(b'Z') => npokes += 1,
                Some(b'Y') => break,
                _ => {}
            }
        }
        let mut cheats = Vec::with_capacity(ncheats);
        let mut pokes = Vec::with_capacity(npokes);
        let mut current: Option<Cheat> = None;

        fn flush(cheats: &mut Vec<Cheat>, cheat: Option<Cheat>, pokes_len: usize) {
            if let Some(mut cheat) = cheat {
                cheat.pokes.end = pokes_len;
                if !cheat.pokes.is_empty() {
                    cheats.push(cheat);
                }
            }
        }

        for (lineno, (offset, line)) in lines_with_offsets(&source).enumerate() {
            match line.as_bytes().first() {
                Some(b'N') => {
                    flush(&mut cheats, current.take(), pokes.len());
                    current = Some(Cheat {
                        name_offset: offset + 1,
                        pokes: pokes.len()..pokes.len(),
                        enabled: false,
                        input_count: 0
                    });
                }
                Some(b'M')|Some(b'Z') => {
                    let cheat = match current.as_mut() {
                        Some(cheat) => cheat,
                        None => {
                            warn!("POK: line {}: a poke outside of a cheat", lineno + 1);
                            continue;
                        }
                    };
                    match parse_poke(line) {
                        Some(poke) => {
                            if poke.is_input {
                                cheat.input_count += 1;
                            }
                            pokes.push(poke);
                        }
                        None => warn!("POK: line {}: malformed poke: {:?}", lineno + 1, line)
                    }
                }
                Some(b'Y') => break,
                _ => {}
            }
        }
        flush(&mut cheats, current, pokes.len());

        if cheats.is_empty() {
            return Err(CheatError::NoCheats)
        }
        debug!("POK: {} cheats, {} pokes", cheats.len(), pokes.len());
        Ok(PokFile { source, cheats, pokes })
    }

    /// Reads the whole cheat file from `rd` and parses it.
    ///
    /// Bytes that are not valid UTF-8 are replaced in cheat names.
    pub fn read<R: Read>(mut rd: R) -> Result<Self, CheatError> {
        let mut data = Vec::new();
        rd.read_to_end(&mut data)?;
        let source = match String::from_utf8(data) {
            Ok(source) => source,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned()
        };
        PokFile::parse(source)
    }

    #[inline]
    pub fn cheats(&self) -> &[Cheat] {
        &self.cheats
    }

    #[inline]
    pub fn cheats_mut(&mut self) -> &mut [Cheat] {
        &mut self.cheats
    }

    #[inline]
    pub fn pokes(&self) -> &[Poke] {
        &self.pokes
    }

    #[inline]
    pub fn pokes_mut(&mut self) -> &mut [Poke] {
        &mut self.pokes
    }

    /// Returns the name of the cheat at `index`, read from the source text.
    pub fn cheat_name(&self, index: usize) -> Option<&str> {
        let offset = self.cheats.get(index)?.name_offset;
        let name = self.source.get(offset..)?;
        let end = name.find('\n').unwrap_or(name.len());
        Some(name[..end].trim_end_matches('\r'))
    }

    /// Returns the pokes of the cheat at `index`.
    pub fn pokes_for_cheat(&self, index: usize) -> &[Poke] {
        match self.cheats.get(index) {
            Some(cheat) => &self.pokes[cheat.pokes.clone()],
            None => &[]
        }
    }

    /// Returns the pokes of the cheat at `index` with the values entered by the user.
    pub fn input_pokes(&self, index: usize) -> impl Iterator<Item=&Poke> {
        self.pokes_for_cheat(index).iter().filter(|poke| poke.is_input)
    }

    /// Returns a mutable reference to the `input_index`-th input poke of the cheat at `index`.
    pub fn input_poke_mut(&mut self, index: usize, input_index: usize) -> Option<&mut Poke> {
        let range = self.cheats.get(index)?.pokes.clone();
        self.pokes[range].iter_mut().filter(|poke| poke.is_input).nth(input_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POK: &str = "NInfinite lives\r\n\
                       M 8 35136 0 53\r\n\
                       Z 8 35137 256 0\r\n\
                       Y\r\n";

    #[test]
    fn pok_works() {
        let pok = PokFile::parse(POK.to_string()).unwrap();
        assert_eq!(pok.cheats().len(), 1);
        assert_eq!(pok.pokes().len(), 2);
        assert_eq!(pok.cheat_name(0), Some("Infinite lives"));
        assert_eq!(pok.cheat_name(1), None);
        assert_eq!(pok.cheats()[0].input_count, 1);
        assert_eq!(pok.input_pokes(0).count(), 1);
        assert_eq!(pok.pokes_for_cheat(0), &[
            Poke { bank: 8, address: 35136, value: 0, original: 53,
                   is_input: false, orig_from_mem: false, orig_from_file: true },
            Poke { bank: 8, address: 35137, value: 0, original: 0,
                   is_input: true, orig_from_mem: false, orig_from_file: false },
        ][..]);
        assert!(!pok.cheats()[0].enabled);
    }

    #[test]
    fn pok_skips_malformed_lines() {
        let source = "NEmpty\n\
                      NFirst\n\
                      M 0 40000 1\n\
                      M 1 40000 257 0\n\
                      M 1 70000 1 0\n\
                      M 3 49152 201 0  \n\
                      Z 3 49153 0 0\n\
                      NSecond\n\
                      Z 8 23296 256 7\n\
                      Y\n\
                      NIgnored\n\
                      Z 8 1 1 1\n";
        let mut pok = PokFile::parse(source.to_string()).unwrap();
        assert_eq!(pok.cheats().len(), 2);
        assert_eq!(pok.cheat_name(0), Some("First"));
        assert_eq!(pok.cheat_name(1), Some("Second"));
        assert_eq!(pok.pokes_for_cheat(0).len(), 2);
        assert_eq!(pok.pokes_for_cheat(1)[0].value, 7);
        assert_eq!(pok.cheats()[1].pokes, 2..3);
        pok.input_poke_mut(1, 0).unwrap().value = 42;
        assert_eq!(pok.pokes()[2].value, 42);
        assert!(pok.input_poke_mut(1, 1).is_none());
        assert!(pok.input_poke_mut(0, 0).is_none());
        assert!(pok.pokes_for_cheat(5).is_empty());
    }

    #[test]
    fn pok_errors_work() {
        assert!(matches!(PokFile::parse(String::new()), Err(CheatError::NoCheats)));
        assert!(matches!(PokFile::parse("NNothing\nY\n".to_string()), Err(CheatError::NoCheats)));
        let data = b"N\xA9 1984\nZ 8 30000 0 0\nY\n";
        let pok = PokFile::read(&data[..]).unwrap();
        assert_eq!(pok.cheat_name(0), Some("\u{FFFD} 1984"));
    }
}
