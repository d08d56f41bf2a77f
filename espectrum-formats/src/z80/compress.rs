/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
use std::io::{Write, Result};

/// Compresses `data` with the **Z80** run-length encoding and writes it to `wr`.
///
/// * A run of more than 4 identical bytes, or of at least 2 `0xED` bytes becomes `ED ED n b`.
/// * A single `0xED` is followed by the next byte written verbatim, even if it starts a run.
pub fn compress_write_all<W: Write>(data: &[u8], mut wr: W) -> Result<()> {
    let mut index = 0;
    while let Some(&byte) = data.get(index) {
        let count = data[index..].iter()
                    .take(u8::max_value() as usize)
                    .take_while(|&&b| b == byte)
                    .count();
        if count > 4 || (byte == 0xED && count > 1) {
            wr.write_all(&[0xED, 0xED, count as u8, byte])?;
            index += count;
        }
        else if byte == 0xED {
            let end = data.len().min(index + 2);
            wr.write_all(&data[index..end])?;
            index = end;
        }
        else {
            wr.write_all(&data[index..index + count])?;
            index += count;
        }
    }
    Ok(())
}

/// Returns the length of `data` after compression.
pub fn compressed_len(data: &[u8]) -> usize {
    struct Counter(usize);
    impl Write for Counter {
        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            self.0 += buf.len();
            Ok(buf.len())
        }
        fn flush(&mut self) -> Result<()> { Ok(()) }
    }
    let mut counter = Counter(0);
    match compress_write_all(data, &mut counter) {
        Ok(()) => counter.0,
        Err(_) => usize::max_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_works() {
        let mut buf = Vec::new();
        compress_write_all(&[], &mut buf).unwrap();
        assert!(buf.is_empty());
        buf.clear();
        compress_write_all(&[42], &mut buf).unwrap();
        assert_eq!(&[42], &buf[..]);
        buf.clear();
        compress_write_all(&[0xED], &mut buf).unwrap();
        assert_eq!(&[0xED], &buf[..]);
        buf.clear();
        compress_write_all(&[1,2,3,42,77], &mut buf).unwrap();
        assert_eq!(&[1,2,3,42,77], &buf[..]);
        buf.clear();
        compress_write_all(&[7,7,7,7], &mut buf).unwrap();
        assert_eq!(&[7,7,7,7], &buf[..]);
        buf.clear();
        compress_write_all(&[7,7,7,7,7], &mut buf).unwrap();
        assert_eq!(&[0xED,0xED,5,7], &buf[..]);
        buf.clear();
        compress_write_all(&[0xED,0xED], &mut buf).unwrap();
        assert_eq!(&[0xED,0xED,2,0xED], &buf[..]);
        buf.clear();
        compress_write_all(&[69,0xED,0xED], &mut buf).unwrap();
        assert_eq!(&[69,0xED,0xED,2,0xED], &buf[..]);
        buf.clear();
        compress_write_all(&[0xED,69,0xED], &mut buf).unwrap();
        assert_eq!(&[0xED,69,0xED], &buf[..]);
        buf.clear();
        compress_write_all(&[0xED,0,0,0,0,0,0], &mut buf).unwrap();
        assert_eq!(&[0xED,0,0xED,0xED,5,0], &buf[..]);
        buf.clear();
        compress_write_all(&[0;255], &mut buf).unwrap();
        assert_eq!(&[0xED,0xED,255,0], &buf[..]);
        buf.clear();
        compress_write_all(&[69;1000], &mut buf).unwrap();
        assert_eq!(&[0xED,0xED,255,69,0xED,0xED,255,69,0xED,0xED,255,69,0xED,0xED,235,69], &buf[..]);
        buf.clear();
        compress_write_all(&[1,1,1,1,1,2,2,2,2], &mut buf).unwrap();
        assert_eq!(&[0xED,0xED,5,1,2,2,2,2], &buf[..]);
        buf.clear();
        compress_write_all(&[1,2,2,3,3,3,4,4,4,5,5,5,5,5,6,6,6,6,6,6], &mut buf).unwrap();
        assert_eq!(&[1,2,2,3,3,3,4,4,4,0xED,0xED,5,5,0xED,0xED,6,6], &buf[..]);
        assert_eq!(compressed_len(&[1,2,2,3,3,3,4,4,4,5,5,5,5,5,6,6,6,6,6,6]), 17);
    }
}
