/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! Serializing memory as base64 strings in human readable formats or as bytes in binary ones.
use core::fmt;
use std::borrow::Cow;
#[cfg(feature = "compression")] use compression::prelude::*;
#[cfg(feature = "compression")] use ::serde::ser;

use base64::{Engine as _, engine::general_purpose};
use ::serde::{
    Serializer, Deserialize, Deserializer,
    de::{self, Visitor}
};

pub fn serialize_mem<T, S>(mem: &T, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer,
          T: MemSerExt
{
    #[cfg(not(feature = "compression"))]
    {
        serialize_mem_slice(mem.as_slice(), serializer)
    }
    #[cfg(feature = "compression")]
    {
        let compr = mem.as_slice().iter().copied()
            .encode(&mut GZipEncoder::new(), Action::Finish)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ser::Error::custom)?;
        serialize_mem_slice(&compr, serializer)
    }
}

pub fn serialize_mem_slice<S>(slice: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer
{
    if serializer.is_human_readable() {
        serializer.serialize_str(&general_purpose::STANDARD.encode(slice))
    }
    else {
        serializer.serialize_bytes(slice)
    }
}

pub fn deserialize_mem<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where T: MemDeExt,
          D: Deserializer<'de>
{
    if deserializer.is_human_readable() {
        Deserialize::deserialize(deserializer).and_then(|string: Cow<str>|
            general_purpose::STANDARD.decode(&*string).map_err(de::Error::custom)
        )
        .and_then(T::try_from_byte_buf)
    }
    else {
        deserializer.deserialize_byte_buf(ByteBufVisitor)
                    .and_then(T::try_from_byte_buf)
    }
}

pub trait MemSerExt {
    fn as_slice(&self) -> &[u8];
}

pub trait MemDeExt: Sized {
    fn try_from_byte_buf<E: de::Error>(buf: Vec<u8>) -> Result<Self, E>;
}

impl MemSerExt for Box<[u8]> {
    fn as_slice(&self) -> &[u8] {
        &self[..]
    }
}

impl MemDeExt for Box<[u8]> {
    #[allow(unused_mut)]
    fn try_from_byte_buf<E: de::Error>(mut buf: Vec<u8>) -> Result<Self, E> {
        #[cfg(feature = "compression")]
        {
            if is_compressed(&buf) {
                buf = decompress(&buf)?;
            }
        }
        if buf.is_empty() || buf.len() % super::PAGE_SIZE != 0 {
            return Err(de::Error::custom(
                format!("failed to deserialize memory, a multiple of {} bytes required, received: {}",
                    super::PAGE_SIZE, buf.len())))
        }
        Ok(buf.into_boxed_slice())
    }
}

struct ByteBufVisitor;

impl<'de> Visitor<'de> for ByteBufVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a byte array")
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(Vec::from(v))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut buf = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element()? {
            buf.push(byte);
        }
        Ok(buf)
    }
}

#[cfg(feature = "compression")]
fn is_compressed(data: &[u8]) -> bool {
    matches!(data.get(0..3), Some(&[0x1f, 0x8b, 0x08]))
}

#[cfg(feature = "compression")]
fn decompress<E: de::Error>(data: &[u8]) -> Result<Vec<u8>, E> {
    data.iter().copied()
        .decode(&mut GZipDecoder::new())
        .collect::<Result<Vec<u8>, _>>()
        .map_err(de::Error::custom)
}
