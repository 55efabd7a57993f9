//! # MessagePack Codec - The At-Rest Encoding
//!
//! Every document stored through the write paths is exactly one MessagePack
//! value; reads decode from MessagePack before any projection. The format
//! was chosen because it is compact, distinguishes the full type palette
//! natively (signed/unsigned integers, floats, booleans, null, strings,
//! raw binary), and streams in linear time.
//!
//! ## Marker Map
//!
//! | Marker | Meaning |
//! |----------------|--------------------------------|
//! | `0x00..=0x7f`  | positive fixint                |
//! | `0x80..=0x8f`  | fixmap (N = low nibble)        |
//! | `0x90..=0x9f`  | fixarray                       |
//! | `0xa0..=0xbf`  | fixstr (len = low 5 bits)      |
//! | `0xc0`         | nil                            |
//! | `0xc2` / `0xc3`| false / true                   |
//! | `0xc4..=0xc6`  | bin 8/16/32                    |
//! | `0xca` / `0xcb`| float 32 / 64                  |
//! | `0xcc..=0xcf`  | uint 8/16/32/64                |
//! | `0xd0..=0xd3`  | int 8/16/32/64                 |
//! | `0xd9..=0xdb`  | str 8/16/32                    |
//! | `0xdc` / `0xdd`| array 16/32                    |
//! | `0xde` / `0xdf`| map 16/32                      |
//! | `0xe0..=0xff`  | negative fixint                |
//!
//! Ext families (`0xc7..=0xc9`, `0xd4..=0xd8`) and the reserved `0xc1` are
//! rejected: nothing in the store ever writes them, so meeting one means
//! the blob is not ours.
//!
//! ## Strictness
//!
//! Decoding is strict: trailing bytes, non-string map keys, truncated
//! payloads and over-deep nesting are all `Parse` errors. The encoder
//! always picks the smallest marker that fits the value; non-negative
//! signed integers share the unsigned markers, which `Doc`'s numeric
//! equality absorbs on the way back.

use eyre::{bail, ensure, Result};

use crate::codec::ByteSink;
use crate::config::MAX_DOCUMENT_DEPTH;
use crate::error::DocError;
use crate::memory::Arena;
use crate::types::{obj_upsert, Doc};

pub fn dump(doc: &Doc<'_>, sink: &mut dyn ByteSink) -> Result<()> {
    write_value(doc, sink, 0)
}

fn write_value(doc: &Doc<'_>, sink: &mut dyn ByteSink, depth: usize) -> Result<()> {
    ensure!(
        depth <= MAX_DOCUMENT_DEPTH,
        DocError::parse(format!(
            "document nesting exceeds {} levels",
            MAX_DOCUMENT_DEPTH
        ))
    );
    match doc {
        Doc::Null => sink.put(0xc0),
        Doc::Bool(false) => sink.put(0xc2),
        Doc::Bool(true) => sink.put(0xc3),
        Doc::Int(v) => write_int(*v, sink),
        Doc::Uint(v) => write_uint(*v, sink),
        Doc::Float(v) => {
            sink.put(0xcb);
            sink.put_slice(&v.to_be_bytes());
        }
        Doc::Str(s) => {
            write_str_header(s.len(), sink)?;
            sink.put_slice(s.as_bytes());
        }
        Doc::Bin(b) => {
            write_bin_header(b.len(), sink)?;
            sink.put_slice(b);
        }
        Doc::Arr(items) => {
            let n = items.len();
            if n <= 15 {
                sink.put(0x90 | n as u8);
            } else if n <= u16::MAX as usize {
                sink.put(0xdc);
                sink.put_slice(&(n as u16).to_be_bytes());
            } else {
                ensure!(n <= u32::MAX as usize, DocError::unsupported("array too long"));
                sink.put(0xdd);
                sink.put_slice(&(n as u32).to_be_bytes());
            }
            for item in items.iter() {
                write_value(item, sink, depth + 1)?;
            }
        }
        Doc::Obj(members) => {
            let n = members.len();
            if n <= 15 {
                sink.put(0x80 | n as u8);
            } else if n <= u16::MAX as usize {
                sink.put(0xde);
                sink.put_slice(&(n as u16).to_be_bytes());
            } else {
                ensure!(n <= u32::MAX as usize, DocError::unsupported("object too large"));
                sink.put(0xdf);
                sink.put_slice(&(n as u32).to_be_bytes());
            }
            for (name, value) in members.iter() {
                write_str_header(name.len(), sink)?;
                sink.put_slice(name.as_bytes());
                write_value(value, sink, depth + 1)?;
            }
        }
        Doc::Discarded => bail!(DocError::parse("cannot serialize a discarded document")),
    }
    Ok(())
}

fn write_int(v: i64, sink: &mut dyn ByteSink) {
    if v >= 0 {
        write_uint(v as u64, sink);
    } else if v >= -32 {
        sink.put(v as u8);
    } else if v >= i8::MIN as i64 {
        sink.put(0xd0);
        sink.put(v as i8 as u8);
    } else if v >= i16::MIN as i64 {
        sink.put(0xd1);
        sink.put_slice(&(v as i16).to_be_bytes());
    } else if v >= i32::MIN as i64 {
        sink.put(0xd2);
        sink.put_slice(&(v as i32).to_be_bytes());
    } else {
        sink.put(0xd3);
        sink.put_slice(&v.to_be_bytes());
    }
}

fn write_uint(v: u64, sink: &mut dyn ByteSink) {
    if v <= 0x7f {
        sink.put(v as u8);
    } else if v <= u8::MAX as u64 {
        sink.put(0xcc);
        sink.put(v as u8);
    } else if v <= u16::MAX as u64 {
        sink.put(0xcd);
        sink.put_slice(&(v as u16).to_be_bytes());
    } else if v <= u32::MAX as u64 {
        sink.put(0xce);
        sink.put_slice(&(v as u32).to_be_bytes());
    } else {
        sink.put(0xcf);
        sink.put_slice(&v.to_be_bytes());
    }
}

fn write_str_header(len: usize, sink: &mut dyn ByteSink) -> Result<()> {
    if len <= 31 {
        sink.put(0xa0 | len as u8);
    } else if len <= u8::MAX as usize {
        sink.put(0xd9);
        sink.put(len as u8);
    } else if len <= u16::MAX as usize {
        sink.put(0xda);
        sink.put_slice(&(len as u16).to_be_bytes());
    } else {
        ensure!(len <= u32::MAX as usize, DocError::unsupported("string too long"));
        sink.put(0xdb);
        sink.put_slice(&(len as u32).to_be_bytes());
    }
    Ok(())
}

fn write_bin_header(len: usize, sink: &mut dyn ByteSink) -> Result<()> {
    if len <= u8::MAX as usize {
        sink.put(0xc4);
        sink.put(len as u8);
    } else if len <= u16::MAX as usize {
        sink.put(0xc5);
        sink.put_slice(&(len as u16).to_be_bytes());
    } else {
        ensure!(len <= u32::MAX as usize, DocError::unsupported("binary too long"));
        sink.put(0xc6);
        sink.put_slice(&(len as u32).to_be_bytes());
    }
    Ok(())
}

pub fn parse<'a>(arena: &'a Arena, bytes: &[u8]) -> Result<Doc<'a>> {
    let mut reader = Reader::new(bytes);
    let doc = read_value(arena, &mut reader, 0)?;
    ensure!(
        reader.pos == bytes.len(),
        DocError::parse(format!(
            "trailing bytes after MessagePack document: consumed {} of {}",
            reader.pos,
            bytes.len()
        ))
    );
    Ok(doc)
}

pub(crate) struct Reader<'b> {
    pub(crate) input: &'b [u8],
    pub(crate) pos: usize,
}

impl<'b> Reader<'b> {
    pub(crate) fn new(input: &'b [u8]) -> Self {
        Self { input, pos: 0 }
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        ensure!(
            self.pos < self.input.len(),
            DocError::parse(format!("truncated input at byte {}", self.pos))
        );
        let b = self.input[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'b [u8]> {
        ensure!(
            self.input.len() - self.pos >= n,
            DocError::parse(format!(
                "truncated input: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.input.len() - self.pos
            ))
        );
        let slice = &self.input[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn be_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn be_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn be_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub(crate) fn be_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.be_u32()?))
    }

    pub(crate) fn be_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.be_u64()?))
    }
}

fn read_value<'a>(arena: &'a Arena, r: &mut Reader<'_>, depth: usize) -> Result<Doc<'a>> {
    ensure!(
        depth <= MAX_DOCUMENT_DEPTH,
        DocError::parse(format!(
            "document nesting exceeds {} levels",
            MAX_DOCUMENT_DEPTH
        ))
    );
    let marker = r.u8()?;
    match marker {
        0x00..=0x7f => Ok(Doc::Int(marker as i64)),
        0x80..=0x8f => read_map(arena, r, (marker & 0x0f) as usize, depth),
        0x90..=0x9f => read_array(arena, r, (marker & 0x0f) as usize, depth),
        0xa0..=0xbf => read_str(arena, r, (marker & 0x1f) as usize),
        0xc0 => Ok(Doc::Null),
        0xc2 => Ok(Doc::Bool(false)),
        0xc3 => Ok(Doc::Bool(true)),
        0xc4 => {
            let len = r.u8()? as usize;
            Ok(Doc::Bin(arena.alloc_bytes(r.take(len)?)))
        }
        0xc5 => {
            let len = r.be_u16()? as usize;
            Ok(Doc::Bin(arena.alloc_bytes(r.take(len)?)))
        }
        0xc6 => {
            let len = r.be_u32()? as usize;
            Ok(Doc::Bin(arena.alloc_bytes(r.take(len)?)))
        }
        0xca => Ok(Doc::Float(r.be_f32()? as f64)),
        0xcb => Ok(Doc::Float(r.be_f64()?)),
        0xcc => Ok(Doc::Int(r.u8()? as i64)),
        0xcd => Ok(Doc::Int(r.be_u16()? as i64)),
        0xce => Ok(Doc::Int(r.be_u32()? as i64)),
        0xcf => {
            let v = r.be_u64()?;
            if v <= i64::MAX as u64 {
                Ok(Doc::Int(v as i64))
            } else {
                Ok(Doc::Uint(v))
            }
        }
        0xd0 => Ok(Doc::Int(r.u8()? as i8 as i64)),
        0xd1 => Ok(Doc::Int(r.be_u16()? as i16 as i64)),
        0xd2 => Ok(Doc::Int(r.be_u32()? as i32 as i64)),
        0xd3 => Ok(Doc::Int(r.be_u64()? as i64)),
        0xd9 => {
            let len = r.u8()? as usize;
            read_str(arena, r, len)
        }
        0xda => {
            let len = r.be_u16()? as usize;
            read_str(arena, r, len)
        }
        0xdb => {
            let len = r.be_u32()? as usize;
            read_str(arena, r, len)
        }
        0xdc => {
            let n = r.be_u16()? as usize;
            read_array(arena, r, n, depth)
        }
        0xdd => {
            let n = r.be_u32()? as usize;
            read_array(arena, r, n, depth)
        }
        0xde => {
            let n = r.be_u16()? as usize;
            read_map(arena, r, n, depth)
        }
        0xdf => {
            let n = r.be_u32()? as usize;
            read_map(arena, r, n, depth)
        }
        0xe0..=0xff => Ok(Doc::Int(marker as i8 as i64)),
        0xc1 => bail!(DocError::parse("reserved MessagePack marker 0xc1")),
        0xc7..=0xc9 | 0xd4..=0xd8 => bail!(DocError::parse(format!(
            "unsupported MessagePack ext marker 0x{:02x}",
            marker
        ))),
    }
}

fn read_str<'a>(arena: &'a Arena, r: &mut Reader<'_>, len: usize) -> Result<Doc<'a>> {
    let bytes = r.take(len)?;
    let s = std::str::from_utf8(bytes)
        .map_err(|e| DocError::parse(format!("invalid UTF-8 in string: {}", e)))?;
    Ok(Doc::Str(arena.alloc_str(s)))
}

fn read_array<'a>(arena: &'a Arena, r: &mut Reader<'_>, n: usize, depth: usize) -> Result<Doc<'a>> {
    let mut items = bumpalo::collections::Vec::with_capacity_in(n.min(4096), arena.bump());
    for _ in 0..n {
        items.push(read_value(arena, r, depth + 1)?);
    }
    Ok(Doc::Arr(items))
}

fn read_map<'a>(arena: &'a Arena, r: &mut Reader<'_>, n: usize, depth: usize) -> Result<Doc<'a>> {
    let mut members = bumpalo::collections::Vec::with_capacity_in(n.min(4096), arena.bump());
    for _ in 0..n {
        let key = match read_value(arena, r, depth + 1)? {
            Doc::Str(s) => s,
            other => bail!(DocError::parse(format!(
                "map key must be a string, got {}",
                other.type_name()
            ))),
        };
        let value = read_value(arena, r, depth + 1)?;
        obj_upsert(&mut members, key, value);
    }
    Ok(Doc::Obj(members))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::json;
    use crate::error::ErrorKind;

    fn roundtrip<'a>(arena: &'a Arena, doc: &Doc<'a>) -> Doc<'a> {
        let mut out = Vec::new();
        dump(doc, &mut out).unwrap();
        parse(arena, &out).unwrap()
    }

    #[test]
    fn scalar_forms() {
        let arena = Arena::new();
        for v in [0i64, 1, 127, 128, 255, 256, 65535, 65536, i64::MAX, -1, -32, -33, -128, -129, i64::MIN] {
            assert_eq!(roundtrip(&arena, &Doc::Int(v)), Doc::Int(v), "value {}", v);
        }
        assert_eq!(roundtrip(&arena, &Doc::Uint(u64::MAX)), Doc::Uint(u64::MAX));
        assert_eq!(roundtrip(&arena, &Doc::Float(3.5)), Doc::Float(3.5));
        assert_eq!(roundtrip(&arena, &Doc::Bool(true)), Doc::Bool(true));
        assert_eq!(roundtrip(&arena, &Doc::Null), Doc::Null);
    }

    #[test]
    fn smallest_marker_is_used() {
        let mut out = Vec::new();
        dump(&Doc::Int(5), &mut out).unwrap();
        assert_eq!(out, [0x05]);

        out.clear();
        dump(&Doc::Int(-3), &mut out).unwrap();
        assert_eq!(out, [0xfd]);

        out.clear();
        dump(&Doc::Int(300), &mut out).unwrap();
        assert_eq!(out, [0xcd, 0x01, 0x2c]);
    }

    #[test]
    fn strings_and_binary() {
        let arena = Arena::new();
        let s = Doc::str_in(&arena, "hello métier");
        assert_eq!(roundtrip(&arena, &s), s);

        let long = "x".repeat(40);
        let s = Doc::str_in(&arena, &long);
        assert_eq!(roundtrip(&arena, &s), s);

        let b = Doc::bin_in(&arena, &[0u8, 255, 7, 0]);
        assert_eq!(roundtrip(&arena, &b), b);
    }

    #[test]
    fn containers() {
        let arena = Arena::new();
        let doc = json::parse(&arena, br#"{"a":[1,2.5,"s"],"b":{"c":null,"d":false}}"#).unwrap();
        assert_eq!(roundtrip(&arena, &doc), doc);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let arena = Arena::new();
        let err = parse(&arena, &[0xc0, 0x00]).unwrap_err();
        assert_eq!(DocError::kind_of(&err), Some(ErrorKind::Parse));
    }

    #[test]
    fn ext_markers_rejected() {
        let arena = Arena::new();
        assert!(parse(&arena, &[0xd4, 0x00, 0x00]).is_err());
        assert!(parse(&arena, &[0xc1]).is_err());
    }

    #[test]
    fn non_string_keys_rejected() {
        // fixmap{1: 2}
        let arena = Arena::new();
        assert!(parse(&arena, &[0x81, 0x01, 0x02]).is_err());
    }

    #[test]
    fn truncated_input_rejected() {
        let arena = Arena::new();
        assert!(parse(&arena, &[0xa5, b'a', b'b']).is_err());
        assert!(parse(&arena, &[0xcd, 0x01]).is_err());
        assert!(parse(&arena, &[]).is_err());
    }
}
