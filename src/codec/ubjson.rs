//! # UBJSON Codec
//!
//! Universal Binary JSON (draft 12). The encoder emits count-optimized
//! containers (`[#` / `{#`), picking the smallest integer marker for every
//! number; the decoder also accepts plain (terminator-delimited) and
//! type-optimized (`$`) containers plus `N` no-op padding, so foreign
//! blobs load.
//!
//! ## Value markers
//!
//! `Z` null, `T`/`F` booleans, `i`/`U`/`I`/`l`/`L` integers (i8, u8, i16,
//! i32, i64, big-endian), `d`/`D` floats, `C` one ASCII char, `S` string
//! (length-prefixed). `H` (high-precision number) has no document mapping
//! and is rejected.
//!
//! ## Binary
//!
//! UBJSON has no binary type; binary leaves use the strongly-typed uint8
//! array `[$U#<len>` with the payload bytes packed raw, which is also what
//! the draft recommends. On decode that exact shape is mapped back to a
//! binary leaf, keeping the codec lossless for `Bin` - the encoder never
//! produces `$U` for real arrays, so the mapping cannot misfire on our own
//! output.

use eyre::{bail, ensure, Result};

use crate::codec::msgpack::Reader;
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
        Doc::Null => sink.put(b'Z'),
        Doc::Bool(true) => sink.put(b'T'),
        Doc::Bool(false) => sink.put(b'F'),
        Doc::Int(v) => write_int(*v, sink),
        Doc::Uint(v) => {
            ensure!(
                *v <= i64::MAX as u64,
                DocError::unsupported(format!(
                    "UBJSON cannot represent unsigned value {} above i64::MAX",
                    v
                ))
            );
            write_int(*v as i64, sink);
        }
        Doc::Float(v) => {
            sink.put(b'D');
            sink.put_slice(&v.to_be_bytes());
        }
        Doc::Str(s) => {
            sink.put(b'S');
            write_int(s.len() as i64, sink);
            sink.put_slice(s.as_bytes());
        }
        Doc::Bin(b) => {
            sink.put_slice(b"[$U#");
            write_int(b.len() as i64, sink);
            sink.put_slice(b);
        }
        Doc::Arr(items) => {
            sink.put_slice(b"[#");
            write_int(items.len() as i64, sink);
            for item in items.iter() {
                write_value(item, sink, depth + 1)?;
            }
        }
        Doc::Obj(members) => {
            sink.put_slice(b"{#");
            write_int(members.len() as i64, sink);
            for (name, value) in members.iter() {
                write_int(name.len() as i64, sink);
                sink.put_slice(name.as_bytes());
                write_value(value, sink, depth + 1)?;
            }
        }
        Doc::Discarded => bail!(DocError::parse("cannot serialize a discarded document")),
    }
    Ok(())
}

fn write_int(v: i64, sink: &mut dyn ByteSink) {
    if v >= i8::MIN as i64 && v <= i8::MAX as i64 {
        sink.put(b'i');
        sink.put(v as i8 as u8);
    } else if v >= 0 && v <= u8::MAX as i64 {
        sink.put(b'U');
        sink.put(v as u8);
    } else if v >= i16::MIN as i64 && v <= i16::MAX as i64 {
        sink.put(b'I');
        sink.put_slice(&(v as i16).to_be_bytes());
    } else if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
        sink.put(b'l');
        sink.put_slice(&(v as i32).to_be_bytes());
    } else {
        sink.put(b'L');
        sink.put_slice(&v.to_be_bytes());
    }
}

pub fn parse<'a>(arena: &'a Arena, bytes: &[u8]) -> Result<Doc<'a>> {
    let mut reader = Reader::new(bytes);
    let marker = reader.u8()?;
    let doc = read_value(arena, &mut reader, marker, 0)?;
    ensure!(
        reader.pos == bytes.len(),
        DocError::parse(format!(
            "trailing bytes after UBJSON document: consumed {} of {}",
            reader.pos,
            bytes.len()
        ))
    );
    Ok(doc)
}

fn read_value<'a>(arena: &'a Arena, r: &mut Reader<'_>, marker: u8, depth: usize) -> Result<Doc<'a>> {
    ensure!(
        depth <= MAX_DOCUMENT_DEPTH,
        DocError::parse(format!(
            "document nesting exceeds {} levels",
            MAX_DOCUMENT_DEPTH
        ))
    );
    match marker {
        b'Z' => Ok(Doc::Null),
        b'T' => Ok(Doc::Bool(true)),
        b'F' => Ok(Doc::Bool(false)),
        b'i' => Ok(Doc::Int(r.u8()? as i8 as i64)),
        b'U' => Ok(Doc::Int(r.u8()? as i64)),
        b'I' => Ok(Doc::Int(r.be_u16()? as i16 as i64)),
        b'l' => Ok(Doc::Int(r.be_u32()? as i32 as i64)),
        b'L' => Ok(Doc::Int(r.be_u64()? as i64)),
        b'd' => Ok(Doc::Float(r.be_f32()? as f64)),
        b'D' => Ok(Doc::Float(r.be_f64()?)),
        b'C' => {
            let c = r.u8()?;
            ensure!(c <= 0x7f, DocError::parse("UBJSON char above ASCII range"));
            let mut buf = [0u8; 4];
            let s = (c as char).encode_utf8(&mut buf);
            Ok(Doc::Str(arena.alloc_str(s)))
        }
        b'S' => {
            let len = read_length(r)?;
            let bytes = r.take(len)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|e| DocError::parse(format!("invalid UTF-8 in string: {}", e)))?;
            Ok(Doc::Str(arena.alloc_str(s)))
        }
        b'H' => bail!(DocError::parse(
            "UBJSON high-precision numbers have no document mapping"
        )),
        b'[' => read_array(arena, r, depth),
        b'{' => read_object(arena, r, depth),
        other => bail!(DocError::parse(format!(
            "unexpected UBJSON marker '{}' (0x{:02x})",
            other as char, other
        ))),
    }
}

fn read_length(r: &mut Reader<'_>) -> Result<usize> {
    let marker = r.u8()?;
    let v = match marker {
        b'i' => r.u8()? as i8 as i64,
        b'U' => r.u8()? as i64,
        b'I' => r.be_u16()? as i16 as i64,
        b'l' => r.be_u32()? as i32 as i64,
        b'L' => r.be_u64()? as i64,
        other => bail!(DocError::parse(format!(
            "expected integer length marker, got '{}'",
            other as char
        ))),
    };
    ensure!(v >= 0, DocError::parse("negative UBJSON length"));
    Ok(v as usize)
}

// Optional container header: `$<type>` and/or `#<count>`. A `$` without a
// following `#` is malformed per the draft.
fn read_container_header(r: &mut Reader<'_>) -> Result<(Option<u8>, Option<usize>)> {
    let mut elem_type = None;
    let mut count = None;
    if r.peek() == Some(b'$') {
        r.u8()?;
        elem_type = Some(r.u8()?);
        ensure!(
            r.peek() == Some(b'#'),
            DocError::parse("UBJSON '$' type annotation requires a '#' count")
        );
    }
    if r.peek() == Some(b'#') {
        r.u8()?;
        count = Some(read_length(r)?);
    }
    Ok((elem_type, count))
}

fn read_array<'a>(arena: &'a Arena, r: &mut Reader<'_>, depth: usize) -> Result<Doc<'a>> {
    let (elem_type, count) = read_container_header(r)?;

    // strongly-typed uint8 array is the binary representation
    if let (Some(b'U'), Some(n)) = (elem_type, count) {
        return Ok(Doc::Bin(arena.alloc_bytes(r.take(n)?)));
    }

    let mut items = bumpalo::collections::Vec::new_in(arena.bump());
    match count {
        Some(n) => {
            for _ in 0..n {
                let marker = match elem_type {
                    Some(t) => t,
                    None => r.u8()?,
                };
                items.push(read_value(arena, r, marker, depth + 1)?);
            }
        }
        None => loop {
            let marker = r.u8()?;
            match marker {
                b']' => break,
                b'N' => continue,
                _ => items.push(read_value(arena, r, marker, depth + 1)?),
            }
        },
    }
    Ok(Doc::Arr(items))
}

fn read_object<'a>(arena: &'a Arena, r: &mut Reader<'_>, depth: usize) -> Result<Doc<'a>> {
    let (elem_type, count) = read_container_header(r)?;
    let mut members = bumpalo::collections::Vec::new_in(arena.bump());

    let read_member = |r: &mut Reader<'_>,
                           members: &mut bumpalo::collections::Vec<'a, (&'a str, Doc<'a>)>,
                           first: u8|
     -> Result<()> {
        // keys are length-prefixed without an 'S' marker; `first` is the
        // first byte of the length
        let len = match first {
            b'i' => {
                let v = r.u8()? as i8 as i64;
                ensure!(v >= 0, DocError::parse("negative UBJSON length"));
                v as usize
            }
            b'U' => r.u8()? as usize,
            b'I' => {
                let v = r.be_u16()? as i16 as i64;
                ensure!(v >= 0, DocError::parse("negative UBJSON length"));
                v as usize
            }
            b'l' => {
                let v = r.be_u32()? as i32 as i64;
                ensure!(v >= 0, DocError::parse("negative UBJSON length"));
                v as usize
            }
            b'L' => {
                let v = r.be_u64()? as i64;
                ensure!(v >= 0, DocError::parse("negative UBJSON length"));
                v as usize
            }
            other => bail!(DocError::parse(format!(
                "expected integer length marker for object key, got '{}'",
                other as char
            ))),
        };
        let key = r.take(len)?;
        let key = std::str::from_utf8(key)
            .map_err(|e| DocError::parse(format!("invalid UTF-8 in member name: {}", e)))?;
        let marker = match elem_type {
            Some(t) => t,
            None => r.u8()?,
        };
        let value = read_value(arena, r, marker, depth + 1)?;
        obj_upsert(members, arena.alloc_str(key), value);
        Ok(())
    };

    match count {
        Some(n) => {
            for _ in 0..n {
                let first = r.u8()?;
                read_member(r, &mut members, first)?;
            }
        }
        None => loop {
            let first = r.u8()?;
            match first {
                b'}' => break,
                b'N' => continue,
                _ => read_member(r, &mut members, first)?,
            }
        },
    }
    Ok(Doc::Obj(members))
}
