//! # BSON Codec
//!
//! BSON frames every document with its total byte size, which an
//! append-only sink cannot backpatch, so dumping runs in two passes: size
//! the tree, then stream it. Sizes of nested documents are recomputed on
//! the way down; document depth is capped, so the rework stays bounded.
//!
//! All integers and sizes are **little-endian** (unlike every other binary
//! codec here). Only object roots serialize - BSON has no standalone
//! scalars - and arrays are documents whose member names are the decimal
//! indices.
//!
//! Element types used:
//!
//! | Tag | Type | Maps to |
//! |------|--------------------|----------------------|
//! | 0x01 | double             | `Float`              |
//! | 0x02 | string             | `Str`                |
//! | 0x03 | embedded document  | `Obj`                |
//! | 0x04 | array              | `Arr`                |
//! | 0x05 | binary (subtype 0) | `Bin`                |
//! | 0x08 | boolean            | `Bool`               |
//! | 0x0A | null               | `Null`               |
//! | 0x10 | int32              | `Int`                |
//! | 0x11 | uint64 (timestamp) | `Uint` above i64     |
//! | 0x12 | int64              | `Int`                |
//!
//! Anything else in foreign input is a `Parse` error.

use eyre::{bail, ensure, Result};

use crate::codec::msgpack::Reader;
use crate::codec::ByteSink;
use crate::config::MAX_DOCUMENT_DEPTH;
use crate::error::DocError;
use crate::memory::Arena;
use crate::types::{obj_upsert, Doc};

pub fn dump(doc: &Doc<'_>, sink: &mut dyn ByteSink) -> Result<()> {
    let Doc::Obj(members) = doc else {
        bail!(DocError::unsupported(format!(
            "BSON requires an object root, got {}",
            doc.type_name()
        )));
    };
    let size = object_size(members, 0)?;
    write_object(members, size, sink, 0)
}

type Members<'a> = bumpalo::collections::Vec<'a, (&'a str, Doc<'a>)>;

fn check_name(name: &str) -> Result<()> {
    ensure!(
        !name.as_bytes().contains(&0),
        DocError::unsupported("BSON member names cannot contain NUL")
    );
    Ok(())
}

fn object_size(members: &Members<'_>, depth: usize) -> Result<u64> {
    ensure!(
        depth <= MAX_DOCUMENT_DEPTH,
        DocError::parse(format!(
            "document nesting exceeds {} levels",
            MAX_DOCUMENT_DEPTH
        ))
    );
    let mut size = 4 + 1; // length prefix + terminator
    for (name, value) in members.iter() {
        check_name(name)?;
        size += 1 + name.len() as u64 + 1 + value_size(value, depth)?;
    }
    ensure!(
        size <= i32::MAX as u64,
        DocError::unsupported("BSON document exceeds 2 GiB")
    );
    Ok(size)
}

fn array_size(items: &[Doc<'_>], depth: usize) -> Result<u64> {
    ensure!(
        depth <= MAX_DOCUMENT_DEPTH,
        DocError::parse(format!(
            "document nesting exceeds {} levels",
            MAX_DOCUMENT_DEPTH
        ))
    );
    let mut size = 4 + 1;
    for (index, value) in items.iter().enumerate() {
        size += 1 + decimal_digits(index) as u64 + 1 + value_size(value, depth)?;
    }
    ensure!(
        size <= i32::MAX as u64,
        DocError::unsupported("BSON document exceeds 2 GiB")
    );
    Ok(size)
}

fn value_size(doc: &Doc<'_>, depth: usize) -> Result<u64> {
    Ok(match doc {
        Doc::Null => 0,
        Doc::Bool(_) => 1,
        Doc::Int(v) => {
            if *v >= i32::MIN as i64 && *v <= i32::MAX as i64 {
                4
            } else {
                8
            }
        }
        Doc::Uint(v) => {
            if *v <= i32::MAX as u64 {
                4
            } else {
                8
            }
        }
        Doc::Float(_) => 8,
        Doc::Str(s) => 4 + s.len() as u64 + 1,
        Doc::Bin(b) => 4 + 1 + b.len() as u64,
        Doc::Arr(items) => array_size(items, depth + 1)?,
        Doc::Obj(members) => object_size(members, depth + 1)?,
        Doc::Discarded => bail!(DocError::parse("cannot serialize a discarded document")),
    })
}

fn decimal_digits(mut index: usize) -> usize {
    let mut digits = 1;
    while index >= 10 {
        index /= 10;
        digits += 1;
    }
    digits
}

fn element_tag(doc: &Doc<'_>) -> u8 {
    match doc {
        Doc::Null => 0x0a,
        Doc::Bool(_) => 0x08,
        Doc::Int(v) => {
            if *v >= i32::MIN as i64 && *v <= i32::MAX as i64 {
                0x10
            } else {
                0x12
            }
        }
        Doc::Uint(v) => {
            if *v <= i32::MAX as u64 {
                0x10
            } else if *v <= i64::MAX as u64 {
                0x12
            } else {
                0x11
            }
        }
        Doc::Float(_) => 0x01,
        Doc::Str(_) => 0x02,
        Doc::Bin(_) => 0x05,
        Doc::Arr(_) => 0x04,
        Doc::Obj(_) => 0x03,
        Doc::Discarded => 0x00,
    }
}

fn write_object(
    members: &Members<'_>,
    size: u64,
    sink: &mut dyn ByteSink,
    depth: usize,
) -> Result<()> {
    sink.put_slice(&(size as i32).to_le_bytes());
    for (name, value) in members.iter() {
        sink.put(element_tag(value));
        sink.put_slice(name.as_bytes());
        sink.put(0);
        write_value(value, sink, depth)?;
    }
    sink.put(0);
    Ok(())
}

fn write_value(doc: &Doc<'_>, sink: &mut dyn ByteSink, depth: usize) -> Result<()> {
    match doc {
        Doc::Null => {}
        Doc::Bool(b) => sink.put(*b as u8),
        Doc::Int(v) => {
            if *v >= i32::MIN as i64 && *v <= i32::MAX as i64 {
                sink.put_slice(&(*v as i32).to_le_bytes());
            } else {
                sink.put_slice(&v.to_le_bytes());
            }
        }
        Doc::Uint(v) => {
            if *v <= i32::MAX as u64 {
                sink.put_slice(&(*v as i32).to_le_bytes());
            } else {
                sink.put_slice(&v.to_le_bytes());
            }
        }
        Doc::Float(v) => sink.put_slice(&v.to_le_bytes()),
        Doc::Str(s) => {
            sink.put_slice(&(s.len() as i32 + 1).to_le_bytes());
            sink.put_slice(s.as_bytes());
            sink.put(0);
        }
        Doc::Bin(b) => {
            sink.put_slice(&(b.len() as i32).to_le_bytes());
            sink.put(0); // generic subtype
            sink.put_slice(b);
        }
        Doc::Arr(items) => {
            let size = array_size(items, depth + 1)?;
            sink.put_slice(&(size as i32).to_le_bytes());
            for (index, value) in items.iter().enumerate() {
                sink.put(element_tag(value));
                sink.put_slice(index.to_string().as_bytes());
                sink.put(0);
                write_value(value, sink, depth + 1)?;
            }
            sink.put(0);
        }
        Doc::Obj(members) => {
            let size = object_size(members, depth + 1)?;
            write_object(members, size, sink, depth + 1)?;
        }
        Doc::Discarded => bail!(DocError::parse("cannot serialize a discarded document")),
    }
    Ok(())
}

pub fn parse<'a>(arena: &'a Arena, bytes: &[u8]) -> Result<Doc<'a>> {
    let mut reader = Reader::new(bytes);
    let doc = read_document(arena, &mut reader, 0, false)?;
    ensure!(
        reader.pos == bytes.len(),
        DocError::parse(format!(
            "trailing bytes after BSON document: consumed {} of {}",
            reader.pos,
            bytes.len()
        ))
    );
    Ok(doc)
}

fn le_i32(r: &mut Reader<'_>) -> Result<i32> {
    let b = r.take(4)?;
    Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn le_i64(r: &mut Reader<'_>) -> Result<i64> {
    let b = r.take(8)?;
    Ok(i64::from_le_bytes([
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ]))
}

fn cstring<'b>(r: &mut Reader<'b>) -> Result<&'b [u8]> {
    let start = r.pos;
    loop {
        let b = r.u8()?;
        if b == 0 {
            return Ok(&r.input[start..r.pos - 1]);
        }
    }
}

fn read_document<'a>(
    arena: &'a Arena,
    r: &mut Reader<'_>,
    depth: usize,
    as_array: bool,
) -> Result<Doc<'a>> {
    ensure!(
        depth <= MAX_DOCUMENT_DEPTH,
        DocError::parse(format!(
            "document nesting exceeds {} levels",
            MAX_DOCUMENT_DEPTH
        ))
    );
    let start = r.pos;
    let size = le_i32(r)?;
    ensure!(size >= 5, DocError::parse("BSON document shorter than 5 bytes"));

    let mut members = bumpalo::collections::Vec::new_in(arena.bump());
    let mut items = bumpalo::collections::Vec::new_in(arena.bump());

    loop {
        let tag = r.u8()?;
        if tag == 0 {
            break;
        }
        let name = cstring(r)?;
        let value = read_element(arena, r, tag, depth)?;
        if as_array {
            // index keys are re-derived from position, the names are noise
            items.push(value);
        } else {
            let name = std::str::from_utf8(name)
                .map_err(|e| DocError::parse(format!("invalid UTF-8 in member name: {}", e)))?;
            obj_upsert(&mut members, arena.alloc_str(name), value);
        }
    }

    ensure!(
        r.pos - start == size as usize,
        DocError::parse(format!(
            "BSON document size mismatch: header says {}, read {}",
            size,
            r.pos - start
        ))
    );

    if as_array {
        Ok(Doc::Arr(items))
    } else {
        Ok(Doc::Obj(members))
    }
}

fn read_element<'a>(arena: &'a Arena, r: &mut Reader<'_>, tag: u8, depth: usize) -> Result<Doc<'a>> {
    match tag {
        0x01 => {
            let b = r.take(8)?;
            Ok(Doc::Float(f64::from_le_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ])))
        }
        0x02 => {
            let len = le_i32(r)?;
            ensure!(len >= 1, DocError::parse("BSON string length must be >= 1"));
            let bytes = r.take(len as usize)?;
            ensure!(
                bytes[len as usize - 1] == 0,
                DocError::parse("BSON string missing NUL terminator")
            );
            let s = std::str::from_utf8(&bytes[..len as usize - 1])
                .map_err(|e| DocError::parse(format!("invalid UTF-8 in string: {}", e)))?;
            Ok(Doc::Str(arena.alloc_str(s)))
        }
        0x03 => read_document(arena, r, depth + 1, false),
        0x04 => read_document(arena, r, depth + 1, true),
        0x05 => {
            let len = le_i32(r)?;
            ensure!(len >= 0, DocError::parse("negative BSON binary length"));
            let _subtype = r.u8()?;
            Ok(Doc::Bin(arena.alloc_bytes(r.take(len as usize)?)))
        }
        0x08 => match r.u8()? {
            0 => Ok(Doc::Bool(false)),
            1 => Ok(Doc::Bool(true)),
            other => bail!(DocError::parse(format!("invalid BSON boolean {}", other))),
        },
        0x0a => Ok(Doc::Null),
        0x10 => Ok(Doc::Int(le_i32(r)? as i64)),
        0x11 => {
            let v = r.take(8)?;
            let v = u64::from_le_bytes([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]]);
            if v <= i64::MAX as u64 {
                Ok(Doc::Int(v as i64))
            } else {
                Ok(Doc::Uint(v))
            }
        }
        0x12 => Ok(Doc::Int(le_i64(r)?)),
        other => bail!(DocError::parse(format!(
            "unsupported BSON element type 0x{:02x}",
            other
        ))),
    }
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
    fn object_round_trip() {
        let arena = Arena::new();
        let doc = json::parse(
            &arena,
            br#"{"a":1,"big":9999999999,"f":2.5,"s":"text","t":true,"z":null}"#,
        )
        .unwrap();
        assert_eq!(roundtrip(&arena, &doc), doc);
    }

    #[test]
    fn nested_and_arrays() {
        let arena = Arena::new();
        let doc = json::parse(&arena, br#"{"arr":[1,"two",{"three":3}],"obj":{"x":{}}}"#).unwrap();
        assert_eq!(roundtrip(&arena, &doc), doc);
    }

    #[test]
    fn binary_payload() {
        let arena = Arena::new();
        let mut doc = Doc::object_in(&arena);
        if let Doc::Obj(members) = &mut doc {
            obj_upsert(members, arena.alloc_str("blob"), Doc::bin_in(&arena, &[0, 1, 254]));
        }
        assert_eq!(roundtrip(&arena, &doc), doc);
    }

    #[test]
    fn scalar_root_is_unsupported() {
        let mut out = Vec::new();
        let err = dump(&Doc::Int(1), &mut out).unwrap_err();
        assert_eq!(DocError::kind_of(&err), Some(ErrorKind::UnsupportedFormat));
        assert!(out.is_empty());
    }

    #[test]
    fn empty_document() {
        let arena = Arena::new();
        let doc = json::parse(&arena, b"{}").unwrap();
        let mut out = Vec::new();
        dump(&doc, &mut out).unwrap();
        assert_eq!(out, [5, 0, 0, 0, 0]);
        assert_eq!(parse(&arena, &out).unwrap(), doc);
    }

    #[test]
    fn size_mismatch_rejected() {
        let arena = Arena::new();
        // valid empty doc with an inflated header
        let err = parse(&arena, &[6, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(DocError::kind_of(&err), Some(ErrorKind::Parse));
    }
}
