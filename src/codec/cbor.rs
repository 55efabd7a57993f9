//! # CBOR Codec
//!
//! RFC 8949 subset. The encoder always emits definite lengths with the
//! smallest head that fits; the decoder additionally accepts indefinite
//! strings, arrays and maps (chunked until the `0xff` break) and all three
//! float widths, so blobs produced by other writers still load.
//!
//! Head layout: the initial byte packs a 3-bit major type and a 5-bit
//! additional-info field (`0..24` inline value, `24..28` = 1/2/4/8 payload
//! bytes, `31` = indefinite).
//!
//! Tags (major 6) and `undefined` are rejected rather than silently
//! dropped: a stored document never contains them, and guessing at their
//! meaning on foreign input would be lossy.

use eyre::{bail, ensure, Result};
use half::f16;

use crate::codec::msgpack::Reader;
use crate::codec::ByteSink;
use crate::config::MAX_DOCUMENT_DEPTH;
use crate::error::DocError;
use crate::memory::Arena;
use crate::types::{obj_upsert, Doc};

const BREAK: u8 = 0xff;

pub fn dump(doc: &Doc<'_>, sink: &mut dyn ByteSink) -> Result<()> {
    write_value(doc, sink, 0)
}

fn write_head(major: u8, value: u64, sink: &mut dyn ByteSink) {
    let m = major << 5;
    if value < 24 {
        sink.put(m | value as u8);
    } else if value <= u8::MAX as u64 {
        sink.put(m | 24);
        sink.put(value as u8);
    } else if value <= u16::MAX as u64 {
        sink.put(m | 25);
        sink.put_slice(&(value as u16).to_be_bytes());
    } else if value <= u32::MAX as u64 {
        sink.put(m | 26);
        sink.put_slice(&(value as u32).to_be_bytes());
    } else {
        sink.put(m | 27);
        sink.put_slice(&value.to_be_bytes());
    }
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
        Doc::Null => sink.put(0xf6),
        Doc::Bool(false) => sink.put(0xf4),
        Doc::Bool(true) => sink.put(0xf5),
        Doc::Int(v) => {
            if *v >= 0 {
                write_head(0, *v as u64, sink);
            } else {
                write_head(1, !*v as u64, sink);
            }
        }
        Doc::Uint(v) => write_head(0, *v, sink),
        Doc::Float(v) => {
            sink.put(0xfb);
            sink.put_slice(&v.to_be_bytes());
        }
        Doc::Str(s) => {
            write_head(3, s.len() as u64, sink);
            sink.put_slice(s.as_bytes());
        }
        Doc::Bin(b) => {
            write_head(2, b.len() as u64, sink);
            sink.put_slice(b);
        }
        Doc::Arr(items) => {
            write_head(4, items.len() as u64, sink);
            for item in items.iter() {
                write_value(item, sink, depth + 1)?;
            }
        }
        Doc::Obj(members) => {
            write_head(5, members.len() as u64, sink);
            for (name, value) in members.iter() {
                write_head(3, name.len() as u64, sink);
                sink.put_slice(name.as_bytes());
                write_value(value, sink, depth + 1)?;
            }
        }
        Doc::Discarded => bail!(DocError::parse("cannot serialize a discarded document")),
    }
    Ok(())
}

pub fn parse<'a>(arena: &'a Arena, bytes: &[u8]) -> Result<Doc<'a>> {
    let mut reader = Reader::new(bytes);
    let doc = read_value(arena, &mut reader, 0)?;
    ensure!(
        reader.pos == bytes.len(),
        DocError::parse(format!(
            "trailing bytes after CBOR document: consumed {} of {}",
            reader.pos,
            bytes.len()
        ))
    );
    Ok(doc)
}

fn read_arg(r: &mut Reader<'_>, info: u8) -> Result<u64> {
    match info {
        0..=23 => Ok(info as u64),
        24 => Ok(r.u8()? as u64),
        25 => Ok(r.be_u16()? as u64),
        26 => Ok(r.be_u32()? as u64),
        27 => r.be_u64(),
        _ => bail!(DocError::parse(format!(
            "invalid CBOR additional info {}",
            info
        ))),
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
    let initial = r.u8()?;
    let major = initial >> 5;
    let info = initial & 0x1f;

    match major {
        0 => {
            let v = read_arg(r, info)?;
            if v <= i64::MAX as u64 {
                Ok(Doc::Int(v as i64))
            } else {
                Ok(Doc::Uint(v))
            }
        }
        1 => {
            let m = read_arg(r, info)?;
            ensure!(
                m <= i64::MAX as u64,
                DocError::parse("CBOR negative integer below i64::MIN")
            );
            Ok(Doc::Int(-1 - m as i64))
        }
        2 => {
            let bytes = read_chunked(r, info, 2)?;
            Ok(Doc::Bin(arena.bump().alloc_slice_copy(&bytes)))
        }
        3 => {
            let bytes = read_chunked(r, info, 3)?;
            let s = std::str::from_utf8(&bytes)
                .map_err(|e| DocError::parse(format!("invalid UTF-8 in text string: {}", e)))?;
            Ok(Doc::Str(arena.alloc_str(s)))
        }
        4 => {
            let mut items = bumpalo::collections::Vec::new_in(arena.bump());
            if info == 31 {
                while r.peek() != Some(BREAK) {
                    items.push(read_value(arena, r, depth + 1)?);
                }
                r.u8()?;
            } else {
                let n = read_arg(r, info)?;
                for _ in 0..n {
                    items.push(read_value(arena, r, depth + 1)?);
                }
            }
            Ok(Doc::Arr(items))
        }
        5 => {
            let mut members = bumpalo::collections::Vec::new_in(arena.bump());
            if info == 31 {
                while r.peek() != Some(BREAK) {
                    read_member(arena, r, &mut members, depth)?;
                }
                r.u8()?;
            } else {
                let n = read_arg(r, info)?;
                for _ in 0..n {
                    read_member(arena, r, &mut members, depth)?;
                }
            }
            Ok(Doc::Obj(members))
        }
        6 => bail!(DocError::parse("CBOR tags are not supported")),
        7 => match info {
            20 => Ok(Doc::Bool(false)),
            21 => Ok(Doc::Bool(true)),
            22 => Ok(Doc::Null),
            23 => bail!(DocError::parse("CBOR 'undefined' has no document mapping")),
            25 => Ok(Doc::Float(f16::from_bits(r.be_u16()?).to_f64())),
            26 => Ok(Doc::Float(r.be_f32()? as f64)),
            27 => Ok(Doc::Float(r.be_f64()?)),
            31 => bail!(DocError::parse("unexpected CBOR break")),
            other => bail!(DocError::parse(format!(
                "unsupported CBOR simple value {}",
                other
            ))),
        },
        _ => unreachable!("3-bit major type"),
    }
}

fn read_member<'a>(
    arena: &'a Arena,
    r: &mut Reader<'_>,
    members: &mut bumpalo::collections::Vec<'a, (&'a str, Doc<'a>)>,
    depth: usize,
) -> Result<()> {
    let key = match read_value(arena, r, depth + 1)? {
        Doc::Str(s) => s,
        other => bail!(DocError::parse(format!(
            "map key must be a text string, got {}",
            other.type_name()
        ))),
    };
    let value = read_value(arena, r, depth + 1)?;
    obj_upsert(members, key, value);
    Ok(())
}

// Definite strings come back as one borrowed chunk; indefinite ones are the
// concatenation of definite chunks of the same major type (RFC 8949 §3.2.3).
fn read_chunked(r: &mut Reader<'_>, info: u8, major: u8) -> Result<Vec<u8>> {
    if info != 31 {
        let len = read_arg(r, info)? as usize;
        return Ok(r.take(len)?.to_vec());
    }
    let mut out = Vec::new();
    loop {
        let initial = r.u8()?;
        if initial == BREAK {
            return Ok(out);
        }
        ensure!(
            initial >> 5 == major && initial & 0x1f != 31,
            DocError::parse("indefinite string chunk of mismatched type")
        );
        let len = read_arg(r, initial & 0x1f)? as usize;
        out.extend_from_slice(r.take(len)?);
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
    fn integer_boundaries() {
        let arena = Arena::new();
        for v in [0i64, 23, 24, 255, 256, 65535, 65536, i64::MAX, -1, -24, -25, -256, i64::MIN] {
            assert_eq!(roundtrip(&arena, &Doc::Int(v)), Doc::Int(v), "value {}", v);
        }
        assert_eq!(roundtrip(&arena, &Doc::Uint(u64::MAX)), Doc::Uint(u64::MAX));
    }

    #[test]
    fn document_round_trip() {
        let arena = Arena::new();
        let doc = json::parse(&arena, br#"{"k":[1,-2,3.5,"s",true,null],"m":{"n":{}}}"#).unwrap();
        assert_eq!(roundtrip(&arena, &doc), doc);
        let bin = Doc::bin_in(&arena, &[1, 2, 3]);
        assert_eq!(roundtrip(&arena, &bin), bin);
    }

    #[test]
    fn decodes_half_floats() {
        // 0xf9 0x3c00 = 1.0 as binary16
        let arena = Arena::new();
        assert_eq!(parse(&arena, &[0xf9, 0x3c, 0x00]).unwrap(), Doc::Float(1.0));
    }

    #[test]
    fn decodes_indefinite_containers() {
        let arena = Arena::new();
        // [_ 1, 2] == 0x9f 0x01 0x02 0xff
        let doc = parse(&arena, &[0x9f, 0x01, 0x02, 0xff]).unwrap();
        let expected = json::parse(&arena, b"[1,2]").unwrap();
        assert_eq!(doc, expected);

        // {_ "a": 1} == 0xbf 0x61 'a' 0x01 0xff
        let doc = parse(&arena, &[0xbf, 0x61, b'a', 0x01, 0xff]).unwrap();
        assert_eq!(doc.member("a"), Some(&Doc::Int(1)));

        // (_ "ab" "c") text == 0x7f 0x62 'a' 'b' 0x61 'c' 0xff
        let doc = parse(&arena, &[0x7f, 0x62, b'a', b'b', 0x61, b'c', 0xff]).unwrap();
        assert_eq!(doc, Doc::Str("abc"));
    }

    #[test]
    fn tags_rejected() {
        let arena = Arena::new();
        // 0xc0 = tag(0) datetime
        let err = parse(&arena, &[0xc0, 0x61, b'x']).unwrap_err();
        assert_eq!(DocError::kind_of(&err), Some(ErrorKind::Parse));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let arena = Arena::new();
        assert!(parse(&arena, &[0xf6, 0x00]).is_err());
    }
}
