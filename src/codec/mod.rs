//! # Document Codecs
//!
//! One parse and one dump entry point over every supported wire format:
//!
//! ```text
//!            parse_any                     dump_any
//! bytes ───────────────> Doc<'arena> ───────────────> ByteSink
//!
//! formats: msgpack (internal) | json | bson | cbor | ubjson | raw
//! ```
//!
//! Each codec is implemented in-tree against the same marker-dispatched
//! reader/incremental writer shape; none of them buffers the whole output.
//! MessagePack is the at-rest encoding: every value stored through the write
//! paths is exactly one MessagePack document.
//!
//! ## Sinks
//!
//! Serializers write through [`ByteSink`], a two-method append interface.
//! [`Tape`](crate::memory::Tape) implements it, so batched reads serialize
//! straight into the output tape; `Vec<u8>` implements it for standalone
//! use.

pub mod bson;
pub mod cbor;
pub mod json;
pub mod msgpack;
pub mod ubjson;

use eyre::{bail, Result};

use crate::error::DocError;
use crate::memory::{Arena, Tape};
use crate::types::{Doc, Format};

/// Incremental byte output: append one byte or a span. Implementations are
/// infallible; resource limits are enforced by the owner of the buffer.
pub trait ByteSink {
    fn put(&mut self, byte: u8);
    fn put_slice(&mut self, bytes: &[u8]);
}

impl ByteSink for Vec<u8> {
    fn put(&mut self, byte: u8) {
        self.push(byte);
    }

    fn put_slice(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

impl<'a> ByteSink for Tape<'a> {
    fn put(&mut self, byte: u8) {
        Tape::put(self, byte);
    }

    fn put_slice(&mut self, bytes: &[u8]) {
        Tape::put_slice(self, bytes);
    }
}

/// Decodes `bytes` in the given format into an arena-backed document.
///
/// `JsonPatch` and `JsonMergePatch` payloads are JSON text on the wire and
/// parse as such; `Raw` wraps the bytes verbatim in a binary leaf.
pub fn parse_any<'a>(arena: &'a Arena, bytes: &[u8], format: Format) -> Result<Doc<'a>> {
    match format {
        Format::Json | Format::JsonPatch | Format::JsonMergePatch => json::parse(arena, bytes),
        Format::Msgpack => msgpack::parse(arena, bytes),
        Format::Bson => bson::parse(arena, bytes),
        Format::Cbor => cbor::parse(arena, bytes),
        Format::Ubjson => ubjson::parse(arena, bytes),
        Format::Raw => Ok(Doc::Bin(arena.alloc_bytes(bytes))),
    }
}

/// Serializes `doc` into `sink` in the given format.
///
/// Fails atomically: on error nothing has been written to the sink. The
/// patch pseudo-formats select write-path semantics and cannot serialize.
pub fn dump_any(doc: &Doc<'_>, format: Format, sink: &mut dyn ByteSink) -> Result<()> {
    if doc.is_discarded() {
        bail!(DocError::parse("cannot serialize a discarded document"));
    }
    match format {
        Format::Json => json::dump(doc, sink),
        Format::Msgpack => msgpack::dump(doc, sink),
        Format::Bson => bson::dump(doc, sink),
        Format::Cbor => cbor::dump(doc, sink),
        Format::Ubjson => ubjson::dump(doc, sink),
        Format::Raw => dump_raw(doc, sink),
        Format::JsonPatch | Format::JsonMergePatch => bail!(DocError::unsupported(format!(
            "{} is a write-side transformation language, not a serialization target",
            format.name()
        ))),
    }
}

// Raw bytes can only carry a single leaf; the check precedes the first
// write so container roots fail without partial output.
fn dump_raw(doc: &Doc<'_>, sink: &mut dyn ByteSink) -> Result<()> {
    match doc {
        Doc::Null => {}
        Doc::Bool(b) => sink.put(*b as u8),
        Doc::Int(v) => sink.put_slice(&v.to_le_bytes()),
        Doc::Uint(v) => sink.put_slice(&v.to_le_bytes()),
        Doc::Float(v) => sink.put_slice(&v.to_le_bytes()),
        Doc::Str(s) => sink.put_slice(s.as_bytes()),
        Doc::Bin(b) => sink.put_slice(b),
        Doc::Arr(_) | Doc::Obj(_) => bail!(DocError::unsupported(format!(
            "raw output requires a scalar or binary root, got {}",
            doc.type_name()
        ))),
        Doc::Discarded => bail!(DocError::parse("cannot serialize a discarded document")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn raw_round_trips_binary_leaves() {
        let arena = Arena::new();
        let doc = parse_any(&arena, &[0xde, 0xad, 0xbe, 0xef], Format::Raw).unwrap();
        assert_eq!(doc, Doc::Bin(&[0xde, 0xad, 0xbe, 0xef]));
        let mut out = Vec::new();
        dump_any(&doc, Format::Raw, &mut out).unwrap();
        assert_eq!(out, &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn raw_dump_of_container_fails_atomically() {
        let arena = Arena::new();
        let doc = json::parse(&arena, b"[1,2,3]").unwrap();
        let mut out = Vec::new();
        let err = dump_any(&doc, Format::Raw, &mut out).unwrap_err();
        assert_eq!(DocError::kind_of(&err), Some(ErrorKind::UnsupportedFormat));
        assert!(out.is_empty(), "no partial output on failure");
    }

    #[test]
    fn patch_formats_do_not_dump() {
        let doc = Doc::Null;
        let mut out = Vec::new();
        let err = dump_any(&doc, Format::JsonPatch, &mut out).unwrap_err();
        assert_eq!(DocError::kind_of(&err), Some(ErrorKind::UnsupportedFormat));
    }
}
