//! Fuzz testing for the wire-format decoders.
//!
//! Every parser must reject hostile bytes with an error, never a panic or
//! runaway allocation, and anything that does parse must re-serialize.

#![no_main]

use libfuzzer_sys::fuzz_target;

use vellum::codec::{dump_any, parse_any};
use vellum::{Arena, Format};

fuzz_target!(|data: &[u8]| {
    let arena = Arena::new();
    for format in [
        Format::Json,
        Format::Msgpack,
        Format::Bson,
        Format::Cbor,
        Format::Ubjson,
    ] {
        if let Ok(doc) = parse_any(&arena, data, format) {
            let mut out = Vec::new();
            let _ = dump_any(&doc, format, &mut out);
        }
    }
});
