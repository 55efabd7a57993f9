//! Fuzz testing for field selectors and patch application.
//!
//! Selector compilation and patch application over arbitrary documents
//! must fail cleanly: no panics, no out-of-bounds, no infinite loops.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use vellum::codec::parse_any;
use vellum::fields::{apply_patch, assign, lookup, merge_patch, FieldSelector};
use vellum::{Arena, Doc, Format};

#[derive(Debug, Arbitrary)]
struct Input {
    selector: String,
    document: Vec<u8>,
    patch: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let arena = Arena::new();
    let Ok(selector) = FieldSelector::parse(Some(&input.selector)) else {
        return;
    };
    let Ok(mut doc) = parse_any(&arena, &input.document, Format::Json) else {
        return;
    };
    let _ = lookup(&doc, &selector);
    let _ = assign(&arena, &mut doc, &selector, Doc::Null);

    if let Ok(patch) = parse_any(&arena, &input.patch, Format::Json) {
        merge_patch(&arena, &mut doc, &patch);
        let _ = apply_patch(&arena, &mut doc, &patch);
    }
});
