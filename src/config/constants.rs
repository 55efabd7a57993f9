//! # Configuration Constants
//!
//! All numeric knobs in one place. Most matter only for pre-allocation; the
//! one hard limit is [`MAX_DOCUMENT_DEPTH`], which every codec enforces while
//! recursing so that hostile inputs cannot blow the stack.
//!
//! ```text
//! MAX_DOCUMENT_DEPTH (128)
//!       │
//!       └─> enforced by json/msgpack/bson/cbor/ubjson parse AND dump,
//!           and by the patch engine when it walks pointers
//!
//! TAPE_INITIAL_BYTES / TAPE_INITIAL_ENTRIES
//!       │
//!       └─> first arena chunk reserved by a Tape; growth doubles from here
//! ```

/// Maximum nesting depth of a document accepted or produced by any codec.
pub const MAX_DOCUMENT_DEPTH: usize = 128;

/// Initial byte capacity reserved by a fresh [`Tape`](crate::memory::Tape).
pub const TAPE_INITIAL_BYTES: usize = 4096;

/// Initial entry capacity (lengths/offsets/presence) of a fresh tape.
pub const TAPE_INITIAL_ENTRIES: usize = 64;

/// Inline capacity for compiled JSON Pointer tokens before spilling to heap.
pub const POINTER_INLINE_TOKENS: usize = 8;

// A depth limit below the patch engine's working headroom would reject
// documents the write path itself produces.
const _: () = assert!(MAX_DOCUMENT_DEPTH >= 16);
const _: () = assert!(TAPE_INITIAL_ENTRIES > 0 && TAPE_INITIAL_BYTES > 0);
