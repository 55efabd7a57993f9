//! # Per-Call Memory Management
//!
//! Every batched document call owns exactly one [`Arena`]: a bump allocator
//! that backs all scratch state for the call (parsed documents, the growing
//! output tape, gather columns, gist paths). Releasing the arena releases
//! everything derived from it in O(1); nothing allocated during a call
//! outlives the arena that produced it.
//!
//! ```text
//! caller ──> Arena ──┬──> parsed Doc<'a> trees
//!                    ├──> Tape<'a> (bytes + presence/offsets/lengths)
//!                    └──> gather/gist output buffers
//! ```
//!
//! Arenas are not shared across threads; parallelism is expressed by issuing
//! concurrent calls, each with its own arena.

mod arena;
mod tape;

pub use arena::Arena;
pub use tape::{Tape, TapeView};
