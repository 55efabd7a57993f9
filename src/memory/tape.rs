//! # Tape - Batched Output Buffer
//!
//! A tape is the wire between the document layer and its callers (and the KV
//! engine): N variable-length entries packed into one contiguous byte array,
//! described by three parallel columns.
//!
//! ## Layout
//!
//! ```text
//! +-----------------+--------------------+--------------------+-----------+
//! | presence        | offsets            | lengths            | bytes     |
//! | [u8; (N+7)/8]   | [u64; N]           | [u32; N]           | [u8; ...] |
//! +-----------------+--------------------+--------------------+-----------+
//!
//! presence:  bit i set  = entry i carries a value (may still be empty)
//!            bit i zero = entry i is logically absent
//! offsets:   inclusive prefix sums of lengths; entry i ends at offsets[i]
//!            and starts at offsets[i] - lengths[i]
//! bytes:     entry payloads, concatenated without padding
//! ```
//!
//! Entries are appended either whole ([`Tape::push`]) or streamed: `begin`,
//! any number of sink writes, then `end(present)`. The tape implements the
//! codecs' byte sink, so `dump_any` serializes straight into the current
//! entry with no intermediate buffer.
//!
//! All four columns live in the call's arena; a [`TapeView`] borrows them
//! without copying and is the shape returned to callers.

use bumpalo::collections::Vec as BumpVec;
use eyre::Result;

use crate::config::{TAPE_INITIAL_BYTES, TAPE_INITIAL_ENTRIES};
use crate::memory::Arena;

#[derive(Debug)]
pub struct Tape<'a> {
    arena: &'a Arena,
    bytes: BumpVec<'a, u8>,
    offsets: BumpVec<'a, u64>,
    lengths: BumpVec<'a, u32>,
    presence: BumpVec<'a, u8>,
    entries: usize,
    open_at: Option<usize>,
}

impl<'a> Tape<'a> {
    pub fn new_in(arena: &'a Arena) -> Self {
        Self {
            arena,
            bytes: BumpVec::with_capacity_in(TAPE_INITIAL_BYTES, arena.bump()),
            offsets: BumpVec::with_capacity_in(TAPE_INITIAL_ENTRIES, arena.bump()),
            lengths: BumpVec::with_capacity_in(TAPE_INITIAL_ENTRIES, arena.bump()),
            presence: BumpVec::new_in(arena.bump()),
            entries: 0,
            open_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Opens a new entry; subsequent sink writes belong to it.
    pub fn begin(&mut self) {
        debug_assert!(self.open_at.is_none(), "tape entry already open");
        self.open_at = Some(self.bytes.len());
    }

    /// Seals the open entry and records its presence bit.
    pub fn end(&mut self, present: bool) -> Result<()> {
        let start = self.open_at.take().unwrap_or(self.bytes.len());
        let len = self.bytes.len() - start;
        eyre::ensure!(
            len <= u32::MAX as usize,
            "tape entry of {} bytes exceeds the 4 GiB entry limit",
            len
        );
        self.arena.charge(len + 16)?;
        let total = self.offsets.last().copied().unwrap_or(0);
        self.offsets.push(total + len as u64);
        self.lengths.push(len as u32);
        let bit = self.entries;
        if bit / 8 >= self.presence.len() {
            self.presence.push(0);
        }
        if present {
            self.presence[bit / 8] |= 1 << (bit % 8);
        }
        self.entries += 1;
        Ok(())
    }

    /// Appends a whole entry in one shot.
    pub fn push(&mut self, payload: &[u8], present: bool) -> Result<()> {
        self.begin();
        self.bytes.extend_from_slice_copy(payload);
        self.end(present)
    }

    /// Appends a logically absent entry (presence bit zero, zero length).
    pub fn push_absent(&mut self) -> Result<()> {
        self.begin();
        self.end(false)
    }

    pub fn put(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice_copy(bytes);
    }

    pub fn view(&self) -> TapeView<'_> {
        TapeView {
            presence: &self.presence,
            offsets: &self.offsets,
            lengths: &self.lengths,
            bytes: &self.bytes,
            entries: self.entries,
        }
    }
}

/// Borrowed, read-only shape of a sealed tape.
#[derive(Clone, Copy)]
pub struct TapeView<'t> {
    presence: &'t [u8],
    offsets: &'t [u64],
    lengths: &'t [u32],
    bytes: &'t [u8],
    entries: usize,
}

impl<'t> TapeView<'t> {
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn is_present(&self, index: usize) -> bool {
        index < self.entries && self.presence[index / 8] & (1 << (index % 8)) != 0
    }

    /// Payload of entry `index`, or `None` when the entry is absent.
    pub fn get(&self, index: usize) -> Option<&'t [u8]> {
        if !self.is_present(index) {
            return None;
        }
        let end = self.offsets[index] as usize;
        let start = end - self.lengths[index] as usize;
        Some(&self.bytes[start..end])
    }

    pub fn presence(&self) -> &'t [u8] {
        self.presence
    }

    pub fn offsets(&self) -> &'t [u64] {
        self.offsets
    }

    pub fn lengths(&self) -> &'t [u32] {
        self.lengths
    }

    pub fn bytes(&self) -> &'t [u8] {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_view() {
        let arena = Arena::new();
        let mut tape = Tape::new_in(&arena);
        tape.push(b"alpha", true).unwrap();
        tape.push(b"", true).unwrap();
        tape.push_absent().unwrap();
        tape.push(b"omega", true).unwrap();

        let view = tape.view();
        assert_eq!(view.len(), 4);
        assert_eq!(view.get(0), Some(&b"alpha"[..]));
        assert_eq!(view.get(1), Some(&b""[..]));
        assert_eq!(view.get(2), None);
        assert!(!view.is_present(2));
        assert_eq!(view.get(3), Some(&b"omega"[..]));
        assert_eq!(view.offsets(), &[5, 5, 5, 10]);
        assert_eq!(view.lengths(), &[5, 0, 0, 5]);
    }

    #[test]
    fn streamed_entry() {
        let arena = Arena::new();
        let mut tape = Tape::new_in(&arena);
        tape.begin();
        tape.put(b'{');
        tape.put_slice(b"\"k\":1");
        tape.put(b'}');
        tape.end(true).unwrap();

        let view = tape.view();
        assert_eq!(view.get(0), Some(&b"{\"k\":1}"[..]));
    }

    #[test]
    fn presence_bitmap_spans_bytes() {
        let arena = Arena::new();
        let mut tape = Tape::new_in(&arena);
        for i in 0..20 {
            if i % 3 == 0 {
                tape.push_absent().unwrap();
            } else {
                tape.push(&[i as u8], true).unwrap();
            }
        }
        let view = tape.view();
        for i in 0..20 {
            assert_eq!(view.is_present(i), i % 3 != 0, "entry {}", i);
        }
    }

    #[test]
    fn budget_enforced_at_entry_seal() {
        let arena = Arena::with_limit(256);
        let mut tape = Tape::new_in(&arena);
        let big = vec![0u8; 64 * 1024];
        let err = tape.push(&big, true).unwrap_err();
        assert_eq!(
            crate::error::DocError::kind_of(&err),
            Some(crate::error::ErrorKind::OutOfMemory)
        );
    }
}
