//! # Key-Value Boundary
//!
//! The document layer does not persist anything itself; it drives a
//! caller-provided engine through [`KvStore`], a batched read/write surface
//! plus transaction control:
//!
//! ```text
//! DocStore ──read──> (presence, offsets, lengths, bytes)  one entry per id
//!          ──write─> same tape shape, atomic within a transaction
//!          ──begin/commit/rollback─> engine-defined isolation
//! ```
//!
//! Blocking is the engine's business: the document layer is CPU-bound and
//! only suspends inside these calls. Errors from the engine propagate
//! verbatim (classified as `UnderlyingKv` when the engine raises them as
//! such).
//!
//! [`MemoryKv`] is the reference engine: a versioned in-memory map with
//! optimistic, first-committer-wins transactions. It backs the test suite
//! and doubles as a usable cache-grade store.

mod memory;

pub use memory::{MemoryKv, MemoryTxn};

use eyre::Result;

use crate::memory::{Tape, TapeView};
use crate::types::DocId;

pub trait KvStore {
    type Transaction;

    fn begin(&self) -> Result<Self::Transaction>;

    fn commit(&self, txn: Self::Transaction) -> Result<()>;

    fn rollback(&self, txn: Self::Transaction) -> Result<()>;

    /// Batched point read: appends exactly one entry per id to `tape`, in
    /// input order; missing keys append an absent entry.
    fn read<'a>(
        &self,
        txn: Option<&mut Self::Transaction>,
        ids: &[DocId],
        tape: &mut Tape<'a>,
    ) -> Result<()>;

    /// Batched write: entry i of `values` lands under `ids[i]`; an absent
    /// entry deletes the key.
    fn write(
        &self,
        txn: Option<&mut Self::Transaction>,
        ids: &[DocId],
        values: &TapeView<'_>,
    ) -> Result<()>;
}
