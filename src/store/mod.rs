//! # DocStore - The Batched Document Operations
//!
//! `DocStore<K>` wraps a [`KvStore`] and exposes the four vectorized calls:
//!
//! ```text
//! docs_write ─┬─ passthrough   (internal format, no fields: zero parsing)
//!             ├─ replace_docs  (parse caller format -> msgpack -> one write)
//!             └─ read_modify_write (plan -> read -> patch -> one write)
//! docs_read  ── plan -> read -> parse once per unique doc -> project -> tape
//! docs_gist  ── plan -> read -> flatten to leaf pointer paths
//! docs_gather ─ plan -> read -> N x M typed cells + bitmaps
//! ```
//!
//! Every call takes the caller's [`Arena`](crate::memory::Arena) for all
//! scratch and output memory and an optional engine transaction. Within a
//! call the KV effect order is reads-then-writes; across calls, ordering is
//! whatever the engine's transactions provide.

mod gather;
mod gist;
mod read;
mod write;

pub use gather::{ColumnData, Gather, GatherColumn};
pub use gist::Gist;

use eyre::Result;

use crate::kv::KvStore;

pub struct DocStore<K: KvStore> {
    kv: K,
}

impl<K: KvStore> DocStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    pub fn into_kv(self) -> K {
        self.kv
    }

    pub fn begin(&self) -> Result<K::Transaction> {
        self.kv.begin()
    }

    pub fn commit(&self, txn: K::Transaction) -> Result<()> {
        self.kv.commit(txn)
    }

    pub fn rollback(&self, txn: K::Transaction) -> Result<()> {
        self.kv.rollback(txn)
    }
}
