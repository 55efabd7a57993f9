//! # In-Memory Reference Engine
//!
//! A single versioned map under a reader-writer lock, with optimistic
//! transactions:
//!
//! - `begin` snapshots the global version clock
//! - transactional reads and writes are buffered in the transaction and
//!   never touch the shared map until commit; a transaction always sees its
//!   own writes
//! - `commit` takes the write lock once, validates that nothing read or
//!   written moved past the transaction's start version, then applies the
//!   buffered writes at a fresh version
//!
//! Validation is first-committer-wins: of two transactions touching the
//! same key, whichever commits second fails with an `UnderlyingKv`
//! conflict and the caller decides whether to retry. Deletes keep a
//! tombstone so that "key was absent when I read it" validates exactly
//! like any other observation.

use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use eyre::{bail, Result};

use crate::error::DocError;
use crate::kv::KvStore;
use crate::memory::{Tape, TapeView};
use crate::types::DocId;

#[derive(Debug, Clone)]
struct Slot {
    version: u64,
    bytes: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct MemoryKv {
    map: RwLock<HashMap<DocId, Slot>>,
    clock: AtomicU64,
}

/// Buffered state of one open transaction.
pub struct MemoryTxn {
    start: u64,
    touched: HashSet<DocId>,
    writes: HashMap<DocId, Option<Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(1),
        }
    }

    /// Number of live (non-tombstoned) keys.
    pub fn len(&self) -> usize {
        self.map
            .read()
            .values()
            .filter(|slot| slot.bytes.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bump_clock(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl KvStore for MemoryKv {
    type Transaction = MemoryTxn;

    fn begin(&self) -> Result<MemoryTxn> {
        Ok(MemoryTxn {
            start: self.clock.load(Ordering::SeqCst),
            touched: HashSet::new(),
            writes: HashMap::new(),
        })
    }

    fn commit(&self, txn: MemoryTxn) -> Result<()> {
        let mut map = self.map.write();
        for id in txn.touched.iter().chain(txn.writes.keys()) {
            if let Some(slot) = map.get(id) {
                if slot.version > txn.start {
                    bail!(DocError::kv(format!(
                        "transaction conflict on ({}, {}): version {} committed after snapshot {}",
                        id.collection.0, id.key, slot.version, txn.start
                    )));
                }
            }
        }
        let version = self.bump_clock();
        for (id, bytes) in txn.writes {
            map.insert(id, Slot { version, bytes });
        }
        Ok(())
    }

    fn rollback(&self, _txn: MemoryTxn) -> Result<()> {
        Ok(())
    }

    fn read<'a>(
        &self,
        mut txn: Option<&mut MemoryTxn>,
        ids: &[DocId],
        tape: &mut Tape<'a>,
    ) -> Result<()> {
        let map = self.map.read();
        for id in ids {
            if let Some(t) = txn.as_deref_mut() {
                t.touched.insert(*id);
                if let Some(buffered) = t.writes.get(id) {
                    match buffered {
                        Some(bytes) => tape.push(bytes, true)?,
                        None => tape.push_absent()?,
                    }
                    continue;
                }
            }
            match map.get(id).and_then(|slot| slot.bytes.as_deref()) {
                Some(bytes) => tape.push(bytes, true)?,
                None => tape.push_absent()?,
            }
        }
        Ok(())
    }

    fn write(
        &self,
        mut txn: Option<&mut MemoryTxn>,
        ids: &[DocId],
        values: &TapeView<'_>,
    ) -> Result<()> {
        if ids.len() != values.len() {
            bail!(DocError::argument(format!(
                "write of {} ids with {} tape entries",
                ids.len(),
                values.len()
            )));
        }
        if let Some(t) = txn.as_deref_mut() {
            for (i, id) in ids.iter().enumerate() {
                t.writes.insert(*id, values.get(i).map(<[u8]>::to_vec));
            }
            return Ok(());
        }
        let mut map = self.map.write();
        let version = self.bump_clock();
        for (i, id) in ids.iter().enumerate() {
            map.insert(
                *id,
                Slot {
                    version,
                    bytes: values.get(i).map(<[u8]>::to_vec),
                },
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Arena;
    use crate::types::Collection;

    fn write_one(kv: &MemoryKv, txn: Option<&mut MemoryTxn>, id: DocId, payload: &[u8]) {
        let arena = Arena::new();
        let mut tape = Tape::new_in(&arena);
        tape.push(payload, true).unwrap();
        kv.write(txn, &[id], &tape.view()).unwrap();
    }

    fn read_one(kv: &MemoryKv, txn: Option<&mut MemoryTxn>, id: DocId) -> Option<Vec<u8>> {
        let arena = Arena::new();
        let mut tape = Tape::new_in(&arena);
        kv.read(txn, &[id], &mut tape).unwrap();
        tape.view().get(0).map(<[u8]>::to_vec)
    }

    #[test]
    fn autocommit_read_write() {
        let kv = MemoryKv::new();
        let id = DocId::new(Collection(1), 7);
        assert_eq!(read_one(&kv, None, id), None);
        write_one(&kv, None, id, b"payload");
        assert_eq!(read_one(&kv, None, id), Some(b"payload".to_vec()));
        assert_eq!(kv.len(), 1);
    }

    #[test]
    fn delete_via_absent_entry() {
        let kv = MemoryKv::new();
        let id = DocId::at(1);
        write_one(&kv, None, id, b"x");

        let arena = Arena::new();
        let mut tape = Tape::new_in(&arena);
        tape.push_absent().unwrap();
        kv.write(None, &[id], &tape.view()).unwrap();
        assert_eq!(read_one(&kv, None, id), None);
        assert_eq!(kv.len(), 0);
    }

    #[test]
    fn transaction_sees_own_writes() {
        let kv = MemoryKv::new();
        let id = DocId::at(3);
        let mut txn = kv.begin().unwrap();
        write_one(&kv, Some(&mut txn), id, b"mine");
        assert_eq!(read_one(&kv, Some(&mut txn), id), Some(b"mine".to_vec()));
        // not visible outside before commit
        assert_eq!(read_one(&kv, None, id), None);
        kv.commit(txn).unwrap();
        assert_eq!(read_one(&kv, None, id), Some(b"mine".to_vec()));
    }

    #[test]
    fn first_committer_wins() {
        let kv = MemoryKv::new();
        let id = DocId::at(9);
        write_one(&kv, None, id, b"base");

        let mut a = kv.begin().unwrap();
        let mut b = kv.begin().unwrap();
        assert_eq!(read_one(&kv, Some(&mut a), id), Some(b"base".to_vec()));
        write_one(&kv, Some(&mut a), id, b"from-a");
        write_one(&kv, Some(&mut b), id, b"from-b");

        kv.commit(a).unwrap();
        let err = kv.commit(b).unwrap_err();
        assert_eq!(
            crate::error::DocError::kind_of(&err),
            Some(crate::error::ErrorKind::UnderlyingKv)
        );
        assert_eq!(read_one(&kv, None, id), Some(b"from-a".to_vec()));
    }

    #[test]
    fn rollback_discards_buffered_writes() {
        let kv = MemoryKv::new();
        let id = DocId::at(4);
        let mut txn = kv.begin().unwrap();
        write_one(&kv, Some(&mut txn), id, b"gone");
        kv.rollback(txn).unwrap();
        assert_eq!(read_one(&kv, None, id), None);
    }
}
