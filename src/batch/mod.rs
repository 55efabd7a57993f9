//! # Batch Read Planner
//!
//! Batched calls accept arbitrary id sequences - duplicated, unsorted, or
//! both - but the KV engine should see each key once and each document
//! should parse once. The planner decides how:
//!
//! 1. **Fast path**: the input is strictly ascending (hence unique, the
//!    shape scans produce). The KV read uses the caller's layout verbatim
//!    and original index == storage slot.
//! 2. The input has no duplicates after a sort-and-dedup probe: still one
//!    KV read in the caller's verbatim layout, identity mapping; only the
//!    probe copy was paid.
//! 3. Duplicates exist: the KV read covers the sorted unique set and each
//!    original index maps to its slot by binary search.
//!
//! The probe copy lives in the call's arena like every other scratch
//! allocation.

use bumpalo::collections::Vec as BumpVec;

use crate::memory::Arena;
use crate::types::DocId;

pub struct ReadPlan<'a, 'p> {
    ids: &'p [DocId],
    deduped: Option<BumpVec<'a, DocId>>,
}

impl<'a, 'p> ReadPlan<'a, 'p> {
    pub fn new_in(arena: &'a Arena, ids: &'p [DocId]) -> Self {
        if strictly_ascending(ids) {
            return Self { ids, deduped: None };
        }

        let mut unique = BumpVec::with_capacity_in(ids.len(), arena.bump());
        unique.extend_from_slice_copy(ids);
        unique.sort_unstable();
        dedup_sorted(&mut unique);

        if unique.len() == ids.len() {
            // unsorted but duplicate-free: keep the caller's layout
            Self { ids, deduped: None }
        } else {
            Self {
                ids,
                deduped: Some(unique),
            }
        }
    }

    /// The id layout to hand to the KV engine: caller-verbatim on the fast
    /// paths, sorted-unique otherwise.
    pub fn kv_ids(&self) -> &[DocId] {
        match &self.deduped {
            Some(unique) => unique,
            None => self.ids,
        }
    }

    pub fn input_len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_deduped(&self) -> bool {
        self.deduped.is_some()
    }

    /// Maps an original input index to its slot in `kv_ids()`.
    pub fn slot(&self, original: usize) -> usize {
        match &self.deduped {
            None => original,
            Some(unique) => match unique.binary_search(&self.ids[original]) {
                Ok(slot) => slot,
                Err(_) => unreachable!("planned id missing from its own unique set"),
            },
        }
    }
}

fn strictly_ascending(ids: &[DocId]) -> bool {
    ids.windows(2).all(|pair| pair[0] < pair[1])
}

fn dedup_sorted(ids: &mut BumpVec<'_, DocId>) {
    if ids.is_empty() {
        return;
    }
    let mut write = 1;
    for read in 1..ids.len() {
        if ids[read] != ids[write - 1] {
            ids[write] = ids[read];
            write += 1;
        }
    }
    ids.truncate(write);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Collection;

    fn id(key: i64) -> DocId {
        DocId::at(key)
    }

    #[test]
    fn ascending_input_takes_the_fast_path() {
        let arena = Arena::new();
        let ids = [id(1), id(2), id(10)];
        let plan = ReadPlan::new_in(&arena, &ids);
        assert!(!plan.is_deduped());
        assert_eq!(plan.kv_ids(), &ids);
        assert_eq!(plan.slot(2), 2);
    }

    #[test]
    fn unsorted_unique_keeps_caller_layout() {
        let arena = Arena::new();
        let ids = [id(5), id(1), id(3)];
        let plan = ReadPlan::new_in(&arena, &ids);
        assert!(!plan.is_deduped());
        assert_eq!(plan.kv_ids(), &ids);
        assert_eq!(plan.slot(0), 0);
        assert_eq!(plan.slot(1), 1);
    }

    #[test]
    fn duplicates_are_deduplicated_and_mapped_back() {
        let arena = Arena::new();
        let ids = [id(10), id(10), id(11), id(10)];
        let plan = ReadPlan::new_in(&arena, &ids);
        assert!(plan.is_deduped());
        assert_eq!(plan.kv_ids(), &[id(10), id(11)]);
        assert_eq!(plan.slot(0), 0);
        assert_eq!(plan.slot(1), 0);
        assert_eq!(plan.slot(2), 1);
        assert_eq!(plan.slot(3), 0);
    }

    #[test]
    fn collections_order_before_keys() {
        let arena = Arena::new();
        let ids = [
            DocId::new(Collection(2), -1),
            DocId::new(Collection(1), 100),
            DocId::new(Collection(2), -1),
        ];
        let plan = ReadPlan::new_in(&arena, &ids);
        assert_eq!(
            plan.kv_ids(),
            &[DocId::new(Collection(1), 100), DocId::new(Collection(2), -1)]
        );
        assert_eq!(plan.slot(0), 1);
        assert_eq!(plan.slot(1), 0);
        assert_eq!(plan.slot(2), 1);
    }

    #[test]
    fn equal_neighbors_break_the_fast_path() {
        let arena = Arena::new();
        let ids = [id(1), id(1)];
        let plan = ReadPlan::new_in(&arena, &ids);
        assert!(plan.is_deduped());
        assert_eq!(plan.kv_ids(), &[id(1)]);
    }
}
