//! Leaf-path discovery over a batch of documents.

use bumpalo::collections::Vec as BumpVec;
use eyre::{Result, WrapErr};
use hashbrown::HashSet;
use tracing::trace;

use crate::batch::ReadPlan;
use crate::codec::parse_any;
use crate::kv::KvStore;
use crate::memory::{Arena, Tape};
use crate::store::DocStore;
use crate::types::{Doc, DocId, Format};

/// The distinct JSON Pointer paths of every leaf across a batch, sorted,
/// packed as NUL-terminated strings with start offsets.
pub struct Gist<'a> {
    paths: &'a [&'a str],
    offsets: &'a [u64],
    packed: &'a [u8],
}

impl<'a> Gist<'a> {
    pub fn field_count(&self) -> usize {
        self.paths.len()
    }

    pub fn paths(&self) -> &'a [&'a str] {
        self.paths
    }

    /// Byte offset of each path's first character inside `packed`.
    pub fn offsets(&self) -> &'a [u64] {
        self.offsets
    }

    /// All paths concatenated, each followed by a NUL.
    pub fn packed(&self) -> &'a [u8] {
        self.packed
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.binary_search_by(|p| (*p).cmp(path)).is_ok()
    }
}

impl<K: KvStore> DocStore<K> {
    /// Collects the set of JSON Pointer paths at which any document in the
    /// batch stores a leaf (scalar, string, binary, or empty container).
    pub fn docs_gist<'a>(
        &self,
        arena: &'a Arena,
        mut txn: Option<&mut K::Transaction>,
        ids: &[DocId],
    ) -> Result<Gist<'a>> {
        let plan = ReadPlan::new_in(arena, ids);
        let mut fetched = Tape::new_in(arena);
        self.kv()
            .read(txn.as_deref_mut(), plan.kv_ids(), &mut fetched)?;
        let fetched = fetched.view();

        let mut seen: HashSet<&'a str> = HashSet::new();
        let mut scratch = String::new();
        for slot in 0..plan.kv_ids().len() {
            let Some(bytes) = fetched.get(slot) else {
                continue;
            };
            if bytes.is_empty() {
                continue;
            }
            let doc = parse_any(arena, bytes, Format::INTERNAL)
                .wrap_err("stored document is not valid internal binary")?;
            scratch.clear();
            flatten(&doc, &mut scratch, &mut |path| {
                if !seen.contains(path) {
                    seen.insert(arena.alloc_str(path));
                }
            });
        }

        let mut paths = BumpVec::with_capacity_in(seen.len(), arena.bump());
        for path in seen {
            paths.push(path);
        }
        paths.sort_unstable();

        let mut offsets = BumpVec::with_capacity_in(paths.len(), arena.bump());
        let mut packed = BumpVec::new_in(arena.bump());
        for path in paths.iter() {
            offsets.push(packed.len() as u64);
            packed.extend_from_slice_copy(path.as_bytes());
            packed.push(0);
        }

        trace!(docs = ids.len(), fields = paths.len(), "gist collected");
        Ok(Gist {
            paths: paths.into_bump_slice(),
            offsets: offsets.into_bump_slice(),
            packed: packed.into_bump_slice(),
        })
    }
}

// Depth-first leaf enumeration. Empty containers count as leaves (their
// path is observable even though no scalar lives below), and a scalar
// root contributes the empty path.
fn flatten(doc: &Doc<'_>, prefix: &mut String, emit: &mut dyn FnMut(&str)) {
    match doc {
        Doc::Obj(members) if !members.is_empty() => {
            for (name, value) in members.iter() {
                let rollback = prefix.len();
                prefix.push('/');
                push_escaped(prefix, name);
                flatten(value, prefix, emit);
                prefix.truncate(rollback);
            }
        }
        Doc::Arr(items) if !items.is_empty() => {
            for (index, value) in items.iter().enumerate() {
                let rollback = prefix.len();
                prefix.push('/');
                prefix.push_str(&index.to_string());
                flatten(value, prefix, emit);
                prefix.truncate(rollback);
            }
        }
        Doc::Discarded => {}
        _ => emit(prefix),
    }
}

fn push_escaped(prefix: &mut String, token: &str) {
    for c in token.chars() {
        match c {
            '~' => prefix.push_str("~0"),
            '/' => prefix.push_str("~1"),
            c => prefix.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(doc: &Doc<'_>) -> Vec<String> {
        let mut out = Vec::new();
        let mut prefix = String::new();
        flatten(doc, &mut prefix, &mut |p| out.push(p.to_string()));
        out.sort();
        out
    }

    #[test]
    fn flattens_nested_documents() {
        let arena = Arena::new();
        let doc = crate::codec::json::parse(
            &arena,
            br#"{"a":1,"b":{"c":[10,{"d":true}],"e":{}},"f~g":2,"h/i":3}"#,
        )
        .unwrap();
        assert_eq!(
            collect(&doc),
            [
                "/a".to_string(),
                "/b/c/0".to_string(),
                "/b/c/1/d".to_string(),
                "/b/e".to_string(),
                "/f~0g".to_string(),
                "/h~1i".to_string(),
            ]
        );
    }

    #[test]
    fn scalar_root_is_the_empty_path() {
        let arena = Arena::new();
        let doc = crate::codec::json::parse(&arena, b"42").unwrap();
        assert_eq!(collect(&doc), ["".to_string()]);
    }
}
