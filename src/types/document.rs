//! # Document Value Representation
//!
//! `Doc<'a>` is the in-memory form of one stored document: a recursive value
//! fully allocated in the call's arena. Strings and binary leaves are arena
//! slices; arrays and objects are arena-backed vectors, so dropping the
//! arena releases an entire parsed batch at once.
//!
//! ## Object representation
//!
//! Object members are kept **sorted by name** in a flat vector. Lookup is a
//! binary search (O(log n)), insertion keeps the order, and two objects with
//! the same members compare equal regardless of the order they were built
//! in. Insertion order of the source text is not preserved; duplicate keys
//! in parsed input resolve to the last occurrence.
//!
//! ## Numbers
//!
//! Signed and unsigned 64-bit integers are distinct variants, but equality
//! is numeric across them: `Int(5) == Uint(5)`. Wire formats that only have
//! one integer domain (MessagePack, CBOR) can therefore round-trip either
//! variant without breaking `==`. Floats never equal integers.
//!
//! ## Discarded
//!
//! `Discarded` marks a document that could not be read (absent key, corrupt
//! blob). It is never storable; codecs refuse to serialize it.

use bumpalo::collections::Vec as BumpVec;

use crate::memory::Arena;

#[derive(Debug)]
pub enum Doc<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(&'a str),
    Bin(&'a [u8]),
    Arr(BumpVec<'a, Doc<'a>>),
    Obj(BumpVec<'a, (&'a str, Doc<'a>)>),
    Discarded,
}

impl<'a> Doc<'a> {
    pub fn object_in(arena: &'a Arena) -> Doc<'a> {
        Doc::Obj(BumpVec::new_in(arena.bump()))
    }

    pub fn array_in(arena: &'a Arena) -> Doc<'a> {
        Doc::Arr(BumpVec::new_in(arena.bump()))
    }

    pub fn str_in(arena: &'a Arena, s: &str) -> Doc<'a> {
        Doc::Str(arena.alloc_str(s))
    }

    pub fn bin_in(arena: &'a Arena, bytes: &[u8]) -> Doc<'a> {
        Doc::Bin(arena.alloc_bytes(bytes))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Doc::Null => "null",
            Doc::Bool(_) => "boolean",
            Doc::Int(_) => "integer",
            Doc::Uint(_) => "unsigned",
            Doc::Float(_) => "float",
            Doc::Str(_) => "string",
            Doc::Bin(_) => "binary",
            Doc::Arr(_) => "array",
            Doc::Obj(_) => "object",
            Doc::Discarded => "discarded",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Doc::Null)
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, Doc::Discarded)
    }

    /// Member lookup by name; `None` for missing members and non-objects.
    pub fn member(&self, name: &str) -> Option<&Doc<'a>> {
        match self {
            Doc::Obj(members) => members
                .binary_search_by(|(k, _)| (*k).cmp(name))
                .ok()
                .map(|i| &members[i].1),
            _ => None,
        }
    }

    pub fn member_mut(&mut self, name: &str) -> Option<&mut Doc<'a>> {
        match self {
            Doc::Obj(members) => match members.binary_search_by(|(k, _)| (*k).cmp(name)) {
                Ok(i) => Some(&mut members[i].1),
                Err(_) => None,
            },
            _ => None,
        }
    }

    /// Appends to an array; `false` when `self` is not an array.
    pub fn push_item(&mut self, value: Doc<'a>) -> bool {
        match self {
            Doc::Arr(items) => {
                items.push(value);
                true
            }
            _ => false,
        }
    }

    /// Inserts or replaces an object member; `false` when `self` is not an
    /// object.
    pub fn insert_member(&mut self, arena: &'a Arena, name: &str, value: Doc<'a>) -> bool {
        match self {
            Doc::Obj(members) => {
                obj_upsert(members, arena.alloc_str(name), value);
                true
            }
            _ => false,
        }
    }

    /// Deep copy within the same arena. Leaf slices are shared (they are
    /// immutable); only the container spines are re-allocated.
    pub fn clone_in(&self, arena: &'a Arena) -> Doc<'a> {
        match self {
            Doc::Null => Doc::Null,
            Doc::Bool(b) => Doc::Bool(*b),
            Doc::Int(v) => Doc::Int(*v),
            Doc::Uint(v) => Doc::Uint(*v),
            Doc::Float(v) => Doc::Float(*v),
            Doc::Str(s) => Doc::Str(s),
            Doc::Bin(b) => Doc::Bin(b),
            Doc::Arr(items) => {
                let mut out = BumpVec::with_capacity_in(items.len(), arena.bump());
                for item in items.iter() {
                    out.push(item.clone_in(arena));
                }
                Doc::Arr(out)
            }
            Doc::Obj(members) => {
                let mut out = BumpVec::with_capacity_in(members.len(), arena.bump());
                for (name, value) in members.iter() {
                    out.push((*name, value.clone_in(arena)));
                }
                Doc::Obj(out)
            }
            Doc::Discarded => Doc::Discarded,
        }
    }
}

impl PartialEq for Doc<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Doc::Null, Doc::Null) => true,
            (Doc::Bool(a), Doc::Bool(b)) => a == b,
            (Doc::Int(a), Doc::Int(b)) => a == b,
            (Doc::Uint(a), Doc::Uint(b)) => a == b,
            (Doc::Int(a), Doc::Uint(b)) | (Doc::Uint(b), Doc::Int(a)) => {
                *a >= 0 && *a as u64 == *b
            }
            (Doc::Float(a), Doc::Float(b)) => a == b,
            (Doc::Str(a), Doc::Str(b)) => a == b,
            (Doc::Bin(a), Doc::Bin(b)) => a == b,
            (Doc::Arr(a), Doc::Arr(b)) => a[..] == b[..],
            (Doc::Obj(a), Doc::Obj(b)) => a[..] == b[..],
            (Doc::Discarded, Doc::Discarded) => true,
            _ => false,
        }
    }
}

/// Inserts or replaces a member, keeping the vector sorted by name.
pub fn obj_upsert<'a>(
    members: &mut BumpVec<'a, (&'a str, Doc<'a>)>,
    name: &'a str,
    value: Doc<'a>,
) {
    match members.binary_search_by(|(k, _)| (*k).cmp(name)) {
        Ok(i) => members[i].1 = value,
        Err(i) => members.insert(i, (name, value)),
    }
}

/// Removes a member by name; `None` when it was not there.
pub fn obj_remove<'a>(
    members: &mut BumpVec<'a, (&'a str, Doc<'a>)>,
    name: &str,
) -> Option<Doc<'a>> {
    match members.binary_search_by(|(k, _)| (*k).cmp(name)) {
        Ok(i) => Some(members.remove(i).1),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_lookup_is_sorted() {
        let arena = Arena::new();
        let mut doc = Doc::object_in(&arena);
        if let Doc::Obj(members) = &mut doc {
            obj_upsert(members, arena.alloc_str("zeta"), Doc::Int(1));
            obj_upsert(members, arena.alloc_str("alpha"), Doc::Int(2));
            obj_upsert(members, arena.alloc_str("mid"), Doc::Int(3));
            assert_eq!(members[0].0, "alpha");
            assert_eq!(members[2].0, "zeta");
        }
        assert_eq!(doc.member("mid"), Some(&Doc::Int(3)));
        assert_eq!(doc.member("nope"), None);
    }

    #[test]
    fn upsert_replaces_existing() {
        let arena = Arena::new();
        let mut doc = Doc::object_in(&arena);
        if let Doc::Obj(members) = &mut doc {
            obj_upsert(members, arena.alloc_str("k"), Doc::Int(1));
            obj_upsert(members, arena.alloc_str("k"), Doc::Int(2));
            assert_eq!(members.len(), 1);
        }
        assert_eq!(doc.member("k"), Some(&Doc::Int(2)));
    }

    #[test]
    fn numeric_equality_across_sign_domains() {
        assert_eq!(Doc::Int(5), Doc::Uint(5));
        assert_eq!(Doc::Uint(5), Doc::Int(5));
        assert_ne!(Doc::Int(-1), Doc::Uint(u64::MAX));
        assert_ne!(Doc::Float(5.0), Doc::Int(5));
    }

    #[test]
    fn clone_in_is_deep() {
        let arena = Arena::new();
        let mut doc = Doc::object_in(&arena);
        if let Doc::Obj(members) = &mut doc {
            obj_upsert(members, arena.alloc_str("a"), Doc::Int(1));
        }
        let copy = doc.clone_in(&arena);
        if let Doc::Obj(members) = &mut doc {
            obj_upsert(members, arena.alloc_str("a"), Doc::Int(9));
        }
        assert_eq!(copy.member("a"), Some(&Doc::Int(1)));
        assert_eq!(doc.member("a"), Some(&Doc::Int(9)));
    }
}
