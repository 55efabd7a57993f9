//! Document mutation: assignment, RFC 6902 JSON Patch, RFC 7396 merge.
//!
//! Three write modes share these entry points:
//!
//! - [`assign`]: replace the subtree at a selector, creating missing
//!   intermediate objects along the way (scalars standing mid-path are
//!   replaced by objects, array writes accept existing indices, the next
//!   free index, or `-`)
//! - [`apply_patch`]: an RFC 6902 operation list - add, remove, replace,
//!   move, copy, test - applied atomically per document; unlike `assign`,
//!   patch paths never create intermediate containers
//! - [`merge_patch`]: the RFC 7396 recursive merge; null members delete

use std::borrow::Cow;

use eyre::{bail, Result};

use crate::error::DocError;
use crate::fields::pointer::{array_index, parse_index, FieldSelector, JsonPointer};
use crate::fields::{lookup, lookup_mut};
use crate::memory::Arena;
use crate::types::{obj_remove, obj_upsert, Doc};

/// Replaces whatever the selector addresses with `value`.
pub fn assign<'a>(
    arena: &'a Arena,
    doc: &mut Doc<'a>,
    selector: &FieldSelector<'_>,
    value: Doc<'a>,
) -> Result<()> {
    match selector {
        FieldSelector::Whole => {
            *doc = value;
            Ok(())
        }
        FieldSelector::Member(name) => {
            if !matches!(doc, Doc::Obj(_)) {
                *doc = Doc::object_in(arena);
            }
            let Doc::Obj(members) = doc else { unreachable!() };
            obj_upsert(members, arena.alloc_str(name), value);
            Ok(())
        }
        FieldSelector::Pointer(ptr) => assign_at(arena, doc, ptr.tokens(), value),
    }
}

fn assign_at<'a>(
    arena: &'a Arena,
    doc: &mut Doc<'a>,
    tokens: &[Cow<'_, str>],
    value: Doc<'a>,
) -> Result<()> {
    let Some((head, rest)) = tokens.split_first() else {
        *doc = value;
        return Ok(());
    };
    let head: &str = head.as_ref();

    if let Doc::Arr(items) = doc {
        let len = items.len();
        let index = if head == "-" {
            len
        } else {
            match parse_index(head) {
                Some(i) if i <= len => i,
                Some(i) => bail!(DocError::argument(format!(
                    "array index {} out of bounds (length {})",
                    i, len
                ))),
                None => bail!(DocError::argument(format!(
                    "token {:?} does not address an array element",
                    head
                ))),
            }
        };
        if index == len {
            items.push(Doc::Null);
        }
        let slot = &mut items[index];
        if rest.is_empty() {
            *slot = value;
        } else {
            assign_at(arena, slot, rest, value)?;
        }
        return Ok(());
    }

    if !matches!(doc, Doc::Obj(_)) {
        *doc = Doc::object_in(arena);
    }
    let Doc::Obj(members) = doc else { unreachable!() };
    match members.binary_search_by(|(k, _)| (*k).cmp(head)) {
        Ok(i) => {
            let slot = &mut members[i].1;
            if rest.is_empty() {
                *slot = value;
            } else {
                assign_at(arena, slot, rest, value)?;
            }
        }
        Err(i) => {
            let key = arena.alloc_str(head);
            if rest.is_empty() {
                members.insert(i, (key, value));
            } else {
                members.insert(i, (key, Doc::object_in(arena)));
                assign_at(arena, &mut members[i].1, rest, value)?;
            }
        }
    }
    Ok(())
}

/// Removes the subtree at a selector; `None` when it was absent. Absence is
/// not an error - delete of a missing field is a no-op on the write path.
pub fn remove_at<'a>(doc: &mut Doc<'a>, selector: &FieldSelector<'_>) -> Option<Doc<'a>> {
    match selector {
        FieldSelector::Whole => Some(std::mem::replace(doc, Doc::Null)),
        FieldSelector::Member(name) => match doc {
            Doc::Obj(members) => obj_remove(members, name),
            _ => None,
        },
        FieldSelector::Pointer(ptr) => {
            let (last, parents) = ptr.tokens().split_last()?;
            let mut current = doc;
            for token in parents {
                current = match current {
                    Doc::Obj(_) => current.member_mut(token)?,
                    Doc::Arr(items) => {
                        let i = array_index(token, items.len())?;
                        &mut items[i]
                    }
                    _ => return None,
                };
            }
            match current {
                Doc::Obj(members) => obj_remove(members, last),
                Doc::Arr(items) => {
                    let i = array_index(last, items.len())?;
                    Some(items.remove(i))
                }
                _ => None,
            }
        }
    }
}

/// RFC 7396 merge: object members merge recursively, null members delete,
/// everything else replaces.
pub fn merge_patch<'a>(arena: &'a Arena, target: &mut Doc<'a>, patch: &Doc<'a>) {
    let Doc::Obj(patch_members) = patch else {
        *target = patch.clone_in(arena);
        return;
    };
    if !matches!(target, Doc::Obj(_)) {
        *target = Doc::object_in(arena);
    }
    let Doc::Obj(members) = target else { unreachable!() };
    for (name, patch_value) in patch_members.iter() {
        let name = *name;
        if patch_value.is_null() {
            obj_remove(members, name);
            continue;
        }
        match members.binary_search_by(|(k, _)| (*k).cmp(name)) {
            Ok(i) => merge_patch(arena, &mut members[i].1, patch_value),
            Err(i) => {
                members.insert(i, (name, Doc::Null));
                merge_patch(arena, &mut members[i].1, patch_value);
            }
        }
    }
}

/// Applies an RFC 6902 operation list to `doc`.
pub fn apply_patch<'a>(arena: &'a Arena, doc: &mut Doc<'a>, ops: &Doc<'a>) -> Result<()> {
    let Doc::Arr(operations) = ops else {
        bail!(DocError::parse(
            "a JSON Patch document must be an array of operations"
        ));
    };
    for (index, op) in operations.iter().enumerate() {
        apply_one(arena, doc, op)
            .map_err(|e| e.wrap_err(format!("JSON Patch operation {}", index)))?;
    }
    Ok(())
}

fn apply_one<'a>(arena: &'a Arena, doc: &mut Doc<'a>, op: &Doc<'a>) -> Result<()> {
    let Doc::Obj(_) = op else {
        bail!(DocError::parse("patch operation must be an object"));
    };
    let name = match op.member("op") {
        Some(Doc::Str(s)) => *s,
        _ => bail!(DocError::parse("patch operation is missing \"op\"")),
    };
    let path = match op.member("path") {
        Some(Doc::Str(s)) => JsonPointer::parse(s)?,
        _ => bail!(DocError::parse("patch operation is missing \"path\"")),
    };

    match name {
        "add" => {
            let value = required_value(op)?.clone_in(arena);
            patch_add(arena, doc, path.tokens(), value)
        }
        "remove" => {
            patch_remove(doc, path.tokens())?;
            Ok(())
        }
        "replace" => {
            let value = required_value(op)?.clone_in(arena);
            match lookup_mut(doc, &pointer_selector(&path)) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => bail!(DocError::parse(format!(
                    "replace target {:?} does not exist",
                    render_tokens(path.tokens())
                ))),
            }
        }
        "move" => {
            let from = from_pointer(op)?;
            if is_proper_prefix(from.tokens(), path.tokens()) {
                bail!(DocError::parse("cannot move a value into its own child"));
            }
            let value = patch_remove(doc, from.tokens())?;
            patch_add(arena, doc, path.tokens(), value)
        }
        "copy" => {
            let from = from_pointer(op)?;
            let value = match lookup(doc, &pointer_selector(&from)) {
                Some(v) => v.clone_in(arena),
                None => bail!(DocError::parse(format!(
                    "copy source {:?} does not exist",
                    render_tokens(from.tokens())
                ))),
            };
            patch_add(arena, doc, path.tokens(), value)
        }
        "test" => {
            let expected = required_value(op)?;
            match lookup(doc, &pointer_selector(&path)) {
                Some(actual) if actual == expected => Ok(()),
                Some(_) => bail!(DocError::parse(format!(
                    "test failed at {:?}",
                    render_tokens(path.tokens())
                ))),
                None => bail!(DocError::parse(format!(
                    "test target {:?} does not exist",
                    render_tokens(path.tokens())
                ))),
            }
        }
        other => bail!(DocError::parse(format!(
            "unknown patch operation {:?}",
            other
        ))),
    }
}

fn required_value<'d, 'a>(op: &'d Doc<'a>) -> Result<&'d Doc<'a>> {
    match op.member("value") {
        Some(v) => Ok(v),
        None => bail!(DocError::parse("patch operation is missing \"value\"")),
    }
}

fn from_pointer<'d>(op: &'d Doc<'_>) -> Result<JsonPointer<'d>> {
    match op.member("from") {
        Some(Doc::Str(s)) => JsonPointer::parse(s),
        _ => bail!(DocError::parse("patch operation is missing \"from\"")),
    }
}

fn pointer_selector<'f>(ptr: &JsonPointer<'f>) -> FieldSelector<'f> {
    FieldSelector::Pointer(ptr.clone())
}

fn render_tokens(tokens: &[Cow<'_, str>]) -> String {
    let mut out = String::new();
    for token in tokens {
        out.push('/');
        for c in token.chars() {
            match c {
                '~' => out.push_str("~0"),
                '/' => out.push_str("~1"),
                c => out.push(c),
            }
        }
    }
    out
}

fn is_proper_prefix(prefix: &[Cow<'_, str>], path: &[Cow<'_, str>]) -> bool {
    path.len() > prefix.len() && path[..prefix.len()] == *prefix
}

// RFC 6902 add: the parent must already exist; objects upsert, arrays
// insert at the index or append via `-`.
fn patch_add<'a>(
    arena: &'a Arena,
    doc: &mut Doc<'a>,
    tokens: &[Cow<'_, str>],
    value: Doc<'a>,
) -> Result<()> {
    let Some((last, parents)) = tokens.split_last() else {
        *doc = value;
        return Ok(());
    };
    let parent = match walk_mut(doc, parents) {
        Some(p) => p,
        None => bail!(DocError::parse(format!(
            "add parent {:?} does not exist",
            render_tokens(parents)
        ))),
    };
    match parent {
        Doc::Obj(members) => {
            obj_upsert(members, arena.alloc_str(last), value);
            Ok(())
        }
        Doc::Arr(items) => {
            let len = items.len();
            let index = if last.as_ref() == "-" {
                len
            } else {
                match parse_index(last) {
                    Some(i) if i <= len => i,
                    _ => bail!(DocError::parse(format!(
                        "add index {:?} out of bounds (length {})",
                        last, len
                    ))),
                }
            };
            items.insert(index, value);
            Ok(())
        }
        _ => bail!(DocError::parse(format!(
            "add parent {:?} is not a container",
            render_tokens(parents)
        ))),
    }
}

fn patch_remove<'a>(doc: &mut Doc<'a>, tokens: &[Cow<'_, str>]) -> Result<Doc<'a>> {
    let Some((last, parents)) = tokens.split_last() else {
        bail!(DocError::parse("cannot remove the document root"));
    };
    let parent = match walk_mut(doc, parents) {
        Some(p) => p,
        None => bail!(DocError::parse(format!(
            "remove parent {:?} does not exist",
            render_tokens(parents)
        ))),
    };
    match parent {
        Doc::Obj(members) => match obj_remove(members, last) {
            Some(v) => Ok(v),
            None => bail!(DocError::parse(format!(
                "remove target key {:?} does not exist",
                last
            ))),
        },
        Doc::Arr(items) => match array_index(last, items.len()) {
            Some(i) => Ok(items.remove(i)),
            None => bail!(DocError::parse(format!(
                "remove index {:?} out of bounds (length {})",
                last,
                items.len()
            ))),
        },
        _ => bail!(DocError::parse(format!(
            "remove parent {:?} is not a container",
            render_tokens(parents)
        ))),
    }
}

fn walk_mut<'d, 'a>(doc: &'d mut Doc<'a>, tokens: &[Cow<'_, str>]) -> Option<&'d mut Doc<'a>> {
    let mut current = doc;
    for token in tokens {
        current = match current {
            Doc::Obj(_) => current.member_mut(token)?,
            Doc::Arr(items) => {
                let i = array_index(token, items.len())?;
                &mut items[i]
            }
            _ => return None,
        };
    }
    Some(current)
}
