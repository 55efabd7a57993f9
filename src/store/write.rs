//! Batched document writes: passthrough, whole-document replace, and
//! read-modify-write with patch semantics.

use bumpalo::collections::Vec as BumpVec;
use eyre::{ensure, Result, WrapErr};
use tracing::debug;

use crate::batch::ReadPlan;
use crate::codec::{dump_any, parse_any};
use crate::error::DocError;
use crate::fields::{apply_patch, assign, lookup_mut, merge_patch, remove_at, FieldSelector};
use crate::kv::KvStore;
use crate::memory::{Arena, Tape};
use crate::store::DocStore;
use crate::types::{Doc, DocId, Format};

impl<K: KvStore> DocStore<K> {
    /// Writes one payload per id. `payloads[i] == None` deletes: the whole
    /// document when no field is addressed, otherwise the addressed
    /// subtree.
    ///
    /// Without `fields`, payloads replace whole documents; the internal
    /// format additionally skips parsing entirely and streams to the KV
    /// engine. With `fields`, documents are fetched (once per unique id),
    /// patched per entry in caller order - `Replace` semantics for plain
    /// formats, RFC 6902 for `JsonPatch`, RFC 7396 for `JsonMergePatch` -
    /// and written back whole, one write per unique id.
    ///
    /// The first failing entry aborts the batch before anything reaches
    /// the KV engine.
    pub fn docs_write(
        &self,
        arena: &Arena,
        mut txn: Option<&mut K::Transaction>,
        ids: &[DocId],
        fields: Option<&[Option<&str>]>,
        format: Format,
        payloads: &[Option<&[u8]>],
    ) -> Result<()> {
        ensure!(
            payloads.len() == ids.len(),
            DocError::argument(format!(
                "{} payloads for {} ids",
                payloads.len(),
                ids.len()
            ))
        );
        if let Some(fields) = fields {
            ensure!(
                fields.len() == ids.len(),
                DocError::argument(format!(
                    "{} field selectors for {} ids",
                    fields.len(),
                    ids.len()
                ))
            );
        }
        if ids.is_empty() {
            return Ok(());
        }

        match fields {
            None if format == Format::INTERNAL => {
                self.write_passthrough(arena, txn.as_deref_mut(), ids, payloads)
            }
            None => self.replace_docs(arena, txn.as_deref_mut(), ids, format, payloads),
            Some(fields) => {
                self.read_modify_write(arena, txn, ids, fields, format, payloads)
            }
        }
    }

    // Internal-format whole documents go to the engine byte-for-byte.
    fn write_passthrough(
        &self,
        arena: &Arena,
        txn: Option<&mut K::Transaction>,
        ids: &[DocId],
        payloads: &[Option<&[u8]>],
    ) -> Result<()> {
        let mut tape = Tape::new_in(arena);
        for payload in payloads {
            match payload {
                Some(bytes) => tape.push(bytes, true)?,
                None => tape.push_absent()?,
            }
        }
        debug!(docs = ids.len(), "write passthrough");
        self.kv().write(txn, ids, &tape.view())
    }

    fn replace_docs(
        &self,
        arena: &Arena,
        txn: Option<&mut K::Transaction>,
        ids: &[DocId],
        format: Format,
        payloads: &[Option<&[u8]>],
    ) -> Result<()> {
        let mut tape = Tape::new_in(arena);
        for (i, payload) in payloads.iter().enumerate() {
            match payload {
                Some(bytes) => {
                    let doc = parse_any(arena, bytes, format)
                        .wrap_err_with(|| format!("payload {} does not parse", i))?;
                    tape.begin();
                    dump_any(&doc, Format::INTERNAL, &mut tape)?;
                    tape.end(true)?;
                }
                None => tape.push_absent()?,
            }
        }
        debug!(docs = ids.len(), format = format.name(), "replace documents");
        self.kv().write(txn, ids, &tape.view())
    }

    fn read_modify_write(
        &self,
        arena: &Arena,
        mut txn: Option<&mut K::Transaction>,
        ids: &[DocId],
        fields: &[Option<&str>],
        format: Format,
        payloads: &[Option<&[u8]>],
    ) -> Result<()> {
        let plan = ReadPlan::new_in(arena, ids);

        let mut fetched = Tape::new_in(arena);
        self.kv()
            .read(txn.as_deref_mut(), plan.kv_ids(), &mut fetched)?;
        let fetched = fetched.view();

        // one parsed (or absent) document per unique id
        let mut docs: BumpVec<'_, Option<Doc<'_>>> =
            BumpVec::with_capacity_in(plan.kv_ids().len(), arena.bump());
        for slot in 0..plan.kv_ids().len() {
            docs.push(match fetched.get(slot) {
                Some(bytes) if !bytes.is_empty() => Some(
                    parse_any(arena, bytes, Format::INTERNAL)
                        .wrap_err("stored document is not valid internal binary")?,
                ),
                _ => None,
            });
        }

        for i in 0..ids.len() {
            let selector = FieldSelector::parse(fields[i])?;
            apply_update(
                arena,
                &mut docs[plan.slot(i)],
                &selector,
                format,
                payloads[i],
            )
            .wrap_err_with(|| format!("update {} failed", i))?;
        }

        let mut tape = Tape::new_in(arena);
        for doc in docs.iter() {
            match doc {
                Some(doc) => {
                    tape.begin();
                    dump_any(doc, Format::INTERNAL, &mut tape)?;
                    tape.end(true)?;
                }
                None => tape.push_absent()?,
            }
        }
        debug!(
            docs = ids.len(),
            unique = plan.kv_ids().len(),
            format = format.name(),
            "read-modify-write"
        );
        self.kv().write(txn.as_deref_mut(), plan.kv_ids(), &tape.view())
    }
}

// One update against one (possibly absent) document. Patch modes are
// silent no-ops when the addressed field does not exist, matching RFC
// 6902/7396 expectations for missing targets; Replace creates the path.
fn apply_update<'a>(
    arena: &'a Arena,
    slot: &mut Option<Doc<'a>>,
    selector: &FieldSelector<'_>,
    format: Format,
    payload: Option<&[u8]>,
) -> Result<()> {
    let Some(payload) = payload else {
        match slot {
            Some(doc) if !selector.is_whole() => {
                remove_at(doc, selector);
            }
            _ => {
                if selector.is_whole() {
                    *slot = None;
                }
            }
        }
        return Ok(());
    };

    let value = parse_any(arena, payload, format)?;

    match format {
        Format::JsonPatch => {
            let Some(doc) = slot else { return Ok(()) };
            let Some(target) = lookup_mut(doc, selector) else {
                return Ok(());
            };
            apply_patch(arena, target, &value)
        }
        Format::JsonMergePatch => {
            if selector.is_whole() {
                let mut base = slot.take().unwrap_or_else(|| Doc::object_in(arena));
                merge_patch(arena, &mut base, &value);
                *slot = Some(base);
                return Ok(());
            }
            let Some(doc) = slot else { return Ok(()) };
            let Some(target) = lookup_mut(doc, selector) else {
                return Ok(());
            };
            merge_patch(arena, target, &value);
            Ok(())
        }
        _ => {
            let doc = slot.get_or_insert_with(|| Doc::object_in(arena));
            assign(arena, doc, selector, value)
        }
    }
}
