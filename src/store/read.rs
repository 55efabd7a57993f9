//! Batched document reads.

use bumpalo::collections::Vec as BumpVec;
use eyre::{bail, ensure, Result, WrapErr};
use tracing::trace;

use crate::batch::ReadPlan;
use crate::codec::{dump_any, parse_any};
use crate::error::DocError;
use crate::fields::{lookup, FieldSelector};
use crate::kv::KvStore;
use crate::memory::{Arena, Tape};
use crate::store::DocStore;
use crate::types::{Doc, DocId, Format};

impl<K: KvStore> DocStore<K> {
    /// Reads `ids` and serializes each result into `format`, one tape entry
    /// per input id in input order.
    ///
    /// `fields` optionally projects each entry to a member or JSON Pointer
    /// before serialization: a missing field serializes an encoded null, a
    /// missing document produces an absent tape entry. Textual JSON entries
    /// are NUL-terminated on the tape.
    ///
    /// Duplicate ids cost one KV read and one parse; every output slot is
    /// still served in caller order.
    pub fn docs_read<'a>(
        &self,
        arena: &'a Arena,
        mut txn: Option<&mut K::Transaction>,
        ids: &[DocId],
        fields: Option<&[Option<&str>]>,
        format: Format,
    ) -> Result<Tape<'a>> {
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
        if format.is_patch() {
            bail!(DocError::unsupported(format!(
                "{} cannot be used to read documents",
                format.name()
            )));
        }

        let mut out = Tape::new_in(arena);
        if ids.is_empty() {
            return Ok(out);
        }

        // Whole documents in the internal format forward straight to the
        // KV engine; no parsing, no re-encoding.
        if fields.is_none() && format == Format::INTERNAL {
            self.kv().read(txn.as_deref_mut(), ids, &mut out)?;
            return Ok(out);
        }

        let plan = ReadPlan::new_in(arena, ids);
        trace!(
            docs = ids.len(),
            unique = plan.kv_ids().len(),
            deduped = plan.is_deduped(),
            "planned batched read"
        );

        let mut fetched = Tape::new_in(arena);
        self.kv().read(txn.as_deref_mut(), plan.kv_ids(), &mut fetched)?;
        let fetched = fetched.view();

        let mut parsed = BumpVec::with_capacity_in(plan.kv_ids().len(), arena.bump());
        for slot in 0..plan.kv_ids().len() {
            parsed.push(match fetched.get(slot) {
                Some(bytes) if !bytes.is_empty() => parse_any(arena, bytes, Format::INTERNAL)
                    .wrap_err("stored document is not valid internal binary")?,
                _ => Doc::Discarded,
            });
        }

        for i in 0..ids.len() {
            let doc = &parsed[plan.slot(i)];
            if doc.is_discarded() {
                out.push_absent()?;
                continue;
            }
            let selector = FieldSelector::parse(fields.and_then(|f| f[i]))?;
            out.begin();
            match lookup(doc, &selector) {
                Some(subtree) => dump_any(subtree, format, &mut out)?,
                None => dump_any(&Doc::Null, format, &mut out)?,
            }
            if format == Format::Json {
                out.put(0);
            }
            out.end(true)?;
        }
        Ok(out)
    }
}
