//! # Columnar Gather
//!
//! Projects N documents x M typed fields into Arrow-compatible buffers:
//!
//! ```text
//! per field:  validity [N bits] + conversion [N bits] + collision [N bits]
//!             + scalars [N * width]            (fixed-width types)
//!             | offsets [N] + lengths [N]      (str/bin, into one shared
//!                                               joined byte tape)
//! ```
//!
//! Cell semantics, per (document, field):
//!
//! - missing field or source null: all three bits stay clear
//! - source object/array/discarded: `collision` set, cell invalid
//! - binary of exactly the target width: copied verbatim, no conversion
//! - string to scalar: full-string lexical parse (integer, float, literal
//!   `true`/`false`, RFC 4122 text for uuid); a partial match is a
//!   collision, a full match a conversion
//! - numeric/bool cross-class casts succeed with `conversion` set; casts
//!   within the integer class (e.g. i64 document value into an i32 column)
//!   are width changes, not conversions
//! - string cells are written NUL-terminated and the terminator is counted
//!   in the stored length
//!
//! Bits are ordered: `conversion`/`collision` first, `validity` last, so a
//! reader that observes validity always finds the payload in place.

use bumpalo::collections::Vec as BumpVec;
use eyre::{ensure, Result, WrapErr};
use half::f16;
use tracing::trace;
use uuid::Uuid;

use crate::batch::ReadPlan;
use crate::codec::parse_any;
use crate::error::DocError;
use crate::fields::{lookup, FieldSelector};
use crate::kv::KvStore;
use crate::memory::{Arena, Tape};
use crate::store::DocStore;
use crate::types::{Doc, DocId, ElementClass, ElementType, Format};

/// Result of [`DocStore::docs_gather`].
#[derive(Debug)]
pub struct Gather<'a> {
    docs: usize,
    columns: &'a [GatherColumn<'a>],
    joined: &'a [u8],
}

#[derive(Debug)]
pub struct GatherColumn<'a> {
    ty: ElementType,
    validity: &'a [u8],
    conversion: &'a [u8],
    collision: &'a [u8],
    data: ColumnData<'a>,
}

#[derive(Debug)]
pub enum ColumnData<'a> {
    /// Packed little-endian scalars, `fixed_width()` bytes per row.
    Scalars(&'a [u8]),
    /// Per-row `(offset, length)` into the call's joined byte tape.
    Varlen {
        offsets: &'a [u64],
        lengths: &'a [u32],
    },
    /// `ElementType::Null` columns carry no payload.
    Empty,
}

impl<'a> Gather<'a> {
    pub fn doc_count(&self) -> usize {
        self.docs
    }

    pub fn columns(&self) -> &'a [GatherColumn<'a>] {
        self.columns
    }

    pub fn joined(&self) -> &'a [u8] {
        self.joined
    }

    /// Bytes of a variable-length cell (string cells include their NUL).
    pub fn cell_bytes(&self, column: usize, row: usize) -> Option<&'a [u8]> {
        let col = &self.columns[column];
        if !col.is_valid(row) {
            return None;
        }
        match col.data {
            ColumnData::Varlen { offsets, lengths } => {
                let start = offsets[row] as usize;
                Some(&self.joined[start..start + lengths[row] as usize])
            }
            _ => None,
        }
    }
}

impl<'a> GatherColumn<'a> {
    pub fn element_type(&self) -> ElementType {
        self.ty
    }

    pub fn validity(&self) -> &'a [u8] {
        self.validity
    }

    pub fn conversion(&self) -> &'a [u8] {
        self.conversion
    }

    pub fn collision(&self) -> &'a [u8] {
        self.collision
    }

    pub fn data(&self) -> &ColumnData<'a> {
        &self.data
    }

    pub fn is_valid(&self, row: usize) -> bool {
        get_bit(self.validity, row)
    }

    pub fn converted(&self, row: usize) -> bool {
        get_bit(self.conversion, row)
    }

    pub fn collided(&self, row: usize) -> bool {
        get_bit(self.collision, row)
    }

    /// The packed bytes of a fixed-width cell, regardless of validity.
    pub fn scalar_bytes(&self, row: usize) -> Option<&'a [u8]> {
        let width = self.ty.fixed_width()?;
        if width == 0 {
            return None;
        }
        match self.data {
            ColumnData::Scalars(bytes) => Some(&bytes[row * width..(row + 1) * width]),
            _ => None,
        }
    }
}

fn get_bit(bits: &[u8], index: usize) -> bool {
    bits[index / 8] & (1 << (index % 8)) != 0
}

fn set_bit(bits: &mut [u8], index: usize) {
    bits[index / 8] |= 1 << (index % 8);
}

struct ColumnBuild<'a> {
    ty: ElementType,
    width: usize,
    validity: &'a mut [u8],
    conversion: &'a mut [u8],
    collision: &'a mut [u8],
    scalars: &'a mut [u8],
    offsets: &'a mut [u64],
    lengths: &'a mut [u32],
}

impl<K: KvStore> DocStore<K> {
    /// Gathers `fields[j]` of every document in `ids` as a typed column,
    /// coercing cell values to `types[j]` where a lexical or numeric
    /// conversion exists.
    pub fn docs_gather<'a>(
        &self,
        arena: &'a Arena,
        mut txn: Option<&mut K::Transaction>,
        ids: &[DocId],
        fields: &[&str],
        types: &[ElementType],
    ) -> Result<Gather<'a>> {
        ensure!(
            fields.len() == types.len(),
            DocError::argument(format!(
                "{} fields but {} element types",
                fields.len(),
                types.len()
            ))
        );
        let mut selectors = Vec::with_capacity(fields.len());
        for field in fields.iter().copied() {
            ensure!(
                !field.is_empty(),
                DocError::argument("gather requires a non-empty field selector per column")
            );
            selectors.push(FieldSelector::parse(Some(field))?);
        }

        let plan = ReadPlan::new_in(arena, ids);
        let mut fetched = Tape::new_in(arena);
        self.kv()
            .read(txn.as_deref_mut(), plan.kv_ids(), &mut fetched)?;
        let fetched = fetched.view();

        let mut parsed = BumpVec::with_capacity_in(plan.kv_ids().len(), arena.bump());
        for slot in 0..plan.kv_ids().len() {
            parsed.push(match fetched.get(slot) {
                Some(bytes) if !bytes.is_empty() => parse_any(arena, bytes, Format::INTERNAL)
                    .wrap_err("stored document is not valid internal binary")?,
                _ => Doc::Discarded,
            });
        }

        let docs = ids.len();
        let bitmap_len = (docs + 7) / 8;
        let mut builds = Vec::with_capacity(types.len());
        for ty in types {
            let width = ty.fixed_width().unwrap_or(0);
            // varlen columns cost 12 bytes/row of offsets + lengths
            arena.charge(3 * bitmap_len + docs * width.max(12))?;
            let bump = arena.bump();
            builds.push(ColumnBuild {
                ty: *ty,
                width,
                validity: bump.alloc_slice_fill_copy(bitmap_len, 0u8),
                conversion: bump.alloc_slice_fill_copy(bitmap_len, 0u8),
                collision: bump.alloc_slice_fill_copy(bitmap_len, 0u8),
                scalars: bump.alloc_slice_fill_copy(docs * width, 0u8),
                offsets: if ty.is_variable() {
                    bump.alloc_slice_fill_copy(docs, 0u64)
                } else {
                    bump.alloc_slice_fill_copy(0, 0u64)
                },
                lengths: if ty.is_variable() {
                    bump.alloc_slice_fill_copy(docs, 0u32)
                } else {
                    bump.alloc_slice_fill_copy(0, 0u32)
                },
            });
        }

        let mut joined: BumpVec<'a, u8> = BumpVec::new_in(arena.bump());
        let discarded = Doc::Discarded;
        for row in 0..docs {
            let doc = &parsed[plan.slot(row)];
            for (column, build) in builds.iter_mut().enumerate() {
                // an unreadable document collides in every column
                let cell = if doc.is_discarded() {
                    Some(&discarded)
                } else {
                    lookup(doc, &selectors[column])
                };
                fill_cell(build, row, cell, &mut joined);
            }
        }

        trace!(docs, fields = types.len(), "gather complete");
        let mut columns = BumpVec::with_capacity_in(builds.len(), arena.bump());
        for build in builds {
            let data = match build.ty {
                ElementType::Null => ColumnData::Empty,
                ty if ty.is_variable() => ColumnData::Varlen {
                    offsets: build.offsets,
                    lengths: build.lengths,
                },
                _ => ColumnData::Scalars(build.scalars),
            };
            columns.push(GatherColumn {
                ty: build.ty,
                validity: build.validity,
                conversion: build.conversion,
                collision: build.collision,
                data,
            });
        }

        Ok(Gather {
            docs,
            columns: columns.into_bump_slice(),
            joined: joined.into_bump_slice(),
        })
    }
}

// A numeric source cell, pre-classified.
#[derive(Clone, Copy)]
enum Num {
    B(bool),
    I(i64),
    U(u64),
    F(f64),
}

impl Num {
    fn class(&self) -> ElementClass {
        match self {
            Num::B(_) => ElementClass::Bool,
            Num::I(_) | Num::U(_) => ElementClass::Integer,
            Num::F(_) => ElementClass::Float,
        }
    }

    fn as_i64(&self) -> i64 {
        match *self {
            Num::B(b) => b as i64,
            Num::I(v) => v,
            Num::U(v) => v as i64,
            Num::F(v) => v as i64,
        }
    }

    fn as_u64(&self) -> u64 {
        match *self {
            Num::B(b) => b as u64,
            Num::I(v) => v as u64,
            Num::U(v) => v,
            Num::F(v) => v as u64,
        }
    }

    fn as_f64(&self) -> f64 {
        match *self {
            Num::B(b) => b as u8 as f64,
            Num::I(v) => v as f64,
            Num::U(v) => v as f64,
            Num::F(v) => v,
        }
    }

    fn truthy(&self) -> bool {
        match *self {
            Num::B(b) => b,
            Num::I(v) => v != 0,
            Num::U(v) => v != 0,
            Num::F(v) => v != 0.0,
        }
    }
}

fn fill_cell<'a>(
    build: &mut ColumnBuild<'_>,
    row: usize,
    cell: Option<&Doc<'_>>,
    joined: &mut BumpVec<'a, u8>,
) {
    // absent and null cells leave every bit clear
    let Some(value) = cell else { return };
    if value.is_null() || build.ty == ElementType::Null {
        return;
    }

    match value {
        Doc::Obj(_) | Doc::Arr(_) | Doc::Discarded => {
            set_bit(build.collision, row);
        }
        Doc::Bool(b) => fill_from_num(build, row, Num::B(*b), joined),
        Doc::Int(v) => fill_from_num(build, row, Num::I(*v), joined),
        Doc::Uint(v) => fill_from_num(build, row, Num::U(*v), joined),
        Doc::Float(v) => fill_from_num(build, row, Num::F(*v), joined),
        Doc::Str(s) => fill_from_str(build, row, s, joined),
        Doc::Bin(b) => fill_from_bin(build, row, b, joined),
        Doc::Null => {}
    }
}

fn fill_from_num<'a>(
    build: &mut ColumnBuild<'_>,
    row: usize,
    num: Num,
    joined: &mut BumpVec<'a, u8>,
) {
    match build.ty {
        ElementType::Str => {
            let text = match num {
                Num::B(true) => "true".to_string(),
                Num::B(false) => "false".to_string(),
                Num::I(v) => v.to_string(),
                Num::U(v) => v.to_string(),
                Num::F(v) => v.to_string(),
            };
            set_bit(build.conversion, row);
            store_varlen(build, row, text.as_bytes(), true, joined);
            set_bit(build.validity, row);
        }
        ElementType::Bin | ElementType::Uuid => {
            set_bit(build.collision, row);
        }
        _ => {
            if num.class() != build.ty.class() {
                set_bit(build.conversion, row);
            }
            store_num(build, row, num);
            set_bit(build.validity, row);
        }
    }
}

fn fill_from_str<'a>(
    build: &mut ColumnBuild<'_>,
    row: usize,
    s: &str,
    joined: &mut BumpVec<'a, u8>,
) {
    match build.ty {
        ElementType::Str => {
            store_varlen(build, row, s.as_bytes(), true, joined);
            set_bit(build.validity, row);
        }
        ElementType::Bin => {
            set_bit(build.conversion, row);
            store_varlen(build, row, s.as_bytes(), false, joined);
            set_bit(build.validity, row);
        }
        ElementType::Uuid => match Uuid::parse_str(s) {
            Ok(uuid) => {
                set_bit(build.conversion, row);
                let w = build.width;
                build.scalars[row * w..(row + 1) * w].copy_from_slice(uuid.as_bytes());
                set_bit(build.validity, row);
            }
            Err(_) => set_bit(build.collision, row),
        },
        ElementType::Bool => match s {
            "true" => {
                set_bit(build.conversion, row);
                store_num(build, row, Num::B(true));
                set_bit(build.validity, row);
            }
            "false" => {
                set_bit(build.conversion, row);
                store_num(build, row, Num::B(false));
                set_bit(build.validity, row);
            }
            _ => set_bit(build.collision, row),
        },
        _ => match lexical_number(s) {
            Some(num) => {
                set_bit(build.conversion, row);
                store_num(build, row, num);
                set_bit(build.validity, row);
            }
            None => set_bit(build.collision, row),
        },
    }
}

// full-string match required: "42" parses, "42x" and "" collide
fn lexical_number(s: &str) -> Option<Num> {
    if let Ok(v) = s.parse::<i64>() {
        return Some(Num::I(v));
    }
    if let Ok(v) = s.parse::<u64>() {
        return Some(Num::U(v));
    }
    if let Ok(v) = s.parse::<f64>() {
        return Some(Num::F(v));
    }
    None
}

fn fill_from_bin<'a>(
    build: &mut ColumnBuild<'_>,
    row: usize,
    bytes: &[u8],
    joined: &mut BumpVec<'a, u8>,
) {
    match build.ty {
        ElementType::Bin => {
            store_varlen(build, row, bytes, false, joined);
            set_bit(build.validity, row);
        }
        ElementType::Str => {
            set_bit(build.collision, row);
        }
        _ => {
            // fixed-width targets accept exactly-sized raw bytes
            if bytes.len() == build.width {
                let w = build.width;
                build.scalars[row * w..(row + 1) * w].copy_from_slice(bytes);
                set_bit(build.validity, row);
            } else {
                set_bit(build.collision, row);
            }
        }
    }
}

fn store_varlen<'a>(
    build: &mut ColumnBuild<'_>,
    row: usize,
    bytes: &[u8],
    terminate: bool,
    joined: &mut BumpVec<'a, u8>,
) {
    build.offsets[row] = joined.len() as u64;
    joined.extend_from_slice_copy(bytes);
    let mut len = bytes.len();
    if terminate {
        joined.push(0);
        len += 1;
    }
    build.lengths[row] = len as u32;
}

fn store_num(build: &mut ColumnBuild<'_>, row: usize, num: Num) {
    let w = build.width;
    let out = &mut build.scalars[row * w..(row + 1) * w];
    match build.ty {
        ElementType::Bool => out[0] = num.truthy() as u8,
        ElementType::I8 => out.copy_from_slice(&(num.as_i64() as i8).to_le_bytes()),
        ElementType::I16 => out.copy_from_slice(&(num.as_i64() as i16).to_le_bytes()),
        ElementType::I32 => out.copy_from_slice(&(num.as_i64() as i32).to_le_bytes()),
        ElementType::I64 => out.copy_from_slice(&num.as_i64().to_le_bytes()),
        ElementType::U8 => out.copy_from_slice(&(num.as_u64() as u8).to_le_bytes()),
        ElementType::U16 => out.copy_from_slice(&(num.as_u64() as u16).to_le_bytes()),
        ElementType::U32 => out.copy_from_slice(&(num.as_u64() as u32).to_le_bytes()),
        ElementType::U64 => out.copy_from_slice(&num.as_u64().to_le_bytes()),
        ElementType::F16 => {
            out.copy_from_slice(&f16::from_f64(num.as_f64()).to_bits().to_le_bytes())
        }
        ElementType::F32 => out.copy_from_slice(&(num.as_f64() as f32).to_le_bytes()),
        ElementType::F64 => out.copy_from_slice(&num.as_f64().to_le_bytes()),
        ElementType::Uuid | ElementType::Str | ElementType::Bin | ElementType::Null => {
            unreachable!("store_num is only called for numeric targets")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Arena;

    fn build_one<'a>(arena: &'a Arena, ty: ElementType, rows: usize) -> ColumnBuild<'a> {
        let width = ty.fixed_width().unwrap_or(0);
        let bitmap_len = (rows + 7) / 8;
        let bump = arena.bump();
        ColumnBuild {
            ty,
            width,
            validity: bump.alloc_slice_fill_copy(bitmap_len, 0u8),
            conversion: bump.alloc_slice_fill_copy(bitmap_len, 0u8),
            collision: bump.alloc_slice_fill_copy(bitmap_len, 0u8),
            scalars: bump.alloc_slice_fill_copy(rows * width, 0u8),
            offsets: bump.alloc_slice_fill_copy(rows, 0u64),
            lengths: bump.alloc_slice_fill_copy(rows, 0u32),
        }
    }

    #[test]
    fn integer_width_changes_are_not_conversions() {
        let arena = Arena::new();
        let mut build = build_one(&arena, ElementType::I32, 1);
        let mut joined = BumpVec::new_in(arena.bump());
        fill_cell(&mut build, 0, Some(&Doc::Int(42)), &mut joined);
        assert!(get_bit(build.validity, 0));
        assert!(!get_bit(build.conversion, 0));
        assert_eq!(&build.scalars[..4], &42i32.to_le_bytes());
    }

    #[test]
    fn string_to_integer_is_a_conversion() {
        let arena = Arena::new();
        let mut build = build_one(&arena, ElementType::I32, 2);
        let mut joined = BumpVec::new_in(arena.bump());
        fill_cell(&mut build, 0, Some(&Doc::Str("42")), &mut joined);
        fill_cell(&mut build, 1, Some(&Doc::Str("42x")), &mut joined);
        assert!(get_bit(build.validity, 0));
        assert!(get_bit(build.conversion, 0));
        assert!(!get_bit(build.collision, 0));
        assert!(!get_bit(build.validity, 1));
        assert!(get_bit(build.collision, 1));
    }

    #[test]
    fn bool_to_string_is_terminated_and_counted() {
        let arena = Arena::new();
        let mut build = build_one(&arena, ElementType::Str, 2);
        let mut joined = BumpVec::new_in(arena.bump());
        fill_cell(&mut build, 0, Some(&Doc::Bool(true)), &mut joined);
        fill_cell(&mut build, 1, Some(&Doc::Bool(false)), &mut joined);
        assert_eq!(build.lengths[0], 5);
        assert_eq!(build.lengths[1], 6);
        assert_eq!(&joined[..5], b"true\0");
        assert!(get_bit(build.conversion, 0));
    }

    #[test]
    fn exact_width_binary_copies_without_conversion() {
        let arena = Arena::new();
        let mut build = build_one(&arena, ElementType::U32, 2);
        let mut joined = BumpVec::new_in(arena.bump());
        fill_cell(&mut build, 0, Some(&Doc::Bin(&[1, 0, 0, 0])), &mut joined);
        fill_cell(&mut build, 1, Some(&Doc::Bin(&[1, 2])), &mut joined);
        assert!(get_bit(build.validity, 0));
        assert!(!get_bit(build.conversion, 0));
        assert_eq!(&build.scalars[..4], &1u32.to_le_bytes());
        assert!(get_bit(build.collision, 1));
    }

    #[test]
    fn uuid_from_text() {
        let arena = Arena::new();
        let mut build = build_one(&arena, ElementType::Uuid, 2);
        let mut joined = BumpVec::new_in(arena.bump());
        fill_cell(
            &mut build,
            0,
            Some(&Doc::Str("67e55044-10b1-426f-9247-bb680e5fe0c8")),
            &mut joined,
        );
        fill_cell(&mut build, 1, Some(&Doc::Str("not-a-uuid")), &mut joined);
        assert!(get_bit(build.validity, 0));
        assert!(get_bit(build.conversion, 0));
        assert!(get_bit(build.collision, 1));
    }

    #[test]
    fn containers_collide() {
        let arena = Arena::new();
        let mut build = build_one(&arena, ElementType::I64, 1);
        let mut joined = BumpVec::new_in(arena.bump());
        let doc = crate::codec::json::parse(&arena, b"{}").unwrap();
        fill_cell(&mut build, 0, Some(&doc), &mut joined);
        assert!(!get_bit(build.validity, 0));
        assert!(get_bit(build.collision, 0));
    }

    #[test]
    fn null_and_missing_stay_zeroed() {
        let arena = Arena::new();
        let mut build = build_one(&arena, ElementType::F64, 2);
        let mut joined = BumpVec::new_in(arena.bump());
        fill_cell(&mut build, 0, Some(&Doc::Null), &mut joined);
        fill_cell(&mut build, 1, None, &mut joined);
        for row in 0..2 {
            assert!(!get_bit(build.validity, row));
            assert!(!get_bit(build.conversion, row));
            assert!(!get_bit(build.collision, row));
        }
    }

    #[test]
    fn half_precision_values() {
        let arena = Arena::new();
        let mut build = build_one(&arena, ElementType::F16, 1);
        let mut joined = BumpVec::new_in(arena.bump());
        fill_cell(&mut build, 0, Some(&Doc::Float(1.5)), &mut joined);
        let bits = u16::from_le_bytes([build.scalars[0], build.scalars[1]]);
        assert_eq!(f16::from_bits(bits).to_f64(), 1.5);
        assert!(!get_bit(build.conversion, 0));
    }
}
