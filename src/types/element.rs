//! Cell types for columnar gather.

/// Target element type of one gathered column.
///
/// Fixed-width types produce a packed little-endian scalar column; `Str` and
/// `Bin` produce `(offset, length)` pairs into the call's joined byte tape;
/// `Null` produces no payload at all (the Arrow null-array shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F16,
    F32,
    F64,
    Uuid,
    Str,
    Bin,
    Null,
}

/// Coarse type class used to decide the `conversion` bit: a cell counts as
/// converted when its source class differs from the target class, never when
/// only the width differs (an `i64` gathered into an `i32` column is a cast,
/// not a conversion).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementClass {
    Bool,
    Integer,
    Float,
    Uuid,
    Str,
    Bin,
    Null,
}

impl ElementType {
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            ElementType::Bool | ElementType::I8 | ElementType::U8 => Some(1),
            ElementType::I16 | ElementType::U16 | ElementType::F16 => Some(2),
            ElementType::I32 | ElementType::U32 | ElementType::F32 => Some(4),
            ElementType::I64 | ElementType::U64 | ElementType::F64 => Some(8),
            ElementType::Uuid => Some(16),
            ElementType::Str | ElementType::Bin => None,
            ElementType::Null => Some(0),
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, ElementType::Str | ElementType::Bin)
    }

    pub fn class(&self) -> ElementClass {
        match self {
            ElementType::Bool => ElementClass::Bool,
            ElementType::I8
            | ElementType::I16
            | ElementType::I32
            | ElementType::I64
            | ElementType::U8
            | ElementType::U16
            | ElementType::U32
            | ElementType::U64 => ElementClass::Integer,
            ElementType::F16 | ElementType::F32 | ElementType::F64 => ElementClass::Float,
            ElementType::Uuid => ElementClass::Uuid,
            ElementType::Str => ElementClass::Str,
            ElementType::Bin => ElementClass::Bin,
            ElementType::Null => ElementClass::Null,
        }
    }
}
