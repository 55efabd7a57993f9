//! # Error Classification
//!
//! All fallible operations in vellum return `eyre::Result`. Errors that have
//! a meaningful class for callers carry a [`DocError`] at the bottom of the
//! report chain; everything else is a plain message.
//!
//! ## Error Kinds
//!
//! | Kind | Raised when |
//! |------|-------------|
//! | `Parse` | input bytes cannot be decoded in the declared format, or a stored blob is corrupt |
//! | `UnsupportedFormat` | the format cannot express the value (e.g. raw dump of an object) |
//! | `ArgumentInvalid` | malformed JSON Pointer, mismatched per-entry array lengths |
//! | `OutOfMemory` | the call arena's byte budget is exhausted |
//! | `UnderlyingKv` | the key-value engine failed (including transaction conflicts) |
//! | `Uninitialized` | a required handle was never set up |
//!
//! Within a batched call the first error wins: remaining entries are skipped
//! and no partial output is returned.
//!
//! ## Recovering the kind
//!
//! ```ignore
//! match vellum::DocError::kind_of(&report) {
//!     Some(vellum::ErrorKind::Parse) => { /* bad payload */ }
//!     _ => { /* infrastructure problem */ }
//! }
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    UnsupportedFormat,
    ArgumentInvalid,
    OutOfMemory,
    UnderlyingKv,
    Uninitialized,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::UnsupportedFormat => "unsupported format",
            ErrorKind::ArgumentInvalid => "invalid argument",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::UnderlyingKv => "key-value engine",
            ErrorKind::Uninitialized => "uninitialized",
        }
    }
}

#[derive(Debug)]
pub struct DocError {
    pub kind: ErrorKind,
    pub message: String,
}

impl DocError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedFormat, message)
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArgumentInvalid, message)
    }

    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfMemory, message)
    }

    pub fn kv(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnderlyingKv, message)
    }

    pub fn uninitialized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Uninitialized, message)
    }

    /// Extracts the error kind from an `eyre::Report`, looking through any
    /// context layers added along the way.
    pub fn kind_of(report: &eyre::Report) -> Option<ErrorKind> {
        report.downcast_ref::<DocError>().map(|e| e.kind)
    }
}

impl fmt::Display for DocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

impl std::error::Error for DocError {}
