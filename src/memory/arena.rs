//! Scoped bump allocator with an optional byte budget.
//!
//! Wraps `bumpalo::Bump`. The budget is a soft ceiling checked at coarse
//! boundaries (tape entries, column allocation); it exists so a caller can
//! bound the damage of a pathological batch rather than account for every
//! byte. Raw allocation beyond the budget check follows bumpalo's semantics.

use bumpalo::Bump;
use eyre::Result;

use crate::error::DocError;

pub struct Arena {
    bump: Bump,
    limit: Option<usize>,
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena").field("limit", &self.limit).finish()
    }
}

impl Arena {
    pub fn new() -> Self {
        Self {
            bump: Bump::new(),
            limit: None,
        }
    }

    /// An arena that refuses to grow past `limit` bytes at charge points.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bump: Bump::new(),
            limit: Some(limit),
        }
    }

    pub fn bump(&self) -> &Bump {
        &self.bump
    }

    /// Releases every allocation made since construction or the last reset.
    /// Views handed out from previous calls must be gone by now; the borrow
    /// checker enforces this because they all borrow `self`.
    pub fn reset(&mut self) {
        self.bump.reset();
    }

    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }

    /// Checks that `additional` more bytes fit the configured budget.
    pub fn charge(&self, additional: usize) -> Result<()> {
        if let Some(limit) = self.limit {
            let used = self.bump.allocated_bytes();
            if used.saturating_add(additional) > limit {
                eyre::bail!(DocError::out_of_memory(format!(
                    "arena budget exhausted: {} bytes in use, {} requested, limit {}",
                    used, additional, limit
                )));
            }
        }
        Ok(())
    }

    pub fn alloc_str<'a>(&'a self, s: &str) -> &'a str {
        self.bump.alloc_str(s)
    }

    pub fn alloc_bytes<'a>(&'a self, bytes: &[u8]) -> &'a [u8] {
        self.bump.alloc_slice_copy(bytes)
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DocError, ErrorKind};

    #[test]
    fn charge_within_limit() {
        let arena = Arena::with_limit(1 << 20);
        assert!(arena.charge(1024).is_ok());
    }

    #[test]
    fn charge_over_limit_reports_oom() {
        let arena = Arena::with_limit(64);
        let err = arena.charge(1 << 20).unwrap_err();
        assert_eq!(DocError::kind_of(&err), Some(ErrorKind::OutOfMemory));
    }

    #[test]
    fn reset_releases_allocations() {
        let mut arena = Arena::new();
        arena.alloc_bytes(&[0u8; 4096]);
        let before = arena.allocated_bytes();
        assert!(before >= 4096);
        arena.reset();
        assert!(arena.allocated_bytes() < before);
    }
}
