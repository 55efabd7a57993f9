//! # Configuration Module
//!
//! Centralizes vellum's tuning constants. Interdependent values live next to
//! each other and are checked with compile-time assertions where a mismatch
//! would be a silent bug.

pub mod constants;
pub use constants::*;
