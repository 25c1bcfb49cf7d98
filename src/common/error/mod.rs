//! Unified error types for macdoc.
//!
//! This module provides a unified error type that wraps the per-format
//! decoder errors, presenting a consistent API to users.

// Submodule declarations
pub mod conversions;
pub mod types;

// Re-exports
pub use types::{Error, Result};
