//! Common types and utilities shared across formats.
//!
//! Byte-order aware readers and the crate-wide error type live here so
//! that every container decoder reads and reports the same way.

// Submodule declarations
pub mod binary;
pub mod error;

// Re-exports for convenience
pub use binary::{BinaryError, BinaryResult, Endian};
pub use error::{Error, Result};
