//! Unified error types for the macdoc library.
//!
//! Format decoders keep their own error enums; this type is what the
//! crate-level convenience functions hand back to callers.
use thiserror::Error;

/// Main error type for macdoc operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// File is not a recognized container
    #[error("Not a recognized document container")]
    NotSupportedFile,

    /// Corrupted or malformed file
    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    /// Zone or cluster not found
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type for macdoc operations.
pub type Result<T> = std::result::Result<T, Error>;
