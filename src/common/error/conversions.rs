//! Error conversion implementations.
//!
//! This module contains From trait implementations to convert from internal
//! error types to the unified Error type.

use super::types::Error;
use crate::common::binary::BinaryError;
use crate::ragtime5;

impl From<ragtime5::Error> for Error {
    fn from(err: ragtime5::Error) -> Self {
        match err {
            ragtime5::Error::Io(e) => Error::Io(e),
            ragtime5::Error::FatalHeader(s) => Error::InvalidFormat(s),
            ragtime5::Error::UnresolvedReference { zone, reason } => {
                Error::ComponentNotFound(format!("zone {zone}: {reason}"))
            },
            other => Error::CorruptedFile(other.to_string()),
        }
    }
}

impl From<BinaryError> for Error {
    fn from(err: BinaryError) -> Self {
        Error::CorruptedFile(err.to_string())
    }
}
