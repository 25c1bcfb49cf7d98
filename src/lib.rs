//! macdoc - A Rust library for decoding legacy Macintosh document containers
//!
//! The first supported format is the RagTime 5/6 container: a graph of
//! numbered zones holding text, spreadsheet, graphic and style clusters.
//!
//! # Features
//!
//! - **Zone directory**: levels 1 to 3, fragmented and "Pack" compressed zones
//! - **Record layouts**: list, fixed-size and self-describing struct records
//! - **Cluster resolution**: worklist driven, cycle safe, idempotent
//! - **Formulas**: bytecode decompiled back into infix token lists
//! - **Graceful degradation**: only a broken header aborts a decode; every
//!   other problem is reported as a diagnostic
//!
//! # Example - Reading a RagTime file
//!
//! ```no_run
//! # fn main() -> Result<(), macdoc::Error> {
//! let document = macdoc::open_ragtime("budget.rtd")?;
//!
//! // Paragraphs and formulas in document order
//! println!("{}", document.text());
//!
//! for note in document.diagnostics() {
//!     eprintln!("{:?}: {}", note.kind, note.message);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Driving a session by hand
//!
//! ```no_run
//! use macdoc::ragtime5::{DecodeOptions, DecodeSession};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("budget.rtd")?;
//! let mut session = DecodeSession::open(data, DecodeOptions::new().with_debug_formulas(true))?;
//! let sheet = session.read_cluster(10)?;
//! println!("{:?}", sheet.cluster_type);
//! let formula = session.decompile_formula(11, 0)?;
//! println!("={}", macdoc::ragtime5::formula::render(&formula));
//! # Ok(())
//! # }
//! ```

/// Common types and utilities shared across formats
pub mod common;

/// RagTime 5/6 container decoder
///
/// Zone directory, Pack decompression, record layouts, cluster
/// resolution and the formula decompiler.
pub mod ragtime5;

use std::path::Path;

// Re-export commonly used types for convenience
pub use common::{Error, Result};
pub use ragtime5::{DecodeOptions, Document};

/// Read and decode a RagTime file with default options.
pub fn open_ragtime(path: impl AsRef<Path>) -> Result<Document> {
    let data = std::fs::read(path)?;
    if !ragtime5::is_ragtime5_file(&data) {
        return Err(Error::NotSupportedFile);
    }
    Ok(ragtime5::decode(data, &DecodeOptions::default())?)
}
