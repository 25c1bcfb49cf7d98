//! RagTime 5/6 container support
//!
//! A RagTime document is a graph of numbered zones. The zone directory
//! lists every zone with its byte ranges; zones are then interpreted as
//! typed clusters whose links point at further zones.
//!
//! ## Decoding pipeline
//!
//! 1. [`ContainerHeader`] validates the magic numbers and locates the
//!    zone directory.
//! 2. [`ZoneGraph`] parses the directory into a zone arena and serves each
//!    zone's bytes, concatenating fragments and unpacking
//!    ([`unpack`]) "Pack" zones on first access.
//! 3. [`record`] slices a zone into records (list, fixed-size or struct
//!    layout) and hands them to a visitor.
//! 4. [`ClusterResolver`] turns zones into [`Cluster`]s and follows their
//!    links with an explicit work stack.
//! 5. [`formula`] decompiles formula bytecode into infix instructions.
//!
//! Only a broken header or an empty directory abort a decode; every other
//! problem lands in [`Diagnostics`] and the affected zone is skipped.
//!
//! # Example
//!
//! ```no_run
//! use macdoc::ragtime5::{decode, DecodeOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("report.rtd")?;
//! let document = decode(data, &DecodeOptions::default())?;
//! for cluster in document.clusters() {
//!     println!("{:?} in zone {}", cluster.cluster_type, cluster.zone_id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod diagnostics;
pub mod directory;
pub mod document;
pub mod field;
pub mod formula;
pub mod header;
pub mod link;
pub mod options;
pub mod record;
pub mod resolver;
pub mod session;
pub mod stream;
pub mod unpack;
pub mod zone;

pub use cluster::{Cluster, ClusterType, LinkRole};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use directory::ZoneGraph;
pub use document::{CellFormula, Document, DocumentSink};
pub use field::Field;
pub use formula::{CellPosition, CellReference, FormulaInstruction};
pub use header::{ContainerHeader, is_ragtime5_file};
pub use link::{Link, LinkKind};
pub use options::DecodeOptions;
pub use resolver::ClusterResolver;
pub use session::DecodeSession;
pub use stream::ByteStream;
pub use zone::{Zone, ZoneKind};

use bytes::Bytes;

use crate::common::binary::BinaryError;

/// Error types for RagTime container decoding
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad magic number or unusable zone directory; aborts the decode
    #[error("Invalid container header: {0}")]
    FatalHeader(String),

    #[error("Corrupt zone {zone}: {reason}")]
    ZoneCorrupt { zone: u32, reason: String },

    #[error("Unresolved reference to zone {zone}: {reason}")]
    UnresolvedReference { zone: u32, reason: String },

    #[error("Formula decompile failed at offset {offset}: {reason}")]
    DecompileFailure { offset: usize, reason: String },

    #[error("Zone {zone} references one of its ancestors")]
    CycleDetected { zone: u32 },
}

impl Error {
    /// Re-tag a zone-level error with the zone it belongs to.
    pub(crate) fn in_zone(self, id: u32) -> Self {
        match self {
            Error::ZoneCorrupt { reason, .. } => Error::ZoneCorrupt { zone: id, reason },
            Error::UnresolvedReference { reason, .. } => {
                Error::UnresolvedReference { zone: id, reason }
            },
            other => other,
        }
    }

    pub(crate) fn corrupt(zone: u32, err: BinaryError) -> Self {
        Error::ZoneCorrupt {
            zone,
            reason: err.to_string(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Decode a whole container held in memory.
///
/// Returns `Err` only for [`Error::FatalHeader`]-class problems; everything
/// else is reported through [`Document::diagnostics`].
pub fn decode(data: impl Into<Bytes>, options: &DecodeOptions) -> Result<Document> {
    let session = DecodeSession::open(data, options.clone())?;
    Ok(session.finish())
}
