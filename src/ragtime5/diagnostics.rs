//! Non-fatal problems collected while decoding.
//!
//! Each entry is also forwarded to the `log` facade so that a host
//! application sees the same notes without walking the list.

use serde::Serialize;

use crate::ragtime5::Error;

/// Category of a recoverable decode problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    /// Bad offsets, size mismatch, truncated bitstream
    ZoneCorrupt,
    /// Link id not found or of the wrong kind
    UnresolvedReference,
    /// Formula bytecode did not reduce cleanly
    DecompileFailure,
    /// A zone references one of its ancestors
    CycleDetected,
    /// Second directory entry with an already registered id
    DuplicateZone,
    /// A record or field visitor rejected its input
    VisitorFailure,
    /// Zone left untouched at end of document
    NotParsed,
}

/// One recoverable problem, tied to the zone and byte offset it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub zone: Option<u32>,
    pub offset: Option<u64>,
    pub message: String,
}

/// Ordered list of diagnostics for one decode session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a note and forward it to the logger.
    pub fn push(
        &mut self,
        kind: DiagnosticKind,
        zone: Option<u32>,
        offset: Option<u64>,
        message: impl Into<String>,
    ) {
        let message = message.into();
        let zone_label = zone.map(|z| format!("Zone{z}")).unwrap_or_default();
        match kind {
            DiagnosticKind::ZoneCorrupt
            | DiagnosticKind::UnresolvedReference
            | DiagnosticKind::CycleDetected
            | DiagnosticKind::DecompileFailure => {
                log::warn!("ragtime5: {kind:?} {zone_label}[{offset:?}]: {message}")
            },
            DiagnosticKind::DuplicateZone
            | DiagnosticKind::VisitorFailure
            | DiagnosticKind::NotParsed => {
                log::debug!("ragtime5: {kind:?} {zone_label}[{offset:?}]: {message}")
            },
        }
        self.entries.push(Diagnostic {
            kind,
            zone,
            offset,
            message,
        });
    }

    /// Record a recoverable [`Error`].
    pub fn record(&mut self, error: &Error, offset: Option<u64>) {
        let (kind, zone) = match error {
            Error::ZoneCorrupt { zone, .. } => (DiagnosticKind::ZoneCorrupt, Some(*zone)),
            Error::UnresolvedReference { zone, .. } => {
                (DiagnosticKind::UnresolvedReference, Some(*zone))
            },
            Error::DecompileFailure { .. } => (DiagnosticKind::DecompileFailure, None),
            Error::CycleDetected { zone } => (DiagnosticKind::CycleDetected, Some(*zone)),
            Error::FatalHeader(_) | Error::Io(_) => (DiagnosticKind::ZoneCorrupt, None),
        };
        self.push(kind, zone, offset, error.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Entries of one kind.
    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    /// Whether a note of `kind` was recorded for `zone`.
    pub fn has(&self, kind: DiagnosticKind, zone: u32) -> bool {
        self.of_kind(kind).any(|d| d.zone == Some(zone))
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
