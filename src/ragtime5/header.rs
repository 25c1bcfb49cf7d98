//! Container header parsing.
//!
//! The first 32 bytes of a RagTime 5/6 document identify the file and point
//! at the zone directory.

use serde::Serialize;
use zerocopy::{BE, FromBytes, U16, U32};
use zerocopy_derive::FromBytes as DeriveFromBytes;

use crate::ragtime5::{Error, Result};

/// Magic numbers opening every container.
pub const MAGIC: [u32; 3] = [0x4323_2B44, 0xA443_4DA5, 0x4864_72D7];

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Smallest zone directory a writer ever produces.
pub const MIN_DIRECTORY_LENGTH: u32 = 137;

/// Raw on-disk header (32 bytes, big-endian).
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawHeader {
    /// The three magic numbers
    magic: [U32<BE>; 3],
    /// Sequence markers, always 0, 1, 2
    sequence: [U16<BE>; 3],
    reserved: U16<BE>,
    /// Absolute offset of the zone directory
    directory_offset: U32<BE>,
    /// Length of the zone directory in bytes
    directory_length: U32<BE>,
    /// 1 when the directory is Pack-compressed
    compaction: u8,
    /// 0 for RagTime 5, 4 for RagTime 6
    version_selector: u8,
    reserved_tail: [u8; 2],
}

/// Decoded container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContainerHeader {
    /// Major application version (5 or 6)
    pub version: u8,
    /// Absolute offset of the zone directory
    pub directory_offset: u32,
    /// Length of the zone directory in bytes
    pub directory_length: u32,
    /// Whether the directory is stored compressed
    pub compacted: bool,
}

impl ContainerHeader {
    /// Parse and validate the header at the start of `data`.
    ///
    /// Every failure here is fatal: without a trustworthy header there is
    /// no directory to walk.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::FatalHeader(format!(
                "file too short: {} bytes",
                data.len()
            )));
        }
        let raw = RawHeader::read_from_bytes(&data[..HEADER_SIZE])
            .map_err(|_| Error::FatalHeader("unreadable header".to_string()))?;

        for (found, expected) in raw.magic.iter().zip(MAGIC) {
            if found.get() != expected {
                return Err(Error::FatalHeader(format!(
                    "bad magic number {:#010x}",
                    found.get()
                )));
            }
        }

        let sequence = raw.sequence.map(|v| v.get());
        if sequence != [0, 1, 2] {
            log::warn!("ragtime5: unexpected header sequence markers {sequence:?}");
        }

        let version = match raw.version_selector {
            0 => 5,
            4 => 6,
            other => {
                return Err(Error::FatalHeader(format!(
                    "unknown version selector {other}"
                )));
            },
        };

        let directory_length = raw.directory_length.get();
        if directory_length < MIN_DIRECTORY_LENGTH {
            return Err(Error::FatalHeader(format!(
                "zone directory too short: {directory_length} bytes"
            )));
        }

        if raw.compaction > 1 {
            log::warn!("ragtime5: unexpected compaction flag {}", raw.compaction);
        }

        Ok(Self {
            version,
            directory_offset: raw.directory_offset.get(),
            directory_length,
            compacted: raw.compaction == 1,
        })
    }

    /// Byte range of the zone directory inside the container.
    pub fn directory_range(&self) -> std::ops::Range<usize> {
        let start = self.directory_offset as usize;
        start..start.saturating_add(self.directory_length as usize)
    }
}

/// Check whether `data` starts with the container magic numbers.
pub fn is_ragtime5_file(data: &[u8]) -> bool {
    data.len() >= 12
        && MAGIC
            .iter()
            .enumerate()
            .all(|(i, magic)| data[i * 4..i * 4 + 4] == magic.to_be_bytes())
}

#[cfg(test)]
pub(crate) fn build_header(offset: u32, length: u32, compacted: bool, selector: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE);
    for magic in MAGIC {
        out.extend_from_slice(&magic.to_be_bytes());
    }
    for marker in [0u16, 1, 2, 0] {
        out.extend_from_slice(&marker.to_be_bytes());
    }
    out.extend_from_slice(&offset.to_be_bytes());
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&[u8::from(compacted), selector, 0, 0]);
    out
}
