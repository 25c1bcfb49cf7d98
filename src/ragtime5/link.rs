//! Links: how a cluster points at the zones holding its data.

use serde::Serialize;
use smallvec::SmallVec;

use crate::common::binary::{BinaryError, BinaryResult, Endian};
use crate::ragtime5::stream::ByteStream;

/// Record layout of the zone(s) a link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkKind {
    /// Variable-length records sliced by an offsets zone
    List,
    /// `count` records of `field_size` bytes
    FixedSize,
    /// Values stored inline in the link itself
    LongList,
    /// The data zone is another cluster
    ClusterRef,
    Unknown(u8),
}

impl From<u8> for LinkKind {
    fn from(value: u8) -> Self {
        match value {
            0 => LinkKind::List,
            1 => LinkKind::FixedSize,
            2 => LinkKind::LongList,
            3 => LinkKind::ClusterRef,
            other => LinkKind::Unknown(other),
        }
    }
}

/// Layout descriptor for one cluster link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub kind: LinkKind,
    /// Zone holding the records (or the target cluster)
    pub data: u32,
    /// Zone holding the record offsets, for list layouts
    pub offsets: Option<u32>,
    pub field_size: u32,
    /// Declared number of elements
    pub count: u32,
    /// Inline values of a long list
    pub values: SmallVec<[u32; 4]>,
    /// Debug name, derived from the role that declared the link
    pub name: String,
}

impl Link {
    /// Decode a link blob stored in a cluster field.
    ///
    /// Layout: `kind:u8, data:u32, offsets:u32, field_size:u32, n:u32`,
    /// then `n` values for a long list.
    pub fn parse(blob: &[u8], endian: Endian, name: impl Into<String>) -> BinaryResult<Self> {
        let mut stream = ByteStream::new(bytes::Bytes::copy_from_slice(blob), endian);
        let kind = LinkKind::from(stream.read_u8()?);
        let data = stream.read_u32()?;
        let offsets = stream.read_u32()?;
        let field_size = stream.read_u32()?;
        let count = stream.read_u32()?;
        let mut values = SmallVec::new();
        if kind == LinkKind::LongList {
            // checked up front so a lying count cannot drive a huge loop
            let needed = (count as usize).saturating_mul(4);
            if needed > stream.remaining() {
                return Err(BinaryError::InsufficientData {
                    expected: stream.position().saturating_add(needed),
                    available: stream.len(),
                });
            }
            for _ in 0..count {
                values.push(stream.read_u32()?);
            }
        }
        Ok(Self {
            kind,
            data,
            offsets: (offsets != 0).then_some(offsets),
            field_size,
            count,
            values,
            name: name.into(),
        })
    }

    /// Zone ids whose bytes this link reads (data first).
    pub fn zones(&self) -> impl Iterator<Item = u32> + '_ {
        let data = (self.kind != LinkKind::LongList && self.data != 0).then_some(self.data);
        data.into_iter().chain(self.offsets)
    }
}

#[cfg(test)]
pub(crate) fn encode_link(kind: u8, data: u32, offsets: u32, field_size: u32, values: &[u32], count: u32) -> Vec<u8> {
    let mut out = vec![kind];
    for v in [data, offsets, field_size, count] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    for v in values {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}
