//! Zones: the addressable chunks of a container.

use std::collections::BTreeMap;

use bitflags::bitflags;
use bytes::Bytes;
use phf::phf_map;
use serde::Serialize;
use smallvec::SmallVec;

use crate::common::binary::Endian;

/// Index of a zone inside the [`ZoneGraph`](crate::ragtime5::ZoneGraph) arena.
pub type ZoneIndex = usize;

bitflags! {
    /// Mutable per-zone state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct ZoneFlags: u8 {
        /// Payload is Pack-compressed
        const PACKED = 0x01;
        /// Payload stores little-endian values ("LoHi")
        const LITTLE_ENDIAN = 0x02;
        /// A pass has consumed this zone
        const PARSED = 0x04;
        /// Bytes could not be resolved; later passes skip the zone
        const INVALID = 0x08;
        /// Kinds were assigned from the type directory
        const KIND_ASSIGNED = 0x10;
    }
}

/// Semantic kind carried by the last component of a kind path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ZoneKind {
    Cluster,
    ItemData,
    Unicode,
    DocuVersion,
    Unknown(String),
}

#[derive(Clone, Copy)]
enum KindComponent {
    HiLo,
    LoHi,
    Pack,
    Cluster,
    ItemData,
    Unicode,
    DocuVersion,
}

static KIND_COMPONENTS: phf::Map<&'static str, KindComponent> = phf_map! {
    "HiLo" => KindComponent::HiLo,
    "LoHi" => KindComponent::LoHi,
    "Pack" => KindComponent::Pack,
    "Cluster" => KindComponent::Cluster,
    "ItemData" => KindComponent::ItemData,
    "Unicode" => KindComponent::Unicode,
    "DocuVersion" => KindComponent::DocuVersion,
};

/// A kind path such as `"HiLo:Pack:ItemData"`, split into its flags and the
/// semantic kind it ends with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindPath {
    pub endian: Option<Endian>,
    pub packed: bool,
    pub kind: Option<ZoneKind>,
}

impl KindPath {
    pub fn parse(path: &str) -> Self {
        let mut parsed = KindPath {
            endian: None,
            packed: false,
            kind: None,
        };
        for component in path.split(':').filter(|c| !c.is_empty()) {
            match KIND_COMPONENTS.get(component) {
                Some(KindComponent::HiLo) => parsed.endian = Some(Endian::Big),
                Some(KindComponent::LoHi) => parsed.endian = Some(Endian::Little),
                Some(KindComponent::Pack) => parsed.packed = true,
                Some(KindComponent::Cluster) => parsed.kind = Some(ZoneKind::Cluster),
                Some(KindComponent::ItemData) => parsed.kind = Some(ZoneKind::ItemData),
                Some(KindComponent::Unicode) => parsed.kind = Some(ZoneKind::Unicode),
                Some(KindComponent::DocuVersion) => parsed.kind = Some(ZoneKind::DocuVersion),
                None => parsed.kind = Some(ZoneKind::Unknown(component.to_string())),
            }
        }
        parsed
    }
}

/// One on-disk byte range of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub offset: u32,
    pub length: u32,
}

impl ByteRange {
    #[inline]
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.length)
    }
}

/// Resolution state of a zone's payload.
#[derive(Debug, Clone, Default)]
pub(crate) enum ZoneData {
    #[default]
    Unresolved,
    Ready(Bytes),
    Failed,
}

/// One zone of the container.
#[derive(Debug, Clone)]
pub struct Zone {
    /// Identifier unique within its level
    pub id: u32,
    /// Directory level (1 to 3)
    pub level: u8,
    /// Ancestry ids read after the zone's own id pair
    pub ancestry: SmallVec<[u32; 2]>,
    /// Raw kind paths, once assigned
    pub(crate) kinds: [Option<String>; 2],
    kind: Option<ZoneKind>,
    /// Type-directory indices from the 0xd header record
    pub kind_ids: Option<[u16; 2]>,
    /// Byte ranges in container order
    pub ranges: SmallVec<[ByteRange; 2]>,
    /// Selection flags (header record 4)
    pub selection_flags: u16,
    /// Short pairs of the 0xa/0xb header records
    pub variables: SmallVec<[[u16; 2]; 1]>,
    /// Parent zone in the arena, for level 2 and 3 zones
    pub parent: Option<ZoneIndex>,
    /// Child slot -> child zone
    pub children: BTreeMap<u32, ZoneIndex>,
    /// Offset of this zone's header in the directory
    pub header_offset: usize,
    pub flags: ZoneFlags,
    pub(crate) data: ZoneData,
}

impl Zone {
    pub fn new(id: u32, level: u8, header_offset: usize) -> Self {
        Self {
            id,
            level,
            ancestry: SmallVec::new(),
            kinds: [None, None],
            kind: None,
            kind_ids: None,
            ranges: SmallVec::new(),
            selection_flags: 0,
            variables: SmallVec::new(),
            parent: None,
            children: BTreeMap::new(),
            header_offset,
            flags: ZoneFlags::empty(),
            data: ZoneData::Unresolved,
        }
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        if self.flags.contains(ZoneFlags::LITTLE_ENDIAN) {
            Endian::Little
        } else {
            Endian::Big
        }
    }

    #[inline]
    pub fn is_packed(&self) -> bool {
        self.flags.contains(ZoneFlags::PACKED)
    }

    #[inline]
    pub fn is_parsed(&self) -> bool {
        self.flags.contains(ZoneFlags::PARSED)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.flags.contains(ZoneFlags::INVALID)
    }

    /// Sum of all range lengths, before unpacking.
    pub fn stored_length(&self) -> u64 {
        self.ranges.iter().map(|r| u64::from(r.length)).sum()
    }

    /// Semantic kind from the main kind path, if one was assigned.
    pub fn kind(&self) -> Option<ZoneKind> {
        self.kind.clone()
    }

    /// Last component of the main (`main == true`) or secondary kind path.
    pub fn kind_last_part(&self, main: bool) -> Option<&str> {
        let path = self.kinds[usize::from(!main)].as_deref()?;
        path.rsplit(':').next()
    }

    /// Assign kind paths, updating endianness and packing from them.
    ///
    /// Returns `false` when the payload was already resolved with the old
    /// flags; the kinds are recorded but the bytes are not re-read.
    pub fn set_kinds(&mut self, main: Option<String>, secondary: Option<String>) -> bool {
        self.kind = None;
        for path in main.iter().chain(secondary.iter()) {
            let parsed = KindPath::parse(path);
            if self.kind.is_none() {
                self.kind = parsed.kind;
            }
            if let Some(endian) = parsed.endian {
                self.flags.set(ZoneFlags::LITTLE_ENDIAN, endian == Endian::Little);
            }
            if parsed.packed {
                self.flags.insert(ZoneFlags::PACKED);
            }
        }
        self.kinds = [main, secondary];
        self.flags.insert(ZoneFlags::KIND_ASSIGNED);
        matches!(self.data, ZoneData::Unresolved)
    }

    /// Human readable id, e.g. `Zone12` or `Zone3-5` for a child.
    pub fn label(&self) -> String {
        match self.ancestry.first() {
            Some(ancestor) if self.level > 1 => format!("Zone{ancestor}-{}", self.id),
            _ => format!("Zone{}", self.id),
        }
    }
}
