//! Zone directory parsing and zone byte resolution.
//!
//! The directory is a flat run of variable-length zone headers:
//!
//! - one level byte (1, 2 or 3); anything else ends the directory
//! - `4 - level` pairs of `(flag:u16, id:u16)`, the zone's own pair first
//! - typed sub-records, the last one being the first whose type byte has
//!   its low bit set
//!
//! Level 1 zones are addressable by id; level 2 and 3 zones hang off the
//! most recent enclosing zone.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use smallvec::SmallVec;

use crate::common::binary::Endian;
use crate::ragtime5::diagnostics::{DiagnosticKind, Diagnostics};
use crate::ragtime5::stream::ByteStream;
use crate::ragtime5::unpack;
use crate::ragtime5::zone::{ByteRange, Zone, ZoneData, ZoneFlags, ZoneIndex};
use crate::ragtime5::{Error, Result};

const RECORD_SELECTION: u8 = 0x04;
const RECORD_RANGE: u8 = 0x05;
const RECORD_RANGE_EXTRA: u8 = 0x06;
const RECORD_END: u8 = 0x09;
const RECORD_VARIABLE_A: u8 = 0x0a;
const RECORD_VARIABLE_B: u8 = 0x0b;
const RECORD_VARIABLE_D: u8 = 0x0d;
const RECORD_FILLER: u8 = 0x18;

/// Id of the level-1 zone describing the file header itself.
pub const HEADER_ZONE_ID: u32 = 0;

/// Arena of every zone listed in the directory.
#[derive(Debug)]
pub struct ZoneGraph {
    container: Bytes,
    zones: Vec<Zone>,
    directory: BTreeMap<u32, ZoneIndex>,
    header_zone: Option<ZoneIndex>,
}

impl ZoneGraph {
    /// Parse `directory` (already unpacked) against the full `container`.
    ///
    /// Fails only when not a single zone can be read.
    pub fn parse(container: Bytes, directory: Bytes, diagnostics: &mut Diagnostics) -> Result<Self> {
        let mut graph = ZoneGraph {
            container,
            zones: Vec::new(),
            directory: BTreeMap::new(),
            header_zone: None,
        };
        let mut stream = ByteStream::new(directory, Endian::Big);
        let mut enclosing: [Option<ZoneIndex>; 2] = [None, None];

        while let Some(level) = stream.peek_u8() {
            if !(1..=3).contains(&level) {
                if level == RECORD_FILLER {
                    skip_filler(&mut stream);
                }
                break;
            }
            let header_offset = stream.position();
            let zone = match read_zone_header(&mut stream) {
                Ok(zone) => zone,
                Err(err) => {
                    if graph.directory.is_empty() {
                        return Err(Error::FatalHeader(format!(
                            "unreadable zone header at {header_offset}: {err}"
                        )));
                    }
                    diagnostics.push(
                        DiagnosticKind::ZoneCorrupt,
                        None,
                        Some(header_offset as u64),
                        format!("directory stops at malformed header: {err}"),
                    );
                    break;
                },
            };
            graph.register(zone, &mut enclosing, diagnostics);
        }

        if graph.directory.is_empty() {
            return Err(Error::FatalHeader("zone directory lists no zones".to_string()));
        }
        log::debug!(
            "ragtime5: directory holds {} zones ({} addressable)",
            graph.zones.len(),
            graph.directory.len()
        );
        Ok(graph)
    }

    fn register(
        &mut self,
        mut zone: Zone,
        enclosing: &mut [Option<ZoneIndex>; 2],
        diagnostics: &mut Diagnostics,
    ) {
        let index = self.zones.len();
        let offset = Some(zone.header_offset as u64);
        match zone.level {
            1 => {
                enclosing[1] = None;
                if zone.id == HEADER_ZONE_ID && self.header_zone.is_none() {
                    self.header_zone = Some(index);
                } else if zone.id == HEADER_ZONE_ID || self.directory.contains_key(&zone.id) {
                    diagnostics.push(
                        DiagnosticKind::DuplicateZone,
                        Some(zone.id),
                        offset,
                        "duplicate level-1 id, keeping the first",
                    );
                    enclosing[0] = None;
                    return;
                } else {
                    self.directory.insert(zone.id, index);
                }
                enclosing[0] = Some(index);
            },
            level => {
                let slot = usize::from(level - 2);
                let Some(parent) = enclosing[slot] else {
                    diagnostics.push(
                        DiagnosticKind::ZoneCorrupt,
                        Some(zone.id),
                        offset,
                        format!("level {level} zone without an enclosing zone"),
                    );
                    return;
                };
                if self.zones[parent].children.contains_key(&zone.id) {
                    diagnostics.push(
                        DiagnosticKind::DuplicateZone,
                        Some(zone.id),
                        offset,
                        format!("duplicate child id in {}", self.zones[parent].label()),
                    );
                    if level == 2 {
                        enclosing[1] = None;
                    }
                    return;
                }
                zone.parent = Some(parent);
                self.zones[parent].children.insert(zone.id, index);
                if level == 2 {
                    enclosing[1] = Some(index);
                }
            },
        }
        self.zones.push(zone);
    }

    /// Number of zones in the arena, children included.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Length of the whole container.
    pub fn container_len(&self) -> usize {
        self.container.len()
    }

    pub fn zone(&self, index: ZoneIndex) -> Option<&Zone> {
        self.zones.get(index)
    }

    pub fn zone_mut(&mut self, index: ZoneIndex) -> Option<&mut Zone> {
        self.zones.get_mut(index)
    }

    /// Arena index of the level-1 zone `id`.
    pub fn index_of(&self, id: u32) -> Option<ZoneIndex> {
        self.directory.get(&id).copied()
    }

    pub fn zone_by_id(&self, id: u32) -> Option<&Zone> {
        self.index_of(id).and_then(|index| self.zones.get(index))
    }

    /// Level-1 ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.directory.keys().copied()
    }

    /// The file-header zone (id 0), when the directory lists one.
    pub fn header_zone(&self) -> Option<&Zone> {
        self.header_zone.and_then(|index| self.zones.get(index))
    }

    /// Bytes of a zone: fragments concatenated and Pack payloads expanded
    /// on first access, cached afterwards.
    ///
    /// A single range is served as a zero-copy slice of the container. A
    /// range outside the container marks the zone invalid; a failed unpack
    /// leaves it empty.
    pub fn resolve(&mut self, index: ZoneIndex, diagnostics: &mut Diagnostics) -> Option<Bytes> {
        let container = &self.container;
        let zone = self.zones.get_mut(index)?;
        match &zone.data {
            ZoneData::Ready(bytes) => return Some(bytes.clone()),
            ZoneData::Failed => return None,
            ZoneData::Unresolved => {},
        }

        let raw = match gather(container, zone) {
            Ok(raw) => raw,
            Err(err) => {
                zone.data = ZoneData::Failed;
                zone.flags.insert(ZoneFlags::INVALID);
                diagnostics.record(&err, Some(zone.header_offset as u64));
                return None;
            },
        };

        let data = if zone.is_packed() && !raw.is_empty() {
            match unpack::unpack(&raw) {
                Ok(unpacked) => Bytes::from(unpacked),
                Err(err) => {
                    let offset = zone.ranges.first().map(|r| u64::from(r.offset));
                    diagnostics.record(&err.in_zone(zone.id), offset);
                    Bytes::new()
                },
            }
        } else {
            raw
        };
        zone.data = ZoneData::Ready(data.clone());
        Some(data)
    }

    /// Resolve a zone and wrap it in a stream using its byte order.
    pub fn stream(&mut self, index: ZoneIndex, diagnostics: &mut Diagnostics) -> Option<ByteStream> {
        let data = self.resolve(index, diagnostics)?;
        let endian = self.zones[index].endian();
        Some(ByteStream::new(data, endian))
    }

    /// Assign kind paths from the type directory using each zone's 0xd
    /// record. Index 0 means "no kind"; `n` selects entry `n - 1`.
    pub fn assign_kinds(&mut self, type_directory: &[String], diagnostics: &mut Diagnostics) {
        for zone in &mut self.zones {
            let Some(ids) = zone.kind_ids else {
                continue;
            };
            let mut paths: [Option<String>; 2] = [None, None];
            for (slot, id) in ids.into_iter().enumerate() {
                if id == 0 {
                    continue;
                }
                match type_directory.get(usize::from(id) - 1) {
                    Some(path) => paths[slot] = Some(path.clone()),
                    None => diagnostics.push(
                        DiagnosticKind::UnresolvedReference,
                        Some(zone.id),
                        Some(zone.header_offset as u64),
                        format!("kind index {id} outside the type directory"),
                    ),
                }
            }
            let [main, secondary] = paths;
            if !zone.set_kinds(main, secondary) {
                log::debug!("ragtime5: {} already read before its kind was known", zone.label());
            }
        }
    }

    pub fn mark_parsed(&mut self, index: ZoneIndex) {
        if let Some(zone) = self.zones.get_mut(index) {
            zone.flags.insert(ZoneFlags::PARSED);
        }
    }

    /// Valid level-1 zones no pass has consumed yet.
    pub fn unparsed(&self) -> Vec<u32> {
        self.directory
            .iter()
            .filter(|&(_, &index)| {
                let zone = &self.zones[index];
                !zone.is_parsed() && zone.is_valid()
            })
            .map(|(&id, _)| id)
            .collect()
    }
}

fn gather(container: &Bytes, zone: &Zone) -> Result<Bytes> {
    for range in &zone.ranges {
        if range.end() > container.len() as u64 {
            return Err(Error::ZoneCorrupt {
                zone: zone.id,
                reason: format!(
                    "range {}+{} outside container of {} bytes",
                    range.offset,
                    range.length,
                    container.len()
                ),
            });
        }
    }
    let slice = |r: &ByteRange| container.slice(r.offset as usize..r.end() as usize);
    Ok(match zone.ranges.as_slice() {
        [] => Bytes::new(),
        [single] => slice(single),
        ranges => {
            let total: usize = ranges.iter().map(|r| r.length as usize).sum();
            let mut buffer = BytesMut::with_capacity(total);
            for range in ranges {
                buffer.extend_from_slice(&slice(range));
            }
            buffer.freeze()
        },
    })
}

fn skip_filler(stream: &mut ByteStream) {
    let _ = stream.read_u8();
    while stream.peek_u8() == Some(0xFF) {
        let _ = stream.read_u8();
    }
}

fn read_zone_header(stream: &mut ByteStream) -> Result<Zone> {
    let header_offset = stream.position();
    let wrap = |err| Error::corrupt(0, err);
    let level = stream.read_u8().map_err(wrap)?;

    let mut pairs: SmallVec<[(u16, u16); 3]> = SmallVec::new();
    for _ in 0..(4 - level) {
        let flag = stream.read_u16().map_err(wrap)?;
        let id = stream.read_u16().map_err(wrap)?;
        pairs.push((flag, id));
    }
    let (_, own_id) = pairs[0];
    let mut zone = Zone::new(u32::from(own_id), level, header_offset);
    zone.ancestry = pairs[1..].iter().map(|&(_, id)| u32::from(id)).collect();

    loop {
        let record_offset = stream.position();
        let kind = stream.read_u8().map_err(wrap)?;
        match kind {
            RECORD_SELECTION => zone.selection_flags = stream.read_u16().map_err(wrap)?,
            RECORD_RANGE | RECORD_RANGE_EXTRA => {
                let offset = stream.read_u32().map_err(wrap)?;
                let length = stream.read_u32().map_err(wrap)?;
                if kind == RECORD_RANGE_EXTRA {
                    stream.read_u8().map_err(wrap)?;
                }
                if length > 0 {
                    zone.ranges.push(ByteRange { offset, length });
                }
            },
            RECORD_END => {},
            RECORD_VARIABLE_A | RECORD_VARIABLE_B => {
                let a = stream.read_u16().map_err(wrap)?;
                let b = stream.read_u16().map_err(wrap)?;
                zone.variables.push([a, b]);
            },
            RECORD_VARIABLE_D => {
                let main = stream.read_u16().map_err(wrap)?;
                let secondary = stream.read_u16().map_err(wrap)?;
                zone.kind_ids = Some([main, secondary]);
            },
            RECORD_FILLER => {
                while stream.peek_u8() == Some(0xFF) {
                    stream.read_u8().map_err(wrap)?;
                }
            },
            other => {
                return Err(Error::ZoneCorrupt {
                    zone: zone.id,
                    reason: format!("unknown header record {other:#04x} at {record_offset}"),
                });
            },
        }
        if kind & 1 == 1 {
            break;
        }
    }
    Ok(zone)
}


#[cfg(test)]
mod tests {
    use super::builder::DirectoryBuilder;
    use super::*;
    use proptest::prelude::*;

    fn container_of(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| i as u8).collect::<Vec<u8>>())
    }

    fn parse(directory: Vec<u8>, container: Bytes) -> (Result<ZoneGraph>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let graph = ZoneGraph::parse(container, Bytes::from(directory), &mut diagnostics);
        (graph, diagnostics)
    }

    #[test]
    fn test_parse_levels_and_children() {
        let directory = DirectoryBuilder::new()
            .zone(0, 0, 32, None)
            .zone(1, 32, 16, Some([1, 0]))
            .child(2, 4, 48, 8)
            .child(3, 9, 56, 4)
            .zone(2, 60, 4, None)
            .finish(0);
        let (graph, diagnostics) = parse(directory, container_of(128));
        let graph = graph.unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(graph.ids().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(graph.len(), 5);
        assert_eq!(graph.header_zone().unwrap().id, 0);

        let zone = graph.zone_by_id(1).unwrap();
        assert_eq!(zone.kind_ids, Some([1, 0]));
        assert_eq!(zone.selection_flags, 1);
        let child = graph.zone(zone.children[&4]).unwrap();
        assert_eq!(child.level, 2);
        let grandchild = graph.zone(child.children[&9]).unwrap();
        assert_eq!(grandchild.ranges[0], ByteRange { offset: 56, length: 4 });
        assert!(graph.zone_by_id(2).unwrap().children.is_empty());
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let directory = DirectoryBuilder::new()
            .zone(3, 0, 4, None)
            .zone(3, 8, 4, None)
            .finish(0);
        let (graph, diagnostics) = parse(directory, container_of(16));
        let graph = graph.unwrap();
        assert_eq!(graph.zone_by_id(3).unwrap().ranges[0].offset, 0);
        assert!(diagnostics.has(DiagnosticKind::DuplicateZone, 3));
    }

    #[test]
    fn test_duplicate_header_zone_keeps_first() {
        let directory = DirectoryBuilder::new()
            .zone(0, 0, 32, None)
            .zone(1, 32, 8, None)
            .zone(0, 40, 8, None)
            .finish(0);
        let (graph, diagnostics) = parse(directory, container_of(64));
        let graph = graph.unwrap();
        assert_eq!(graph.header_zone().unwrap().ranges[0].offset, 0);
        assert!(diagnostics.has(DiagnosticKind::DuplicateZone, 0));
        assert_eq!(graph.ids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_malformed_first_header_is_fatal() {
        let (graph, _) = parse(vec![1, 0, 1, 0, 7, 0x42], container_of(16));
        assert!(matches!(graph, Err(Error::FatalHeader(_))));
        let (graph, _) = parse(vec![0x18, 0xFF, 0xFF], container_of(16));
        assert!(matches!(graph, Err(Error::FatalHeader(_))));
    }

    #[test]
    fn test_malformed_later_header_keeps_earlier_zones() {
        let mut directory = DirectoryBuilder::new().zone(1, 0, 4, None).bytes;
        directory.extend_from_slice(&[1, 0, 1, 0, 2, 0, 0, 0, 0, 0x42]);
        let (graph, diagnostics) = parse(directory, container_of(16));
        let graph = graph.unwrap();
        assert_eq!(graph.ids().collect::<Vec<_>>(), vec![1]);
        assert_eq!(diagnostics.of_kind(DiagnosticKind::ZoneCorrupt).count(), 1);
    }

    #[test]
    fn test_resolve_single_and_fragmented() {
        let directory = DirectoryBuilder::new()
            .zone(1, 4, 4, None)
            .fragmented(2, &[(10, 2), (0, 3)])
            .finish(0);
        let (graph, _) = parse(directory, container_of(32));
        let mut graph = graph.unwrap();
        let mut diagnostics = Diagnostics::new();

        let index = graph.index_of(1).unwrap();
        assert_eq!(graph.resolve(index, &mut diagnostics).unwrap().as_ref(), &[4u8, 5, 6, 7][..]);
        let index = graph.index_of(2).unwrap();
        assert_eq!(graph.resolve(index, &mut diagnostics).unwrap().as_ref(), &[10u8, 11, 0, 1, 2][..]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_out_of_bounds_range_invalidates_only_that_zone() {
        let directory = DirectoryBuilder::new()
            .zone(1, 0, 4, None)
            .fragmented(2, &[(0, 2), (30, 8)])
            .finish(0);
        let (graph, _) = parse(directory, container_of(32));
        let mut graph = graph.unwrap();
        let mut diagnostics = Diagnostics::new();

        let bad = graph.index_of(2).unwrap();
        assert!(graph.resolve(bad, &mut diagnostics).is_none());
        assert!(!graph.zone(bad).unwrap().is_valid());
        assert!(diagnostics.has(DiagnosticKind::ZoneCorrupt, 2));
        assert!(graph.resolve(bad, &mut diagnostics).is_none());
        assert_eq!(diagnostics.len(), 1);

        let good = graph.index_of(1).unwrap();
        assert!(graph.resolve(good, &mut diagnostics).is_some());
        assert_eq!(graph.unparsed(), vec![1]);
    }

    #[test]
    fn test_packed_zone_unpacks_or_empties() {
        let packed = unpack::pack_codes(2, &[(0x041, 9), (0x042, 9), (0x101, 9)]);
        let mut container = vec![0u8; 8];
        container.extend_from_slice(&packed);
        let directory = DirectoryBuilder::new()
            .zone(1, 8, packed.len() as u32, Some([1, 0]))
            .zone(2, 0, 8, Some([1, 0]))
            .finish(0);
        let (graph, _) = parse(directory, Bytes::from(container));
        let mut graph = graph.unwrap();
        let mut diagnostics = Diagnostics::new();
        graph.assign_kinds(&["HiLo:Pack:ItemData".to_string()], &mut diagnostics);

        let index = graph.index_of(1).unwrap();
        assert_eq!(graph.resolve(index, &mut diagnostics).unwrap().as_ref(), b"AB");
        let index = graph.index_of(2).unwrap();
        assert!(graph.resolve(index, &mut diagnostics).unwrap().is_empty());
        assert!(diagnostics.has(DiagnosticKind::ZoneCorrupt, 2));
    }

    #[test]
    fn test_assign_kinds_reports_bad_index() {
        let directory = DirectoryBuilder::new().zone(1, 0, 4, Some([2, 9])).finish(0);
        let (graph, _) = parse(directory, container_of(8));
        let mut graph = graph.unwrap();
        let mut diagnostics = Diagnostics::new();
        graph.assign_kinds(&["Cluster".to_string(), "LoHi:ItemData".to_string()], &mut diagnostics);
        let zone = graph.zone_by_id(1).unwrap();
        assert_eq!(zone.endian(), Endian::Little);
        assert_eq!(zone.kinds[1], None);
        assert!(diagnostics.has(DiagnosticKind::UnresolvedReference, 1));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_directory_ranges_stay_in_bounds(data in proptest::collection::vec(any::<u8>(), 0..200)) {
            let container = container_of(64);
            let mut diagnostics = Diagnostics::new();
            if let Ok(mut graph) = ZoneGraph::parse(container, Bytes::from(data), &mut diagnostics) {
                let ids: Vec<u32> = graph.ids().collect();
                for id in ids {
                    let index = graph.index_of(id).unwrap();
                    if graph.resolve(index, &mut diagnostics).is_some() {
                        let zone = graph.zone(index).unwrap();
                        prop_assert!(zone.ranges.iter().all(|r| r.end() <= 64));
                    }
                }
            }
        }
    }
}
