//! Clusters: zones interpreted as typed aggregates of links.
//!
//! A cluster zone is a run of struct records. Record 0 opens with an
//! 18-byte header carrying the cluster type; later records carry an 8-byte
//! header. Fields whose type code is listed in [`LINK_ROLES`] hold a
//! [`Link`] blob; field `0x0003_0001` is the cluster name.

use std::collections::BTreeMap;

use bytes::Bytes;
use phf::phf_map;
use serde::Serialize;
use smallvec::SmallVec;

use crate::common::binary::{BinaryResult, Endian};
use crate::ragtime5::field::Field;
use crate::ragtime5::formula::CellReference;
use crate::ragtime5::link::{Link, LinkKind};
use crate::ragtime5::record::StructVisitor;
use crate::ragtime5::stream::ByteStream;
use crate::ragtime5::zone::ZoneKind;

/// Size of the header in front of record 0.
pub const FIRST_HEADER_SIZE: usize = 18;
/// Size of the header in front of every later record.
pub const RECORD_HEADER_SIZE: usize = 8;
/// Field type code of the cluster name.
pub const NAME_FIELD: u32 = 0x0003_0001;

/// Semantic type of a cluster, from the code in its first header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClusterType {
    Root,
    Text,
    Graphic,
    Spreadsheet,
    FormulaDef,
    FormulaPos,
    Pipeline,
    GraphicStyle,
    TextStyle,
    FormatStyle,
    ColorStyle,
    Layout,
    Unknown(u32),
}

impl From<u32> for ClusterType {
    fn from(code: u32) -> Self {
        match code {
            0x0001_0000 => ClusterType::Root,
            0x0002_0000 => ClusterType::Text,
            0x0003_0000 => ClusterType::Graphic,
            0x0004_0000 => ClusterType::Spreadsheet,
            0x0005_0000 => ClusterType::FormulaDef,
            0x0006_0000 => ClusterType::FormulaPos,
            0x0007_0000 => ClusterType::Pipeline,
            0x0008_0001 => ClusterType::GraphicStyle,
            0x0008_0002 => ClusterType::TextStyle,
            0x0008_0003 => ClusterType::FormatStyle,
            0x0008_0004 => ClusterType::ColorStyle,
            0x0009_0000 => ClusterType::Layout,
            other => ClusterType::Unknown(other),
        }
    }
}

impl ClusterType {
    pub fn is_style(self) -> bool {
        matches!(
            self,
            ClusterType::GraphicStyle
                | ClusterType::TextStyle
                | ClusterType::FormatStyle
                | ClusterType::ColorStyle
        )
    }
}

/// What a link contributes to its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LinkRole {
    TypeDirectory,
    ClusterList,
    DimensionTable,
    ValueTree,
    GraphicPlc,
    TextPlc,
    BorderPlc,
    NameList,
    ChildZoneList,
    ParentLink,
    FormulaDef,
    FormulaPos,
    StyleCluster,
    FunctionNames,
    CellReferences,
    FormulaDefinitions,
    FormulaPositions,
    TextContent,
}

/// Field type code -> role of the link stored in that field.
pub static LINK_ROLES: phf::Map<u32, LinkRole> = phf_map! {
    0x0001_0010u32 => LinkRole::TypeDirectory,
    0x0001_0020u32 => LinkRole::ClusterList,
    0x0002_0010u32 => LinkRole::DimensionTable,
    0x0002_0020u32 => LinkRole::ValueTree,
    0x0002_0030u32 => LinkRole::GraphicPlc,
    0x0002_0040u32 => LinkRole::TextPlc,
    0x0002_0050u32 => LinkRole::BorderPlc,
    0x0002_0060u32 => LinkRole::NameList,
    0x0002_0070u32 => LinkRole::ChildZoneList,
    0x0002_0080u32 => LinkRole::ParentLink,
    0x0002_0090u32 => LinkRole::FormulaDef,
    0x0002_00a0u32 => LinkRole::FormulaPos,
    0x0002_00b0u32 => LinkRole::StyleCluster,
    0x0002_00c0u32 => LinkRole::FunctionNames,
    0x0002_00d0u32 => LinkRole::CellReferences,
    0x0002_00e0u32 => LinkRole::FormulaDefinitions,
    0x0002_00f0u32 => LinkRole::FormulaPositions,
    0x0002_0100u32 => LinkRole::TextContent,
};

impl LinkRole {
    pub fn name(self) -> &'static str {
        match self {
            LinkRole::TypeDirectory => "typeDirectory",
            LinkRole::ClusterList => "clusterList",
            LinkRole::DimensionTable => "dimensions",
            LinkRole::ValueTree => "valueTree",
            LinkRole::GraphicPlc => "graphicPLC",
            LinkRole::TextPlc => "textPLC",
            LinkRole::BorderPlc => "borderPLC",
            LinkRole::NameList => "names",
            LinkRole::ChildZoneList => "childZones",
            LinkRole::ParentLink => "parent",
            LinkRole::FormulaDef => "formulaDef",
            LinkRole::FormulaPos => "formulaPos",
            LinkRole::StyleCluster => "styles",
            LinkRole::FunctionNames => "functionNames",
            LinkRole::CellReferences => "cellReferences",
            LinkRole::FormulaDefinitions => "formulaDefinitions",
            LinkRole::FormulaPositions => "formulaPositions",
            LinkRole::TextContent => "textContent",
        }
    }

    /// Whether the link points at another cluster rather than at data.
    pub fn is_cluster_ref(self) -> bool {
        matches!(
            self,
            LinkRole::ParentLink | LinkRole::FormulaDef | LinkRole::FormulaPos | LinkRole::StyleCluster
        )
    }

    /// Whether the link lists cluster ids (inline or in a data zone).
    pub fn lists_clusters(self) -> bool {
        matches!(self, LinkRole::ClusterList | LinkRole::ChildZoneList)
    }

    /// Zone kinds a data zone of this role may carry.
    pub fn accepts(self, kind: &ZoneKind) -> bool {
        if self.is_cluster_ref() {
            *kind == ZoneKind::Cluster
        } else {
            matches!(kind, ZoneKind::ItemData | ZoneKind::Unicode)
        }
    }

    /// Fixed record size for the fixed-size roles.
    pub fn record_size(self) -> Option<usize> {
        match self {
            LinkRole::ClusterList | LinkRole::ChildZoneList => Some(4),
            LinkRole::DimensionTable => Some(8),
            LinkRole::GraphicPlc | LinkRole::TextPlc | LinkRole::BorderPlc => Some(8),
            LinkRole::CellReferences => Some(16),
            LinkRole::FormulaPositions => Some(12),
            _ => None,
        }
    }
}

/// Row or column extent entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimension {
    pub position: u32,
    pub size: u32,
}

/// Style run start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlcEntry {
    pub position: u32,
    pub style: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PlcKind {
    Graphic,
    Text,
    Border,
}

impl PlcKind {
    pub fn from_role(role: LinkRole) -> Option<Self> {
        match role {
            LinkRole::GraphicPlc => Some(PlcKind::Graphic),
            LinkRole::TextPlc => Some(PlcKind::Text),
            LinkRole::BorderPlc => Some(PlcKind::Border),
            _ => None,
        }
    }
}

/// Style run resolved to the range it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlcRun {
    pub start: u32,
    /// Exclusive end; `None` for the last run
    pub end: Option<u32>,
    pub style: u32,
}

/// One node of a cluster's value tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueNode {
    /// Parent node id, negative for roots
    pub parent: i32,
    pub id: u32,
    pub kind: u16,
    pub flags: u32,
    pub fields: Vec<Field>,
}

/// Formula placement in a spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormulaPosition {
    pub row: u32,
    pub col: u32,
    /// Index into the formula definitions
    pub formula: u32,
}

/// A decoded cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub zone_id: u32,
    pub cluster_type: ClusterType,
    pub type_code: u32,
    pub version: u16,
    pub flags: u32,
    pub name: Option<String>,
    /// Links in declaration order
    pub links: Vec<(LinkRole, Link)>,
    /// Declared parent (recorded, never followed), else the referencing cluster
    pub parent: Option<u32>,
    /// Child clusters, from cluster and child-zone lists
    pub children: Vec<u32>,
    pub type_directory: Vec<String>,
    pub names: Vec<String>,
    pub dimensions: Vec<Dimension>,
    pub value_tree: Vec<ValueNode>,
    pub plcs: BTreeMap<PlcKind, Vec<PlcEntry>>,
    pub paragraphs: Vec<String>,
    pub function_names: Vec<String>,
    pub cell_references: Vec<CellReference>,
    /// Raw formula records by formula index
    pub formula_definitions: BTreeMap<u32, Bytes>,
    pub formula_positions: Vec<FormulaPosition>,
    pub formula_def: Option<u32>,
    pub formula_pos: Option<u32>,
    pub styles: SmallVec<[u32; 1]>,
    /// Byte order of the cluster zone, shared by its data zones
    pub endian: Endian,
}

impl Cluster {
    pub fn new(zone_id: u32, endian: Endian) -> Self {
        Self {
            zone_id,
            cluster_type: ClusterType::Unknown(0),
            type_code: 0,
            version: 0,
            flags: 0,
            name: None,
            links: Vec::new(),
            parent: None,
            children: Vec::new(),
            type_directory: Vec::new(),
            names: Vec::new(),
            dimensions: Vec::new(),
            value_tree: Vec::new(),
            plcs: BTreeMap::new(),
            paragraphs: Vec::new(),
            function_names: Vec::new(),
            cell_references: Vec::new(),
            formula_definitions: BTreeMap::new(),
            formula_positions: Vec::new(),
            formula_def: None,
            formula_pos: None,
            styles: SmallVec::new(),
            endian,
        }
    }

    /// First link with the given role.
    pub fn link(&self, role: LinkRole) -> Option<&Link> {
        self.links.iter().find(|(r, _)| *r == role).map(|(_, link)| link)
    }

    /// Style runs of one PLC table as `[start, end)` ranges.
    pub fn plc_runs(&self, kind: PlcKind) -> Vec<PlcRun> {
        let Some(entries) = self.plcs.get(&kind) else {
            return Vec::new();
        };
        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| PlcRun {
                start: entry.position,
                end: entries.get(i + 1).map(|next| next.position),
                style: entry.style,
            })
            .collect()
    }
}

/// Struct visitor decoding a cluster zone's own records.
pub(crate) struct ClusterHeaderVisitor {
    pub cluster: Cluster,
}

impl ClusterHeaderVisitor {
    pub fn new(zone_id: u32, endian: Endian) -> Self {
        Self {
            cluster: Cluster::new(zone_id, endian),
        }
    }
}

impl StructVisitor for ClusterHeaderVisitor {
    fn header_size(&self, index: usize) -> usize {
        if index == 0 {
            FIRST_HEADER_SIZE
        } else {
            RECORD_HEADER_SIZE
        }
    }

    fn visit_header(&mut self, index: usize, header: &mut ByteStream) -> bool {
        if index != 0 {
            return match (header.read_u32(), header.read_u32()) {
                (Ok(record_type), Ok(flags)) => {
                    log::trace!(
                        "ragtime5: Zone{} record {index} type {record_type:#x} flags {flags:#x}",
                        self.cluster.zone_id
                    );
                    true
                },
                _ => false,
            };
        }
        let Ok((type_code, zone_echo, version, flags)) = read_first_header(header) else {
            return false;
        };
        if zone_echo != self.cluster.zone_id {
            log::debug!(
                "ragtime5: Zone{} header names zone {zone_echo}",
                self.cluster.zone_id
            );
        }
        self.cluster.type_code = type_code;
        self.cluster.cluster_type = ClusterType::from(type_code);
        self.cluster.version = version;
        self.cluster.flags = flags;
        true
    }

    fn visit_field(&mut self, _index: usize, field: &Field) -> bool {
        if field.type_code == NAME_FIELD {
            return match field.as_str() {
                Some(name) => {
                    self.cluster.name = Some(name.to_string());
                    true
                },
                None => false,
            };
        }
        let Some(&role) = LINK_ROLES.get(&field.type_code) else {
            log::trace!(
                "ragtime5: Zone{} ignores field {:#010x}",
                self.cluster.zone_id,
                field.type_code
            );
            return true;
        };
        let Some(blob) = field.as_bytes() else {
            return false;
        };
        match Link::parse(blob, self.cluster.endian, role.name()) {
            Ok(link) => {
                let expected_ref = role.is_cluster_ref();
                if expected_ref != (link.kind == LinkKind::ClusterRef) {
                    log::debug!(
                        "ragtime5: Zone{} {} link has layout {:?}",
                        self.cluster.zone_id,
                        role.name(),
                        link.kind
                    );
                }
                self.cluster.links.push((role, link));
                true
            },
            Err(err) => {
                log::debug!("ragtime5: Zone{} {}: {err}", self.cluster.zone_id, role.name());
                false
            },
        }
    }
}

fn read_first_header(header: &mut ByteStream) -> BinaryResult<(u32, u32, u16, u32)> {
    let type_code = header.read_u32()?;
    let zone_echo = header.read_u32()?;
    let version = header.read_u16()?;
    let flags = header.read_u32()?;
    Ok((type_code, zone_echo, version, flags))
}

#[cfg(test)]
pub(crate) mod builder {
    //! Cluster zone encoder for tests.

    use crate::ragtime5::field::builder as field;

    /// Cluster zone bytes (big-endian) with one record per link.
    pub fn cluster_zone(zone: u32, type_code: u32, name: Option<&str>, links: &[(u32, Vec<u8>)]) -> Vec<u8> {
        let mut first = Vec::new();
        first.extend_from_slice(&type_code.to_be_bytes());
        first.extend_from_slice(&zone.to_be_bytes());
        first.extend_from_slice(&1u16.to_be_bytes());
        first.extend_from_slice(&0u32.to_be_bytes());
        first.extend_from_slice(&0u32.to_be_bytes());
        if let Some(name) = name {
            field::unicode(&mut first, super::NAME_FIELD, name);
        }
        let mut records = vec![first];
        for (code, blob) in links {
            let mut record = vec![0, 0, 0, 2, 0, 0, 0, 0];
            field::blob(&mut record, *code, blob);
            records.push(record);
        }

        let mut out = Vec::new();
        for record in records {
            out.extend_from_slice(&((record.len() + 4) as u32).to_be_bytes());
            out.extend_from_slice(&record);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ragtime5::diagnostics::Diagnostics;
    use crate::ragtime5::link::encode_link;
    use crate::ragtime5::record::{RecordSource, read_struct};

    #[test]
    fn test_cluster_type_codes() {
        assert_eq!(ClusterType::from(0x0004_0000), ClusterType::Spreadsheet);
        assert_eq!(ClusterType::from(0x0008_0002), ClusterType::TextStyle);
        assert!(ClusterType::from(0x0008_0004).is_style());
        assert_eq!(ClusterType::from(0x0008_0009), ClusterType::Unknown(0x0008_0009));
    }

    #[test]
    fn test_link_role_table() {
        assert_eq!(LINK_ROLES.get(&0x0002_00d0), Some(&LinkRole::CellReferences));
        assert_eq!(LINK_ROLES.get(&0x0002_0110), None);
        assert!(LinkRole::StyleCluster.accepts(&ZoneKind::Cluster));
        assert!(!LinkRole::NameList.accepts(&ZoneKind::Cluster));
        assert_eq!(LinkRole::CellReferences.record_size(), Some(16));
    }

    #[test]
    fn test_decode_cluster_zone() {
        let data = builder::cluster_zone(
            7,
            0x0002_0000,
            Some("Body"),
            &[
                (0x0002_0100, encode_link(0, 20, 21, 0, &[], 2)),
                (0x0002_0080, encode_link(3, 1, 0, 0, &[], 0)),
                (0x0009_9999, vec![1, 2, 3]),
            ],
        );
        let source = RecordSource::new(7, ByteStream::new(Bytes::from(data), Endian::Big));
        let mut visitor = ClusterHeaderVisitor::new(7, Endian::Big);
        let mut diagnostics = Diagnostics::new();
        read_struct(&source, &mut visitor, &mut diagnostics).unwrap();
        assert!(diagnostics.is_empty());

        let cluster = visitor.cluster;
        assert_eq!(cluster.cluster_type, ClusterType::Text);
        assert_eq!(cluster.version, 1);
        assert_eq!(cluster.name.as_deref(), Some("Body"));
        assert_eq!(cluster.links.len(), 2);
        let text = cluster.link(LinkRole::TextContent).unwrap();
        assert_eq!(text.offsets, Some(21));
        assert_eq!(text.name, "textContent");
        assert_eq!(cluster.link(LinkRole::ParentLink).unwrap().kind, LinkKind::ClusterRef);
    }

    #[test]
    fn test_plc_runs() {
        let mut cluster = Cluster::new(1, Endian::Big);
        cluster.plcs.insert(
            PlcKind::Text,
            vec![PlcEntry { position: 0, style: 3 }, PlcEntry { position: 12, style: 4 }],
        );
        let runs = cluster.plc_runs(PlcKind::Text);
        assert_eq!(runs[0], PlcRun { start: 0, end: Some(12), style: 3 });
        assert_eq!(runs[1].end, None);
        assert!(cluster.plc_runs(PlcKind::Border).is_empty());
    }
}
