//! Cluster resolution.
//!
//! Clusters reference zones anywhere in the directory, so resolution runs
//! off an explicit work stack instead of recursion. Each pending id may
//! carry an expectation (which cluster wants it and in which role); a
//! `seen` bitset keeps every zone to a single visit and the parent map
//! lets a reference to an ancestor be reported instead of followed.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use fixedbitset::FixedBitSet;

use crate::common::binary::{self, BinaryResult, Endian};
use crate::ragtime5::cluster::{
    Cluster, ClusterHeaderVisitor, Dimension, FormulaPosition, LinkRole, PlcEntry, PlcKind, ValueNode,
};
use crate::ragtime5::diagnostics::{DiagnosticKind, Diagnostics};
use crate::ragtime5::directory::ZoneGraph;
use crate::ragtime5::field::Field;
use crate::ragtime5::formula::CellReference;
use crate::ragtime5::link::{Link, LinkKind};
use crate::ragtime5::options::DecodeOptions;
use crate::ragtime5::record::{self, RecordSource, RecordVisitor, StructVisitor};
use crate::ragtime5::stream::ByteStream;
use crate::ragtime5::zone::ZoneKind;
use crate::ragtime5::Error;

/// Zone id space addressable by the directory (ids are 16-bit on disk).
const ID_SPACE: usize = 1 << 16;
/// Bytes shown per unknown zone when dumping.
const DUMP_LIMIT: usize = 64;
/// Header in front of every value tree record.
const VALUE_NODE_HEADER_SIZE: usize = 14;

/// Why a pending zone is expected.
#[derive(Debug, Clone)]
enum Expected {
    /// Another cluster, reached from `owner` (or requested directly)
    Cluster { owner: Option<u32>, role: Option<LinkRole> },
    /// Records feeding one field of `owner`
    Data { owner: u32, role: LinkRole, link: Link },
}

/// Worklist driven cluster resolver.
#[derive(Debug)]
pub struct ClusterResolver {
    pending: Vec<u32>,
    expected: HashMap<u32, Expected>,
    seen: FixedBitSet,
    /// Child cluster -> the cluster that first referenced it
    parents: HashMap<u32, u32>,
    clusters: BTreeMap<u32, Cluster>,
    root: Option<u32>,
    type_directory: Vec<String>,
    visits: usize,
    max_visits: usize,
    exhausted: bool,
    dump_unknown: bool,
}

impl ClusterResolver {
    pub fn new(options: &DecodeOptions) -> Self {
        Self {
            pending: Vec::new(),
            expected: HashMap::new(),
            seen: FixedBitSet::with_capacity(ID_SPACE),
            parents: HashMap::new(),
            clusters: BTreeMap::new(),
            root: None,
            type_directory: Vec::new(),
            visits: 0,
            max_visits: options.max_work_items,
            exhausted: false,
            dump_unknown: options.dump_unknown_zones,
        }
    }

    pub fn root(&self) -> Option<u32> {
        self.root
    }

    pub fn type_directory(&self) -> &[String] {
        &self.type_directory
    }

    pub fn cluster(&self, id: u32) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn is_seen(&self, id: u32) -> bool {
        self.seen.contains(id as usize)
    }

    pub(crate) fn into_clusters(self) -> BTreeMap<u32, Cluster> {
        self.clusters
    }

    /// Zone 1, else the lowest-id zone whose kind is a cluster.
    pub fn find_root(graph: &ZoneGraph) -> Option<u32> {
        if graph.index_of(1).is_some() {
            return Some(1);
        }
        graph
            .ids()
            .find(|&id| graph.zone_by_id(id).and_then(|z| z.kind()) == Some(ZoneKind::Cluster))
    }

    /// Resolve the root cluster and everything reachable from it.
    pub fn resolve_root(&mut self, graph: &mut ZoneGraph, diagnostics: &mut Diagnostics) -> Option<u32> {
        let root = Self::find_root(graph)?;
        self.root = Some(root);
        self.resolve_cluster(root, graph, diagnostics);
        Some(root)
    }

    /// Resolve one cluster and everything it references. A second call for
    /// the same id returns the stored cluster without decoding again.
    pub fn resolve_cluster(
        &mut self,
        id: u32,
        graph: &mut ZoneGraph,
        diagnostics: &mut Diagnostics,
    ) -> Option<&Cluster> {
        if !self.clusters.contains_key(&id) && !self.is_seen(id) {
            self.expected.insert(id, Expected::Cluster { owner: None, role: None });
            self.pending.push(id);
            self.run(graph, diagnostics);
        }
        self.clusters.get(&id)
    }

    /// Visit every zone no reference reached. Unreached clusters are
    /// resolved first so their links can still claim data zones; whatever
    /// is left afterwards gets the unknown-data treatment.
    pub fn resolve_remaining(&mut self, graph: &mut ZoneGraph, diagnostics: &mut Diagnostics) {
        let ids: Vec<u32> = graph.ids().collect();
        for &id in &ids {
            if self.is_seen(id) || self.exhausted {
                continue;
            }
            if graph.zone_by_id(id).and_then(|z| z.kind()) == Some(ZoneKind::Cluster) {
                self.expected.insert(id, Expected::Cluster { owner: None, role: None });
                self.pending.push(id);
                self.run(graph, diagnostics);
            }
        }
        for id in ids {
            if self.is_seen(id) || self.exhausted {
                continue;
            }
            self.pending.push(id);
            self.run(graph, diagnostics);
        }
    }

    /// Drain the work stack.
    pub fn run(&mut self, graph: &mut ZoneGraph, diagnostics: &mut Diagnostics) {
        while let Some(id) = self.pending.pop() {
            if self.exhausted {
                break;
            }
            self.visits += 1;
            if self.visits > self.max_visits {
                self.exhausted = true;
                diagnostics.push(
                    DiagnosticKind::ZoneCorrupt,
                    Some(id),
                    None,
                    format!("work limit of {} visits reached", self.max_visits),
                );
                break;
            }
            self.visit(id, graph, diagnostics);
        }
        if self.exhausted {
            self.pending.clear();
        }
    }

    fn mark_seen(&mut self, id: u32) -> bool {
        let bit = id as usize;
        if bit >= self.seen.len() {
            self.seen.grow(bit + 1);
        }
        !self.seen.put(bit)
    }

    fn visit(&mut self, id: u32, graph: &mut ZoneGraph, diagnostics: &mut Diagnostics) {
        let expected = self.expected.remove(&id);
        if !self.mark_seen(id) {
            log::trace!("ragtime5: Zone{id} already visited");
            return;
        }
        match expected {
            Some(Expected::Cluster { owner, role }) => self.read_cluster_zone(id, owner, role, graph, diagnostics),
            Some(Expected::Data { owner, role, link }) => {
                self.read_data_zone(id, owner, role, &link, graph, diagnostics)
            },
            None => self.dump_unknown_zone(id, graph, diagnostics),
        }
    }

    fn dump_unknown_zone(&mut self, id: u32, graph: &mut ZoneGraph, diagnostics: &mut Diagnostics) {
        let Some(index) = graph.index_of(id) else {
            return;
        };
        let kind = graph.zone(index).and_then(|z| z.kind());
        log::trace!("ragtime5: Zone{id} has no role (kind {kind:?})");
        if !self.dump_unknown {
            return;
        }
        if let Some(data) = graph.resolve(index, diagnostics) {
            let shown = &data[..data.len().min(DUMP_LIMIT)];
            let hex: String = shown.iter().map(|b| format!("{b:02x}")).collect();
            log::trace!("ragtime5: Zone{id} [{} bytes] {hex}", data.len());
        }
    }

    /// Check `id` against a zone kind predicate; zones without a kind pass.
    fn check_kind(
        graph: &ZoneGraph,
        id: u32,
        accepts: impl Fn(&ZoneKind) -> bool,
        what: &str,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        let Some(zone) = graph.zone_by_id(id) else {
            diagnostics.record(
                &Error::UnresolvedReference {
                    zone: id,
                    reason: format!("{what} zone not in directory"),
                },
                None,
            );
            return false;
        };
        match zone.kind() {
            Some(kind) if !accepts(&kind) => {
                diagnostics.push(
                    DiagnosticKind::UnresolvedReference,
                    Some(id),
                    Some(zone.header_offset as u64),
                    format!("{what} zone has kind {kind:?}"),
                );
                false
            },
            _ => true,
        }
    }

    fn read_cluster_zone(
        &mut self,
        id: u32,
        owner: Option<u32>,
        role: Option<LinkRole>,
        graph: &mut ZoneGraph,
        diagnostics: &mut Diagnostics,
    ) {
        let what = role.map_or("cluster", LinkRole::name);
        if !Self::check_kind(graph, id, |k| *k == ZoneKind::Cluster, what, diagnostics) {
            return;
        }
        let Some(index) = graph.index_of(id) else {
            return;
        };
        let Some(stream) = graph.stream(index, diagnostics) else {
            return;
        };
        let mut visitor = ClusterHeaderVisitor::new(id, stream.endian());
        let source = RecordSource::new(id, stream);
        if let Err(err) = record::read_struct(&source, &mut visitor, diagnostics) {
            diagnostics.record(&err.in_zone(id), None);
        }
        graph.mark_parsed(index);

        let mut cluster = visitor.cluster;
        cluster.parent = owner;
        log::debug!(
            "ragtime5: Zone{id} is a {:?} cluster with {} links",
            cluster.cluster_type,
            cluster.links.len()
        );

        // links run in declaration order, the type directory ahead of all
        let mut scheduled: Vec<(u32, Expected)> = Vec::new();
        let mut type_directory: Option<(u32, Expected)> = None;
        for (role, link) in cluster.links.clone() {
            if role.is_cluster_ref() {
                let target = link.data;
                match role {
                    LinkRole::ParentLink => {
                        cluster.parent = Some(target);
                        continue;
                    },
                    LinkRole::FormulaDef => cluster.formula_def = Some(target),
                    LinkRole::FormulaPos => cluster.formula_pos = Some(target),
                    _ => cluster.styles.push(target),
                }
                if let Some(work) = self.cluster_work(id, target, role, graph, diagnostics) {
                    scheduled.push(work);
                }
            } else if role.lists_clusters() && link.kind == LinkKind::LongList {
                for &target in &link.values {
                    cluster.children.push(target);
                    if let Some(work) = self.cluster_work(id, target, role, graph, diagnostics) {
                        scheduled.push(work);
                    }
                }
            } else {
                if !matches!(link.kind, LinkKind::List | LinkKind::FixedSize) {
                    log::debug!("ragtime5: Zone{id} {} link with layout {:?}", role.name(), link.kind);
                }
                if graph.index_of(link.data).is_none() {
                    diagnostics.record(
                        &Error::UnresolvedReference {
                            zone: link.data,
                            reason: format!("{} link of Zone{id}", role.name()),
                        },
                        None,
                    );
                    continue;
                }
                let work = (
                    link.data,
                    Expected::Data {
                        owner: id,
                        role,
                        link,
                    },
                );
                if role == LinkRole::TypeDirectory && type_directory.is_none() {
                    type_directory = Some(work);
                } else {
                    scheduled.push(work);
                }
            }
        }
        self.schedule(type_directory.into_iter().chain(scheduled));
        self.clusters.insert(id, cluster);
    }

    /// Expectation for a cluster reached from `owner`, unless the reference
    /// loops back to an ancestor or was already resolved.
    fn cluster_work(
        &mut self,
        owner: u32,
        target: u32,
        role: LinkRole,
        graph: &ZoneGraph,
        diagnostics: &mut Diagnostics,
    ) -> Option<(u32, Expected)> {
        if self.is_ancestor(target, owner) {
            diagnostics.record(&Error::CycleDetected { zone: target }, None);
            return None;
        }
        if self.is_seen(target) {
            return None;
        }
        if graph.index_of(target).is_none() {
            diagnostics.record(
                &Error::UnresolvedReference {
                    zone: target,
                    reason: format!("{} link of Zone{owner}", role.name()),
                },
                None,
            );
            return None;
        }
        self.parents.entry(target).or_insert(owner);
        Some((
            target,
            Expected::Cluster {
                owner: Some(owner),
                role: Some(role),
            },
        ))
    }

    /// Whether `candidate` is `node` itself or one of its ancestors.
    fn is_ancestor(&self, candidate: u32, node: u32) -> bool {
        let mut current = node;
        for _ in 0..=self.parents.len() {
            if current == candidate {
                return true;
            }
            match self.parents.get(&current) {
                Some(&parent) => current = parent,
                None => return false,
            }
        }
        false
    }

    fn data_source(
        &mut self,
        id: u32,
        link: &Link,
        graph: &mut ZoneGraph,
        diagnostics: &mut Diagnostics,
    ) -> Option<RecordSource> {
        let accepts = |k: &ZoneKind| matches!(k, ZoneKind::ItemData | ZoneKind::Unicode);
        if !Self::check_kind(graph, id, accepts, &link.name, diagnostics) {
            return None;
        }
        let index = graph.index_of(id)?;
        let data = graph.stream(index, diagnostics)?;
        graph.mark_parsed(index);
        let mut source = RecordSource::new(id, data);

        if let Some(offsets_id) = link.offsets {
            let what = format!("{} offsets", link.name);
            if !Self::check_kind(graph, offsets_id, accepts, &what, diagnostics) {
                return None;
            }
            let offsets_index = graph.index_of(offsets_id)?;
            self.mark_seen(offsets_id);
            let offsets = graph.stream(offsets_index, diagnostics)?;
            graph.mark_parsed(offsets_index);
            source = source.with_offsets(offsets);
        }
        Some(source)
    }

    fn read_data_zone(
        &mut self,
        id: u32,
        owner: u32,
        role: LinkRole,
        link: &Link,
        graph: &mut ZoneGraph,
        diagnostics: &mut Diagnostics,
    ) {
        let Some(source) = self.data_source(id, link, graph, diagnostics) else {
            return;
        };
        let endian = source.data.endian();
        let field_size = match (link.field_size, role.record_size()) {
            (0, Some(size)) => size,
            (size, _) => size as usize,
        };
        let count = link.count as usize;
        let mut cluster_ids = Vec::new();

        let result = match role {
            LinkRole::TypeDirectory | LinkRole::NameList | LinkRole::FunctionNames | LinkRole::TextContent => {
                let mut strings = Collect::new(|r: &mut ByteStream| Ok(read_string(r, endian)));
                let result = record::read_list(&source, &mut strings, diagnostics);
                let strings = strings.into_indexed(result.as_ref().map_or(0, |s| s.records));
                if role == LinkRole::TypeDirectory && self.root == Some(owner) {
                    self.type_directory = strings.clone();
                    graph.assign_kinds(&strings, diagnostics);
                }
                self.with_cluster(owner, |c| match role {
                    LinkRole::TypeDirectory => c.type_directory = strings,
                    LinkRole::NameList => c.names = strings,
                    LinkRole::FunctionNames => c.function_names = strings,
                    _ => c.paragraphs = strings,
                });
                result
            },
            LinkRole::FormulaDefinitions => {
                let mut records = Collect::new(|r: &mut ByteStream| {
                    let len = r.len();
                    r.read_bytes(len)
                });
                let result = record::read_list(&source, &mut records, diagnostics);
                let definitions: BTreeMap<u32, Bytes> =
                    records.items.into_iter().map(|(i, b)| (i as u32, b)).collect();
                self.with_cluster(owner, |c| c.formula_definitions = definitions);
                result
            },
            LinkRole::ClusterList | LinkRole::ChildZoneList => {
                let mut ids = Collect::new(|r: &mut ByteStream| r.read_u32());
                let result = record::read_fixed_size(&source, field_size, count, &mut ids, diagnostics);
                cluster_ids = ids.values();
                let children = cluster_ids.clone();
                self.with_cluster(owner, |c| c.children.extend(children));
                result
            },
            LinkRole::DimensionTable => {
                let mut items = Collect::new(|r: &mut ByteStream| {
                    Ok(Dimension {
                        position: r.read_u32()?,
                        size: r.read_u32()?,
                    })
                });
                let result = record::read_fixed_size(&source, field_size, count, &mut items, diagnostics);
                let items = items.values();
                self.with_cluster(owner, |c| c.dimensions = items);
                result
            },
            LinkRole::GraphicPlc | LinkRole::TextPlc | LinkRole::BorderPlc => {
                let mut items = Collect::new(|r: &mut ByteStream| {
                    Ok(PlcEntry {
                        position: r.read_u32()?,
                        style: r.read_u32()?,
                    })
                });
                let result = record::read_fixed_size(&source, field_size, count, &mut items, diagnostics);
                let items = items.values();
                if let Some(kind) = PlcKind::from_role(role) {
                    self.with_cluster(owner, |c| {
                        c.plcs.insert(kind, items);
                    });
                }
                result
            },
            LinkRole::CellReferences => {
                let mut items = Collect::new(CellReference::read);
                let result = record::read_fixed_size(&source, field_size, count, &mut items, diagnostics);
                let items = items.values();
                self.with_cluster(owner, |c| c.cell_references = items);
                result
            },
            LinkRole::FormulaPositions => {
                let mut items = Collect::new(|r: &mut ByteStream| {
                    Ok(FormulaPosition {
                        row: r.read_u32()?,
                        col: r.read_u32()?,
                        formula: r.read_u32()?,
                    })
                });
                let result = record::read_fixed_size(&source, field_size, count, &mut items, diagnostics);
                let items = items.values();
                self.with_cluster(owner, |c| c.formula_positions = items);
                result
            },
            LinkRole::ValueTree => {
                let mut tree = ValueTreeVisitor::default();
                let result = record::read_struct(&source, &mut tree, diagnostics);
                self.with_cluster(owner, |c| c.value_tree = tree.nodes);
                result
            },
            LinkRole::ParentLink | LinkRole::FormulaDef | LinkRole::FormulaPos | LinkRole::StyleCluster => {
                log::debug!("ragtime5: Zone{id} reached as data for {}", role.name());
                return;
            },
        };
        if let Err(err) = result {
            diagnostics.record(&err.in_zone(id), None);
        }

        let mut scheduled = Vec::new();
        for target in cluster_ids {
            if let Some(work) = self.cluster_work(owner, target, role, graph, diagnostics) {
                scheduled.push(work);
            }
        }
        self.schedule(scheduled);
    }

    /// Claim targets in order and push them so the first one pops first.
    /// A zone already claimed keeps its first expectation.
    fn schedule(&mut self, work: impl IntoIterator<Item = (u32, Expected)>) {
        let mut claimed = Vec::new();
        for (target, expected) in work {
            if self.is_seen(target) || self.expected.contains_key(&target) {
                log::debug!("ragtime5: Zone{target} already claimed, ignoring second reference");
                continue;
            }
            self.expected.insert(target, expected);
            claimed.push(target);
        }
        self.pending.extend(claimed.into_iter().rev());
    }

    fn with_cluster(&mut self, id: u32, update: impl FnOnce(&mut Cluster)) {
        match self.clusters.get_mut(&id) {
            Some(cluster) => update(cluster),
            None => log::debug!("ragtime5: data for Zone{id} arrived without its cluster"),
        }
    }
}

fn read_string(record: &mut ByteStream, endian: Endian) -> String {
    binary::decode_ucs2(&record.data()[record.position()..], endian)
}

/// Record visitor decoding each record with a closure.
struct Collect<T, F> {
    items: Vec<(usize, T)>,
    decode: F,
}

impl<T, F> Collect<T, F>
where
    F: FnMut(&mut ByteStream) -> BinaryResult<T>,
{
    fn new(decode: F) -> Self {
        Self {
            items: Vec::new(),
            decode,
        }
    }

    fn values(self) -> Vec<T> {
        self.items.into_iter().map(|(_, v)| v).collect()
    }
}

impl<F> Collect<String, F> {
    /// Strings placed at their record index, gaps left empty.
    fn into_indexed(self, records: usize) -> Vec<String> {
        let mut out = vec![String::new(); records];
        for (index, value) in self.items {
            if index >= out.len() {
                out.resize(index + 1, String::new());
            }
            out[index] = value;
        }
        out
    }
}

impl<T, F> RecordVisitor for Collect<T, F>
where
    F: FnMut(&mut ByteStream) -> BinaryResult<T>,
{
    fn visit_record(&mut self, index: usize, record: &mut ByteStream) -> bool {
        match (self.decode)(record) {
            Ok(value) => {
                self.items.push((index, value));
                true
            },
            Err(err) => {
                log::debug!("ragtime5: record {index}: {err}");
                false
            },
        }
    }
}

#[derive(Default)]
struct ValueTreeVisitor {
    nodes: Vec<ValueNode>,
}

impl StructVisitor for ValueTreeVisitor {
    fn header_size(&self, _index: usize) -> usize {
        VALUE_NODE_HEADER_SIZE
    }

    fn visit_header(&mut self, _index: usize, header: &mut ByteStream) -> bool {
        match read_value_node(header) {
            Ok(node) => {
                self.nodes.push(node);
                true
            },
            Err(_) => false,
        }
    }

    fn visit_field(&mut self, _index: usize, field: &Field) -> bool {
        match self.nodes.last_mut() {
            Some(node) => {
                node.fields.push(field.clone());
                true
            },
            None => false,
        }
    }
}

fn read_value_node(header: &mut ByteStream) -> BinaryResult<ValueNode> {
    Ok(ValueNode {
        parent: header.read_i32()?,
        id: header.read_u32()?,
        kind: header.read_u16()?,
        flags: header.read_u32()?,
        fields: Vec::new(),
    })
}

#[cfg(test)]
pub(crate) mod fixture {
    //! Synthetic containers assembled zone by zone.

    use bytes::Bytes;

    use crate::ragtime5::diagnostics::Diagnostics;
    use crate::ragtime5::directory::ZoneGraph;
    use crate::ragtime5::directory::builder::DirectoryBuilder;
    use crate::ragtime5::header::{HEADER_SIZE, MIN_DIRECTORY_LENGTH, build_header};
    use crate::ragtime5::unpack::pack_codes;

    /// Zones laid out back to back after `base` reserved bytes.
    #[derive(Default)]
    pub struct Container {
        pub base: usize,
        pub body: Vec<u8>,
        pub directory: DirectoryBuilder,
    }

    impl Container {
        pub fn new() -> Self {
            Self::default()
        }

        /// Container whose zones follow a file header.
        pub fn file() -> Self {
            Self {
                base: HEADER_SIZE,
                ..Self::default()
            }
        }

        /// Append a level-1 zone with optional type-directory kind index.
        pub fn zone(mut self, id: u16, data: &[u8], kind: Option<u16>) -> Self {
            let offset = (self.base + self.body.len()) as u32;
            self.body.extend_from_slice(data);
            let kinds = kind.map(|k| [k, 0]);
            self.directory = std::mem::take(&mut self.directory).zone(id, offset, data.len() as u32, kinds);
            self
        }

        pub fn graph(self) -> (ZoneGraph, Diagnostics) {
            let mut diagnostics = Diagnostics::new();
            let directory = self.directory.finish(0);
            let graph = ZoneGraph::parse(Bytes::from(self.body), Bytes::from(directory), &mut diagnostics)
                .expect("fixture directory");
            (graph, diagnostics)
        }

        /// Whole file: header, zones, then the (optionally packed) directory.
        pub fn build(self, compacted: bool) -> Vec<u8> {
            assert_eq!(self.base, HEADER_SIZE);
            let min_len = MIN_DIRECTORY_LENGTH as usize;
            let mut directory = self.directory.finish(min_len);
            if compacted {
                directory = pack_literals(&directory);
                assert!(directory.len() >= min_len);
            }
            let offset = (HEADER_SIZE + self.body.len()) as u32;
            let mut out = build_header(offset, directory.len() as u32, compacted, 0);
            out.extend_from_slice(&self.body);
            out.extend_from_slice(&directory);
            out
        }
    }

    /// Pack payload made of literal codes only.
    pub fn pack_literals(data: &[u8]) -> Vec<u8> {
        let mut codes = Vec::with_capacity(data.len() + 1);
        let mut width = 9u32;
        for (entries, &byte) in (1..).zip(data) {
            codes.push((u32::from(byte), width));
            if width < 16 && entries + 0x102 >= 1usize << width {
                width += 1;
            }
        }
        codes.push((0x101, width));
        pack_codes(data.len() as u32, &codes)
    }

    pub fn ucs2_list(items: &[&str]) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::new();
        let mut offsets = 0i32.to_be_bytes().to_vec();
        for item in items {
            for unit in item.encode_utf16() {
                data.extend_from_slice(&unit.to_be_bytes());
            }
            offsets.extend_from_slice(&(data.len() as i32).to_be_bytes());
        }
        (data, offsets)
    }

    pub fn u32s(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }
}
