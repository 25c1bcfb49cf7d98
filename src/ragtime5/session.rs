//! One decode of one container.
//!
//! A [`DecodeSession`] owns everything a decode touches: the zone graph,
//! the cluster resolver and the diagnostics list. Nothing is global, so
//! independent sessions never interact.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::ragtime5::cluster::Cluster;
use crate::ragtime5::diagnostics::{DiagnosticKind, Diagnostics};
use crate::ragtime5::directory::ZoneGraph;
use crate::ragtime5::document::Document;
use crate::ragtime5::formula::{self, FormulaContext, FormulaInstruction};
use crate::ragtime5::header::ContainerHeader;
use crate::ragtime5::options::DecodeOptions;
use crate::ragtime5::resolver::ClusterResolver;
use crate::ragtime5::unpack;
use crate::ragtime5::zone::Zone;
use crate::ragtime5::{Error, Result};

type FormulaTable = BTreeMap<u32, Vec<FormulaInstruction>>;

/// Decode state for one container.
#[derive(Debug)]
pub struct DecodeSession {
    options: DecodeOptions,
    header: ContainerHeader,
    graph: ZoneGraph,
    resolver: ClusterResolver,
    diagnostics: Diagnostics,
    /// Definition cluster -> decompiled formulas
    formulas: BTreeMap<u32, FormulaTable>,
}

impl DecodeSession {
    /// Validate the header, parse the zone directory and resolve the root
    /// cluster.
    ///
    /// Fails only when the container cannot be walked at all: bad magic,
    /// a directory outside the file, a compacted directory that does not
    /// unpack, or a directory without any zone.
    pub fn open(data: impl Into<Bytes>, options: DecodeOptions) -> Result<Self> {
        let data: Bytes = data.into();
        let header = ContainerHeader::parse(&data)?;

        let range = header.directory_range();
        if range.end > data.len() {
            return Err(Error::FatalHeader(format!(
                "zone directory {}..{} outside the {} byte file",
                range.start,
                range.end,
                data.len()
            )));
        }
        let mut directory = data.slice(range);
        if header.compacted {
            let unpacked = unpack::unpack(&directory)
                .map_err(|err| Error::FatalHeader(format!("compacted zone directory: {err}")))?;
            directory = Bytes::from(unpacked);
        }
        log::debug!(
            "ragtime5: version {} container, {} byte directory{}",
            header.version,
            directory.len(),
            if header.compacted { " (compacted)" } else { "" }
        );

        let mut diagnostics = Diagnostics::new();
        let mut graph = ZoneGraph::parse(data, directory, &mut diagnostics)?;
        let mut resolver = ClusterResolver::new(&options);
        if resolver.resolve_root(&mut graph, &mut diagnostics).is_none() {
            log::warn!("ragtime5: no root cluster among {} zones", graph.len());
        }

        Ok(Self {
            options,
            header,
            graph,
            resolver,
            diagnostics,
            formulas: BTreeMap::new(),
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn graph(&self) -> &ZoneGraph {
        &self.graph
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn root(&self) -> Option<u32> {
        self.resolver.root()
    }

    /// Look a zone up and make sure its bytes are available.
    pub fn resolve_zone(&mut self, id: u32) -> Result<&Zone> {
        let index = self.graph.index_of(id).ok_or_else(|| Error::UnresolvedReference {
            zone: id,
            reason: "not in the zone directory".to_string(),
        })?;
        if self.graph.resolve(index, &mut self.diagnostics).is_none() {
            return Err(Error::ZoneCorrupt {
                zone: id,
                reason: "byte ranges outside the container".to_string(),
            });
        }
        self.graph.zone(index).ok_or_else(|| Error::UnresolvedReference {
            zone: id,
            reason: "not in the zone directory".to_string(),
        })
    }

    /// Bytes of a zone after defragmentation and unpacking.
    pub fn zone_data(&mut self, id: u32) -> Result<Bytes> {
        self.resolve_zone(id)?;
        let index = self.graph.index_of(id).ok_or_else(|| Error::UnresolvedReference {
            zone: id,
            reason: "not in the zone directory".to_string(),
        })?;
        self.graph.resolve(index, &mut self.diagnostics).ok_or_else(|| Error::ZoneCorrupt {
            zone: id,
            reason: "payload unavailable".to_string(),
        })
    }

    /// Decode a cluster and everything it links to. Repeated calls return
    /// the stored cluster.
    pub fn read_cluster(&mut self, id: u32) -> Result<&Cluster> {
        self.resolver
            .resolve_cluster(id, &mut self.graph, &mut self.diagnostics)
            .ok_or_else(|| Error::UnresolvedReference {
                zone: id,
                reason: "not a decodable cluster".to_string(),
            })
    }

    /// Decompile formula `formula_id` of the formula definition cluster
    /// `def_cluster_id`.
    pub fn decompile_formula(&mut self, def_cluster_id: u32, formula_id: u32) -> Result<Vec<FormulaInstruction>> {
        if let Some(tokens) = self.formulas.get(&def_cluster_id).and_then(|t| t.get(&formula_id)) {
            return Ok(tokens.clone());
        }
        let cluster = self.read_cluster(def_cluster_id)?;
        let record = cluster
            .formula_definitions
            .get(&formula_id)
            .ok_or_else(|| Error::UnresolvedReference {
                zone: def_cluster_id,
                reason: format!("no formula {formula_id}"),
            })?;
        let context = FormulaContext::new(&cluster.function_names, &cluster.cell_references, cluster.endian);
        formula::decompile(record, &context)
    }

    /// Decompile every formula of a definition cluster and keep the
    /// results for the document. Failures become diagnostics; returns the
    /// number of formulas decoded.
    pub fn decompile_formulas(&mut self, def_cluster_id: u32) -> Result<usize> {
        let cluster = self.read_cluster(def_cluster_id)?.clone();
        let context = FormulaContext::new(&cluster.function_names, &cluster.cell_references, cluster.endian);

        let mut table = FormulaTable::new();
        for (&id, record) in &cluster.formula_definitions {
            match formula::decompile(record, &context) {
                Ok(tokens) => {
                    table.insert(id, tokens);
                },
                Err(err) => {
                    let offset = match &err {
                        Error::DecompileFailure { offset, .. } => Some(*offset as u64),
                        _ => None,
                    };
                    let mut message = format!("formula {id}: {err}");
                    if self.options.debug_formulas {
                        let code = formula::split_record(record, cluster.endian).map_or(&[][..], |(code, _)| code);
                        let listing = formula::render_debug(code);
                        log::trace!("ragtime5: Zone{def_cluster_id} formula {id}: {listing}");
                        message.push_str(" [");
                        message.push_str(&listing);
                        message.push(']');
                    }
                    self.diagnostics.push(
                        DiagnosticKind::DecompileFailure,
                        Some(def_cluster_id),
                        offset,
                        message,
                    );
                },
            }
        }
        let decoded = table.len();
        self.formulas.insert(def_cluster_id, table);
        Ok(decoded)
    }

    /// Visit the zones no link reached, decompile formulas, flush the
    /// zones nothing consumed, and hand everything over as a [`Document`].
    pub fn finish(mut self) -> Document {
        self.resolver.resolve_remaining(&mut self.graph, &mut self.diagnostics);

        if self.options.decompile_formulas {
            let definitions: Vec<u32> = self
                .resolver
                .clusters()
                .filter(|c| !c.formula_definitions.is_empty())
                .map(|c| c.zone_id)
                .collect();
            for id in definitions {
                if let Err(err) = self.decompile_formulas(id) {
                    self.diagnostics.record(&err, None);
                }
            }
        }

        let unparsed = self.graph.unparsed();
        for &id in &unparsed {
            self.diagnostics.push(DiagnosticKind::NotParsed, Some(id), None, "zone never consumed");
        }

        let root = self.resolver.root();
        Document::new(
            self.header,
            root,
            self.resolver.into_clusters(),
            self.formulas,
            self.diagnostics.into_vec(),
            unparsed,
        )
    }
}
