//! The decoded document and its output interface.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::ragtime5::cluster::Cluster;
use crate::ragtime5::diagnostics::Diagnostic;
use crate::ragtime5::formula::{FormulaInstruction, render};
use crate::ragtime5::header::ContainerHeader;

/// Receiver of decoded content.
///
/// [`Document::send`] walks the cluster tree depth first and calls these
/// in document order. Every method except [`insert_text`] defaults to a
/// no-op.
///
/// [`insert_text`]: DocumentSink::insert_text
pub trait DocumentSink {
    fn open_section(&mut self, _cluster: &Cluster) {}

    fn close_section(&mut self, _cluster: &Cluster) {}

    /// One paragraph of a text cluster.
    fn insert_text(&mut self, text: &str);

    /// One decompiled formula placed at a spreadsheet cell.
    fn insert_formula(&mut self, _row: u32, _col: u32, _formula: &[FormulaInstruction]) {}
}

/// A decompiled formula joined with the cell that holds it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellFormula<'a> {
    /// Cluster owning the formula definitions
    pub definitions: u32,
    pub row: u32,
    pub col: u32,
    pub formula: u32,
    pub instructions: &'a [FormulaInstruction],
}

/// Everything one decode session produced.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    header: ContainerHeader,
    root: Option<u32>,
    clusters: BTreeMap<u32, Cluster>,
    /// Definition cluster -> formula index -> tokens
    formulas: BTreeMap<u32, BTreeMap<u32, Vec<FormulaInstruction>>>,
    diagnostics: Vec<Diagnostic>,
    unparsed: Vec<u32>,
}

impl Document {
    pub(crate) fn new(
        header: ContainerHeader,
        root: Option<u32>,
        clusters: BTreeMap<u32, Cluster>,
        formulas: BTreeMap<u32, BTreeMap<u32, Vec<FormulaInstruction>>>,
        diagnostics: Vec<Diagnostic>,
        unparsed: Vec<u32>,
    ) -> Self {
        Self {
            header,
            root,
            clusters,
            formulas,
            diagnostics,
            unparsed,
        }
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Zone id of the root cluster, if one was found.
    pub fn root(&self) -> Option<u32> {
        self.root
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn cluster(&self, id: u32) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    /// Decompiled formula `formula` of definition cluster `definitions`.
    pub fn formula(&self, definitions: u32, formula: u32) -> Option<&[FormulaInstruction]> {
        self.formulas.get(&definitions)?.get(&formula).map(Vec::as_slice)
    }

    /// Every formula placed in a cell, across all spreadsheets.
    pub fn cell_formulas(&self) -> Vec<CellFormula<'_>> {
        self.clusters.values().flat_map(|c| self.placed_formulas(c)).collect()
    }

    fn placed_formulas(&self, cluster: &Cluster) -> Vec<CellFormula<'_>> {
        let (Some(definitions), Some(positions)) = (cluster.formula_def, cluster.formula_pos) else {
            return Vec::new();
        };
        let (Some(table), Some(positions)) = (self.formulas.get(&definitions), self.clusters.get(&positions))
        else {
            return Vec::new();
        };
        positions
            .formula_positions
            .iter()
            .filter_map(|pos| {
                table.get(&pos.formula).map(|instructions| CellFormula {
                    definitions,
                    row: pos.row,
                    col: pos.col,
                    formula: pos.formula,
                    instructions,
                })
            })
            .collect()
    }

    /// Recoverable problems met while decoding, in the order they occurred.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Level-1 zones that no cluster or data pass consumed.
    pub fn unparsed_zones(&self) -> &[u32] {
        &self.unparsed
    }

    /// Walk the cluster tree from the root and feed `sink`.
    ///
    /// Without a root, every cluster lacking a parent starts its own tree.
    /// Each cluster is sent at most once even when several clusters list it
    /// as a child.
    pub fn send(&self, sink: &mut impl DocumentSink) {
        enum Step {
            Open(u32),
            Close(u32),
        }

        let starts: Vec<u32> = match self.root.filter(|r| self.clusters.contains_key(r)) {
            Some(root) => vec![root],
            None => self
                .clusters
                .values()
                .filter(|c| c.parent.is_none_or(|p| !self.clusters.contains_key(&p)))
                .map(|c| c.zone_id)
                .collect(),
        };
        let mut stack: Vec<Step> = starts.into_iter().rev().map(Step::Open).collect();
        let mut sent = HashSet::new();

        while let Some(step) = stack.pop() {
            match step {
                Step::Open(id) => {
                    if !sent.insert(id) {
                        continue;
                    }
                    let Some(cluster) = self.clusters.get(&id) else {
                        continue;
                    };
                    sink.open_section(cluster);
                    for paragraph in &cluster.paragraphs {
                        sink.insert_text(paragraph);
                    }
                    for placed in self.placed_formulas(cluster) {
                        sink.insert_formula(placed.row, placed.col, placed.instructions);
                    }
                    stack.push(Step::Close(id));
                    stack.extend(cluster.children.iter().rev().map(|&child| Step::Open(child)));
                },
                Step::Close(id) => {
                    if let Some(cluster) = self.clusters.get(&id) {
                        sink.close_section(cluster);
                    }
                },
            }
        }
    }

    /// Plain text of all text clusters, one paragraph per line. Formulas
    /// appear as `=` followed by their rendering.
    pub fn text(&self) -> String {
        let mut writer = TextWriter::default();
        self.send(&mut writer);
        writer.finish()
    }
}

#[derive(Default)]
struct TextWriter {
    out: String,
}

impl TextWriter {
    fn push_line(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn finish(self) -> String {
        self.out
    }
}

impl DocumentSink for TextWriter {
    fn insert_text(&mut self, text: &str) {
        self.push_line(text);
    }

    fn insert_formula(&mut self, _row: u32, _col: u32, formula: &[FormulaInstruction]) {
        let line = format!("={}", render(formula));
        self.push_line(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::binary::Endian;
    use crate::ragtime5::cluster::FormulaPosition;

    fn header() -> ContainerHeader {
        ContainerHeader {
            version: 5,
            directory_offset: 32,
            directory_length: 137,
            compacted: false,
        }
    }

    fn cluster(id: u32, parent: Option<u32>, children: &[u32], paragraphs: &[&str]) -> Cluster {
        let mut cluster = Cluster::new(id, Endian::Big);
        cluster.parent = parent;
        cluster.children = children.to_vec();
        cluster.paragraphs = paragraphs.iter().map(|p| p.to_string()).collect();
        cluster
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl DocumentSink for Recorder {
        fn open_section(&mut self, cluster: &Cluster) {
            self.events.push(format!("open {}", cluster.zone_id));
        }

        fn close_section(&mut self, cluster: &Cluster) {
            self.events.push(format!("close {}", cluster.zone_id));
        }

        fn insert_text(&mut self, text: &str) {
            self.events.push(format!("text {text}"));
        }

        fn insert_formula(&mut self, row: u32, col: u32, formula: &[FormulaInstruction]) {
            self.events.push(format!("formula {row},{col} {}", render(formula)));
        }
    }

    fn document(root: Option<u32>, clusters: Vec<Cluster>) -> Document {
        let clusters = clusters.into_iter().map(|c| (c.zone_id, c)).collect();
        Document::new(header(), root, clusters, BTreeMap::new(), Vec::new(), Vec::new())
    }

    #[test]
    fn test_send_walks_tree_once() {
        let doc = document(
            Some(1),
            vec![
                cluster(1, None, &[2, 3, 2], &[]),
                cluster(2, Some(1), &[1], &["a"]),
                cluster(3, Some(1), &[], &["b", "c"]),
            ],
        );
        let mut recorder = Recorder::default();
        doc.send(&mut recorder);
        assert_eq!(
            recorder.events,
            ["open 1", "open 2", "text a", "close 2", "open 3", "text b", "text c", "close 3", "close 1"]
        );
    }

    #[test]
    fn test_send_without_root_uses_orphans() {
        let doc = document(None, vec![cluster(4, None, &[], &["x"]), cluster(7, Some(99), &[], &["y"])]);
        assert_eq!(doc.text(), "x\ny\n");
    }

    #[test]
    fn test_cell_formulas_join_positions() {
        let mut sheet = cluster(1, None, &[2], &[]);
        sheet.formula_def = Some(3);
        sheet.formula_pos = Some(2);
        let mut positions = cluster(2, Some(1), &[], &[]);
        positions.formula_positions = vec![
            FormulaPosition { row: 0, col: 1, formula: 0 },
            FormulaPosition { row: 4, col: 0, formula: 9 },
        ];
        let mut table = BTreeMap::new();
        table.insert(0, vec![FormulaInstruction::cell(0, 0), FormulaInstruction::operator("+"), FormulaInstruction::Long(1)]);
        let mut formulas = BTreeMap::new();
        formulas.insert(3, table);
        let clusters = [sheet, positions].into_iter().map(|c| (c.zone_id, c)).collect();
        let doc = Document::new(header(), Some(1), clusters, formulas, Vec::new(), vec![8]);

        let placed = doc.cell_formulas();
        assert_eq!(placed.len(), 1);
        assert_eq!((placed[0].row, placed[0].col, placed[0].formula), (0, 1, 0));
        assert_eq!(doc.formula(3, 0).map(render).as_deref(), Some("A1+1"));
        assert_eq!(doc.formula(3, 9), None);
        assert_eq!(doc.unparsed_zones(), &[8]);

        let mut recorder = Recorder::default();
        doc.send(&mut recorder);
        assert_eq!(recorder.events, ["open 1", "formula 0,1 A1+1", "open 2", "close 2", "close 1"]);
    }
}
