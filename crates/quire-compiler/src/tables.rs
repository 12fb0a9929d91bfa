//! Native tables via a three phase placeholder protocol.
//!
//! Table cell positions only exist once the service has built the table, so
//! the first batch carries a textual marker per table. Markers embed the
//! source fingerprint next to the ordinal, so marker-like text written by
//! the author never matches. Afterwards the
//! markers are located in a fresh snapshot and swapped for empty table
//! skeletons, and a second snapshot supplies the cell positions that content
//! is written into.
//!
//! Both phases edit back to front: skeletons in descending marker position,
//! cells from the last table's last cell to the first table's first cell.
//! Every request therefore sits before everything already edited and no
//! index needs offsetting.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use quire_common::docs::{
    DocumentId, DocumentService, DocumentSnapshot, Range, Request, StructuralElement, Table,
    TextStyle,
};
use quire_common::utf16_len;
use regex::Regex;

use crate::ast::{Node, NodeKind};
use crate::cursor::Cursor;
use crate::emitter::push_style;
use crate::error::TableError;

pub const MARKER_PREFIX: &str = "[[QUIRE_TABLE_";
pub const MARKER_SUFFIX: &str = "]]";

static MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[QUIRE_TABLE_([0-9a-f]+)_(\d+)\]\]").unwrap());

/// Marker text standing in for table `ordinal` of the document with
/// `fingerprint` until its skeleton exists.
pub fn placeholder(fingerprint: &str, ordinal: usize) -> String {
    format!("{MARKER_PREFIX}{fingerprint}_{ordinal}{MARKER_SUFFIX}")
}

/// A table deferred by the emitter.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan<'a> {
    pub ordinal: usize,
    pub node: &'a Node,
    pub rows: usize,
    pub columns: usize,
}

impl<'a> TablePlan<'a> {
    pub fn new(ordinal: usize, node: &'a Node) -> Self {
        let (rows, columns) = node.table_shape();
        Self {
            ordinal,
            node,
            rows,
            columns,
        }
    }

    fn cell(&self, row: usize, column: usize) -> Option<&'a Node> {
        self.node.children.get(row)?.children.get(column)
    }
}

/// A marker found in a snapshot. `depth` counts enclosing tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderMatch {
    pub ordinal: usize,
    pub start: usize,
    pub end: usize,
    pub depth: usize,
}

impl PlaceholderMatch {
    pub fn range(&self) -> Range {
        Range::new(self.start, self.end)
    }
}

/// Every marker carrying `fingerprint` in the body, including those inside
/// table cells.
pub fn locate_placeholders(
    snapshot: &DocumentSnapshot,
    fingerprint: &str,
) -> Vec<PlaceholderMatch> {
    let mut found = Vec::new();
    scan(&snapshot.body.content, fingerprint, 0, &mut found);
    found
}

fn scan(
    content: &[StructuralElement],
    fingerprint: &str,
    depth: usize,
    found: &mut Vec<PlaceholderMatch>,
) {
    for element in content {
        if element.paragraph.is_some() {
            let text = element.text();
            for captures in MARKER_REGEX.captures_iter(&text) {
                let (Some(whole), Some(key), Some(digits)) =
                    (captures.get(0), captures.get(1), captures.get(2))
                else {
                    continue;
                };
                if key.as_str() != fingerprint {
                    continue;
                }
                let Ok(ordinal) = digits.as_str().parse() else {
                    continue;
                };
                let start = element.start_index + utf16_len(&text[..whole.start()]);
                found.push(PlaceholderMatch {
                    ordinal,
                    start,
                    end: start + utf16_len(whole.as_str()),
                    depth,
                });
            }
        }
        if let Some(table) = &element.table {
            for row in &table.table_rows {
                for cell in &row.table_cells {
                    scan(&cell.content, fingerprint, depth + 1, found);
                }
            }
        }
    }
}

/// Result of the skeleton phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placement {
    /// Ordinals that now have a skeleton, ascending. Their skeletons appear
    /// in the document in this order.
    pub placed: Vec<usize>,
    /// Ordinals whose marker was not found.
    pub missing: Vec<usize>,
    /// Markers found inside table cells, which are not materialized.
    pub nested: Vec<usize>,
    /// Ordinals whose marker appears more than once; none of the copies is
    /// replaced.
    pub ambiguous: Vec<usize>,
}

impl Placement {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.nested.is_empty() && self.ambiguous.is_empty()
    }
}

/// The planned markers found exactly once at top level, plus the ordinals
/// that are nested, duplicated or absent.
pub fn select_placeholders(
    found: &[PlaceholderMatch],
    plans: &[TablePlan<'_>],
) -> (Vec<PlaceholderMatch>, Placement) {
    let mut by_ordinal: BTreeMap<usize, Vec<PlaceholderMatch>> = BTreeMap::new();
    for m in found {
        if m.ordinal >= plans.len() {
            tracing::warn!(ordinal = m.ordinal, "marker without a planned table, ignoring");
            continue;
        }
        by_ordinal.entry(m.ordinal).or_default().push(*m);
    }

    let mut selected = Vec::new();
    let mut placement = Placement::default();
    for plan in plans {
        match by_ordinal.get(&plan.ordinal).map(Vec::as_slice) {
            None | Some([]) => placement.missing.push(plan.ordinal),
            Some([m]) if m.depth == 0 => {
                selected.push(*m);
                placement.placed.push(plan.ordinal);
            }
            Some([m]) => {
                tracing::warn!(
                    ordinal = m.ordinal,
                    depth = m.depth,
                    "nested tables are not supported"
                );
                placement.nested.push(plan.ordinal);
            }
            Some(copies) => {
                tracing::warn!(
                    ordinal = plan.ordinal,
                    copies = copies.len(),
                    "table marker appears more than once"
                );
                placement.ambiguous.push(plan.ordinal);
            }
        }
    }
    (selected, placement)
}

/// Delete each marker and insert a skeleton in its place, last marker first.
pub fn skeleton_requests(
    selected: &[PlaceholderMatch],
    plans: &[TablePlan<'_>],
) -> Vec<Request> {
    let mut ordered = selected.to_vec();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));
    ordered
        .iter()
        .filter_map(|m| {
            let plan = plans.get(m.ordinal)?;
            Some([
                Request::delete(m.range()),
                Request::insert_table(m.start, plan.rows, plan.columns),
            ])
        })
        .flatten()
        .collect()
}

/// Phase 2: locate markers and replace them with empty tables.
#[tracing::instrument(skip(service, plans), fields(tables = plans.len()))]
pub async fn place_skeletons<D: DocumentService>(
    service: &D,
    document: &DocumentId,
    fingerprint: &str,
    plans: &[TablePlan<'_>],
) -> Result<Placement, TableError> {
    let snapshot = service.get(document).await.map_err(TableError::Service)?;
    let found = locate_placeholders(&snapshot, fingerprint);
    let existing = snapshot.tables().count();

    // Markers are consumed by a successful pass; a rerun sees only tables.
    if found.is_empty() && existing == plans.len() {
        tracing::debug!(existing, "skeletons already in place");
        return Ok(Placement {
            placed: plans.iter().map(|p| p.ordinal).collect(),
            ..Default::default()
        });
    }
    if existing > 0 {
        return Err(TableError::PlaceholderMissing {
            expected: plans.len(),
            missing: plans.len().saturating_sub(found.len()),
        });
    }

    let (selected, placement) = select_placeholders(&found, plans);
    if !placement.missing.is_empty() {
        tracing::warn!(missing = ?placement.missing, "table markers not found");
    }
    let requests = skeleton_requests(&selected, plans);
    if !requests.is_empty() {
        service
            .batch_update(document, &requests)
            .await
            .map_err(TableError::Service)?;
    }
    Ok(placement)
}

/// Check a snapshot table against its plan.
pub fn check_shape(plan: &TablePlan<'_>, table: &Table) -> Result<(), TableError> {
    let found_rows = table.table_rows.len();
    let found_columns = table
        .table_rows
        .iter()
        .map(|row| row.table_cells.len())
        .max()
        .unwrap_or(0);
    if found_rows == plan.rows && found_columns == plan.columns {
        Ok(())
    } else {
        Err(TableError::ShapeMismatch {
            ordinal: plan.ordinal,
            rows: plan.rows,
            columns: plan.columns,
            found_rows,
            found_columns,
        })
    }
}

/// Pair placed plans with the snapshot's top-level tables, in order.
pub fn pair_tables<'s, 'p, 'a>(
    snapshot: &'s DocumentSnapshot,
    plans: &'p [TablePlan<'a>],
    placed: &[usize],
) -> Result<Vec<(&'p TablePlan<'a>, &'s Table)>, TableError> {
    let tables: Vec<_> = snapshot.tables().map(|(_, table)| table).collect();
    if tables.len() != placed.len() {
        return Err(TableError::CountMismatch {
            expected: placed.len(),
            found: tables.len(),
        });
    }
    let mut pairs = Vec::with_capacity(tables.len());
    for (ordinal, table) in placed.iter().zip(tables) {
        let Some(plan) = plans.iter().find(|p| p.ordinal == *ordinal) else {
            continue;
        };
        check_shape(plan, table)?;
        pairs.push((plan, table));
    }
    Ok(pairs)
}

/// Content requests for every blank cell, last cell of the last table first.
///
/// Cells that already hold text are skipped, so running population again
/// after a partial success only fills what is still empty.
pub fn population_requests(pairs: &[(&TablePlan<'_>, &Table)]) -> Vec<Request> {
    let mut requests = Vec::new();
    for (plan, table) in pairs.iter().rev() {
        for (r, row) in table.table_rows.iter().enumerate().rev() {
            for (c, cell) in row.table_cells.iter().enumerate().rev() {
                let Some(content) = plan.cell(r, c) else {
                    continue;
                };
                if !cell.is_blank() {
                    continue;
                }
                let mut emitter = CellEmitter::new(cell.content_start());
                emitter.emit(content);
                requests.extend(emitter.requests);
            }
        }
    }
    requests
}

/// Result of the population phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Population {
    pub tables: usize,
    pub requests: usize,
}

/// Phase 3: write cell content into the skeletons.
#[tracing::instrument(skip(service, plans, placed), fields(tables = placed.len()))]
pub async fn populate_tables<D: DocumentService>(
    service: &D,
    document: &DocumentId,
    plans: &[TablePlan<'_>],
    placed: &[usize],
) -> Result<Population, TableError> {
    let snapshot = service.get(document).await.map_err(TableError::Service)?;
    let pairs = pair_tables(&snapshot, plans, placed)?;
    let requests = population_requests(&pairs);
    if !requests.is_empty() {
        service
            .batch_update(document, &requests)
            .await
            .map_err(TableError::Service)?;
    }
    Ok(Population {
        tables: pairs.len(),
        requests: requests.len(),
    })
}

/// Inline-only emission into one cell, from the cell's own cursor.
struct CellEmitter {
    cursor: Cursor,
    requests: Vec<Request>,
}

impl CellEmitter {
    fn new(start: usize) -> Self {
        Self {
            cursor: Cursor::at(start),
            requests: Vec::new(),
        }
    }

    fn insert(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let at = self.cursor.advance_text(text);
        self.requests.push(Request::insert_text(at, text));
    }

    fn styled(&mut self, node: &Node, style: TextStyle) {
        let start = self.cursor.index();
        self.children(node);
        let end = self.cursor.index();
        push_style(&mut self.requests, start, end, style);
    }

    fn children(&mut self, node: &Node) {
        for child in &node.children {
            self.emit(child);
        }
    }

    fn emit(&mut self, node: &Node) {
        match &node.kind {
            NodeKind::Text(value) | NodeKind::InlineCode(value) => self.insert(value),
            NodeKind::Strong => self.styled(node, TextStyle::bold()),
            NodeKind::Emphasis => self.styled(node, TextStyle::italic()),
            _ => self.children(node),
        }
    }
}

/// How the table stage ended.
#[derive(Debug, Default)]
pub enum TableOutcome {
    /// The document has no native tables.
    #[default]
    None,
    Complete {
        tables: usize,
    },
    Partial {
        expected: usize,
        completed: usize,
        problems: Vec<TableError>,
    },
}

impl TableOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, TableOutcome::Partial { .. })
    }
}
