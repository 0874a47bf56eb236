//! Table conversion rules.
//!
//! The internal form is a tag wrapping per-row, per-cell tags; cell contents
//! run through the full applicable rule set recursively, so a cell may hold
//! a mention or an equation. The external form is a GitHub-style pipe table
//! with header-divider detection and column-count reconciliation across
//! adjacent rows.

use super::tags;
use super::{BlockReplacement, ElementRule, ExportCtx, ImportCtx};
use crate::node::{Node, NodeKind, NodeKindTag, NodeSpec, NodeState};

const TABLE: &str = "m-table";
const ROW: &str = "m-tr";
const CELL: &str = "m-td";

/// Lossless nested-tag table form.
pub struct TableTagRule;

impl TableTagRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TableTagRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRule for TableTagRule {
    fn name(&self) -> &'static str {
        "table-tag"
    }

    fn export(&self, ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        if node.kind.tag() != NodeKindTag::Table {
            return None;
        }
        let mut lines = Vec::new();
        lines.push(format!("{}{}", tags::open(TABLE), tags::encode_state(&node.state)));
        for &row_key in &node.children {
            let Some(row) = ctx.tree.get(row_key) else {
                continue;
            };
            if row.kind.tag() != NodeKindTag::TableRow {
                continue;
            }
            lines.push(format!("{}{}", tags::open(ROW), tags::encode_state(&row.state)));
            for &cell_key in &row.children {
                let Some(cell) = ctx.tree.get(cell_key) else {
                    continue;
                };
                if cell.kind.tag() != NodeKindTag::TableCell {
                    continue;
                }
                lines.push(format!("{}{}", tags::open(CELL), tags::encode_state(&cell.state)));
                let body = ctx.export_blocks(&cell.children);
                if !body.is_empty() {
                    lines.push(body);
                }
                lines.push(tags::close(CELL));
            }
            lines.push(tags::close(ROW));
        }
        lines.push(tags::close(TABLE));
        Some(lines.join("\n"))
    }

    fn replace(
        &self,
        ctx: &ImportCtx<'_>,
        lines: &[&str],
        at: usize,
    ) -> Option<BlockReplacement> {
        let block = tags::parse_tag_block(lines, at, TABLE)?;
        let table_state = tags::decode_state(block.payload)?;

        let mut rows = Vec::new();
        let mut index = 0;
        while index < block.body.len() {
            if block.body[index].trim().is_empty() {
                index += 1;
                continue;
            }
            // Anything that is not a row tag makes the whole structure
            // invalid; the raw text falls through untouched.
            let row_block = tags::parse_tag_block(&block.body, index, ROW)?;
            let row_state = tags::decode_state(row_block.payload)?;
            let cells = parse_cells(ctx, &row_block.body)?;
            rows.push(
                NodeSpec::with_children(NodeKind::TableRow, cells).with_state(row_state),
            );
            index += row_block.consumed;
        }

        let table = reconcile_columns(ctx, rows)?;
        Some(BlockReplacement {
            consumed: block.consumed,
            specs: vec![table.with_state(table_state)],
        })
    }
}

fn parse_cells(ctx: &ImportCtx<'_>, body: &[&str]) -> Option<Vec<NodeSpec>> {
    let mut cells = Vec::new();
    let mut index = 0;
    while index < body.len() {
        if body[index].trim().is_empty() {
            index += 1;
            continue;
        }
        let cell_block = tags::parse_tag_block(body, index, CELL)?;
        let cell_state = tags::decode_state(cell_block.payload)?;
        let children = ctx.nested().parse_blocks(&cell_block.body);
        cells.push(
            NodeSpec::with_children(NodeKind::TableCell, children).with_state(cell_state),
        );
        index += cell_block.consumed;
    }
    Some(cells)
}

/// Pads every row to the widest row's column count with empty cells.
fn reconcile_columns(ctx: &ImportCtx<'_>, mut rows: Vec<NodeSpec>) -> Option<NodeSpec> {
    let columns = rows.iter().map(|row| row.children.len()).max().unwrap_or(0);
    if columns == 0 {
        return None;
    }
    if columns > ctx.limits().max_table_columns {
        tracing::warn!(columns, "table over column limit; left as text");
        return None;
    }
    for row in &mut rows {
        while row.children.len() < columns {
            row.children
                .push(NodeSpec::new(NodeKind::TableCell).with_state(NodeState::default()));
        }
    }
    Some(NodeSpec::with_children(NodeKind::Table, rows))
}

/// GitHub-style pipe table form.
pub struct PipeTableRule;

impl PipeTableRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PipeTableRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRule for PipeTableRule {
    fn name(&self) -> &'static str {
        "pipe-table"
    }

    fn export(&self, ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        if node.kind.tag() != NodeKindTag::Table {
            return None;
        }
        let mut rows: Vec<Vec<String>> = Vec::new();
        for &row_key in &node.children {
            let Some(row) = ctx.tree.get(row_key) else {
                continue;
            };
            if row.kind.tag() != NodeKindTag::TableRow {
                continue;
            }
            let cells = row
                .children
                .iter()
                .filter_map(|&cell_key| {
                    let cell = ctx.tree.get(cell_key)?;
                    (cell.kind.tag() == NodeKindTag::TableCell)
                        .then(|| ctx.export_blocks(&cell.children).replace('\n', " "))
                })
                .collect();
            rows.push(cells);
        }

        let mut columns = 0;
        for row in &rows {
            columns = columns.max(row.len());
        }
        if columns == 0 {
            return Some(String::new());
        }

        let mut lines = Vec::with_capacity(rows.len() + 1);
        for (index, row) in rows.iter_mut().enumerate() {
            row.resize(columns, String::new());
            lines.push(format!("| {} |", row.join(" | ")));
            if index == 0 {
                let divider = vec!["---"; columns];
                lines.push(format!("| {} |", divider.join(" | ")));
            }
        }
        Some(lines.join("\n"))
    }

    fn replace(
        &self,
        ctx: &ImportCtx<'_>,
        lines: &[&str],
        at: usize,
    ) -> Option<BlockReplacement> {
        if !is_pipe_row(lines[at]) {
            return None;
        }
        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        let mut index = at;
        while index < lines.len() && is_pipe_row(lines[index]) {
            let cells = split_cells(lines[index]);
            if !is_divider(&cells) {
                raw_rows.push(cells);
            }
            index += 1;
        }
        if raw_rows.is_empty() {
            return None;
        }

        let rows: Vec<NodeSpec> = raw_rows
            .into_iter()
            .map(|cells| {
                let cell_specs = cells
                    .into_iter()
                    .map(|text| {
                        let children = if text.is_empty() {
                            Vec::new()
                        } else {
                            vec![NodeSpec::with_children(
                                NodeKind::Paragraph,
                                ctx.nested().parse_inline(&text),
                            )]
                        };
                        NodeSpec::with_children(NodeKind::TableCell, children)
                    })
                    .collect();
                NodeSpec::with_children(NodeKind::TableRow, cell_specs)
            })
            .collect();

        let table = reconcile_columns(ctx, rows)?;
        Some(BlockReplacement {
            consumed: index - at,
            specs: vec![table],
        })
    }
}

fn is_pipe_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() > 1 && trimmed.starts_with('|')
}

fn split_cells(line: &str) -> Vec<String> {
    let mut inner = line.trim();
    inner = inner.strip_prefix('|').unwrap_or(inner);
    inner = inner.strip_suffix('|').unwrap_or(inner);
    inner
        .split('|')
        .map(|cell| cell.trim().to_string())
        .collect()
}

/// A header divider row: every cell is dashes with optional alignment colons.
fn is_divider(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells.iter().all(|cell| {
            !cell.is_empty()
                && cell.contains('-')
                && cell.chars().all(|c| matches!(c, '-' | ':'))
        })
}
