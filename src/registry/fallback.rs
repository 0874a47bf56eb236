//! Fallback degradation for excluded variants.
//!
//! Importing data that contains a variant outside the active profile's
//! allowed set must never fail; the offending node is rewritten into its
//! closest supported form instead.

use super::NodeTypeRegistry;
use crate::node::{NodeKind, NodeKindTag, NodeSpec};

/// Rewrites `spec` (recursively) so every kind it contains is allowed by
/// `registry`. Returns zero or more replacement specs.
pub fn degrade(registry: &NodeTypeRegistry, spec: NodeSpec) -> Vec<NodeSpec> {
    if registry.allows(spec.kind.tag()) {
        let children = spec
            .children
            .into_iter()
            .flat_map(|child| degrade(registry, child))
            .collect();
        return vec![NodeSpec {
            kind: spec.kind,
            state: spec.state,
            children,
        }];
    }

    tracing::debug!(
        kind = spec.kind.tag().name(),
        "excluded variant degraded to fallback"
    );

    match &spec.kind {
        NodeKind::Table => vec![block_text(registry, table_pipe_text(&spec))],
        NodeKind::Diff(_) => {
            // The preserved deletion payload is the authoritative content of
            // a pending proposal.
            let deletion = spec
                .children
                .into_iter()
                .find(|child| child.kind.tag() == NodeKindTag::DiffDelete);
            match deletion {
                Some(deletion) => deletion
                    .children
                    .into_iter()
                    .flat_map(|child| degrade(registry, child))
                    .collect(),
                None => Vec::new(),
            }
        }
        NodeKind::DiffInsert(insert) => vec![block_text(registry, insert.markdown.clone())],
        NodeKind::Media(_) | NodeKind::CodeBlock(_) => {
            let text = spec.kind.display_text().unwrap_or_default();
            vec![block_text(registry, text)]
        }
        NodeKind::Equation(eq) if !eq.inline => {
            let text = spec.kind.display_text().unwrap_or_default();
            vec![block_text(registry, text)]
        }
        NodeKind::HorizontalRule => Vec::new(),
        _ => match spec.kind.display_text() {
            Some(text) => vec![NodeSpec::text(text)],
            // Structural wrappers degrade by promoting their children.
            None => spec
                .children
                .into_iter()
                .flat_map(|child| degrade(registry, child))
                .collect(),
        },
    }
}

fn block_text(registry: &NodeTypeRegistry, text: String) -> NodeSpec {
    if registry.allows(NodeKindTag::Paragraph) {
        NodeSpec::paragraph(text)
    } else {
        NodeSpec::text(text)
    }
}

fn table_pipe_text(table: &NodeSpec) -> String {
    let mut lines = Vec::new();
    for row in &table.children {
        if row.kind.tag() != NodeKindTag::TableRow {
            continue;
        }
        let cells: Vec<String> = row
            .children
            .iter()
            .filter(|cell| cell.kind.tag() == NodeKindTag::TableCell)
            .map(|cell| cell.plain_text().replace('\n', " "))
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));
    }
    lines.join("\n")
}
