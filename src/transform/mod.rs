//! Bidirectional markdown transformation pipeline.
//!
//! Conversion between the live tree and markdown-with-tags text is driven by
//! two rule shapes: [`ElementRule`] matches at block granularity over a line
//! window, [`TextRule`] matches inline spans via a regular expression. Rules
//! are pure values producing [`NodeSpec`] trees, so each is unit-testable
//! without a live tree; the arena materializes specs inside a transaction.
//!
//! Three named sets are exposed: the lossless internal set, the portable
//! (lossy) external set, and the combined superset for mixed import. Expected
//! failures never escape a rule: malformed payloads and boundary violations
//! degrade to unconverted text.

use crate::node::{Node, NodeKey, NodeKind, NodeKindTag, NodeSpec, PeerId};
use crate::registry::{NodeTypeRegistry, Profile, fallback};
use crate::tree::{DocTree, TreeError, UpdateTag};
use regex::{Captures, Regex};

pub mod block;
pub mod diff;
pub mod equation;
pub mod mention;
pub mod search;
pub mod table;
pub mod tags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSetKind {
    /// Lossless: every custom variant round-trips via tagged JSON payloads.
    Internal,
    /// Portable plain markdown; custom variants export their display form.
    External,
    /// Superset accepting both internal tags and external markdown.
    Combined,
}

/// Resource limits for imports. Exceeding a limit degrades the match to
/// plain text; it never aborts the import.
#[derive(Debug, Clone)]
pub struct ImportLimits {
    pub max_tag_payload_bytes: usize,
    pub max_table_columns: usize,
    pub max_nesting_depth: usize,
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self {
            max_tag_payload_bytes: 4096,
            max_table_columns: 64,
            max_nesting_depth: 16,
        }
    }
}

/// Outcome of an element rule match: how many lines it consumed and the
/// block specs replacing them.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockReplacement {
    pub consumed: usize,
    pub specs: Vec<NodeSpec>,
}

/// Block-granularity conversion rule.
pub trait ElementRule {
    fn name(&self) -> &'static str;
    /// Serializes `node` if this rule owns its kind, `None` otherwise.
    fn export(&self, ctx: &ExportCtx<'_>, node: &Node) -> Option<String>;
    /// Attempts a match at `lines[at]`; `None` falls through to the next
    /// rule and ultimately to paragraph text.
    fn replace(&self, ctx: &ImportCtx<'_>, lines: &[&str], at: usize) -> Option<BlockReplacement>;
}

/// Inline-span conversion rule driven by a regular expression.
pub trait TextRule {
    fn name(&self) -> &'static str;
    fn pattern(&self) -> &Regex;
    fn export(&self, ctx: &ExportCtx<'_>, node: &Node) -> Option<String>;
    /// Converts a regex match; `None` leaves the matched span as raw text.
    fn replace(&self, ctx: &ImportCtx<'_>, caps: &Captures<'_>) -> Option<NodeSpec>;
}

pub struct RuleSet {
    kind: RuleSetKind,
    element_rules: Vec<Box<dyn ElementRule>>,
    text_rules: Vec<Box<dyn TextRule>>,
    limits: ImportLimits,
}

impl RuleSet {
    pub fn internal() -> Self {
        Self::build(RuleSetKind::Internal)
    }

    pub fn external() -> Self {
        Self::build(RuleSetKind::External)
    }

    pub fn combined() -> Self {
        Self::build(RuleSetKind::Combined)
    }

    pub fn kind(&self) -> RuleSetKind {
        self.kind
    }

    pub fn limits(&self) -> &ImportLimits {
        &self.limits
    }

    pub fn with_limits(mut self, limits: ImportLimits) -> Self {
        self.limits = limits;
        self
    }

    fn build(kind: RuleSetKind) -> Self {
        let internal = matches!(kind, RuleSetKind::Internal | RuleSetKind::Combined);
        let external = matches!(kind, RuleSetKind::External | RuleSetKind::Combined);

        let mut element_rules: Vec<Box<dyn ElementRule>> = Vec::new();
        let mut text_rules: Vec<Box<dyn TextRule>> = Vec::new();

        if internal {
            element_rules.push(Box::new(table::TableTagRule::new()));
            element_rules.push(Box::new(diff::DiffTagRule::new()));
            element_rules.push(Box::new(block::ClassedBlockRule::new()));
            element_rules.push(Box::new(block::MediaTagRule::new()));
            element_rules.push(Box::new(equation::EquationTagBlockRule::new()));
        }
        element_rules.push(Box::new(block::CodeFenceRule::new()));
        element_rules.push(Box::new(block::HorizontalRuleRule::new()));
        if external {
            element_rules.push(Box::new(equation::DollarFenceRule::new()));
            element_rules.push(Box::new(table::PipeTableRule::new()));
            element_rules.push(Box::new(block::ImageRule::new()));
        }

        if internal {
            text_rules.extend(mention::internal_rules());
            text_rules.push(Box::new(equation::EquationTagInlineRule::new()));
            text_rules.push(Box::new(mention::CommentMarkRule::new()));
        }
        if external {
            text_rules.extend(mention::external_rules());
            text_rules.push(Box::new(equation::DollarBlockTextRule::new()));
            text_rules.push(Box::new(equation::DollarInlineRule::new()));
        }

        Self {
            kind,
            element_rules,
            text_rules,
            limits: ImportLimits::default(),
        }
    }
}

/// Read-only export context: the committed tree plus the active rule set.
pub struct ExportCtx<'a> {
    pub tree: &'a DocTree,
    pub set: &'a RuleSet,
}

impl<'a> ExportCtx<'a> {
    pub fn export_blocks(&self, keys: &[NodeKey]) -> String {
        let mut rendered = Vec::new();
        for &key in keys {
            if let Some(output) = self.export_block(key)
                && !output.is_empty()
            {
                rendered.push(output);
            }
        }
        rendered.join("\n\n")
    }

    pub fn export_block(&self, key: NodeKey) -> Option<String> {
        let node = self.tree.get(key)?;
        for rule in &self.set.element_rules {
            if let Some(output) = rule.export(self, node) {
                return Some(output);
            }
        }
        match &node.kind {
            NodeKind::Root => Some(self.export_blocks(&node.children)),
            NodeKind::Paragraph => Some(self.export_inline(&node.children)),
            NodeKind::ClassedBlock(_) | NodeKind::DiffDelete => {
                Some(self.export_blocks(&node.children))
            }
            NodeKind::DiffInsert(insert) => Some(insert.markdown.clone()),
            NodeKind::Diff(_) => {
                // Lossy default: a pending proposal is not yet authoritative,
                // so the preserved original content is what gets exported.
                let deletion = node.children.iter().find(|child| {
                    self.tree
                        .get(**child)
                        .map(|n| n.kind.tag() == NodeKindTag::DiffDelete)
                        .unwrap_or(false)
                });
                Some(match deletion {
                    Some(&deletion) => self.export_blocks(self.tree.children(deletion)),
                    None => String::new(),
                })
            }
            _ => Some(self.export_inline_node(key)),
        }
    }

    pub fn export_inline(&self, keys: &[NodeKey]) -> String {
        keys.iter()
            .map(|&key| self.export_inline_node(key))
            .collect()
    }

    pub fn export_inline_node(&self, key: NodeKey) -> String {
        let Some(node) = self.tree.get(key) else {
            return String::new();
        };
        match &node.kind {
            NodeKind::Text(run) => run.text.clone(),
            _ => {
                for rule in &self.set.text_rules {
                    if let Some(output) = rule.export(self, node) {
                        return output;
                    }
                }
                // No rule owns the kind in this set: flatten to children.
                self.export_inline(&node.children)
            }
        }
    }
}

/// Pure import context; no live tree involved.
pub struct ImportCtx<'a> {
    pub registry: &'a NodeTypeRegistry,
    pub set: &'a RuleSet,
    depth: usize,
}

impl<'a> ImportCtx<'a> {
    pub fn new(registry: &'a NodeTypeRegistry, set: &'a RuleSet) -> Self {
        Self {
            registry,
            set,
            depth: 0,
        }
    }

    pub fn limits(&self) -> &ImportLimits {
        &self.set.limits
    }

    /// Context for recursively parsed content (table cells, classed bodies).
    pub fn nested(&self) -> ImportCtx<'a> {
        ImportCtx {
            registry: self.registry,
            set: self.set,
            depth: self.depth + 1,
        }
    }

    pub fn parse_blocks(&self, lines: &[&str]) -> Vec<NodeSpec> {
        if self.depth >= self.set.limits.max_nesting_depth {
            tracing::warn!("max nesting depth exceeded; leaving content as plain text");
            return plain_paragraphs(lines);
        }

        let mut out: Vec<NodeSpec> = Vec::new();
        let mut index = 0;
        'outer: while index < lines.len() {
            if lines[index].trim().is_empty() {
                index += 1;
                continue;
            }

            for rule in &self.set.element_rules {
                if let Some(replacement) = rule.replace(self, lines, index) {
                    for spec in replacement.specs {
                        push_block(&mut out, spec);
                    }
                    index += replacement.consumed.max(1);
                    continue 'outer;
                }
            }

            let start = index;
            let mut paragraph_lines = Vec::new();
            while index < lines.len() {
                let trimmed = lines[index].trim();
                if trimmed.is_empty() {
                    break;
                }
                if index > start && self.element_rule_matches(lines, index) {
                    break;
                }
                paragraph_lines.push(lines[index]);
                index += 1;
            }
            let inline = self.parse_inline(&paragraph_lines.join("\n"));
            out.push(NodeSpec::with_children(NodeKind::Paragraph, inline));
        }
        out
    }

    pub fn parse_inline(&self, text: &str) -> Vec<NodeSpec> {
        let mut out: Vec<NodeSpec> = Vec::new();
        let mut pos = 0;
        while pos < text.len() {
            let mut best: Option<(usize, usize, usize)> = None;
            for (idx, rule) in self.set.text_rules.iter().enumerate() {
                if let Some(found) = rule.pattern().find_at(text, pos) {
                    let earlier = best
                        .map(|(start, _, _)| found.start() < start)
                        .unwrap_or(true);
                    if earlier {
                        best = Some((found.start(), found.end(), idx));
                    }
                }
            }
            let Some((start, end, idx)) = best else {
                break;
            };
            if start > pos {
                out.push(NodeSpec::text(&text[pos..start]));
            }
            let rule = &self.set.text_rules[idx];
            let spec = rule
                .pattern()
                .captures_at(text, pos)
                .filter(|caps| caps.get(0).map(|m| m.start() == start).unwrap_or(false))
                .and_then(|caps| rule.replace(self, &caps));
            match spec {
                Some(spec) => out.push(spec),
                // Malformed or rejected match: the raw span stays as text.
                None => out.push(NodeSpec::text(&text[start..end])),
            }
            pos = if end > start {
                end
            } else {
                next_char_boundary(text, start)
            };
        }
        if pos < text.len() {
            out.push(NodeSpec::text(&text[pos..]));
        }
        merge_text_runs(out)
    }

    fn element_rule_matches(&self, lines: &[&str], at: usize) -> bool {
        self.set
            .element_rules
            .iter()
            .any(|rule| rule.replace(self, lines, at).is_some())
    }
}

fn next_char_boundary(text: &str, at: usize) -> usize {
    text[at..]
        .chars()
        .next()
        .map(|c| at + c.len_utf8())
        .unwrap_or(text.len())
}

fn plain_paragraphs(lines: &[&str]) -> Vec<NodeSpec> {
    lines
        .split(|line| line.trim().is_empty())
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| NodeSpec::paragraph(chunk.join("\n")))
        .collect()
}

/// Appends a block spec, merging a trailing table into a preceding table of
/// matching column count instead of creating a duplicate.
fn push_block(out: &mut Vec<NodeSpec>, spec: NodeSpec) {
    if spec.kind.tag() == NodeKindTag::Table
        && let Some(last) = out.last_mut()
        && last.kind.tag() == NodeKindTag::Table
        && table_column_count(last) == table_column_count(&spec)
    {
        last.children.extend(spec.children);
        return;
    }
    out.push(spec);
}

pub(crate) fn table_column_count(table: &NodeSpec) -> usize {
    table
        .children
        .first()
        .map(|row| row.children.len())
        .unwrap_or(0)
}

fn merge_text_runs(specs: Vec<NodeSpec>) -> Vec<NodeSpec> {
    let mut out: Vec<NodeSpec> = Vec::new();
    for spec in specs {
        if let NodeKind::Text(run) = &spec.kind
            && let Some(last) = out.last_mut()
            && let NodeKind::Text(last_run) = &mut last.kind
        {
            last_run.text.push_str(&run.text);
            continue;
        }
        out.push(spec);
    }
    out
}

// --- top-level conversion API ---

pub fn export_tree(tree: &DocTree, set: &RuleSet) -> String {
    let ctx = ExportCtx { tree, set };
    ctx.export_blocks(tree.children(tree.root()))
}

pub fn export_subtree(tree: &DocTree, key: NodeKey, set: &RuleSet) -> String {
    let ctx = ExportCtx { tree, set };
    ctx.export_block(key).unwrap_or_default()
}

/// Imports markdown under `parent` as an ordinary edit.
pub fn import_markdown(
    tree: &mut DocTree,
    parent: NodeKey,
    text: &str,
    set: &RuleSet,
) -> Result<Vec<NodeKey>, TreeError> {
    import_tagged(tree, parent, text, set, UpdateTag::Edit)
}

/// Clipboard insertion: every pasted node takes a fresh durable id.
pub fn paste_markdown(
    tree: &mut DocTree,
    parent: NodeKey,
    text: &str,
    set: &RuleSet,
) -> Result<Vec<NodeKey>, TreeError> {
    import_tagged(tree, parent, text, set, UpdateTag::Paste)
}

fn import_tagged(
    tree: &mut DocTree,
    parent: NodeKey,
    text: &str,
    set: &RuleSet,
    tag: UpdateTag,
) -> Result<Vec<NodeKey>, TreeError> {
    let registry = tree.registry().clone();
    let specs = parse_to_specs(&registry, text, set);
    tree.update_tagged(tag, |txn| {
        let mut keys = Vec::new();
        for spec in specs {
            keys.push(txn.insert_spec(parent, None, spec)?);
        }
        Ok(keys)
    })
}

/// Parses text into degradation-normalized block specs for `registry`.
pub fn parse_to_specs(registry: &NodeTypeRegistry, text: &str, set: &RuleSet) -> Vec<NodeSpec> {
    let lines: Vec<&str> = text.lines().collect();
    let ctx = ImportCtx::new(registry, set);
    ctx.parse_blocks(&lines)
        .into_iter()
        .flat_map(|spec| fallback::degrade(registry, spec))
        .collect()
}

/// Builds a fresh tree for `profile` from markdown input.
pub fn import_document(
    profile: Profile,
    session_peer: PeerId,
    text: &str,
    set: &RuleSet,
) -> Result<DocTree, TreeError> {
    let mut tree = DocTree::new(profile, session_peer);
    let root = tree.root();
    import_tagged(&mut tree, root, text, set, UpdateTag::Load)?;
    Ok(tree)
}
