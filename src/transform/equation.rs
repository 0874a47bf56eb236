//! Equation conversion rules.
//!
//! Three overlapping text rules (internal tagged form, external inline
//! `$...$`, external single-line `$$...$$`) plus one multiline rule that only
//! fires when an opener stands alone on its line and closes the same way.
//! Boundary violations and nested delimiters reject the match, leaving the
//! raw lines as plain paragraphs.

use super::tags;
use super::{BlockReplacement, ElementRule, ExportCtx, ImportCtx, TextRule};
use crate::node::{Equation, Node, NodeKind, NodeSpec};
use regex::{Captures, Regex};

const TAG: &str = "m-equation";

fn decode_equation(ctx: &ImportCtx<'_>, json: &str) -> Option<(Equation, crate::node::NodeState)> {
    if json.len() > ctx.limits().max_tag_payload_bytes {
        tracing::warn!(rule = "equation", bytes = json.len(), "tag payload over limit");
        return None;
    }
    match tags::decode_payload(json) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            tracing::warn!(rule = "equation", %err, "malformed equation payload; left as text");
            None
        }
    }
}

fn tag_line(equation: &Equation, state: &crate::node::NodeState) -> String {
    format!(
        "{}{}{}",
        tags::open(TAG),
        tags::encode_payload(equation, state),
        tags::close(TAG)
    )
}

/// Internal block form: a line holding nothing but one equation tag.
pub struct EquationTagBlockRule {
    pattern: Regex,
}

impl EquationTagBlockRule {
    pub fn new() -> Self {
        let pattern = Regex::new(r"^<m-equation>(.*)</m-equation>$")
            .expect("static equation block pattern compiles");
        Self { pattern }
    }
}

impl Default for EquationTagBlockRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRule for EquationTagBlockRule {
    fn name(&self) -> &'static str {
        "equation-tag-block"
    }

    fn export(&self, _ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        match &node.kind {
            NodeKind::Equation(eq) if !eq.inline => Some(tag_line(eq, &node.state)),
            _ => None,
        }
    }

    fn replace(
        &self,
        ctx: &ImportCtx<'_>,
        lines: &[&str],
        at: usize,
    ) -> Option<BlockReplacement> {
        let caps = self.pattern.captures(lines[at].trim())?;
        let (equation, state) = decode_equation(ctx, caps.get(1)?.as_str())?;
        Some(BlockReplacement {
            consumed: 1,
            specs: vec![NodeSpec::new(NodeKind::Equation(equation)).with_state(state)],
        })
    }
}

/// Internal inline form inside a text run.
pub struct EquationTagInlineRule {
    pattern: Regex,
}

impl EquationTagInlineRule {
    pub fn new() -> Self {
        let pattern = Regex::new(r"<m-equation>(.*?)</m-equation>")
            .expect("static equation inline pattern compiles");
        Self { pattern }
    }
}

impl Default for EquationTagInlineRule {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRule for EquationTagInlineRule {
    fn name(&self) -> &'static str {
        "equation-tag-inline"
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    fn export(&self, _ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        match &node.kind {
            NodeKind::Equation(eq) if eq.inline => Some(tag_line(eq, &node.state)),
            _ => None,
        }
    }

    fn replace(&self, ctx: &ImportCtx<'_>, caps: &Captures<'_>) -> Option<NodeSpec> {
        let (equation, state) = decode_equation(ctx, caps.get(1)?.as_str())?;
        Some(NodeSpec::new(NodeKind::Equation(equation)).with_state(state))
    }
}

/// External multiline form:
///
/// ```text
/// $$
/// \sum_i x_i
/// $$
/// ```
///
/// The opener and closer must stand alone on their lines; a nested `$$`
/// inside the body rejects the whole match.
pub struct DollarFenceRule;

impl DollarFenceRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DollarFenceRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRule for DollarFenceRule {
    fn name(&self) -> &'static str {
        "equation-dollar-fence"
    }

    fn export(&self, _ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        match &node.kind {
            NodeKind::Equation(eq) if !eq.inline => Some(format!("$$\n{}\n$$", eq.source)),
            _ => None,
        }
    }

    fn replace(
        &self,
        _ctx: &ImportCtx<'_>,
        lines: &[&str],
        at: usize,
    ) -> Option<BlockReplacement> {
        // Opener must have no other content on its line.
        if lines[at].trim() != "$$" {
            return None;
        }
        let mut end = at + 1;
        while end < lines.len() {
            let trimmed = lines[end].trim();
            if trimmed == "$$" {
                break;
            }
            if trimmed.contains("$$") {
                // Nested delimiter: reject, leave raw text.
                return None;
            }
            end += 1;
        }
        if end >= lines.len() {
            return None;
        }
        let source = lines[at + 1..end].join("\n");
        Some(BlockReplacement {
            consumed: end - at + 1,
            specs: vec![NodeSpec::new(NodeKind::Equation(Equation {
                source,
                inline: false,
            }))],
        })
    }
}

/// External single-line display form: `$$...$$` inside a text run.
pub struct DollarBlockTextRule {
    pattern: Regex,
}

impl DollarBlockTextRule {
    pub fn new() -> Self {
        let pattern =
            Regex::new(r"\$\$([^$\n]+?)\$\$").expect("static display equation pattern compiles");
        Self { pattern }
    }
}

impl Default for DollarBlockTextRule {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRule for DollarBlockTextRule {
    fn name(&self) -> &'static str {
        "equation-dollar-block"
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    fn export(&self, _ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        match &node.kind {
            NodeKind::Equation(eq) if !eq.inline => Some(format!("$${}$$", eq.source)),
            _ => None,
        }
    }

    fn replace(&self, _ctx: &ImportCtx<'_>, caps: &Captures<'_>) -> Option<NodeSpec> {
        let source = caps.get(1)?.as_str().trim().to_string();
        if source.is_empty() {
            return None;
        }
        Some(NodeSpec::new(NodeKind::Equation(Equation {
            source,
            inline: false,
        })))
    }
}

/// External inline form: `$...$` inside a text run.
pub struct DollarInlineRule {
    pattern: Regex,
}

impl DollarInlineRule {
    pub fn new() -> Self {
        let pattern =
            Regex::new(r"\$([^$\n]+?)\$").expect("static inline equation pattern compiles");
        Self { pattern }
    }
}

impl Default for DollarInlineRule {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRule for DollarInlineRule {
    fn name(&self) -> &'static str {
        "equation-dollar-inline"
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    fn export(&self, _ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        match &node.kind {
            NodeKind::Equation(eq) if eq.inline => Some(format!("${}$", eq.source)),
            _ => None,
        }
    }

    fn replace(&self, _ctx: &ImportCtx<'_>, caps: &Captures<'_>) -> Option<NodeSpec> {
        let source = caps.get(1)?.as_str().trim().to_string();
        if source.is_empty() {
            return None;
        }
        Some(NodeSpec::new(NodeKind::Equation(Equation {
            source,
            inline: true,
        })))
    }
}
