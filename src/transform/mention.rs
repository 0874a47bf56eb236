//! Mention conversion rules.
//!
//! Internal rules encode/decode a JSON payload inside a node-type-specific
//! tag. Required-field validation failures are caught per rule and logged,
//! leaving the raw text unconverted; no partial node is ever created.
//!
//! External rules are export-only: the reverse regular expression
//! intentionally never matches, so external markdown can never fabricate a
//! mention node on import.

use super::tags;
use super::{ExportCtx, ImportCtx, TextRule};
use crate::node::{
    CommentMark, ContactMention, DateMention, DocumentMention, Node, NodeKind, NodeSpec, UserMention,
};
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MentionVariant {
    User,
    Contact,
    Document,
    Date,
}

impl MentionVariant {
    fn tag_name(self) -> &'static str {
        match self {
            MentionVariant::User => "m-user-mention",
            MentionVariant::Contact => "m-contact-mention",
            MentionVariant::Document => "m-doc-mention",
            MentionVariant::Date => "m-date-mention",
        }
    }

    fn rule_name(self) -> &'static str {
        match self {
            MentionVariant::User => "user-mention",
            MentionVariant::Contact => "contact-mention",
            MentionVariant::Document => "doc-mention",
            MentionVariant::Date => "date-mention",
        }
    }

    const ALL: [MentionVariant; 4] = [
        MentionVariant::User,
        MentionVariant::Contact,
        MentionVariant::Document,
        MentionVariant::Date,
    ];
}

fn decode_checked<T: DeserializeOwned>(
    rule: &'static str,
    ctx: &ImportCtx<'_>,
    json: &str,
) -> Option<(T, crate::node::NodeState)> {
    if json.len() > ctx.limits().max_tag_payload_bytes {
        tracing::warn!(rule, bytes = json.len(), "tag payload over limit; left as text");
        return None;
    }
    match tags::decode_payload(json) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            tracing::warn!(rule, %err, "malformed tag payload; left as text");
            None
        }
    }
}

/// Lossless tagged mention rule (one instance per mention kind).
pub struct MentionTagRule {
    variant: MentionVariant,
    pattern: Regex,
}

impl MentionTagRule {
    fn new(variant: MentionVariant) -> Self {
        let name = variant.tag_name();
        let pattern = Regex::new(&format!("{}(.*?){}", tags::open(name), tags::close(name)))
            .expect("static mention pattern compiles");
        Self { variant, pattern }
    }
}

impl TextRule for MentionTagRule {
    fn name(&self) -> &'static str {
        self.variant.rule_name()
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    fn export(&self, _ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        let name = self.variant.tag_name();
        let payload = match (self.variant, &node.kind) {
            (MentionVariant::User, NodeKind::UserMention(m)) => {
                tags::encode_payload(m, &node.state)
            }
            (MentionVariant::Contact, NodeKind::ContactMention(m)) => {
                tags::encode_payload(m, &node.state)
            }
            (MentionVariant::Document, NodeKind::DocumentMention(m)) => {
                tags::encode_payload(m, &node.state)
            }
            (MentionVariant::Date, NodeKind::DateMention(m)) => {
                tags::encode_payload(m, &node.state)
            }
            _ => return None,
        };
        Some(format!("{}{payload}{}", tags::open(name), tags::close(name)))
    }

    fn replace(&self, ctx: &ImportCtx<'_>, caps: &Captures<'_>) -> Option<NodeSpec> {
        let json = caps.get(1)?.as_str();
        let spec = match self.variant {
            MentionVariant::User => {
                let (payload, state): (UserMention, _) =
                    decode_checked(self.name(), ctx, json)?;
                NodeSpec::new(NodeKind::UserMention(payload)).with_state(state)
            }
            MentionVariant::Contact => {
                let (payload, state): (ContactMention, _) =
                    decode_checked(self.name(), ctx, json)?;
                NodeSpec::new(NodeKind::ContactMention(payload)).with_state(state)
            }
            MentionVariant::Document => {
                let (payload, state): (DocumentMention, _) =
                    decode_checked(self.name(), ctx, json)?;
                NodeSpec::new(NodeKind::DocumentMention(payload)).with_state(state)
            }
            MentionVariant::Date => {
                let (payload, state): (DateMention, _) =
                    decode_checked(self.name(), ctx, json)?;
                NodeSpec::new(NodeKind::DateMention(payload)).with_state(state)
            }
        };
        Some(spec)
    }
}

/// Portable mention rule: exports the display label only. Import is
/// impossible by construction.
pub struct MentionDisplayRule {
    variant: MentionVariant,
    pattern: Regex,
}

impl MentionDisplayRule {
    fn new(variant: MentionVariant) -> Self {
        // A character class that matches no character: this rule must never
        // fire on import.
        let pattern = Regex::new(r"[^\s\S]").expect("static never-match pattern compiles");
        Self { variant, pattern }
    }
}

impl TextRule for MentionDisplayRule {
    fn name(&self) -> &'static str {
        self.variant.rule_name()
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    fn export(&self, _ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        match (self.variant, &node.kind) {
            (MentionVariant::User, NodeKind::UserMention(m)) => Some(m.label.clone()),
            (MentionVariant::Contact, NodeKind::ContactMention(m)) => Some(m.label.clone()),
            (MentionVariant::Document, NodeKind::DocumentMention(m)) => Some(m.label.clone()),
            (MentionVariant::Date, NodeKind::DateMention(m)) => Some(m.label.clone()),
            _ => None,
        }
    }

    fn replace(&self, _ctx: &ImportCtx<'_>, _caps: &Captures<'_>) -> Option<NodeSpec> {
        None
    }
}

/// Comment marks wrap inline content: `<m-comment>{json}inner</m-comment>`.
pub struct CommentMarkRule {
    pattern: Regex,
}

impl CommentMarkRule {
    pub fn new() -> Self {
        let pattern = Regex::new(r"<m-comment>(.*?)</m-comment>")
            .expect("static comment pattern compiles");
        Self { pattern }
    }
}

impl Default for CommentMarkRule {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRule for CommentMarkRule {
    fn name(&self) -> &'static str {
        "comment-mark"
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    fn export(&self, ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        let NodeKind::CommentMark(mark) = &node.kind else {
            return None;
        };
        let payload = tags::encode_payload(mark, &node.state);
        let inner = ctx.export_inline(&node.children);
        Some(format!("<m-comment>{payload}{inner}</m-comment>"))
    }

    fn replace(&self, ctx: &ImportCtx<'_>, caps: &Captures<'_>) -> Option<NodeSpec> {
        let inner = caps.get(1)?.as_str();
        let (json, body) = tags::take_json_object(inner).or_else(|| {
            tracing::warn!(rule = "comment-mark", "missing payload object; left as text");
            None
        })?;
        let (mark, state): (CommentMark, _) = decode_checked(self.name(), ctx, json)?;
        let children = ctx.nested().parse_inline(body);
        Some(NodeSpec::with_children(NodeKind::CommentMark(mark), children).with_state(state))
    }
}

pub fn internal_rules() -> Vec<Box<dyn TextRule>> {
    MentionVariant::ALL
        .into_iter()
        .map(|variant| Box::new(MentionTagRule::new(variant)) as Box<dyn TextRule>)
        .collect()
}

pub fn external_rules() -> Vec<Box<dyn TextRule>> {
    MentionVariant::ALL
        .into_iter()
        .map(|variant| Box::new(MentionDisplayRule::new(variant)) as Box<dyn TextRule>)
        .collect()
}
