//! Block-level conversion rules: code fences, horizontal rules, classed
//! containers and media.

use super::tags;
use super::{BlockReplacement, ElementRule, ExportCtx, ImportCtx};
use crate::node::{
    ClassedBlock, CodeBlock, Media, MediaKind, MediaSource, Node, NodeKind, NodeKindTag, NodeSpec,
};
use regex::Regex;

/// Fenced code blocks. A fence is a *generic* code request; the registry's
/// replacement rules substitute the rich code node transparently.
pub struct CodeFenceRule;

impl CodeFenceRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CodeFenceRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRule for CodeFenceRule {
    fn name(&self) -> &'static str {
        "code-fence"
    }

    fn export(&self, _ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        let NodeKind::CodeBlock(code) = &node.kind else {
            return None;
        };
        let mut out = String::from("```");
        if let Some(language) = &code.language {
            out.push_str(language);
        }
        out.push('\n');
        out.push_str(&code.code);
        out.push_str("\n```");
        Some(out)
    }

    fn replace(
        &self,
        ctx: &ImportCtx<'_>,
        lines: &[&str],
        at: usize,
    ) -> Option<BlockReplacement> {
        let info = lines[at].trim().strip_prefix("```")?;
        // Generic request goes through the registry's replacement mapping.
        let target = ctx.registry.resolve_request("codeFence");
        let mut contents = Vec::new();
        let mut end = at + 1;
        while end < lines.len() {
            if lines[end].trim() == "```" {
                break;
            }
            contents.push(lines[end]);
            end += 1;
        }
        let consumed = if end < lines.len() {
            end - at + 1
        } else {
            end - at
        };
        let info = info.trim();
        let language = if info.is_empty() {
            None
        } else {
            Some(info.to_string())
        };
        let spec = match target {
            // The rich code node replaces generic fences; an excluded code
            // variant still parses here and degrades afterwards.
            Some(NodeKindTag::CodeBlock) | None => NodeSpec::new(NodeKind::CodeBlock(CodeBlock {
                language,
                code: contents.join("\n"),
            })),
            Some(other) => {
                tracing::debug!(kind = other.name(), "unhandled code replacement target");
                return None;
            }
        };
        Some(BlockReplacement {
            consumed,
            specs: vec![spec],
        })
    }
}

pub struct HorizontalRuleRule;

impl HorizontalRuleRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HorizontalRuleRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRule for HorizontalRuleRule {
    fn name(&self) -> &'static str {
        "horizontal-rule"
    }

    fn export(&self, _ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        matches!(node.kind, NodeKind::HorizontalRule).then(|| "---".to_string())
    }

    fn replace(
        &self,
        _ctx: &ImportCtx<'_>,
        lines: &[&str],
        at: usize,
    ) -> Option<BlockReplacement> {
        let trimmed = lines[at].trim();
        if trimmed.len() < 3 {
            return None;
        }
        let mut chars = trimmed.chars();
        let first = chars.next()?;
        if !matches!(first, '-' | '*' | '_') || !chars.all(|c| c == first) {
            return None;
        }
        Some(BlockReplacement {
            consumed: 1,
            specs: vec![NodeSpec::new(NodeKind::HorizontalRule)],
        })
    }
}

/// Classed container blocks:
///
/// ```text
/// <m-classed>{"tag":"blockquote","classes":["quoted-reply"]}
/// inner blocks
/// </m-classed>
/// ```
pub struct ClassedBlockRule;

impl ClassedBlockRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClassedBlockRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRule for ClassedBlockRule {
    fn name(&self) -> &'static str {
        "classed-block"
    }

    fn export(&self, ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        let NodeKind::ClassedBlock(block) = &node.kind else {
            return None;
        };
        let payload = tags::encode_payload(block, &node.state);
        let body = ctx.export_blocks(&node.children);
        let mut lines = vec![format!("<m-classed>{payload}")];
        if !body.is_empty() {
            lines.push(body);
        }
        lines.push("</m-classed>".to_string());
        Some(lines.join("\n"))
    }

    fn replace(
        &self,
        ctx: &ImportCtx<'_>,
        lines: &[&str],
        at: usize,
    ) -> Option<BlockReplacement> {
        let block = tags::parse_tag_block(lines, at, "m-classed")?;
        let payload = block.payload?;
        if payload.len() > ctx.limits().max_tag_payload_bytes {
            tracing::warn!(rule = "classed-block", "tag payload over limit; left as text");
            return None;
        }
        let (classed, state): (ClassedBlock, _) = match tags::decode_payload(payload) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::warn!(rule = "classed-block", %err, "malformed payload; left as text");
                return None;
            }
        };
        let children = ctx.nested().parse_blocks(&block.body);
        Some(BlockReplacement {
            consumed: block.consumed,
            specs: vec![
                NodeSpec::with_children(NodeKind::ClassedBlock(classed), children)
                    .with_state(state),
            ],
        })
    }
}

/// Internal media form: one tag on a line of its own.
pub struct MediaTagRule {
    pattern: Regex,
}

impl MediaTagRule {
    pub fn new() -> Self {
        let pattern = Regex::new(r"^<m-media>(.*)</m-media>$")
            .expect("static media pattern compiles");
        Self { pattern }
    }
}

impl Default for MediaTagRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRule for MediaTagRule {
    fn name(&self) -> &'static str {
        "media-tag"
    }

    fn export(&self, _ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        let NodeKind::Media(media) = &node.kind else {
            return None;
        };
        let payload = tags::encode_payload(media, &node.state);
        Some(format!("<m-media>{payload}</m-media>"))
    }

    fn replace(
        &self,
        ctx: &ImportCtx<'_>,
        lines: &[&str],
        at: usize,
    ) -> Option<BlockReplacement> {
        let caps = self.pattern.captures(lines[at].trim())?;
        let json = caps.get(1)?.as_str();
        if json.len() > ctx.limits().max_tag_payload_bytes {
            tracing::warn!(rule = "media-tag", "tag payload over limit; left as text");
            return None;
        }
        let (media, state): (Media, _) = match tags::decode_payload(json) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::warn!(rule = "media-tag", %err, "malformed payload; left as text");
                return None;
            }
        };
        Some(BlockReplacement {
            consumed: 1,
            specs: vec![NodeSpec::new(NodeKind::Media(media)).with_state(state)],
        })
    }
}

/// External image form: `![alt](url)` on a line of its own.
pub struct ImageRule {
    pattern: Regex,
}

impl ImageRule {
    pub fn new() -> Self {
        let pattern = Regex::new(r"^!\[([^\]]*)\]\(([^)\s]+)\)$")
            .expect("static image pattern compiles");
        Self { pattern }
    }
}

impl Default for ImageRule {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRule for ImageRule {
    fn name(&self) -> &'static str {
        "image"
    }

    fn export(&self, _ctx: &ExportCtx<'_>, node: &Node) -> Option<String> {
        let NodeKind::Media(media) = &node.kind else {
            return None;
        };
        match media.media {
            MediaKind::Image => Some(format!(
                "![{}]({})",
                media.alt.as_deref().unwrap_or_default(),
                media.url
            )),
            MediaKind::Video => Some(media.url.clone()),
        }
    }

    fn replace(
        &self,
        _ctx: &ImportCtx<'_>,
        lines: &[&str],
        at: usize,
    ) -> Option<BlockReplacement> {
        let caps = self.pattern.captures(lines[at].trim())?;
        let alt = caps.get(1)?.as_str();
        let url = caps.get(2)?.as_str();
        let mut media = Media::image(MediaSource::External, url);
        if !alt.is_empty() {
            media.alt = Some(alt.to_string());
        }
        Some(BlockReplacement {
            consumed: 1,
            specs: vec![NodeSpec::new(NodeKind::Media(media))],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BlockTag;
    use crate::registry::{NodeTypeRegistry, Profile};
    use crate::transform::RuleSet;

    fn parse(text: &str, set: &RuleSet) -> Vec<NodeSpec> {
        let registry = NodeTypeRegistry::for_profile(Profile::Full);
        let ctx = ImportCtx::new(&registry, set);
        let lines: Vec<&str> = text.lines().collect();
        ctx.parse_blocks(&lines)
    }

    #[test]
    fn code_fence_parses_language_and_body() {
        let set = RuleSet::internal();
        let specs = parse("```rust\nfn main() {}\n```", &set);
        assert_eq!(specs.len(), 1);
        match &specs[0].kind {
            NodeKind::CodeBlock(code) => {
                assert_eq!(code.language.as_deref(), Some("rust"));
                assert_eq!(code.code, "fn main() {}");
            }
            other => panic!("expected code block, got {other:?}"),
        }
    }

    #[test]
    fn unclosed_code_fence_consumes_rest() {
        let set = RuleSet::internal();
        let specs = parse("```\ncode", &set);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].kind.tag(), NodeKindTag::CodeBlock);
    }

    #[test]
    fn horizontal_rule_variants() {
        let set = RuleSet::internal();
        for text in ["---", "****", "___"] {
            let specs = parse(text, &set);
            assert_eq!(specs[0].kind.tag(), NodeKindTag::HorizontalRule, "{text}");
        }
        let specs = parse("--", &set);
        assert_eq!(specs[0].kind.tag(), NodeKindTag::Paragraph);
    }

    #[test]
    fn classed_block_round_trips_tag_and_classes() {
        let set = RuleSet::internal();
        let text = "<m-classed>{\"tag\":\"blockquote\",\"classes\":[\"quoted-reply\"]}\ninner text\n</m-classed>";
        let specs = parse(text, &set);
        assert_eq!(specs.len(), 1);
        match &specs[0].kind {
            NodeKind::ClassedBlock(block) => {
                assert_eq!(block.tag, BlockTag::Blockquote);
                assert_eq!(block.classes, vec!["quoted-reply".to_string()]);
            }
            other => panic!("expected classed block, got {other:?}"),
        }
        assert_eq!(specs[0].children.len(), 1);
    }

    #[test]
    fn classed_block_disallowed_tag_stays_text() {
        let set = RuleSet::internal();
        let text = "<m-classed>{\"tag\":\"script\"}\nbody\n</m-classed>";
        let specs = parse(text, &set);
        assert!(specs.iter().all(|s| s.kind.tag() == NodeKindTag::Paragraph));
    }

    #[test]
    fn media_tag_round_trip_fields() {
        let set = RuleSet::internal();
        let text = r#"<m-media>{"media":"image","source":"attachment","refId":"att-1","url":"https://e.com/a.png","width":320,"height":200}</m-media>"#;
        let specs = parse(text, &set);
        match &specs[0].kind {
            NodeKind::Media(media) => {
                assert_eq!(media.media, MediaKind::Image);
                assert_eq!(media.source, MediaSource::Attachment);
                assert_eq!(media.ref_id.as_deref(), Some("att-1"));
                assert_eq!(media.width, Some(320));
                assert!((media.scale - 1.0).abs() < f64::EPSILON);
            }
            other => panic!("expected media, got {other:?}"),
        }
    }

    #[test]
    fn external_image_line_imports_as_media() {
        let set = RuleSet::external();
        let specs = parse("![diagram](https://e.com/d.png)", &set);
        match &specs[0].kind {
            NodeKind::Media(media) => {
                assert_eq!(media.alt.as_deref(), Some("diagram"));
                assert_eq!(media.source, MediaSource::External);
            }
            other => panic!("expected media, got {other:?}"),
        }
    }
}
