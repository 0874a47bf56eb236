//! Content node variants.
//!
//! Every content kind the tree can hold is one variant of the closed
//! [`NodeKind`] enum. Capability checks go through the fieldless
//! [`NodeKindTag`] discriminant so registries and lookup tables can key on a
//! `Copy + Ord` value without cloning payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fieldless discriminant for [`NodeKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKindTag {
    Root,
    Text,
    Paragraph,
    UserMention,
    ContactMention,
    DocumentMention,
    DateMention,
    Table,
    TableRow,
    TableCell,
    Equation,
    Diff,
    DiffInsert,
    DiffDelete,
    Media,
    ClassedBlock,
    CommentMark,
    SearchMatch,
    Completion,
    HorizontalRule,
    CodeBlock,
}

impl NodeKindTag {
    pub const ALL: &'static [NodeKindTag] = &[
        NodeKindTag::Root,
        NodeKindTag::Text,
        NodeKindTag::Paragraph,
        NodeKindTag::UserMention,
        NodeKindTag::ContactMention,
        NodeKindTag::DocumentMention,
        NodeKindTag::DateMention,
        NodeKindTag::Table,
        NodeKindTag::TableRow,
        NodeKindTag::TableCell,
        NodeKindTag::Equation,
        NodeKindTag::Diff,
        NodeKindTag::DiffInsert,
        NodeKindTag::DiffDelete,
        NodeKindTag::Media,
        NodeKindTag::ClassedBlock,
        NodeKindTag::CommentMark,
        NodeKindTag::SearchMatch,
        NodeKindTag::Completion,
        NodeKindTag::HorizontalRule,
        NodeKindTag::CodeBlock,
    ];

    /// Stable type name used by the serialization schema and DOM markers.
    pub fn name(self) -> &'static str {
        match self {
            NodeKindTag::Root => "root",
            NodeKindTag::Text => "text",
            NodeKindTag::Paragraph => "paragraph",
            NodeKindTag::UserMention => "userMention",
            NodeKindTag::ContactMention => "contactMention",
            NodeKindTag::DocumentMention => "docMention",
            NodeKindTag::DateMention => "dateMention",
            NodeKindTag::Table => "table",
            NodeKindTag::TableRow => "tableRow",
            NodeKindTag::TableCell => "tableCell",
            NodeKindTag::Equation => "equation",
            NodeKindTag::Diff => "diff",
            NodeKindTag::DiffInsert => "diffInsert",
            NodeKindTag::DiffDelete => "diffDelete",
            NodeKindTag::Media => "media",
            NodeKindTag::ClassedBlock => "classedBlock",
            NodeKindTag::CommentMark => "commentMark",
            NodeKindTag::SearchMatch => "searchMatch",
            NodeKindTag::Completion => "completion",
            NodeKindTag::HorizontalRule => "horizontalRule",
            NodeKindTag::CodeBlock => "code",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        NodeKindTag::ALL.iter().copied().find(|tag| tag.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMention {
    pub user_id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMention {
    pub contact_id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMention {
    pub document_id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateMention {
    /// ISO-8601 calendar date, e.g. `2026-08-06`.
    pub date: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equation {
    pub source: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    pub author_id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffInsert {
    /// Markdown source of the proposed addition, parsed on accept.
    pub markdown: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    Attachment,
    External,
    Clipboard,
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub media: MediaKind,
    pub source: MediaSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Decoration-cache invalidation flag; set by setters, never serialized.
    #[serde(skip)]
    pub dirty: bool,
}

impl Media {
    pub fn image(source: MediaSource, url: impl Into<String>) -> Self {
        Self {
            media: MediaKind::Image,
            source,
            ref_id: None,
            url: url.into(),
            alt: None,
            width: None,
            height: None,
            scale: 1.0,
            dirty: false,
        }
    }

    pub fn video(source: MediaSource, url: impl Into<String>) -> Self {
        Self {
            media: MediaKind::Video,
            ..Self::image(source, url)
        }
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
        self.dirty = true;
    }

    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = Some(width);
        self.height = Some(height);
        self.dirty = true;
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
        self.dirty = true;
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

/// Shared sizing behavior for media-like variants.
pub trait Dimensioned {
    fn width(&self) -> Option<u32>;
    fn height(&self) -> Option<u32>;
    fn scale(&self) -> f64;
}

impl Dimensioned for Media {
    fn width(&self) -> Option<u32> {
        self.width
    }

    fn height(&self) -> Option<u32> {
        self.height
    }

    fn scale(&self) -> f64 {
        self.scale
    }
}

/// Allow-listed wrapper tags for classed blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockTag {
    Div,
    Section,
    Blockquote,
    Details,
    Template,
}

impl BlockTag {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockTag::Div => "div",
            BlockTag::Section => "section",
            BlockTag::Blockquote => "blockquote",
            BlockTag::Details => "details",
            BlockTag::Template => "template",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "div" => Some(BlockTag::Div),
            "section" => Some(BlockTag::Section),
            "blockquote" => Some(BlockTag::Blockquote),
            "details" => Some(BlockTag::Details),
            "template" => Some(BlockTag::Template),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassedBlock {
    pub tag: BlockTag,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentMark {
    pub comment_id: String,
    #[serde(default)]
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    #[serde(default)]
    pub current: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub code: String,
}

/// One content node's typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Text(TextRun),
    Paragraph,
    UserMention(UserMention),
    ContactMention(ContactMention),
    DocumentMention(DocumentMention),
    DateMention(DateMention),
    Table,
    TableRow,
    TableCell,
    Equation(Equation),
    Diff(Diff),
    DiffInsert(DiffInsert),
    DiffDelete,
    Media(Media),
    ClassedBlock(ClassedBlock),
    CommentMark(CommentMark),
    SearchMatch(SearchMatch),
    Completion(Completion),
    HorizontalRule,
    CodeBlock(CodeBlock),
}

impl NodeKind {
    pub fn text(text: impl Into<String>) -> Self {
        NodeKind::Text(TextRun { text: text.into() })
    }

    pub fn tag(&self) -> NodeKindTag {
        match self {
            NodeKind::Root => NodeKindTag::Root,
            NodeKind::Text(_) => NodeKindTag::Text,
            NodeKind::Paragraph => NodeKindTag::Paragraph,
            NodeKind::UserMention(_) => NodeKindTag::UserMention,
            NodeKind::ContactMention(_) => NodeKindTag::ContactMention,
            NodeKind::DocumentMention(_) => NodeKindTag::DocumentMention,
            NodeKind::DateMention(_) => NodeKindTag::DateMention,
            NodeKind::Table => NodeKindTag::Table,
            NodeKind::TableRow => NodeKindTag::TableRow,
            NodeKind::TableCell => NodeKindTag::TableCell,
            NodeKind::Equation(_) => NodeKindTag::Equation,
            NodeKind::Diff(_) => NodeKindTag::Diff,
            NodeKind::DiffInsert(_) => NodeKindTag::DiffInsert,
            NodeKind::DiffDelete => NodeKindTag::DiffDelete,
            NodeKind::Media(_) => NodeKindTag::Media,
            NodeKind::ClassedBlock(_) => NodeKindTag::ClassedBlock,
            NodeKind::CommentMark(_) => NodeKindTag::CommentMark,
            NodeKind::SearchMatch(_) => NodeKindTag::SearchMatch,
            NodeKind::Completion(_) => NodeKindTag::Completion,
            NodeKind::HorizontalRule => NodeKindTag::HorizontalRule,
            NodeKind::CodeBlock(_) => NodeKindTag::CodeBlock,
        }
    }

    /// Whether the node participates in inline (text-run) content.
    pub fn is_inline(&self) -> bool {
        match self {
            NodeKind::Text(_)
            | NodeKind::UserMention(_)
            | NodeKind::ContactMention(_)
            | NodeKind::DocumentMention(_)
            | NodeKind::DateMention(_)
            | NodeKind::CommentMark(_)
            | NodeKind::SearchMatch(_)
            | NodeKind::Completion(_) => true,
            NodeKind::Equation(eq) => eq.inline,
            _ => false,
        }
    }

    /// Display text used when a variant must degrade to plain content.
    pub fn display_text(&self) -> Option<String> {
        match self {
            NodeKind::Text(run) => Some(run.text.clone()),
            NodeKind::UserMention(m) => Some(m.label.clone()),
            NodeKind::ContactMention(m) => Some(m.label.clone()),
            NodeKind::DocumentMention(m) => Some(m.label.clone()),
            NodeKind::DateMention(m) => Some(m.label.clone()),
            NodeKind::Equation(eq) => Some(if eq.inline {
                format!("${}$", eq.source)
            } else {
                format!("$${}$$", eq.source)
            }),
            NodeKind::Media(media) => Some(media.url.clone()),
            NodeKind::Completion(c) => Some(c.text.clone()),
            NodeKind::CodeBlock(code) => Some(code.code.clone()),
            _ => None,
        }
    }
}
