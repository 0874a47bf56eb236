//! Lightweight DOM element value model.
//!
//! The core never touches a real DOM; import/export speaks this value tree
//! instead, so headless conversion works with zero UI attached. Exported
//! elements carry the marker attribute [`MARKER_ATTR`] and imports require
//! it, which keeps unrelated markup from being adopted by accident.

use crate::node::{
    BlockTag, ClassedBlock, CodeBlock, CommentMark, ContactMention, DateMention, Dimensioned,
    DocumentMention, Equation, Media, MediaKind, MediaSource, Node, NodeKind, NodeKindTag,
    UserMention,
};
use std::collections::BTreeMap;

/// Marker attribute identifying elements produced by this node model.
pub const MARKER_ATTR: &str = "data-mdnt";

#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<Child>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Child::Text(text.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Child::Element(child));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Child::Text(text) => out.push_str(text),
                Child::Element(element) => out.push_str(&element.text_content()),
            }
        }
        out
    }

    fn marked(self, tag: NodeKindTag) -> Self {
        self.with_attr(MARKER_ATTR, tag.name())
    }
}

/// Raw element tags each variant recognizes on import. Variants without an
/// element form return an empty list.
pub fn recognized_tags(tag: NodeKindTag) -> &'static [&'static str] {
    match tag {
        NodeKindTag::UserMention
        | NodeKindTag::ContactMention
        | NodeKindTag::DocumentMention
        | NodeKindTag::DateMention
        | NodeKindTag::CommentMark => &["span"],
        NodeKindTag::Equation => &["span", "div"],
        NodeKindTag::Media => &["img", "video"],
        NodeKindTag::ClassedBlock => &["div", "section", "blockquote", "details", "template"],
        NodeKindTag::HorizontalRule => &["hr"],
        NodeKindTag::CodeBlock => &["pre"],
        _ => &[],
    }
}

/// Serializes one node to its element form, without children. Variants with
/// no element form return `None`.
pub fn export_element(node: &Node) -> Option<Element> {
    match &node.kind {
        NodeKind::UserMention(m) => Some(
            Element::new("span")
                .marked(NodeKindTag::UserMention)
                .with_attr("data-user-id", &m.user_id)
                .with_text(&m.label),
        ),
        NodeKind::ContactMention(m) => Some(
            Element::new("span")
                .marked(NodeKindTag::ContactMention)
                .with_attr("data-contact-id", &m.contact_id)
                .with_text(&m.label),
        ),
        NodeKind::DocumentMention(m) => {
            let mut element = Element::new("span")
                .marked(NodeKindTag::DocumentMention)
                .with_attr("data-document-id", &m.document_id)
                .with_text(&m.label);
            if let Some(block_type) = &m.block_type {
                element = element.with_attr("data-block-type", block_type);
            }
            Some(element)
        }
        NodeKind::DateMention(m) => Some(
            Element::new("span")
                .marked(NodeKindTag::DateMention)
                .with_attr("data-date", &m.date)
                .with_text(&m.label),
        ),
        NodeKind::Equation(eq) => {
            let tag = if eq.inline { "span" } else { "div" };
            Some(
                Element::new(tag)
                    .marked(NodeKindTag::Equation)
                    .with_attr("data-source", &eq.source)
                    .with_text(&eq.source),
            )
        }
        NodeKind::Media(media) => {
            let tag = match media.media {
                MediaKind::Image => "img",
                MediaKind::Video => "video",
            };
            let mut element = Element::new(tag)
                .marked(NodeKindTag::Media)
                .with_attr("src", &media.url);
            if let Some(width) = media.width() {
                element = element.with_attr("width", width.to_string());
            }
            if let Some(height) = media.height() {
                element = element.with_attr("height", height.to_string());
            }
            if let Some(alt) = &media.alt {
                element = element.with_attr("alt", alt);
            }
            Some(element)
        }
        NodeKind::ClassedBlock(block) => Some(export_classed_block(block)),
        NodeKind::CommentMark(mark) => Some(
            Element::new("span")
                .marked(NodeKindTag::CommentMark)
                .with_attr("data-comment-id", &mark.comment_id),
        ),
        NodeKind::HorizontalRule => Some(Element::new("hr").marked(NodeKindTag::HorizontalRule)),
        NodeKind::CodeBlock(code) => {
            let mut element = Element::new("pre").marked(NodeKindTag::CodeBlock);
            if let Some(language) = &code.language {
                element = element.with_attr("data-language", language);
            }
            Some(element.with_text(&code.code))
        }
        _ => None,
    }
}

/// Classed blocks with the `template` wrapper tag export an open shadow-tree
/// template, isolating their HTML payload from the host document.
fn export_classed_block(block: &ClassedBlock) -> Element {
    let mut element = Element::new(block.tag.as_str()).marked(NodeKindTag::ClassedBlock);
    if !block.classes.is_empty() {
        element = element.with_attr("class", block.classes.join(" "));
    }
    if block.tag == BlockTag::Template {
        element = element.with_attr("shadowrootmode", "open");
    }
    element
}

/// Adopts an element back into a node kind. Requires the marker attribute
/// and a recognized raw tag; anything else is not ours and returns `None`.
pub fn import_element(element: &Element) -> Option<NodeKind> {
    let marker = element.attr(MARKER_ATTR)?;
    let tag = NodeKindTag::from_name(marker)?;
    if !recognized_tags(tag).contains(&element.tag.as_str()) {
        return None;
    }

    match tag {
        NodeKindTag::UserMention => Some(NodeKind::UserMention(UserMention {
            user_id: element.attr("data-user-id")?.to_string(),
            label: element.text_content(),
            email: None,
        })),
        NodeKindTag::ContactMention => Some(NodeKind::ContactMention(ContactMention {
            contact_id: element.attr("data-contact-id")?.to_string(),
            label: element.text_content(),
            email: None,
        })),
        NodeKindTag::DocumentMention => Some(NodeKind::DocumentMention(DocumentMention {
            document_id: element.attr("data-document-id")?.to_string(),
            label: element.text_content(),
            block_type: element.attr("data-block-type").map(str::to_string),
            params: BTreeMap::new(),
        })),
        NodeKindTag::DateMention => Some(NodeKind::DateMention(DateMention {
            date: element.attr("data-date")?.to_string(),
            label: element.text_content(),
        })),
        NodeKindTag::Equation => Some(NodeKind::Equation(Equation {
            source: element.attr("data-source")?.to_string(),
            inline: element.tag == "span",
        })),
        NodeKindTag::Media => {
            let media = Media {
                media: if element.tag == "video" {
                    MediaKind::Video
                } else {
                    MediaKind::Image
                },
                source: MediaSource::External,
                ref_id: None,
                url: element.attr("src")?.to_string(),
                alt: element.attr("alt").map(str::to_string),
                width: element.attr("width").and_then(|w| w.parse().ok()),
                height: element.attr("height").and_then(|h| h.parse().ok()),
                scale: 1.0,
                dirty: false,
            };
            Some(NodeKind::Media(media))
        }
        NodeKindTag::ClassedBlock => {
            let block_tag = BlockTag::parse(&element.tag)?;
            let classes = element
                .attr("class")
                .map(|value| value.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            Some(NodeKind::ClassedBlock(ClassedBlock {
                tag: block_tag,
                classes,
            }))
        }
        NodeKindTag::CommentMark => Some(NodeKind::CommentMark(CommentMark {
            comment_id: element.attr("data-comment-id")?.to_string(),
            resolved: false,
        })),
        NodeKindTag::HorizontalRule => Some(NodeKind::HorizontalRule),
        NodeKindTag::CodeBlock => Some(NodeKind::CodeBlock(CodeBlock {
            language: element.attr("data-language").map(str::to_string),
            code: element.text_content(),
        })),
        _ => None,
    }
}
