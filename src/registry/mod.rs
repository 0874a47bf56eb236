//! Node type registry.
//!
//! Enumerates, per editor configuration profile, exactly which node variants
//! a tree may contain. The allowed set is fixed at tree-construction time;
//! the conversion and identity plugins rely on the full variant set being
//! known up front. Data containing excluded variants degrades to its closest
//! supported fallback on import (see [`fallback`]) instead of erroring.

use crate::node::NodeKindTag;
use std::collections::{BTreeMap, BTreeSet};

pub mod fallback;

/// Editor configuration profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Basic blocks only: text, paragraphs, rules, code.
    Plain,
    /// Every variant.
    Full,
    /// Conversation surface: no tables, no media.
    Chat,
    /// Single-line inline surface: text and mentions.
    Title,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry is missing required substrate kind {0:?}")]
    MissingSubstrate(NodeKindTag),
}

/// Per-tree variant registry. Constructor-injected, one per editor instance.
#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    profile: Profile,
    allowed: BTreeSet<NodeKindTag>,
    /// Replacement rules: generic type-name requests substituted with a
    /// specialized variant (e.g. a plain code fence always becomes the rich
    /// code node).
    requests: BTreeMap<&'static str, NodeKindTag>,
}

impl NodeTypeRegistry {
    pub fn for_profile(profile: Profile) -> Self {
        let allowed: BTreeSet<NodeKindTag> = match profile {
            Profile::Full => NodeKindTag::ALL.iter().copied().collect(),
            Profile::Plain => [
                NodeKindTag::Root,
                NodeKindTag::Text,
                NodeKindTag::Paragraph,
                NodeKindTag::HorizontalRule,
                NodeKindTag::CodeBlock,
                NodeKindTag::SearchMatch,
                NodeKindTag::Completion,
            ]
            .into_iter()
            .collect(),
            Profile::Chat => NodeKindTag::ALL
                .iter()
                .copied()
                .filter(|tag| {
                    !matches!(
                        tag,
                        NodeKindTag::Table
                            | NodeKindTag::TableRow
                            | NodeKindTag::TableCell
                            | NodeKindTag::Media
                    )
                })
                .collect(),
            Profile::Title => [
                NodeKindTag::Root,
                NodeKindTag::Text,
                NodeKindTag::UserMention,
                NodeKindTag::ContactMention,
                NodeKindTag::DocumentMention,
                NodeKindTag::DateMention,
                NodeKindTag::SearchMatch,
                NodeKindTag::Completion,
            ]
            .into_iter()
            .collect(),
        };

        let mut requests = BTreeMap::new();
        if allowed.contains(&NodeKindTag::CodeBlock) {
            requests.insert("codeFence", NodeKindTag::CodeBlock);
        }

        Self {
            profile,
            allowed,
            requests,
        }
    }

    /// Builds a registry from an explicit allowed set. The substrate kinds
    /// the plugins depend on must be present; their absence is a fatal
    /// construction error, not a degradation.
    pub fn with_allowed(
        profile: Profile,
        allowed: BTreeSet<NodeKindTag>,
    ) -> Result<Self, RegistryError> {
        for required in [NodeKindTag::Root, NodeKindTag::Text] {
            if !allowed.contains(&required) {
                return Err(RegistryError::MissingSubstrate(required));
            }
        }
        let mut requests = BTreeMap::new();
        if allowed.contains(&NodeKindTag::CodeBlock) {
            requests.insert("codeFence", NodeKindTag::CodeBlock);
        }
        Ok(Self {
            profile,
            allowed,
            requests,
        })
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn allows(&self, tag: NodeKindTag) -> bool {
        self.allowed.contains(&tag)
    }

    /// Resolves a generic type-name request through the replacement rules.
    pub fn resolve_request(&self, name: &str) -> Option<NodeKindTag> {
        if let Some(tag) = self.requests.get(name) {
            return Some(*tag);
        }
        NodeKindTag::from_name(name).filter(|tag| self.allows(*tag))
    }

    /// Whether the identity plugin assigns durable ids to this variant.
    /// Inline text runs, editor-transient kinds, and the diff payload
    /// wrappers (whose identity lives on the diff node itself) are not
    /// tracked.
    pub fn tracked(&self, tag: NodeKindTag) -> bool {
        self.allows(tag)
            && !matches!(
                tag,
                NodeKindTag::Root
                    | NodeKindTag::Text
                    | NodeKindTag::SearchMatch
                    | NodeKindTag::Completion
                    | NodeKindTag::DiffInsert
                    | NodeKindTag::DiffDelete
            )
    }
}
