//! Content node model.
//!
//! A [`Node`] is one element of the document tree. It carries two identities:
//!
//! - [`NodeKey`] - ephemeral arena handle, unique within one in-memory tree,
//!   regenerated on every load, never serialized.
//! - [`NodeId`] - durable identifier, stable across save/reload, kept in
//!   bijection with live keys by the identity plugin.
//!
//! Ownership attribution (`peer_id`, `shared_peer_ids`, derived `local`) lives
//! in the reserved [`NodeState`] container, outside the variant payloads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod kind;
pub mod schema;

pub use kind::{
    BlockTag, ClassedBlock, CodeBlock, CommentMark, Completion, ContactMention, DateMention, Diff,
    DiffInsert, Dimensioned, DocumentMention, Equation, Media, MediaKind, MediaSource, NodeKind,
    NodeKindTag, SearchMatch, TextRun, UserMention,
};

/// Durable node identifier (fixed-length random token).
pub type NodeId = Uuid;

/// Authoring session identifier.
pub type PeerId = u64;

/// Ephemeral arena handle, unique within one tree instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey(pub u64);

/// Reserved per-node state: durable identity and ownership attribution.
///
/// `local` is derived from peer comparison against the current session and is
/// never serialized as authoritative truth.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<PeerId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_peer_ids: Vec<PeerId>,
    #[serde(skip)]
    pub local: Option<bool>,
}

impl NodeState {
    pub fn is_vacant(&self) -> bool {
        self.id.is_none() && self.peer_id.is_none() && self.shared_peer_ids.is_empty()
    }

    /// Whether any ownership attribution is present.
    pub fn is_owned(&self) -> bool {
        self.peer_id.is_some() || !self.shared_peer_ids.is_empty()
    }
}

/// One node of a live tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub key: NodeKey,
    pub parent: Option<NodeKey>,
    pub kind: NodeKind,
    pub state: NodeState,
    pub children: Vec<NodeKey>,
}

/// Tree-independent description of a node and its subtree.
///
/// Transformer rules produce specs so they stay pure and unit-testable
/// without a live tree; the arena materializes them inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub kind: NodeKind,
    pub state: NodeState,
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            state: NodeState::default(),
            children: Vec::new(),
        }
    }

    pub fn with_children(kind: NodeKind, children: Vec<NodeSpec>) -> Self {
        Self {
            kind,
            state: NodeState::default(),
            children,
        }
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(NodeKind::text(text))
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::with_children(NodeKind::Paragraph, vec![Self::text(text)])
    }

    /// Clears durable ids on the whole subtree (clipboard invalidation).
    pub fn strip_ids(&mut self) {
        self.state.id = None;
        for child in &mut self.children {
            child.strip_ids();
        }
    }

    /// Concatenated plain-text content of the subtree.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = self.kind.display_text() {
            out.push_str(&text);
            return;
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}
