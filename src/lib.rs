//! md-nodetree: typed content-node tree with bidirectional tagged-markdown
//! transformation for rich documents.
//!
//! This crate is the document core of a collaborative editor: a polymorphic
//! tree of typed content nodes (mentions, tables, equations, diffs, media,
//! classed containers) with durable cross-session identities, per-node
//! authorship bookkeeping, and lossless conversion between the live tree and
//! a markdown-like text format that embeds structured data as inline
//! XML-style tags. It includes:
//!
//! - **Node model** - closed variant enum, reserved id/ownership state,
//!   versioned serialization schema with legacy migration
//! - **Type registry** - per-profile allowed-variant sets with replacement
//!   rules and import fallbacks
//! - **Transactional tree** - update batching with commit-time identity and
//!   ownership bookkeeping
//! - **Transformer pipeline** - internal (lossless), external (portable) and
//!   combined rule sets
//! - **Decorator registry** - per-instance render/DOM indirection so the
//!   model runs headless
//!
//! # Quick Start
//!
//! ```rust
//! use md_nodetree::{Profile, RuleSet, transform};
//!
//! let set = RuleSet::internal();
//! let tree = transform::import_document(Profile::Full, 1, "notes\n\nhello", &set).unwrap();
//! let output = transform::export_tree(&tree, &set);
//! assert!(output.contains("hello"));
//! ```

// Content node model and serialization schema
pub mod node;

// Per-profile variant registry and fallback degradation
pub mod registry;

// Transactional arena and commit bookkeeping
pub mod tree;

// Durable-id plugin
pub mod identity;

// Authorship/ownership plugin
pub mod ownership;

// Bidirectional markdown transformation pipeline
pub mod transform;

// Decorator / DOM indirection registry
pub mod decorate;

// Lightweight DOM element value model
pub mod dom;

// Re-export node model types
pub use node::{
    BlockTag, ClassedBlock, CodeBlock, CommentMark, Completion, ContactMention, DateMention, Diff,
    DiffInsert, Dimensioned, DocumentMention, Equation, Media, MediaKind, MediaSource, Node,
    NodeId, NodeKey, NodeKind, NodeKindTag, NodeSpec, NodeState, PeerId, SearchMatch, TextRun,
    UserMention,
};

// Re-export schema types
pub use node::schema::{SCHEMA_VERSION, SchemaError, decode_spec, encode_spec};

// Re-export registry types
pub use registry::{NodeTypeRegistry, Profile, RegistryError};

// Re-export tree types
pub use tree::{CommitSummary, DocTree, TreeError, Txn, UpdateTag};

// Re-export plugin types
pub use identity::IdentityIndex;
pub use ownership::{OwnershipLedger, OwnershipRecord};

// Re-export transformer types and operations
pub use transform::diff::{accept_diff, reject_diff};
pub use transform::search::{clear_matches, highlight_matches};
pub use transform::{
    BlockReplacement, ElementRule, ExportCtx, ImportCtx, ImportLimits, RuleSet, RuleSetKind,
    TextRule, export_subtree, export_tree, import_document, import_markdown, paste_markdown,
};

// Re-export decoration and DOM types
pub use decorate::{Decoration, DecoratorRegistry, DomFactoryFn, RenderFn};
pub use dom::{Child, Element, MARKER_ATTR};
