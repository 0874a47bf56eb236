//! Transactional document tree.
//!
//! [`DocTree`] is the arena the node model lives in. All mutation happens
//! inside discrete update transactions; identity and ownership bookkeeping
//! run synchronously after a transaction commits. Destroyed-node cleanup is
//! derived from the previous committed state; created-node bookkeeping runs
//! as its own follow-up step so nodes are fully constructed first.
//!
//! The tree is single-threaded and cooperative; nothing here blocks or
//! suspends. The identity and ownership indexes are written only from the
//! commit path, never by external callers.

use crate::identity::IdentityIndex;
use crate::node::schema::{self, SchemaError};
use crate::node::{Completion, Node, NodeId, NodeKey, NodeKind, NodeKindTag, NodeSpec, NodeState, PeerId};
use crate::ownership::OwnershipLedger;
use crate::registry::{NodeTypeRegistry, Profile, fallback};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTag {
    /// Ordinary user edit.
    Edit,
    /// Clipboard insertion; pasted nodes get fresh durable ids.
    Paste,
    /// Bulk document load.
    Load,
    /// Plugin metadata bookkeeping, excluded from edit history by the host.
    Bookkeeping,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("stale node key {0:?}")]
    StaleKey(NodeKey),
    #[error("variant {0:?} is not allowed by the active profile")]
    KindNotAllowed(NodeKindTag),
    #[error("the root node cannot be moved or removed")]
    RootImmutable,
    #[error("cannot move a node into its own subtree")]
    InvalidMove,
    #[error("node {key:?} is not a {expected:?}")]
    UnexpectedKind {
        key: NodeKey,
        expected: NodeKindTag,
    },
}

/// What one committed transaction did, for host-side history integration.
#[derive(Debug, Clone)]
pub struct CommitSummary {
    pub tag: UpdateTag,
    pub created: Vec<NodeKey>,
    pub destroyed: Vec<NodeKey>,
}

#[derive(Debug)]
struct Arena {
    nodes: BTreeMap<NodeKey, Node>,
    root: NodeKey,
    next_key: u64,
}

impl Arena {
    fn new() -> Self {
        let root_key = NodeKey(1);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            root_key,
            Node {
                key: root_key,
                parent: None,
                kind: NodeKind::Root,
                state: NodeState::default(),
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            root: root_key,
            next_key: 2,
        }
    }

    fn alloc(&mut self) -> NodeKey {
        let key = NodeKey(self.next_key);
        self.next_key += 1;
        key
    }

    fn attach(&mut self, parent: NodeKey, index: Option<usize>, key: NodeKey) {
        if let Some(node) = self.nodes.get_mut(&key) {
            node.parent = Some(parent);
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            let at = index
                .unwrap_or(parent_node.children.len())
                .min(parent_node.children.len());
            parent_node.children.insert(at, key);
        }
    }

    fn detach(&mut self, key: NodeKey) {
        let Some(parent) = self.nodes.get(&key).and_then(|node| node.parent) else {
            return;
        };
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.retain(|child| *child != key);
        }
        if let Some(node) = self.nodes.get_mut(&key) {
            node.parent = None;
        }
    }

    fn collect_subtree(&self, key: NodeKey, out: &mut Vec<NodeKey>) {
        if let Some(node) = self.nodes.get(&key) {
            out.push(key);
            for &child in &node.children {
                self.collect_subtree(child, out);
            }
        }
    }

    fn remove_subtree(&mut self, key: NodeKey) {
        self.detach(key);
        let mut keys = Vec::new();
        self.collect_subtree(key, &mut keys);
        for key in keys {
            self.nodes.remove(&key);
        }
    }

    fn is_descendant(&self, candidate: NodeKey, of: NodeKey) -> bool {
        let mut cursor = Some(candidate);
        while let Some(key) = cursor {
            if key == of {
                return true;
            }
            cursor = self.nodes.get(&key).and_then(|node| node.parent);
        }
        false
    }
}

/// One editor instance's document tree with its plugins.
#[derive(Debug)]
pub struct DocTree {
    registry: NodeTypeRegistry,
    arena: Arena,
    committed: BTreeSet<NodeKey>,
    identity: IdentityIndex,
    ownership: OwnershipLedger,
    last_commit: Option<CommitSummary>,
}

impl DocTree {
    pub fn new(profile: Profile, session_peer: PeerId) -> Self {
        let arena = Arena::new();
        let committed = arena.nodes.keys().copied().collect();
        Self {
            registry: NodeTypeRegistry::for_profile(profile),
            arena,
            committed,
            identity: IdentityIndex::new(),
            ownership: OwnershipLedger::new(session_peer),
            last_commit: None,
        }
    }

    pub fn root(&self) -> NodeKey {
        self.arena.root
    }

    pub fn registry(&self) -> &NodeTypeRegistry {
        &self.registry
    }

    pub fn session_peer(&self) -> PeerId {
        self.ownership.session_peer()
    }

    pub fn len(&self) -> usize {
        self.arena.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.nodes.len() <= 1
    }

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.arena.nodes.get(&key)
    }

    pub fn node(&self, key: NodeKey) -> Result<&Node, TreeError> {
        self.get(key).ok_or(TreeError::StaleKey(key))
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.get(key).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    /// Committed keys in document (depth-first) order.
    pub fn walk(&self) -> Vec<NodeKey> {
        let mut out = Vec::with_capacity(self.arena.nodes.len());
        self.arena.collect_subtree(self.arena.root, &mut out);
        out
    }

    /// Synchronous read section over committed state.
    pub fn read<R>(&self, f: impl FnOnce(&DocTree) -> R) -> R {
        f(self)
    }

    pub fn update<R>(&mut self, f: impl FnOnce(&mut Txn<'_>) -> R) -> R {
        self.update_tagged(UpdateTag::Edit, f)
    }

    pub fn update_tagged<R>(&mut self, tag: UpdateTag, f: impl FnOnce(&mut Txn<'_>) -> R) -> R {
        let mut txn = Txn {
            arena: &mut self.arena,
            registry: &self.registry,
            tag,
        };
        let out = f(&mut txn);
        self.commit(tag);
        out
    }

    pub fn last_commit(&self) -> Option<&CommitSummary> {
        self.last_commit.as_ref()
    }

    // --- identity plugin surface ---

    pub fn identity(&self) -> &IdentityIndex {
        &self.identity
    }

    pub fn resolve_id(&self, id: &NodeId) -> Option<NodeKey> {
        self.identity.resolve(id)
    }

    pub fn id_of(&self, key: NodeKey) -> Option<NodeId> {
        self.identity.id_of(key)
    }

    /// Rebuilds the identity index from scratch by walking the whole tree.
    /// Used after bulk structural replacement.
    pub fn reindex_identity(&mut self) {
        self.identity.clear();
        for key in self.walk() {
            let Some(node) = self.arena.nodes.get_mut(&key) else {
                continue;
            };
            if !self.registry.tracked(node.kind.tag()) {
                continue;
            }
            let id = self.identity.ensure(key, node.state.id);
            node.state.id = Some(id);
        }
    }

    // --- ownership plugin surface ---

    pub fn ownership(&self) -> &OwnershipLedger {
        &self.ownership
    }

    pub fn add_shared_peer(&mut self, key: NodeKey, peer: PeerId) -> Result<(), TreeError> {
        let id = self.identity.id_of(key);
        let node = self
            .arena
            .nodes
            .get_mut(&key)
            .ok_or(TreeError::StaleKey(key))?;
        self.ownership.add_shared_peer(id, &mut node.state, peer);
        Ok(())
    }

    /// Removes a peer from a node's ownership; returns whether ownership
    /// became fully vacated.
    pub fn remove_peer(&mut self, key: NodeKey, peer: PeerId) -> Result<bool, TreeError> {
        let id = self.identity.id_of(key);
        let node = self
            .arena
            .nodes
            .get_mut(&key)
            .ok_or(TreeError::StaleKey(key))?;
        Ok(self.ownership.remove_peer(id, &mut node.state, peer))
    }

    /// Recomputes `local` for every node against a (possibly new) session
    /// peer. Used after login or bulk load.
    pub fn reconcile_ownership(&mut self, session_peer: PeerId) {
        self.ownership.set_session_peer(session_peer);
        for node in self.arena.nodes.values_mut() {
            self.ownership.refresh_local(&mut node.state);
        }
    }

    // --- completion helpers ---

    /// Installs a ghost completion under `parent`, replacing any previous one.
    pub fn set_completion(
        &mut self,
        parent: NodeKey,
        text: impl Into<String>,
    ) -> Result<NodeKey, TreeError> {
        let text = text.into();
        self.update(|txn| {
            let stale: Vec<NodeKey> = txn
                .children(parent)?
                .iter()
                .copied()
                .filter(|key| {
                    txn.get(*key)
                        .map(|node| node.kind.tag() == NodeKindTag::Completion)
                        .unwrap_or(false)
                })
                .collect();
            for key in stale {
                txn.remove(key)?;
            }
            txn.append(parent, NodeKind::Completion(Completion { text }))
        })
    }

    /// Converts an accepted completion into ordinary text content.
    pub fn accept_completion(&mut self, key: NodeKey) -> Result<NodeKey, TreeError> {
        self.update(|txn| {
            let node = txn.node(key)?;
            let NodeKind::Completion(completion) = &node.kind else {
                return Err(TreeError::UnexpectedKind {
                    key,
                    expected: NodeKindTag::Completion,
                });
            };
            let text = completion.text.clone();
            let parent = node.parent.ok_or(TreeError::StaleKey(key))?;
            let index = txn.index_in_parent(key).unwrap_or(0);
            txn.remove(key)?;
            txn.create(parent, Some(index), NodeKind::text(text))
        })
    }

    pub fn clear_completions(&mut self) {
        let stale: Vec<NodeKey> = self
            .walk()
            .into_iter()
            .filter(|key| {
                self.get(*key)
                    .map(|node| node.kind.tag() == NodeKindTag::Completion)
                    .unwrap_or(false)
            })
            .collect();
        if stale.is_empty() {
            return;
        }
        self.update(|txn| {
            for key in stale {
                let _ = txn.remove(key);
            }
        });
    }

    // --- serialization glue ---

    /// Tree-independent spec of a subtree, state included.
    pub fn spec_of(&self, key: NodeKey) -> Option<NodeSpec> {
        let node = self.get(key)?;
        let children = node
            .children
            .iter()
            .filter_map(|child| self.spec_of(*child))
            .collect();
        Some(NodeSpec {
            kind: node.kind.clone(),
            state: node.state.clone(),
            children,
        })
    }

    pub fn to_schema(&self) -> serde_json::Value {
        let root = self
            .spec_of(self.root())
            .expect("root node always exists");
        schema::encode_spec(&root)
    }

    pub fn load_schema(
        profile: Profile,
        session_peer: PeerId,
        value: &serde_json::Value,
    ) -> Result<DocTree, SchemaError> {
        let mut tree = DocTree::new(profile, session_peer);
        let spec = schema::decode_spec(value)?;
        let specs = if spec.kind.tag() == NodeKindTag::Root {
            spec.children
        } else {
            vec![spec]
        };
        let degraded: Vec<NodeSpec> = specs
            .into_iter()
            .flat_map(|spec| fallback::degrade(&tree.registry, spec))
            .collect();
        let root = tree.root();
        tree.update_tagged(UpdateTag::Load, |txn| {
            for spec in degraded {
                txn.insert_spec(root, None, spec)?;
            }
            Ok::<(), TreeError>(())
        })?;
        Ok(tree)
    }

    /// Commit bookkeeping: destroyed-node cleanup first (from the previous
    /// committed state), then created-node identity/ownership assignment as
    /// its own follow-up step.
    fn commit(&mut self, tag: UpdateTag) {
        let current: BTreeSet<NodeKey> = self.arena.nodes.keys().copied().collect();
        let destroyed: Vec<NodeKey> = self.committed.difference(&current).copied().collect();
        let created: Vec<NodeKey> = current.difference(&self.committed).copied().collect();

        for &key in &destroyed {
            if let Some(id) = self.identity.id_of(key) {
                self.ownership.note_destroyed(id);
            }
            self.identity.release_key(key);
        }

        self.committed = current;

        if tag != UpdateTag::Bookkeeping {
            for &key in &created {
                let Some(node) = self.arena.nodes.get_mut(&key) else {
                    continue;
                };
                if !self.registry.tracked(node.kind.tag()) {
                    continue;
                }
                if tag == UpdateTag::Paste {
                    // Pasted subtrees always take fresh identities so two
                    // independent trees can never merge colliding ids.
                    node.state.id = None;
                }
                let id = self.identity.ensure(key, node.state.id);
                node.state.id = Some(id);
                self.ownership.claim(id, &mut node.state);
            }
        }

        self.last_commit = Some(CommitSummary {
            tag,
            created,
            destroyed,
        });
    }
}

/// Mutable view of the tree inside one update transaction.
pub struct Txn<'a> {
    arena: &'a mut Arena,
    registry: &'a NodeTypeRegistry,
    tag: UpdateTag,
}

impl<'a> Txn<'a> {
    pub fn tag(&self) -> UpdateTag {
        self.tag
    }

    pub fn root(&self) -> NodeKey {
        self.arena.root
    }

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.arena.nodes.get(&key)
    }

    pub fn node(&self, key: NodeKey) -> Result<&Node, TreeError> {
        self.get(key).ok_or(TreeError::StaleKey(key))
    }

    pub fn children(&self, key: NodeKey) -> Result<&[NodeKey], TreeError> {
        self.node(key).map(|node| node.children.as_slice())
    }

    pub fn index_in_parent(&self, key: NodeKey) -> Option<usize> {
        let parent = self.get(key)?.parent?;
        self.get(parent)?
            .children
            .iter()
            .position(|child| *child == key)
    }

    pub fn create(
        &mut self,
        parent: NodeKey,
        index: Option<usize>,
        kind: NodeKind,
    ) -> Result<NodeKey, TreeError> {
        let tag = kind.tag();
        if tag == NodeKindTag::Root || !self.registry.allows(tag) {
            return Err(TreeError::KindNotAllowed(tag));
        }
        if !self.arena.nodes.contains_key(&parent) {
            return Err(TreeError::StaleKey(parent));
        }
        let key = self.arena.alloc();
        self.arena.nodes.insert(
            key,
            Node {
                key,
                parent: Some(parent),
                kind,
                state: NodeState::default(),
                children: Vec::new(),
            },
        );
        self.arena.attach(parent, index, key);
        Ok(key)
    }

    pub fn append(&mut self, parent: NodeKey, kind: NodeKind) -> Result<NodeKey, TreeError> {
        self.create(parent, None, kind)
    }

    /// Materializes a spec subtree, carrying its state (durable ids from
    /// internal imports survive; collisions resolve at commit).
    pub fn insert_spec(
        &mut self,
        parent: NodeKey,
        index: Option<usize>,
        spec: NodeSpec,
    ) -> Result<NodeKey, TreeError> {
        let key = self.create(parent, index, spec.kind)?;
        if let Some(node) = self.arena.nodes.get_mut(&key) {
            node.state = spec.state;
        }
        for child in spec.children {
            self.insert_spec(key, None, child)?;
        }
        Ok(key)
    }

    pub fn remove(&mut self, key: NodeKey) -> Result<(), TreeError> {
        if key == self.arena.root {
            return Err(TreeError::RootImmutable);
        }
        if !self.arena.nodes.contains_key(&key) {
            return Err(TreeError::StaleKey(key));
        }
        self.arena.remove_subtree(key);
        Ok(())
    }

    pub fn move_node(
        &mut self,
        key: NodeKey,
        new_parent: NodeKey,
        index: Option<usize>,
    ) -> Result<(), TreeError> {
        if key == self.arena.root {
            return Err(TreeError::RootImmutable);
        }
        if !self.arena.nodes.contains_key(&key) {
            return Err(TreeError::StaleKey(key));
        }
        if !self.arena.nodes.contains_key(&new_parent) {
            return Err(TreeError::StaleKey(new_parent));
        }
        if self.arena.is_descendant(new_parent, key) {
            return Err(TreeError::InvalidMove);
        }
        self.arena.detach(key);
        self.arena.attach(new_parent, index, key);
        Ok(())
    }

    pub fn with_kind<R>(
        &mut self,
        key: NodeKey,
        f: impl FnOnce(&mut NodeKind) -> R,
    ) -> Result<R, TreeError> {
        let node = self
            .arena
            .nodes
            .get_mut(&key)
            .ok_or(TreeError::StaleKey(key))?;
        Ok(f(&mut node.kind))
    }

    pub fn with_state<R>(
        &mut self,
        key: NodeKey,
        f: impl FnOnce(&mut NodeState) -> R,
    ) -> Result<R, TreeError> {
        let node = self
            .arena
            .nodes
            .get_mut(&key)
            .ok_or(TreeError::StaleKey(key))?;
        Ok(f(&mut node.state))
    }

    /// Clears durable ids on a whole subtree ahead of clipboard insertion.
    pub fn clear_subtree_ids(&mut self, key: NodeKey) -> Result<(), TreeError> {
        let mut keys = Vec::new();
        if !self.arena.nodes.contains_key(&key) {
            return Err(TreeError::StaleKey(key));
        }
        self.arena.collect_subtree(key, &mut keys);
        for key in keys {
            if let Some(node) = self.arena.nodes.get_mut(&key) {
                node.state.id = None;
            }
        }
        Ok(())
    }
}
