//! Durable identity plugin.
//!
//! Maintains the `id <-> key` bijection for one tree instance. Ids are
//! assigned lazily, on the first transactional commit that includes the node;
//! collisions (e.g. duplicated serialized content pasted back in) are
//! resolved by regenerating the incoming node's id, never surfaced as errors.

use crate::node::{NodeId, NodeKey};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
pub struct IdentityIndex {
    by_id: BTreeMap<NodeId, NodeKey>,
    by_key: BTreeMap<NodeKey, NodeId>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a node key from its durable id.
    pub fn resolve(&self, id: &NodeId) -> Option<NodeKey> {
        self.by_id.get(id).copied()
    }

    pub fn id_of(&self, key: NodeKey) -> Option<NodeId> {
        self.by_key.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Guarantees `key` has a durable id and returns it.
    ///
    /// An incoming id already mapped to a *different* live key means the node
    /// was duplicated; a fresh id is generated to preserve the bijection.
    pub fn ensure(&mut self, key: NodeKey, existing: Option<NodeId>) -> NodeId {
        if let Some(id) = existing {
            match self.by_id.get(&id) {
                Some(&other) if other != key => {
                    let fresh = self.fresh_id();
                    tracing::debug!(%id, %fresh, "durable id collision, regenerated");
                    self.record(fresh, key);
                    fresh
                }
                _ => {
                    self.record(id, key);
                    id
                }
            }
        } else {
            let fresh = self.fresh_id();
            self.record(fresh, key);
            fresh
        }
    }

    /// Deregisters a destroyed node.
    pub fn release_key(&mut self, key: NodeKey) {
        if let Some(id) = self.by_key.remove(&key) {
            self.by_id.remove(&id);
        }
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_key.clear();
    }

    /// Debug check: the two directions are mutual inverses.
    pub fn is_bijective(&self) -> bool {
        self.by_id.len() == self.by_key.len()
            && self
                .by_id
                .iter()
                .all(|(id, key)| self.by_key.get(key) == Some(id))
    }

    fn record(&mut self, id: NodeId, key: NodeKey) {
        if let Some(previous) = self.by_key.insert(key, id)
            && previous != id
        {
            self.by_id.remove(&previous);
        }
        self.by_id.insert(id, key);
    }

    fn fresh_id(&self) -> NodeId {
        loop {
            let id = Uuid::new_v4();
            if !self.by_id.contains_key(&id) {
                return id;
            }
        }
    }
}
