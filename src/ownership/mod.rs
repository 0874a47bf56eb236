//! Ownership plugin.
//!
//! Attributes each node to an authoring peer and derives, for the current
//! session, whether the node is locally owned. The ledger additionally keeps
//! a per-id record so that destroying a node with shared ownership promotes
//! the next shared peer instead of dropping the record outright.

use crate::node::{NodeId, NodeState, PeerId};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRecord {
    pub peer_id: Option<PeerId>,
    pub shared_peer_ids: Vec<PeerId>,
}

impl OwnershipRecord {
    fn of(state: &NodeState) -> Self {
        Self {
            peer_id: state.peer_id,
            shared_peer_ids: state.shared_peer_ids.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OwnershipLedger {
    session_peer: PeerId,
    records: BTreeMap<NodeId, OwnershipRecord>,
}

impl OwnershipLedger {
    pub fn new(session_peer: PeerId) -> Self {
        Self {
            session_peer,
            records: BTreeMap::new(),
        }
    }

    pub fn session_peer(&self) -> PeerId {
        self.session_peer
    }

    pub fn set_session_peer(&mut self, peer: PeerId) {
        self.session_peer = peer;
    }

    pub fn record(&self, id: &NodeId) -> Option<&OwnershipRecord> {
        self.records.get(id)
    }

    /// Assigns ownership on first commit: a node with no peer gets the
    /// current session's peer id, and `local` is (re)derived.
    pub fn claim(&mut self, id: NodeId, state: &mut NodeState) {
        if state.peer_id.is_none() && state.shared_peer_ids.is_empty() {
            state.peer_id = Some(self.session_peer);
        }
        self.refresh_local(state);
        self.records.insert(id, OwnershipRecord::of(state));
    }

    /// A node is local when its primary peer is the current session, or the
    /// current session appears among the shared claimants.
    pub fn is_local(&self, state: &NodeState) -> bool {
        state.peer_id == Some(self.session_peer)
            || state.shared_peer_ids.contains(&self.session_peer)
    }

    /// Recomputes the derived `local` flag in place.
    pub fn refresh_local(&self, state: &mut NodeState) {
        state.local = if state.is_owned() {
            Some(self.is_local(state))
        } else {
            None
        };
    }

    /// Adds a secondary claimant. No-op when the candidate already is the
    /// primary owner or already listed.
    pub fn add_shared_peer(&mut self, id: Option<NodeId>, state: &mut NodeState, peer: PeerId) {
        if state.peer_id == Some(peer) || state.shared_peer_ids.contains(&peer) {
            return;
        }
        state.shared_peer_ids.push(peer);
        self.refresh_local(state);
        self.sync(id, state);
    }

    /// Removes a peer from a node's ownership. Returns whether ownership
    /// became fully vacated.
    ///
    /// Three cases: removing the primary owner with no shared peers clears
    /// ownership entirely; removing the primary owner with shared peers
    /// promotes the first shared peer; removing a shared claimant drops it
    /// from the list. Removing an unrelated peer is a silent no-op.
    pub fn remove_peer(&mut self, id: Option<NodeId>, state: &mut NodeState, peer: PeerId) -> bool {
        let vacated = if state.peer_id == Some(peer) {
            if state.shared_peer_ids.is_empty() {
                state.peer_id = None;
                state.local = None;
                tracing::debug!(peer, "node ownership fully vacated");
                true
            } else {
                state.peer_id = Some(state.shared_peer_ids.remove(0));
                false
            }
        } else if let Some(position) = state.shared_peer_ids.iter().position(|p| *p == peer) {
            state.shared_peer_ids.remove(position);
            false
        } else {
            return false;
        };

        if !vacated {
            self.refresh_local(state);
        }
        self.sync(id, state);
        vacated
    }

    /// Destruction hook: a record with shared claimants survives with the
    /// first shared peer promoted, so a re-materialized node (undo) keeps a
    /// live owner. Sole-owner records die with the node.
    pub fn note_destroyed(&mut self, id: NodeId) {
        match self.records.get_mut(&id) {
            Some(record) if !record.shared_peer_ids.is_empty() => {
                record.peer_id = Some(record.shared_peer_ids.remove(0));
            }
            Some(_) => {
                self.records.remove(&id);
            }
            None => {}
        }
    }

    fn sync(&mut self, id: Option<NodeId>, state: &NodeState) {
        if let Some(id) = id {
            if state.is_owned() {
                self.records.insert(id, OwnershipRecord::of(state));
            } else {
                self.records.remove(&id);
            }
        }
    }
}
