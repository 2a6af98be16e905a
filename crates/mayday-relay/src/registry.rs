//! In-memory bookkeeping of discovered and connected relay peers

use std::collections::HashMap;

use mayday_core::types::{PeerConnectionState, RelayPeer};

/// Source of truth for "who do we fan out to"
///
/// Pure state transitions, no I/O. Shared behind one mutex between the
/// discovery path (writer) and the dispatch path (reader); fan-out always
/// iterates a [`RelayRegistry::connected_snapshot`], never the live map, so
/// a peer connecting or disconnecting mid-fan-out cannot corrupt iteration.
///
/// A peer appears in the connected view iff its most recent connect attempt
/// succeeded and no disconnect has since been observed.
#[derive(Debug, Default)]
pub struct RelayRegistry {
    peers: HashMap<String, RelayPeer>,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a scan observation. False when the peer was already known
    /// (repeat advertisements are expected and ignored).
    pub fn record_discovered(&mut self, peer_id: &str, name: &str) -> bool {
        if self.peers.contains_key(peer_id) {
            return false;
        }
        self.peers
            .insert(peer_id.to_string(), RelayPeer::discovered(peer_id, name));
        true
    }

    pub fn mark_connecting(&mut self, peer_id: &str) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.connection_state = PeerConnectionState::Connecting;
        }
    }

    /// False when the peer is unknown (e.g. already swept by a teardown)
    pub fn mark_connected(&mut self, peer_id: &str) -> bool {
        match self.peers.get_mut(peer_id) {
            Some(peer) => {
                peer.connection_state = PeerConnectionState::Connected;
                true
            }
            None => false,
        }
    }

    /// Transition to Disconnected and drop the entry, so a later scan can
    /// rediscover the peer. Returns whether the peer was connected.
    pub fn mark_disconnected(&mut self, peer_id: &str) -> bool {
        match self.peers.remove(peer_id) {
            Some(peer) => peer.is_connected(),
            None => false,
        }
    }

    /// Drop a peer whose connect attempt failed
    pub fn remove(&mut self, peer_id: &str) {
        self.peers.remove(peer_id);
    }

    /// Immutable point-in-time view of the connected peer ids
    pub fn connected_snapshot(&self) -> Vec<String> {
        self.peers
            .values()
            .filter(|p| p.is_connected())
            .map(|p| p.peer_id.clone())
            .collect()
    }

    pub fn connected_count(&self) -> usize {
        self.peers.values().filter(|p| p.is_connected()).count()
    }

    pub fn get(&self, peer_id: &str) -> Option<&RelayPeer> {
        self.peers.get(peer_id)
    }

    /// Peers known to this session in any state, connected or not
    pub fn discovered_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Drop every peer in the connected view (teardown: no new dispatch may
    /// target them while in-flight deliveries drain)
    pub fn clear_connected(&mut self) {
        self.peers.retain(|_, p| !p.is_connected());
    }

    /// Drop all bookkeeping (teardown completion)
    pub fn clear(&mut self) {
        self.peers.clear();
    }
}
