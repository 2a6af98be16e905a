//! Relay event definitions
//!
//! Every observation the session state machine reacts to — discovery,
//! connect results, radio-initiated disconnects, positioning fixes — is
//! delivered as one [`RelayEvent`] on a single channel, so the event pump
//! has exactly one inbound type to reason about.

use crate::types::LocationFix;

/// Events flowing into the session event pump
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A named relay peer was observed during a scan
    PeerDiscovered { peer_id: String, name: String },

    /// An asynchronous connect attempt succeeded
    PeerConnected { peer_id: String },

    /// An asynchronous connect attempt failed; the peer is dropped
    PeerConnectFailed { peer_id: String },

    /// The radio dropped a previously connected peer
    PeerDisconnected { peer_id: String },

    /// The positioning provider produced a new fix
    FixAcquired(LocationFix),
}

impl RelayEvent {
    /// Get the peer id if this event relates to a peer
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            RelayEvent::PeerDiscovered { peer_id, .. } => Some(peer_id),
            RelayEvent::PeerConnected { peer_id } => Some(peer_id),
            RelayEvent::PeerConnectFailed { peer_id } => Some(peer_id),
            RelayEvent::PeerDisconnected { peer_id } => Some(peer_id),
            RelayEvent::FixAcquired(_) => None,
        }
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match self {
            RelayEvent::PeerDiscovered { peer_id, name } => {
                format!("Peer discovered: {} ({})", name, peer_id)
            }
            RelayEvent::PeerConnected { peer_id } => {
                format!("Peer connected: {}", peer_id)
            }
            RelayEvent::PeerConnectFailed { peer_id } => {
                format!("Peer connect failed: {}", peer_id)
            }
            RelayEvent::PeerDisconnected { peer_id } => {
                format!("Peer disconnected: {}", peer_id)
            }
            RelayEvent::FixAcquired(fix) => {
                format!("Fix acquired: {}", fix)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_extraction() {
        let event = RelayEvent::PeerDiscovered {
            peer_id: "AA:BB".to_string(),
            name: "RELAY-001".to_string(),
        };
        assert_eq!(event.peer_id(), Some("AA:BB"));

        let event = RelayEvent::FixAcquired(LocationFix::new(0.0, 0.0));
        assert_eq!(event.peer_id(), None);
    }

    #[test]
    fn test_summary_mentions_peer() {
        let event = RelayEvent::PeerConnected {
            peer_id: "AA:BB".to_string(),
        };
        assert!(event.summary().contains("AA:BB"));
    }
}
