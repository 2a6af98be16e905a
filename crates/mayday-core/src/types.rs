//! Core domain types: fixes, alert sessions, relay peers

use std::fmt;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of characters in a generated alert token
const ALERT_TOKEN_LEN: usize = 16;

/// A single positioning fix
///
/// Immutable once produced. Not persisted by the relay core; persistence,
/// if any, belongs to an outer layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    /// Signed degrees, positive north
    pub latitude: f64,

    /// Signed degrees, positive east
    pub longitude: f64,

    /// Capture instant
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    /// Create a fix captured now
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp: Utc::now(),
        }
    }

    /// Create a fix with an explicit capture instant
    pub fn at(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
        }
    }
}

impl fmt::Display for LocationFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Opaque token identifying one SOS activation
///
/// Generated fresh each time the session is activated; every fix relayed
/// during that activation carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(String);

impl AlertId {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ALERT_TOKEN_LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// Wrap an existing token (tests, external id generators)
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of the alert session state machine
///
/// The only legal cycle is `Idle → Activating → Active → Cancelling → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; SOS control is idle
    Idle,

    /// Activation requested; scan and tracking start-up in progress
    Activating,

    /// Scanning, tracking, and fanning out fixes to connected peers
    Active,

    /// Teardown in progress; new dispatches are refused
    Cancelling,
}

impl SessionState {
    pub fn is_idle(self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Activating => "activating",
            SessionState::Active => "active",
            SessionState::Cancelling => "cancelling",
        };
        f.write_str(label)
    }
}

/// Connection state of a relay peer as tracked by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    /// Observed during a scan, connect not yet attempted
    Discovered,

    /// Connect attempt in flight
    Connecting,

    /// Connected; eligible for fix fan-out
    Connected,

    /// Dropped by the radio or by explicit teardown
    Disconnected,
}

/// A short-range-radio relay node toward the backhaul network
///
/// The registry owns the authoritative `peer_id → connection_state` map;
/// the radio layer owns only the transient I/O handle for a connected peer.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayPeer {
    /// Radio-layer stable identifier
    pub peer_id: String,

    /// Advertised name (unnamed peers are filtered at the scan layer)
    pub name: String,

    pub connection_state: PeerConnectionState,
}

impl RelayPeer {
    /// Create a freshly discovered peer
    pub fn discovered(peer_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            name: name.into(),
            connection_state: PeerConnectionState::Discovered,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == PeerConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_id_generate_length() {
        let id = AlertId::generate();
        assert_eq!(id.as_str().len(), ALERT_TOKEN_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_alert_id_generate_unique() {
        let a = AlertId::generate();
        let b = AlertId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_alert_id_from_token() {
        let id = AlertId::from_token("alert-1");
        assert_eq!(id.as_str(), "alert-1");
        assert_eq!(id.to_string(), "alert-1");
    }

    #[test]
    fn test_fix_display() {
        let fix = LocationFix::new(20.6736, -103.344);
        assert_eq!(fix.to_string(), "(20.6736, -103.3440)");
    }

    #[test]
    fn test_session_state_predicates() {
        assert!(SessionState::Idle.is_idle());
        assert!(SessionState::Active.is_active());
        assert!(!SessionState::Cancelling.is_active());
        assert!(!SessionState::Activating.is_idle());
    }

    #[test]
    fn test_relay_peer_discovered() {
        let peer = RelayPeer::discovered("AA:BB", "RELAY-001");
        assert_eq!(peer.connection_state, PeerConnectionState::Discovered);
        assert!(!peer.is_connected());
    }
}
