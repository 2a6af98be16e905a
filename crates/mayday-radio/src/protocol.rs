//! Relay GATT constants and the location frame written to peers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mayday_core::error::Result;
use mayday_core::types::{AlertId, LocationFix};

/// GATT service advertised by Mayday relay nodes (UART-style bridge service)
pub const RELAY_SERVICE_UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/// Characteristic the app writes location frames to
pub const RELAY_TX_CHARACTERISTIC_UUID: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/// One location delivery, as written to the relay characteristic
///
/// This is the only wire shape the core defines; how a relay node forwards
/// it toward the backhaul network is the node's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixFrame {
    /// Alert session token; identical for every frame of one activation
    pub alert_id: String,

    /// Monotonically increasing per-session sequence number
    pub seq: u64,

    pub latitude: f64,

    pub longitude: f64,

    /// Fix capture instant (RFC 3339)
    pub timestamp: DateTime<Utc>,
}

impl FixFrame {
    pub fn new(alert_id: &AlertId, seq: u64, fix: &LocationFix) -> Self {
        Self {
            alert_id: alert_id.as_str().to_string(),
            seq,
            latitude: fix.latitude,
            longitude: fix.longitude,
            timestamp: fix.timestamp,
        }
    }

    /// Serialize for a characteristic write
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a frame back out of payload bytes
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}
