//! Provider traits for the positioning and short-range-radio collaborators
//!
//! The relay core never talks to a platform radio or positioning stack
//! directly. It is wired against these two traits, constructed and injected
//! at the composition root, so tests and the demo runner substitute
//! simulated providers without any module-level indirection.

use tokio::sync::mpsc;

use mayday_core::error::Result;
use mayday_core::types::LocationFix;

/// Outcome of a platform permission query
///
/// "Not yet determined" is distinct from an outright denial: an unknown
/// status is resolved by requesting, a denied one is final for this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    /// The user has not been asked yet
    Unknown,
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

/// A raw scan observation from the radio layer
///
/// `name` is `None` for unnamed broadcast frames; the relay layer discards
/// those since an unnamed peer cannot be meaningfully displayed or logged.
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub peer_id: String,
    pub name: Option<String>,
}

impl Advertisement {
    pub fn named(peer_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            name: Some(name.into()),
        }
    }

    pub fn unnamed(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            name: None,
        }
    }
}

/// Positioning provider: permission gating plus a subscribe/unsubscribe pair
///
/// Permission checks never error; denial is an ordinary boolean outcome.
#[trait_variant::make(PositioningProvider: Send)]
pub trait LocalPositioningProvider {
    async fn check_permission(&self) -> bool;

    async fn request_permission(&self) -> bool;

    /// Begin emitting fixes into the sender. Fixes may arrive up to once per
    /// second until [`Self::stop_updates`] is called, which must also drop
    /// the sender. Errors with `TrackingStart` when the underlying provider
    /// cannot start.
    async fn start_updates(&self, fixes: mpsc::Sender<LocationFix>) -> Result<()>;

    async fn stop_updates(&self);
}

/// Radio manager: permission gating, scan, connect/disconnect, and a single
/// write-with-acknowledgement primitive per connected peer
#[trait_variant::make(RadioProvider: Send)]
pub trait LocalRadioProvider {
    /// Low-level I/O handle for one connected peer
    type Handle: Clone + Send + Sync + 'static;

    async fn check_permission(&self) -> PermissionStatus;

    async fn request_permission(&self) -> PermissionStatus;

    /// Begin emitting scan observations into the sender until
    /// [`Self::stop_scan`], which must also drop the sender. Errors with
    /// `ScanStart` when the adapter cannot scan.
    async fn start_scan(&self, observations: mpsc::Sender<Advertisement>) -> Result<()>;

    async fn stop_scan(&self);

    /// Connect and run full capability discovery. On success the provider
    /// must send the peer id on `disconnects` exactly once if and only if
    /// the peer drops after this connect and before an explicit
    /// [`Self::disconnect`] for it.
    async fn connect(&self, peer_id: &str, disconnects: mpsc::Sender<String>)
        -> Result<Self::Handle>;

    /// Always safe, including when the peer is not connected
    async fn disconnect(&self, peer_id: &str);

    /// One write against a peer characteristic; false on failure
    async fn write(
        &self,
        handle: &Self::Handle,
        service_id: &str,
        characteristic_id: &str,
        payload: &[u8],
    ) -> bool;
}
