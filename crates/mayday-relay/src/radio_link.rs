//! Radio link: scan, connect, and framed writes against the radio provider
//!
//! Owns the transient low-level handle for each connected peer, addressed
//! by peer id; the authoritative connection-state map lives in the
//! registry. Every operation here is best-effort: failures collapse to a
//! boolean plus a log line, because one unreachable peer must never abort
//! work against the others.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use mayday_core::prelude::*;
use mayday_core::RelayEvent;
use mayday_radio::{
    PermissionStatus, RadioProvider, RELAY_SERVICE_UUID, RELAY_TX_CHARACTERISTIC_UUID,
};

use crate::lock;

/// Capacity of the internal scan observation channel
const OBSERVATION_CHANNEL_CAPACITY: usize = 64;

pub struct RadioLink<R: RadioProvider> {
    provider: Arc<R>,
    connect_timeout: Duration,
    scanning: Mutex<bool>,
    handles: Mutex<HashMap<String, R::Handle>>,
    events: Mutex<Option<mpsc::Sender<RelayEvent>>>,
}

impl<R> RadioLink<R>
where
    R: RadioProvider + Sync + 'static,
{
    pub fn new(provider: Arc<R>, connect_timeout: Duration) -> Self {
        Self {
            provider,
            connect_timeout,
            scanning: Mutex::new(false),
            handles: Mutex::new(HashMap::new()),
            events: Mutex::new(None),
        }
    }

    pub async fn check_permission(&self) -> PermissionStatus {
        self.provider.check_permission().await
    }

    pub async fn request_permission(&self) -> PermissionStatus {
        self.provider.request_permission().await
    }

    /// Start scanning; a second call while a scan is running is a no-op.
    /// Named peers surface as [`RelayEvent::PeerDiscovered`]; unnamed
    /// broadcast frames are discarded since they cannot be meaningfully
    /// displayed or logged.
    pub async fn start_scan(&self, events: mpsc::Sender<RelayEvent>) -> Result<()> {
        if *lock(&self.scanning) {
            debug!("scan already running, ignoring start request");
            return Ok(());
        }

        let (obs_tx, mut obs_rx) = mpsc::channel(OBSERVATION_CHANNEL_CAPACITY);
        self.provider.start_scan(obs_tx).await?;
        *lock(&self.scanning) = true;
        *lock(&self.events) = Some(events.clone());

        tokio::spawn(async move {
            while let Some(ad) = obs_rx.recv().await {
                match ad.name {
                    Some(name) if !name.is_empty() => {
                        let discovered = RelayEvent::PeerDiscovered {
                            peer_id: ad.peer_id,
                            name,
                        };
                        if events.send(discovered).await.is_err() {
                            break;
                        }
                    }
                    _ => trace!("discarding unnamed advertisement from {}", ad.peer_id),
                }
            }
        });
        Ok(())
    }

    /// Always safe to call
    pub async fn stop_scan(&self) {
        let was_scanning = std::mem::take(&mut *lock(&self.scanning));
        if was_scanning {
            self.provider.stop_scan().await;
        }
        *lock(&self.events) = None;
    }

    pub fn is_scanning(&self) -> bool {
        *lock(&self.scanning)
    }

    /// Attempt connection and full capability discovery. Returns whether the
    /// peer is now connected; failures are logged, never raised, so a single
    /// unreachable peer cannot abort the discovery of others.
    pub async fn connect(&self, peer_id: &str) -> bool {
        let (disc_tx, mut disc_rx) = mpsc::channel(1);
        let attempt = timeout(self.connect_timeout, self.provider.connect(peer_id, disc_tx)).await;
        let handle = match attempt {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                warn!("connect to {} failed: {}", peer_id, e);
                return false;
            }
            Err(_) => {
                warn!(
                    "connect to {} timed out after {:?}",
                    peer_id, self.connect_timeout
                );
                return false;
            }
        };
        lock(&self.handles).insert(peer_id.to_string(), handle);

        // Surface a later radio-initiated drop through the event channel.
        // The provider fires at most once, and only between a successful
        // connect and an explicit disconnect.
        if let Some(events) = lock(&self.events).clone() {
            tokio::spawn(async move {
                if let Some(peer_id) = disc_rx.recv().await {
                    let _ = events
                        .send(RelayEvent::PeerDisconnected { peer_id })
                        .await;
                }
            });
        }
        true
    }

    /// Idempotent; safe even if the peer was never connected
    pub async fn disconnect(&self, peer_id: &str) {
        lock(&self.handles).remove(peer_id);
        self.provider.disconnect(peer_id).await;
    }

    /// Drop the retained handle for a peer the radio already disconnected
    pub fn forget(&self, peer_id: &str) {
        lock(&self.handles).remove(peer_id);
    }

    /// Disconnect every peer that still has a retained handle. Teardown
    /// sweep for connects that completed after the event pump stopped and
    /// so never reached the registry.
    pub async fn disconnect_all(&self) {
        let peer_ids: Vec<String> = lock(&self.handles).keys().cloned().collect();
        for peer_id in peer_ids {
            self.disconnect(&peer_id).await;
        }
    }

    /// One write against the relay characteristic; false when the peer has
    /// no handle or the write fails
    pub async fn send(&self, peer_id: &str, payload: &[u8]) -> bool {
        let handle = lock(&self.handles).get(peer_id).cloned();
        match handle {
            Some(handle) => {
                self.provider
                    .write(
                        &handle,
                        RELAY_SERVICE_UUID,
                        RELAY_TX_CHARACTERISTIC_UUID,
                        payload,
                    )
                    .await
            }
            None => {
                debug!("no handle for {}, dropping write", peer_id);
                false
            }
        }
    }

    pub fn connected_handle_count(&self) -> usize {
        lock(&self.handles).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mayday_radio::{SimulatedPeer, SimulatedRadio};

    fn make_link(radio: SimulatedRadio) -> (Arc<SimulatedRadio>, RadioLink<SimulatedRadio>) {
        let provider = Arc::new(radio);
        (
            Arc::clone(&provider),
            RadioLink::new(provider, Duration::from_secs(1)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_scan_is_single_subscription() {
        let (provider, link) = make_link(SimulatedRadio::new(vec![]));
        let (tx, _rx) = mpsc::channel(8);

        link.start_scan(tx.clone()).await.unwrap();
        link.start_scan(tx).await.unwrap();

        assert!(link.is_scanning());
        assert_eq!(provider.scan_start_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unnamed_peers_are_discarded() {
        let (_provider, link) = make_link(SimulatedRadio::new(vec![
            SimulatedPeer::unnamed("AA"),
            SimulatedPeer::named("BB", "RELAY-B"),
        ]));
        let (tx, mut rx) = mpsc::channel(8);

        link.start_scan(tx).await.unwrap();

        // Only the named peer comes through
        match rx.recv().await.unwrap() {
            RelayEvent::PeerDiscovered { peer_id, name } => {
                assert_eq!(peer_id, "BB");
                assert_eq!(name, "RELAY-B");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_start_failure_propagates() {
        let (provider, link) = make_link(SimulatedRadio::new(vec![]).failing_scan_start());
        let (tx, _rx) = mpsc::channel(8);

        let result = link.start_scan(tx).await;
        assert!(matches!(result, Err(Error::ScanStart { .. })));
        assert!(!link.is_scanning());
        assert_eq!(provider.scan_start_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_scan_when_not_scanning_is_safe() {
        let (provider, link) = make_link(SimulatedRadio::new(vec![]));
        link.stop_scan().await;
        assert_eq!(provider.scan_stop_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retains_handle() {
        let (_provider, link) = make_link(SimulatedRadio::new(vec![SimulatedPeer::named(
            "AA", "RELAY-A",
        )]));

        assert!(link.connect("AA").await);
        assert_eq!(link.connected_handle_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_is_absorbed() {
        let (_provider, link) = make_link(SimulatedRadio::new(vec![
            SimulatedPeer::named("AA", "RELAY-A").refusing_connection(),
        ]));

        assert!(!link.connect("AA").await);
        assert_eq!(link.connected_handle_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_is_absorbed() {
        let provider = Arc::new(SimulatedRadio::new(vec![
            SimulatedPeer::named("AA", "RELAY-A").with_connect_delay(Duration::from_secs(30)),
        ]));
        let link = RadioLink::new(Arc::clone(&provider), Duration::from_millis(100));

        assert!(!link.connect("AA").await);
        assert_eq!(link.connected_handle_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_radio_drop_surfaces_as_event() {
        let (_provider, link) = make_link(SimulatedRadio::new(vec![
            SimulatedPeer::named("AA", "RELAY-A").dropping_after(Duration::from_millis(50)),
        ]));
        let (tx, mut rx) = mpsc::channel(8);

        link.start_scan(tx).await.unwrap();
        // First event is the discovery itself
        assert!(matches!(
            rx.recv().await.unwrap(),
            RelayEvent::PeerDiscovered { .. }
        ));

        assert!(link.connect("AA").await);

        match rx.recv().await.unwrap() {
            RelayEvent::PeerDisconnected { peer_id } => assert_eq!(peer_id, "AA"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_without_handle_is_false() {
        let (provider, link) = make_link(SimulatedRadio::new(vec![SimulatedPeer::named(
            "AA", "RELAY-A",
        )]));

        assert!(!link.send("AA", b"payload").await);
        assert_eq!(provider.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_idempotent() {
        let (provider, link) = make_link(SimulatedRadio::new(vec![SimulatedPeer::named(
            "AA", "RELAY-A",
        )]));

        link.connect("AA").await;
        link.disconnect("AA").await;
        link.disconnect("AA").await;

        assert_eq!(link.connected_handle_count(), 0);
        assert_eq!(provider.disconnect_count(), 2);
    }
}
