//! Simulated radio and positioning providers
//!
//! Deterministic in-memory doubles backing the demo runner and the test
//! suite. Each simulated peer carries a small behavior script (connect
//! refusal, send latency, mid-session drop) so the relay core can be
//! exercised against churn without real hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use mayday_core::error::{Error, Result};
use mayday_core::prelude::*;
use mayday_core::types::LocationFix;

use crate::provider::{Advertisement, PermissionStatus, PositioningProvider, RadioProvider};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─────────────────────────────────────────────────────────────────
// Simulated Radio
// ─────────────────────────────────────────────────────────────────

/// Scripted behavior for one simulated relay peer
#[derive(Debug, Clone)]
pub struct SimulatedPeer {
    pub peer_id: String,

    /// `None` simulates an unnamed broadcast frame
    pub name: Option<String>,

    pub connect_succeeds: bool,
    pub connect_delay: Duration,
    pub send_succeeds: bool,
    pub send_delay: Duration,

    /// Radio-initiated disconnect this long after a successful connect
    pub drop_after: Option<Duration>,
}

impl SimulatedPeer {
    /// A well-behaved named peer: instant connect, successful sends
    pub fn named(peer_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            name: Some(name.into()),
            connect_succeeds: true,
            connect_delay: Duration::ZERO,
            send_succeeds: true,
            send_delay: Duration::ZERO,
            drop_after: None,
        }
    }

    /// An unnamed broadcast frame; the relay layer must discard it
    pub fn unnamed(peer_id: impl Into<String>) -> Self {
        Self {
            name: None,
            ..Self::named(peer_id, "")
        }
    }

    pub fn refusing_connection(mut self) -> Self {
        self.connect_succeeds = false;
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn failing_sends(mut self) -> Self {
        self.send_succeeds = false;
        self
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn dropping_after(mut self, delay: Duration) -> Self {
        self.drop_after = Some(delay);
        self
    }
}

/// I/O handle for a simulated peer
#[derive(Debug, Clone)]
pub struct SimulatedHandle {
    pub peer_id: String,
}

/// One completed write attempt
#[derive(Debug, Clone)]
pub struct SendRecord {
    pub peer_id: String,
    pub payload: Vec<u8>,
    pub ok: bool,
    pub completed_at: Instant,
}

/// One explicit disconnect call
#[derive(Debug, Clone)]
pub struct DisconnectRecord {
    pub peer_id: String,
    pub at: Instant,
}

struct ConnectedPeer {
    drop_task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct RadioInner {
    scan_task: Option<JoinHandle<()>>,
    connected: HashMap<String, ConnectedPeer>,
    send_log: Vec<SendRecord>,
    disconnect_log: Vec<DisconnectRecord>,
}

/// In-memory radio manager advertising a scripted set of peers
pub struct SimulatedRadio {
    peers: Vec<SimulatedPeer>,
    permission: Mutex<PermissionStatus>,
    grant_on_request: bool,
    fail_scan_start: bool,
    discovery_interval: Duration,
    inner: Arc<Mutex<RadioInner>>,
    scan_starts: AtomicUsize,
    scan_stops: AtomicUsize,
    disconnect_calls: AtomicUsize,
}

impl SimulatedRadio {
    pub fn new(peers: Vec<SimulatedPeer>) -> Self {
        Self {
            peers,
            permission: Mutex::new(PermissionStatus::Granted),
            grant_on_request: false,
            fail_scan_start: false,
            discovery_interval: Duration::ZERO,
            inner: Arc::new(Mutex::new(RadioInner::default())),
            scan_starts: AtomicUsize::new(0),
            scan_stops: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_permission(self, status: PermissionStatus) -> Self {
        *lock(&self.permission) = status;
        self
    }

    /// Grant radio permission when requested from the Unknown state
    pub fn granting_on_request(mut self) -> Self {
        self.grant_on_request = true;
        self
    }

    pub fn failing_scan_start(mut self) -> Self {
        self.fail_scan_start = true;
        self
    }

    /// Gap between advertising successive scripted peers
    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    fn script(&self, peer_id: &str) -> Option<SimulatedPeer> {
        self.peers.iter().find(|p| p.peer_id == peer_id).cloned()
    }

    // ─────────────────────────────────────────────────────────
    // Introspection for tests and the demo runner
    // ─────────────────────────────────────────────────────────

    pub fn scan_start_count(&self) -> usize {
        self.scan_starts.load(Ordering::SeqCst)
    }

    pub fn scan_stop_count(&self) -> usize {
        self.scan_stops.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        lock(&self.inner).send_log.len()
    }

    pub fn send_log(&self) -> Vec<SendRecord> {
        lock(&self.inner).send_log.clone()
    }

    pub fn disconnect_log(&self) -> Vec<DisconnectRecord> {
        lock(&self.inner).disconnect_log.clone()
    }

    /// Payloads successfully written to a given peer
    pub fn frames_to(&self, peer_id: &str) -> Vec<Vec<u8>> {
        lock(&self.inner)
            .send_log
            .iter()
            .filter(|r| r.peer_id == peer_id && r.ok)
            .map(|r| r.payload.clone())
            .collect()
    }

    pub fn connected_peer_count(&self) -> usize {
        lock(&self.inner).connected.len()
    }
}

impl RadioProvider for SimulatedRadio {
    type Handle = SimulatedHandle;

    async fn check_permission(&self) -> PermissionStatus {
        *lock(&self.permission)
    }

    async fn request_permission(&self) -> PermissionStatus {
        let mut permission = lock(&self.permission);
        if *permission == PermissionStatus::Unknown && self.grant_on_request {
            *permission = PermissionStatus::Granted;
        }
        *permission
    }

    async fn start_scan(&self, observations: mpsc::Sender<Advertisement>) -> Result<()> {
        self.scan_starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_scan_start {
            return Err(Error::scan_start("simulated adapter failure"));
        }

        let ads: Vec<Advertisement> = self
            .peers
            .iter()
            .map(|p| Advertisement {
                peer_id: p.peer_id.clone(),
                name: p.name.clone(),
            })
            .collect();
        let interval = self.discovery_interval;
        debug!("simulated radio advertising {} peers", ads.len());

        let task = tokio::spawn(async move {
            for ad in ads {
                if observations.send(ad).await.is_err() {
                    break;
                }
                if interval > Duration::ZERO {
                    tokio::time::sleep(interval).await;
                }
            }
        });
        lock(&self.inner).scan_task = Some(task);
        Ok(())
    }

    async fn stop_scan(&self) {
        self.scan_stops.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = lock(&self.inner).scan_task.take() {
            task.abort();
        }
    }

    async fn connect(
        &self,
        peer_id: &str,
        disconnects: mpsc::Sender<String>,
    ) -> Result<SimulatedHandle> {
        let script = self
            .script(peer_id)
            .ok_or_else(|| Error::connect(peer_id, "unknown peer"))?;

        if script.connect_delay > Duration::ZERO {
            tokio::time::sleep(script.connect_delay).await;
        }
        if !script.connect_succeeds {
            return Err(Error::connect(peer_id, "simulated connection refusal"));
        }

        let mut entry = ConnectedPeer { drop_task: None };
        if let Some(after) = script.drop_after {
            let inner = Arc::clone(&self.inner);
            let pid = peer_id.to_string();
            entry.drop_task = Some(tokio::spawn(async move {
                tokio::time::sleep(after).await;
                // Suppressed when an explicit disconnect already removed us
                let still_connected = lock(&inner).connected.remove(&pid).is_some();
                if still_connected {
                    debug!("simulated radio dropping peer {}", pid);
                    let _ = disconnects.send(pid).await;
                }
            }));
        }
        lock(&self.inner)
            .connected
            .insert(peer_id.to_string(), entry);

        Ok(SimulatedHandle {
            peer_id: peer_id.to_string(),
        })
    }

    async fn disconnect(&self, peer_id: &str) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = lock(&self.inner);
        if let Some(peer) = inner.connected.remove(peer_id) {
            if let Some(task) = peer.drop_task {
                task.abort();
            }
        }
        inner.disconnect_log.push(DisconnectRecord {
            peer_id: peer_id.to_string(),
            at: Instant::now(),
        });
    }

    async fn write(
        &self,
        handle: &SimulatedHandle,
        _service_id: &str,
        _characteristic_id: &str,
        payload: &[u8],
    ) -> bool {
        let Some(script) = self.script(&handle.peer_id) else {
            return false;
        };
        if script.send_delay > Duration::ZERO {
            tokio::time::sleep(script.send_delay).await;
        }
        let still_connected = lock(&self.inner).connected.contains_key(&handle.peer_id);
        let ok = script.send_succeeds && still_connected;
        lock(&self.inner).send_log.push(SendRecord {
            peer_id: handle.peer_id.clone(),
            payload: payload.to_vec(),
            ok,
            completed_at: Instant::now(),
        });
        ok
    }
}

// ─────────────────────────────────────────────────────────────────
// Simulated Positioning
// ─────────────────────────────────────────────────────────────────

/// In-memory positioning provider emitting a scripted sequence of fixes
pub struct SimulatedPositioning {
    fixes: Vec<LocationFix>,
    interval: Duration,
    initial_delay: Duration,
    granted: AtomicBool,
    grant_on_request: bool,
    fail_start: bool,
    task: Mutex<Option<JoinHandle<()>>>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl SimulatedPositioning {
    pub fn new(fixes: Vec<LocationFix>) -> Self {
        Self {
            fixes,
            interval: Duration::from_secs(1),
            initial_delay: Duration::ZERO,
            granted: AtomicBool::new(true),
            grant_on_request: false,
            fail_start: false,
            task: Mutex::new(None),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    /// Gap between successive fixes
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Wait this long after tracking starts before the first fix
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn without_permission(self) -> Self {
        self.granted.store(false, Ordering::SeqCst);
        self
    }

    /// Grant positioning permission when requested
    pub fn granting_on_request(mut self) -> Self {
        self.grant_on_request = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn start_call_count(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_call_count(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl PositioningProvider for SimulatedPositioning {
    async fn check_permission(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    async fn request_permission(&self) -> bool {
        if self.grant_on_request {
            self.granted.store(true, Ordering::SeqCst);
        }
        self.granted.load(Ordering::SeqCst)
    }

    async fn start_updates(&self, fixes: mpsc::Sender<LocationFix>) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(Error::tracking_start("simulated provider failure"));
        }

        let script = self.fixes.clone();
        let interval = self.interval;
        let initial_delay = self.initial_delay;
        let task = tokio::spawn(async move {
            if initial_delay > Duration::ZERO {
                tokio::time::sleep(initial_delay).await;
            }
            for fix in script {
                if fixes.send(fix).await.is_err() {
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        });
        *lock(&self.task) = Some(task);
        Ok(())
    }

    async fn stop_updates(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test(start_paused = true)]
    async fn test_scan_advertises_all_scripted_peers() {
        let radio = SimulatedRadio::new(vec![
            SimulatedPeer::named("AA", "RELAY-A"),
            SimulatedPeer::unnamed("BB"),
        ]);
        let (tx, mut rx) = mpsc::channel(8);

        assert_ok!(radio.start_scan(tx).await);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.peer_id, "AA");
        assert_eq!(first.name.as_deref(), Some("RELAY-A"));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.peer_id, "BB");
        assert!(second.name.is_none());

        assert_eq!(radio.scan_start_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_start_failure() {
        let radio = SimulatedRadio::new(vec![]).failing_scan_start();
        let (tx, _rx) = mpsc::channel(8);

        let result = radio.start_scan(tx).await;
        assert!(matches!(result, Err(Error::ScanStart { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_refusal() {
        let radio =
            SimulatedRadio::new(vec![SimulatedPeer::named("AA", "RELAY-A").refusing_connection()]);
        let (tx, _rx) = mpsc::channel(1);

        let result = radio.connect("AA", tx).await;
        assert!(matches!(result, Err(Error::Connect { .. })));
        assert_eq!(radio.connected_peer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_respects_send_script() {
        let radio = SimulatedRadio::new(vec![
            SimulatedPeer::named("AA", "RELAY-A"),
            SimulatedPeer::named("BB", "RELAY-B").failing_sends(),
        ]);
        let (tx, _rx) = mpsc::channel(1);

        let good = radio.connect("AA", tx.clone()).await.unwrap();
        let bad = radio.connect("BB", tx).await.unwrap();

        assert!(radio.write(&good, "svc", "chr", b"payload").await);
        assert!(!radio.write(&bad, "svc", "chr", b"payload").await);
        assert_eq!(radio.write_count(), 2);
        assert_eq!(radio.frames_to("AA").len(), 1);
        assert!(radio.frames_to("BB").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_radio_initiated_drop_fires_once() {
        let radio = SimulatedRadio::new(vec![
            SimulatedPeer::named("AA", "RELAY-A").dropping_after(Duration::from_millis(100)),
        ]);
        let (tx, mut rx) = mpsc::channel(1);

        let _handle = radio.connect("AA", tx).await.unwrap();
        let dropped = rx.recv().await.unwrap();
        assert_eq!(dropped, "AA");
        assert_eq!(radio.connected_peer_count(), 0);

        // Channel closes without a second notification
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_disconnect_suppresses_drop() {
        let radio = SimulatedRadio::new(vec![
            SimulatedPeer::named("AA", "RELAY-A").dropping_after(Duration::from_millis(100)),
        ]);
        let (tx, mut rx) = mpsc::channel(1);

        let _handle = radio.connect("AA", tx).await.unwrap();
        radio.disconnect("AA").await;

        assert!(rx.recv().await.is_none());
        assert_eq!(radio.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_request_grants_from_unknown() {
        let radio = SimulatedRadio::new(vec![])
            .with_permission(PermissionStatus::Unknown)
            .granting_on_request();

        assert_eq!(radio.check_permission().await, PermissionStatus::Unknown);
        assert_eq!(radio.request_permission().await, PermissionStatus::Granted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_positioning_emits_scripted_fixes() {
        let positioning = SimulatedPositioning::new(vec![
            LocationFix::new(1.0, 2.0),
            LocationFix::new(3.0, 4.0),
        ])
        .with_interval(Duration::from_millis(10));
        let (tx, mut rx) = mpsc::channel(8);

        positioning.start_updates(tx).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.latitude, 1.0);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.longitude, 4.0);
        assert_eq!(positioning.start_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_positioning_failing_start() {
        let positioning = SimulatedPositioning::new(vec![]).failing_start();
        let (tx, _rx) = mpsc::channel(1);

        let result = positioning.start_updates(tx).await;
        assert!(matches!(result, Err(Error::TrackingStart { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_positioning_permission_denied() {
        let positioning = SimulatedPositioning::new(vec![]).without_permission();
        assert!(!positioning.check_permission().await);
        assert!(!positioning.request_permission().await);
    }
}
