//! Session controller: the activate/cancel state machine
//!
//! Owns the composition of fix source, radio link, registry, and delivery
//! coordinator, plus the event pump that is the single consumer of
//! [`RelayEvent`]s. Activation starts scan and tracking concurrently;
//! cancellation flips state first, stops the producers, drains in-flight
//! deliveries with a bounded wait, and only then disconnects peers.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mayday_core::config::RelayConfig;
use mayday_core::prelude::*;
use mayday_core::types::{AlertId, LocationFix, SessionState};
use mayday_core::RelayEvent;
use mayday_radio::{PermissionStatus, PositioningProvider, RadioProvider};

use crate::delivery::DeliveryCoordinator;
use crate::fix_source::FixSource;
use crate::lock;
use crate::radio_link::RadioLink;
use crate::registry::RelayRegistry;
use crate::session::AlertSession;

/// Pluggable alert-token generator; injected so tests can pin tokens
pub type AlertIdGenerator = Arc<dyn Fn() -> AlertId + Send + Sync>;

/// Outcome of an activation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Scan and tracking both started; fixes are being relayed
    Activated,

    /// Positioning or radio permission refused; the session stays idle.
    /// A normal, reportable outcome, not an error.
    PermissionDenied,

    /// A session already exists; the request was ignored
    AlreadyRunning,
}

pub struct SessionController<R: RadioProvider, P: PositioningProvider> {
    session: Arc<AlertSession>,
    radio: Arc<RadioLink<R>>,
    fixes: Arc<FixSource<P>>,
    registry: Arc<Mutex<RelayRegistry>>,
    coordinator: Arc<DeliveryCoordinator>,
    config: RelayConfig,
    current_fix: Arc<Mutex<Option<LocationFix>>>,
    pump_task: Mutex<Option<JoinHandle<()>>>,
    connect_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    id_generator: AlertIdGenerator,
}

impl<R, P> SessionController<R, P>
where
    R: RadioProvider + Sync + 'static,
    P: PositioningProvider + Sync + 'static,
{
    /// Compose the relay core over injected providers. Callers keep their
    /// own `Arc` clones when they need to observe the providers directly.
    pub fn new(radio_provider: Arc<R>, positioning_provider: Arc<P>, config: RelayConfig) -> Self {
        let radio = Arc::new(RadioLink::new(radio_provider, config.connect_timeout()));
        let fixes = Arc::new(FixSource::new(positioning_provider));
        let coordinator = Arc::new(DeliveryCoordinator::new(config.drain_poll_interval()));
        Self {
            session: Arc::new(AlertSession::new()),
            radio,
            fixes,
            registry: Arc::new(Mutex::new(RelayRegistry::new())),
            coordinator,
            config,
            current_fix: Arc::new(Mutex::new(None)),
            pump_task: Mutex::new(None),
            connect_tasks: Arc::new(Mutex::new(Vec::new())),
            id_generator: Arc::new(AlertId::generate),
        }
    }

    pub fn with_id_generator(mut self, generator: AlertIdGenerator) -> Self {
        self.id_generator = generator;
        self
    }

    // ─────────────────────────────────────────────────────────
    // Observable surface for the presentation layer
    // ─────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    pub fn session_id(&self) -> Option<AlertId> {
        self.session.id()
    }

    pub fn connected_count(&self) -> usize {
        lock(&self.registry).connected_count()
    }

    pub fn discovered_count(&self) -> usize {
        lock(&self.registry).discovered_count()
    }

    pub fn is_connected(&self) -> bool {
        self.connected_count() > 0
    }

    pub fn current_fix(&self) -> Option<LocationFix> {
        *lock(&self.current_fix)
    }

    pub fn in_flight_count(&self) -> usize {
        self.coordinator.in_flight_count()
    }

    // ─────────────────────────────────────────────────────────
    // Activation
    // ─────────────────────────────────────────────────────────

    /// Start an alert session: resolve permissions, start scan and
    /// tracking, and flip to Active once both are up.
    ///
    /// A no-op while a session already exists. Permission denial is an
    /// ordinary outcome; only scan/tracking start-up failures surface as
    /// errors, and either one reverts the session to idle.
    pub async fn activate(&self) -> Result<ActivationOutcome> {
        let id = (self.id_generator)();
        if !self.session.begin_activation(id.clone()) {
            warn!("activation ignored: session is not idle");
            return Ok(ActivationOutcome::AlreadyRunning);
        }
        info!("alert session {} activating", id);

        if !self.resolve_positioning_permission().await {
            warn!("positioning permission denied, session stays idle");
            self.session.reset();
            return Ok(ActivationOutcome::PermissionDenied);
        }
        if !self.resolve_radio_permission().await {
            warn!("radio permission denied, session stays idle");
            self.session.reset();
            return Ok(ActivationOutcome::PermissionDenied);
        }

        self.coordinator.reset_sequence();
        let (events_tx, events_rx) = mpsc::channel(self.config.event_channel_capacity.max(1));
        self.spawn_pump(events_tx.clone(), events_rx);

        // Both start-ups are attempted even if one fails, so each failure
        // is observed and logged independently; either one alone reverts
        // the session to idle.
        let scan_error = self.radio.start_scan(events_tx.clone()).await.err();
        if let Some(e) = &scan_error {
            error!("scan start failed: {}", e);
        }
        let tracking_error = self.fixes.start_tracking(events_tx).await.err();
        if let Some(e) = &tracking_error {
            error!("tracking start failed: {}", e);
        }

        if scan_error.is_some() || tracking_error.is_some() {
            self.fixes.stop_tracking().await;
            self.radio.stop_scan().await;
            self.abort_pump();
            self.abort_connect_attempts();
            self.radio.disconnect_all().await;
            self.session.reset();
            return Err(scan_error
                .or(tracking_error)
                .unwrap_or_else(|| Error::activation("start-up failed")));
        }

        if !self.session.mark_active() {
            warn!("session state changed during activation");
        }
        info!("alert session active");
        Ok(ActivationOutcome::Activated)
    }

    // ─────────────────────────────────────────────────────────
    // Cancellation
    // ─────────────────────────────────────────────────────────

    /// Tear the session down; returns false when there was nothing to
    /// cancel.
    ///
    /// Cancellation is cooperative: in-flight deliveries complete (or fail)
    /// naturally within a bounded wait, and no peer is disconnected before
    /// that wait resolves.
    pub async fn cancel(&self) -> bool {
        // Flip state and clear the token before the first await so a fix
        // arriving concurrently observes a non-active session and is
        // dropped instead of dispatched.
        if !self.session.begin_cancel() {
            debug!("cancel ignored: no active session");
            return false;
        }
        info!("alert session cancelling");

        self.fixes.stop_tracking().await;
        self.radio.stop_scan().await;

        let peers = {
            let mut registry = lock(&self.registry);
            let snapshot = registry.connected_snapshot();
            registry.clear_connected();
            snapshot
        };

        if !self
            .coordinator
            .await_drain(self.config.drain_timeout())
            .await
        {
            warn!(
                "in-flight deliveries did not drain within {:?}, disconnecting anyway",
                self.config.drain_timeout()
            );
        }

        // Each peer is disconnected independently; the link absorbs
        // per-peer failures so one stuck peer cannot block the rest.
        for peer_id in &peers {
            self.radio.disconnect(peer_id).await;
        }
        if !peers.is_empty() {
            info!("disconnected {} relay peers", peers.len());
        }

        self.abort_pump();
        self.abort_connect_attempts();
        // A connect that completed after the pump stopped never reached
        // the registry or the teardown snapshot; sweep its link so nothing
        // stays open.
        self.radio.disconnect_all().await;
        lock(&self.registry).clear();
        self.session.reset();
        info!("alert session idle");
        true
    }

    // ─────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────

    async fn resolve_positioning_permission(&self) -> bool {
        if self.fixes.check_permission().await {
            return true;
        }
        self.fixes.request_permission().await
    }

    async fn resolve_radio_permission(&self) -> bool {
        match self.radio.check_permission().await {
            PermissionStatus::Granted => true,
            PermissionStatus::Denied => false,
            PermissionStatus::Unknown => self.radio.request_permission().await.is_granted(),
        }
    }

    /// Spawn the single consumer of the relay event channel
    fn spawn_pump(
        &self,
        events_tx: mpsc::Sender<RelayEvent>,
        mut events_rx: mpsc::Receiver<RelayEvent>,
    ) {
        let session = Arc::clone(&self.session);
        let registry = Arc::clone(&self.registry);
        let radio = Arc::clone(&self.radio);
        let coordinator = Arc::clone(&self.coordinator);
        let current_fix = Arc::clone(&self.current_fix);
        let connect_tasks = Arc::clone(&self.connect_tasks);

        let task = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                trace!("{}", event.summary());
                match event {
                    RelayEvent::PeerDiscovered { peer_id, name } => {
                        if !session.is_running() {
                            continue;
                        }
                        let fresh = {
                            let mut registry = lock(&registry);
                            if registry.record_discovered(&peer_id, &name) {
                                registry.mark_connecting(&peer_id);
                                true
                            } else {
                                false
                            }
                        };
                        if !fresh {
                            continue;
                        }
                        info!("relay peer discovered: {} ({})", name, peer_id);

                        // Connect fan-out must not block the pump; two peers
                        // discovered back to back connect independently and
                        // may complete in either order. Tracked so teardown
                        // can abort attempts still in flight.
                        let radio = Arc::clone(&radio);
                        let events = events_tx.clone();
                        let task = tokio::spawn(async move {
                            let event = if radio.connect(&peer_id).await {
                                RelayEvent::PeerConnected { peer_id }
                            } else {
                                RelayEvent::PeerConnectFailed { peer_id }
                            };
                            let _ = events.send(event).await;
                        });
                        let mut tasks = lock(&connect_tasks);
                        tasks.retain(|t| !t.is_finished());
                        tasks.push(task);
                    }
                    RelayEvent::PeerConnected { peer_id } => {
                        if !session.is_running() {
                            // Raced a cancellation: the teardown snapshot
                            // never saw this peer, so drop the link now.
                            radio.disconnect(&peer_id).await;
                            lock(&registry).remove(&peer_id);
                            continue;
                        }
                        lock(&registry).mark_connected(&peer_id);
                        info!("relay peer connected: {}", peer_id);
                    }
                    RelayEvent::PeerConnectFailed { peer_id } => {
                        lock(&registry).remove(&peer_id);
                    }
                    RelayEvent::PeerDisconnected { peer_id } => {
                        info!("relay peer disconnected: {}", peer_id);
                        radio.forget(&peer_id);
                        lock(&registry).mark_disconnected(&peer_id);
                    }
                    RelayEvent::FixAcquired(fix) => {
                        *lock(&current_fix) = Some(fix);
                        if !session.is_active() {
                            debug!("fix dropped: session not active");
                            continue;
                        }
                        let snapshot = lock(&registry).connected_snapshot();
                        if snapshot.is_empty() {
                            // No buffering: a fix with nobody to relay it
                            // is dropped, not queued.
                            debug!("fix dropped: no connected relay peers");
                            continue;
                        }
                        let coordinator = Arc::clone(&coordinator);
                        let session = Arc::clone(&session);
                        let radio = Arc::clone(&radio);
                        tokio::spawn(async move {
                            let report =
                                coordinator.dispatch(&fix, &snapshot, &session, &radio).await;
                            debug!("fix fan-out: {} sent, {} failed", report.sent, report.failed);
                        });
                    }
                }
            }
        });
        *lock(&self.pump_task) = Some(task);
    }

    fn abort_pump(&self) {
        if let Some(task) = lock(&self.pump_task).take() {
            task.abort();
        }
    }

    fn abort_connect_attempts(&self) {
        for task in lock(&self.connect_tasks).drain(..) {
            task.abort();
        }
    }
}

impl<R: RadioProvider, P: PositioningProvider> Drop for SessionController<R, P> {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.pump_task).take() {
            task.abort();
        }
        for task in lock(&self.connect_tasks).drain(..) {
            task.abort();
        }
    }
}
