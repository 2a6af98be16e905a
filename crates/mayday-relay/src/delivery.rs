//! Fan-out delivery of fixes to connected relay peers
//!
//! Every fan-out iterates a registry snapshot sequentially with
//! per-iteration fault isolation: one peer's failed write never prevents
//! attempts to the rest. The outstanding-attempt count is the quantity the
//! teardown sequence drains before any peer may be disconnected.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use mayday_core::prelude::*;
use mayday_core::types::LocationFix;
use mayday_radio::{FixFrame, RadioProvider};

use crate::radio_link::RadioLink;
use crate::session::AlertSession;

/// Tally of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Peers a send was attempted against
    pub attempted: usize,

    pub sent: usize,

    pub failed: usize,

    /// Peers skipped because the session left Active mid-fan-out
    pub skipped: usize,
}

/// RAII guard for one outstanding delivery attempt; the count is released
/// on every exit path, success or failure
struct AttemptGuard(Arc<AtomicUsize>);

impl AttemptGuard {
    fn begin(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Delivers each fix to every peer in a connected-snapshot, tracking the
/// number of deliveries in flight
pub struct DeliveryCoordinator {
    in_flight: Arc<AtomicUsize>,
    seq: AtomicU64,
    poll_interval: Duration,
}

impl DeliveryCoordinator {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            seq: AtomicU64::new(0),
            poll_interval,
        }
    }

    /// Exact current count of outstanding delivery attempts
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Restart the frame sequence for a new activation
    pub fn reset_sequence(&self) {
        self.seq.store(0, Ordering::SeqCst);
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Fan one fix out to every peer in the snapshot
    ///
    /// The session is re-checked before each peer since cancellation can
    /// land mid-fan-out. A dispatch-to-peer attempt is terminal in one hop:
    /// sent or failed, no retry.
    pub async fn dispatch<R>(
        &self,
        fix: &LocationFix,
        snapshot: &[String],
        session: &AlertSession,
        radio: &RadioLink<R>,
    ) -> DispatchReport
    where
        R: RadioProvider + Sync + 'static,
    {
        let Some(alert_id) = session.id() else {
            debug!("dispatch skipped: session id already cleared");
            return DispatchReport::default();
        };

        let frame = FixFrame::new(&alert_id, self.next_seq(), fix);
        let payload = match frame.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!("failed to encode fix frame: {}", e);
                return DispatchReport::default();
            }
        };

        let mut report = DispatchReport::default();
        for peer_id in snapshot {
            if !session.is_active() {
                report.skipped += 1;
                continue;
            }
            report.attempted += 1;
            let _attempt = AttemptGuard::begin(&self.in_flight);
            if radio.send(peer_id, &payload).await {
                report.sent += 1;
                trace!("fix {} delivered to {}", frame.seq, peer_id);
            } else {
                report.failed += 1;
                warn!("fix {} delivery to {} failed", frame.seq, peer_id);
            }
        }
        report
    }

    /// Wait for the in-flight count to reach zero, polling at the
    /// configured interval. Returns whether it drained within `max_wait`.
    pub async fn await_drain(&self, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        loop {
            if self.in_flight_count() == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let wait = self.poll_interval.min(deadline - now);
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mayday_core::types::AlertId;
    use mayday_radio::{SimulatedPeer, SimulatedRadio};

    const POLL: Duration = Duration::from_millis(10);

    fn active_session(token: &str) -> Arc<AlertSession> {
        let session = Arc::new(AlertSession::new());
        session.begin_activation(AlertId::from_token(token));
        session.mark_active();
        session
    }

    async fn connected_link(radio: SimulatedRadio, peers: &[&str]) -> Arc<RadioLink<SimulatedRadio>> {
        let link = Arc::new(RadioLink::new(Arc::new(radio), Duration::from_secs(1)));
        for peer_id in peers {
            assert!(link.connect(peer_id).await);
        }
        link
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_reaches_every_peer() {
        let radio = SimulatedRadio::new(vec![
            SimulatedPeer::named("A", "RELAY-A"),
            SimulatedPeer::named("B", "RELAY-B"),
        ]);
        let link = connected_link(radio, &["A", "B"]).await;
        let session = active_session("alert-1");
        let coordinator = DeliveryCoordinator::new(POLL);

        let snapshot = vec!["A".to_string(), "B".to_string()];
        let report = coordinator
            .dispatch(&LocationFix::new(20.6736, -103.344), &snapshot, &session, &link)
            .await;

        assert_eq!(report.attempted, 2);
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failing_peer_does_not_abort_fan_out() {
        let radio = SimulatedRadio::new(vec![
            SimulatedPeer::named("A", "RELAY-A"),
            SimulatedPeer::named("B", "RELAY-B").failing_sends(),
            SimulatedPeer::named("C", "RELAY-C"),
        ]);
        let link = connected_link(radio, &["A", "B", "C"]).await;
        let session = active_session("alert-1");
        let coordinator = DeliveryCoordinator::new(POLL);

        let snapshot = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let report = coordinator
            .dispatch(&LocationFix::new(1.0, 2.0), &snapshot, &session, &link)
            .await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_lost_mid_snapshot_does_not_break_iteration() {
        let radio = SimulatedRadio::new(vec![
            SimulatedPeer::named("A", "RELAY-A"),
            SimulatedPeer::named("B", "RELAY-B"),
            SimulatedPeer::named("C", "RELAY-C"),
        ]);
        let link = connected_link(radio, &["A", "B", "C"]).await;
        let session = active_session("alert-1");
        let coordinator = DeliveryCoordinator::new(POLL);

        let snapshot = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        // B disappears between snapshot and fan-out
        link.forget("B");

        let report = coordinator
            .dispatch(&LocationFix::new(1.0, 2.0), &snapshot, &session, &link)
            .await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sends_once_session_is_cancelling() {
        let radio = SimulatedRadio::new(vec![SimulatedPeer::named("A", "RELAY-A")]);
        let link = connected_link(radio, &["A"]).await;
        let session = active_session("alert-1");
        session.begin_cancel();
        let coordinator = DeliveryCoordinator::new(POLL);

        let snapshot = vec!["A".to_string()];
        let report = coordinator
            .dispatch(&LocationFix::new(1.0, 2.0), &snapshot, &session, &link)
            .await;

        assert_eq!(report.attempted, 0);
        assert_eq!(report.sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_mid_fan_out_skips_remaining_peers() {
        let radio = SimulatedRadio::new(vec![
            SimulatedPeer::named("A", "RELAY-A").with_send_delay(Duration::from_millis(100)),
            SimulatedPeer::named("B", "RELAY-B"),
            SimulatedPeer::named("C", "RELAY-C"),
        ]);
        let link = connected_link(radio, &["A", "B", "C"]).await;
        let session = active_session("alert-1");
        let coordinator = Arc::new(DeliveryCoordinator::new(POLL));

        let snapshot = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let dispatch = {
            let coordinator = Arc::clone(&coordinator);
            let session = Arc::clone(&session);
            let link = Arc::clone(&link);
            tokio::spawn(async move {
                coordinator
                    .dispatch(&LocationFix::new(1.0, 2.0), &snapshot, &session, &link)
                    .await
            })
        };

        // Cancel while the slow send to A is still in flight
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(coordinator.in_flight_count(), 1);
        session.begin_cancel();

        let report = dispatch.await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.sent, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_drain_waits_for_slow_sends() {
        let radio = SimulatedRadio::new(vec![
            SimulatedPeer::named("A", "RELAY-A").with_send_delay(Duration::from_millis(200)),
        ]);
        let link = connected_link(radio, &["A"]).await;
        let session = active_session("alert-1");
        let coordinator = Arc::new(DeliveryCoordinator::new(POLL));

        let snapshot = vec!["A".to_string()];
        let dispatch = {
            let coordinator = Arc::clone(&coordinator);
            let session = Arc::clone(&session);
            let link = Arc::clone(&link);
            tokio::spawn(async move {
                coordinator
                    .dispatch(&LocationFix::new(1.0, 2.0), &snapshot, &session, &link)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(coordinator.in_flight_count(), 1);

        assert!(coordinator.await_drain(Duration::from_secs(1)).await);
        assert_eq!(coordinator.in_flight_count(), 0);
        let report = dispatch.await.unwrap();
        assert_eq!(report.sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_drain_times_out() {
        let radio = SimulatedRadio::new(vec![
            SimulatedPeer::named("A", "RELAY-A").with_send_delay(Duration::from_secs(30)),
        ]);
        let link = connected_link(radio, &["A"]).await;
        let session = active_session("alert-1");
        let coordinator = Arc::new(DeliveryCoordinator::new(POLL));

        let snapshot = vec!["A".to_string()];
        let _dispatch = {
            let coordinator = Arc::clone(&coordinator);
            let session = Arc::clone(&session);
            let link = Arc::clone(&link);
            tokio::spawn(async move {
                coordinator
                    .dispatch(&LocationFix::new(1.0, 2.0), &snapshot, &session, &link)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!coordinator.await_drain(Duration::from_millis(100)).await);
        assert_eq!(coordinator.in_flight_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_drain_with_nothing_in_flight() {
        let coordinator = DeliveryCoordinator::new(POLL);
        assert!(coordinator.await_drain(Duration::from_millis(100)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_sequence_increments_and_resets() {
        let radio = SimulatedRadio::new(vec![SimulatedPeer::named("A", "RELAY-A")]);
        let link = connected_link(radio, &["A"]).await;
        let session = active_session("alert-1");
        let coordinator = DeliveryCoordinator::new(POLL);

        let snapshot = vec!["A".to_string()];
        for _ in 0..2 {
            coordinator
                .dispatch(&LocationFix::new(1.0, 2.0), &snapshot, &session, &link)
                .await;
        }
        coordinator.reset_sequence();
        coordinator
            .dispatch(&LocationFix::new(1.0, 2.0), &snapshot, &session, &link)
            .await;

        // Sequence restarted after reset
        assert_eq!(coordinator.next_seq(), 1);
    }
}
