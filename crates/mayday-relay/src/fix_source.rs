//! Fix source: idempotent tracking over the positioning provider

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mayday_core::prelude::*;
use mayday_core::RelayEvent;
use mayday_radio::PositioningProvider;

use crate::lock;

/// Capacity of the internal fix channel; fixes arrive at most about once
/// per second, so a small buffer is plenty
const FIX_CHANNEL_CAPACITY: usize = 32;

/// Wraps the positioning provider and forwards its fixes into the session
/// event channel as [`RelayEvent::FixAcquired`]
pub struct FixSource<P: PositioningProvider> {
    provider: Arc<P>,
    tracking: Mutex<bool>,
    forward_task: Mutex<Option<JoinHandle<()>>>,
}

impl<P> FixSource<P>
where
    P: PositioningProvider + Sync + 'static,
{
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            tracking: Mutex::new(false),
            forward_task: Mutex::new(None),
        }
    }

    pub async fn check_permission(&self) -> bool {
        self.provider.check_permission().await
    }

    pub async fn request_permission(&self) -> bool {
        self.provider.request_permission().await
    }

    /// Start tracking; a second call while tracking is a no-op and does not
    /// create another underlying subscription. Start-up failures propagate.
    pub async fn start_tracking(&self, events: mpsc::Sender<RelayEvent>) -> Result<()> {
        if *lock(&self.tracking) {
            debug!("tracking already running, ignoring start request");
            return Ok(());
        }

        let (fix_tx, mut fix_rx) = mpsc::channel(FIX_CHANNEL_CAPACITY);
        self.provider.start_updates(fix_tx).await?;
        *lock(&self.tracking) = true;

        let task = tokio::spawn(async move {
            while let Some(fix) = fix_rx.recv().await {
                if events.send(RelayEvent::FixAcquired(fix)).await.is_err() {
                    break;
                }
            }
        });
        *lock(&self.forward_task) = Some(task);
        Ok(())
    }

    /// Always safe to call; releases the underlying subscription exactly once
    pub async fn stop_tracking(&self) {
        let was_tracking = std::mem::take(&mut *lock(&self.tracking));
        if was_tracking {
            self.provider.stop_updates().await;
        }
        if let Some(task) = lock(&self.forward_task).take() {
            task.abort();
        }
    }

    pub fn is_tracking(&self) -> bool {
        *lock(&self.tracking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mayday_core::types::LocationFix;
    use mayday_radio::SimulatedPositioning;
    use tokio_test::assert_ok;
    use std::time::Duration;

    fn make_source(
        provider: SimulatedPositioning,
    ) -> (Arc<SimulatedPositioning>, FixSource<SimulatedPositioning>) {
        let provider = Arc::new(provider);
        (Arc::clone(&provider), FixSource::new(provider))
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_creates_one_subscription() {
        let (provider, source) = make_source(SimulatedPositioning::new(vec![]));
        let (tx, _rx) = mpsc::channel(8);

        assert_ok!(source.start_tracking(tx.clone()).await);
        assert_ok!(source.start_tracking(tx).await);

        assert!(source.is_tracking());
        assert_eq!(provider.start_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixes_are_forwarded_as_events() {
        let (_provider, source) = make_source(
            SimulatedPositioning::new(vec![LocationFix::new(20.0, -103.0)])
                .with_interval(Duration::from_millis(10)),
        );
        let (tx, mut rx) = mpsc::channel(8);

        source.start_tracking(tx).await.unwrap();

        match rx.recv().await.unwrap() {
            RelayEvent::FixAcquired(fix) => {
                assert_eq!(fix.latitude, 20.0);
                assert_eq!(fix.longitude, -103.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_releases_subscription_once() {
        let (provider, source) = make_source(SimulatedPositioning::new(vec![]));
        let (tx, _rx) = mpsc::channel(8);

        source.start_tracking(tx).await.unwrap();
        source.stop_tracking().await;
        source.stop_tracking().await;

        assert!(!source.is_tracking());
        assert_eq!(provider.stop_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_start_is_safe() {
        let (provider, source) = make_source(SimulatedPositioning::new(vec![]));

        source.stop_tracking().await;
        assert_eq!(provider.stop_call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_propagates() {
        let (provider, source) = make_source(SimulatedPositioning::new(vec![]).failing_start());
        let (tx, _rx) = mpsc::channel(8);

        let result = source.start_tracking(tx).await;
        assert!(matches!(result, Err(Error::TrackingStart { .. })));
        assert!(!source.is_tracking());
        assert_eq!(provider.start_call_count(), 1);
    }
}
