//! Shared alert-session state
//!
//! The source tracked activation through several independent booleans
//! (`isScanning`, `isTracking`, `isSOSActive`); here the lifecycle is one
//! explicit state value so illegal combinations are unrepresentable.

use std::sync::Mutex;

use mayday_core::types::{AlertId, SessionState};

use crate::lock;

struct SessionInner {
    state: SessionState,
    id: Option<AlertId>,
}

/// The one `state + id` pair consulted by the dispatch and teardown paths
///
/// Transition methods enforce the legal cycle
/// `Idle → Activating → Active → Cancelling → Idle`; every other request
/// is refused and reported through the return value.
pub struct AlertSession {
    inner: Mutex<SessionInner>,
}

impl Default for AlertSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSession {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                id: None,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        lock(&self.inner).state
    }

    /// Current alert token; `None` outside an activation
    pub fn id(&self) -> Option<AlertId> {
        lock(&self.inner).id.clone()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Whether the session accepts new discovery/connect activity
    pub fn is_running(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Activating | SessionState::Active
        )
    }

    /// Idle → Activating with the given token. False when not idle.
    pub(crate) fn begin_activation(&self, id: AlertId) -> bool {
        let mut inner = lock(&self.inner);
        if inner.state != SessionState::Idle {
            return false;
        }
        inner.state = SessionState::Activating;
        inner.id = Some(id);
        true
    }

    /// Activating → Active. False when activation was not in progress.
    pub(crate) fn mark_active(&self) -> bool {
        let mut inner = lock(&self.inner);
        if inner.state != SessionState::Activating {
            return false;
        }
        inner.state = SessionState::Active;
        true
    }

    /// Active → Cancelling, clearing the token in the same critical section
    /// so no later dispatch can observe a live id. False when there is no
    /// active session (cancel is a no-op then).
    pub(crate) fn begin_cancel(&self) -> bool {
        let mut inner = lock(&self.inner);
        if inner.state != SessionState::Active {
            return false;
        }
        inner.state = SessionState::Cancelling;
        inner.id = None;
        true
    }

    /// Unconditionally back to Idle with no token
    pub(crate) fn reset(&self) {
        let mut inner = lock(&self.inner);
        inner.state = SessionState::Idle;
        inner.id = None;
    }
}
