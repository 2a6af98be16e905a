//! # mayday-relay - SOS Relay Core
//!
//! The discovery–connect–stream–teardown state machine of the Mayday SOS
//! relay: discovers nearby relay peers, opportunistically connects to
//! several at once, fans every positioning fix out to the currently
//! connected set, and tears down without leaking connections or racing
//! in-flight deliveries.
//!
//! Depends on [`mayday_core`] for domain types and [`mayday_radio`] for the
//! provider interfaces.
//!
//! ## Public API
//!
//! ### Session Lifecycle (`controller`, `session`)
//! - [`SessionController`] - `activate()` / `cancel()` plus the observable
//!   state the presentation layer reads
//! - [`ActivationOutcome`] - Activated / PermissionDenied / AlreadyRunning
//! - [`AlertSession`] - The shared `state + id` pair
//!
//! ### Fan-out (`delivery`)
//! - [`DeliveryCoordinator`] - Per-fix fan-out with an observable in-flight
//!   count and bounded-wait draining
//! - [`DispatchReport`] - Tally of one fan-out
//!
//! ### Peers (`registry`, `radio_link`, `fix_source`)
//! - [`RelayRegistry`] - Authoritative peer connection-state map
//! - [`RadioLink`] - Scan/connect/write operations, handle ownership
//! - [`FixSource`] - Idempotent tracking over the positioning provider

pub mod controller;
pub mod delivery;
pub mod fix_source;
pub mod radio_link;
pub mod registry;
pub mod session;

// Public API re-exports
pub use controller::{ActivationOutcome, AlertIdGenerator, SessionController};
pub use delivery::{DeliveryCoordinator, DispatchReport};
pub use fix_source::FixSource;
pub use radio_link::RadioLink;
pub use registry::RelayRegistry;
pub use session::AlertSession;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a panicking holder poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
