//! # mayday-core - Core Domain Types
//!
//! Foundation crate for the Mayday SOS relay. Provides domain types, error
//! handling, relay event definitions, configuration, and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on
//! external crates (serde, chrono, thiserror, toml, tracing, rand).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`LocationFix`] - A single positioning fix (latitude, longitude, timestamp)
//! - [`AlertId`] - Opaque token identifying one SOS activation
//! - [`SessionState`] - Alert session lifecycle (Idle, Activating, Active, Cancelling)
//! - [`RelayPeer`], [`PeerConnectionState`] - A relay node and its connection state
//!
//! ### Events (`events`)
//! - [`RelayEvent`] - The single inbound event type of the session state machine
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ### Configuration (`config`)
//! - [`RelayConfig`] - Tunables (drain timeout, poll interval, channel capacity)
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use mayday_core::prelude::*;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all Mayday crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use config::RelayConfig;
pub use error::{Error, Result, ResultExt};
pub use events::RelayEvent;
pub use types::{AlertId, LocationFix, PeerConnectionState, RelayPeer, SessionState};
