//! # mayday-radio - Radio and Positioning Interfaces
//!
//! Provider traits and wire protocol for the Mayday SOS relay, plus
//! simulated providers for the demo runner and tests.
//!
//! Depends on [`mayday_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Providers (`provider`)
//! - [`RadioProvider`] - Short-range-radio manager: permission, scan,
//!   connect/disconnect, write primitive
//! - [`PositioningProvider`] - Positioning stack: permission, fix
//!   subscribe/unsubscribe
//! - [`PermissionStatus`] - Unknown / Granted / Denied
//! - [`Advertisement`] - One raw scan observation
//!
//! ### Protocol (`protocol`)
//! - [`FixFrame`] - The location frame written to relay peers
//! - [`RELAY_SERVICE_UUID`], [`RELAY_TX_CHARACTERISTIC_UUID`] - GATT ids
//!
//! ### Simulation (`sim`)
//! - [`SimulatedRadio`], [`SimulatedPositioning`] - Scripted in-memory
//!   providers
//! - [`SimulatedPeer`] - Per-peer behavior script

pub mod protocol;
pub mod provider;
pub mod sim;

// Public API re-exports
pub use protocol::{FixFrame, RELAY_SERVICE_UUID, RELAY_TX_CHARACTERISTIC_UUID};
pub use provider::{
    Advertisement, LocalPositioningProvider, LocalRadioProvider, PermissionStatus,
    PositioningProvider, RadioProvider,
};
pub use sim::{SimulatedHandle, SimulatedPeer, SimulatedPositioning, SimulatedRadio};
