//! Relay configuration loaded from mayday/config.toml

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::prelude::*;

const CONFIG_FILENAME: &str = "config.toml";
const MAYDAY_DIR: &str = "mayday";

/// Default bounded wait for in-flight deliveries during teardown.
/// The source treated this as a fixed constant; it is configurable here.
const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;

/// Default poll interval while waiting for the in-flight count to drain
const DEFAULT_DRAIN_POLL_INTERVAL_MS: u64 = 50;

/// Default capacity of the relay event channel
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default per-peer connect attempt timeout
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Tunables of the relay core
///
/// Loaded from `<config-dir>/mayday/config.toml` when present; every field
/// has a default so a missing or partial file is fine. Unknown keys are
/// tolerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Bounded wait for in-flight deliveries during teardown, in milliseconds
    pub drain_timeout_ms: u64,

    /// Poll interval while draining, in milliseconds
    pub drain_poll_interval_ms: u64,

    /// Capacity of the relay event channel
    pub event_channel_capacity: usize,

    /// Per-peer connect attempt timeout, in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            drain_poll_interval_ms: DEFAULT_DRAIN_POLL_INTERVAL_MS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl RelayConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Poll interval, clamped to at least one millisecond so a zeroed
    /// config value cannot busy-spin the drain loop
    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: RelayConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Load from an explicit path or the default location, falling back to
    /// defaults when the file is absent or unreadable
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let resolved = path.map(Path::to_path_buf).or_else(Self::default_path);
        let Some(resolved) = resolved else {
            return Self::default();
        };
        if !resolved.exists() {
            debug!("no config file at {}, using defaults", resolved.display());
            return Self::default();
        }
        match Self::load(&resolved) {
            Ok(config) => {
                info!("loaded config from {}", resolved.display());
                config
            }
            Err(e) => {
                warn!(
                    "failed to load config from {}: {}, using defaults",
                    resolved.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Default config file path: `<config-dir>/mayday/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(MAYDAY_DIR).join(CONFIG_FILENAME))
    }
}
