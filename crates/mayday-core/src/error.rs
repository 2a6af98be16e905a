//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    // ─────────────────────────────────────────────────────────────
    // Positioning Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Location tracking failed to start: {message}")]
    TrackingStart { message: String },

    // ─────────────────────────────────────────────────────────────
    // Radio Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Radio scan failed to start: {message}")]
    ScanStart { message: String },

    #[error("Connect to relay peer {peer_id} failed: {message}")]
    Connect { peer_id: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Activation failed: {message}")]
    Activation { message: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel send error: {message}")]
    ChannelSend { message: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn tracking_start(message: impl Into<String>) -> Self {
        Self::TrackingStart {
            message: message.into(),
        }
    }

    pub fn scan_start(message: impl Into<String>) -> Self {
        Self::ScanStart {
            message: message.into(),
        }
    }

    pub fn connect(peer_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            peer_id: peer_id.into(),
            message: message.into(),
        }
    }

    pub fn activation(message: impl Into<String>) -> Self {
        Self::Activation {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error
    ///
    /// Recoverable errors leave the session machinery usable: a failed
    /// start-up reverts to idle, a failed connect drops one peer.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::TrackingStart { .. }
                | Error::ScanStart { .. }
                | Error::Connect { .. }
                | Error::ChannelSend { .. }
                | Error::ChannelClosed
        )
    }

    /// Check if this error should trigger application exit
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::ConfigNotFound { .. })
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
