//! Logging initialization
//!
//! The relay core runs embedded in a host application that owns the
//! screen, so log output goes to a rolling file under the platform
//! data-local directory. Timestamps are UTC RFC 3339 to line up with the
//! capture instants carried in location fixes.

use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

const LOG_FILE_PREFIX: &str = "relay.log";

/// Initialize the logging subsystem; returns the directory logs land in
///
/// Level filtering is controlled by the `MAYDAY_LOG` environment variable
/// (tracing env-filter syntax). The default keeps the mayday crates at
/// info and quiets third-party crates to warn.
///
/// # Examples
/// ```bash
/// MAYDAY_LOG=mayday_relay=trace cargo run
/// ```
pub fn init() -> Result<PathBuf> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mayday")
        .join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let filter = EnvFilter::try_from_env("MAYDAY_LOG").unwrap_or_else(|_| {
        EnvFilter::new("mayday=info,mayday_core=info,mayday_radio=info,mayday_relay=info,warn")
    });
    let relay_log = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(relay_log)
                .with_ansi(false)
                .with_target(true)
                .with_timer(fmt::time::ChronoUtc::rfc_3339()),
        )
        .init();

    tracing::info!("relay logging initialized, dir {}", log_dir.display());
    Ok(log_dir)
}
