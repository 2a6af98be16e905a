//! Mayday - personal-safety SOS relay over a local radio mesh
//!
//! Binary entry point. Wires the relay core to simulated providers and runs
//! one activate → stream → cancel cycle; the real mobile bindings live in
//! the host application, not here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mayday_core::prelude::*;
use mayday_core::{LocationFix, RelayConfig};
use mayday_radio::{SimulatedPeer, SimulatedPositioning, SimulatedRadio};
use mayday_relay::{ActivationOutcome, SessionController};

/// Mayday - personal-safety SOS relay over a local radio mesh
#[derive(Parser, Debug)]
#[command(name = "mayday")]
#[command(about = "SOS relay demo against simulated radio peers", long_about = None)]
struct Args {
    /// Number of simulated relay peers to advertise
    #[arg(long, default_value_t = 3)]
    peers: usize,

    /// Number of fixes to stream before cancelling
    #[arg(long, default_value_t = 5)]
    fixes: usize,

    /// Path to a config.toml (defaults to the platform config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let log_dir = mayday_core::logging::init()?;
    let config = RelayConfig::load_or_default(args.config.as_deref());
    info!(
        "demo run: {} peers, {} fixes, drain timeout {:?}",
        args.peers,
        args.fixes,
        config.drain_timeout()
    );
    println!("Logging to {}", log_dir.display());

    let peers: Vec<SimulatedPeer> = (1..=args.peers)
        .map(|i| SimulatedPeer::named(format!("peer-{i:02}"), format!("RELAY-{i:03}")))
        .collect();
    let radio = Arc::new(
        SimulatedRadio::new(peers).with_discovery_interval(Duration::from_millis(250)),
    );

    // A short walk, one fix per second
    let walk: Vec<LocationFix> = (0..args.fixes)
        .map(|i| LocationFix::new(20.6736 + 0.0001 * i as f64, -103.3440 - 0.0001 * i as f64))
        .collect();
    let positioning = Arc::new(SimulatedPositioning::new(walk));

    let controller = SessionController::new(Arc::clone(&radio), positioning, config);

    println!("Activating SOS session...");
    match controller.activate().await? {
        ActivationOutcome::Activated => {}
        ActivationOutcome::PermissionDenied => {
            eprintln!("Permission denied; cannot activate.");
            return Ok(());
        }
        ActivationOutcome::AlreadyRunning => {
            eprintln!("A session is already running.");
            return Ok(());
        }
    }

    for _ in 0..args.fixes {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let fix = controller
            .current_fix()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no fix yet".to_string());
        println!(
            "state={} discovered={} connected={} in_flight={} fix={}",
            controller.state(),
            controller.discovered_count(),
            controller.connected_count(),
            controller.in_flight_count(),
            fix
        );
    }

    println!("Cancelling...");
    controller.cancel().await;
    println!(
        "Session idle; {} frames relayed, all peers disconnected.",
        radio.write_count()
    );
    Ok(())
}
