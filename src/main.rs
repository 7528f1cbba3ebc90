//! AquaGuard simulator daemon
//!
//! Serves the telemetry stream on the configured address (default
//! `127.0.0.1:5555`) until Ctrl-C. With `[simulation] enabled = true` the
//! values drift on their own; otherwise they stay at their defaults.

use aquaguard_sim::config::Config;
use aquaguard_sim::error::{Error, Result};
use aquaguard_sim::simulation::DriftSimulator;
use aquaguard_sim::state::StateStore;
use aquaguard_sim::streaming::TelemetryServer;
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `aquaguard-sim <path>` (positional)
/// - `aquaguard-sim --config <path>` (flag-based)
/// - `aquaguard-sim -c <path>` (short flag)
///
/// Returns `None` when no path is given; built-in defaults are used then.
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("AquaGuard simulator v{} starting...", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => log::info!("Using config: {}", path),
        None => log::info!("No config file given, using defaults"),
    }
    log::info!("Sensor schema: {:?}", config.sensor.schema);

    let state = Arc::new(StateStore::new(config.sensor.schema));

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let server = TelemetryServer::new(config.server.clone(), Arc::clone(&state));
    server.start()?;

    let mut simulator = if config.simulation.enabled {
        Some(DriftSimulator::start(Arc::clone(&state), &config.simulation)?)
    } else {
        None
    };

    log::info!("AquaGuard simulator running. Press Ctrl-C to stop.");

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    log::info!("Shutting down...");
    if let Some(sim) = simulator.as_mut() {
        sim.stop();
    }
    server.stop();

    log::info!("AquaGuard simulator stopped");
    Ok(())
}
