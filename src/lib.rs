//! AquaGuard simulator - single-client TCP telemetry server
//!
//! Streams periodic snapshots of a shared, externally mutable sensor state
//! to one connected client at a time, as newline-delimited JSON records.
//!
//! ```no_run
//! use aquaguard_sim::{Config, SensorSchema, StateStore, TelemetryServer};
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let state = Arc::new(StateStore::new(SensorSchema::Flow));
//! let server = TelemetryServer::new(config.server, Arc::clone(&state));
//!
//! server.start()?;
//! state.set_flow(5.0);
//! server.stop();
//! # Ok::<(), aquaguard_sim::Error>(())
//! ```

pub mod alerts;
pub mod config;
pub mod control;
pub mod error;
pub mod simulation;
pub mod state;
pub mod streaming;

// Re-export commonly used types
pub use alerts::AlertFlags;
pub use config::Config;
pub use control::{Command, ControlSurface};
pub use error::{Error, Result};
pub use simulation::DriftSimulator;
pub use state::{SensorReading, SensorSchema, StateStore};
pub use streaming::{ReconnectingReceiver, TelemetryReceiver, TelemetryServer};
