//! Configuration for AquaGuard simulator
//!
//! Loads configuration from a TOML file. Every field is optional and falls
//! back to the values the desktop simulator has always used.
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1:5555"
//! accept_timeout_ms = 1000
//! send_interval_ms = 500
//!
//! [sensor]
//! schema = "flow"        # or "environment"
//!
//! [simulation]
//! enabled = false
//! update_interval_ms = 400
//! random_seed = 0        # 0 = random each run
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{Error, Result};
use crate::state::SensorSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// TCP telemetry server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// TCP bind address for the telemetry stream
    ///
    /// Examples:
    /// - `127.0.0.1:5555` - Localhost only
    /// - `0.0.0.0:5555` - All interfaces
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Upper bound on a single accept wait; also bounds shutdown latency
    #[serde(default = "default_accept_timeout_ms")]
    pub accept_timeout_ms: u64,

    /// Minimum gap between two records sent to a client
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
}

fn default_bind_address() -> String {
    "127.0.0.1:5555".to_string()
}
fn default_accept_timeout_ms() -> u64 {
    1000
}
fn default_send_interval_ms() -> u64 {
    500
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            accept_timeout_ms: default_accept_timeout_ms(),
            send_interval_ms: default_send_interval_ms(),
        }
    }
}

impl ServerConfig {
    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

/// Sensor payload configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SensorConfig {
    /// Which record layout the server broadcasts
    #[serde(default)]
    pub schema: SensorSchema,
}

/// Local drift simulation (used when no control surface drives the values)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Time between two random-walk steps
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// Random seed (0 = random each run)
    #[serde(default)]
    pub random_seed: u64,
}

fn default_update_interval_ms() -> u64 {
    400
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            update_interval_ms: default_update_interval_ms(),
            random_seed: 0,
        }
    }
}

impl SimulationConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error); `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use aquaguard_sim::Config;
    ///
    /// let config = Config::load("aquaguard.toml")?;
    /// # Ok::<(), aquaguard_sim::Error>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_address
            .parse::<SocketAddr>()
            .map_err(|e| {
                Error::Config(format!(
                    "invalid bind_address '{}': {}",
                    self.server.bind_address, e
                ))
            })?;

        if self.server.accept_timeout_ms == 0 {
            return Err(Error::Config("accept_timeout_ms must be > 0".to_string()));
        }
        if self.server.send_interval_ms == 0 {
            return Err(Error::Config("send_interval_ms must be > 0".to_string()));
        }
        if self.simulation.update_interval_ms == 0 {
            return Err(Error::Config(
                "update_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }
}
