//! Control-surface command interface.
//!
//! Anything that drives the simulator (a GUI panel, a script, a test) talks
//! to the server through [`ControlSurface`] instead of touching its internals.

use crate::error::Result;
use crate::streaming::TelemetryServer;
use serde::{Deserialize, Serialize};

/// Operations a control surface may invoke
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum Command {
    Start,
    Stop,
    SetFlow(f32),
    SetHumidity(f32),
    SetFlowing(bool),
    SetLeak(bool),
    SetHighFlow(bool),
    SetTemperature(f32),
    SetPressure(f32),
}

/// Lifecycle and setter operations exposed to callers
pub trait ControlSurface {
    fn start(&self) -> Result<()>;
    fn stop(&self);
    fn is_running(&self) -> bool;

    /// Dispatch a command; fails only on bind errors or schema mismatches
    fn apply(&self, command: Command) -> Result<()>;
}

impl ControlSurface for TelemetryServer {
    fn start(&self) -> Result<()> {
        TelemetryServer::start(self)
    }

    fn stop(&self) {
        TelemetryServer::stop(self)
    }

    fn is_running(&self) -> bool {
        TelemetryServer::is_running(self)
    }

    fn apply(&self, command: Command) -> Result<()> {
        log::debug!("Applying command: {:?}", command);
        let state = self.state();
        match command {
            Command::Start => ControlSurface::start(self),
            Command::Stop => {
                ControlSurface::stop(self);
                Ok(())
            }
            Command::SetFlow(v) => {
                state.set_flow(v);
                Ok(())
            }
            Command::SetHumidity(v) => {
                state.set_humidity(v);
                Ok(())
            }
            Command::SetFlowing(v) => state.set_flowing(v),
            Command::SetLeak(v) => state.set_leak(v),
            Command::SetHighFlow(v) => state.set_high_flow(v),
            Command::SetTemperature(v) => state.set_temperature(v),
            Command::SetPressure(v) => state.set_pressure(v),
        }
    }
}
