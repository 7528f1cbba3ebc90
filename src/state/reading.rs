//! Sensor reading layouts broadcast to clients.
//!
//! Two layouts exist, chosen once at configuration time:
//!
//! | Schema | Fields |
//! |--------|--------|
//! | `flow` | `flow_lpm`, `humidity_pct`, `flowing`, `leak`, `high_flow` |
//! | `environment` | `flow_lpm`, `humidity_pct`, `temperature_c`, `pressure_kpa`, `flowing` |
//!
//! In the `environment` layout `flowing` is derived from the flow rate and
//! cannot be set directly.

use serde::{Deserialize, Serialize};

/// Flow rate (L/min) above which the environment layout reports `flowing`
pub const FLOWING_THRESHOLD_LPM: f32 = 0.1;

/// Record layout selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSchema {
    /// Flow, humidity and leak/high-flow flags
    #[default]
    Flow,
    /// Flow, humidity, temperature and pressure
    Environment,
}

/// Flow layout: manual flags for leak and high-flow conditions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowReading {
    pub flow_lpm: f32,
    pub humidity_pct: f32,
    pub flowing: bool,
    pub leak: bool,
    pub high_flow: bool,
}

impl Default for FlowReading {
    fn default() -> Self {
        Self {
            flow_lpm: 2.0,
            humidity_pct: 40.0,
            flowing: true,
            leak: false,
            high_flow: false,
        }
    }
}

/// Environment layout: adds temperature (°C) and pressure (kPa)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReading {
    pub flow_lpm: f32,
    pub humidity_pct: f32,
    pub temperature_c: f32,
    pub pressure_kpa: f32,
    pub flowing: bool,
}

impl EnvironmentReading {
    /// Set flow and recompute the derived `flowing` flag
    pub fn set_flow(&mut self, flow_lpm: f32) {
        self.flow_lpm = flow_lpm;
        self.flowing = flow_lpm > FLOWING_THRESHOLD_LPM;
    }
}

impl Default for EnvironmentReading {
    fn default() -> Self {
        let mut reading = Self {
            flow_lpm: 0.0,
            humidity_pct: 40.0,
            temperature_c: 22.0,
            pressure_kpa: 101.3,
            flowing: false,
        };
        reading.set_flow(2.0);
        reading
    }
}

/// One complete sensor state, serialized as a flat JSON object
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorReading {
    Flow(FlowReading),
    Environment(EnvironmentReading),
}

impl SensorReading {
    /// Default reading for a schema
    pub fn new(schema: SensorSchema) -> Self {
        match schema {
            SensorSchema::Flow => SensorReading::Flow(FlowReading::default()),
            SensorSchema::Environment => {
                SensorReading::Environment(EnvironmentReading::default())
            }
        }
    }

    pub fn schema(&self) -> SensorSchema {
        match self {
            SensorReading::Flow(_) => SensorSchema::Flow,
            SensorReading::Environment(_) => SensorSchema::Environment,
        }
    }

    pub fn flow_lpm(&self) -> f32 {
        match self {
            SensorReading::Flow(r) => r.flow_lpm,
            SensorReading::Environment(r) => r.flow_lpm,
        }
    }

    pub fn humidity_pct(&self) -> f32 {
        match self {
            SensorReading::Flow(r) => r.humidity_pct,
            SensorReading::Environment(r) => r.humidity_pct,
        }
    }

    pub fn flowing(&self) -> bool {
        match self {
            SensorReading::Flow(r) => r.flowing,
            SensorReading::Environment(r) => r.flowing,
        }
    }
}
