//! Lock-guarded sensor state shared between the control surface and the
//! streaming thread.
//!
//! Every setter touches exactly one field inside one critical section, and
//! `snapshot()` copies the whole reading inside the same lock. The lock is
//! never held across socket I/O or sleeps: callers get an owned copy and
//! release the guard before doing anything slow.

use crate::error::{Error, Result};
use crate::state::reading::{SensorReading, SensorSchema};
use parking_lot::Mutex;

/// Shared sensor state
#[derive(Debug)]
pub struct StateStore {
    reading: Mutex<SensorReading>,
}

impl StateStore {
    /// Create a store holding the default reading for `schema`
    pub fn new(schema: SensorSchema) -> Self {
        Self {
            reading: Mutex::new(SensorReading::new(schema)),
        }
    }

    /// Schema chosen at construction; never changes afterwards
    pub fn schema(&self) -> SensorSchema {
        self.reading.lock().schema()
    }

    /// Copy of every field, taken atomically
    pub fn snapshot(&self) -> SensorReading {
        *self.reading.lock()
    }

    /// Flow rate in L/min. Out-of-range values are stored as given.
    pub fn set_flow(&self, flow_lpm: f32) {
        match &mut *self.reading.lock() {
            SensorReading::Flow(r) => r.flow_lpm = flow_lpm,
            SensorReading::Environment(r) => r.set_flow(flow_lpm),
        }
    }

    /// Relative humidity in percent
    pub fn set_humidity(&self, humidity_pct: f32) {
        match &mut *self.reading.lock() {
            SensorReading::Flow(r) => r.humidity_pct = humidity_pct,
            SensorReading::Environment(r) => r.humidity_pct = humidity_pct,
        }
    }

    /// Flow schema only; derived from flow in the environment schema
    pub fn set_flowing(&self, flowing: bool) -> Result<()> {
        match &mut *self.reading.lock() {
            SensorReading::Flow(r) => {
                r.flowing = flowing;
                Ok(())
            }
            SensorReading::Environment(_) => Err(unsupported("flowing")),
        }
    }

    /// Flow schema only
    pub fn set_leak(&self, leak: bool) -> Result<()> {
        match &mut *self.reading.lock() {
            SensorReading::Flow(r) => {
                r.leak = leak;
                Ok(())
            }
            SensorReading::Environment(_) => Err(unsupported("leak")),
        }
    }

    /// Flow schema only
    pub fn set_high_flow(&self, high_flow: bool) -> Result<()> {
        match &mut *self.reading.lock() {
            SensorReading::Flow(r) => {
                r.high_flow = high_flow;
                Ok(())
            }
            SensorReading::Environment(_) => Err(unsupported("high_flow")),
        }
    }

    /// Environment schema only
    pub fn set_temperature(&self, temperature_c: f32) -> Result<()> {
        match &mut *self.reading.lock() {
            SensorReading::Environment(r) => {
                r.temperature_c = temperature_c;
                Ok(())
            }
            SensorReading::Flow(_) => Err(unsupported("temperature_c")),
        }
    }

    /// Environment schema only
    pub fn set_pressure(&self, pressure_kpa: f32) -> Result<()> {
        match &mut *self.reading.lock() {
            SensorReading::Environment(r) => {
                r.pressure_kpa = pressure_kpa;
                Ok(())
            }
            SensorReading::Flow(_) => Err(unsupported("pressure_kpa")),
        }
    }
}

fn unsupported(field: &str) -> Error {
    Error::NotSupported(format!("field '{}' is not settable in this schema", field))
}
