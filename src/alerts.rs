//! Emergency alert evaluation for received readings.
//!
//! A reading raises an alert when a value crosses one of the fixed
//! thresholds below. Missing or NaN values never raise anything.

use bitflags::bitflags;

/// Flow near the top of the sensor range (L/min)
pub const FLOW_HIGH_THRESHOLD: f32 = 45.0;
/// Flow effectively stopped (L/min)
pub const FLOW_LOW_THRESHOLD: f32 = 0.3;
pub const HUMIDITY_THRESHOLD: f32 = 80.0;
pub const TEMPERATURE_THRESHOLD: f32 = 50.0;
pub const PRESSURE_THRESHOLD: f32 = 120.0;

bitflags! {
    /// Active alerts for one reading
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AlertFlags: u8 {
        const HIGH_FLOW = 1 << 0;
        const LOW_FLOW = 1 << 1;
        const HIGH_HUMIDITY = 1 << 2;
        const HIGH_TEMP = 1 << 3;
        const HIGH_PRESSURE = 1 << 4;
    }
}

impl Default for AlertFlags {
    fn default() -> Self {
        AlertFlags::empty()
    }
}

impl AlertFlags {
    /// Evaluate all thresholds
    pub fn evaluate(
        flow_lpm: f32,
        humidity_pct: f32,
        temperature_c: Option<f32>,
        pressure_kpa: Option<f32>,
    ) -> Self {
        let mut mask = AlertFlags::empty();
        if above(Some(flow_lpm), FLOW_HIGH_THRESHOLD) {
            mask |= AlertFlags::HIGH_FLOW;
        }
        if !flow_lpm.is_nan() && flow_lpm < FLOW_LOW_THRESHOLD {
            mask |= AlertFlags::LOW_FLOW;
        }
        if above(Some(humidity_pct), HUMIDITY_THRESHOLD) {
            mask |= AlertFlags::HIGH_HUMIDITY;
        }
        if above(temperature_c, TEMPERATURE_THRESHOLD) {
            mask |= AlertFlags::HIGH_TEMP;
        }
        if above(pressure_kpa, PRESSURE_THRESHOLD) {
            mask |= AlertFlags::HIGH_PRESSURE;
        }
        mask
    }

    /// Human-readable names of the active alerts, for logging
    pub fn labels(&self) -> Vec<&'static str> {
        self.iter_names()
            .map(|(name, _)| match name {
                "HIGH_FLOW" => "high flow",
                "LOW_FLOW" => "low flow",
                "HIGH_HUMIDITY" => "high humidity",
                "HIGH_TEMP" => "high temperature",
                "HIGH_PRESSURE" => "high pressure",
                _ => "unknown",
            })
            .collect()
    }
}

// NaN compares false, so it never trips a threshold
fn above(value: Option<f32>, threshold: f32) -> bool {
    value.is_some_and(|v| v > threshold)
}
