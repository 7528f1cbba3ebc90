//! Line-delimited JSON wire format
//!
//! # TCP Protocol
//!
//! The server writes one record per line and never reads from the socket:
//!
//! ```text
//! ┌──────────────────────────────────────┬──────┐
//! │ JSON object (UTF-8, single line)     │ '\n' │
//! └──────────────────────────────────────┴──────┘
//! ```
//!
//! - No handshake, no length prefix, no compression
//! - Field set depends on the configured [`SensorSchema`](crate::state::SensorSchema)
//! - Records are produced by `serde_json`, so string content is always escaped
//!
//! Example (flow schema):
//!
//! ```text
//! {"flow_lpm":5.0,"humidity_pct":55.2,"flowing":true,"leak":true,"high_flow":false}
//! ```
//!
//! ## Decoding
//!
//! Consumers require `flow_lpm` and `humidity_pct`. Every other field is
//! optional so that either schema (and partial updates) can be read by the
//! same decoder.

use crate::error::{Error, Result};
use crate::state::SensorReading;
use serde::Deserialize;

/// Record terminator
pub const LINE_TERMINATOR: u8 = b'\n';

/// Serialize a reading as one newline-terminated record
///
/// Clears `buffer` first so a single allocation can be reused per session.
pub fn encode_line(reading: &SensorReading, buffer: &mut Vec<u8>) -> Result<()> {
    buffer.clear();
    serde_json::to_writer(&mut *buffer, reading)?;
    buffer.push(LINE_TERMINATOR);
    Ok(())
}

/// One decoded record; absent fields are `None`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryUpdate {
    pub flow_lpm: f32,
    pub humidity_pct: f32,
    pub temperature_c: Option<f32>,
    pub pressure_kpa: Option<f32>,
    pub flowing: Option<bool>,
    pub leak: Option<bool>,
    pub high_flow: Option<bool>,
}

/// Fields as they appear on the wire, before required-field checks
#[derive(Deserialize)]
struct RawRecord {
    flow_lpm: Option<f32>,
    humidity_pct: Option<f32>,
    temperature_c: Option<f32>,
    pressure_kpa: Option<f32>,
    flowing: Option<bool>,
    leak: Option<bool>,
    high_flow: Option<bool>,
}

/// Decode a single record (with or without its trailing newline)
pub fn decode_line(line: &str) -> Result<TelemetryUpdate> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::InvalidPacket("empty line".to_string()));
    }

    let raw: RawRecord =
        serde_json::from_str(line).map_err(|e| Error::InvalidPacket(e.to_string()))?;

    let flow_lpm = raw
        .flow_lpm
        .ok_or_else(|| Error::InvalidPacket("missing field 'flow_lpm'".to_string()))?;
    let humidity_pct = raw
        .humidity_pct
        .ok_or_else(|| Error::InvalidPacket("missing field 'humidity_pct'".to_string()))?;

    Ok(TelemetryUpdate {
        flow_lpm,
        humidity_pct,
        temperature_c: raw.temperature_c,
        pressure_kpa: raw.pressure_kpa,
        flowing: raw.flowing,
        leak: raw.leak,
        high_flow: raw.high_flow,
    })
}
