//! Shared sensor state.
//!
//! - [`reading`]: Record layouts and their defaults
//! - [`store::StateStore`]: Mutex-guarded state with per-field setters

pub mod reading;
pub mod store;

pub use reading::{EnvironmentReading, FlowReading, SensorReading, SensorSchema};
pub use store::StateStore;
