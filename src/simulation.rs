//! Local drift simulation
//!
//! Moves the shared state as a bounded random walk so a client sees changing
//! values without anyone driving the control surface. Runs on its own thread
//! and writes only through the public [`StateStore`] setters, so it is just
//! another control-surface caller from the server's point of view.
//!
//! | Field | Step | Range |
//! |-------|------|-------|
//! | flow_lpm | ±0.1 | 0 – 50 |
//! | humidity_pct | ±0.1 | 10 – 90 |
//! | temperature_c | ±0.2 | −10 – 60 |
//! | pressure_kpa | ±0.2 | 90 – 130 |
//!
//! Temperature and pressure only drift in the environment schema.

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::state::{SensorReading, StateStore};
use log::{debug, error, info, trace};
use rand::prelude::*;
use rand::rngs::SmallRng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Step generator with optional deterministic seeding
pub struct Drift {
    rng: SmallRng,
}

impl Drift {
    /// If seed is 0, uses random entropy
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    /// Uniform step in [-max_step, max_step), applied and clamped
    pub fn walk(&mut self, value: f32, max_step: f32, min: f32, max: f32) -> f32 {
        let step = self.rng.gen_range(-max_step..max_step);
        (value + step).clamp(min, max)
    }

    /// Advance every drifting field of `store` by one step
    pub fn step(&mut self, store: &StateStore) {
        let current = store.snapshot();

        store.set_flow(self.walk(current.flow_lpm(), 0.1, 0.0, 50.0));
        store.set_humidity(self.walk(current.humidity_pct(), 0.1, 10.0, 90.0));

        if let SensorReading::Environment(r) = current {
            let temperature = self.walk(r.temperature_c, 0.2, -10.0, 60.0);
            let pressure = self.walk(r.pressure_kpa, 0.2, 90.0, 130.0);
            // Schema checked above, setters cannot fail here
            let _ = store.set_temperature(temperature);
            let _ = store.set_pressure(pressure);
        }
    }
}

/// Background thread driving [`Drift`] at a fixed rate
pub struct DriftSimulator {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DriftSimulator {
    /// Spawn the simulation thread
    pub fn start(state: Arc<StateStore>, config: &SimulationConfig) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);
        let interval = config.update_interval();
        let seed = config.random_seed;
        let schema = state.schema();

        let handle = thread::Builder::new()
            .name("drift-simulator".to_string())
            .spawn(move || Self::run(state, running_clone, interval, seed))?;

        info!(
            "Drift simulator started ({:?} schema, every {:?})",
            schema, interval
        );

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    fn run(state: Arc<StateStore>, running: Arc<AtomicBool>, interval: Duration, seed: u64) {
        let mut drift = Drift::new(seed);
        let mut steps = 0u64;

        while running.load(Ordering::Acquire) {
            drift.step(&state);
            steps += 1;
            trace!("Drift step {}: {:?}", steps, state.snapshot());
            thread::sleep(interval);
        }

        debug!("Drift simulator exiting after {} steps", steps);
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop and join the simulation thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Drift simulator thread panicked");
            }
            info!("Drift simulator stopped");
        }
    }
}

impl Drop for DriftSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}
