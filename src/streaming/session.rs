//! Per-connection telemetry loop.
//!
//! A session runs on the accept loop's thread, so at most one client is ever
//! served. Each iteration:
//!
//! ```text
//! 1. Snapshot the state store (lock held only for the copy)
//! 2. Encode one JSON line
//! 3. write_all() the full record
//! 4. Sleep for the send interval
//! ```
//!
//! The session ends on the first write error (peer reset, broken pipe, or the
//! socket being shut down from `stop()`) or when the running flag clears.
//! Errors are reported in the returned summary, never propagated.

use crate::error::Error;
use crate::state::StateStore;
use crate::streaming::wire::encode_line;
use log::{debug, trace};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Initial capacity for the line buffer (a record is well under 128 bytes)
const INITIAL_BUFFER_CAPACITY: usize = 128;

/// Why a session stopped
#[derive(Debug)]
pub enum SessionEnd {
    /// Running flag cleared
    Shutdown,
    /// Write failed; the client is gone or the socket was closed under us
    Disconnected(std::io::Error),
    /// Record could not be encoded
    Failed(Error),
}

/// Outcome of one client session
#[derive(Debug)]
pub struct SessionSummary {
    pub records_sent: u64,
    pub end: SessionEnd,
}

/// Streams snapshots to one connected client
pub struct ClientSession {
    state: Arc<StateStore>,
    running: Arc<AtomicBool>,
    interval: Duration,
    /// Reusable encode buffer (avoids allocation per record)
    buffer: Vec<u8>,
}

impl ClientSession {
    pub fn new(state: Arc<StateStore>, running: Arc<AtomicBool>, interval: Duration) -> Self {
        Self {
            state,
            running,
            interval,
            buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Run until the client goes away or the server stops
    pub fn run<W: Write>(&mut self, stream: &mut W) -> SessionSummary {
        let mut records_sent = 0u64;

        let end = loop {
            if !self.running.load(Ordering::Acquire) {
                break SessionEnd::Shutdown;
            }

            let snapshot = self.state.snapshot();
            if let Err(e) = encode_line(&snapshot, &mut self.buffer) {
                break SessionEnd::Failed(e);
            }

            if let Err(e) = stream.write_all(&self.buffer).and_then(|_| stream.flush()) {
                debug!("Write failed after {} records: {}", records_sent, e);
                break SessionEnd::Disconnected(e);
            }
            records_sent += 1;
            trace!("Sent record #{} ({} bytes)", records_sent, self.buffer.len());

            thread::sleep(self.interval);
        };

        SessionSummary { records_sent, end }
    }
}
