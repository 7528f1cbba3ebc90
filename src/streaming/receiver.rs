//! TCP telemetry consumer
//!
//! Connects to a telemetry server, reads newline-delimited records and folds
//! each one into a running [`ReceivedReading`].
//!
//! # Merge Rules
//!
//! - `flow_lpm`, `humidity_pct`: required, always overwritten
//! - `temperature_c`, `pressure_kpa`: kept from the previous record when absent
//! - `flowing`: defaults to `true` when absent
//! - `leak`, `high_flow`: default to `false` when absent
//!
//! Lines that fail to decode are logged and skipped; the connection stays up.
//! A line longer than [`MAX_LINE_BYTES`] is discarded up to its newline, so
//! a peer that never terminates a record cannot grow the buffer.
//!
//! # Reconnection
//!
//! [`ReconnectingReceiver`] wraps a [`TelemetryReceiver`] and re-establishes
//! the connection after a refused connect or a dropped stream:
//!
//! ```text
//! connect ──ok──► Connected ── read records ── EOF / error ──► Disconnected
//!    ▲                                                            │
//!    └──── sleep backoff (500 ms, doubling, capped at 5 s) ◄──────┘
//! ```
//!
//! The backoff resets after every successful connect. Merged values survive
//! reconnects, and every status change bumps `sequence`.

use crate::alerts::AlertFlags;
use crate::error::{Error, Result};
use crate::streaming::wire::{LINE_TERMINATOR, TelemetryUpdate, decode_line};
use log::{debug, info, warn};
use std::io::{self, BufRead, BufReader, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Longest accepted record, terminator included
pub const MAX_LINE_BYTES: usize = 1024;

/// First retry delay after a lost or refused connection
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound for the retry delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// How often a backoff sleep re-checks the running flag
const BACKOFF_POLL_SLICE: Duration = Duration::from_millis(20);

/// Link state as seen by the consumer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
}

/// Latest merged state seen by a consumer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReceivedReading {
    pub flow_lpm: f32,
    pub humidity_pct: f32,
    pub temperature_c: Option<f32>,
    pub pressure_kpa: Option<f32>,
    pub flowing: bool,
    pub leak: bool,
    pub high_flow: bool,
    pub alerts: AlertFlags,
    pub status: ConnectionStatus,
    /// Incremented on every merged record and every status change
    pub sequence: u64,
}

impl ReceivedReading {
    /// Fold one decoded record into this reading
    pub fn merge(&mut self, update: &TelemetryUpdate) {
        self.flow_lpm = update.flow_lpm;
        self.humidity_pct = update.humidity_pct;
        if update.temperature_c.is_some() {
            self.temperature_c = update.temperature_c;
        }
        if update.pressure_kpa.is_some() {
            self.pressure_kpa = update.pressure_kpa;
        }
        self.flowing = update.flowing.unwrap_or(true);
        self.leak = update.leak.unwrap_or(false);
        self.high_flow = update.high_flow.unwrap_or(false);
        self.alerts = AlertFlags::evaluate(
            self.flow_lpm,
            self.humidity_pct,
            self.temperature_c,
            self.pressure_kpa,
        );
        self.sequence += 1;
    }

    /// Record a connection status change
    pub fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            self.status = status;
            self.sequence += 1;
        }
    }
}

/// Line-oriented client for a telemetry server
pub struct TelemetryReceiver {
    reader: BufReader<TcpStream>,
    peer: SocketAddr,
    current: ReceivedReading,
    /// Partial line carried across read timeouts
    line: Vec<u8>,
    /// Current line went past `MAX_LINE_BYTES`; drop it at its newline
    oversized: bool,
}

impl TelemetryReceiver {
    /// Connect with a read timeout (`None` blocks indefinitely)
    pub fn connect(addr: SocketAddr, read_timeout: Option<Duration>) -> Result<Self> {
        Self::resume(addr, read_timeout, ReceivedReading::default())
    }

    /// Connect and continue merging on top of `previous`
    pub fn resume(
        addr: SocketAddr,
        read_timeout: Option<Duration>,
        previous: ReceivedReading,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(read_timeout)?;
        debug!("Connected to telemetry server {}", addr);

        let mut current = previous;
        current.set_status(ConnectionStatus::Connected);

        Ok(Self {
            reader: BufReader::new(stream),
            peer: addr,
            current,
            line: Vec::with_capacity(MAX_LINE_BYTES),
            oversized: false,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Most recent merged reading
    pub fn current(&self) -> &ReceivedReading {
        &self.current
    }

    /// Block until the next valid record arrives
    ///
    /// Returns `Ok(None)` once the server closes the connection. A read
    /// timeout surfaces as [`Error::Io`] with kind `WouldBlock`/`TimedOut`;
    /// any partial line is kept for the next call.
    pub fn next_reading(&mut self) -> Result<Option<ReceivedReading>> {
        loop {
            let decoded = match self.read_record() {
                Ok(None) => {
                    debug!("Telemetry server {} closed the connection", self.peer);
                    return Ok(None);
                }
                Ok(Some(line)) => std::str::from_utf8(&line)
                    .map_err(|e| Error::InvalidPacket(e.to_string()))
                    .and_then(decode_line),
                Err(e) => Err(e),
            };

            match decoded {
                Ok(update) => {
                    self.current.merge(&update);
                    if !self.current.alerts.is_empty() {
                        warn!("Active alerts: {}", self.current.alerts.labels().join(", "));
                    }
                    return Ok(Some(self.current));
                }
                Err(Error::InvalidPacket(reason)) => {
                    warn!("Skipping malformed record: {}", reason);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read the next raw line without decoding it
    pub fn next_line(&mut self) -> Result<Option<String>> {
        match self.read_record()? {
            Some(line) => String::from_utf8(line)
                .map(Some)
                .map_err(|e| Error::InvalidPacket(e.to_string())),
            None => Ok(None),
        }
    }

    /// Close the connection from the client side
    pub fn close(self) {
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
    }

    /// Read one terminated line of at most `MAX_LINE_BYTES`
    ///
    /// Returns `Ok(None)` on EOF (a trailing unterminated fragment is
    /// dropped) and [`Error::InvalidPacket`] for an oversized line once its
    /// terminator has been consumed.
    fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            // `line` is cleared whenever it fills, so the budget is never zero
            let budget = (MAX_LINE_BYTES - self.line.len()) as u64;
            let n = (&mut self.reader)
                .take(budget)
                .read_until(LINE_TERMINATOR, &mut self.line)?;

            if self.line.last() == Some(&LINE_TERMINATOR) {
                let line = std::mem::replace(&mut self.line, Vec::with_capacity(MAX_LINE_BYTES));
                if std::mem::take(&mut self.oversized) {
                    return Err(Error::InvalidPacket(format!(
                        "record exceeds {} bytes",
                        MAX_LINE_BYTES
                    )));
                }
                return Ok(Some(line));
            }

            if n == 0 {
                self.line.clear();
                self.oversized = false;
                return Ok(None);
            }

            if self.line.len() >= MAX_LINE_BYTES {
                self.line.clear();
                self.oversized = true;
            }
        }
    }
}

/// Doubling retry delay, capped at [`MAX_BACKOFF`]
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            next: INITIAL_BACKOFF,
        }
    }

    /// Delay to wait now; the following one doubles
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(MAX_BACKOFF);
        delay
    }

    pub fn reset(&mut self) {
        self.next = INITIAL_BACKOFF;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer that keeps reconnecting until its running flag clears
///
/// With a `None` read timeout the flag is only checked between records, so
/// pass a finite timeout when the caller needs to stop promptly.
pub struct ReconnectingReceiver {
    addr: SocketAddr,
    read_timeout: Option<Duration>,
    running: Arc<AtomicBool>,
    receiver: Option<TelemetryReceiver>,
    backoff: Backoff,
    current: ReceivedReading,
    connections: u64,
}

impl ReconnectingReceiver {
    /// Create a receiver; the first connect happens on the first read
    pub fn new(addr: SocketAddr, read_timeout: Option<Duration>, running: Arc<AtomicBool>) -> Self {
        Self {
            addr,
            read_timeout,
            running,
            receiver: None,
            backoff: Backoff::new(),
            current: ReceivedReading::default(),
            connections: 0,
        }
    }

    /// Most recent merged reading, including the link status
    pub fn current(&self) -> &ReceivedReading {
        &self.current
    }

    pub fn status(&self) -> ConnectionStatus {
        self.current.status
    }

    /// Number of successful connects so far
    pub fn connections(&self) -> u64 {
        self.connections
    }

    /// Block until the next valid record, reconnecting as needed
    ///
    /// Returns `None` once the running flag clears.
    pub fn next_reading(&mut self) -> Option<ReceivedReading> {
        while self.running.load(Ordering::Acquire) {
            let Some(receiver) = self.receiver.as_mut() else {
                self.connect_or_wait();
                continue;
            };

            match receiver.next_reading() {
                Ok(Some(reading)) => {
                    self.current = reading;
                    return Some(reading);
                }
                Ok(None) => {
                    warn!("Telemetry server {} disconnected", self.addr);
                    self.disconnect();
                }
                Err(Error::Io(e)) if is_timeout(&e) => {}
                Err(e) => {
                    warn!("Telemetry stream from {} failed: {}", self.addr, e);
                    self.disconnect();
                }
            }
        }
        None
    }

    fn connect_or_wait(&mut self) {
        match TelemetryReceiver::resume(self.addr, self.read_timeout, self.current) {
            Ok(receiver) => {
                self.connections += 1;
                self.backoff.reset();
                self.current = *receiver.current();
                self.receiver = Some(receiver);
                info!("Connected to telemetry server {}", self.addr);
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                warn!(
                    "Telemetry server {} not reachable ({}); retrying in {:?}",
                    self.addr, e, delay
                );
                self.sleep_while_running(delay);
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.close();
        }
        self.current.set_status(ConnectionStatus::Disconnected);
    }

    fn sleep_while_running(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        while self.running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(BACKOFF_POLL_SLICE.min(deadline - now));
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
