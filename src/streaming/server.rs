//! Telemetry server lifecycle and accept loop.
//!
//! # Threading Model
//!
//! ```text
//! caller thread                     telemetry-server thread
//! ─────────────                     ───────────────────────
//! start() ── bind ── spawn ───────► loop while running:
//!                                     accept (bounded wait)
//!                                     ├─ timeout → re-check flag
//!                                     ├─ error   → warn, continue
//!                                     └─ client  → fill slot
//!                                                  ClientSession::run
//!                                                  clear slot
//! stop() ── clear flag
//!        ── shutdown(slot) ───────► blocked write fails, session ends
//!        ── join ◄──────────────── thread exits, listener dropped
//! ```
//!
//! Sessions run on the accept thread, so clients are served one at a time.
//! `stop()` shuts the held client socket down from the caller's thread,
//! which is the only way to interrupt a write blocked on a stalled peer.
//!
//! # Listen Backlog
//!
//! The listener comes from `TcpListener::bind`, which sets `SO_REUSEADDR` on
//! Unix but listens with the platform default backlog rather than 1. Clients
//! that connect during a session wait in that queue and are accepted, in
//! order, once the current session ends. Only one is ever served at a time.

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::state::StateStore;
use crate::streaming::session::{ClientSession, SessionEnd};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Sleep between nonblocking accept attempts inside one bounded wait
const ACCEPT_POLL_SLICE: Duration = Duration::from_millis(10);

/// Connection currently being served, if any
///
/// Holds a `try_clone` of the session's stream so `stop()` can shut it down.
type ClientSlot = Arc<Mutex<Option<TcpStream>>>;

/// Single-client TCP telemetry server
///
/// Owns the running flag, the background thread and the connection slot.
/// Both `start()` and `stop()` are idempotent.
pub struct TelemetryServer {
    config: ServerConfig,
    state: Arc<StateStore>,
    running: Arc<AtomicBool>,
    client: ClientSlot,
    worker: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl TelemetryServer {
    pub fn new(config: ServerConfig, state: Arc<StateStore>) -> Self {
        Self {
            config,
            state,
            running: Arc::new(AtomicBool::new(false)),
            client: Arc::new(Mutex::new(None)),
            worker: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Bind the listener and launch the accept loop
    ///
    /// Returns immediately if the accept loop is already alive. A bind
    /// failure is returned as [`Error::Bind`] and leaves the server stopped.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();

        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Telemetry server already running");
            return Ok(());
        }

        // Thread ended on its own (panic); reap it before relaunching
        if let Some(handle) = worker.take()
            && handle.join().is_err()
        {
            error!("Previous telemetry server thread panicked");
        }

        let bind_address = &self.config.bind_address;
        let listener = TcpListener::bind(bind_address).map_err(|source| Error::Bind {
            address: bind_address.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        self.running.store(true, Ordering::Release);

        let accept_loop = AcceptLoop {
            state: Arc::clone(&self.state),
            running: Arc::clone(&self.running),
            client: Arc::clone(&self.client),
            accept_timeout: self.config.accept_timeout(),
            send_interval: self.config.send_interval(),
        };

        let handle = thread::Builder::new()
            .name("telemetry-server".to_string())
            .spawn(move || accept_loop.run(listener))
            .inspect_err(|_| self.running.store(false, Ordering::Release))?;

        *worker = Some(handle);
        *self.local_addr.lock() = Some(addr);

        info!("Telemetry server started on {}", addr);
        Ok(())
    }

    /// Stop the accept loop and disconnect the current client
    ///
    /// Blocks until the background thread has exited, which takes at most
    /// one accept wait plus one send interval. Never fails.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();

        self.running.store(false, Ordering::Release);

        if let Some(stream) = self.client.lock().take() {
            // Peer may already be gone; shutdown is best-effort
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("Client shutdown during stop: {}", e);
            }
        }

        let Some(handle) = worker.take() else {
            return;
        };

        info!("Telemetry server shutdown requested");
        if handle.join().is_err() {
            error!("Telemetry server thread panicked");
        }
        *self.local_addr.lock() = None;
        info!("Telemetry server stopped");
    }

    /// Whether the server is accepting/serving clients
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Address the listener is bound to (resolves port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Whether a client is currently being served
    pub fn has_client(&self) -> bool {
        self.client.lock().is_some()
    }

    /// Shared state this server broadcasts
    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }
}

impl Drop for TelemetryServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the background thread needs
struct AcceptLoop {
    state: Arc<StateStore>,
    running: Arc<AtomicBool>,
    client: ClientSlot,
    accept_timeout: Duration,
    send_interval: Duration,
}

/// Clears the running flag when the accept thread exits, panics included
struct ClearOnExit(Arc<AtomicBool>);

impl Drop for ClearOnExit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AcceptLoop {
    fn run(self, listener: TcpListener) {
        let _running_guard = ClearOnExit(Arc::clone(&self.running));
        debug!("Accept loop running");

        let mut sessions = 0u64;

        while self.running.load(Ordering::Acquire) {
            let (stream, addr) = match accept_within(&listener, self.accept_timeout) {
                Ok(Some(conn)) => conn,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Accept error: {}", e);
                    thread::sleep(ACCEPT_POLL_SLICE);
                    continue;
                }
            };

            sessions += 1;
            self.serve(stream, addr);
        }

        info!("Accept loop exiting after {} sessions", sessions);
    }

    /// Serve one client to completion, then clear the slot
    fn serve(&self, mut stream: TcpStream, addr: SocketAddr) {
        // Accepted sockets may inherit nonblocking mode on some platforms
        if let Err(e) = stream.set_nonblocking(false) {
            warn!("Failed to set blocking mode for client {}: {}", addr, e);
            return;
        }

        match stream.try_clone() {
            Ok(handle) => *self.client.lock() = Some(handle),
            Err(e) => {
                warn!("Failed to register client {}: {}", addr, e);
                return;
            }
        }

        info!("Client connected: {}", addr);

        let mut session = ClientSession::new(
            Arc::clone(&self.state),
            Arc::clone(&self.running),
            self.send_interval,
        );
        let summary = session.run(&mut stream);

        match summary.end {
            SessionEnd::Shutdown => debug!("Session with {} ended by shutdown", addr),
            SessionEnd::Disconnected(e) => debug!("Session with {} ended: {}", addr, e),
            SessionEnd::Failed(e) => error!("Session with {} failed: {}", addr, e),
        }

        *self.client.lock() = None;
        let _ = stream.shutdown(Shutdown::Both);

        info!(
            "Client disconnected: {} ({} records sent)",
            addr, summary.records_sent
        );
    }
}

/// Accept one connection, waiting at most `timeout`
///
/// Returns `Ok(None)` when the wait elapses with nothing pending.
fn accept_within(
    listener: &TcpListener,
    timeout: Duration,
) -> io::Result<Option<(TcpStream, SocketAddr)>> {
    let deadline = Instant::now() + timeout;
    loop {
        match listener.accept() {
            Ok(conn) => return Ok(Some(conn)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                thread::sleep(ACCEPT_POLL_SLICE.min(deadline - now));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}
