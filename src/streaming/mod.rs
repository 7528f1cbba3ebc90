//! TCP telemetry streaming

pub mod receiver;
pub mod server;
pub mod session;
pub mod wire;

pub use receiver::{
    Backoff, ConnectionStatus, MAX_LINE_BYTES, ReceivedReading, ReconnectingReceiver,
    TelemetryReceiver,
};
pub use server::TelemetryServer;
pub use session::{ClientSession, SessionEnd, SessionSummary};
pub use wire::{TelemetryUpdate, decode_line, encode_line};
