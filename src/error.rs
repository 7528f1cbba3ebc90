//! Error types for AquaGuard simulator

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// AquaGuard simulator error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Listener could not be bound; the only error surfaced by `start()`
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Address that was requested
        address: String,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// Configuration file could not be parsed or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed telemetry record
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Setter invoked on a schema that does not carry the field
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
