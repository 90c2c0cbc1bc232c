use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Process '{0}' is closed")]
    ProcessClosed(String),

    #[error("A waiter is already registered for event {0}")]
    DuplicateWaiter(u64),

    #[error("Timeout")]
    Timeout,

    #[error("Other: {0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Plugin process lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    /// Registered but the I/O loop has not started yet
    Created,
    /// I/O loop running, handshake pending
    Started,
    /// Handshake received
    Active,
    /// Shutdown message enqueued
    Stopping,
    /// No further queue operations valid
    Terminated,
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::Created
    }
}

/// Status snapshot of a registered plugin process (for listing)
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub id: String,
    pub name: String,
    pub version: Option<String>,
    pub state: ProcessState,
    pub started_at: DateTime<Utc>,
}
