//! Engine errors

use std::io;

use thiserror::Error;

/// Errors surfaced by the communication engine
///
/// Kept `Clone` so a result can travel both the per-command completion
/// channel and the event stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No candidate port could be opened
    #[error("No serial device found on any candidate port")]
    NoDeviceFound,

    /// A command was submitted while no port is open
    #[error("No open connection.")]
    NoConnection,

    /// Read or write failed on an open port; treated as connection loss
    #[error("Serial I/O error: {0}")]
    Io(String),

    /// An awaited handshake sentinel never arrived
    #[error("Download handshake timed out waiting for the device")]
    HandshakeTimeout,

    /// The engine is stopping; the command was abandoned
    #[error("Engine is shutting down")]
    Shutdown,
}

impl From<io::Error> for EngineError {
    fn from(e: io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}
