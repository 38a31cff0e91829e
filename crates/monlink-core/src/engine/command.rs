//! Outbound commands
//!
//! A command is created by a caller, queued, and consumed exactly once by
//! the engine worker; it is never re-queued or retried.

use serde::{Deserialize, Serialize};

/// A unit of outbound work for the engine worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Write raw bytes to the device, outside of any handshake
    Write(Vec<u8>),

    /// Push a compiled image to the monitor via the download handshake
    Download(Vec<u8>),
}

impl Command {
    /// The bytes this command puts on the wire (the image, for downloads)
    pub fn payload(&self) -> &[u8] {
        match self {
            Command::Write(data) => data,
            Command::Download(image) => image,
        }
    }

    /// Short label used in log lines
    pub fn label(&self) -> &'static str {
        match self {
            Command::Write(_) => "write",
            Command::Download(_) => "download",
        }
    }
}
