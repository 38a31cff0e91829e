//! Device Communication Engine
//!
//! Implements the MON51-style monitor protocol used by the R-31JP board.
//!
//! One dedicated worker thread owns the serial port; callers talk to it
//! through the [`CommandQueue`] and observe it through the event stream.

pub mod command;
mod connection;
mod error;
pub mod events;
mod formatter;
mod queue;
pub mod serial;
mod worker;

pub use command::Command;
pub use connection::Connection;
pub use error::EngineError;
pub use events::{Event, EventSink};
pub use formatter::LineFormatter;
pub use queue::CommandQueue;
pub use worker::{EngineConfig, ProtocolEngine, ProtocolState};

/// Default baud rate; the R-31JP monitor talks 9600
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default bound on a single blocking read in milliseconds
///
/// Short enough that the worker re-checks the shutdown signal promptly even
/// on a quiet line.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Default bound on each handshake wait state in milliseconds
///
/// The deadline restarts whenever the device produces bytes, so only genuine
/// silence trips it.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5000;

/// Default pause between port scans when no candidate opened, in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;
