//! # MonLink Core Library
//!
//! Communication engine for the R-31JP 8051 teaching board.

#![warn(missing_docs)]

//!
//! The engine owns one serial connection, serializes all send/receive
//! activity onto it, and drives the monitor's download handshake while
//! streaming the board's free-running console output to an event log.
//!
//! This library provides:
//! - Serial connection management with candidate-port fallback
//! - A dedicated worker thread owning all port I/O
//! - The `*` / `DD` / `>` download handshake state machine
//! - An ordered event stream for console/log consumers
//! - Console text normalization for mixed device/status output
//!
//! ## Example
//!
//! ```rust,ignore
//! use monlink_core::prelude::*;
//!
//! let (engine, events) = ProtocolEngine::start(EngineConfig::default());
//!
//! // Push the assembled image to the board
//! engine.submit_and_await(Command::Download(image))?;
//!
//! // Drain console output
//! for event in events {
//!     println!("{:?}", event);
//! }
//! ```

pub mod engine;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::engine::{
        Command, CommandQueue, Connection, EngineConfig, EngineError, Event, EventSink,
        LineFormatter, ProtocolEngine, ProtocolState,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
