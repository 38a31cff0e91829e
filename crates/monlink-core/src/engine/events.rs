//! Engine events
//!
//! Ordered stream of everything the worker does: connection status, injected
//! status/error lines, and raw traffic in both directions. Producers clone
//! the sink; the single receiver preserves generation order.

use std::sync::mpsc::{self, Receiver, Sender};

use serde::{Deserialize, Serialize};

/// An entry in the engine's output stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A serial port was opened successfully
    Connected,

    /// No port is open; the engine is scanning candidates
    SearchingForDevice,

    /// Injected status line
    Message(String),

    /// Injected error line
    Error(String),

    /// Raw bytes read from the device
    DataReceived(Vec<u8>),

    /// Raw bytes written to the device
    DataSent(Vec<u8>),
}

/// Sending half of the event channel
///
/// Cheap to clone; every producer feeds the same ordered stream.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<Event>,
}

impl EventSink {
    /// Create a connected sink/receiver pair
    pub fn channel() -> (Self, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    /// Append one event
    ///
    /// A consumer that has gone away is not an error; the engine keeps
    /// running regardless of who is listening.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}
