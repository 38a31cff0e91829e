//! Engine worker
//!
//! One long-lived thread owns the serial connection and performs, in
//! priority order each iteration: connection maintenance, inbound draining,
//! and execution of one queued command. The download handshake runs as a
//! strict state machine inside command execution; nothing else touches the
//! port while it is in progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::serial::{default_port_names, LinkOpener, SerialOpener};
use super::{
    Command, CommandQueue, Connection, EngineError, Event, EventSink, DEFAULT_BAUD_RATE,
    DEFAULT_HANDSHAKE_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS, DEFAULT_RETRY_DELAY_MS,
};

/// Monitor-is-ready sentinel
const READY_SENTINEL: u8 = b'*';

/// Payload-accepted sentinel
const ACK_SENTINEL: u8 = b'>';

/// Download initiation token
const INIT_TOKEN: &[u8] = b"DD";

/// Marker the monitor echoes while it is still busy storing the image
const BUSY_MARKER: &[u8] = b".";

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Candidate serial ports, primary first
    pub port_names: Vec<String>,

    /// Line speed
    pub baud_rate: u32,

    /// Bound on a single blocking read, in milliseconds
    pub read_timeout_ms: u64,

    /// Bound on each handshake wait state, in milliseconds
    ///
    /// The deadline restarts whenever the device produces bytes, so only
    /// genuine silence trips it.
    pub handshake_timeout_ms: u64,

    /// Pause between failed port scans, in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port_names: default_port_names(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl EngineConfig {
    /// Read timeout as a [`Duration`]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Handshake silence bound as a [`Duration`]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Scan retry pause as a [`Duration`]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Download handshake position
///
/// Exists only while a `Download` command is executing; back to `Idle` on
/// completion and on connection loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolState {
    /// No download in progress
    Idle,
    /// Waiting for the monitor's `*` ready prompt
    AwaitReady,
    /// Sending the `DD` initiation token
    SendInit,
    /// Waiting for the `>` acknowledgement
    AwaitAck,
    /// Writing the image bytes
    SendPayload,
    /// Waiting for the completion marker
    AwaitComplete,
}

/// Handle to a running engine worker
///
/// Dropping the handle shuts the worker down and joins it.
pub struct ProtocolEngine {
    queue: CommandQueue,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ProtocolEngine {
    /// Start a worker against real serial ports
    pub fn start(config: EngineConfig) -> (Self, Receiver<Event>) {
        Self::start_with_opener(config, Box::new(SerialOpener))
    }

    /// Start a worker with a custom link opener; tests use scripted links
    pub fn start_with_opener(
        config: EngineConfig,
        opener: Box<dyn LinkOpener>,
    ) -> (Self, Receiver<Event>) {
        let (events, receiver) = EventSink::channel();
        let queue = CommandQueue::new(events.clone());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut worker = Worker {
            config,
            opener,
            conn: None,
            state: ProtocolState::Idle,
            queue: queue.clone(),
            events,
            shutdown: shutdown.clone(),
        };
        let handle = thread::Builder::new()
            .name("monlink-engine".to_string())
            .spawn(move || worker.run())
            .expect("failed to spawn engine worker");

        (
            Self {
                queue,
                shutdown,
                worker: Some(handle),
            },
            receiver,
        )
    }

    /// The shared command queue
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// See [`CommandQueue::submit`]
    pub fn submit(&self, command: Command) -> Result<(), EngineError> {
        self.queue.submit(command)
    }

    /// See [`CommandQueue::submit_and_await`]
    pub fn submit_and_await(&self, command: Command) -> Result<(), EngineError> {
        self.queue.submit_and_await(command)
    }

    /// Signal the worker and wait for it to exit
    ///
    /// The serial port is closed by the time this returns.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProtocolEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker-thread state; everything here is thread-local to the worker
struct Worker {
    config: EngineConfig,
    opener: Box<dyn LinkOpener>,
    conn: Option<Connection>,
    state: ProtocolState,
    queue: CommandQueue,
    events: EventSink,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    fn run(&mut self) {
        // callers see "searching" until the first port opens
        self.queue.set_connected(false);

        while !self.stopping() {
            if self.conn.is_none() {
                self.maintain_connection();
                continue;
            }

            // free-running console output
            match self.read_chunk() {
                Ok(data) if !data.is_empty() => self.events.emit(Event::DataReceived(data)),
                Ok(_) => {}
                Err(_) => {
                    self.connection_lost();
                    continue;
                }
            }

            // one queued command per iteration, processed to completion
            if let Some(pending) = self.queue.take_next() {
                debug!("executing {} command", pending.command.label());
                let result = self.execute(&pending.command);
                if let Err(err) = &result {
                    match err {
                        EngineError::Io(_) => self.connection_lost(),
                        EngineError::Shutdown => {}
                        other => {
                            self.state = ProtocolState::Idle;
                            self.events.emit(Event::Error(other.to_string()));
                        }
                    }
                }
                if let Some(done) = pending.done {
                    let _ = done.send(result);
                }
            }
        }

        // release the port before failing waiters, so a caller that joined
        // the engine observes both
        if let Some(conn) = self.conn.take() {
            conn.close();
        }
        self.queue.close();
        debug!("engine worker stopped");
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Scan the candidate ports once; pause briefly when nothing opened
    fn maintain_connection(&mut self) {
        match Connection::open(
            self.opener.as_ref(),
            &self.config.port_names,
            self.config.baud_rate,
            self.config.read_timeout(),
        ) {
            Ok(conn) => {
                info!("device connected on {}", conn.port_name());
                self.conn = Some(conn);
                self.queue.set_connected(true);
            }
            Err(_) => {
                // stay responsive to shutdown: the sleep is bounded and the
                // loop re-checks the signal before the next scan
                thread::sleep(self.config.retry_delay());
            }
        }
    }

    /// Drop the handle, tell the world, abandon any handshake in progress
    fn connection_lost(&mut self) {
        warn!("serial link failed, dropping connection");
        self.conn = None;
        self.state = ProtocolState::Idle;
        self.events.emit(Event::Error(
            "Connection appears to have been lost.".to_string(),
        ));
        self.queue.set_connected(false);
    }

    fn execute(&mut self, command: &Command) -> Result<(), EngineError> {
        match command {
            Command::Write(data) => self.send(data),
            Command::Download(image) => self.download(image),
        }
    }

    /// Write bytes and record them on the event stream
    fn send(&mut self, data: &[u8]) -> Result<(), EngineError> {
        let conn = self.conn.as_mut().ok_or(EngineError::NoConnection)?;
        conn.write(data)?;
        self.events.emit(Event::DataSent(data.to_vec()));
        Ok(())
    }

    /// One bounded read; empty on a quiet line
    fn read_chunk(&mut self) -> Result<Vec<u8>, EngineError> {
        let conn = self.conn.as_mut().ok_or(EngineError::NoConnection)?;
        conn.read_available()
    }

    /// Run the download handshake for one image
    fn download(&mut self, image: &[u8]) -> Result<(), EngineError> {
        info!("starting download handshake, image is {} bytes", image.len());
        self.state = ProtocolState::AwaitReady;
        let result = self.run_handshake(image);
        self.state = ProtocolState::Idle;
        if result.is_ok() {
            self.events
                .emit(Event::Message("Data sent successfully.".to_string()));
            info!("download complete");
        }
        result
    }

    /// The strict `*` → `DD` → `>` → payload → completion sequence; no step
    /// is skipped or reordered
    fn run_handshake(&mut self, image: &[u8]) -> Result<(), EngineError> {
        loop {
            match self.state {
                ProtocolState::AwaitReady => {
                    self.await_sentinel(READY_SENTINEL)?;
                    self.state = ProtocolState::SendInit;
                }
                ProtocolState::SendInit => {
                    self.send(INIT_TOKEN)?;
                    self.state = ProtocolState::AwaitAck;
                }
                ProtocolState::AwaitAck => {
                    self.await_sentinel(ACK_SENTINEL)?;
                    self.state = ProtocolState::SendPayload;
                }
                ProtocolState::SendPayload => {
                    self.send(image)?;
                    self.state = ProtocolState::AwaitComplete;
                }
                ProtocolState::AwaitComplete => {
                    self.await_completion()?;
                    return Ok(());
                }
                ProtocolState::Idle => return Ok(()),
            }
        }
    }

    /// Read until `sentinel` shows up
    ///
    /// Everything received meanwhile is still forwarded as `DataReceived`,
    /// so the console keeps showing device chatter (the monitor's
    /// "Hit RESET" prompt, for one) during the handshake.
    fn await_sentinel(&mut self, sentinel: u8) -> Result<(), EngineError> {
        let timeout = self.config.handshake_timeout();
        let mut deadline = Instant::now() + timeout;
        loop {
            if self.stopping() {
                return Err(EngineError::Shutdown);
            }
            let chunk = self.read_chunk()?;
            if !chunk.is_empty() {
                let hit = chunk.contains(&sentinel);
                self.events.emit(Event::DataReceived(chunk));
                if hit {
                    return Ok(());
                }
                // the device is talking; restart the silence bound
                deadline = Instant::now() + timeout;
            } else if Instant::now() >= deadline {
                warn!(
                    "handshake stalled in {:?} after {}ms of silence",
                    self.state, self.config.handshake_timeout_ms
                );
                return Err(EngineError::HandshakeTimeout);
            }
        }
    }

    /// Read until the monitor stops echoing busy markers
    ///
    /// The first non-empty read that is not exactly `.` signals completion.
    fn await_completion(&mut self) -> Result<(), EngineError> {
        let timeout = self.config.handshake_timeout();
        let mut deadline = Instant::now() + timeout;
        loop {
            if self.stopping() {
                return Err(EngineError::Shutdown);
            }
            let chunk = self.read_chunk()?;
            if !chunk.is_empty() {
                let done = chunk.as_slice() != BUSY_MARKER;
                self.events.emit(Event::DataReceived(chunk));
                if done {
                    return Ok(());
                }
                deadline = Instant::now() + timeout;
            } else if Instant::now() >= deadline {
                warn!(
                    "handshake stalled in {:?} after {}ms of silence",
                    self.state, self.config.handshake_timeout_ms
                );
                return Err(EngineError::HandshakeTimeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS);
        assert!(!config.port_names.is_empty());
    }

    #[test]
    fn test_engine_config_partial_json_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"baud_rate": 19200}"#).unwrap();
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.handshake_timeout_ms, DEFAULT_HANDSHAKE_TIMEOUT_MS);
    }
}
