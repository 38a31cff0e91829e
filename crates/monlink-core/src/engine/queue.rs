//! Command queue
//!
//! Strict-FIFO queue of outbound commands, shared between caller threads and
//! the engine worker. Submission is rejected while no port is open; the
//! connected flag flips in the same critical section that emits the matching
//! status event, so a caller that has observed `Connected` knows its submit
//! will be accepted until the next `SearchingForDevice`.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::{Command, EngineError, Event, EventSink};

/// A queued command plus its optional completion signal
pub(crate) struct Pending {
    pub(crate) command: Command,
    pub(crate) done: Option<Sender<Result<(), EngineError>>>,
}

struct Inner {
    commands: VecDeque<Pending>,
    connected: bool,
    closed: bool,
}

/// Thread-safe FIFO of outbound commands
///
/// Cloning shares the same queue.
#[derive(Clone)]
pub struct CommandQueue {
    inner: Arc<Mutex<Inner>>,
    events: EventSink,
}

impl CommandQueue {
    pub(crate) fn new(events: EventSink) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                commands: VecDeque::new(),
                connected: false,
                closed: false,
            })),
            events,
        }
    }

    /// Append a command; non-blocking, safe from any thread
    ///
    /// Rejected with [`EngineError::NoConnection`] while no port is open;
    /// the rejection also surfaces as an `Error` event and leaves the queue
    /// unchanged.
    pub fn submit(&self, command: Command) -> Result<(), EngineError> {
        self.push(command, None)
    }

    /// Submit and block until the worker has fully processed the command
    ///
    /// The wait is a blocking receive on a per-command completion channel
    /// signalled by the worker, never a poll loop. A `Download` completes
    /// only after its whole handshake has run.
    pub fn submit_and_await(&self, command: Command) -> Result<(), EngineError> {
        let (tx, rx) = mpsc::channel();
        self.push(command, Some(tx))?;
        match rx.recv() {
            Ok(result) => result,
            // worker dropped the pending entry without signalling; the
            // engine is gone
            Err(_) => Err(EngineError::Shutdown),
        }
    }

    /// Number of commands waiting to be executed
    pub fn len(&self) -> usize {
        self.lock().commands.len()
    }

    /// Whether no commands are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(
        &self,
        command: Command,
        done: Option<Sender<Result<(), EngineError>>>,
    ) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let rejection = if inner.closed {
            Some(EngineError::Shutdown)
        } else if !inner.connected {
            Some(EngineError::NoConnection)
        } else {
            None
        };
        if let Some(err) = rejection {
            drop(inner);
            debug!("rejecting {} command: {}", command.label(), err);
            self.events.emit(Event::Error(err.to_string()));
            return Err(err);
        }
        inner.commands.push_back(Pending { command, done });
        Ok(())
    }

    /// Next command, if any; worker side
    pub(crate) fn take_next(&self) -> Option<Pending> {
        self.lock().commands.pop_front()
    }

    /// Flip the connected flag and emit the matching status event, atomically
    /// with respect to `submit`
    pub(crate) fn set_connected(&self, connected: bool) {
        let mut inner = self.lock();
        inner.connected = connected;
        self.events.emit(if connected {
            Event::Connected
        } else {
            Event::SearchingForDevice
        });
    }

    /// Reject future submissions and fail everything still queued; called
    /// once when the worker stops
    pub(crate) fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.connected = false;
        while let Some(pending) = inner.commands.pop_front() {
            if let Some(done) = pending.done {
                let _ = done.send(Err(EngineError::Shutdown));
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("command queue mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn queue() -> (CommandQueue, std::sync::mpsc::Receiver<Event>) {
        let (events, rx) = EventSink::channel();
        (CommandQueue::new(events), rx)
    }

    #[test]
    fn test_submit_rejected_while_disconnected() {
        let (queue, rx) = queue();
        let result = queue.submit(Command::Write(b"x".to_vec()));
        assert_eq!(result, Err(EngineError::NoConnection));
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::Error("No open connection.".to_string())
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_submit_accepted_after_connect() {
        let (queue, rx) = queue();
        queue.set_connected(true);
        assert_eq!(rx.try_recv().unwrap(), Event::Connected);

        queue.submit(Command::Write(b"a".to_vec())).unwrap();
        queue.submit(Command::Download(b"img".to_vec())).unwrap();
        assert_eq!(queue.len(), 2);

        let first = queue.take_next().unwrap();
        assert_eq!(first.command, Command::Write(b"a".to_vec()));
        let second = queue.take_next().unwrap();
        assert_eq!(second.command, Command::Download(b"img".to_vec()));
        assert!(queue.take_next().is_none());
    }

    #[test]
    fn test_submit_and_await_blocks_until_signalled() {
        let (queue, _rx) = queue();
        queue.set_connected(true);

        let worker_queue = queue.clone();
        let worker = thread::spawn(move || {
            // poll until the caller's command lands, then complete it
            loop {
                if let Some(pending) = worker_queue.take_next() {
                    pending.done.unwrap().send(Ok(())).unwrap();
                    break;
                }
                thread::yield_now();
            }
        });

        let result = queue.submit_and_await(Command::Write(b"hi".to_vec()));
        assert_eq!(result, Ok(()));
        worker.join().unwrap();
    }

    #[test]
    fn test_close_fails_queued_commands() {
        let (queue, _rx) = queue();
        queue.set_connected(true);

        let waiter_queue = queue.clone();
        let waiter =
            thread::spawn(move || waiter_queue.submit_and_await(Command::Write(b"x".to_vec())));

        // wait until the command is queued, then close without executing it
        while queue.is_empty() {
            thread::yield_now();
        }
        queue.close();

        assert_eq!(waiter.join().unwrap(), Err(EngineError::Shutdown));
        assert_eq!(
            queue.submit(Command::Write(b"y".to_vec())),
            Err(EngineError::Shutdown)
        );
    }
}
