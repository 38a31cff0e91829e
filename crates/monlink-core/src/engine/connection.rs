//! Connection lifecycle
//!
//! One open serial line plus the raw read/write primitives the worker uses.
//! The handle is owned exclusively by the engine worker thread; every other
//! thread observes it only through the event stream.

use std::io;
use std::time::Duration;

use tracing::debug;

use super::serial::{DeviceLink, LinkOpener};
use super::EngineError;

/// An open serial line to the device
pub struct Connection {
    link: Box<dyn DeviceLink>,
    port_name: String,
}

impl Connection {
    /// Try each candidate port in order; the first successful open wins
    pub fn open(
        opener: &dyn LinkOpener,
        candidates: &[String],
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Self, EngineError> {
        for name in candidates {
            match opener.open(name, baud_rate, read_timeout) {
                Ok(link) => {
                    return Ok(Self {
                        link,
                        port_name: name.clone(),
                    });
                }
                Err(e) => debug!("open {} failed: {}", name, e),
            }
        }
        Err(EngineError::NoDeviceFound)
    }

    /// Name of the port this connection is bound to
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// One blocking read bounded by the link timeout, then a drain of
    /// whatever the OS already buffered
    ///
    /// Returns an empty buffer on a quiet line. The block-for-first-byte
    /// phase paces the worker loop; the drain phase keeps multi-byte device
    /// output together in one chunk.
    pub fn read_available(&mut self) -> Result<Vec<u8>, EngineError> {
        let mut first = [0u8; 1];
        let n = match self.link.read(&mut first) {
            Ok(n) => n,
            Err(e) if is_timeout(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut data = first[..n].to_vec();
        let waiting = self.link.bytes_to_read()? as usize;
        if waiting > 0 {
            let start = data.len();
            data.resize(start + waiting, 0);
            let got = match self.link.read(&mut data[start..]) {
                Ok(got) => got,
                Err(e) if is_timeout(&e) => 0,
                Err(e) => return Err(e.into()),
            };
            data.truncate(start + got);
        }
        Ok(data)
    }

    /// Write the whole buffer and flush before returning
    pub fn write(&mut self, data: &[u8]) -> Result<(), EngineError> {
        self.link.write_all(data)?;
        Ok(())
    }

    /// Release the OS resource; dropping the connection does the same
    pub fn close(self) {}
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
