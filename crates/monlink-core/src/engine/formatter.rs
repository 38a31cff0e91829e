//! Console text normalization
//!
//! Device output arrives with any of `\n`, `\r`, `\r\n`, or `\n\r` as line
//! terminators and is interleaved with status lines injected by the engine.
//! The formatter merges the terminator variants and forces a line boundary
//! wherever device text and injected lines would otherwise run together.

use super::Event;

/// What the formatter last emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastChunk {
    /// Nothing emitted yet
    None,
    /// Device-stream text
    Device {
        ended_with_newline: bool,
        /// The raw chunk ended in a bare `\r`; a leading `\n` in the next
        /// device chunk is the second half of a split `\r\n` pair
        trailing_cr: bool,
    },
    /// An injected status or error line (always newline-terminated)
    Injected,
}

/// Stateful normalizer for the console log
#[derive(Debug)]
pub struct LineFormatter {
    last: LastChunk,
}

impl LineFormatter {
    /// Create a formatter with no emission history
    pub fn new() -> Self {
        Self {
            last: LastChunk::None,
        }
    }

    /// Normalize one device-stream chunk
    ///
    /// Returns `None` when nothing remains to emit. No terminator is added;
    /// partial lines stay partial until the device finishes them.
    pub fn device_text(&mut self, bytes: &[u8]) -> Option<String> {
        if bytes.is_empty() {
            return None;
        }

        let mut text = normalize(bytes);
        let drop_leading = text.starts_with('\n')
            && match self.last {
                // the injected line already terminated this line
                LastChunk::Injected => true,
                // second half of a terminator pair split across reads
                LastChunk::Device { trailing_cr, .. } => trailing_cr,
                LastChunk::None => false,
            };
        if drop_leading {
            text.remove(0);
        }

        if text.is_empty() {
            self.last = LastChunk::Device {
                ended_with_newline: true,
                trailing_cr: false,
            };
            return None;
        }

        self.last = LastChunk::Device {
            ended_with_newline: text.ends_with('\n'),
            trailing_cr: bytes.ends_with(b"\r") && !bytes.ends_with(b"\n\r"),
        };
        Some(text)
    }

    /// Format an injected status or error line
    ///
    /// Always newline-terminated; gets a leading newline when it would
    /// otherwise continue a partial device line.
    pub fn status_line(&mut self, line: &str) -> String {
        let mut out = String::with_capacity(line.len() + 2);
        if matches!(
            self.last,
            LastChunk::Device {
                ended_with_newline: false,
                ..
            }
        ) {
            out.push('\n');
        }
        out.push_str(line);
        if !out.ends_with('\n') {
            out.push('\n');
        }
        self.last = LastChunk::Injected;
        out
    }

    /// Map one engine event to console text
    ///
    /// `DataSent` produces nothing; the console shows what the device
    /// answers, not what was pushed at it.
    pub fn render(&mut self, event: &Event) -> Option<String> {
        match event {
            Event::Connected => Some(self.status_line("Device connected.")),
            Event::SearchingForDevice => {
                Some(self.status_line("Searching for serial device..."))
            }
            Event::Message(text) => Some(self.status_line(text)),
            Event::Error(text) => Some(self.status_line(text)),
            Event::DataReceived(bytes) => self.device_text(bytes),
            Event::DataSent(_) => None,
        }
    }
}

impl Default for LineFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `\r\n`, `\n\r`, and bare `\r` into `\n`
fn normalize(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            '\n' => {
                if chars.peek() == Some(&'\r') {
                    chars.next();
                }
                out.push('\n');
            }
            other => out.push(other),
        }
    }
    out
}
