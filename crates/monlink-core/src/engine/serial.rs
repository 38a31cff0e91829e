//! Serial link primitives
//!
//! Wraps the `serialport` crate behind small traits so the engine worker can
//! run unchanged against scripted links in tests.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::SerialPortType;
use tracing::debug;

use super::EngineError;

/// Raw byte link to the device
///
/// Implementations must bound `read` by a timeout fixed at open time; the
/// worker relies on that bound to observe the shutdown signal at regular
/// intervals.
pub trait DeviceLink: Send {
    /// One read, blocking at most the link's timeout
    ///
    /// A quiet line surfaces as `ErrorKind::TimedOut` (or `WouldBlock` on
    /// some platforms), never as an indefinite block.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Number of bytes already buffered by the OS
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Write the whole buffer and flush it out of userspace
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Opens device links by port name
pub trait LinkOpener: Send {
    /// Open `name` at `baud_rate` with the given read timeout
    fn open(
        &self,
        name: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn DeviceLink>, EngineError>;
}

/// A real serial port behind the [`DeviceLink`] seam
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl DeviceLink for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }
}

/// Opener backed by `serialport::new`
pub struct SerialOpener;

impl LinkOpener for SerialOpener {
    fn open(
        &self,
        name: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn DeviceLink>, EngineError> {
        // Standard 8N1 framing, no flow control; the monitor knows nothing else
        let port = serialport::new(name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|e| EngineError::Io(e.to_string()))?;

        debug!("opened {} at {} baud", name, baud_rate);
        Ok(Box::new(SerialLink { port }))
    }
}

/// Builtin candidate port names used when the configuration provides none
///
/// The primary configured name, if any, goes in front of these.
pub fn default_port_names() -> Vec<String> {
    #[cfg(target_os = "macos")]
    {
        vec![
            "/dev/tty.usbserial".to_string(),
            "/dev/cu.usbserial".to_string(),
        ]
    }
    #[cfg(target_os = "windows")]
    {
        vec!["COM1".to_string(), "COM3".to_string()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec!["/dev/ttyUSB0".to_string(), "/dev/ttyACM0".to_string()]
    }
}

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// Product name, when the OS knows it (USB devices)
    pub product: Option<String>,
}

/// List serial ports present on the system, sorted by name
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(|info| {
            let product = match info.port_type {
                SerialPortType::UsbPort(usb) => usb.product,
                _ => None,
            };
            PortInfo {
                name: info.port_name,
                product,
            }
        })
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_names_not_empty() {
        assert!(!default_port_names().is_empty());
    }

    #[test]
    fn test_list_ports() {
        // Just ensure enumeration doesn't panic on any platform
        for port in list_ports() {
            println!("found port: {} - {:?}", port.name, port.product);
        }
    }
}
