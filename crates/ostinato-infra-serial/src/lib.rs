mod framing;

pub use framing::LineBuffer;

use ostinato_ports::link::{LinkError, LinkPort, LinkRead};
use ostinato_ports::types::{DeviceId, LinkDevice, LinkState};
use serialport::{ClearBuffer, SerialPort, SerialPortType};
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

const OPEN_TIMEOUT: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 256;
const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(5);

/// Serial-port backed link to the playback device.
pub struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
    address: Option<String>,
    buffer: LineBuffer,
}

impl SerialLink {
    pub fn new() -> Self {
        Self {
            port: None,
            address: None,
            buffer: LineBuffer::new(),
        }
    }

    fn map_open_error(address: &str, err: serialport::Error) -> LinkError {
        match err.kind {
            serialport::ErrorKind::NoDevice => LinkError::DeviceNotFound(address.to_string()),
            serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
                LinkError::DeviceNotFound(address.to_string())
            }
            serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
                LinkError::DeviceUnavailable(format!("{}: {}", address, err.description))
            }
            _ => LinkError::Backend(err.to_string()),
        }
    }

    fn device_name(info: &serialport::SerialPortInfo) -> String {
        match &info.port_type {
            SerialPortType::UsbPort(usb) => match (&usb.manufacturer, &usb.product) {
                (Some(manufacturer), Some(product)) => format!("{} {}", manufacturer, product),
                (None, Some(product)) => product.clone(),
                (Some(manufacturer), None) => manufacturer.clone(),
                (None, None) => format!("USB {:04x}:{:04x}", usb.vid, usb.pid),
            },
            SerialPortType::BluetoothPort => "Bluetooth".to_string(),
            SerialPortType::PciPort => "PCI".to_string(),
            SerialPortType::Unknown => info.port_name.clone(),
        }
    }

    /// Drops the port after an I/O failure so the state reads `Disconnected`.
    fn fail(&mut self, err: io::Error) -> LinkError {
        log::error!(
            "serial link {} failed: {}",
            self.address.as_deref().unwrap_or("?"),
            err
        );
        self.close();
        LinkError::Io(err.to_string())
    }
}

impl Default for SerialLink {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkPort for SerialLink {
    fn list_devices(&self) -> Result<Vec<LinkDevice>, LinkError> {
        let ports = serialport::available_ports().map_err(|e| LinkError::Backend(e.to_string()))?;
        Ok(ports
            .iter()
            .map(|info| LinkDevice {
                id: DeviceId(info.port_name.clone()),
                name: Self::device_name(info),
            })
            .collect())
    }

    fn connect(&mut self, address: &str, baud_rate: u32) -> Result<(), LinkError> {
        self.close();

        let port = serialport::new(address, baud_rate)
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(|e| Self::map_open_error(address, e))?;
        if let Err(err) = port.clear(ClearBuffer::Input) {
            log::debug!("could not clear input buffer on {}: {}", address, err);
        }

        self.port = Some(port);
        self.address = Some(address.to_string());
        self.buffer.clear();
        Ok(())
    }

    fn write_line(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::NotConnected)?;
        let result = port.write_all(bytes).and_then(|()| port.flush());
        result.map_err(|e| self.fail(e))
    }

    fn read_line_timeout(&mut self, timeout: Duration) -> Result<LinkRead, LinkError> {
        let deadline = Instant::now() + timeout;
        if let Some(line) = self.buffer.next_line() {
            return Ok(LinkRead::Line(line));
        }

        let port = self.port.as_mut().ok_or(LinkError::NotConnected)?;
        let result = read_line_until(&mut self.buffer, deadline, |remaining, chunk| {
            port.set_timeout(remaining)?;
            port.read(chunk)
        });
        result.map_err(|err| self.fail(err))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::debug!(
                "closed serial link {}",
                self.address.as_deref().unwrap_or("?")
            );
        }
        self.buffer.clear();
    }

    fn state(&self) -> LinkState {
        if self.port.is_some() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }
}

/// Feeds `buffer` from `read` until it yields a line or `deadline` passes.
///
/// `read` is handed the time left. Timeouts and empty reads return to the
/// deadline check; an empty read also backs off before polling again.
fn read_line_until(
    buffer: &mut LineBuffer,
    deadline: Instant,
    mut read: impl FnMut(Duration, &mut [u8]) -> io::Result<usize>,
) -> io::Result<LinkRead> {
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if let Some(line) = buffer.next_line() {
            return Ok(LinkRead::Line(line));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(LinkRead::Timeout);
        }

        match read(remaining, &mut chunk) {
            Ok(0) => thread::sleep(EMPTY_READ_BACKOFF.min(remaining)),
            Ok(n) => buffer.push(&chunk[..n]),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unopened_link_refuses_io() {
        let mut link = SerialLink::new();
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(link.write_line(b"START_UPLOAD\n"), Err(LinkError::NotConnected));
        assert_eq!(
            link.read_line_timeout(Duration::from_millis(5)),
            Err(LinkError::NotConnected)
        );
        link.close();
        link.close();
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[test]
    fn buffered_lines_are_returned_before_touching_the_port() {
        let mut link = SerialLink::new();
        link.buffer.push(b"OK\r\n");
        assert_eq!(
            link.read_line_timeout(Duration::ZERO),
            Ok(LinkRead::Line("OK".to_string()))
        );
    }

    #[test]
    fn missing_device_maps_to_not_found() {
        let err = serialport::Error::new(serialport::ErrorKind::NoDevice, "gone");
        assert_eq!(
            SerialLink::map_open_error("/dev/ttyUSB9", err),
            LinkError::DeviceNotFound("/dev/ttyUSB9".to_string())
        );
    }

    #[test]
    fn empty_reads_back_off_until_the_deadline() {
        let mut buffer = LineBuffer::new();
        let mut calls = 0;
        let deadline = Instant::now() + Duration::from_millis(40);

        let result = read_line_until(&mut buffer, deadline, |_, _| {
            calls += 1;
            Ok(0)
        });

        assert_eq!(result.unwrap(), LinkRead::Timeout);
        assert!(calls >= 1);
        assert!(calls <= 12, "{} reads in 40ms", calls);
    }

    #[test]
    fn chunks_are_joined_into_one_response() {
        let mut buffer = LineBuffer::new();
        let mut chunks = vec![&b"\r\n"[..], &b"K"[..], &b"O"[..]];
        let deadline = Instant::now() + Duration::from_secs(5);

        let result = read_line_until(&mut buffer, deadline, |_, chunk| match chunks.pop() {
            Some(bytes) => {
                chunk[..bytes.len()].copy_from_slice(bytes);
                Ok(bytes.len())
            }
            None => Err(io::ErrorKind::TimedOut.into()),
        });

        assert_eq!(result.unwrap(), LinkRead::Line("OK".to_string()));
    }

    #[test]
    fn timed_out_reads_keep_waiting_and_hard_errors_surface() {
        let mut buffer = LineBuffer::new();
        let deadline = Instant::now() + Duration::from_millis(10);
        let result = read_line_until(&mut buffer, deadline, |remaining, _| {
            thread::sleep(remaining);
            Err(io::ErrorKind::TimedOut.into())
        });
        assert_eq!(result.unwrap(), LinkRead::Timeout);

        let deadline = Instant::now() + Duration::from_secs(5);
        let err = read_line_until(&mut buffer, deadline, |_, _| {
            Err(io::ErrorKind::BrokenPipe.into())
        })
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
