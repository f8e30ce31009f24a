//! Serial port handling
//!
//! Wraps the `serialport` crate behind the small [`SerialLink`] trait that
//! the engine and the read worker share. Tests substitute a scripted double
//! at the same seam.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use super::PortError;
use crate::config::SerialConfig;

/// Poll interval while waiting for bytes during a blocking read
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Timeout for individual `read` calls against the device; the delimiter
/// read loops over this with its own deadline
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// Byte-level access to the microcontroller link.
pub trait SerialLink: Send {
    /// Number of bytes waiting in the receive buffer
    fn bytes_available(&mut self) -> usize;

    /// Blocking read until `delimiter` is seen (included in the result),
    /// `max_len` bytes have accumulated, or `timeout` elapses. Returns
    /// whatever arrived, lossily decoded; partial data is not an error.
    fn read_until(
        &mut self,
        delimiter: u8,
        max_len: usize,
        timeout: Duration,
    ) -> io::Result<String>;

    /// Blocking write of the full string
    fn write_str(&mut self, s: &str) -> io::Result<()>;
}

/// [`SerialLink`] over a physical device opened through `serialport`
pub struct DevicePort {
    inner: Box<dyn SerialPort>,
}

impl DevicePort {
    /// Wrap an already-open port handle
    pub fn new(inner: Box<dyn SerialPort>) -> Self {
        Self { inner }
    }
}

impl SerialLink for DevicePort {
    fn bytes_available(&mut self) -> usize {
        self.inner.bytes_to_read().map(|n| n as usize).unwrap_or(0)
    }

    fn read_until(
        &mut self,
        delimiter: u8,
        max_len: usize,
        timeout: Duration,
    ) -> io::Result<String> {
        let mut collected = Vec::with_capacity(max_len);
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 1];

        while collected.len() < max_len && Instant::now() < deadline {
            let available = self.inner.bytes_to_read().map(|n| n as usize).unwrap_or(0);
            if available == 0 {
                std::thread::sleep(POLL_INTERVAL);
                continue;
            }

            match self.inner.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    collected.push(buf[0]);
                    if buf[0] == delimiter {
                        break;
                    }
                }
                Err(ref err)
                    if err.kind() == io::ErrorKind::TimedOut
                        || err.kind() == io::ErrorKind::WouldBlock =>
                {
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(String::from_utf8_lossy(&collected).into_owned())
    }

    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.inner.write_all(s.as_bytes())?;
        self.inner.flush()
    }
}

/// Open and configure the device described by `config`.
///
/// Line parameters are applied one by one after the open so each failure
/// maps onto its own [`PortError`] cause. No retry on any of them.
pub fn open_port(config: &SerialConfig) -> Result<DevicePort, PortError> {
    let mut port = serialport::new(config.device_name.as_str(), config.baud_rate)
        .timeout(PORT_TIMEOUT)
        .open()
        .map_err(|err| map_open_error(err, config))?;

    port.set_data_bits(config.data_bits)
        .map_err(|err| PortError::PortConfigFailed(err.to_string()))?;
    port.set_parity(config.parity)
        .map_err(|err| PortError::PortConfigFailed(err.to_string()))?;
    port.set_stop_bits(config.stop_bits)
        .map_err(|err| PortError::PortConfigFailed(err.to_string()))?;
    port.set_timeout(PORT_TIMEOUT)
        .map_err(|err| PortError::TimeoutConfigFailed(err.to_string()))?;

    Ok(DevicePort::new(port))
}

fn map_open_error(err: serialport::Error, config: &SerialConfig) -> PortError {
    use serialport::ErrorKind;

    match err.kind() {
        ErrorKind::NoDevice => PortError::DeviceNotFound(config.device_name.clone()),
        ErrorKind::InvalidInput => PortError::UnsupportedBaudRate(config.baud_rate),
        ErrorKind::Io(io::ErrorKind::NotFound) => {
            PortError::DeviceNotFound(config.device_name.clone())
        }
        ErrorKind::Io(_) => PortError::OpenFailed(config.device_name.clone()),
        _ => PortError::Unknown(err.to_string()),
    }
}
