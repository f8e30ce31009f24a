//! Serial port configuration
//!
//! Loads the `serial.cfg` key/value file that selects the device and line
//! parameters for the microcontroller link.
//!
//! The file is line oriented: `Key:Value` pairs, `//` comment lines, blank
//! lines skipped. Unrecognized keys and values are silently ignored so a
//! partially valid file still applies everything it can.

use serialport::{DataBits, Parity, StopBits};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Name of the configuration file, looked up in the working directory
pub const CONFIG_FILE: &str = "serial.cfg";

/// Line parameters for the microcontroller link.
///
/// Defaults describe an unconfigured link; the values only become
/// meaningful once `configured` is set by a successful load.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`
    pub device_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits per character
    pub data_bits: DataBits,
    /// Parity checking mode
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
    /// True once a configuration file has been applied
    pub configured: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            baud_rate: 0,
            data_bits: DataBits::Five,
            parity: Parity::None,
            stop_bits: StopBits::One,
            configured: false,
        }
    }
}

impl SerialConfig {
    /// Apply a configuration file on top of the current values.
    ///
    /// Returns `false` without raising when the file cannot be opened or
    /// read; the caller decides whether that is fatal.
    pub fn load(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!("failed to read {}: {err}", path.display());
                return false;
            }
        };

        match self.load_from(BufReader::new(file)) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("failed to read {}: {err}", path.display());
                false
            }
        }
    }

    /// Apply configuration from any line-oriented reader.
    ///
    /// Sets `configured` once the whole input has been consumed, even when
    /// not every key was present.
    pub fn load_from<R: BufRead>(&mut self, reader: R) -> io::Result<()> {
        for line in reader.lines() {
            let line = line?;
            if line.starts_with("//") {
                continue;
            }
            if line.is_empty() || line.starts_with(char::is_whitespace) {
                continue;
            }
            self.apply_line(&line);
        }

        self.configured = true;
        Ok(())
    }

    /// Apply a single `Key:Value` line.
    fn apply_line(&mut self, line: &str) {
        let Some((key, value)) = line.split_once(':') else {
            return;
        };

        match key {
            "DeviceName" => self.device_name = value.to_string(),
            "BaudRate" => {
                if let Ok(rate) = value.trim().parse() {
                    self.baud_rate = rate;
                }
            }
            "Databits" => {
                if let Some(bits) = data_bits_from_name(value) {
                    self.data_bits = bits;
                }
            }
            "Parity" => {
                if let Some(parity) = parity_from_name(value) {
                    self.parity = parity;
                }
            }
            "Stopbits" => {
                if let Some(bits) = stop_bits_from_name(value) {
                    self.stop_bits = bits;
                }
            }
            _ => {}
        }
    }
}

fn data_bits_from_name(name: &str) -> Option<DataBits> {
    match name {
        "SERIAL_DATABITS_5" => Some(DataBits::Five),
        "SERIAL_DATABITS_6" => Some(DataBits::Six),
        "SERIAL_DATABITS_7" => Some(DataBits::Seven),
        "SERIAL_DATABITS_8" => Some(DataBits::Eight),
        _ => None,
    }
}

fn parity_from_name(name: &str) -> Option<Parity> {
    match name {
        "SERIAL_PARITY_NONE" => Some(Parity::None),
        "SERIAL_PARITY_EVEN" => Some(Parity::Even),
        "SERIAL_PARITY_ODD" => Some(Parity::Odd),
        _ => None,
    }
}

fn stop_bits_from_name(name: &str) -> Option<StopBits> {
    match name {
        "SERIAL_STOPBITS_1" => Some(StopBits::One),
        "SERIAL_STOPBITS_2" => Some(StopBits::Two),
        _ => None,
    }
}
