//! Protocol errors

use thiserror::Error;

/// Failures reported when opening or configuring the serial device.
///
/// The engine never retries on these. Each is logged with its cause and the
/// connection stays closed until the operator triggers a reconnect.
#[derive(Error, Debug)]
pub enum PortError {
    /// The configured device path does not exist
    #[error("device {0} was not found")]
    DeviceNotFound(String),

    /// The device exists but could not be opened
    #[error("error while opening the device {0}")]
    OpenFailed(String),

    /// Reading or writing port parameters failed
    #[error("error while setting port parameters: {0}")]
    PortConfigFailed(String),

    /// The configured baud rate was rejected by the device
    #[error("baud rate {0} not recognized")]
    UnsupportedBaudRate(u32),

    /// Applying the read timeout failed
    #[error("error while writing timeout parameters: {0}")]
    TimeoutConfigFailed(String),

    /// Any other failure reported by the serial layer
    #[error("serial port error: {0}")]
    Unknown(String),
}
