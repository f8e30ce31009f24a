//! Serial Protocol Communication
//!
//! Implements the text command/reply protocol spoken by the greenhouse
//! microcontroller: outbound command encoding and queueing, the background
//! reader, and reply parsing into typed events.

mod codec;
mod error;
mod manager;
mod reader;
pub mod serial;

pub use codec::{decode, extract_frame, Command, InboundEvent, SetpointKind};
pub use error::PortError;
pub use manager::{EventSink, SchedulerTiming, SerialManager};
pub use reader::ReaderResult;
pub use serial::{open_port, DevicePort, SerialLink};

/// Timeout for one blocking read cycle against the port, in milliseconds
pub const READ_TIMEOUT_MS: u64 = 2000;

/// Longest reply the microcontroller produces, in bytes
pub const MAX_REPLY_LEN: usize = 40;

/// Byte that terminates every command and reply on the wire
pub const REPLY_TERMINATOR: u8 = b'?';
