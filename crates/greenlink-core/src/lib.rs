//! # GreenLink Core Library
//!
//! Core functionality for the GreenLink greenhouse supervisory software.
//!
//! This library provides:
//! - Serial communication with the greenhouse microcontroller
//! - Outbound command queueing with a tick-driven scheduler
//! - Parsing of the controller's text reply grammar into typed events
//! - Background logging of received readings to disk
//!
//! The presentation shell owns a [`protocol::SerialManager`], drives it with
//! a periodic [`protocol::SerialManager::update`] call (nominally every
//! 100 ms) and receives parsed readings through the [`protocol::EventSink`]
//! trait.
//!
//! ## Example
//!
//! ```rust,ignore
//! use greenlink_core::prelude::*;
//!
//! let mut manager = SerialManager::new();
//! manager.attach_logger(DataLogger::new("temperature"));
//!
//! if manager.open_connection() {
//!     manager.send_command(Command::PowerOn);
//!     manager.send_command(Command::Setpoint {
//!         kind: SetpointKind::Temperature,
//!         value: 24.0,
//!     });
//! }
//!
//! // from the shell's periodic timer:
//! manager.update();
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod datalog;
pub mod protocol;

mod task;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::SerialConfig;
    pub use crate::datalog::{DataLogger, LogRecord};
    pub use crate::protocol::{
        decode, Command, EventSink, InboundEvent, PortError, SerialLink, SerialManager,
        SetpointKind,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
