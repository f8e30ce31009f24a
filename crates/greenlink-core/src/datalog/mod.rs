//! Reading log
//!
//! Buffers received readings in memory and appends them to a per-instance
//! log file from a background worker.

mod logger;

pub use logger::DataLogger;

use serde::{Deserialize, Serialize};

/// One buffered reading, stamped at the time it was logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// UTC timestamp, second precision
    pub timestamp: String,
    /// Target value at the time of the reading
    pub setpoint: String,
    /// Measured value
    pub sensor: String,
    /// Actuator duty cycle
    pub pwm: String,
}

impl LogRecord {
    /// Format the record as one log file line.
    pub fn to_line(&self) -> String {
        format!(
            "{} Setpoint: {} Sensor: {} PWM: {} \n",
            self.timestamp, self.setpoint, self.sensor, self.pwm
        )
    }
}
