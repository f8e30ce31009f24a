//! Command codec
//!
//! Encodes outbound commands to the wire grammar and parses the
//! microcontroller's reply lines into typed events.
//!
//! The grammar is deliberately permissive and line oriented. Replies arrive
//! as `s<kind>_<setpoint>_<sensor>_<pwm>?`, possibly preceded by noise bytes
//! and wrapped in CR/LF; anything that fails to parse becomes an
//! [`SetpointKind::Invalid`] event and is dropped upstream.

use serde::{Deserialize, Serialize};

/// Channels a setpoint can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetpointKind {
    /// Unparseable or unknown channel
    Invalid,
    /// Air temperature
    Temperature,
    /// Grow-light intensity
    Led,
    /// Relative humidity
    Humidity,
}

/// Outbound commands understood by the microcontroller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Power the controller outputs on (`con?`)
    PowerOn,
    /// Power the controller outputs off (`coff?`)
    PowerOff,
    /// Change the target value of one channel (`csp<x>_<value>?`)
    Setpoint {
        /// Channel to adjust
        kind: SetpointKind,
        /// Target value, formatted with two decimals on the wire
        value: f32,
    },
}

impl Command {
    /// Format the command for the wire.
    ///
    /// Setpoint values are written with exactly two decimals and a dot
    /// separator; the firmware rejects comma decimals, so any comma a
    /// formatter produces is replaced. A setpoint with an invalid kind
    /// encodes to the empty string, which callers must treat as
    /// "do not send".
    pub fn encode(&self) -> String {
        match self {
            Command::PowerOn => "con?".to_string(),
            Command::PowerOff => "coff?".to_string(),
            Command::Setpoint { kind, value } => {
                let prefix = match kind {
                    SetpointKind::Temperature => "cspt",
                    SetpointKind::Led => "cspl",
                    SetpointKind::Humidity => "csph",
                    SetpointKind::Invalid => return String::new(),
                };
                format!("{}_{:.2}?", prefix, value).replace(',', ".")
            }
        }
    }
}

/// One parsed status reply from the microcontroller.
///
/// The value fields are carried verbatim as display strings; the firmware
/// formats them and the presentation layer shows them unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Channel the reading belongs to, `Invalid` when unparseable
    pub kind: SetpointKind,
    /// Current target value of the channel
    pub setpoint: String,
    /// Last measured value
    pub sensor: String,
    /// Actuator duty cycle
    pub pwm: String,
}

impl InboundEvent {
    fn invalid() -> Self {
        Self {
            kind: SetpointKind::Invalid,
            setpoint: String::new(),
            sensor: String::new(),
            pwm: String::new(),
        }
    }

    /// True when the reply parsed to a known channel
    pub fn is_valid(&self) -> bool {
        self.kind != SetpointKind::Invalid
    }
}

/// Cut a reply frame out of a raw read buffer.
///
/// Strips CR/LF bytes, then returns the substring from the first `'s'`
/// through the first `'?'`, terminator included. Returns `None` when either
/// marker is missing or the `'?'` precedes the `'s'`. Leading noise before
/// the `'s'` is tolerated; a stray `'s'` inside it will misframe the reply,
/// which then fails to parse.
pub fn extract_frame(raw: &str) -> Option<String> {
    let cleaned = strip_line_endings(raw);
    let start = cleaned.find('s')?;
    let end = cleaned.find('?')?;
    if end < start {
        return None;
    }
    Some(cleaned[start..=end].to_string())
}

/// Parse one raw reply line into a typed event.
///
/// Total over arbitrary input: anything that does not match the
/// `s<kind>_<setpoint>_<sensor>_<pwm>?` grammar comes back with
/// [`SetpointKind::Invalid`] and empty fields, never an error.
pub fn decode(raw: &str) -> InboundEvent {
    let Some(frame) = extract_frame(raw) else {
        return InboundEvent::invalid();
    };

    // example of a reply: sdt_24.00_19.83_255.00?
    let body = &frame[..frame.len() - 1];
    let tokens: Vec<&str> = body.split('_').collect();
    if tokens.len() < 4 {
        return InboundEvent::invalid();
    }

    let kind = match tokens[0] {
        "sdt" => SetpointKind::Temperature,
        "sdl" => SetpointKind::Led,
        "sdh" => SetpointKind::Humidity,
        _ => {
            tracing::warn!("unrecognized reply {:?}", raw);
            return InboundEvent::invalid();
        }
    };

    InboundEvent {
        kind,
        setpoint: tokens[1].to_string(),
        sensor: tokens[2].to_string(),
        pwm: tokens[3].to_string(),
    }
}

fn strip_line_endings(raw: &str) -> String {
    raw.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}
