//! Inbound line parsing
//!
//! The firmware sends two kinds of text the core cares about:
//!
//! - periodic telemetry,
//!   `Current Temperature: 25.5 C | Set Temperature: 100 C | SSR State: ON`
//! - acknowledgment of a `SET_TEMP`, free text containing
//!   `Set Temperature updated to <int>`
//!
//! Telemetry is matched on its three labeled fields in order, tolerant of
//! whitespace and of arbitrary text between the fields. Anything else is
//! not an error for the caller; it is simply not recognized.

use pultrusion_core::{DeviceEvent, ProtocolError, RelayState, StatusUpdate};
use regex::Regex;
use std::sync::OnceLock;

const ACK_MARKER: &str = "Set Temperature updated to";

fn telemetry_regex() -> &'static Regex {
    static TELEMETRY: OnceLock<Regex> = OnceLock::new();
    TELEMETRY.get_or_init(|| {
        Regex::new(
            r"Current Temperature:\s*([\d.]+)\s*C.*Set Temperature:\s*([\d.]+)\s*C.*SSR State:\s*(\w+)",
        )
        .expect("invalid telemetry regex")
    })
}

/// A recognized inbound line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InboundMessage {
    /// Periodic telemetry
    Status(StatusUpdate),
    /// Acknowledgment of a temperature request
    TemperatureAck(i32),
}

impl From<InboundMessage> for DeviceEvent {
    fn from(message: InboundMessage) -> Self {
        match message {
            InboundMessage::Status(status) => DeviceEvent::Status(status),
            InboundMessage::TemperatureAck(value) => DeviceEvent::TemperatureAck { value },
        }
    }
}

/// Parser for device telemetry and acknowledgments
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusParser;

impl StatusParser {
    /// Create a new parser
    pub fn new() -> Self {
        Self
    }

    /// Classify a line. Unrecognized lines yield `None`.
    pub fn parse(&self, line: &str) -> Option<InboundMessage> {
        if let Some(value) = Self::parse_ack(line) {
            return Some(InboundMessage::TemperatureAck(value));
        }
        Self::parse_status(line).ok().map(InboundMessage::Status)
    }

    /// Parse a telemetry line.
    pub fn parse_status(line: &str) -> Result<StatusUpdate, ProtocolError> {
        let mismatch = || ProtocolError::ParseMismatch {
            line: line.to_string(),
        };

        let captures = telemetry_regex().captures(line).ok_or_else(mismatch)?;

        let current_temp = parse_temperature(&captures[1]).ok_or_else(mismatch)?;
        let set_temp = parse_temperature(&captures[2]).ok_or_else(mismatch)?;
        let relay_state = RelayState::from_token(&captures[3]);

        Ok(StatusUpdate {
            current_temp,
            set_temp,
            relay_state,
        })
    }

    /// Extract the confirmed value from an acknowledgment line
    pub fn parse_ack(line: &str) -> Option<i32> {
        let start = line.find(ACK_MARKER)? + ACK_MARKER.len();
        let rest = line[start..].trim_start();

        let end = rest
            .char_indices()
            .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());

        rest[..end].parse::<i32>().ok()
    }
}

fn parse_temperature(text: &str) -> Option<f64> {
    text.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}
