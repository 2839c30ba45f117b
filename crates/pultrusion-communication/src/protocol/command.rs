//! Outbound commands
//!
//! Every command renders to exactly one line of wire text. Parameterized
//! verbs use `<VERB>:<value>`, the rest are a bare verb. Lines are
//! terminated with CRLF.

use pultrusion_core::{Actuator, ProtocolError};
use std::str::FromStr;

/// Line terminator used for every outbound command
pub const LINE_TERMINATOR: &str = "\r\n";

/// A command for the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Request a new heater target in °C
    SetTemperature(i32),
    /// Fan duty on the inverted 1-255 scale
    SetFanPwm(u8),
    /// Winder duty on the inverted 1-255 scale
    SetWinderPwm(u8),
    /// Arm the device's autonomous shutdown
    SetShutdownSeconds(u32),
    /// Trigger the ejection action
    Eject,
    /// Switch the fan output on
    FanOn,
    /// Switch the fan output off
    FanOff,
    /// Switch the winder output on
    WinderOn,
    /// Switch the winder output off
    WinderOff,
}

impl Command {
    /// PWM command for an actuator
    pub fn set_pwm(actuator: Actuator, pwm: u8) -> Self {
        match actuator {
            Actuator::Fan => Command::SetFanPwm(pwm),
            Actuator::Winder => Command::SetWinderPwm(pwm),
        }
    }

    /// On/off command for an actuator
    pub fn power(actuator: Actuator, on: bool) -> Self {
        match (actuator, on) {
            (Actuator::Fan, true) => Command::FanOn,
            (Actuator::Fan, false) => Command::FanOff,
            (Actuator::Winder, true) => Command::WinderOn,
            (Actuator::Winder, false) => Command::WinderOff,
        }
    }

    /// The protocol verb
    pub fn verb(&self) -> &'static str {
        match self {
            Command::SetTemperature(_) => "SET_TEMP",
            Command::SetFanPwm(_) => "SET_FAN_PWM",
            Command::SetWinderPwm(_) => "SET_WINDER_PWM",
            Command::SetShutdownSeconds(_) => "SET_SHUTDOWN_TIME",
            Command::Eject => "EJECT",
            Command::FanOn => "FAN_ON",
            Command::FanOff => "FAN_OFF",
            Command::WinderOn => "WINDER_ON",
            Command::WinderOff => "WINDER_OFF",
        }
    }

    /// Wire text without the terminator
    pub fn text(&self) -> String {
        match self {
            Command::SetTemperature(value) => format!("{}:{}", self.verb(), value),
            Command::SetFanPwm(pwm) | Command::SetWinderPwm(pwm) => {
                format!("{}:{}", self.verb(), pwm)
            }
            Command::SetShutdownSeconds(seconds) => format!("{}:{}", self.verb(), seconds),
            _ => self.verb().to_string(),
        }
    }

    /// Complete wire line, terminator included
    pub fn to_wire(&self) -> String {
        format!("{}{}", self.text(), LINE_TERMINATOR)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    /// Parse one wire line, terminator optional
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mismatch = || ProtocolError::ParseMismatch {
            line: line.to_string(),
        };
        let line = line.trim_end_matches(['\r', '\n']);

        let Some((verb, value)) = line.split_once(':') else {
            return match line {
                "EJECT" => Ok(Command::Eject),
                "FAN_ON" => Ok(Command::FanOn),
                "FAN_OFF" => Ok(Command::FanOff),
                "WINDER_ON" => Ok(Command::WinderOn),
                "WINDER_OFF" => Ok(Command::WinderOff),
                _ => Err(mismatch()),
            };
        };

        let value = value.trim();
        match verb {
            "SET_TEMP" => value.parse().map(Command::SetTemperature).map_err(|_| mismatch()),
            "SET_FAN_PWM" => value.parse().map(Command::SetFanPwm).map_err(|_| mismatch()),
            "SET_WINDER_PWM" => value
                .parse()
                .map(Command::SetWinderPwm)
                .map_err(|_| mismatch()),
            "SET_SHUTDOWN_TIME" => value
                .parse()
                .map(Command::SetShutdownSeconds)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        }
    }
}
