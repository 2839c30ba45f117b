//! Shared data model
//!
//! Plain values that cross component boundaries: parsed telemetry,
//! actuator identities and filament presets.

use serde::{Deserialize, Serialize};

/// Heater relay (SSR) state as reported in telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RelayState {
    /// Relay closed, heater powered
    On,
    /// Relay open
    Off,
    /// Any other token the firmware reported
    #[default]
    Unknown,
}

impl RelayState {
    /// Interpret a telemetry token (case-insensitive).
    pub fn from_token(token: &str) -> Self {
        if token.eq_ignore_ascii_case("on") {
            RelayState::On
        } else if token.eq_ignore_ascii_case("off") {
            RelayState::Off
        } else {
            RelayState::Unknown
        }
    }
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayState::On => write!(f, "ON"),
            RelayState::Off => write!(f, "OFF"),
            RelayState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// One periodic telemetry record from the device
///
/// `current_temp` and `set_temp` are always finite and non-negative; the
/// parser refuses anything else.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Measured heater temperature in °C
    pub current_temp: f64,
    /// Target temperature the firmware is regulating to, in °C
    pub set_temp: f64,
    /// Heater relay state
    pub relay_state: RelayState,
}

impl std::fmt::Display for StatusUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Temperature: {:.1}°C | Desired: {:.1}°C | SSR: {}",
            self.current_temp, self.set_temp, self.relay_state
        )
    }
}

/// Speed-controlled actuators on the rig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actuator {
    /// Filament cooling fan
    Fan,
    /// Winder (spool) motor
    Winder,
}

impl std::fmt::Display for Actuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actuator::Fan => write!(f, "fan"),
            Actuator::Winder => write!(f, "winder"),
        }
    }
}

impl std::str::FromStr for Actuator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fan" => Ok(Actuator::Fan),
            "winder" | "spool" => Ok(Actuator::Winder),
            other => Err(format!("unknown actuator '{}'", other)),
        }
    }
}

/// Named set of operating values for a filament material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilamentPreset {
    /// Material name (e.g. "PLA")
    pub name: String,
    /// Heater target in °C
    pub temperature: i32,
    /// Fan slider value (0-100)
    pub fan_speed: u8,
    /// Winder slider value (0-100)
    pub spool_speed: u8,
}

impl FilamentPreset {
    /// Create a new preset
    pub fn new(name: impl Into<String>, temperature: i32, fan_speed: u8, spool_speed: u8) -> Self {
        Self {
            name: name.into(),
            temperature,
            fan_speed,
            spool_speed,
        }
    }

    /// The presets shipped with the controller
    pub fn defaults() -> Vec<FilamentPreset> {
        vec![
            FilamentPreset::new("PLA", 190, 60, 70),
            FilamentPreset::new("ABS", 230, 75, 80),
            FilamentPreset::new("PETG", 250, 50, 60),
            FilamentPreset::new("Nylon", 260, 70, 65),
        ]
    }
}
