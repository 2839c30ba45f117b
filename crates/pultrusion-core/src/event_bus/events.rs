//! Event type definitions for the event bus.
//!
//! Events are organized by category. They are cloneable and serializable
//! so a collaborator can log or forward them.

use serde::{Deserialize, Serialize};

use crate::data::{Actuator, StatusUpdate};

/// Root event enum for everything the rig core publishes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RigEvent {
    /// Link lifecycle and I/O failures
    Connection(ConnectionEvent),
    /// Messages decoded from the device
    Device(DeviceEvent),
    /// Outcomes of control requests
    Control(ControlEvent),
}

impl RigEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            RigEvent::Connection(_) => EventCategory::Connection,
            RigEvent::Device(_) => EventCategory::Device,
            RigEvent::Control(_) => EventCategory::Control,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            RigEvent::Connection(e) => e.description(),
            RigEvent::Device(e) => e.description(),
            RigEvent::Control(e) => e.description(),
        }
    }

    /// The telemetry carried by this event, if any
    pub fn as_status(&self) -> Option<&StatusUpdate> {
        match self {
            RigEvent::Device(DeviceEvent::Status(status)) => Some(status),
            _ => None,
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Link events.
    Connection,
    /// Device telemetry and acknowledgments.
    Device,
    /// Control outcomes.
    Control,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Connection => write!(f, "Connection"),
            EventCategory::Device => write!(f, "Device"),
            EventCategory::Control => write!(f, "Control"),
        }
    }
}

/// Link-related events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// Link is open and the read loop is running.
    Connected {
        /// Port name of the link.
        port: String,
    },
    /// Link was closed after all writers stopped.
    Disconnected {
        /// Port name of the link.
        port: String,
    },
    /// A command line could not be written and was dropped.
    WriteFailed {
        /// Wire text of the dropped command.
        command: String,
        /// Error message describing the failure.
        error: String,
    },
    /// Reading from the link failed.
    ReadFailed {
        /// Error message describing the failure.
        error: String,
    },
}

impl ConnectionEvent {
    fn description(&self) -> String {
        match self {
            ConnectionEvent::Connected { port } => format!("Connected to {}", port),
            ConnectionEvent::Disconnected { port } => format!("Disconnected from {}", port),
            ConnectionEvent::WriteFailed { command, error } => {
                format!("Failed to send {}: {}", command, error)
            }
            ConnectionEvent::ReadFailed { error } => format!("Read failed: {}", error),
        }
    }
}

/// Messages decoded from the inbound line stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeviceEvent {
    /// Periodic telemetry.
    Status(StatusUpdate),
    /// The device confirmed a temperature request.
    TemperatureAck {
        /// Confirmed target in °C.
        value: i32,
    },
}

impl DeviceEvent {
    fn description(&self) -> String {
        match self {
            DeviceEvent::Status(status) => status.to_string(),
            DeviceEvent::TemperatureAck { value } => {
                format!("Set temperature updated to {}", value)
            }
        }
    }
}

/// Outcomes of control requests, for the UI collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlEvent {
    /// A debounced or manual speed change was written.
    SpeedCommitted {
        /// Which actuator.
        actuator: Actuator,
        /// Slider value (0-100).
        slider: u8,
        /// PWM value sent (1-255).
        pwm: u8,
    },
    /// The actuator display was reset without a device command.
    SpeedReset {
        /// Which actuator.
        actuator: Actuator,
        /// New slider value.
        slider: u8,
    },
    /// A temperature request was written and is awaiting acknowledgment.
    TemperatureRequested {
        /// Requested target in °C.
        value: i32,
    },
    /// The device acknowledged the pending temperature.
    TemperatureConfirmed {
        /// Confirmed target in °C.
        value: i32,
    },
    /// No acknowledgment arrived in time.
    TemperatureTimedOut {
        /// Requested target in °C.
        value: i32,
    },
    /// The desired temperature display was reset without a device command.
    DesiredTemperatureReset {
        /// New desired value in °C.
        value: i32,
    },
    /// A bare command (eject, on/off) was written.
    CommandSent {
        /// Wire text of the command.
        command: String,
    },
    /// A shutdown countdown started.
    ShutdownStarted {
        /// Countdown length in seconds.
        seconds: u32,
    },
    /// One second of the countdown elapsed.
    ShutdownTick {
        /// Seconds left.
        remaining_seconds: u32,
    },
    /// The countdown reached zero and all displays were turned off.
    ShutdownExpired,
    /// The countdown was cancelled.
    ShutdownCancelled {
        /// Seconds that were left.
        remaining_seconds: u32,
    },
    /// A start request was refused because a countdown is running.
    ShutdownRejected {
        /// Seconds left on the running countdown.
        remaining_seconds: u32,
    },
}

impl ControlEvent {
    fn description(&self) -> String {
        match self {
            ControlEvent::SpeedCommitted {
                actuator,
                slider,
                pwm,
            } => format!("{} speed {}% (PWM {})", actuator, slider, pwm),
            ControlEvent::SpeedReset { actuator, slider } => {
                format!("{} display reset to {}%", actuator, slider)
            }
            ControlEvent::TemperatureRequested { value } => {
                format!("Requested temperature {}°C", value)
            }
            ControlEvent::TemperatureConfirmed { value } => {
                format!("Temperature {}°C confirmed", value)
            }
            ControlEvent::TemperatureTimedOut { value } => {
                format!("No acknowledgment for {}°C", value)
            }
            ControlEvent::DesiredTemperatureReset { value } => {
                format!("Desired temperature reset to {}°C", value)
            }
            ControlEvent::CommandSent { command } => format!("Sent {}", command),
            ControlEvent::ShutdownStarted { seconds } => {
                format!("Shutdown in {}s", seconds)
            }
            ControlEvent::ShutdownTick { remaining_seconds } => {
                let (mins, secs) = (remaining_seconds / 60, remaining_seconds % 60);
                format!("Time remaining: {:02}:{:02}", mins, secs)
            }
            ControlEvent::ShutdownExpired => "All systems have been turned off".to_string(),
            ControlEvent::ShutdownCancelled { remaining_seconds } => {
                format!("Shutdown cancelled with {}s remaining", remaining_seconds)
            }
            ControlEvent::ShutdownRejected { remaining_seconds } => {
                format!("A timer is already running ({}s remaining)", remaining_seconds)
            }
        }
    }
}
