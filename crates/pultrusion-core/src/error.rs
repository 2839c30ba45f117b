//! Error handling for the pultrusion rig controller
//!
//! Errors are grouped by the layer that raises them:
//! - Link errors (serial connection and raw byte I/O)
//! - Protocol errors (framing and telemetry parsing)
//! - Control errors (speed, temperature and shutdown requests)
//!
//! Only a link that cannot be established is fatal. Everything else is
//! absorbed by the component that hit it, logged, and the session goes on.

use thiserror::Error;

/// Link error type
///
/// Represents failures of the byte-stream connection to the microcontroller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The connection could not be established
    #[error("Link unavailable on {port}: {reason}")]
    Unavailable {
        /// The port that failed to open.
        port: String,
        /// The reason the port could not be opened.
        reason: String,
    },

    /// A write to the link failed; the command is dropped
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// The reason for the write failure.
        reason: String,
    },

    /// A read from the link failed
    #[error("Read failed: {reason}")]
    ReadFailed {
        /// The reason for the read failure.
        reason: String,
    },

    /// The link has been closed for writing
    #[error("Link closed")]
    Closed,
}

/// Protocol error type
///
/// Represents problems with the inbound line stream. Neither variant ever
/// reaches the user; the read loop logs them and keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A line grew past the framing limit and was discarded
    #[error("Frame exceeded {limit} bytes without a line terminator")]
    FrameTooLong {
        /// The configured frame limit in bytes.
        limit: usize,
    },

    /// An inbound line does not have the telemetry shape
    #[error("Line does not match telemetry format: {line}")]
    ParseMismatch {
        /// The offending line.
        line: String,
    },
}

/// Control error type
///
/// Raised by the actuator, temperature and shutdown controls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// Slider value outside 0..=100
    #[error("Speed {value} is outside 0-100")]
    InvalidSpeed {
        /// The rejected slider value.
        value: u32,
    },

    /// Shutdown duration must be at least one minute
    #[error("Invalid shutdown duration: {minutes} minute(s)")]
    InvalidDuration {
        /// The rejected duration.
        minutes: u32,
    },

    /// A shutdown countdown is already running
    #[error("A shutdown timer is already running ({remaining_seconds}s remaining)")]
    ShutdownAlreadyRunning {
        /// Seconds left on the running countdown.
        remaining_seconds: u32,
    },

    /// Another temperature request is still awaiting its acknowledgment
    #[error("Temperature request for {pending} is still awaiting acknowledgment")]
    TemperatureBusy {
        /// The temperature that is still pending.
        pending: i32,
    },

    /// The device did not confirm a temperature request in time
    #[error("No acknowledgment for temperature {expected} within {timeout_ms}ms")]
    AckTimeout {
        /// The temperature that was requested.
        expected: i32,
        /// The acknowledgment window in milliseconds.
        timeout_ms: u64,
    },

    /// No preset with the given name
    #[error("Unknown filament preset: {name}")]
    UnknownPreset {
        /// The preset name that was looked up.
        name: String,
    },

    /// The command could not be written
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Main error type for the rig controller
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Link error
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Control error
    #[error(transparent)]
    Control(#[from] ControlError),
}

impl Error {
    /// Whether this error ends the session.
    ///
    /// Only a link that was never established is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Link(LinkError::Unavailable { .. })
                | Error::Control(ControlError::Link(LinkError::Unavailable { .. }))
        )
    }

    /// Check if this is a link error
    pub fn is_link_error(&self) -> bool {
        matches!(
            self,
            Error::Link(_) | Error::Control(ControlError::Link(_))
        )
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
