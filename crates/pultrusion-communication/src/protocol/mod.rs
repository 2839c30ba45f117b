//! Line protocol spoken with the microcontroller
//!
//! Outbound: one [`Command`] per line, CRLF terminated.
//! Inbound: telemetry and temperature acknowledgments, classified by
//! [`StatusParser`].
//!
//! [`simulator::SimulatedDevice`] speaks the device side of the same
//! protocol over an in-memory link.

pub mod command;
pub mod simulator;
pub mod status_parser;

pub use command::{Command, LINE_TERMINATOR};
pub use simulator::{SimulatedDevice, SimulatorConfig};
pub use status_parser::{InboundMessage, StatusParser};
