//! # Pultrusion Communication
//!
//! Everything between the operator and the heater/motor controller:
//!
//! - the link to the device (serial port or in-memory) and line framing
//! - the text protocol: outbound commands, inbound telemetry and
//!   acknowledgments, plus a simulated device
//! - the controls that turn operator input into commands: debounced
//!   speeds, acknowledged temperature requests, the shutdown countdown
//! - [`Rig`], the session that runs all of it

pub mod communication;
pub mod control;
pub mod protocol;
pub mod rig;

pub use communication::{
    memory::{memory_link, DeviceEnd},
    serial::{list_ports, open_serial, SerialPortInfo},
    CommandDispatcher, ConnectionParams, Line, LineFramer, LinkChannel, LinkRx, LinkTx,
    DEFAULT_MAX_FRAME_LEN,
};
pub use control::{
    slider_to_pwm, stop_channel, AckHandle, DebouncedControl, PendingAck, ShutdownState,
    ShutdownTimer, StopHandle, StopSignal, TemperatureRequest, TemperatureSetter,
    TemperatureState,
};
pub use protocol::{Command, InboundMessage, SimulatedDevice, SimulatorConfig, StatusParser};
pub use rig::{PresetOutcome, Rig, RigDefaults, RigTimings};
