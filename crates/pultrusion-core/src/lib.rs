//! # Pultrusion Core
//!
//! Core types shared by every crate of the rig controller: the error
//! taxonomy, the telemetry data model and the event bus that carries
//! device messages and control outcomes between tasks.

pub mod data;
pub mod error;
pub mod event_bus;

pub use data::{Actuator, FilamentPreset, RelayState, StatusUpdate};

pub use error::{ControlError, Error, LinkError, ProtocolError, Result};

pub use event_bus::{
    ConnectionEvent, ControlEvent, DeviceEvent, EventBus, EventBusConfig, EventBusError,
    EventCategory, EventFilter, EventStream, RigEvent, StatusStream,
};
