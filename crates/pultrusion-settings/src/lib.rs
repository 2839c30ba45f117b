//! Pultrusion Settings Crate
//!
//! File-backed configuration for the rig controller.

pub mod config;
pub mod error;

pub use config::{
    Config, ConnectionSettings, ControlSettings, LinkSettings, TimingSettings, AUTO_PORT,
};
pub use error::{SettingsError, SettingsResult};
