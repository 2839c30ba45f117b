//! # Pultrusion
//!
//! Host-side controller for a filament pultrusion rig: a heater, a cooling
//! fan and a winder driven by a microcontroller over a serial line.
//!
//! ## Architecture
//!
//! The workspace is split into three crates plus this binary:
//!
//! 1. **pultrusion-core** - errors, data model, event bus
//! 2. **pultrusion-communication** - link, line protocol, controls, `Rig`
//! 3. **pultrusion-settings** - configuration files
//! 4. **pultrusion** - logging setup and the operator console

pub mod console;

pub use pultrusion_communication::{
    list_ports, memory_link, ConnectionParams, Rig, RigDefaults, RigTimings, SimulatedDevice,
    SimulatorConfig,
};
pub use pultrusion_core::{Error, Result};
pub use pultrusion_settings::Config;

use std::path::Path;
use std::time::Duration;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Sets up structured logging with:
/// - RUST_LOG environment variable support, `info` by default
/// - Console output with target, level and line numbers
/// - JSON lines instead of text when `json` is set
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(true);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

/// Load the configuration file, or the default location when `path` is
/// `None`. A missing file yields defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::default_path()?,
    };
    Ok(Config::load_or_default(&path)?)
}

/// Connection parameters for `port`, taking the rest from the config
pub fn connection_params(config: &Config, port: &str) -> ConnectionParams {
    ConnectionParams {
        port: port.to_string(),
        baud_rate: config.connection.baud_rate,
        read_timeout_ms: config.connection.read_timeout_ms,
        settle_ms: config.connection.settle_ms,
        max_frame_len: config.link.max_frame_bytes,
    }
}

/// Task intervals from the config
pub fn rig_timings(config: &Config) -> RigTimings {
    RigTimings {
        poll_interval: Duration::from_millis(config.timing.poll_interval_ms),
        debounce: Duration::from_millis(config.timing.debounce_ms),
        ack_timeout: Duration::from_millis(config.timing.ack_timeout_ms),
        countdown_tick: Duration::from_millis(config.timing.countdown_tick_ms),
    }
}

/// Initial control values and presets from the config
pub fn rig_defaults(config: &Config) -> RigDefaults {
    RigDefaults {
        fan_speed: config.controls.fan_speed,
        winder_speed: config.controls.winder_speed,
        desired_temperature: config.controls.desired_temperature,
        presets: config.presets.clone(),
    }
}

/// Port to open: the explicit one, or the first device-looking port
pub fn resolve_port(config: &Config, requested: Option<&str>) -> anyhow::Result<String> {
    if let Some(port) = requested {
        return Ok(port.to_string());
    }
    if !config.connection.is_auto() {
        return Ok(config.connection.port.clone());
    }

    let ports = list_ports()?;
    match ports.first() {
        Some(info) => {
            tracing::info!("Auto-selected port {}", info);
            Ok(info.port_name.clone())
        }
        None => anyhow::bail!("No serial port found; pass --port or use --simulate"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_to_session_values() {
        let mut config = Config::default();
        config.timing.debounce_ms = 150;
        config.link.max_frame_bytes = 512;

        let params = connection_params(&config, "COM3");
        assert_eq!(params.port, "COM3");
        assert_eq!(params.baud_rate, 9600);
        assert_eq!(params.max_frame_len, 512);

        let timings = rig_timings(&config);
        assert_eq!(timings.debounce, Duration::from_millis(150));
        assert_eq!(timings.ack_timeout, Duration::from_secs(5));

        assert_eq!(rig_defaults(&config).presets.len(), 4);
    }

    #[test]
    fn test_build_stamp_is_utc() {
        assert!(BUILD_DATE.ends_with(" UTC"));
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_explicit_port_wins() {
        let mut config = Config::default();
        assert_eq!(resolve_port(&config, Some("COM7")).unwrap(), "COM7");

        config.connection.port = "/dev/ttyACM1".to_string();
        assert_eq!(resolve_port(&config, None).unwrap(), "/dev/ttyACM1");
    }
}
