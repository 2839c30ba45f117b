//! Configuration for the pultrusion rig controller
//!
//! Supports JSON and TOML files; the format follows the file extension.
//! Every section has defaults, so a file only needs the keys it changes.
//!
//! Sections:
//! - connection: serial port and open parameters
//! - timing: poll, debounce, acknowledgment and countdown intervals
//! - link: inbound framing limit
//! - controls: initial operator-facing values
//! - presets: filament presets

use crate::error::{SettingsError, SettingsResult};
use pultrusion_core::FilamentPreset;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Port value meaning "pick the first device-looking port"
pub const AUTO_PORT: &str = "Auto";

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name, or "Auto"
    pub port: String,
    /// Baud rate; the firmware runs at 9600
    pub baud_rate: u32,
    /// Serial read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Delay after opening the port in milliseconds
    pub settle_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: AUTO_PORT.to_string(),
            baud_rate: 9600,
            read_timeout_ms: 10,
            settle_ms: 2000,
        }
    }
}

impl ConnectionSettings {
    /// Check if the port should be discovered
    pub fn is_auto(&self) -> bool {
        self.port.is_empty() || self.port.eq_ignore_ascii_case(AUTO_PORT)
    }
}

/// Task intervals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Read task polling interval
    pub poll_interval_ms: u64,
    /// Speed slider debounce window
    pub debounce_ms: u64,
    /// Temperature acknowledgment timeout
    pub ack_timeout_ms: u64,
    /// Shutdown countdown tick
    pub countdown_tick_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            debounce_ms: 200,
            ack_timeout_ms: 5000,
            countdown_tick_ms: 1000,
        }
    }
}

/// Link framing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Longest inbound line accepted before resynchronizing
    pub max_frame_bytes: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            max_frame_bytes: 4096,
        }
    }
}

/// Initial control values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    /// Fan slider, 0-100
    pub fan_speed: u8,
    /// Winder slider, 0-100
    pub winder_speed: u8,
    /// Desired temperature display, °C
    pub desired_temperature: i32,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            fan_speed: 50,
            winder_speed: 50,
            desired_temperature: 100,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings
    #[serde(default)]
    pub connection: ConnectionSettings,
    /// Task intervals
    #[serde(default)]
    pub timing: TimingSettings,
    /// Framing
    #[serde(default)]
    pub link: LinkSettings,
    /// Initial control values
    #[serde(default)]
    pub controls: ControlSettings,
    /// Filament presets
    #[serde(default = "FilamentPreset::defaults")]
    pub presets: Vec<FilamentPreset>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings::default(),
            timing: TimingSettings::default(),
            link: LinkSettings::default(),
            controls: ControlSettings::default(),
            presets: FilamentPreset::defaults(),
        }
    }
}

#[derive(Clone, Copy)]
enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(SettingsError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location: `<config dir>/pultrusion/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("pultrusion").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory on this platform".into())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load config from file, or defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating the parent directory
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let format = format_of(path)?;

        let content = match format {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SettingsError::ConfigDirectory(format!("{}: {}", parent.display(), e))
            })?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        tracing::debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.connection.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }

        let intervals = [
            ("timing.poll_interval_ms", self.timing.poll_interval_ms),
            ("timing.debounce_ms", self.timing.debounce_ms),
            ("timing.ack_timeout_ms", self.timing.ack_timeout_ms),
            ("timing.countdown_tick_ms", self.timing.countdown_tick_ms),
        ];
        for (key, value) in intervals {
            if value == 0 {
                return Err(SettingsError::invalid(key, "must be > 0"));
            }
        }

        if self.link.max_frame_bytes == 0 {
            return Err(SettingsError::invalid("link.max_frame_bytes", "must be > 0"));
        }

        if self.controls.fan_speed > 100 {
            return Err(SettingsError::invalid("controls.fan_speed", "must be 0-100"));
        }
        if self.controls.winder_speed > 100 {
            return Err(SettingsError::invalid("controls.winder_speed", "must be 0-100"));
        }

        let mut names = HashSet::new();
        for preset in &self.presets {
            if preset.fan_speed > 100 || preset.spool_speed > 100 {
                return Err(SettingsError::invalid(
                    "presets",
                    format!("{}: speeds must be 0-100", preset.name),
                ));
            }
            if !names.insert(preset.name.to_ascii_lowercase()) {
                return Err(SettingsError::invalid(
                    "presets",
                    format!("duplicate preset name {}", preset.name),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.baud_rate, 9600);
        assert_eq!(config.timing.ack_timeout_ms, 5000);
        assert_eq!(config.presets.len(), 4);
        assert!(config.connection.is_auto());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.timing.debounce_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SettingsError::InvalidSetting { ref key, .. } if key == "timing.debounce_ms"));
    }

    #[test]
    fn test_duplicate_preset_rejected() {
        let mut config = Config::default();
        config
            .presets
            .push(FilamentPreset::new("pla", 200, 10, 10));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_speed_above_hundred_rejected() {
        let mut config = Config::default();
        config.controls.winder_speed = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_extension() {
        let err = Config::default()
            .save_to_file(Path::new("config.yaml"))
            .unwrap_err();
        assert!(matches!(err, SettingsError::UnsupportedFormat(ref ext) if ext == "yaml"));
    }
}
