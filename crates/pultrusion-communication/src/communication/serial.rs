//! Serial port link
//!
//! Opens the USB/RS-232 connection to the microcontroller and lists
//! candidate ports.
//!
//! The port is opened with a short read timeout so the read task's poll
//! never stalls, then cloned so the read and write halves hold independent
//! handles to the same device.

use super::{ConnectionParams, LinkChannel};
use pultrusion_core::LinkError;
use std::time::Duration;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Arduino Uno")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

impl std::fmt::Display for SerialPortInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.port_name, self.description)
    }
}

/// List serial ports that look like a microcontroller
///
/// Keeps:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>, LinkError> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        LinkError::Unavailable {
            port: "*".to_string(),
            reason: format!("Failed to enumerate ports: {}", e),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_device_port(&port.port_name))
        .map(|port| {
            let info = SerialPortInfo::new(&port.port_name, port_description(port));
            match &port.port_type {
                serialport::SerialPortType::UsbPort(usb_info) => {
                    let info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                    match usb_info.manufacturer {
                        Some(ref mfg) => info.with_manufacturer(mfg),
                        None => info,
                    }
                }
                _ => info,
            }
        })
        .collect())
}

/// Check if a port name matches microcontroller patterns
fn is_device_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Open the serial link described by `params`.
///
/// Failure here is the one fatal condition of a session.
pub fn open_serial(params: &ConnectionParams) -> Result<LinkChannel, LinkError> {
    let unavailable = |reason: String| LinkError::Unavailable {
        port: params.port.clone(),
        reason,
    };

    if params.port.is_empty() {
        return Err(unavailable("no port given".to_string()));
    }

    let port = serialport::new(&params.port, params.baud_rate)
        .timeout(Duration::from_millis(params.read_timeout_ms))
        .open()
        .map_err(|e| {
            tracing::error!("Failed to open serial port {}: {}", params.port, e);
            unavailable(e.to_string())
        })?;

    let writer = port
        .try_clone()
        .map_err(|e| unavailable(format!("cannot clone port handle: {}", e)))?;

    tracing::info!(
        "Connected to device on {} at {} baud",
        params.port,
        params.baud_rate
    );

    Ok(LinkChannel::new(
        params.port.clone(),
        Box::new(port),
        Box::new(writer),
        params.max_frame_len,
    ))
}
