//! Simulated heater controller
//!
//! Plays the firmware on the device end of an in-memory link so the rig
//! can be driven without hardware. It acknowledges `SET_TEMP`, reports
//! telemetry at a fixed interval, heats toward the target with a simple
//! first-order model (relay on while below target) and honors
//! `SET_SHUTDOWN_TIME` by dropping the target to 0 when the time is up.

use super::Command;
use crate::communication::memory::DeviceEnd;
use crate::control::StopSignal;
use pultrusion_core::{RelayState, StatusUpdate};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// How often telemetry is sent
    pub telemetry_interval: Duration,
    /// Temperature the heater cools toward, °C
    pub ambient_temp: f64,
    /// Temperature the heater approaches at full power, °C
    pub heater_max_temp: f64,
    /// Fraction of the gap to `heater_max_temp` closed per second
    pub heating_rate: f64,
    /// Fraction of the gap to `ambient_temp` closed per second
    pub cooling_rate: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            telemetry_interval: Duration::from_secs(1),
            ambient_temp: 22.0,
            heater_max_temp: 320.0,
            heating_rate: 0.05,
            cooling_rate: 0.02,
        }
    }
}

/// A fake microcontroller behind a [`DeviceEnd`]
pub struct SimulatedDevice {
    device: DeviceEnd,
    config: SimulatorConfig,
    current_temp: f64,
    target_temp: f64,
    relay: RelayState,
    shutdown_at: Option<Instant>,
}

impl SimulatedDevice {
    /// Create a device at ambient temperature with the heater off
    pub fn new(device: DeviceEnd, config: SimulatorConfig) -> Self {
        Self {
            device,
            current_temp: config.ambient_temp,
            target_temp: 0.0,
            relay: RelayState::Off,
            shutdown_at: None,
            config,
        }
    }

    /// Run until the stop signal fires
    pub fn spawn(mut self, mut stop: StopSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.telemetry_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last = Instant::now();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop.stopped() => break,
                }

                for line in self.device.take_lines() {
                    self.handle_line(&line);
                }

                let now = Instant::now();
                if self.shutdown_at.is_some_and(|at| now >= at) {
                    tracing::info!("Simulator: shutdown time reached, heater off");
                    self.shutdown_at = None;
                    self.target_temp = 0.0;
                }

                self.step((now - last).as_secs_f64());
                last = now;
                self.device.push_line(&self.telemetry_line());
            }
            tracing::debug!("Simulator stopped");
        })
    }

    /// Current simulated readings
    pub fn status(&self) -> StatusUpdate {
        StatusUpdate {
            current_temp: self.current_temp,
            set_temp: self.target_temp,
            relay_state: self.relay,
        }
    }

    fn handle_line(&mut self, line: &str) {
        match line.parse::<Command>() {
            Ok(Command::SetTemperature(value)) => {
                self.target_temp = f64::from(value.max(0));
                self.device
                    .push_line(&format!("Set Temperature updated to {}", value));
            }
            Ok(Command::SetShutdownSeconds(seconds)) => {
                self.shutdown_at = Some(Instant::now() + Duration::from_secs(u64::from(seconds)));
                tracing::debug!("Simulator: shutdown armed for {}s", seconds);
            }
            Ok(command) => tracing::debug!("Simulator: {}", command),
            Err(_) => tracing::debug!("Simulator: ignored {:?}", line),
        }
    }

    fn step(&mut self, dt: f64) {
        if self.current_temp < self.target_temp {
            self.relay = RelayState::On;
            let gap = self.config.heater_max_temp - self.current_temp;
            self.current_temp += gap * (self.config.heating_rate * dt).min(1.0);
        } else {
            self.relay = RelayState::Off;
            let gap = self.config.ambient_temp - self.current_temp;
            self.current_temp += gap * (self.config.cooling_rate * dt).min(1.0);
        }
    }

    fn telemetry_line(&self) -> String {
        format!(
            "Current Temperature: {:.1} C | Set Temperature: {:.1} C | SSR State: {}",
            self.current_temp, self.target_temp, self.relay
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::memory::memory_link;
    use crate::control::stop_channel;
    use crate::protocol::{InboundMessage, StatusParser};

    #[test]
    fn test_heats_with_relay_on_then_cools() {
        let (_channel, device) = memory_link("sim");
        let mut sim = SimulatedDevice::new(device, SimulatorConfig::default());
        sim.target_temp = 100.0;

        sim.step(1.0);
        assert_eq!(sim.relay, RelayState::On);
        assert!(sim.current_temp > 22.0);

        sim.target_temp = 0.0;
        let before = sim.current_temp;
        sim.step(1.0);
        assert_eq!(sim.relay, RelayState::Off);
        assert!(sim.current_temp < before);
    }

    #[test]
    fn test_telemetry_line_parses() {
        let (_channel, device) = memory_link("sim");
        let sim = SimulatedDevice::new(device, SimulatorConfig::default());
        let status = StatusParser::parse_status(&sim.telemetry_line()).unwrap();
        assert_eq!(status, sim.status());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledges_set_temp() {
        let (channel, device) = memory_link("sim");
        let (mut rx, mut tx) = channel.split();
        let (stop, signal) = stop_channel();
        let task = SimulatedDevice::new(device, SimulatorConfig::default()).spawn(signal);

        tx.write(Command::SetTemperature(190).to_wire().as_bytes())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        let parser = StatusParser::new();
        let mut acked = false;
        while let Some(line) = rx.poll_line().unwrap() {
            if parser.parse(line.as_str()) == Some(InboundMessage::TemperatureAck(190)) {
                acked = true;
            }
        }
        assert!(acked);

        stop.stop();
        task.await.unwrap();
    }
}
