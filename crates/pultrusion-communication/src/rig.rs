//! Rig session
//!
//! `Rig` wires one link to the controls and owns every background task:
//!
//! - the read task, sole owner of the inbound half of the link, which
//!   frames and parses lines and publishes them on the event bus
//! - one debounce task per actuator
//! - the temperature acknowledgment waiters and the shutdown countdown,
//!   spawned on demand
//!
//! [`Rig::shutdown`] stops all of them, waits for each to exit and only
//! then releases the link.

use crate::communication::serial::open_serial;
use crate::communication::{CommandDispatcher, ConnectionParams, LinkChannel, LinkRx};
use crate::control::{
    stop_channel, DebouncedControl, ShutdownState, ShutdownTimer, StopHandle,
    StopSignal, TemperatureRequest, TemperatureSetter, TemperatureState,
};
use crate::protocol::{Command, InboundMessage, StatusParser};
use parking_lot::RwLock;
use pultrusion_core::{
    Actuator, ConnectionEvent, ControlError, ControlEvent, DeviceEvent, EventBus, EventFilter,
    EventStream, FilamentPreset, LinkError, RigEvent, StatusStream, StatusUpdate,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Intervals used by the session tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RigTimings {
    /// Read task polling interval
    pub poll_interval: Duration,
    /// Debounce window for speed sliders
    pub debounce: Duration,
    /// How long a temperature request waits for its acknowledgment
    pub ack_timeout: Duration,
    /// Countdown tick
    pub countdown_tick: Duration,
}

impl Default for RigTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            debounce: Duration::from_millis(200),
            ack_timeout: Duration::from_secs(5),
            countdown_tick: Duration::from_secs(1),
        }
    }
}

/// Initial operator-facing values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RigDefaults {
    /// Fan slider
    pub fan_speed: u8,
    /// Winder slider
    pub winder_speed: u8,
    /// Desired temperature display
    pub desired_temperature: i32,
    /// Filament presets available to [`Rig::apply_preset`]
    pub presets: Vec<FilamentPreset>,
}

impl Default for RigDefaults {
    fn default() -> Self {
        Self {
            fan_speed: 50,
            winder_speed: 50,
            desired_temperature: 100,
            presets: FilamentPreset::defaults(),
        }
    }
}

/// Result of [`Rig::apply_preset`]
#[derive(Debug)]
pub struct PresetOutcome {
    /// The preset that was applied
    pub preset: FilamentPreset,
    /// What became of the temperature request
    pub temperature: Result<TemperatureRequest, ControlError>,
    /// PWM written to the fan
    pub fan_pwm: u8,
    /// PWM written to the winder
    pub winder_pwm: u8,
}

/// A connected pultrusion rig
pub struct Rig {
    port: String,
    bus: Arc<EventBus>,
    dispatcher: Arc<CommandDispatcher>,
    fan: Arc<DebouncedControl>,
    winder: Arc<DebouncedControl>,
    temperature: Arc<TemperatureSetter>,
    shutdown_timer: Arc<ShutdownTimer>,
    latest: Arc<RwLock<Option<StatusUpdate>>>,
    presets: Vec<FilamentPreset>,
    stop: StopHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl Rig {
    /// Open the serial port and start a session.
    ///
    /// Waits `settle_ms` after opening; the microcontroller resets when the
    /// port opens and ignores commands until it is back up.
    pub async fn connect(
        params: &ConnectionParams,
        timings: RigTimings,
        defaults: RigDefaults,
    ) -> Result<Self, LinkError> {
        let link = open_serial(params)?;
        tokio::time::sleep(Duration::from_millis(params.settle_ms)).await;
        Ok(Self::with_link(link, timings, defaults))
    }

    /// Start a session on an already open link
    pub fn with_link(link: LinkChannel, timings: RigTimings, defaults: RigDefaults) -> Self {
        let port = link.name().to_string();
        let bus = Arc::new(EventBus::new());
        let (rx, tx) = link.split();
        let dispatcher = Arc::new(CommandDispatcher::new(tx, bus.clone()));
        let (stop, signal) = stop_channel();

        let fan = Arc::new(DebouncedControl::new(
            Actuator::Fan,
            defaults.fan_speed,
            timings.debounce,
            dispatcher.clone(),
        ));
        let winder = Arc::new(DebouncedControl::new(
            Actuator::Winder,
            defaults.winder_speed,
            timings.debounce,
            dispatcher.clone(),
        ));
        let temperature = Arc::new(TemperatureSetter::new(
            dispatcher.clone(),
            defaults.desired_temperature,
            timings.ack_timeout,
            signal.clone(),
        ));
        let shutdown_timer = Arc::new(ShutdownTimer::new(
            dispatcher.clone(),
            timings.countdown_tick,
            fan.clone(),
            winder.clone(),
            temperature.clone(),
            signal.clone(),
        ));

        let latest = Arc::new(RwLock::new(None));
        let tasks = vec![
            tokio::spawn(read_loop(
                rx,
                bus.clone(),
                latest.clone(),
                timings.poll_interval,
                signal.clone(),
            )),
            fan.spawn(signal.clone()),
            winder.spawn(signal),
        ];

        tracing::info!("Rig session started on {}", port);
        bus.publish(RigEvent::Connection(ConnectionEvent::Connected {
            port: port.clone(),
        }))
        .ok();

        Self {
            port,
            bus,
            dispatcher,
            fan,
            winder,
            temperature,
            shutdown_timer,
            latest,
            presets: defaults.presets,
            stop,
            tasks,
        }
    }

    /// Move the fan slider (debounced)
    pub fn submit_fan_speed(&self, value: u32) -> Result<(), ControlError> {
        self.fan.set(value)
    }

    /// Move the winder slider (debounced)
    pub fn submit_winder_speed(&self, value: u32) -> Result<(), ControlError> {
        self.winder.set(value)
    }

    /// Write the fan's current slider value now. Returns the PWM sent.
    pub fn apply_fan_speed(&self) -> Result<u8, ControlError> {
        self.fan.apply_now()
    }

    /// Write the winder's current slider value now. Returns the PWM sent.
    pub fn apply_winder_speed(&self) -> Result<u8, ControlError> {
        self.winder.apply_now()
    }

    /// Request a heater target
    pub fn request_temperature(&self, value: i32) -> Result<TemperatureRequest, ControlError> {
        self.temperature.request(value)
    }

    /// Start the shutdown countdown. Returns its length in seconds.
    pub fn start_shutdown(&self, minutes: u32) -> Result<u32, ControlError> {
        self.shutdown_timer.start(minutes)
    }

    /// Cancel a running countdown
    pub fn cancel_shutdown(&self) -> bool {
        self.shutdown_timer.cancel()
    }

    /// Trigger the ejection action
    pub fn eject(&self) -> Result<(), ControlError> {
        self.send_bare(Command::Eject)
    }

    /// Switch an actuator output on or off
    pub fn set_actuator_power(&self, actuator: Actuator, on: bool) -> Result<(), ControlError> {
        self.send_bare(Command::power(actuator, on))
    }

    /// Apply a filament preset by name (case-insensitive).
    ///
    /// Requests the preset temperature, then writes both speeds at once.
    /// The speeds are applied whatever happens to the temperature request;
    /// its outcome is returned in [`PresetOutcome::temperature`].
    pub fn apply_preset(&self, name: &str) -> Result<PresetOutcome, ControlError> {
        let preset = self
            .preset(name)
            .cloned()
            .ok_or_else(|| ControlError::UnknownPreset {
                name: name.to_string(),
            })?;

        let temperature = self.temperature.request(preset.temperature);
        if let Err(e) = &temperature {
            tracing::warn!("{} preset: temperature not sent: {}", preset.name, e);
        }
        let fan_pwm = self.fan.apply_value(u32::from(preset.fan_speed))?;
        let winder_pwm = self.winder.apply_value(u32::from(preset.spool_speed))?;

        tracing::info!("Applied {} preset", preset.name);
        Ok(PresetOutcome {
            preset,
            temperature,
            fan_pwm,
            winder_pwm,
        })
    }

    /// Look up a preset by name (case-insensitive)
    pub fn preset(&self, name: &str) -> Option<&FilamentPreset> {
        self.presets
            .iter()
            .find(|preset| preset.name.eq_ignore_ascii_case(name))
    }

    /// Available presets
    pub fn presets(&self) -> &[FilamentPreset] {
        &self.presets
    }

    /// Telemetry updates as they arrive
    pub fn subscribe_status(&self) -> StatusStream {
        self.bus.status_stream()
    }

    /// Events the session publishes, narrowed by `filter`
    pub fn events(&self, filter: EventFilter) -> EventStream {
        self.bus.subscribe(filter)
    }

    /// Most recent telemetry, if any arrived yet
    pub fn latest_status(&self) -> Option<StatusUpdate> {
        *self.latest.read()
    }

    /// The session's event bus
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Port name of the link
    pub fn port_name(&self) -> &str {
        &self.port
    }

    /// Fan slider display value
    pub fn fan_speed(&self) -> u8 {
        self.fan.value()
    }

    /// Winder slider display value
    pub fn winder_speed(&self) -> u8 {
        self.winder.value()
    }

    /// Desired temperature display value
    pub fn desired_temperature(&self) -> i32 {
        self.temperature.desired()
    }

    /// Temperature setter state
    pub fn temperature_state(&self) -> TemperatureState {
        self.temperature.state()
    }

    /// Shutdown countdown state
    pub fn shutdown_state(&self) -> ShutdownState {
        self.shutdown_timer.state()
    }

    /// Stop every task, wait for them, then release the link
    pub async fn shutdown(self) {
        tracing::info!("Shutting down rig session on {}", self.port);
        self.stop.stop();

        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Session task failed: {}", e);
            }
        }
        self.temperature.join().await;
        self.shutdown_timer.join().await;

        self.dispatcher.close();
        self.bus
            .publish(RigEvent::Connection(ConnectionEvent::Disconnected {
                port: self.port.clone(),
            }))
            .ok();
        tracing::info!("Disconnected from {}", self.port);
    }

    fn send_bare(&self, command: Command) -> Result<(), ControlError> {
        self.dispatcher.submit(&command)?;
        self.bus
            .publish(RigEvent::Control(ControlEvent::CommandSent {
                command: command.text(),
            }))
            .ok();
        Ok(())
    }
}

impl std::fmt::Debug for Rig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rig")
            .field("port", &self.port)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

async fn read_loop(
    mut rx: LinkRx,
    bus: Arc<EventBus>,
    latest: Arc<RwLock<Option<StatusUpdate>>>,
    poll_interval: Duration,
    mut stop: StopSignal,
) {
    let parser = StatusParser::new();
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut read_failing = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.stopped() => break,
        }

        loop {
            match rx.poll_line() {
                Ok(Some(line)) => {
                    read_failing = false;
                    tracing::trace!("<- {}", line);
                    match parser.parse(line.as_str()) {
                        Some(InboundMessage::Status(status)) => {
                            *latest.write() = Some(status);
                            bus.publish(RigEvent::Device(DeviceEvent::Status(status)))
                                .ok();
                        }
                        Some(message @ InboundMessage::TemperatureAck(value)) => {
                            tracing::info!("Device confirmed set temperature {}", value);
                            bus.publish(RigEvent::Device(message.into())).ok();
                        }
                        None => tracing::trace!("Ignored line: {}", line),
                    }
                }
                Ok(None) => {
                    read_failing = false;
                    break;
                }
                Err(e) => {
                    if !read_failing {
                        tracing::warn!("Read from {} failed: {}", rx.name(), e);
                        bus.publish(RigEvent::Connection(ConnectionEvent::ReadFailed {
                            error: e.to_string(),
                        }))
                        .ok();
                        read_failing = true;
                    }
                    break;
                }
            }
        }
    }
    tracing::debug!("Read task for {} stopped", rx.name());
}
