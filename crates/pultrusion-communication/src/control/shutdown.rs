//! Shutdown countdown
//!
//! States: `Idle -> Running -> Idle`.
//!
//! Starting the timer writes `SET_SHUTDOWN_TIME:<seconds>` once; the device
//! powers down on its own when that time is up. The host side only mirrors
//! the countdown: it ticks once per interval and, on reaching zero, resets
//! the operator displays (both speeds and the desired temperature) to 0
//! without sending anything else.

use super::{DebouncedControl, StopSignal, TemperatureSetter};
use crate::communication::CommandDispatcher;
use crate::protocol::Command;
use parking_lot::Mutex;
use pultrusion_core::{ControlError, ControlEvent, RigEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shutdown timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// No countdown
    Idle,
    /// Counting down
    Running {
        /// Seconds left
        remaining_seconds: u32,
    },
}

/// Countdown to the device's autonomous shutdown
pub struct ShutdownTimer {
    dispatcher: Arc<CommandDispatcher>,
    tick: Duration,
    remaining: Mutex<Option<u32>>,
    task: Mutex<Option<JoinHandle<()>>>,
    fan: Arc<DebouncedControl>,
    winder: Arc<DebouncedControl>,
    temperature: Arc<TemperatureSetter>,
    stop: StopSignal,
}

impl ShutdownTimer {
    /// Create an idle timer
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        tick: Duration,
        fan: Arc<DebouncedControl>,
        winder: Arc<DebouncedControl>,
        temperature: Arc<TemperatureSetter>,
        stop: StopSignal,
    ) -> Self {
        Self {
            dispatcher,
            tick,
            remaining: Mutex::new(None),
            task: Mutex::new(None),
            fan,
            winder,
            temperature,
            stop,
        }
    }

    /// Start a countdown of `minutes`. Returns the countdown length in
    /// seconds.
    ///
    /// The timer runs even if the device command could not be written.
    pub fn start(self: &Arc<Self>, minutes: u32) -> Result<u32, ControlError> {
        if minutes == 0 {
            return Err(ControlError::InvalidDuration { minutes });
        }
        let seconds = minutes.saturating_mul(60);
        let bus = self.dispatcher.bus();

        {
            let mut remaining = self.remaining.lock();
            if let Some(remaining_seconds) = *remaining {
                tracing::warn!(
                    "Shutdown request ignored, a timer is already running ({}s remaining)",
                    remaining_seconds
                );
                bus.publish(RigEvent::Control(ControlEvent::ShutdownRejected {
                    remaining_seconds,
                }))
                .ok();
                return Err(ControlError::ShutdownAlreadyRunning { remaining_seconds });
            }
            *remaining = Some(seconds);
        }

        if let Err(e) = self
            .dispatcher
            .submit(&Command::SetShutdownSeconds(seconds))
        {
            tracing::warn!("Shutdown time not delivered to device: {}", e);
        }

        tracing::info!("Shutdown timer started: {} minute(s)", minutes);
        bus.publish(RigEvent::Control(ControlEvent::ShutdownStarted { seconds }))
            .ok();

        let timer = Arc::clone(self);
        let handle = tokio::spawn(async move { timer.run().await });
        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }

        Ok(seconds)
    }

    /// Stop the countdown without telling the device.
    ///
    /// Returns false if no countdown was running.
    pub fn cancel(&self) -> bool {
        let Some(remaining_seconds) = self.remaining.lock().take() else {
            return false;
        };
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }

        tracing::info!("Shutdown timer cancelled ({}s remaining)", remaining_seconds);
        self.dispatcher
            .bus()
            .publish(RigEvent::Control(ControlEvent::ShutdownCancelled {
                remaining_seconds,
            }))
            .ok();
        true
    }

    /// Current state
    pub fn state(&self) -> ShutdownState {
        match *self.remaining.lock() {
            Some(remaining_seconds) => ShutdownState::Running { remaining_seconds },
            None => ShutdownState::Idle,
        }
    }

    /// Seconds left, if running
    pub fn remaining(&self) -> Option<u32> {
        *self.remaining.lock()
    }

    /// Wait for the countdown task to exit
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::warn!("Shutdown timer task failed: {}", e),
            }
        }
    }

    async fn run(&self) {
        let mut stop = self.stop.clone();
        let start = tokio::time::Instant::now() + self.tick;
        let mut ticker = tokio::time::interval_at(start, self.tick);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.stopped() => return,
            }

            let remaining_seconds = {
                let mut remaining = self.remaining.lock();
                let Some(current) = *remaining else {
                    return;
                };
                let next = current.saturating_sub(1);
                *remaining = (next > 0).then_some(next);
                next
            };

            self.dispatcher
                .bus()
                .publish(RigEvent::Control(ControlEvent::ShutdownTick {
                    remaining_seconds,
                }))
                .ok();

            if remaining_seconds == 0 {
                self.expire();
                return;
            }
        }
    }

    fn expire(&self) {
        self.temperature.reset_desired(0);
        self.fan.reset_display(0);
        self.winder.reset_display(0);

        tracing::info!("Shutdown timer expired, all systems turned off");
        self.dispatcher
            .bus()
            .publish(RigEvent::Control(ControlEvent::ShutdownExpired))
            .ok();
    }
}

impl std::fmt::Debug for ShutdownTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownTimer")
            .field("tick", &self.tick)
            .field("state", &self.state())
            .finish()
    }
}
