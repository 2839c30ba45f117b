//! Debounced actuator control
//!
//! A slider can move hundreds of times a second while it is dragged. The
//! control keeps only the newest value and commits it once the debounce
//! window has passed since the first unsent change. Values in between are
//! overwritten, never queued.

use super::pwm::{slider_to_pwm, validate_slider};
use super::StopSignal;
use crate::communication::CommandDispatcher;
use crate::protocol::Command;
use parking_lot::Mutex;
use pultrusion_core::{Actuator, ControlError, ControlEvent, RigEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct DebounceState {
    /// Value shown to the operator
    value: u8,
    /// Newest value not yet written
    pending: Option<u8>,
    /// Last slider value that reached the device
    last_committed: Option<u8>,
}

/// Throttled speed control for one actuator
pub struct DebouncedControl {
    actuator: Actuator,
    window: Duration,
    state: Mutex<DebounceState>,
    /// Held from choosing a value until it is written, so writes land in
    /// the order their values were chosen
    commit_guard: Mutex<()>,
    wake: Notify,
    dispatcher: Arc<CommandDispatcher>,
}

impl DebouncedControl {
    /// Create a control with an initial display value
    pub fn new(
        actuator: Actuator,
        initial: u8,
        window: Duration,
        dispatcher: Arc<CommandDispatcher>,
    ) -> Self {
        Self {
            actuator,
            window,
            state: Mutex::new(DebounceState {
                value: initial.min(100),
                pending: None,
                last_committed: None,
            }),
            commit_guard: Mutex::new(()),
            wake: Notify::new(),
            dispatcher,
        }
    }

    /// Record a slider movement. The write happens later, from the task.
    pub fn set(&self, value: u32) -> Result<(), ControlError> {
        let slider = validate_slider(value)?;
        {
            let mut state = self.state.lock();
            state.value = slider;
            state.pending = Some(slider);
        }
        self.wake.notify_one();
        Ok(())
    }

    /// Write the current value immediately, bypassing the window.
    ///
    /// Returns the PWM that was sent.
    pub fn apply_now(&self) -> Result<u8, ControlError> {
        let _guard = self.commit_guard.lock();
        let slider = {
            let mut state = self.state.lock();
            state.pending = None;
            state.value
        };
        self.commit(slider)
    }

    /// Set the display to `value` and write it immediately
    pub fn apply_value(&self, value: u32) -> Result<u8, ControlError> {
        let slider = validate_slider(value)?;
        let _guard = self.commit_guard.lock();
        {
            let mut state = self.state.lock();
            state.value = slider;
            state.pending = None;
        }
        self.commit(slider)
    }

    /// Change the display without writing anything to the device
    pub fn reset_display(&self, slider: u8) {
        let slider = slider.min(100);
        {
            let _guard = self.commit_guard.lock();
            let mut state = self.state.lock();
            state.value = slider;
            state.pending = None;
        }
        self.dispatcher
            .bus()
            .publish(RigEvent::Control(ControlEvent::SpeedReset {
                actuator: self.actuator,
                slider,
            }))
            .ok();
    }

    /// Current display value
    pub fn value(&self) -> u8 {
        self.state.lock().value
    }

    /// Last value written to the device
    pub fn last_committed(&self) -> Option<u8> {
        self.state.lock().last_committed
    }

    /// Which actuator this control drives
    pub fn actuator(&self) -> Actuator {
        self.actuator
    }

    /// Start the throttling task
    pub fn spawn(self: &Arc<Self>, mut stop: StopSignal) -> JoinHandle<()> {
        let control = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = control.wake.notified() => {}
                    _ = stop.stopped() => break,
                }

                tokio::select! {
                    _ = tokio::time::sleep(control.window) => {}
                    _ = stop.stopped() => break,
                }

                {
                    let _guard = control.commit_guard.lock();
                    let pending = control.state.lock().pending.take();
                    if let Some(slider) = pending {
                        // Failures are already logged and published by the dispatcher.
                        control.commit(slider).ok();
                    }
                }
            }
            tracing::debug!("{} debounce task stopped", control.actuator);
        })
    }

    fn commit(&self, slider: u8) -> Result<u8, ControlError> {
        let pwm = slider_to_pwm(slider);
        self.dispatcher
            .submit(&Command::set_pwm(self.actuator, pwm))?;

        self.state.lock().last_committed = Some(slider);
        self.dispatcher
            .bus()
            .publish(RigEvent::Control(ControlEvent::SpeedCommitted {
                actuator: self.actuator,
                slider,
                pwm,
            }))
            .ok();
        Ok(pwm)
    }
}

impl std::fmt::Debug for DebouncedControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedControl")
            .field("actuator", &self.actuator)
            .field("window", &self.window)
            .field("state", &*self.state.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::memory::{memory_link, DeviceEnd};
    use crate::control::stop_channel;
    use pultrusion_core::EventBus;

    fn control(actuator: Actuator) -> (Arc<DebouncedControl>, DeviceEnd) {
        let (channel, device) = memory_link("mem");
        let (_rx, tx) = channel.split();
        let dispatcher = Arc::new(CommandDispatcher::new(tx, Arc::new(EventBus::new())));
        let control = Arc::new(DebouncedControl::new(
            actuator,
            50,
            Duration::from_millis(200),
            dispatcher,
        ));
        (control, device)
    }

    #[test]
    fn test_apply_now_bypasses_window() {
        let (control, device) = control(Actuator::Fan);
        assert_eq!(control.apply_now().unwrap(), 128);
        assert_eq!(device.take_lines(), vec!["SET_FAN_PWM:128"]);
        assert_eq!(control.last_committed(), Some(50));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let (control, _device) = control(Actuator::Winder);
        assert_eq!(
            control.set(101),
            Err(ControlError::InvalidSpeed { value: 101 })
        );
        assert_eq!(control.value(), 50);
    }

    #[test]
    fn test_reset_display_sends_nothing() {
        let (control, device) = control(Actuator::Winder);
        control.set(80).unwrap();
        control.reset_display(0);
        assert_eq!(control.value(), 0);
        assert!(device.take_written().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_immediate_apply_is_never_overwritten_by_older_value() {
        let (channel, device) = memory_link("mem");
        let (_rx, tx) = channel.split();
        let dispatcher = Arc::new(CommandDispatcher::new(tx, Arc::new(EventBus::new())));
        let control = Arc::new(DebouncedControl::new(
            Actuator::Fan,
            50,
            Duration::from_millis(1),
            dispatcher,
        ));
        let (handle, signal) = stop_channel();
        let task = control.spawn(signal);

        for _ in 0..50 {
            control.set(10).unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;

            let applier = Arc::clone(&control);
            tokio::task::spawn_blocking(move || applier.apply_value(90))
                .await
                .unwrap()
                .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;

            let lines = device.take_lines();
            assert_eq!(lines.last().map(String::as_str), Some("SET_FAN_PWM:26"));
            assert_eq!(control.last_committed(), Some(90));
        }

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_value_dropped_on_stop() {
        let (control, device) = control(Actuator::Fan);
        let (handle, signal) = stop_channel();
        let task = control.spawn(signal);

        control.set(10).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
        task.await.unwrap();

        assert!(device.take_written().is_empty());
    }
}
