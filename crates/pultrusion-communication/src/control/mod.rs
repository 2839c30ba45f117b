//! Command-producing controls
//!
//! - [`DebouncedControl`]: fan and winder sliders, coalesced to one PWM
//!   command per window
//! - [`TemperatureSetter`]: acknowledgment-gated temperature requests
//! - [`ShutdownTimer`]: countdown to the device's autonomous shutdown
//!
//! Each control owns its state and runs its own task. All of them write
//! through the shared [`CommandDispatcher`](crate::communication::CommandDispatcher)
//! and stop when the session's [`StopSignal`] fires.

pub mod debounce;
pub mod pwm;
pub mod shutdown;
pub mod temperature;

pub use debounce::DebouncedControl;
pub use pwm::{slider_to_pwm, validate_slider, PWM_MAX, PWM_MIN, SLIDER_MAX};
pub use shutdown::{ShutdownState, ShutdownTimer};
pub use temperature::{AckHandle, PendingAck, TemperatureRequest, TemperatureSetter, TemperatureState};

use tokio::sync::watch;

/// Create a linked stop handle and signal
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle(tx), StopSignal(rx))
}

/// Sending side of the session stop signal
#[derive(Debug)]
pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    /// Ask every task holding a signal to exit
    pub fn stop(&self) {
        self.0.send_replace(true);
    }

    /// Another receiver for the same signal
    pub fn signal(&self) -> StopSignal {
        StopSignal(self.0.subscribe())
    }
}

/// Receiving side of the session stop signal
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    /// Check without waiting
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once stop was requested or the handle was dropped
    pub async fn stopped(&mut self) {
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_reaches_every_signal() {
        let (handle, mut first) = stop_channel();
        let mut second = handle.signal();
        assert!(!first.is_stopped());

        handle.stop();
        first.stopped().await;
        second.stopped().await;
        assert!(second.is_stopped());
    }

    #[tokio::test]
    async fn test_dropped_handle_counts_as_stop() {
        let (handle, mut signal) = stop_channel();
        drop(handle);
        signal.stopped().await;
    }
}
