//! Acknowledgment-gated temperature requests
//!
//! States: `Idle -> AwaitingAck -> Idle`.
//!
//! A request writes `SET_TEMP:<v>` once and then waits, in its own task,
//! for the device to answer `Set Temperature updated to <v>`. The wait
//! listens on the event bus; it never touches the link. Only one request
//! can be in flight. Asking again for the value already in flight is a
//! silent no-op, asking for a different one is refused.
//!
//! Both outcomes (confirmation or timeout) forget the requested value, so
//! the same temperature can be sent again right after.

use super::StopSignal;
use crate::communication::CommandDispatcher;
use crate::protocol::Command;
use parking_lot::Mutex;
use pultrusion_core::{
    ControlError, ControlEvent, DeviceEvent, EventCategory, EventFilter, EventStream, LinkError,
    RigEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// The request currently waiting for its acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAck {
    /// Value the device must confirm
    pub expected_temp: i32,
    /// When the wait gives up
    pub deadline: Instant,
}

/// Temperature setter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureState {
    /// Ready for a new request
    Idle,
    /// A request was written and is waiting for confirmation
    AwaitingAck(PendingAck),
}

/// Outcome of [`TemperatureSetter::request`]
#[derive(Debug)]
pub enum TemperatureRequest {
    /// The command was written; the handle resolves with the outcome
    Sent(AckHandle),
    /// The same value is already in flight; nothing was written
    AlreadySet,
}

/// Resolves once a sent request is confirmed or given up on
#[derive(Debug)]
pub struct AckHandle {
    expected: i32,
    outcome: oneshot::Receiver<Result<i32, ControlError>>,
}

impl AckHandle {
    /// Value that was requested
    pub fn expected(&self) -> i32 {
        self.expected
    }

    /// Wait for the confirmation.
    ///
    /// Returns the confirmed value, `AckTimeout` when the window passed,
    /// or `Link(Closed)` when the session stopped first.
    pub async fn wait(self) -> Result<i32, ControlError> {
        self.outcome
            .await
            .unwrap_or(Err(ControlError::Link(LinkError::Closed)))
    }
}

#[derive(Debug)]
struct SetterState {
    last_requested: Option<i32>,
    pending: Option<PendingAck>,
    desired: i32,
}

enum AckOutcome {
    Confirmed,
    TimedOut,
    Stopped,
}

/// Sends temperature requests and tracks their acknowledgment
pub struct TemperatureSetter {
    dispatcher: Arc<CommandDispatcher>,
    ack_timeout: Duration,
    state: Mutex<SetterState>,
    stop: StopSignal,
    waiters: Mutex<Vec<JoinHandle<()>>>,
}

impl TemperatureSetter {
    /// Create a setter with the initial desired-temperature display value
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        desired: i32,
        ack_timeout: Duration,
        stop: StopSignal,
    ) -> Self {
        Self {
            dispatcher,
            ack_timeout,
            state: Mutex::new(SetterState {
                last_requested: None,
                pending: None,
                desired,
            }),
            stop,
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Request a new target temperature.
    pub fn request(self: &Arc<Self>, value: i32) -> Result<TemperatureRequest, ControlError> {
        let bus = Arc::clone(self.dispatcher.bus());

        let (events, deadline) = {
            let mut state = self.state.lock();
            if let Some(pending) = state.pending {
                if pending.expected_temp != value {
                    return Err(ControlError::TemperatureBusy {
                        pending: pending.expected_temp,
                    });
                }
            }
            if state.last_requested == Some(value) {
                tracing::debug!("Temperature {} already requested", value);
                return Ok(TemperatureRequest::AlreadySet);
            }

            // Subscribe before writing so a fast acknowledgment is not missed.
            let events =
                bus.subscribe(EventFilter::Categories(vec![EventCategory::Device]));
            let deadline = Instant::now() + self.ack_timeout;
            state.last_requested = Some(value);
            state.pending = Some(PendingAck {
                expected_temp: value,
                deadline,
            });
            state.desired = value;
            (events, deadline)
        };

        if let Err(e) = self.dispatcher.submit(&Command::SetTemperature(value)) {
            self.clear_if_pending(value);
            return Err(e.into());
        }

        tracing::info!("Requested temperature {}°C", value);
        bus.publish(RigEvent::Control(ControlEvent::TemperatureRequested { value }))
            .ok();

        let (reply, outcome) = oneshot::channel();
        let setter = Arc::clone(self);
        let waiter = tokio::spawn(async move {
            setter.await_ack(events, value, deadline, reply).await;
        });

        let mut waiters = self.waiters.lock();
        waiters.retain(|handle| !handle.is_finished());
        waiters.push(waiter);

        Ok(TemperatureRequest::Sent(AckHandle {
            expected: value,
            outcome,
        }))
    }

    /// Change the desired-temperature display without writing anything
    pub fn reset_desired(&self, value: i32) {
        self.state.lock().desired = value;
        self.dispatcher
            .bus()
            .publish(RigEvent::Control(ControlEvent::DesiredTemperatureReset {
                value,
            }))
            .ok();
    }

    /// Desired temperature shown to the operator
    pub fn desired(&self) -> i32 {
        self.state.lock().desired
    }

    /// Current state
    pub fn state(&self) -> TemperatureState {
        match self.state.lock().pending {
            Some(pending) => TemperatureState::AwaitingAck(pending),
            None => TemperatureState::Idle,
        }
    }

    /// The request in flight, if any
    pub fn pending(&self) -> Option<PendingAck> {
        self.state.lock().pending
    }

    /// Wait for every acknowledgment task to finish
    pub async fn join(&self) {
        let waiters = std::mem::take(&mut *self.waiters.lock());
        for waiter in waiters {
            if let Err(e) = waiter.await {
                tracing::warn!("Acknowledgment task failed: {}", e);
            }
        }
    }

    async fn await_ack(
        &self,
        mut events: EventStream,
        expected: i32,
        deadline: Instant,
        reply: oneshot::Sender<Result<i32, ControlError>>,
    ) {
        let mut stop = self.stop.clone();
        let outcome = tokio::select! {
            confirmed = tokio::time::timeout_at(deadline, wait_for_ack(&mut events, expected)) => {
                match confirmed {
                    Ok(true) => AckOutcome::Confirmed,
                    Ok(false) => AckOutcome::Stopped,
                    Err(_) => AckOutcome::TimedOut,
                }
            }
            _ = stop.stopped() => AckOutcome::Stopped,
        };

        self.clear_if_pending(expected);
        let bus = self.dispatcher.bus();

        let result = match outcome {
            AckOutcome::Confirmed => {
                tracing::info!("Temperature {}°C confirmed by device", expected);
                bus.publish(RigEvent::Control(ControlEvent::TemperatureConfirmed {
                    value: expected,
                }))
                .ok();
                Ok(expected)
            }
            AckOutcome::TimedOut => {
                tracing::warn!(
                    "No acknowledgment for temperature {} within {}ms",
                    expected,
                    self.ack_timeout.as_millis()
                );
                bus.publish(RigEvent::Control(ControlEvent::TemperatureTimedOut {
                    value: expected,
                }))
                .ok();
                Err(ControlError::AckTimeout {
                    expected,
                    timeout_ms: self.ack_timeout.as_millis() as u64,
                })
            }
            AckOutcome::Stopped => {
                tracing::debug!("Stopped waiting for temperature {}", expected);
                Err(ControlError::Link(LinkError::Closed))
            }
        };

        // The caller may have dropped its handle.
        reply.send(result).ok();
    }

    fn clear_if_pending(&self, expected: i32) {
        let mut state = self.state.lock();
        if state.pending.map(|p| p.expected_temp) == Some(expected) {
            state.pending = None;
            state.last_requested = None;
        }
    }
}

impl std::fmt::Debug for TemperatureSetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemperatureSetter")
            .field("ack_timeout", &self.ack_timeout)
            .field("state", &*self.state.lock())
            .finish()
    }
}

/// Resolve `true` on the matching acknowledgment, `false` if the bus closed
async fn wait_for_ack(events: &mut EventStream, expected: i32) -> bool {
    while let Some(event) = events.next().await {
        if let RigEvent::Device(DeviceEvent::TemperatureAck { value }) = event {
            if value == expected {
                return true;
            }
            tracing::debug!(
                "Ignoring acknowledgment for {} while waiting for {}",
                value,
                expected
            );
        }
    }
    false
}
