//! Event Bus implementation.
//!
//! One bus instance is created per rig session and shared by handle.
//! Producers publish without knowing who listens; the read task, the
//! temperature acknowledgment waiter and the UI all receive from the same
//! broadcast channel.

use tokio::sync::broadcast;

use super::events::{EventCategory, RigEvent};
use crate::data::StatusUpdate;

/// Filter to receive only specific event types
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Receive all events.
    #[default]
    All,
    /// Receive events matching any of these categories.
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    /// Check if an event matches this filter
    pub fn matches(&self, event: &RigEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
        }
    }
}

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for broadcast.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Error types for event bus operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventBusError {
    /// No subscribers are listening
    #[error("No active subscribers")]
    NoSubscribers,
}

/// Event bus for one rig session
pub struct EventBus {
    sender: broadcast::Sender<RigEvent>,
    config: EventBusConfig,
}

impl EventBus {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);
        Self { sender, config }
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of subscribers that will see the event.
    /// Having nobody listening is reported but harmless; most callers
    /// discard the result.
    pub fn publish(&self, event: RigEvent) -> Result<usize, EventBusError> {
        self.sender
            .send(event)
            .map_err(|_| EventBusError::NoSubscribers)
    }

    /// Subscribe to the events matching `filter`.
    ///
    /// Only events published after this call are seen.
    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    /// Stream of telemetry only
    pub fn status_stream(&self) -> StatusStream {
        StatusStream {
            events: self.subscribe(EventFilter::Categories(vec![EventCategory::Device])),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("config", &self.config)
            .finish()
    }
}

/// Filtered receiver of rig events.
///
/// A slow consumer that falls behind skips the events it missed; the next
/// call returns the oldest one still buffered.
pub struct EventStream {
    receiver: broadcast::Receiver<RigEvent>,
    filter: EventFilter,
}

impl EventStream {
    /// Wait for the next matching event. Returns `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<RigEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event stream lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already buffered, without waiting
    pub fn try_next(&mut self) -> Option<RigEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::debug!("Event stream lagged, {} events skipped", skipped);
                }
                Err(_) => return None,
            }
        }
    }

    /// The filter this stream applies
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

/// Receiver that yields only `StatusUpdate`s.
pub struct StatusStream {
    events: EventStream,
}

impl StatusStream {
    /// Wait for the next status update. Returns `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<StatusUpdate> {
        loop {
            let event = self.events.next().await?;
            if let Some(status) = event.as_status() {
                return Some(*status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RelayState;
    use crate::event_bus::events::{ConnectionEvent, ControlEvent, DeviceEvent};

    fn status(temp: f64) -> StatusUpdate {
        StatusUpdate {
            current_temp: temp,
            set_temp: 100.0,
            relay_state: RelayState::On,
        }
    }

    #[test]
    fn test_subscriber_count_follows_streams() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);

        let stream = bus.subscribe(EventFilter::All);
        let status = bus.status_stream();
        assert_eq!(bus.subscriber_count(), 2);

        drop(stream);
        drop(status);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_publish_without_listeners() {
        let bus = EventBus::new();
        let result = bus.publish(RigEvent::Control(ControlEvent::ShutdownExpired));
        assert!(matches!(result, Err(EventBusError::NoSubscribers)));
    }

    #[test]
    fn test_event_filtering() {
        let bus = EventBus::new();
        let mut device = bus.subscribe(EventFilter::Categories(vec![EventCategory::Device]));
        let mut control = bus.subscribe(EventFilter::Categories(vec![EventCategory::Control]));
        let mut all = bus.subscribe(EventFilter::All);

        bus.publish(RigEvent::Device(DeviceEvent::Status(status(20.0))))
            .ok();
        bus.publish(RigEvent::Connection(ConnectionEvent::Connected {
            port: "sim".to_string(),
        }))
        .ok();

        assert!(matches!(device.try_next(), Some(RigEvent::Device(_))));
        assert!(device.try_next().is_none());
        assert!(control.try_next().is_none());
        assert!(all.try_next().is_some());
        assert!(matches!(all.try_next(), Some(RigEvent::Connection(_))));
    }

    #[tokio::test]
    async fn test_status_stream_skips_other_events() {
        let bus = EventBus::new();
        let mut stream = bus.status_stream();

        bus.publish(RigEvent::Device(DeviceEvent::TemperatureAck { value: 100 }))
            .ok();
        bus.publish(RigEvent::Device(DeviceEvent::Status(status(42.0))))
            .ok();

        let received = stream.next().await.unwrap();
        assert_eq!(received.current_temp, 42.0);
    }

    #[tokio::test]
    async fn test_status_stream_survives_lag() {
        let bus = EventBus::with_config(EventBusConfig {
            channel_capacity: 2,
        });
        let mut stream = bus.status_stream();

        for i in 0..5 {
            bus.publish(RigEvent::Device(DeviceEvent::Status(status(i as f64))))
                .ok();
        }

        let received = stream.next().await.unwrap();
        assert_eq!(received.current_temp, 3.0);
    }

    #[tokio::test]
    async fn test_status_stream_ends_with_bus() {
        let bus = EventBus::new();
        let mut stream = bus.status_stream();
        drop(bus);
        assert!(stream.next().await.is_none());
    }
}
