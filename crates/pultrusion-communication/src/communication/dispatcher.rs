//! Serialized command writer
//!
//! Every producer (debouncers, temperature setter, shutdown timer, direct
//! UI actions) sends through one `CommandDispatcher`. The write half of the
//! link sits behind a mutex so one command line is written in full before
//! the next starts; lines never interleave on the wire.
//!
//! Sending is fire-and-forget. A failed write is logged, published as a
//! `WriteFailed` event and returned to the caller; the command is not
//! retried.

use super::LinkTx;
use crate::protocol::Command;
use parking_lot::Mutex;
use pultrusion_core::{ConnectionEvent, EventBus, LinkError, RigEvent};
use std::sync::Arc;

/// Single writer for the link
pub struct CommandDispatcher {
    port: String,
    writer: Mutex<Option<LinkTx>>,
    bus: Arc<EventBus>,
}

impl CommandDispatcher {
    /// Wrap the write half of a link
    pub fn new(tx: LinkTx, bus: Arc<EventBus>) -> Self {
        Self {
            port: tx.name().to_string(),
            writer: Mutex::new(Some(tx)),
            bus,
        }
    }

    /// Write one command line.
    pub fn submit(&self, command: &Command) -> Result<(), LinkError> {
        let wire = command.to_wire();

        let result = {
            let mut guard = self.writer.lock();
            match guard.as_mut() {
                Some(tx) => tx.write(wire.as_bytes()),
                None => Err(LinkError::Closed),
            }
        };

        match &result {
            Ok(()) => tracing::debug!("Sent to {}: {}", self.port, command),
            Err(LinkError::Closed) => {
                tracing::debug!("Dropped {} on closed link {}", command, self.port)
            }
            Err(e) => {
                tracing::warn!("Failed to send {} to {}: {}", command, self.port, e);
                self.bus
                    .publish(RigEvent::Connection(ConnectionEvent::WriteFailed {
                        command: command.text(),
                        error: e.to_string(),
                    }))
                    .ok();
            }
        }

        result
    }

    /// Release the write half. Later submits return `LinkError::Closed`.
    pub fn close(&self) -> bool {
        let was_open = self.writer.lock().take().is_some();
        if was_open {
            tracing::debug!("Writer for {} closed", self.port);
        }
        was_open
    }

    /// Check if the writer is still held
    pub fn is_open(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Port name of the link
    pub fn port_name(&self) -> &str {
        &self.port
    }

    /// Event bus shared with the controls
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("port", &self.port)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::memory::memory_link;
    use pultrusion_core::{EventCategory, EventFilter};

    fn dispatcher() -> (CommandDispatcher, crate::communication::memory::DeviceEnd) {
        let (channel, device) = memory_link("mem");
        let (_rx, tx) = channel.split();
        (CommandDispatcher::new(tx, Arc::new(EventBus::new())), device)
    }

    #[test]
    fn test_submit_writes_wire_line() {
        let (dispatcher, device) = dispatcher();
        dispatcher.submit(&Command::SetTemperature(190)).unwrap();
        dispatcher.submit(&Command::Eject).unwrap();
        assert_eq!(device.take_lines(), vec!["SET_TEMP:190", "EJECT"]);
    }

    #[test]
    fn test_write_failure_is_published() {
        let (dispatcher, device) = dispatcher();
        let mut events = dispatcher
            .bus()
            .subscribe(EventFilter::Categories(vec![EventCategory::Connection]));

        device.set_fail_writes(true);
        let err = dispatcher.submit(&Command::FanOn).unwrap_err();
        assert!(matches!(err, LinkError::WriteFailed { .. }));
        assert!(matches!(
            events.try_next(),
            Some(RigEvent::Connection(ConnectionEvent::WriteFailed { .. }))
        ));
        assert!(events.try_next().is_none());

        // The link is still usable once the device recovers.
        device.set_fail_writes(false);
        dispatcher.submit(&Command::FanOff).unwrap();
        assert_eq!(device.take_lines(), vec!["FAN_OFF"]);
    }

    #[test]
    fn test_closed_dispatcher_rejects() {
        let (dispatcher, device) = dispatcher();
        assert!(dispatcher.close());
        assert!(!dispatcher.is_open());
        assert!(!dispatcher.close());
        assert_eq!(
            dispatcher.submit(&Command::Eject).unwrap_err(),
            LinkError::Closed
        );
        assert!(device.take_written().is_empty());
    }
}
