//! In-memory link
//!
//! A loopback transport with a device-side handle. The host side is an
//! ordinary [`LinkChannel`]; the [`DeviceEnd`] plays the microcontroller:
//! it injects inbound bytes and sees everything the host wrote.

use super::{LinkChannel, DEFAULT_MAX_FRAME_LEN};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Shared {
    to_host: Mutex<VecDeque<u8>>,
    from_host: Mutex<Vec<u8>>,
    fail_writes: AtomicBool,
}

/// Device side of an in-memory link
#[derive(Clone)]
pub struct DeviceEnd {
    shared: Arc<Shared>,
}

impl DeviceEnd {
    /// Queue raw bytes for the host to read
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.shared.to_host.lock().extend(bytes.iter().copied());
    }

    /// Queue one line (a `\r\n` terminator is appended)
    pub fn push_line(&self, line: &str) {
        let mut queue = self.shared.to_host.lock();
        queue.extend(line.bytes());
        queue.extend(b"\r\n".iter().copied());
    }

    /// Take everything the host has written so far
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut *self.shared.from_host.lock())
    }

    /// Take what the host wrote, split into complete lines.
    ///
    /// A trailing partial line stays buffered.
    pub fn take_lines(&self) -> Vec<String> {
        let mut written = self.shared.from_host.lock();
        let Some(end) = written.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = written.drain(..=end).collect();
        String::from_utf8_lossy(&complete)
            .split('\n')
            .filter(|line| !line.is_empty())
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect()
    }

    /// Make host writes fail (simulates an unplugged cable)
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }
}

struct HostReader {
    shared: Arc<Shared>,
}

impl Read for HostReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = self.shared.to_host.lock();
        let count = buf.len().min(queue.len());
        for (slot, byte) in buf.iter_mut().zip(queue.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

struct HostWriter {
    shared: Arc<Shared>,
}

impl Write for HostWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        self.shared.from_host.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Create a connected host channel and device handle
pub fn memory_link(name: impl Into<String>) -> (LinkChannel, DeviceEnd) {
    let shared = Arc::new(Shared::default());
    let channel = LinkChannel::new(
        name,
        Box::new(HostReader {
            shared: shared.clone(),
        }),
        Box::new(HostWriter {
            shared: shared.clone(),
        }),
        DEFAULT_MAX_FRAME_LEN,
    );
    (channel, DeviceEnd { shared })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::Line;
    use pultrusion_core::LinkError;

    #[test]
    fn test_round_trip() {
        let (mut channel, device) = memory_link("mem");

        device.push_line("Set Temperature updated to 190");
        assert_eq!(
            channel.poll_line().unwrap(),
            Some(Line::new("Set Temperature updated to 190"))
        );

        channel.write(b"SET_TEMP:190\r\n").unwrap();
        assert_eq!(device.take_lines(), vec!["SET_TEMP:190".to_string()]);
        assert!(device.take_written().is_empty());
    }

    #[test]
    fn test_partial_written_line_stays() {
        let (mut channel, device) = memory_link("mem");
        channel.write(b"EJECT\r\nSET_FA").unwrap();
        assert_eq!(device.take_lines(), vec!["EJECT".to_string()]);
        assert_eq!(device.take_written(), b"SET_FA".to_vec());
    }

    #[test]
    fn test_forced_write_failure() {
        let (mut channel, device) = memory_link("mem");
        device.set_fail_writes(true);
        assert!(matches!(
            channel.write(b"EJECT\r\n"),
            Err(LinkError::WriteFailed { .. })
        ));
    }
}
