//! Link layer
//!
//! A `LinkChannel` is the single ordered byte stream to the
//! microcontroller. It is full-duplex: [`LinkChannel::split`] hands the
//! read half to the read task and the write half to the
//! [`CommandDispatcher`], so the two directions run concurrently while
//! each one has exactly one user.
//!
//! Two transports exist: a real serial port ([`serial::open_serial`]) and
//! an in-memory pair ([`memory::memory_link`]) used for tests and the
//! simulated device.

pub mod dispatcher;
pub mod framer;
pub mod memory;
pub mod serial;

pub use dispatcher::CommandDispatcher;
pub use framer::{Line, LineFramer, DEFAULT_MAX_FRAME_LEN};

use pultrusion_core::LinkError;
use std::io::{self, Read, Write};

/// Parameters for opening a serial link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Port name (e.g. "COM3", "/dev/ttyACM0")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds; keeps polls short
    pub read_timeout_ms: u64,
    /// Delay after opening before the device accepts commands
    pub settle_ms: u64,
    /// Framing limit for inbound lines
    pub max_frame_len: usize,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 9600,
            read_timeout_ms: 10,
            settle_ms: 2000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ConnectionParams {
    /// Parameters for a port with default settings
    pub fn for_port(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }
}

/// Readable half of a transport
pub trait LinkRead: Read + Send {}
impl<T: Read + Send> LinkRead for T {}

/// Writable half of a transport
pub trait LinkWrite: Write + Send {}
impl<T: Write + Send> LinkWrite for T {}

/// Inbound half: raw reads plus line framing
pub struct LinkRx {
    name: String,
    reader: Box<dyn LinkRead>,
    framer: LineFramer,
    read_buf: Vec<u8>,
    ready: std::collections::VecDeque<Line>,
}

impl LinkRx {
    /// Return the next complete line, reading from the transport only when
    /// no framed line is waiting. Reads continue while bytes keep arriving
    /// without completing a line; an idle transport returns `None` after
    /// at most one read timeout.
    pub fn poll_line(&mut self) -> Result<Option<Line>, LinkError> {
        while self.ready.is_empty() {
            let count = match self.reader.read(&mut self.read_buf) {
                Ok(count) => count,
                Err(e) if is_idle(&e) => 0,
                Err(e) => {
                    return Err(LinkError::ReadFailed {
                        reason: e.to_string(),
                    })
                }
            };

            if count == 0 {
                break;
            }

            match self.framer.feed(&self.read_buf[..count]) {
                Ok(lines) => self.ready.extend(lines),
                Err(e) => {
                    tracing::warn!("{}: {}; resynchronizing", self.name, e);
                    self.ready.extend(self.framer.take_ready());
                }
            }
        }

        Ok(self.ready.pop_front())
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outbound half
pub struct LinkTx {
    name: String,
    writer: Box<dyn LinkWrite>,
}

impl LinkTx {
    /// Write all bytes and flush. Best effort: no retry on failure.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.writer
            .write_all(bytes)
            .and_then(|_| self.writer.flush())
            .map_err(|e| LinkError::WriteFailed {
                reason: e.to_string(),
            })
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A connected byte stream to the device
pub struct LinkChannel {
    rx: LinkRx,
    tx: LinkTx,
}

impl LinkChannel {
    /// Build a channel from separate read and write handles
    pub fn new(
        name: impl Into<String>,
        reader: Box<dyn LinkRead>,
        writer: Box<dyn LinkWrite>,
        max_frame_len: usize,
    ) -> Self {
        let name = name.into();
        Self {
            rx: LinkRx {
                name: name.clone(),
                reader,
                framer: LineFramer::with_max_len(max_frame_len),
                read_buf: vec![0u8; 256],
                ready: std::collections::VecDeque::new(),
            },
            tx: LinkTx { name, writer },
        }
    }

    /// Port name
    pub fn name(&self) -> &str {
        self.tx.name()
    }

    /// Write raw bytes
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.tx.write(bytes)
    }

    /// Next complete inbound line, if any
    pub fn poll_line(&mut self) -> Result<Option<Line>, LinkError> {
        self.rx.poll_line()
    }

    /// Separate the read and write halves
    pub fn split(self) -> (LinkRx, LinkTx) {
        (self.rx, self.tx)
    }
}

impl std::fmt::Debug for LinkChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkChannel")
            .field("name", &self.name())
            .finish()
    }
}

fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
