// Byte-stream link to the upstream controller
// The command/telemetry protocol runs over any duplex byte stream. Reads
// never wait: they return what is buffered right now, possibly nothing.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serialport::SerialPort;
use tracing::info;

/// Error types for the command link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Duplex line link
pub trait Link {
    /// Read currently available bytes into `buf`, returns 0 when none are pending
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Send one line, the terminator is appended
    fn write_line(&mut self, line: &str) -> Result<()>;
}

/// Serial port link (UART to the upstream controller)
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self> {
        info!("Opening command link on {} @ {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(1))
            .open()?;
        Ok(Self { port })
    }
}

impl Link for SerialLink {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pending = self.port.bytes_to_read()? as usize;
        if pending == 0 || buf.is_empty() {
            return Ok(0);
        }
        let len = pending.min(buf.len());
        match self.port.read(&mut buf[..len]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(LinkError::Io(e)),
        }
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }
}

/// In-memory link for tests and loopback runs
///
/// Clones share the same buffers, so one handle can feed input while the
/// other sits inside the runtime.
#[derive(Clone, Default)]
pub struct MemoryLink {
    inner: Arc<Mutex<MemoryLinkInner>>,
}

#[derive(Default)]
struct MemoryLinkInner {
    inbound: VecDeque<u8>,
    outbound: Vec<String>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryLinkInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue bytes as if they arrived from upstream
    pub fn inject(&self, data: &[u8]) {
        self.lock().inbound.extend(data);
    }

    /// Lines written so far, draining them
    pub fn take_written(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().outbound)
    }
}

impl Link for MemoryLink {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.lock();
        let len = inner.inbound.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(inner.inbound.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        self.lock().outbound.push(line.to_string());
        Ok(())
    }
}
