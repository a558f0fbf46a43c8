//! The byte-stream contract the acquisition core needs, and its serial-port
//! implementation.
//!
//! The core only ever does three things with a sensor link:
//!
//! 1. drain whatever bytes are already buffered (non-blocking),
//! 2. write a short command,
//! 3. read up to N bytes, waiting at most a bounded time.
//!
//! [`ByteStream`] captures exactly that, so a real [`SerialStream`], the
//! [`crate::simulator::SimulatedSensor`], and test doubles are interchangeable.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use log::{debug, info};
use serialport::SerialPort;
use thiserror::Error;

use crate::protocol::{DEFAULT_BAUD_RATE, RESPONSE_TIMEOUT};

// ── Errors ───────────────────────────────────────────────────────────────────

/// A failure of the link itself (as opposed to bad data on it).
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("could not open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },
}

// ── Contract ─────────────────────────────────────────────────────────────────

/// Minimum serial-port contract used by [`crate::channel::SensorChannel`].
pub trait ByteStream {
    /// Return every byte currently buffered, possibly none.  Never waits.
    fn read_available(&mut self) -> Result<Vec<u8>, StreamError>;

    /// Write all of `bytes`.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), StreamError>;

    /// Read until `n` bytes have arrived or `timeout` has elapsed.
    ///
    /// A short result is not an error: it means the peer went quiet.
    fn read_with_timeout(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, StreamError>;
}

impl<S: ByteStream + ?Sized> ByteStream for Box<S> {
    fn read_available(&mut self) -> Result<Vec<u8>, StreamError> {
        (**self).read_available()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        (**self).write_all(bytes)
    }

    fn read_with_timeout(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, StreamError> {
        (**self).read_with_timeout(n, timeout)
    }
}

// ── Serial port ──────────────────────────────────────────────────────────────

/// Line settings for [`SerialStream::open`].
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Default: `115200`.
    pub baud_rate: u32,
    /// Port-level read timeout.  Bounds every blocking read so a silent
    /// sensor cannot stall the tick loop.  Default: 100 ms.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: RESPONSE_TIMEOUT,
        }
    }
}

/// A sensor attached over a serial port.
pub struct SerialStream {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialStream {
    /// Open `path` with the given line settings.
    pub fn open(path: &str, config: &SerialConfig) -> Result<Self, StreamError> {
        let port = serialport::new(path, config.baud_rate)
            .timeout(config.timeout)
            .open()
            .map_err(|source| StreamError::Open {
                path: path.to_owned(),
                source,
            })?;
        info!("Opened {path} at {} baud", config.baud_rate);
        Ok(Self {
            port,
            timeout: config.timeout,
        })
    }
}

impl ByteStream for SerialStream {
    fn read_available(&mut self) -> Result<Vec<u8>, StreamError> {
        let pending = self.port.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; pending];
        match self.port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        Write::write_all(&mut self.port, bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_with_timeout(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, StreamError> {
        if timeout != self.timeout {
            self.port.set_timeout(timeout)?;
            self.timeout = timeout;
        }
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; n];
        let mut got = 0;
        while got < n {
            match self.port.read(&mut buf[got..]) {
                Ok(0) => break,
                Ok(k) => got += k,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        buf.truncate(got);
        Ok(buf)
    }
}

// ── Discovery ────────────────────────────────────────────────────────────────

/// List the serial ports present on this machine, in the order the OS
/// reports them.
pub fn discover_ports() -> Result<Vec<String>, StreamError> {
    let ports: Vec<String> = serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect();
    debug!("discover_ports: {ports:?}");
    Ok(ports)
}
