use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use tracing::{debug, info, trace};

use crate::error::{Result, TransportError};
use crate::traits::{FlowControl, Link};

/// Default line speed of the controller's UART.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default bound on a single blocking read.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Default bound on a write held back by the remote's flow-control line.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Serial port settings. Framing is always 8N1 with hardware flow control.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// OS path of the port, e.g. `/dev/ttyACM0` or `COM3`.
    pub port: String,
    /// Line speed in baud.
    pub baud_rate: u32,
    /// Read timeout applied when the port is opened.
    pub timeout: Duration,
    /// How long a write may wait for CTS before it fails with `TimedOut`.
    ///
    /// The port has a single OS timeout shared by reads and writes, so a
    /// write that stalls is retried until this much time has passed.
    pub write_timeout: Duration,
}

impl SerialConfig {
    /// Settings for `port` with the default speed and timeout.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// A UART link backed by the `serialport` crate.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    name: String,
    baud_rate: u32,
    write_timeout: Duration,
}

impl SerialLink {
    /// Open and configure the port described by `config`.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(serialport::FlowControl::Hardware)
            .timeout(config.timeout)
            .open()
            .map_err(|e| TransportError::Open {
                port: config.port.clone(),
                source: e.into(),
            })?;

        info!(port = %config.port, baud = config.baud_rate, "serial port opened");

        Ok(Self {
            port,
            name: config.port.clone(),
            baud_rate: config.baud_rate,
            write_timeout: config.write_timeout,
        })
    }

    /// Configured line speed.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let deadline = Instant::now() + self.write_timeout;
        loop {
            match self.port.write(buf) {
                Err(err) if err.kind() == ErrorKind::TimedOut && Instant::now() < deadline => {
                    trace!(port = %self.name, "write held back by flow control");
                }
                result => return result,
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port.flush()
    }
}

impl Link for SerialLink {
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| TransportError::Io(e.into()))
    }

    fn try_clone(&self) -> Result<Self> {
        let port = self
            .port
            .try_clone()
            .map_err(|e| TransportError::Io(e.into()))?;
        Ok(Self {
            port,
            name: self.name.clone(),
            baud_rate: self.baud_rate,
            write_timeout: self.write_timeout,
        })
    }

    fn flow_control(&self) -> Result<Box<dyn FlowControl>> {
        let port = self
            .port
            .try_clone()
            .map_err(|e| TransportError::Io(e.into()))?;
        Ok(Box::new(RtsLine { port }))
    }

    fn discard_buffers(&mut self) -> Result<()> {
        self.port
            .clear(ClearBuffer::All)
            .map_err(|e| TransportError::Io(e.into()))?;
        debug!(port = %self.name, "discarded pending serial buffers");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("serial:{}@{}", self.name, self.baud_rate)
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("port", &self.name)
            .field("baud_rate", &self.baud_rate)
            .finish()
    }
}

/// Request-to-send line on a cloned port handle.
struct RtsLine {
    port: Box<dyn SerialPort>,
}

impl FlowControl for RtsLine {
    fn set_ready(&mut self, ready: bool) -> Result<()> {
        self.port
            .write_request_to_send(ready)
            .map_err(|e| TransportError::Io(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_controller() {
        let cfg = SerialConfig::new("/dev/ttyACM0");
        assert_eq!(cfg.port, "/dev/ttyACM0");
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.timeout, Duration::from_millis(100));
        assert_eq!(cfg.write_timeout, Duration::from_secs(1));
    }

    #[test]
    fn opening_missing_port_reports_port_name() {
        let cfg = SerialConfig::new("/dev/cobslink-does-not-exist");
        let err = SerialLink::open(&cfg).unwrap_err();
        match err {
            TransportError::Open { port, .. } => assert_eq!(port, "/dev/cobslink-does-not-exist"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
