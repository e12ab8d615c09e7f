use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{FlowControl, Link};

/// A flow-control line shared between the host and the remote end of a socket link.
///
/// Stands in for the RTS/CTS pair of a UART: the host drives it through
/// [`FlowControl`], the remote end samples it with [`FlowLine::is_ready`].
#[derive(Debug, Clone, Default)]
pub struct FlowLine {
    inner: Arc<FlowLineInner>,
}

#[derive(Debug, Default)]
struct FlowLineInner {
    ready: AtomicBool,
    sets: AtomicUsize,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
}

impl FlowLine {
    /// A new line, initially deasserted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the remote is currently allowed to transmit.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Number of times the host drove the line, including no-op writes.
    pub fn set_count(&self) -> usize {
        self.inner.sets.load(Ordering::Acquire)
    }

    /// Number of ready -> not-ready level changes.
    pub fn pauses(&self) -> usize {
        self.inner.pauses.load(Ordering::Acquire)
    }

    /// Number of not-ready -> ready level changes.
    pub fn resumes(&self) -> usize {
        self.inner.resumes.load(Ordering::Acquire)
    }

    fn drive(&self, ready: bool) {
        self.inner.sets.fetch_add(1, Ordering::AcqRel);
        let previous = self.inner.ready.swap(ready, Ordering::AcqRel);
        match (previous, ready) {
            (true, false) => {
                self.inner.pauses.fetch_add(1, Ordering::AcqRel);
            }
            (false, true) => {
                self.inner.resumes.fetch_add(1, Ordering::AcqRel);
            }
            _ => {}
        }
    }
}

impl FlowControl for FlowLine {
    fn set_ready(&mut self, ready: bool) -> Result<()> {
        self.drive(ready);
        Ok(())
    }
}

/// A link over a Unix stream socket with a simulated flow-control line.
///
/// Used for device simulators and for exercising a channel without hardware.
pub struct SocketLink {
    stream: UnixStream,
    line: FlowLine,
    label: String,
}

impl SocketLink {
    /// Create a connected link and the remote end that plays the device.
    pub fn pair() -> Result<(SocketLink, RemoteEnd)> {
        let (host, device) = UnixStream::pair()?;
        let line = FlowLine::new();
        let link = SocketLink {
            stream: host,
            line: line.clone(),
            label: "socket-pair".to_string(),
        };
        Ok((link, RemoteEnd { stream: device, line }))
    }

    /// Connect to a device simulator listening on a Unix socket path.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| TransportError::Open {
            port: path.display().to_string(),
            source: e,
        })?;
        debug!(?path, "connected socket link");
        Ok(Self::from_stream(stream, path.display().to_string()))
    }

    /// Wrap an already connected stream. The flow line is private to this link.
    pub fn from_stream(stream: UnixStream, label: impl Into<String>) -> Self {
        Self {
            stream,
            line: FlowLine::new(),
            label: label.into(),
        }
    }

    /// The flow-control line driven by this link.
    pub fn line(&self) -> FlowLine {
        self.line.clone()
    }
}

impl Read for SocketLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for SocketLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

impl Link for SocketLink {
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.stream
            .set_read_timeout(Some(timeout))
            .map_err(Into::into)
    }

    fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            stream: self.stream.try_clone()?,
            line: self.line.clone(),
            label: self.label.clone(),
        })
    }

    fn flow_control(&self) -> Result<Box<dyn FlowControl>> {
        Ok(Box::new(self.line.clone()))
    }

    fn describe(&self) -> String {
        format!("unix:{}", self.label)
    }
}

impl std::fmt::Debug for SocketLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketLink")
            .field("label", &self.label)
            .field("ready", &self.line.is_ready())
            .finish()
    }
}

/// The device side of a [`SocketLink::pair`].
pub struct RemoteEnd {
    stream: UnixStream,
    line: FlowLine,
}

impl RemoteEnd {
    /// Whether the host currently allows this end to transmit.
    pub fn is_clear_to_send(&self) -> bool {
        self.line.is_ready()
    }

    /// The flow-control line as seen by the device.
    pub fn line(&self) -> &FlowLine {
        &self.line
    }

    /// Bound blocking reads on the device side.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Open a second handle onto the device side.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            stream: self.stream.try_clone()?,
            line: self.line.clone(),
        })
    }

    /// Hang up, which the host observes as end-of-stream.
    pub fn shutdown(&self) -> Result<()> {
        self.stream
            .shutdown(std::net::Shutdown::Both)
            .map_err(Into::into)
    }
}

impl Read for RemoteEnd {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for RemoteEnd {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use super::*;

    #[test]
    fn pair_carries_bytes_both_ways() {
        let (mut link, mut remote) = SocketLink::pair().unwrap();

        link.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        remote.write_all(b"pong").unwrap();
        link.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn flow_line_counts_level_changes_only() {
        let (link, remote) = SocketLink::pair().unwrap();
        let mut flow = link.flow_control().unwrap();

        assert!(!remote.is_clear_to_send());
        flow.set_ready(true).unwrap();
        flow.set_ready(true).unwrap();
        flow.set_ready(false).unwrap();
        flow.set_ready(true).unwrap();

        assert!(remote.is_clear_to_send());
        assert_eq!(remote.line().set_count(), 4);
        assert_eq!(remote.line().pauses(), 1);
        assert_eq!(remote.line().resumes(), 2);
    }

    #[test]
    fn read_timeout_surfaces_as_would_block() {
        let (mut link, _remote) = SocketLink::pair().unwrap();
        link.set_read_timeout(Duration::from_millis(10)).unwrap();

        let mut buf = [0u8; 8];
        let err = link.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut
        ));
    }

    #[test]
    fn clone_shares_stream_and_line() {
        let (link, mut remote) = SocketLink::pair().unwrap();
        let mut clone = link.try_clone().unwrap();

        remote.write_all(b"x").unwrap();
        let mut buf = [0u8; 1];
        clone.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"x");

        clone.flow_control().unwrap().set_ready(true).unwrap();
        assert!(link.line().is_ready());
    }

    #[test]
    fn remote_shutdown_reads_as_eof() {
        let (mut link, remote) = SocketLink::pair().unwrap();
        remote.shutdown().unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(link.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn connect_to_missing_path_is_open_error() {
        let path = std::env::temp_dir().join(format!(
            "cobslink-missing-{}.sock",
            std::process::id()
        ));
        let err = SocketLink::connect(&path).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }

    #[test]
    fn describe_names_the_socket() {
        let (link, _remote) = SocketLink::pair().unwrap();
        assert_eq!(link.describe(), "unix:socket-pair");
    }
}
