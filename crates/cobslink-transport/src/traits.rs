use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Host side of a hardware flow-control line (RTS on a UART).
///
/// A `FlowControl` handle is independent of the data path, so it can be
/// driven from a thread that does not own the read or write half of a link.
pub trait FlowControl: Send {
    /// Drive the line. `true` tells the remote it may transmit,
    /// `false` asks it to pause.
    fn set_ready(&mut self, ready: bool) -> Result<()>;
}

/// A physical byte link to the remote controller.
///
/// Reads are blocking but bounded by the read timeout; a read that times out
/// returns an error of kind `TimedOut` or `WouldBlock` and is not a failure.
/// A read that returns `Ok(0)` means the remote end is gone.
pub trait Link: Read + Write + Send + 'static {
    /// Bound every subsequent blocking read by `timeout`.
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Open a second handle onto the same link.
    ///
    /// Used to give the reader its own handle while writes stay on the original.
    fn try_clone(&self) -> Result<Self>
    where
        Self: Sized;

    /// Obtain a handle that drives this link's flow-control line.
    fn flow_control(&self) -> Result<Box<dyn FlowControl>>;

    /// Drop anything the OS has buffered in either direction.
    fn discard_buffers(&mut self) -> Result<()> {
        Ok(())
    }

    /// Human readable link description for logs.
    fn describe(&self) -> String;
}
