//! Physical link abstraction for talking to an embedded controller.
//!
//! A [`Link`] is a blocking byte pipe with a bounded read timeout and a
//! separately drivable hardware flow-control line:
//! - serial ports (behind the `serial` feature)
//! - Unix socket pairs with a simulated flow line, for simulators and tests
//!
//! This is the lowest layer of cobslink. Framing and the channel build on it.

pub mod error;
pub mod traits;

#[cfg(feature = "serial")]
pub mod serial;
#[cfg(unix)]
pub mod socket;

pub use error::{Result, TransportError};
pub use traits::{FlowControl, Link};

#[cfg(feature = "serial")]
pub use serial::{
    SerialConfig, SerialLink, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT, DEFAULT_WRITE_TIMEOUT,
};
#[cfg(unix)]
pub use socket::{FlowLine, RemoteEnd, SocketLink};
