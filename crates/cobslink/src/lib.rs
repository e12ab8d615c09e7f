//! Host-side serial transport for embedded controllers.
//!
//! cobslink moves small command messages between a host and a
//! microcontroller over a UART: COBS framing, an XOR checksum per message,
//! a bounded intake buffer and watermark-driven hardware flow control.
//!
//! # Crate Structure
//!
//! - [`transport`]: Physical links (serial ports, socket pairs) and the flow-control line
//! - [`frame`]: Checksum, COBS codec, message layout, intake buffer and flow controller
//! - [`channel`]: Channel lifecycle with reader/processor threads (behind `channel` feature)

/// Re-export transport types.
pub mod transport {
    pub use cobslink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use cobslink_frame::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use cobslink_channel::*;
}
