//! Flow-controlled message channel over a COBS-framed link.
//!
//! This is the "just works" layer. Open a channel on a link, register a
//! handler, write messages. Framing, checksums, resynchronisation and the
//! hardware flow-control line are handled underneath.

pub mod channel;
pub mod config;
pub mod error;
pub mod handler;
pub mod stats;
mod units;

pub use channel::{Channel, ChannelState};
pub use config::{ChannelConfig, DEFAULT_READ_CHUNK, DEFAULT_READ_TIMEOUT};
pub use error::{ChannelError, Result};
pub use handler::MessageHandler;
pub use stats::StatsSnapshot;
