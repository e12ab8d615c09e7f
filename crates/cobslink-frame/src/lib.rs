//! COBS framing, checksummed message layout and flow-controlled intake.
//!
//! Every message travels as:
//! - A 3-byte header: 11-bit id, 5-bit command, 1-byte payload length
//! - Up to 255 payload bytes
//! - A 1-byte XOR checksum over header and payload
//!
//! The packed bytes are COBS-stuffed and terminated by a single zero byte,
//! so a receiver resynchronises at the next zero after any corruption.

pub mod checksum;
pub mod cobs;
pub mod codec;
#[cfg(feature = "async")]
pub mod codec_async;
pub mod command;
pub mod error;
pub mod flow;
pub mod intake;
pub mod message;
pub mod reader;
pub mod writer;

pub use checksum::checksum;
pub use codec::{decode_frame, encode_frame, encode_raw, max_frame_len, FrameConfig};
#[cfg(feature = "async")]
pub use codec_async::MessageCodec;
pub use command::{command_name, AnalogReading, KeyEvent, StatisticsEntry, TaskStatus};
pub use error::{FrameError, Result};
pub use flow::{FlowController, FlowState};
pub use intake::{AppendOutcome, Drained, IntakeBuffer, IntakeConfig};
pub use message::{Message, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAX_ID};
pub use reader::FrameReader;
pub use writer::FrameWriter;
