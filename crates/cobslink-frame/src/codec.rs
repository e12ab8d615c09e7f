use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::checksum;
use crate::cobs;
use crate::error::{FrameError, Result};
use crate::message::{Message, CHECKSUM_SIZE, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};

/// Largest frame on the wire for a given payload limit, terminator included.
pub const fn max_frame_len(max_payload: usize) -> usize {
    cobs::max_encoded_len(HEADER_SIZE + max_payload + CHECKSUM_SIZE) + 1
}

/// Encode a message into its wire form.
///
/// Wire format:
/// ```text
/// COBS( [id_hi][id_lo|cmd][length][payload..][xor] ) ++ 0x00
/// ```
pub fn encode_frame(message: &Message, dst: &mut BytesMut) {
    let mut packed = BytesMut::with_capacity(message.packed_len());
    message.pack(&mut packed);
    cobs::encode(&packed, dst);
}

/// Frame caller-laid-out header and payload bytes: append the checksum, stuff, terminate.
///
/// The layout is not inspected, so this can carry hand-built commands.
pub fn encode_raw(layout: &[u8], dst: &mut BytesMut) -> Result<()> {
    let max = HEADER_SIZE + DEFAULT_MAX_PAYLOAD;
    if layout.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: layout.len(),
            max,
        });
    }
    let mut packed = BytesMut::with_capacity(layout.len() + CHECKSUM_SIZE);
    packed.put_slice(layout);
    packed.put_u8(checksum(layout));
    cobs::encode(&packed, dst);
    Ok(())
}

/// Decode one frame run (with or without its terminator) into a validated message.
pub fn decode_frame(run: &[u8], max_payload: usize) -> Result<Message> {
    let (raw, _) = cobs::decode(run)?;
    let message = Message::from_packed(Bytes::from(raw))?;
    if message.payload().len() > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: message.payload().len(),
            max: max_payload,
        });
    }
    Ok(message)
}

/// Configuration for the blocking frame reader and writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 255.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl FrameConfig {
    /// Longest frame the reader will buffer before declaring an overflow.
    pub fn max_frame_len(&self) -> usize {
        max_frame_len(self.max_payload_size)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
