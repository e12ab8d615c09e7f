//! `tokio_util::codec` adapter for async links.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::cobs::TERMINATOR;
use crate::codec::{decode_frame, encode_frame, max_frame_len};
use crate::error::FrameError;
use crate::message::{Message, DEFAULT_MAX_PAYLOAD};

/// Message codec for `FramedRead` / `FramedWrite`.
///
/// Frames that fail to decode are logged and skipped so one bad frame does
/// not end the stream. Only I/O errors are returned from the decoder.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_payload: usize,
    resync: bool,
    dropped: u64,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload,
            resync: false,
            dropped: 0,
        }
    }

    /// Frames skipped because they failed to decode.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.resync {
                match src.iter().position(|&b| b == TERMINATOR) {
                    Some(pos) => {
                        src.advance(pos + 1);
                        self.resync = false;
                    }
                    None => {
                        src.clear();
                        return Ok(None);
                    }
                }
            }

            let Some(pos) = src.iter().position(|&b| b == TERMINATOR) else {
                if src.len() > max_frame_len(self.max_payload) {
                    warn!(buffered = src.len(), "unterminated run exceeds frame limit, resyncing");
                    self.dropped += 1;
                    src.clear();
                    self.resync = true;
                }
                return Ok(None);
            };

            let run = src.split_to(pos + 1);
            if pos == 0 {
                continue;
            }

            match decode_frame(&run[..pos], self.max_payload) {
                Ok(message) => return Ok(Some(message)),
                Err(err) if err.is_per_frame() => {
                    warn!(error = %err, "dropping undecodable frame");
                    self.dropped += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.payload().len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: item.payload().len(),
                max: self.max_payload,
            });
        }
        encode_frame(&item, dst);
        Ok(())
    }
}
