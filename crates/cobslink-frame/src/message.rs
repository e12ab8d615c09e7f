use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::checksum::checksum;
use crate::error::{FrameError, Result};

/// Header: id/command (2) + length (1) = 3 bytes.
pub const HEADER_SIZE: usize = 3;

/// Trailing XOR checksum.
pub const CHECKSUM_SIZE: usize = 1;

/// Largest 11-bit identifier.
pub const MAX_ID: u16 = 0x07FF;

/// Command bits of the second header byte.
pub const COMMAND_MASK: u8 = 0x1F;

/// The length field is one byte wide.
pub const DEFAULT_MAX_PAYLOAD: usize = u8::MAX as usize;

const COMMAND_BITS: u32 = 5;

/// Command carried in the second header byte. Independent of the id bits.
pub fn extract_command(byte1: u8) -> u8 {
    byte1 & COMMAND_MASK
}

/// Identifier spread over both header bytes.
pub fn extract_id(byte0: u8, byte1: u8) -> u16 {
    (u16::from(byte0) << 3) | u16::from(byte1 >> COMMAND_BITS)
}

/// Pack id and command into the two leading header bytes.
///
/// ```text
/// byte0: id[10..3]
/// byte1: id[2..0] << 5 | command[4..0]
/// ```
pub fn pack_header(id: u16, command: u8) -> [u8; 2] {
    [
        (id >> 3) as u8,
        (((id & 0x07) as u8) << COMMAND_BITS) | (command & COMMAND_MASK),
    ]
}

/// One application-level message. Immutable once built.
///
/// Wire layout before stuffing:
/// ```text
/// ┌─────────┬──────────────┬────────┬─────────────────┬──────────┐
/// │ id_hi   │ id_lo | cmd  │ length │ payload         │ checksum │
/// │ (1B)    │ (1B)         │ (1B)   │ (length bytes)  │ (1B XOR) │
/// └─────────┴──────────────┴────────┴─────────────────┴──────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: u16,
    command: u8,
    payload: Bytes,
}

impl Message {
    /// Build a message, checking that every field fits its wire slot.
    pub fn new(id: u16, command: u8, payload: impl Into<Bytes>) -> Result<Self> {
        if id > MAX_ID {
            return Err(FrameError::InvalidIdentifier(id));
        }
        if command > COMMAND_MASK {
            return Err(FrameError::InvalidCommand(command));
        }
        let payload = payload.into();
        if payload.len() > DEFAULT_MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: DEFAULT_MAX_PAYLOAD,
            });
        }
        Ok(Self {
            id,
            command,
            payload,
        })
    }

    /// Message / source identifier (11 bits).
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Operation selector (5 bits).
    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload byte count as carried in the length field.
    pub fn length(&self) -> u8 {
        self.payload.len() as u8
    }

    /// XOR of the header and payload exactly as transmitted.
    pub fn checksum(&self) -> u8 {
        let header = pack_header(self.id, self.command);
        checksum(&header) ^ self.length() ^ checksum(&self.payload)
    }

    /// Size of the packed form, checksum included.
    pub fn packed_len(&self) -> usize {
        HEADER_SIZE + self.payload.len() + CHECKSUM_SIZE
    }

    /// Append header, payload and checksum to `dst`.
    pub fn pack(&self, dst: &mut BytesMut) {
        dst.reserve(self.packed_len());
        dst.put_slice(&pack_header(self.id, self.command));
        dst.put_u8(self.length());
        dst.put_slice(&self.payload);
        dst.put_u8(self.checksum());
    }

    /// Packed form as an owned vector.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut dst = BytesMut::with_capacity(self.packed_len());
        self.pack(&mut dst);
        dst.to_vec()
    }

    /// Parse a packed run, verifying its trailing checksum.
    pub fn unpack(raw: &[u8]) -> Result<Self> {
        Self::from_packed(Bytes::copy_from_slice(raw))
    }

    /// Parse a packed run without copying the payload.
    ///
    /// The checksum is checked first, so any corruption of the header or
    /// payload reports [`FrameError::ChecksumMismatch`]. A run whose checksum
    /// holds but whose length field overstates the payload is
    /// [`FrameError::TruncatedMessage`]. Surplus bytes after the declared
    /// payload are ignored.
    pub fn from_packed(raw: Bytes) -> Result<Self> {
        let available = raw.len().saturating_sub(HEADER_SIZE + CHECKSUM_SIZE);
        if raw.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(FrameError::TruncatedMessage {
                declared: raw.get(2).map_or(0, |&len| usize::from(len)),
                available,
            });
        }

        let (body, trailer) = raw.split_at(raw.len() - CHECKSUM_SIZE);
        let expected = checksum(body);
        if expected != trailer[0] {
            return Err(FrameError::ChecksumMismatch {
                expected,
                actual: trailer[0],
            });
        }

        let declared = usize::from(raw[2]);
        if declared > available {
            return Err(FrameError::TruncatedMessage {
                declared,
                available,
            });
        }
        if available > declared {
            trace!(declared, available, "ignoring surplus bytes after payload");
        }

        Ok(Self {
            id: extract_id(raw[0], raw[1]),
            command: extract_command(raw[1]),
            payload: raw.slice(HEADER_SIZE..HEADER_SIZE + declared),
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::checksum::verify;
    use crate::command::ECHO;

    #[test]
    fn packs_documented_layout() {
        let msg = Message::new(1, ECHO, vec![0x01, 0x02, 0x03]).unwrap();
        assert_eq!(
            msg.to_packed(),
            vec![0x00, 0x34, 0x03, 0x01, 0x02, 0x03, 0x37]
        );
        assert_eq!(msg.length(), 3);
        assert_eq!(msg.checksum(), 0x37);
    }

    #[test]
    fn header_spreads_id_over_both_bytes() {
        assert_eq!(pack_header(0x7FF, 0x1F), [0xFF, 0xFF]);
        assert_eq!(pack_header(0x400, 0), [0x80, 0x00]);
        assert_eq!(pack_header(0x007, 0), [0x00, 0xE0]);
        assert_eq!(extract_id(0x80, 0x00), 0x400);
        assert_eq!(extract_id(0x00, 0xE0), 0x007);
    }

    #[test]
    fn unpack_recovers_fields() {
        let msg = Message::new(0x2A5, 23, vec![9, 8, 7, 6, 5]).unwrap();
        let back = Message::unpack(&msg.to_packed()).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.id(), 0x2A5);
        assert_eq!(back.command(), 23);
    }

    #[test]
    fn empty_payload() {
        let msg = Message::new(5, 4, Vec::new()).unwrap();
        let packed = msg.to_packed();
        assert_eq!(packed.len(), HEADER_SIZE + CHECKSUM_SIZE);
        assert_eq!(Message::unpack(&packed).unwrap(), msg);
    }

    #[test]
    fn rejects_out_of_range_fields() {
        assert!(matches!(
            Message::new(0x800, 1, Vec::new()),
            Err(FrameError::InvalidIdentifier(0x800))
        ));
        assert!(matches!(
            Message::new(1, 32, Vec::new()),
            Err(FrameError::InvalidCommand(32))
        ));
        assert!(matches!(
            Message::new(1, 1, vec![0u8; 256]),
            Err(FrameError::PayloadTooLarge { size: 256, max: 255 })
        ));
    }

    #[test]
    fn checksum_mismatch_is_reported() {
        let mut packed = Message::new(1, ECHO, vec![1, 2, 3]).unwrap().to_packed();
        let last = packed.len() - 1;
        packed[last] ^= 0xFF;
        assert!(matches!(
            Message::unpack(&packed),
            Err(FrameError::ChecksumMismatch { expected: 0x37, actual: 0xC8 })
        ));
    }

    #[test]
    fn overstated_length_is_truncated() {
        // length says 5, only 2 payload bytes present; checksum is valid.
        let mut raw = vec![0x00, 0x34, 0x05, 0xAA, 0xBB];
        raw.push(checksum(&raw));
        assert!(matches!(
            Message::unpack(&raw),
            Err(FrameError::TruncatedMessage {
                declared: 5,
                available: 2
            })
        ));
    }

    #[test]
    fn runs_shorter_than_header_are_truncated() {
        assert!(matches!(
            Message::unpack(&[0x00, 0x34]),
            Err(FrameError::TruncatedMessage { .. })
        ));
        assert!(matches!(
            Message::unpack(&[]),
            Err(FrameError::TruncatedMessage { declared: 0, available: 0 })
        ));
    }

    #[test]
    fn surplus_bytes_are_ignored() {
        let mut raw = vec![0x00, 0x34, 0x01, 0xAA, 0xBB];
        raw.push(checksum(&raw));
        let msg = Message::unpack(&raw).unwrap();
        assert_eq!(msg.payload().as_ref(), &[0xAA]);
    }

    proptest! {
        #[test]
        fn command_extraction_ignores_id_bits(byte1 in any::<u8>()) {
            prop_assert_eq!(extract_command(byte1), byte1 & 0x1F);
        }

        #[test]
        fn header_roundtrips(id in 0u16..=MAX_ID, command in 0u8..=COMMAND_MASK) {
            let [b0, b1] = pack_header(id, command);
            prop_assert_eq!(extract_id(b0, b1), id);
            prop_assert_eq!(extract_command(b1), command);
        }

        #[test]
        fn any_bit_flip_is_detected(id in 0u16..=MAX_ID,
                                    command in 0u8..=COMMAND_MASK,
                                    payload in prop::collection::vec(any::<u8>(), 0..32),
                                    index in any::<prop::sample::Index>(),
                                    bit in 0u8..8) {
            let msg = Message::new(id, command, payload).unwrap();
            let mut packed = msg.to_packed();
            let i = index.index(packed.len() - CHECKSUM_SIZE);
            packed[i] ^= 1 << bit;
            prop_assert!(!verify(&packed));
            let rejected = matches!(Message::unpack(&packed), Err(FrameError::ChecksumMismatch { .. }));
            prop_assert!(rejected);
        }
    }
}
