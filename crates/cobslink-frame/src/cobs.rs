//! Consistent Overhead Byte Stuffing.
//!
//! Encoded output never contains [`TERMINATOR`] except as the single trailing
//! delimiter, so a receiver can split the byte stream on zero bytes alone.
//!
//! ```text
//! data:    11 22 00 33
//! encoded: 03 11 22 02 33 00
//!          ^code    ^code ^terminator
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Frame delimiter on the wire.
pub const TERMINATOR: u8 = 0x00;

/// Longest non-zero run a single code byte can describe.
pub const MAX_RUN: usize = 254;

const FULL_BLOCK: u8 = 0xFF;

/// Upper bound on the encoded size of `len` input bytes, excluding the terminator.
pub const fn max_encoded_len(len: usize) -> usize {
    len + len / MAX_RUN + 1
}

/// Encode `data` and append it, followed by the terminator, to `dst`.
///
/// A full 254-byte run that ends the input is not followed by an empty block.
pub fn encode(data: &[u8], dst: &mut BytesMut) {
    dst.reserve(max_encoded_len(data.len()) + 1);

    let mut code_idx = open_block(dst);
    let mut code = 1u8;
    let mut open = true;

    for &byte in data {
        if !open {
            code_idx = open_block(dst);
            code = 1;
            open = true;
        }
        if byte == TERMINATOR {
            dst[code_idx] = code;
            code_idx = open_block(dst);
            code = 1;
        } else {
            dst.put_u8(byte);
            code += 1;
            if code == FULL_BLOCK {
                dst[code_idx] = code;
                open = false;
            }
        }
    }

    if open {
        dst[code_idx] = code;
    }
    dst.put_u8(TERMINATOR);
}

/// Encode `data` into a fresh buffer, terminator included.
pub fn encode_to_vec(data: &[u8]) -> Vec<u8> {
    let mut dst = BytesMut::with_capacity(max_encoded_len(data.len()) + 1);
    encode(data, &mut dst);
    dst.to_vec()
}

fn open_block(dst: &mut BytesMut) -> usize {
    let idx = dst.len();
    dst.put_u8(0);
    idx
}

/// Decode one frame from the start of `src`.
///
/// Decoding stops at the first terminator, or at the end of `src` when the
/// caller has already stripped it. Returns the decoded bytes and how many
/// bytes of `src` were consumed, terminator included.
pub fn decode(src: &[u8]) -> Result<(Vec<u8>, usize)> {
    let end = src
        .iter()
        .position(|&b| b == TERMINATOR)
        .unwrap_or(src.len());
    let consumed = if end < src.len() { end + 1 } else { end };

    let mut out = Vec::with_capacity(end);
    let mut i = 0usize;
    while i < end {
        let code = src[i] as usize;
        let run_end = i + code;
        if run_end > end {
            return Err(FrameError::FrameCorrupt { offset: i });
        }
        out.extend_from_slice(&src[i + 1..run_end]);
        i = run_end;
        if code < FULL_BLOCK as usize && i < end {
            out.push(TERMINATOR);
        }
    }

    Ok((out, consumed))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn roundtrip(data: &[u8]) -> Vec<u8> {
        let wire = encode_to_vec(data);
        let (decoded, consumed) = decode(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        decoded
    }

    #[test]
    fn empty_input() {
        assert_eq!(encode_to_vec(&[]), vec![0x01, 0x00]);
        assert!(roundtrip(&[]).is_empty());
    }

    #[test]
    fn reference_vectors() {
        assert_eq!(encode_to_vec(&[0x00]), vec![0x01, 0x01, 0x00]);
        assert_eq!(encode_to_vec(&[0x00, 0x00]), vec![0x01, 0x01, 0x01, 0x00]);
        assert_eq!(
            encode_to_vec(&[0x11, 0x22, 0x00, 0x33]),
            vec![0x03, 0x11, 0x22, 0x02, 0x33, 0x00]
        );
        assert_eq!(
            encode_to_vec(&[0x11, 0x22, 0x33, 0x44]),
            vec![0x05, 0x11, 0x22, 0x33, 0x44, 0x00]
        );
        assert_eq!(
            encode_to_vec(&[0x11, 0x00, 0x00, 0x00]),
            vec![0x02, 0x11, 0x01, 0x01, 0x01, 0x00]
        );
    }

    #[test]
    fn full_run_at_end_has_no_trailing_block() {
        let data: Vec<u8> = (1..=254).map(|b| b as u8).collect();
        let wire = encode_to_vec(&data);

        assert_eq!(wire.len(), 1 + 254 + 1);
        assert_eq!(wire[0], 0xFF);
        assert_eq!(*wire.last().unwrap(), TERMINATOR);
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn long_run_is_split() {
        let data = vec![0x5A; 255];
        let wire = encode_to_vec(&data);

        assert_eq!(wire[0], 0xFF);
        assert_eq!(wire[255], 0x02);
        assert_eq!(wire.len(), 1 + 254 + 1 + 1 + 1);
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn full_run_followed_by_zero() {
        let mut data = vec![0x01; 254];
        data.push(0x00);
        let wire = encode_to_vec(&data);

        assert_eq!(&wire[255..], &[0x01, 0x01, 0x00]);
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn decoder_tolerates_trailing_empty_block() {
        let mut wire = vec![0xFF];
        wire.extend(std::iter::repeat(0x07).take(254));
        wire.extend_from_slice(&[0x01, 0x00]);

        let (decoded, consumed) = decode(&wire).unwrap();
        assert_eq!(decoded, vec![0x07; 254]);
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn decode_without_terminator_consumes_whole_run() {
        let (decoded, consumed) = decode(&[0x03, 0x11, 0x22, 0x02, 0x33]).unwrap();
        assert_eq!(decoded, vec![0x11, 0x22, 0x00, 0x33]);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn decode_stops_at_first_terminator() {
        let (decoded, consumed) = decode(&[0x02, 0xAA, 0x00, 0x02, 0xBB, 0x00]).unwrap();
        assert_eq!(decoded, vec![0xAA]);
        assert_eq!(consumed, 3);
    }

    #[test]
    fn prefix_past_terminator_is_corrupt() {
        let err = decode(&[0x05, 0x11, 0x22, 0x00]).unwrap_err();
        assert!(matches!(err, FrameError::FrameCorrupt { offset: 0 }));

        let err = decode(&[0x02, 0x11, 0x04, 0x22, 0x00]).unwrap_err();
        assert!(matches!(err, FrameError::FrameCorrupt { offset: 2 }));
    }

    #[test]
    fn max_encoded_len_bounds_worst_case() {
        for len in [0usize, 1, 253, 254, 255, 508, 1024] {
            let data = vec![0x42; len];
            assert!(encode_to_vec(&data).len() <= max_encoded_len(len) + 1);
        }
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(data in prop::collection::vec(any::<u8>(), 0..1024)) {
            prop_assert_eq!(roundtrip(&data), data);
        }

        #[test]
        fn only_the_last_byte_is_zero(data in prop::collection::vec(any::<u8>(), 0..1024)) {
            let wire = encode_to_vec(&data);
            prop_assert_eq!(wire.last().copied(), Some(TERMINATOR));
            prop_assert!(!wire[..wire.len() - 1].contains(&TERMINATOR));
        }
    }
}
