//! Length-prefixed framing for packets sent over unidirectional streams.
//!
//! When a packet cannot travel as a QUIC datagram (the peer has datagrams
//! disabled, or the payload exceeds the negotiated datagram size) it is sent
//! on a fresh unidirectional stream as:
//!
//! ```text
//! [u32 big-endian length][length payload bytes]
//! ```
//!
//! The stream is finished right after the payload, so one stream carries
//! exactly one frame. These functions are synchronous; async stream I/O lives
//! in `memberquic-core`.

use crate::error::{ProtoError, Result};

/// Size of the length prefix in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest payload a receiver accepts in one frame (64 KiB). Bounds the
/// allocation a malicious or corrupted peer can force on us.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

fn check_frame_len(len: usize) -> Result<()> {
    if len > MAX_FRAME_SIZE {
        return Err(ProtoError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}

fn encode_frame_header(len: usize) -> Result<[u8; FRAME_HEADER_LEN]> {
    check_frame_len(len)?;
    // MAX_FRAME_SIZE fits in a u32, so the cast is lossless after the check.
    Ok((len as u32).to_be_bytes())
}

/// Decode a length prefix, rejecting lengths above [`MAX_FRAME_SIZE`].
pub fn decode_frame_header(header: [u8; FRAME_HEADER_LEN]) -> Result<usize> {
    let len = u32::from_be_bytes(header) as usize;
    check_frame_len(len)?;
    Ok(len)
}

/// Encode a complete frame (header followed by payload) into one buffer.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let header = encode_frame_header(payload.len())?;
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_big_endian() {
        let header = encode_frame_header(0x0102).expect("small length encodes");
        assert_eq!(header, [0x00, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn frame_carries_payload_verbatim() {
        let payload = b"ping from node-1";
        let frame = encode_frame(payload).expect("encode should succeed");
        assert_eq!(frame.len(), FRAME_HEADER_LEN + payload.len());

        let header: [u8; FRAME_HEADER_LEN] = frame[..FRAME_HEADER_LEN].try_into().unwrap();
        assert_eq!(decode_frame_header(header).unwrap(), payload.len());
        assert_eq!(&frame[FRAME_HEADER_LEN..], payload);
    }

    #[test]
    fn empty_payload_is_a_valid_frame() {
        let frame = encode_frame(&[]).expect("encode should succeed");
        assert_eq!(frame, vec![0, 0, 0, 0]);
        assert_eq!(decode_frame_header([0; FRAME_HEADER_LEN]).unwrap(), 0);
    }

    #[test]
    fn ceiling_is_inclusive() {
        assert!(encode_frame_header(MAX_FRAME_SIZE).is_ok());
        assert!(decode_frame_header((MAX_FRAME_SIZE as u32).to_be_bytes()).is_ok());
    }

    #[test]
    fn oversized_length_rejected_on_encode() {
        let err = encode_frame(&vec![0u8; 70_000]).unwrap_err();
        assert!(matches!(
            err,
            ProtoError::FrameTooLarge {
                len: 70_000,
                max: MAX_FRAME_SIZE
            }
        ));
    }

    #[test]
    fn oversized_length_rejected_on_decode() {
        let header = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes();
        let err = decode_frame_header(header).unwrap_err();
        assert!(matches!(
            err,
            ProtoError::FrameTooLarge {
                len,
                max: MAX_FRAME_SIZE
            } if len == MAX_FRAME_SIZE + 1
        ));
    }
}
