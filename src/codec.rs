//! Wire framing for the notice transport.
//!
//! Every message on the wire is a 4-byte big-endian length prefix followed
//! by exactly that many payload bytes. Encoding is pure; decoding reads
//! incrementally from any [`AsyncRead`] and never surfaces a partial frame.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::FrameError;

/// Width of the length prefix in bytes.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Smallest accepted value for the maximum payload size.
pub const MIN_FRAME_SIZE: usize = 64;

/// Largest accepted value for the maximum payload size.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode a payload into a single wire frame.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] if the payload length cannot be
/// represented in the 4-byte prefix. The codec enforces no other limit;
/// the session's `max_frame_size` bounds inbound frames.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, FrameError> {
    let length = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        length: payload.len(),
        max: u32::MAX as usize,
    })?;
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_BYTES + payload.len());
    buf.put_u32(length);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Read one complete frame payload from `reader`.
///
/// Blocks until the length prefix and the full payload have arrived.
///
/// # Errors
///
/// - [`FrameError::Closed`] if the stream ends cleanly on a frame boundary.
/// - [`FrameError::Truncated`] if the stream ends inside a frame.
/// - [`FrameError::TooLarge`] if the declared length exceeds `max_frame_size`.
/// - [`FrameError::Io`] for any other transport failure.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Bytes, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0_u8; LENGTH_PREFIX_BYTES];
    read_full(reader, &mut prefix, true).await?;
    let declared = u32::from_be_bytes(prefix);
    let length =
        usize::try_from(declared).map_err(|_| FrameError::TooLarge {
            length: usize::MAX,
            max: max_frame_size,
        })?;
    if length > max_frame_size {
        return Err(FrameError::TooLarge {
            length,
            max: max_frame_size,
        });
    }
    let mut payload = vec![0_u8; length];
    read_full(reader, &mut payload, false).await?;
    Ok(Bytes::from(payload))
}

/// Fill `buf` completely from `reader`.
///
/// `at_boundary` marks the read as starting on a frame boundary, where a
/// clean close is distinguished from a truncated frame.
async fn read_full<R>(reader: &mut R, buf: &mut [u8], at_boundary: bool) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => {
                return if at_boundary && filled == 0 {
                    Err(FrameError::Closed)
                } else {
                    Err(FrameError::Truncated {
                        missing: buf.len() - filled,
                    })
                };
            }
            Ok(n) => filled += n,
            Err(e) => return Err(FrameError::Io(e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_prepends_big_endian_length() {
        let frame = encode_frame(b"abc").expect("encode");
        assert_eq!(&frame[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn encode_accepts_empty_payload() {
        let frame = encode_frame(b"").expect("encode");
        assert_eq!(&frame[..], &[0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn clean_close_on_boundary_is_distinguished() {
        let mut empty: &[u8] = &[];
        let err = read_frame(&mut empty, MAX_FRAME_SIZE)
            .await
            .expect_err("closed stream");
        assert!(matches!(err, FrameError::Closed));
    }

    #[tokio::test]
    async fn close_inside_prefix_is_truncation() {
        let mut partial: &[u8] = &[0, 0];
        let err = read_frame(&mut partial, MAX_FRAME_SIZE)
            .await
            .expect_err("truncated prefix");
        assert!(matches!(err, FrameError::Truncated { missing: 2 }));
    }

    #[tokio::test]
    async fn close_inside_payload_is_truncation() {
        let mut partial: &[u8] = &[0, 0, 0, 10, b'x', b'y'];
        let err = read_frame(&mut partial, MAX_FRAME_SIZE)
            .await
            .expect_err("truncated payload");
        assert!(matches!(err, FrameError::Truncated { missing: 8 }));
    }

    #[tokio::test]
    async fn oversized_declared_length_is_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&1025_u32.to_be_bytes());
        frame.extend_from_slice(&[0; 8]);
        let mut source: &[u8] = &frame;
        let err = read_frame(&mut source, 1024)
            .await
            .expect_err("oversized frame");
        assert!(matches!(
            err,
            FrameError::TooLarge {
                length: 1025,
                max: 1024
            }
        ));
    }
}
