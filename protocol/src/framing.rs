use crate::error::ProtocolError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame's payload size. A malformed or hostile
/// length prefix must not drive an unbounded allocation.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Length-prefix a payload: 4-byte big-endian length followed by the bytes (§4.1, §6).
#[must_use]
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Write a framed payload to an async writer, flushing once.
pub async fn write_framed<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    writer.write_all(&frame(payload)).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame's payload bytes from an async reader.
///
/// Framing is exact: exactly the prefixed length is consumed, no more, no less.
pub async fn read_framed<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_BYTES,
        });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_prefixes_big_endian_length() {
        let framed = frame(b"hello");
        assert_eq!(&framed[0..4], &[0, 0, 0, 5]);
        assert_eq!(&framed[4..], b"hello");
    }

    #[tokio::test]
    async fn round_trips_through_an_in_memory_pipe() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_framed(&mut client, b"ping").await.unwrap();
        let payload = read_framed(&mut server).await.unwrap();
        assert_eq!(payload, b"ping");
    }

    #[tokio::test]
    async fn rejects_a_length_prefix_over_the_limit() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let oversized_len = (MAX_FRAME_BYTES + 1) as u32;
        client.write_all(&oversized_len.to_be_bytes()).await.unwrap();
        let err = read_framed(&mut server).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }
}
