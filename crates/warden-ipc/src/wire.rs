//! Wire-level plumbing for the transport: a length-prefixed frame holding
//! one CBOR-encoded value. Framing and encoding are folded into one module
//! because every call site needs both together — nothing in this crate
//! reads or writes a bare frame without immediately (de)serializing its
//! payload, or encodes a value without immediately framing it.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum payload size accepted by the frame reader/writer.
pub const MAX_FRAME_SIZE: u32 = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode cbor payload: {0}")]
    Encode(String),
    #[error("failed to decode cbor payload: {0}")]
    Decode(String),
    #[error("request timed out")]
    Timeout,
    #[error("frame too large: {size} > {max}")]
    FrameTooLarge { size: u32, max: u32 },
    #[error("request id mismatch: expected {expected}, got {actual}")]
    RequestIdMismatch { expected: u64, actual: u64 },
    #[error("protocol mismatch: expected {expected}, got {actual}")]
    ProtocolMismatch { expected: u32, actual: u32 },
}

/// Encodes `value` as CBOR and writes it as one length-prefixed frame.
pub async fn write_message<W, T>(writer: &mut W, value: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_cbor::to_vec(value).map_err(|err| IpcError::Encode(err.to_string()))?;
    write_frame(writer, &payload).await
}

/// Reads one length-prefixed frame and decodes its payload as CBOR.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T, IpcError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let payload = read_frame(reader).await?;
    decode(&payload)
}

/// Decodes a raw frame payload, used when the caller already has the bytes
/// (e.g. to peek a request id before a full decode fails).
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, IpcError> {
    serde_cbor::from_slice(bytes).map_err(|err| IpcError::Decode(err.to_string()))
}

pub(crate) async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<(), IpcError> {
    let size: u32 = payload.len().try_into().map_err(|_| IpcError::FrameTooLarge { size: u32::MAX, max: MAX_FRAME_SIZE })?;

    if size > MAX_FRAME_SIZE {
        return Err(IpcError::FrameTooLarge { size, max: MAX_FRAME_SIZE });
    }

    writer.write_all(&size.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, IpcError> {
    let mut header = [0_u8; 4];
    reader.read_exact(&mut header).await?;

    let size = u32::from_be_bytes(header);
    if size > MAX_FRAME_SIZE {
        return Err(IpcError::FrameTooLarge { size, max: MAX_FRAME_SIZE });
    }

    let mut payload = vec![0_u8; size as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn message_roundtrip() {
        let (mut tx, mut rx) = duplex(128);
        let write_task = tokio::spawn(async move { write_message(&mut tx, &"hello-frame".to_string()).await });

        let read_payload: String = read_message(&mut rx).await.expect("read should succeed");

        write_task.await.expect("join should succeed").expect("write should succeed");
        assert_eq!(read_payload, "hello-frame");
    }

    #[tokio::test]
    async fn reject_oversized_frame() {
        let mut sink = tokio::io::sink();
        let payload = vec![0_u8; (MAX_FRAME_SIZE + 1) as usize];

        let err = write_frame(&mut sink, &payload).await.expect_err("oversized frame must fail");
        match err {
            IpcError::FrameTooLarge { .. } => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn detect_truncated_frame_payload() {
        let (mut tx, mut rx) = duplex(128);
        tx.write_all(&(8_u32.to_be_bytes())).await.expect("header write should succeed");
        tx.write_all(b"abc").await.expect("partial payload write should succeed");
        drop(tx);

        let err = read_frame(&mut rx).await.expect_err("truncated frame should fail");
        match err {
            IpcError::Io(io_err) => assert_eq!(io_err.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other}"),
        }
    }
}
