//! Length-prefixed message framing.
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  JSON payload    |
//! +----------------+------------------+
//! ```
//!
//! [`encode_message`] and [`decode_message`] work on complete buffers;
//! [`read_message`] and [`write_message`] drive a tokio stream one frame at a
//! time and are what the daemon and the CLI use on the control socket.

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

fn check_len(len: usize) -> ProtocolResult<u32> {
    match u32::try_from(len) {
        Ok(len) if len <= MAX_MESSAGE_SIZE => Ok(len),
        _ => Err(ProtocolError::MessageTooLarge {
            size: u32::try_from(len).unwrap_or(u32::MAX),
            max: MAX_MESSAGE_SIZE,
        }),
    }
}

/// Encodes a message into a complete frame.
pub fn encode_message<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    let json = serde_json::to_vec(message)?;
    let len = check_len(json.len())?;

    let mut buffer = Vec::with_capacity(4 + json.len());
    buffer.extend_from_slice(&len.to_be_bytes());
    buffer.extend_from_slice(&json);
    Ok(buffer)
}

/// Decodes a complete frame (length prefix + payload).
pub fn decode_message<T: DeserializeOwned>(data: &[u8]) -> ProtocolResult<T> {
    let Some((prefix, rest)) = data.split_first_chunk::<4>() else {
        return Err(ProtocolError::IncompleteMessage {
            expected: 4,
            received: data.len(),
        });
    };

    let len = check_len(u32::from_be_bytes(*prefix) as usize)? as usize;
    if len == 0 {
        return Err(ProtocolError::EmptyMessage);
    }
    if rest.len() < len {
        return Err(ProtocolError::IncompleteMessage {
            expected: 4 + len,
            received: data.len(),
        });
    }

    Ok(serde_json::from_slice(&rest[..len])?)
}

/// Reads one frame from `reader`.
///
/// Returns `Ok(None)` on a clean EOF before the length prefix.
pub async fn read_message<R, T>(reader: &mut R) -> ProtocolResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = check_len(u32::from_be_bytes(len_buf) as usize)? as usize;
    if len == 0 {
        return Err(ProtocolError::EmptyMessage);
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::IncompleteMessage {
                expected: len,
                received: 0,
            }
        } else {
            e.into()
        }
    })?;

    Ok(Some(serde_json::from_slice(&payload)?))
}

/// Writes one frame to `writer` and flushes it.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = encode_message(message)?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}
