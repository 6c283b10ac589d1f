//! Length-Prefixed Framing Codec
//!
//! Every message on the wire is encoded as:
//!
//! ```text
//! <L>:<payload>
//! ```
//!
//! where `L` is the ASCII-decimal byte length of the UTF-8 payload. There is
//! no trailing delimiter: the length alone tells the reader where the
//! message ends.
//!
//! TCP does not preserve message boundaries and a single `read`/`write` may
//! move fewer bytes than asked for. `send` loops until every byte is written
//! and `receive` loops until exactly `L` bytes are read, never consuming a
//! byte past the frame.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Separates the length prefix from the payload.
pub const LENGTH_DELIMITER: u8 = b':';

/// Largest payload accepted by `receive` (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Longest length prefix accepted before the delimiter.
pub const MAX_PREFIX_DIGITS: usize = 20;

/// Errors raised while framing a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The length prefix is not a non-negative decimal integer
    #[error("invalid length prefix: {0:?}")]
    InvalidLength(String),

    /// The declared length exceeds `MAX_FRAME_SIZE`
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The payload is not valid UTF-8
    #[error("invalid UTF-8 payload: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The peer closed the stream before the frame was complete
    #[error("connection closed after {received} of {expected} bytes")]
    ConnectionClosed { expected: usize, received: usize },

    /// The operation was abandoned because the server is shutting down
    #[error("interrupted by shutdown")]
    Interrupted,

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns true when the channel is gone, whoever closed it.
    pub fn is_connection_closed(&self) -> bool {
        matches!(
            self,
            ProtocolError::ConnectionClosed { .. } | ProtocolError::Interrupted
        )
    }

    /// Returns true for malformed-frame errors (as opposed to a dead channel).
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidLength(_)
                | ProtocolError::FrameTooLarge { .. }
                | ProtocolError::InvalidUtf8(_)
        )
    }
}

/// Encodes `message` as a complete frame.
pub fn encode_frame(message: &str) -> Bytes {
    let payload = message.as_bytes();
    let prefix = payload.len().to_string();

    let mut frame = BytesMut::with_capacity(prefix.len() + 1 + payload.len());
    frame.put_slice(prefix.as_bytes());
    frame.put_u8(LENGTH_DELIMITER);
    frame.put_slice(payload);
    frame.freeze()
}

/// Writes `message` as one frame, retrying short writes until done.
pub async fn send<W>(stream: &mut W, message: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(message);
    let mut written = 0;

    while written < frame.len() {
        let n = stream.write(&frame[written..]).await?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
        }
        written += n;
        trace!(written, total = frame.len(), "Wrote frame bytes");
    }

    stream.flush().await?;
    Ok(())
}

/// Reads exactly one frame and returns its payload.
pub async fn receive<R>(stream: &mut R) -> Result<String, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let length = read_length_prefix(stream).await?;

    let mut payload = vec![0u8; length];
    let mut received = 0;

    while received < length {
        let n = stream.read(&mut payload[received..]).await?;
        if n == 0 {
            return Err(ProtocolError::ConnectionClosed {
                expected: length,
                received,
            });
        }
        received += n;
        trace!(received, expected = length, "Read frame bytes");
    }

    Ok(String::from_utf8(payload)?)
}

/// Reads the `<L>:` prefix one byte at a time.
async fn read_length_prefix<R>(stream: &mut R) -> Result<usize, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut digits = Vec::with_capacity(8);
    let mut byte = [0u8; 1];

    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            // Length unknown yet
            return Err(ProtocolError::ConnectionClosed {
                expected: 0,
                received: 0,
            });
        }
        if byte[0] == LENGTH_DELIMITER {
            break;
        }
        digits.push(byte[0]);
        if digits.len() > MAX_PREFIX_DIGITS {
            return Err(ProtocolError::InvalidLength(
                String::from_utf8_lossy(&digits).into_owned(),
            ));
        }
    }

    parse_length(&digits)
}

fn parse_length(digits: &[u8]) -> Result<usize, ProtocolError> {
    let invalid = || ProtocolError::InvalidLength(String::from_utf8_lossy(digits).into_owned());

    // `usize::from_str` would accept a leading '+'
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }

    let text = std::str::from_utf8(digits).map_err(|_| invalid())?;
    let length: usize = text.parse().map_err(|_| invalid())?;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    Ok(length)
}
