//! Length-prefixed framing shared by the control and data channels.
//!
//! ```text
//! [u32 BE: len][payload bytes of len]
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default ceiling for a single frame payload (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors raised while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Underlying socket error.
    #[error("Frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer announced a payload larger than we accept.
    #[error("Frame of {len} bytes exceeds maximum {max}")]
    TooLarge { len: usize, max: usize },

    /// The peer closed the connection part way through a frame.
    #[error("Connection closed mid-frame")]
    Truncated,
}

/// Read a length-prefixed frame.
///
/// Returns `None` on clean EOF before any header byte arrives.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] when the announced length exceeds
/// `max_len`, [`FrameError::Truncated`] when the stream ends mid-frame.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FrameError::Truncated);
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_len {
        return Err(FrameError::TooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    match reader.read_exact(&mut payload).await {
        Ok(_) => Ok(Some(payload)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::Truncated),
        Err(e) => Err(e.into()),
    }
}

/// Write a length-prefixed frame and flush it.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] if the payload cannot be described by a
/// `u32` length, or an I/O error from the writer.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
