//! Async frame I/O over byte streams.
//!
//! These helpers implement the read side of the framing state machine
//! (await header, validate, await body) and the write side (one contiguous
//! write per frame) on top of any Tokio `AsyncRead` / `AsyncWrite`. They are
//! shared by the server connection loop and the client.

use std::io;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Frame, FrameHeader, ProtocolError};

/// Errors from reading a frame off a stream.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Underlying transport failure (reset, EOF inside a frame, ...).
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// Peer sent bytes that violate the framing rules.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Read one complete frame.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly on a frame
/// boundary. EOF anywhere inside a frame is an `Io(UnexpectedEof)` error.
///
/// The header's body length is validated against `max_body_len` before the
/// body buffer is allocated; an oversized announcement returns
/// `ReadError::Protocol` without consuming any body bytes.
pub async fn read_frame<R>(reader: &mut R, max_body_len: usize) -> Result<Option<Frame>, ReadError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; FrameHeader::SIZE];
    let mut filled = 0;
    while filled < head.len() {
        let n = reader.read(&mut head[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        filled += n;
    }

    let header = FrameHeader::from_bytes_with_limit(&head, max_body_len)?;

    // read_exact keeps polling across short reads until the body is complete
    let mut body = BytesMut::zeroed(usize::from(header.body_len()));
    reader.read_exact(&mut body).await?;

    Ok(Some(Frame::from_parts(header, body.freeze())?))
}

/// Write one frame as a single contiguous buffer.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.to_bytes()).await
}
