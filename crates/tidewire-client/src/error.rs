//! Client error types.

use std::io;

use thiserror::Error;
use tidewire_proto::{ProtocolError, stream::ReadError};

/// Errors from talking to a Tidewire server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connect, read or write failed at the socket level.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// A frame could not be built or the server sent a malformed one.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,
}

impl From<ReadError> for ClientError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Io(e) => Self::Io(e),
            ReadError::Protocol(e) => Self::Protocol(e),
        }
    }
}
