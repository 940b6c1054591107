//! Server error types.
//!
//! Provides strongly-typed errors for the framework's seams:
//! - Server lifecycle (configuration, bind, thread spawn)
//! - Outbound sends (closed connection, full queue)
//! - Logic queue handoff (full, stopped)
//! - Application handlers

use std::io;

use thiserror::Error;
use tidewire_proto::ProtocolError;

/// Errors that can occur while building, starting or stopping the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error (invalid bind address, zero workers, etc.).
    ///
    /// Fatal for startup. Fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, socket option failure, etc.).
    #[error("transport error: {0}")]
    Transport(String),

    /// Internal error (thread spawn failure, RNG failure, misuse of the
    /// lifecycle API such as starting twice).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Errors returned by [`crate::Session::send`].
///
/// Sends are best-effort: callers that do not care may ignore the result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The connection was already closed; the frame was dropped.
    #[error("connection closed")]
    Closed,

    /// The outbound queue is at capacity; the frame was dropped.
    #[error("send queue full ({capacity} frames pending)")]
    QueueFull {
        /// Configured queue bound
        capacity: usize,
    },

    /// The body cannot be framed (exceeds the body limit).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors returned when handing a frame to the logic queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The queue holds `capacity` undelivered messages.
    #[error("logic queue full ({capacity} messages pending)")]
    Full {
        /// Configured queue bound
        capacity: usize,
    },

    /// The queue is draining for shutdown and accepts nothing new.
    #[error("logic queue stopped")]
    Stopped,
}

/// Failure reported by an application handler.
///
/// Logged by the logic worker and otherwise ignored; one failing message
/// never stops the worker.
#[derive(Debug, Error)]
#[error("handler failed: {reason}")]
pub struct HandlerError {
    reason: String,
}

impl HandlerError {
    /// Create a handler error with a human-readable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    /// The reason given by the handler.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<SendError> for HandlerError {
    fn from(err: SendError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<ProtocolError> for HandlerError {
    fn from(err: ProtocolError) -> Self {
        Self::new(err.to_string())
    }
}
