//! Connection identity and the handler-facing session interface.
//!
//! Handlers never see sockets. They receive a [`Session`], which is the only
//! way application logic talks back to a peer: `send` a frame, or `close` the
//! connection. [`crate::Connection`] is the production implementation.

use std::fmt;

use bytes::Bytes;

use crate::error::{SendError, ServerError};

/// Opaque, randomly generated connection identifier.
///
/// 128 bits from the OS RNG, so two live connections colliding is negligible
/// without any coordination. Renders as 32 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u128);

impl ConnectionId {
    /// Generate a fresh identifier from OS randomness.
    ///
    /// # Errors
    ///
    /// `ServerError::Internal` if the OS RNG is unavailable. The accept loop
    /// drops the socket in that case rather than inventing a weak id.
    pub fn generate() -> Result<Self, ServerError> {
        let mut bytes = [0u8; 16];
        getrandom::fill(&mut bytes)
            .map_err(|e| ServerError::Internal(format!("OS RNG failure: {e}")))?;
        Ok(Self(u128::from_be_bytes(bytes)))
    }

    /// Wrap a raw value (tests, persisted ids).
    pub const fn from_u128(raw: u128) -> Self {
        Self(raw)
    }

    /// Raw 128-bit value.
    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({self})")
    }
}

/// A live peer as seen by application handlers.
///
/// All methods are callable from any thread. In particular, handlers run on
/// the logic thread while the socket is driven by a backend worker.
pub trait Session: Send + Sync {
    /// Identifier assigned at accept time.
    fn id(&self) -> ConnectionId;

    /// Queue a frame for transmission.
    ///
    /// Fire-and-forget: success means the frame was queued, not written.
    /// Frames from one session are written in call order.
    fn send(&self, kind: u16, body: Bytes) -> Result<(), SendError>;

    /// Close the connection. Idempotent.
    fn close(&self);

    /// Whether the connection has been closed.
    fn is_closed(&self) -> bool;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Mutex, PoisonError};

    use super::*;

    /// Session double that records sends instead of writing to a socket.
    pub(crate) struct RecordingSession {
        id: ConnectionId,
        sent: Mutex<Vec<(u16, Bytes)>>,
        closed: Mutex<bool>,
    }

    impl RecordingSession {
        pub(crate) fn new(raw_id: u128) -> Self {
            Self {
                id: ConnectionId::from_u128(raw_id),
                sent: Mutex::new(Vec::new()),
                closed: Mutex::new(false),
            }
        }

        pub(crate) fn sent(&self) -> Vec<(u16, Bytes)> {
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    impl Session for RecordingSession {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn send(&self, kind: u16, body: Bytes) -> Result<(), SendError> {
            if self.is_closed() {
                return Err(SendError::Closed);
            }
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).push((kind, body));
            Ok(())
        }

        fn close(&self) {
            *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = true;
        }

        fn is_closed(&self) -> bool {
            *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}
