//! Protocol error types.

use thiserror::Error;

/// Result alias for frame codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding frames.
///
/// Every variant is a protocol violation. A connection that produces one of
/// these must be closed; none of them are retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is shorter than the fixed header.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Declared or actual body length exceeds the configured limit.
    #[error("body too large: {size} bytes exceeds limit of {max}")]
    BodyTooLarge {
        /// Offending body length
        size: usize,
        /// Limit in force
        max: usize,
    },

    /// Buffer ends before the body the header announced.
    #[error("frame truncated: expected {expected} body bytes, got {actual}")]
    FrameTruncated {
        /// Body bytes announced by the header
        expected: usize,
        /// Body bytes available
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_display() {
        let err = ProtocolError::BodyTooLarge { size: 4096, max: 2048 };
        assert_eq!(err.to_string(), "body too large: 4096 bytes exceeds limit of 2048");

        let err = ProtocolError::FrameTooShort { expected: 4, actual: 1 };
        assert_eq!(err.to_string(), "frame too short: expected 4 bytes, got 1");
    }
}
