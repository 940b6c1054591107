//! Frame type combining header and body.
//!
//! A `Frame` is one complete protocol message:
//! - 4-byte raw binary header (Big Endian)
//! - Variable-length body (opaque bytes, interpreted by the handler)

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    FrameHeader,
    errors::{ProtocolError, Result},
};

/// Complete protocol frame
///
/// Layout on the wire:
/// `[FrameHeader: 4 bytes] + [body: header.body_len() bytes]`
///
/// # Invariants
///
/// - Size Consistency: `body.len()` always equals `header.body_len()`. The
///   constructors set the header from the body, and [`Frame::decode`] slices
///   exactly the announced length.
///
/// - Size Limit: `body.len()` never exceeds the limit the frame was built or
///   decoded with, and never exceeds `u16::MAX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (4 bytes)
    pub header: FrameHeader,

    /// Raw body bytes
    pub body: Bytes,
}

impl Frame {
    /// Build a frame under the default body limit ([`FrameHeader::MAX_BODY_LEN`]).
    pub fn new(kind: u16, body: impl Into<Bytes>) -> Result<Self> {
        Self::with_limit(kind, body, FrameHeader::MAX_BODY_LEN)
    }

    /// Build a frame, rejecting bodies longer than `max_body_len`.
    ///
    /// The header's `body_len` is derived from the body, so a frame with a
    /// mismatched header cannot be constructed.
    pub fn with_limit(kind: u16, body: impl Into<Bytes>, max_body_len: usize) -> Result<Self> {
        let body = body.into();
        let max = max_body_len.min(usize::from(u16::MAX));

        let body_len = u16::try_from(body.len())
            .ok()
            .filter(|len| usize::from(*len) <= max)
            .ok_or(ProtocolError::BodyTooLarge { size: body.len(), max })?;

        Ok(Self { header: FrameHeader::new(kind, body_len), body })
    }

    /// Assemble a frame from a parsed header and a body of matching length.
    pub fn from_parts(header: FrameHeader, body: Bytes) -> Result<Self> {
        let expected = usize::from(header.body_len());
        if body.len() != expected {
            return Err(ProtocolError::FrameTruncated { expected, actual: body.len() });
        }

        Ok(Self { header, body })
    }

    /// Message kind.
    #[must_use]
    pub fn kind(&self) -> u16 {
        self.header.kind()
    }

    /// Total number of bytes this frame occupies on the wire.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.body.len()
    }

    /// Encode frame into buffer.
    ///
    /// Writes: `[header (4 bytes)] + [body (variable)]`
    pub fn encode(&self, dst: &mut impl BufMut) {
        debug_assert_eq!(self.body.len(), usize::from(self.header.body_len()));

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.body);
    }

    /// Encode frame into a single contiguous buffer, exactly the bytes
    /// written to the socket.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a frame under the default body limit.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_with_limit(bytes, FrameHeader::MAX_BODY_LEN)
    }

    /// Decode a frame from wire format.
    ///
    /// Trailing bytes after the announced body are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` from header parsing (short buffer, body limit)
    /// - `ProtocolError::FrameTruncated` if fewer body bytes than announced
    ///
    /// # Security
    ///
    /// The header (and its length limit) is validated before the body is
    /// copied. Only exactly `body_len` bytes are read from the buffer.
    pub fn decode_with_limit(bytes: &[u8], max_body_len: usize) -> Result<Self> {
        let header = FrameHeader::from_bytes_with_limit(bytes, max_body_len)?;

        let body_len = usize::from(header.body_len());
        let total_size = FrameHeader::SIZE + body_len;

        let body = bytes.get(FrameHeader::SIZE..total_size).ok_or(
            ProtocolError::FrameTruncated {
                expected: body_len,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            },
        )?;

        Ok(Self { header, body: Bytes::copy_from_slice(body) })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn frame_round_trip(kind in any::<u16>(), body in prop::collection::vec(any::<u8>(), 0..=2048)) {
            let frame = Frame::new(kind, body.clone()).expect("within limit");
            let wire = frame.to_bytes();

            let parsed = Frame::decode(&wire).expect("should decode");
            prop_assert_eq!(parsed.kind(), kind);
            prop_assert_eq!(&parsed.body[..], &body[..]);
        }
    }

    #[test]
    fn frame_sets_body_len() {
        let frame = Frame::new(1, b"ping".to_vec()).unwrap();
        assert_eq!(frame.header.body_len(), 4);
        assert_eq!(frame.encoded_len(), 8);
        assert_eq!(&frame.to_bytes()[..], b"\x00\x01\x00\x04ping");
    }

    #[test]
    fn empty_body_is_valid() {
        let frame = Frame::new(9, Bytes::new()).unwrap();
        let parsed = Frame::decode(&frame.to_bytes()).unwrap();
        assert_eq!(parsed.kind(), 9);
        assert!(parsed.body.is_empty());
    }

    #[test]
    fn reject_oversized_body_on_build() {
        let result = Frame::new(1, vec![0u8; 2049]);
        assert_eq!(result, Err(ProtocolError::BodyTooLarge { size: 2049, max: 2048 }));
    }

    #[test]
    fn limit_is_capped_at_u16() {
        let result = Frame::with_limit(1, vec![0u8; 70_000], usize::MAX);
        assert!(matches!(result, Err(ProtocolError::BodyTooLarge { max: 65_535, .. })));
    }

    #[test]
    fn reject_truncated_frame() {
        let header = FrameHeader::new(1, 100);
        let result = Frame::decode(&header.to_bytes());
        assert_eq!(result, Err(ProtocolError::FrameTruncated { expected: 100, actual: 0 }));
    }

    #[test]
    fn from_parts_checks_length() {
        let header = FrameHeader::new(3, 2);
        assert!(Frame::from_parts(header, Bytes::from_static(b"ok")).is_ok());
        assert!(Frame::from_parts(header, Bytes::from_static(b"nope")).is_err());
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut wire = Frame::new(2, b"ab".to_vec()).unwrap().to_bytes().to_vec();
        wire.extend_from_slice(b"garbage");

        let parsed = Frame::decode(&wire).unwrap();
        assert_eq!(&parsed.body[..], b"ab");
    }
}
