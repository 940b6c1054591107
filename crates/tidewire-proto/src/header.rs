//! Frame header with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 4-byte structure serialized as raw binary
//! (Big Endian). Reading it is a bounds check plus two byte swaps, which is
//! all the connection read loop needs to decide how many body bytes follow.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Fixed 4-byte frame header (Big Endian network byte order)
///
/// Fields are stored as raw byte arrays so the layout has alignment 1 and any
/// 4-byte pattern is a valid header. Semantic validation (the body length
/// limit) happens in [`FrameHeader::from_bytes_with_limit`].
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    kind: [u8; 2],     // u16 message kind, selects the handler
    body_len: [u8; 2], // u16 exact body length in bytes
}

impl FrameHeader {
    /// Size of the serialized header (4 bytes)
    pub const SIZE: usize = 4;

    /// Default maximum body length (2 KiB)
    pub const MAX_BODY_LEN: usize = 2048;

    /// Create a header for `kind` announcing `body_len` body bytes.
    #[must_use]
    pub fn new(kind: u16, body_len: u16) -> Self {
        Self { kind: kind.to_be_bytes(), body_len: body_len.to_be_bytes() }
    }

    /// Parse a header using the default body limit ([`Self::MAX_BODY_LEN`]).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with_limit(bytes, Self::MAX_BODY_LEN)
    }

    /// Parse a header from the first [`Self::SIZE`] bytes of `bytes`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if fewer than 4 bytes are available
    /// - `ProtocolError::BodyTooLarge` if the announced body exceeds
    ///   `max_body_len`
    ///
    /// # Security
    ///
    /// Callers must act on `BodyTooLarge` before reading the body. The
    /// connection read loop closes the peer without allocating anything.
    pub fn from_bytes_with_limit(bytes: &[u8], max_body_len: usize) -> Result<Self> {
        let (header, _) = Self::read_from_prefix(bytes).map_err(|_| {
            ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() }
        })?;

        let body_len = header.body_len() as usize;
        if body_len > max_body_len {
            return Err(ProtocolError::BodyTooLarge { size: body_len, max: max_body_len });
        }

        Ok(header)
    }

    /// Serialize header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Message kind as raw u16.
    #[must_use]
    pub fn kind(&self) -> u16 {
        u16::from_be_bytes(self.kind)
    }

    /// Announced body length in bytes.
    #[must_use]
    pub fn body_len(&self) -> u16 {
        u16::from_be_bytes(self.body_len)
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("kind", &format!("{:#06x}", self.kind()))
            .field("body_len", &self.body_len())
            .finish()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn header_size() {
        assert_eq!(std::mem::size_of::<FrameHeader>(), FrameHeader::SIZE);
        assert_eq!(FrameHeader::SIZE, 4);
    }

    #[test]
    fn header_is_big_endian() {
        let header = FrameHeader::new(0x0102, 0x0304);
        assert_eq!(header.to_bytes(), hex!("01020304"));
    }

    proptest! {
        #[test]
        fn header_round_trip(kind in any::<u16>(), body_len in 0u16..=2048) {
            let header = FrameHeader::new(kind, body_len);
            let parsed = FrameHeader::from_bytes(&header.to_bytes()).expect("should parse");
            prop_assert_eq!(parsed, header);
            prop_assert_eq!(parsed.kind(), kind);
            prop_assert_eq!(parsed.body_len(), body_len);
        }
    }

    #[test]
    fn reject_short_buffer() {
        let result = FrameHeader::from_bytes(&[0u8; 3]);
        assert_eq!(result, Err(ProtocolError::FrameTooShort { expected: 4, actual: 3 }));
    }

    #[test]
    fn reject_oversized_body() {
        let bytes = FrameHeader::new(1, 2049).to_bytes();
        let result = FrameHeader::from_bytes(&bytes);
        assert_eq!(result, Err(ProtocolError::BodyTooLarge { size: 2049, max: 2048 }));
    }

    #[test]
    fn accept_body_at_limit() {
        let bytes = FrameHeader::new(1, 2048).to_bytes();
        assert!(FrameHeader::from_bytes(&bytes).is_ok());
    }

    #[test]
    fn custom_limit_applies() {
        let bytes = FrameHeader::new(7, 512).to_bytes();
        assert!(FrameHeader::from_bytes_with_limit(&bytes, 512).is_ok());
        assert!(matches!(
            FrameHeader::from_bytes_with_limit(&bytes, 511),
            Err(ProtocolError::BodyTooLarge { size: 512, max: 511 })
        ));
    }
}
