//! Fuzz target for frame header boundary conditions
//!
//! Prevent memory exhaustion via oversized length announcements.
//!
//! # Strategy
//!
//! - Body length: zero, small, at-limit, just-over-limit, u16::MAX, random
//! - Actual bytes supplied: exact, short by some amount, with trailing garbage
//! - Kind: boundary values (0, 1, MAX) and random
//!
//! # Invariants
//!
//! - `body_len > limit` MUST return `ProtocolError::BodyTooLarge`
//! - Fewer body bytes than announced MUST return
//!   `ProtocolError::FrameTruncated`
//! - Trailing bytes MUST be ignored
//! - Encoded size MUST equal 4 + body_len

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tidewire_proto::{Frame, FrameHeader, ProtocolError};

const LIMIT: usize = FrameHeader::MAX_BODY_LEN;

#[derive(Debug, Clone, Arbitrary)]
enum BodyLen {
    Zero,
    Small(u8),
    AtLimit,
    JustOverLimit,
    MaxU16,
    Random(u16),
}

#[derive(Debug, Clone, Arbitrary)]
enum Supply {
    Exact,
    Short(u16),
    Trailing(Vec<u8>),
}

#[derive(Debug, Clone, Arbitrary)]
enum Kind {
    Zero,
    One,
    Max,
    Random(u16),
}

#[derive(Debug, Clone, Arbitrary)]
struct BoundaryFrame {
    kind: Kind,
    body_len: BodyLen,
    supply: Supply,
    fill: u8,
}

fuzz_target!(|boundary: BoundaryFrame| {
    let body_len: u16 = match boundary.body_len {
        BodyLen::Zero => 0,
        BodyLen::Small(n) => u16::from(n),
        BodyLen::AtLimit => LIMIT as u16,
        BodyLen::JustOverLimit => LIMIT as u16 + 1,
        BodyLen::MaxU16 => u16::MAX,
        BodyLen::Random(n) => n,
    };
    let kind = match boundary.kind {
        Kind::Zero => 0,
        Kind::One => 1,
        Kind::Max => u16::MAX,
        Kind::Random(k) => k,
    };

    let announced = usize::from(body_len);
    let mut buffer = FrameHeader::new(kind, body_len).to_bytes().to_vec();
    let supplied = match &boundary.supply {
        Supply::Exact => announced,
        Supply::Short(missing) => announced.saturating_sub(usize::from(*missing).max(1)),
        Supply::Trailing(_) => announced,
    };
    buffer.resize(FrameHeader::SIZE + supplied, boundary.fill);
    if let Supply::Trailing(extra) = &boundary.supply {
        buffer.extend_from_slice(extra);
    }

    match Frame::decode_with_limit(&buffer, LIMIT) {
        Ok(frame) => {
            assert!(announced <= LIMIT);
            assert_eq!(frame.kind(), kind);
            assert_eq!(frame.body.len(), announced);
            assert_eq!(frame.encoded_len(), FrameHeader::SIZE + announced);
        },
        Err(ProtocolError::BodyTooLarge { size, max }) => {
            assert!(announced > LIMIT);
            assert_eq!(size, announced);
            assert_eq!(max, LIMIT);
        },
        Err(ProtocolError::FrameTruncated { expected, actual }) => {
            assert!(announced <= LIMIT);
            assert_eq!(expected, announced);
            assert!(actual < expected);
        },
        Err(ProtocolError::FrameTooShort { .. }) => {
            panic!("a full header was supplied");
        },
    }
});
