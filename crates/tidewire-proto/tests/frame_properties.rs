//! Property-based tests for Frame encoding/decoding
//!
//! These tests verify that frame serialization is correct for ALL valid inputs,
//! not just specific examples.

use bytes::Bytes;
use proptest::prelude::*;
use tidewire_proto::{Frame, FrameHeader, ProtocolError};

/// Strategy for generating frames with bodies anywhere in the legal range
fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (any::<u16>(), prop::collection::vec(any::<u8>(), 0..=FrameHeader::MAX_BODY_LEN)).prop_map(
        |(kind, body)| Frame::new(kind, Bytes::from(body)).expect("body within default limit"),
    )
}

#[test]
fn prop_frame_encode_decode_roundtrip() {
    proptest!(|(frame in arbitrary_frame())| {
        let wire = frame.to_bytes();
        let decoded = Frame::decode(&wire).expect("decode should succeed");

        // PROPERTY: Round-trip must be identity
        prop_assert_eq!(decoded.header, frame.header, "Header mismatch after round-trip");
        prop_assert_eq!(decoded.body, frame.body, "Body mismatch after round-trip");
    });
}

#[test]
fn prop_encoded_size_is_header_plus_body() {
    proptest!(|(frame in arbitrary_frame())| {
        let wire = frame.to_bytes();

        // PROPERTY: Encoded size = 4 + body length
        prop_assert_eq!(wire.len(), FrameHeader::SIZE + frame.body.len());
        prop_assert_eq!(wire.len(), frame.encoded_len());
    });
}

#[test]
fn prop_concatenated_frames_decode_in_order() {
    proptest!(|(frames in prop::collection::vec(arbitrary_frame(), 1..16))| {
        let mut wire = Vec::new();
        for frame in &frames {
            frame.encode(&mut wire);
        }

        // PROPERTY: A stream of frames splits back into the same sequence
        let mut offset = 0;
        for frame in &frames {
            let decoded = Frame::decode(&wire[offset..]).expect("decode should succeed");
            prop_assert_eq!(&decoded, frame);
            offset += decoded.encoded_len();
        }
        prop_assert_eq!(offset, wire.len());
    });
}

#[test]
fn prop_oversized_length_always_rejected() {
    proptest!(|(kind in any::<u16>(), body_len in 2049u16..=u16::MAX)| {
        let header = FrameHeader::new(kind, body_len);

        // PROPERTY: Bounds check fires on the header alone, before any body
        let result = Frame::decode(&header.to_bytes());
        prop_assert_eq!(
            result,
            Err(ProtocolError::BodyTooLarge { size: usize::from(body_len), max: 2048 })
        );
    });
}

#[test]
fn prop_truncated_frames_rejected() {
    proptest!(|(frame in arbitrary_frame(), cut in 1usize..64)| {
        prop_assume!(!frame.body.is_empty());
        let wire = frame.to_bytes();
        let cut = cut.min(frame.body.len());

        // PROPERTY: Missing body bytes are never papered over
        let result = Frame::decode(&wire[..wire.len() - cut]);
        let is_truncated = matches!(result, Err(ProtocolError::FrameTruncated { .. }));
        prop_assert!(is_truncated);
    });
}
