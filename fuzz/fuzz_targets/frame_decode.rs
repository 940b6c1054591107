//! Fuzz target for Frame::decode
//!
//! Decodes arbitrary byte sequences under an arbitrary body limit to find:
//! - Parser crashes or panics
//! - Slicing past the end of the input
//! - Headers that slip past the body limit
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tidewire_proto::{Frame, FrameHeader};

fuzz_target!(|input: (u16, &[u8])| {
    let (limit, data) = input;
    let limit = usize::from(limit);

    if let Ok(frame) = Frame::decode_with_limit(data, limit) {
        assert!(frame.body.len() <= limit);
        assert_eq!(frame.body.len(), usize::from(frame.header.body_len()));
        assert_eq!(&frame.to_bytes()[..], &data[..FrameHeader::SIZE + frame.body.len()]);
    }

    let _ = Frame::decode(data);
});
