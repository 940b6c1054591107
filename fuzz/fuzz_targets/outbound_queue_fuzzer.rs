//! Fuzz target for the per-connection outbound queue
//!
//! Drives the queue with arbitrary push / write-complete / clear sequences and
//! checks it against a plain `VecDeque` model.
//!
//! # Invariants
//!
//! - Pending frames (queued plus in flight) never exceed the capacity
//! - `StartWrite` is returned only when the writer was idle
//! - Frames leave in push order

#![no_main]

use std::collections::VecDeque;

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use tidewire_server::{OutboundQueue, Push};

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Push(u8),
    NextWrite,
    Clear,
}

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    capacity: u8,
    ops: Vec<Op>,
}

fuzz_target!(|scenario: Scenario| {
    let capacity = usize::from(scenario.capacity).max(1);
    let mut queue = OutboundQueue::new(capacity);
    let mut model: VecDeque<u8> = VecDeque::new();
    let mut writing = false;
    let mut in_flight = false;

    for op in scenario.ops {
        match op {
            Op::Push(tag) => match queue.push(Bytes::from(vec![tag])) {
                Ok(Push::StartWrite) => {
                    assert!(!writing);
                    writing = true;
                    model.push_back(tag);
                },
                Ok(Push::Queued) => {
                    assert!(writing);
                    model.push_back(tag);
                },
                Err(_) => {
                    assert_eq!(model.len() + usize::from(in_flight), capacity);
                },
            },
            Op::NextWrite => {
                let next = queue.next_write().map(|frame| frame[0]);
                assert_eq!(next, model.pop_front());
                in_flight = next.is_some();
                if next.is_none() {
                    writing = false;
                }
            },
            Op::Clear => {
                assert_eq!(queue.clear(), model.len());
                model.clear();
            },
        }

        assert!(queue.pending() <= capacity);
        assert_eq!(queue.pending(), model.len() + usize::from(in_flight));
        assert_eq!(queue.is_writing(), writing);
    }
});
