//! Per-connection outbound queue.
//!
//! Pure bookkeeping, no I/O: the connection holds this behind its lock, `send`
//! pushes encoded frames, and the writer task pulls them one at a time. The
//! queue decides when the writer has to be woken, which is how the "at most
//! one write in flight" rule is enforced.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::SendError;

/// Outcome of a successful [`OutboundQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    /// The writer was idle. The caller must wake it.
    StartWrite,
    /// A write is already in progress and will reach this frame on its own.
    Queued,
}

/// Bounded FIFO of encoded frames awaiting transmission.
///
/// # Invariants
///
/// - `pending() <= capacity`, where `pending` counts the frame currently being
///   written plus every queued frame.
/// - `push` returns [`Push::StartWrite`] only when the writer is idle, and
///   marks it active in the same step, so at most one write is ever in flight.
/// - Frames leave in the order they were pushed.
#[derive(Debug)]
pub struct OutboundQueue {
    frames: VecDeque<Bytes>,
    capacity: usize,
    writer_active: bool,
    in_flight: bool,
}

impl OutboundQueue {
    /// Create a queue bounded at `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            capacity: capacity.max(1),
            writer_active: false,
            in_flight: false,
        }
    }

    /// Append a frame.
    ///
    /// # Errors
    ///
    /// `SendError::QueueFull` when the bound is reached. The frame is not
    /// queued; what happens next is the connection's overflow policy.
    pub fn push(&mut self, frame: Bytes) -> Result<Push, SendError> {
        if self.pending() >= self.capacity {
            return Err(SendError::QueueFull { capacity: self.capacity });
        }

        self.frames.push_back(frame);

        if self.writer_active {
            Ok(Push::Queued)
        } else {
            self.writer_active = true;
            Ok(Push::StartWrite)
        }
    }

    /// Take the next frame to write.
    ///
    /// Called by the writer when woken and again after every completed write.
    /// Returns `None` once the queue is empty, at which point the writer is
    /// considered idle and the next `push` will ask for a wake-up.
    pub fn next_write(&mut self) -> Option<Bytes> {
        let next = self.frames.pop_front();
        self.in_flight = next.is_some();
        if next.is_none() {
            self.writer_active = false;
        }
        next
    }

    /// Frames not yet fully written (queued plus in flight).
    pub fn pending(&self) -> usize {
        self.frames.len() + usize::from(self.in_flight)
    }

    /// Configured bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a writer is currently draining the queue.
    pub fn is_writing(&self) -> bool {
        self.writer_active
    }

    /// Drop every queued frame. Returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn frame(tag: u8) -> Bytes {
        Bytes::from(vec![tag])
    }

    #[test]
    fn first_push_starts_writer() {
        let mut queue = OutboundQueue::new(4);
        assert_eq!(queue.push(frame(1)), Ok(Push::StartWrite));
        assert_eq!(queue.push(frame(2)), Ok(Push::Queued));
        assert!(queue.is_writing());
    }

    #[test]
    fn writer_goes_idle_when_drained() {
        let mut queue = OutboundQueue::new(4);
        queue.push(frame(1)).unwrap();

        assert_eq!(queue.next_write(), Some(frame(1)));
        assert_eq!(queue.pending(), 1, "in-flight frame still counts");
        assert_eq!(queue.next_write(), None);
        assert!(!queue.is_writing());
        assert_eq!(queue.pending(), 0);

        assert_eq!(queue.push(frame(2)), Ok(Push::StartWrite));
    }

    #[test]
    fn push_during_write_does_not_restart_writer() {
        let mut queue = OutboundQueue::new(4);
        queue.push(frame(1)).unwrap();
        queue.next_write();

        // Writer is mid-write with an empty backlog
        assert_eq!(queue.push(frame(2)), Ok(Push::Queued));
        assert_eq!(queue.next_write(), Some(frame(2)));
    }

    #[test]
    fn capacity_counts_in_flight_frame() {
        let mut queue = OutboundQueue::new(2);
        queue.push(frame(1)).unwrap();
        queue.next_write();
        queue.push(frame(2)).unwrap();

        assert_eq!(queue.push(frame(3)), Err(SendError::QueueFull { capacity: 2 }));

        // Completing the in-flight write frees a slot
        assert_eq!(queue.next_write(), Some(frame(2)));
        assert_eq!(queue.push(frame(3)), Ok(Push::Queued));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut queue = OutboundQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.push(frame(1)).is_ok());
    }

    #[test]
    fn clear_drops_backlog() {
        let mut queue = OutboundQueue::new(8);
        for tag in 0..5 {
            queue.push(frame(tag)).unwrap();
        }
        assert_eq!(queue.clear(), 5);
        assert_eq!(queue.next_write(), None);
    }

    proptest! {
        #[test]
        fn frames_leave_in_push_order(tags in prop::collection::vec(any::<u8>(), 1..200)) {
            let mut queue = OutboundQueue::new(tags.len());
            let mut starts = 0;
            for tag in &tags {
                if queue.push(frame(*tag)).unwrap() == Push::StartWrite {
                    starts += 1;
                }
            }

            let mut written = Vec::new();
            while let Some(next) = queue.next_write() {
                written.push(next[0]);
            }

            prop_assert_eq!(starts, 1);
            prop_assert_eq!(written, tags);
        }
    }
}
