//! Wire format for the Tidewire protocol.
//!
//! Every message on the TCP stream is a frame: a fixed 4-byte header followed
//! by a variable-length body. The header carries the message kind (used to
//! pick an application handler) and the exact body length, both as Big Endian
//! `u16`.
//!
//! ```text
//! ┌─────────────┬──────────────┬───────────────────┐
//! │ kind (2B)   │ length (2B)  │ body (length B)   │
//! └─────────────┴──────────────┴───────────────────┘
//! ```
//!
//! # Security
//!
//! Header parsing uses compile-time verified layouts via `zerocopy`. The body
//! length is checked against a limit (2 KiB by default) before any body buffer
//! is allocated, so a peer cannot make the server reserve memory it never
//! intends to send.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod header;
pub mod stream;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
