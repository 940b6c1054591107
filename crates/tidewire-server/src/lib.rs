//! Tidewire server framework.
//!
//! An asynchronous TCP server for the length-prefixed frame protocol defined
//! in [`tidewire_proto`]. Network I/O is spread over a pool of worker threads;
//! application logic runs on a single dedicated thread fed by a queue.
//!
//! # Architecture
//!
//! ```text
//!  Listener ──accept──▶ Connection (on a backend reactor)
//!                          │ reader: header, validate, body
//!                          ▼
//!                       LogicQueue ──▶ logic thread ──▶ handler(kind)
//!                                                          │ session.send
//!                          ┌───────────────────────────────┘
//!                          ▼
//!                       OutboundQueue ──▶ writer ──▶ socket
//! ```
//!
//! # Components
//!
//! - [`Server`]: binds the listener, runs the accept loop, owns everything
//!   else and tears it down in order on [`Server::stop`]
//! - [`Backend`]: where connection tasks run, either one single-threaded
//!   reactor per worker ([`PerWorkerBackend`]) or one shared multi-threaded
//!   reactor ([`SharedPoolBackend`])
//! - [`Connection`]: reader/writer state machine for one socket, exposed to
//!   handlers as a [`Session`]
//! - [`Registry`]: id-to-connection table with weak entries
//! - [`LogicQueue`]: FIFO feeding the logic thread, dispatching by message
//!   kind through a [`HandlerRegistry`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
mod config;
mod connection;
pub mod dispatch;
mod error;
mod outbound;
mod registry;
mod server;
mod session;

pub use backend::{Backend, PerWorkerBackend, SharedPoolBackend};
pub use config::{BackendKind, ConnectionLimits, OverflowPolicy, ServerConfig};
pub use connection::Connection;
pub use dispatch::{Dispatcher, Envelope, Handler, HandlerRegistry, LogicQueue};
pub use error::{DispatchError, HandlerError, SendError, ServerError};
pub use outbound::{OutboundQueue, Push};
pub use registry::Registry;
pub use server::Server;
pub use session::{ConnectionId, Session};
