//! Server configuration.

use std::{num::NonZeroUsize, time::Duration};

use tidewire_proto::FrameHeader;

use crate::error::ServerError;

/// Which concurrency backend drives connection I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// One single-threaded reactor per worker thread. Connections are pinned
    /// round-robin to a worker for their whole lifetime.
    #[default]
    PerWorker,
    /// One multi-threaded reactor shared by all workers. Any worker may run
    /// any connection's tasks.
    SharedPool,
}

/// What `send` does when a connection's outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Drop the new frame and return `SendError::QueueFull`. The connection
    /// stays open.
    #[default]
    RejectNewest,
    /// Drop the new frame, return `SendError::QueueFull`, and close the
    /// connection. For peers that must never miss a frame.
    Close,
}

/// Per-connection limits, copied into every accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Largest accepted body, inbound and outbound
    pub max_body_len: usize,
    /// Outbound queue bound (frames)
    pub outbound_capacity: usize,
    /// Behaviour when the outbound queue is full
    pub overflow_policy: OverflowPolicy,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_body_len: FrameHeader::MAX_BODY_LEN,
            outbound_capacity: ServerConfig::DEFAULT_OUTBOUND_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:10086")
    pub bind_address: String,
    /// Concurrency backend
    pub backend: BackendKind,
    /// Number of I/O worker threads
    pub workers: usize,
    /// Connection limits (body size, outbound queue)
    pub limits: ConnectionLimits,
    /// Logic queue bound (messages across all connections)
    pub dispatch_capacity: usize,
    /// Pause after a failed accept before re-arming
    pub accept_backoff: Duration,
    /// How long a shared-pool shutdown waits for in-flight tasks
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Default outbound queue bound per connection.
    pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1000;

    /// Default logic queue bound.
    pub const DEFAULT_DISPATCH_CAPACITY: usize = 65_536;

    /// Check the configuration before any thread is spawned.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.workers == 0 {
            return Err(ServerError::Config("workers must be at least 1".to_string()));
        }

        if self.limits.max_body_len > usize::from(u16::MAX) {
            return Err(ServerError::Config(format!(
                "max body length {} exceeds the 16-bit length field",
                self.limits.max_body_len
            )));
        }

        if self.limits.outbound_capacity == 0 {
            return Err(ServerError::Config("outbound capacity must be at least 1".to_string()));
        }

        if self.dispatch_capacity == 0 {
            return Err(ServerError::Config("dispatch capacity must be at least 1".to_string()));
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:10086".to_string(),
            backend: BackendKind::default(),
            workers: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            limits: ConnectionLimits::default(),
            dispatch_capacity: Self::DEFAULT_DISPATCH_CAPACITY,
            accept_backoff: Duration::from_millis(10),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}
