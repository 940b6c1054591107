//! Logic dispatch: handler table and the single-threaded logic queue.
//!
//! Network I/O runs on many backend workers, but application handlers all run
//! on one dedicated logic thread. Reader tasks [`Dispatcher::post`] every
//! inbound frame; the logic worker pops them one at a time and invokes the
//! handler registered for the frame kind.
//!
//! # Ordering
//!
//! The queue is a single FIFO. Frames from one connection are posted by one
//! reader task in read order, so handlers observe them in that order.
//!
//! # Shutdown
//!
//! [`LogicQueue::stop`] marks the queue stopping and wakes the worker. The
//! worker then drains everything still queued, invokes the handlers, and
//! exits. Posts after that point fail with [`DispatchError::Stopped`].

use std::{
    collections::{HashMap, VecDeque},
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use bytes::Bytes;
use tidewire_proto::Frame;

use crate::{
    error::{DispatchError, HandlerError, ServerError},
    session::Session,
};

/// Application callback for one message kind.
///
/// Receives the originating session and the frame body. Runs on the logic
/// thread, so it must not block for long: every other message waits behind it.
pub type Handler = Arc<dyn Fn(&dyn Session, Bytes) -> Result<(), HandlerError> + Send + Sync>;

/// Kind-to-handler table, fixed once the server starts.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<u16, Handler>,
}

impl HandlerRegistry {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`. A later registration for the same kind
    /// replaces the earlier one.
    pub fn register<F>(&mut self, kind: u16, handler: F) -> &mut Self
    where
        F: Fn(&dyn Session, Bytes) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        if self.handlers.insert(kind, Arc::new(handler)).is_some() {
            tracing::debug!(kind, "replacing handler");
        }
        self
    }

    /// Handler for `kind`, if any.
    pub fn get(&self, kind: u16) -> Option<&Handler> {
        self.handlers.get(&kind)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort_unstable();
        f.debug_struct("HandlerRegistry").field("kinds", &kinds).finish()
    }
}

/// One inbound frame paired with the session it arrived on.
pub struct Envelope {
    /// Originating session. Keeps the connection alive until handled.
    pub session: Arc<dyn Session>,
    /// The decoded frame
    pub frame: Frame,
}

struct QueueState {
    entries: VecDeque<Envelope>,
    stopping: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    ready: Condvar,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable producer handle onto the logic queue.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Enqueue a message for the logic worker. Never blocks.
    ///
    /// # Errors
    ///
    /// - `DispatchError::Full` if `capacity` messages are already waiting
    /// - `DispatchError::Stopped` once shutdown has begun
    pub fn post(&self, envelope: Envelope) -> Result<(), DispatchError> {
        let mut state = self.shared.lock();
        if state.stopping {
            return Err(DispatchError::Stopped);
        }
        if state.entries.len() >= self.shared.capacity {
            return Err(DispatchError::Full { capacity: self.shared.capacity });
        }

        state.entries.push_back(envelope);
        let wake = state.entries.len() == 1;
        drop(state);

        // The worker only sleeps on an empty queue
        if wake {
            self.shared.ready.notify_one();
        }
        Ok(())
    }

    /// Messages waiting to be handled.
    pub fn pending(&self) -> usize {
        self.shared.lock().entries.len()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending())
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}

/// The logic queue and its worker thread.
pub struct LogicQueue {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl LogicQueue {
    /// Spawn the logic worker.
    ///
    /// # Errors
    ///
    /// `ServerError::Internal` if the thread cannot be spawned.
    pub fn start(handlers: HandlerRegistry, capacity: usize) -> Result<Self, ServerError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState { entries: VecDeque::new(), stopping: false }),
            ready: Condvar::new(),
            capacity: capacity.max(1),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("tidewire-logic".to_string())
            .spawn(move || run_worker(&worker_shared, &handlers))
            .map_err(|e| ServerError::Internal(format!("failed to spawn logic thread: {e}")))?;

        Ok(Self { shared, worker: Some(worker) })
    }

    /// Producer handle for reader tasks.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher { shared: Arc::clone(&self.shared) }
    }

    /// Messages waiting to be handled.
    pub fn pending(&self) -> usize {
        self.shared.lock().entries.len()
    }

    /// Stop accepting posts, handle everything already queued, and join the
    /// worker. Idempotent.
    pub fn stop(&mut self) {
        self.shared.lock().stopping = true;
        self.shared.ready.notify_all();

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("logic worker panicked");
            }
        }
    }
}

impl Drop for LogicQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(shared: &Shared, handlers: &HandlerRegistry) {
    tracing::debug!("logic worker started");

    loop {
        let mut state = shared.lock();
        while state.entries.is_empty() && !state.stopping {
            state = shared.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }

        if state.stopping {
            let remaining: Vec<_> = state.entries.drain(..).collect();
            drop(state);

            if !remaining.is_empty() {
                tracing::debug!(count = remaining.len(), "draining logic queue");
            }
            for envelope in remaining {
                handle(handlers, envelope);
            }
            break;
        }

        let next = state.entries.pop_front();
        drop(state);

        if let Some(envelope) = next {
            handle(handlers, envelope);
        }
    }

    tracing::debug!("logic worker stopped");
}

fn handle(handlers: &HandlerRegistry, envelope: Envelope) {
    let Envelope { session, frame } = envelope;
    let kind = frame.kind();

    let Some(handler) = handlers.get(kind) else {
        tracing::warn!(session = %session.id(), kind, "no handler for message kind");
        return;
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(session.as_ref(), frame.body)));

    match outcome {
        Ok(Ok(())) => {},
        Ok(Err(e)) => {
            tracing::error!(session = %session.id(), kind, "handler error: {}", e);
        },
        Err(_) => {
            tracing::error!(session = %session.id(), kind, "handler panicked");
        },
    }
}
