//! Concurrency backends.
//!
//! A backend owns the threads that drive connection I/O and hands out
//! reactors (Tokio runtime handles) for new connections. Two strategies share
//! the [`Backend`] interface:
//!
//! - [`PerWorkerBackend`]: N single-threaded runtimes, one per named thread.
//!   `acquire` rotates through them, so connections are spread evenly and each
//!   connection stays on one thread for its whole life.
//! - [`SharedPoolBackend`]: one multi-threaded runtime with N workers.
//!   `acquire` always returns the same handle and the scheduler balances load.
//!
//! The connection code is identical under both. Connection state is already
//! behind a lock, so nothing relies on single-threaded execution.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tokio::{
    runtime::{Builder, Handle, Runtime},
    sync::oneshot,
};

use crate::{config::BackendKind, error::ServerError};

/// Source of reactors for accepted connections.
pub trait Backend: Send + Sync {
    /// Reactor to run the next connection on.
    fn acquire(&self) -> Handle;

    /// Number of threads driving I/O.
    fn worker_count(&self) -> usize;

    /// Stop every worker. Tasks still running on the reactors are dropped,
    /// which closes their sockets. Idempotent.
    fn shutdown(&self);
}

/// Build the backend selected by `kind`.
///
/// # Errors
///
/// - `ServerError::Config` if `workers` is zero
/// - `ServerError::Internal` if a runtime or thread cannot be created
pub fn build(
    kind: BackendKind,
    workers: usize,
    shutdown_timeout: Duration,
) -> Result<Arc<dyn Backend>, ServerError> {
    Ok(match kind {
        BackendKind::PerWorker => Arc::new(PerWorkerBackend::new(workers)?),
        BackendKind::SharedPool => Arc::new(SharedPoolBackend::new(workers, shutdown_timeout)?),
    })
}

struct WorkerThread {
    stop: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

/// One current-thread runtime per worker thread, assigned round-robin.
pub struct PerWorkerBackend {
    handles: Vec<Handle>,
    next: AtomicUsize,
    threads: Mutex<Vec<WorkerThread>>,
}

impl PerWorkerBackend {
    /// Spawn `workers` threads named `tidewire-io-{index}`, each running its
    /// own event loop until [`Backend::shutdown`].
    pub fn new(workers: usize) -> Result<Self, ServerError> {
        if workers == 0 {
            return Err(ServerError::Config("backend needs at least one worker".to_string()));
        }

        let mut handles = Vec::with_capacity(workers);
        let mut threads = Vec::with_capacity(workers);

        for index in 0..workers {
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| ServerError::Internal(format!("failed to build runtime: {e}")))?;
            handles.push(runtime.handle().clone());

            let (stop, stopped) = oneshot::channel::<()>();
            let spawned = thread::Builder::new().name(format!("tidewire-io-{index}")).spawn(
                move || {
                    // Either a stop signal or a dropped sender ends the loop
                    let _ = runtime.block_on(stopped);
                },
            );

            match spawned {
                Ok(thread) => threads.push(WorkerThread { stop, thread }),
                Err(e) => {
                    stop_workers(threads);
                    return Err(ServerError::Internal(format!("failed to spawn I/O worker: {e}")));
                },
            }
        }

        tracing::debug!(workers, "per-worker backend started");

        Ok(Self { handles, next: AtomicUsize::new(0), threads: Mutex::new(threads) })
    }
}

impl Backend for PerWorkerBackend {
    fn acquire(&self) -> Handle {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.handles.len();
        self.handles[index].clone()
    }

    fn worker_count(&self) -> usize {
        self.handles.len()
    }

    fn shutdown(&self) {
        let threads =
            std::mem::take(&mut *self.threads.lock().unwrap_or_else(PoisonError::into_inner));
        if !threads.is_empty() {
            stop_workers(threads);
            tracing::debug!("per-worker backend stopped");
        }
    }
}

impl Drop for PerWorkerBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn stop_workers(threads: Vec<WorkerThread>) {
    let current = thread::current().id();
    let mut joins = Vec::with_capacity(threads.len());

    // Signal everyone first so the workers wind down in parallel
    for WorkerThread { stop, thread } in threads {
        let _ = stop.send(());
        joins.push(thread);
    }

    for thread in joins {
        // A worker cannot join itself
        if thread.thread().id() == current {
            continue;
        }
        if thread.join().is_err() {
            tracing::error!("I/O worker panicked");
        }
    }
}

/// One multi-threaded runtime shared by every connection.
pub struct SharedPoolBackend {
    handle: Handle,
    workers: usize,
    shutdown_timeout: Duration,
    runtime: Mutex<Option<Runtime>>,
}

impl SharedPoolBackend {
    /// Start a runtime with `workers` threads named `tidewire-pool`.
    pub fn new(workers: usize, shutdown_timeout: Duration) -> Result<Self, ServerError> {
        if workers == 0 {
            return Err(ServerError::Config("backend needs at least one worker".to_string()));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("tidewire-pool")
            .enable_all()
            .build()
            .map_err(|e| ServerError::Internal(format!("failed to build runtime: {e}")))?;

        tracing::debug!(workers, "shared-pool backend started");

        Ok(Self {
            handle: runtime.handle().clone(),
            workers,
            shutdown_timeout,
            runtime: Mutex::new(Some(runtime)),
        })
    }
}

impl Backend for SharedPoolBackend {
    fn acquire(&self) -> Handle {
        self.handle.clone()
    }

    fn worker_count(&self) -> usize {
        self.workers
    }

    fn shutdown(&self) {
        let runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(runtime) = runtime else {
            return;
        };

        // Blocking shutdown panics inside an async context
        if Handle::try_current().is_ok() {
            tracing::warn!(
                "shared-pool backend stopped from inside a runtime; pool threads are not joined"
            );
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(self.shutdown_timeout);
        }
        tracing::debug!("shared-pool backend stopped");
    }
}

impl Drop for SharedPoolBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
