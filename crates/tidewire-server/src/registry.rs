//! Registry of live connections.
//!
//! The registry maps connection ids to *weak* session handles. Tasks driving a
//! connection own it; the registry only answers "is this id still live, and
//! if so give me a handle". Removing an entry therefore never frees a
//! connection out from under an in-flight read or write.
//!
//! One lock guards the whole map. It is held only for the map operation
//! itself, never across I/O or a call into a session.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use crate::session::{ConnectionId, Session};

/// Server-wide table of live connections keyed by id.
#[derive(Default)]
pub struct Registry {
    sessions: Mutex<HashMap<ConnectionId, Weak<dyn Session>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its id.
    ///
    /// Returns `false` (and leaves the existing entry alone) if the id is
    /// already registered.
    pub fn insert<S>(&self, session: &Arc<S>) -> bool
    where
        S: Session + 'static,
    {
        let id = session.id();
        let weak = Arc::downgrade(session);
        let weak: Weak<dyn Session> = weak;

        let mut sessions = self.lock();
        if sessions.contains_key(&id) {
            return false;
        }
        sessions.insert(id, weak);
        true
    }

    /// Remove a session.
    ///
    /// Idempotent: returns `true` only for the call that actually removed the
    /// entry. Safe to call from any thread.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Handle to a live session. `None` if unknown or already dropped.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<dyn Session>> {
        self.lock().get(&id).and_then(Weak::upgrade)
    }

    /// Check if an id is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Ids of every registered session, in no particular order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.lock().keys().copied().collect()
    }

    /// Empty the registry, returning the sessions that were still alive.
    ///
    /// The lock is released before the caller touches the sessions, so
    /// closing them (which calls back into [`Registry::remove`]) is safe.
    pub fn drain(&self) -> Vec<Arc<dyn Session>> {
        let drained: Vec<_> = self.lock().drain().collect();
        drained.into_iter().filter_map(|(_, weak)| weak.upgrade()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Weak<dyn Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("sessions", &self.len()).finish()
    }
}
