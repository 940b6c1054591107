//! Listener, accept loop and server lifecycle.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
};

use crate::{
    backend::{self, Backend},
    config::{ConnectionLimits, ServerConfig},
    connection::Connection,
    dispatch::{Dispatcher, HandlerRegistry, LogicQueue},
    error::ServerError,
    registry::Registry,
    session::{ConnectionId, Session},
};

enum Lifecycle {
    Idle,
    Running { local_addr: SocketAddr, stop: watch::Sender<bool> },
    Stopped,
}

/// TCP server: owns the backend, the connection registry and the logic queue.
///
/// ```no_run
/// use tidewire_server::{HandlerRegistry, Server, ServerConfig};
///
/// let mut handlers = HandlerRegistry::new();
/// handlers.register(1, |session, body| {
///     session.send(1, body)?;
///     Ok(())
/// });
///
/// let mut server = Server::new(ServerConfig::default(), handlers)?;
/// let addr = server.start()?;
/// println!("listening on {addr}");
/// // ...
/// server.stop();
/// # Ok::<(), tidewire_server::ServerError>(())
/// ```
pub struct Server {
    config: ServerConfig,
    backend: Arc<dyn Backend>,
    registry: Arc<Registry>,
    logic: LogicQueue,
    lifecycle: Lifecycle,
}

impl Server {
    /// Validate `config`, start the backend workers and the logic thread.
    ///
    /// Nothing is bound until [`Server::start`].
    pub fn new(config: ServerConfig, handlers: HandlerRegistry) -> Result<Self, ServerError> {
        config.validate()?;

        let backend = backend::build(config.backend, config.workers, config.shutdown_timeout)?;
        let logic = LogicQueue::start(handlers, config.dispatch_capacity)?;

        Ok(Self {
            config,
            backend,
            registry: Arc::new(Registry::new()),
            logic,
            lifecycle: Lifecycle::Idle,
        })
    }

    /// Bind the listener and begin accepting. Returns the bound address,
    /// which differs from the configured one when binding port 0.
    ///
    /// # Errors
    ///
    /// - `ServerError::Transport` if the address cannot be bound
    /// - `ServerError::Internal` if the server was already started or stopped
    pub fn start(&mut self) -> Result<SocketAddr, ServerError> {
        match self.lifecycle {
            Lifecycle::Idle => {},
            Lifecycle::Running { .. } => {
                return Err(ServerError::Internal("server already started".to_string()));
            },
            Lifecycle::Stopped => {
                return Err(ServerError::Internal("server already stopped".to_string()));
            },
        }

        let listener = std::net::TcpListener::bind(&self.config.bind_address).map_err(|e| {
            ServerError::Transport(format!("failed to bind {}: {}", self.config.bind_address, e))
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (stop, stop_rx) = watch::channel(false);
        let acceptor = Acceptor {
            backend: Arc::clone(&self.backend),
            registry: Arc::clone(&self.registry),
            dispatcher: self.logic.dispatcher(),
            limits: self.config.limits,
            backoff: self.config.accept_backoff,
            stop: stop_rx,
        };
        self.backend.acquire().spawn(acceptor.run(listener));

        tracing::info!(
            backend = ?self.config.backend,
            workers = self.backend.worker_count(),
            "server listening on {}",
            local_addr
        );

        self.lifecycle = Lifecycle::Running { local_addr, stop };
        Ok(local_addr)
    }

    /// Stop accepting, stop the I/O workers, close every connection, then
    /// drain and stop the logic thread. Idempotent.
    ///
    /// Must not be called from a handler: it waits for the logic thread.
    /// Called from inside a Tokio runtime, the shared-pool backend cannot
    /// block, so its threads are released in the background instead of
    /// joined.
    pub fn stop(&mut self) {
        let previous = std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped);
        if matches!(previous, Lifecycle::Stopped) {
            return;
        }

        if let Lifecycle::Running { stop, .. } = previous {
            stop.send_replace(true);
        }

        self.backend.shutdown();

        let sessions = self.registry.drain();
        let closing = sessions.len();
        for session in sessions {
            session.close();
        }

        self.logic.stop();

        tracing::info!(closed = closing, "server stopped");
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.lifecycle {
            Lifecycle::Running { local_addr, .. } => Some(local_addr),
            Lifecycle::Idle | Lifecycle::Stopped => None,
        }
    }

    /// Whether the server is accepting connections.
    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running { .. })
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Ids of every registered connection.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.registry.ids()
    }

    /// Look up a live connection, e.g. to push a frame from outside a handler.
    pub fn session(&self, id: ConnectionId) -> Option<Arc<dyn Session>> {
        self.registry.get(id)
    }

    /// Messages waiting on the logic thread.
    pub fn pending_messages(&self) -> usize {
        self.logic.pending()
    }

    /// Active configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

/// The accept loop. Runs on one of the backend's reactors.
struct Acceptor {
    backend: Arc<dyn Backend>,
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    limits: ConnectionLimits,
    backoff: Duration,
    stop: watch::Receiver<bool>,
}

impl Acceptor {
    async fn run(mut self, listener: std::net::TcpListener) {
        let listener = match TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!("failed to register listener: {}", e);
                return;
            },
        };

        loop {
            let accepted = tokio::select! {
                biased;
                () = stopped(&mut self.stop) => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) => {
                    // Usually descriptor exhaustion; the listener stays armed
                    tracing::error!("accept error: {}", e);
                    tokio::time::sleep(self.backoff).await;
                },
            }
        }

        tracing::debug!("acceptor stopped");
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, "failed to set TCP_NODELAY: {}", e);
        }

        let stream = match stream.into_std() {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(%peer, "failed to detach accepted socket: {}", e);
                return;
            },
        };

        let id = match ConnectionId::generate() {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(%peer, "dropping connection: {}", e);
                return;
            },
        };

        let connection = Connection::new(
            id,
            peer,
            self.limits,
            Arc::clone(&self.registry),
            self.dispatcher.clone(),
        );
        if !self.registry.insert(&connection) {
            tracing::warn!(connection = %id, "connection id collision; dropping connection");
            return;
        }

        connection.start(&self.backend.acquire(), stream);
        tracing::debug!(connection = %id, %peer, "accepted connection");
    }
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}
