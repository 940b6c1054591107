//! One accepted TCP connection.
//!
//! Each connection runs two tasks on the reactor it was assigned at accept
//! time:
//!
//! - the **reader** pulls frames off the socket (header, validate, body) and
//!   posts them to the logic queue
//! - the **writer** sleeps until [`Connection::send`] reports that it was idle,
//!   then drains the outbound queue one frame at a time
//!
//! Either task failing closes the connection. Closing is idempotent: the first
//! call discards queued output, wakes both tasks so they stop touching the
//! socket, and removes the connection from the registry. The tasks hold
//! `Arc<Connection>`, so the connection outlives its registry entry until the
//! last task (or in-flight handler) lets go.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use tidewire_proto::{
    Frame,
    stream::{ReadError, read_frame},
};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    runtime::Handle,
    sync::{Notify, watch},
};

use crate::{
    config::{ConnectionLimits, OverflowPolicy},
    dispatch::{Dispatcher, Envelope},
    error::{DispatchError, SendError},
    outbound::{OutboundQueue, Push},
    registry::Registry,
    session::{ConnectionId, Session},
};

/// Read buffer size. Large enough to pull several small frames per syscall.
const READ_BUFFER_SIZE: usize = 8 * 1024;

struct ConnectionState {
    outbound: OutboundQueue,
    closed: bool,
}

/// A live peer connection.
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    limits: ConnectionLimits,
    state: Mutex<ConnectionState>,
    /// Wakes the writer after an idle-to-active transition
    write_ready: Notify,
    /// Flips to `true` exactly once, on close
    shutdown: watch::Sender<bool>,
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
}

impl Connection {
    /// Create a connection. Nothing runs until [`Connection::start`].
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        limits: ConnectionLimits,
        registry: Arc<Registry>,
        dispatcher: Dispatcher,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            id,
            peer,
            limits,
            state: Mutex::new(ConnectionState {
                outbound: OutboundQueue::new(limits.outbound_capacity),
                closed: false,
            }),
            write_ready: Notify::new(),
            shutdown,
            registry,
            dispatcher,
        })
    }

    /// Spawn the connection's tasks on `reactor`.
    ///
    /// `stream` must be in non-blocking mode. It is re-registered with the
    /// target reactor from inside the spawned task, so the socket is owned by
    /// that reactor for the rest of its life.
    pub fn start(self: &Arc<Self>, reactor: &Handle, stream: std::net::TcpStream) {
        let connection = Arc::clone(self);
        reactor.spawn(async move { connection.run(stream).await });
    }

    /// Peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Frames queued or in flight.
    pub fn pending_writes(&self) -> usize {
        self.lock().outbound.pending()
    }

    async fn run(self: Arc<Self>, stream: std::net::TcpStream) {
        let stream = match TcpStream::from_std(stream) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(connection = %self.id, "failed to register socket: {}", e);
                self.close_once();
                return;
            },
        };

        tracing::debug!(connection = %self.id, peer = %self.peer, "connection started");

        let (reader, writer) = stream.into_split();
        let writer_task = tokio::spawn(Arc::clone(&self).write_loop(writer));

        self.read_loop(reader).await;
        self.close_once();

        if let Err(e) = writer_task.await {
            tracing::error!(connection = %self.id, "writer task failed: {}", e);
        }
    }

    async fn read_loop(self: &Arc<Self>, reader: OwnedReadHalf) {
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, reader);
        let mut shutdown = self.shutdown.subscribe();

        loop {
            let result = tokio::select! {
                biased;
                () = closed(&mut shutdown) => break,
                result = read_frame(&mut reader, self.limits.max_body_len) => result,
            };

            match result {
                Ok(Some(frame)) => {
                    let session = Arc::clone(self);
                    let session: Arc<dyn Session> = session;
                    match self.dispatcher.post(Envelope { session, frame }) {
                        Ok(()) => {},
                        Err(e @ DispatchError::Full { .. }) => {
                            tracing::warn!(connection = %self.id, "{}; closing connection", e);
                            break;
                        },
                        Err(DispatchError::Stopped) => break,
                    }
                },
                Ok(None) => {
                    tracing::debug!(connection = %self.id, "peer closed connection");
                    break;
                },
                Err(ReadError::Protocol(e)) => {
                    tracing::warn!(
                        connection = %self.id,
                        peer = %self.peer,
                        "protocol violation: {}",
                        e
                    );
                    break;
                },
                Err(ReadError::Io(e)) => {
                    tracing::debug!(connection = %self.id, "read error: {}", e);
                    break;
                },
            }
        }
    }

    async fn write_loop(self: Arc<Self>, mut writer: OwnedWriteHalf) {
        let mut shutdown = self.shutdown.subscribe();

        'outer: loop {
            tokio::select! {
                biased;
                () = closed(&mut shutdown) => break,
                () = self.write_ready.notified() => {},
            }

            while let Some(frame) = self.next_write() {
                let result = tokio::select! {
                    biased;
                    () = closed(&mut shutdown) => break 'outer,
                    result = writer.write_all(&frame) => result,
                };

                if let Err(e) = result {
                    tracing::debug!(connection = %self.id, "write error: {}", e);
                    self.close_once();
                    break 'outer;
                }
            }
        }

        // Best effort FIN; the peer may already be gone
        let _ = writer.shutdown().await;
    }

    fn next_write(&self) -> Option<Bytes> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.outbound.next_write()
    }

    /// Close the connection. Returns `true` only for the call that actually
    /// closed it.
    fn close_once(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        let dropped = state.outbound.clear();
        drop(state);

        self.shutdown.send_replace(true);
        self.registry.remove(self.id);

        tracing::debug!(connection = %self.id, peer = %self.peer, dropped, "connection closed");
        true
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Session for Connection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, kind: u16, body: Bytes) -> Result<(), SendError> {
        let frame = Frame::with_limit(kind, body, self.limits.max_body_len)?;

        let mut state = self.lock();
        if state.closed {
            return Err(SendError::Closed);
        }

        match state.outbound.push(frame.to_bytes()) {
            Ok(Push::StartWrite) => {
                drop(state);
                self.write_ready.notify_one();
                Ok(())
            },
            Ok(Push::Queued) => Ok(()),
            Err(e) => {
                drop(state);
                match self.limits.overflow_policy {
                    OverflowPolicy::RejectNewest => {
                        tracing::warn!(connection = %self.id, "{}; dropping frame", e);
                    },
                    OverflowPolicy::Close => {
                        tracing::warn!(connection = %self.id, "{}; closing connection", e);
                        self.close_once();
                    },
                }
                Err(e)
            },
        }
    }

    fn close(&self) {
        self.close_once();
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer_addr())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Resolves once the connection is closed.
async fn closed(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also means the connection is gone
    let _ = shutdown.wait_for(|closed| *closed).await;
}
