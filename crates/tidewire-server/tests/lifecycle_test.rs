//! Connection and server lifecycle over real sockets.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use bytes::Bytes;
use tidewire_client::{Client, ClientError};
use tidewire_server::{BackendKind, HandlerRegistry, Server, ServerConfig, ServerError};
use tokio::runtime::Runtime;

const KIND_ECHO: u16 = 1;

fn config(backend: BackendKind) -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        backend,
        workers: 2,
        ..ServerConfig::default()
    }
}

/// Echo handler that also counts invocations.
fn counting_handlers(calls: &Arc<AtomicUsize>) -> HandlerRegistry {
    let calls = Arc::clone(calls);
    let mut handlers = HandlerRegistry::new();
    handlers.register(KIND_ECHO, move |session, body| {
        calls.fetch_add(1, Ordering::SeqCst);
        session.send(KIND_ECHO, body)?;
        Ok(())
    });
    handlers
}

fn start_server(backend: BackendKind, calls: &Arc<AtomicUsize>) -> (Server, SocketAddr) {
    let mut server = Server::new(config(backend), counting_handlers(calls)).unwrap();
    let addr = server.start().unwrap();
    (server, addr)
}

fn client_runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

/// Poll `condition` until it holds or five seconds pass.
fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

async fn round_trip(client: &mut Client, body: &'static [u8]) {
    client.send(KIND_ECHO, body).await.unwrap();
    let reply =
        tokio::time::timeout(Duration::from_secs(5), client.recv()).await.unwrap().unwrap();
    assert_eq!(reply.body.as_ref(), body);
}

async fn expect_closed(client: &mut Client) {
    let result = tokio::time::timeout(Duration::from_secs(5), client.recv()).await.unwrap();
    assert!(
        matches!(result, Err(ClientError::Closed | ClientError::Io(_))),
        "expected closed connection, got {result:?}"
    );
}

fn disconnect_removes_connection(backend: BackendKind) {
    let calls = Arc::new(AtomicUsize::new(0));
    let (server, addr) = start_server(backend, &calls);
    let rt = client_runtime();

    let mut client = rt.block_on(Client::connect(addr)).unwrap();
    rt.block_on(round_trip(&mut client, b"hello"));
    assert_eq!(server.connection_count(), 1);

    drop(client);
    assert!(wait_for(|| server.connection_count() == 0));
}

fn oversized_header_closes_connection(backend: BackendKind) {
    let calls = Arc::new(AtomicUsize::new(0));
    let (server, addr) = start_server(backend, &calls);
    let rt = client_runtime();

    rt.block_on(async {
        let mut client = Client::connect(addr).await.unwrap();
        // kind 1, announced body length 2049
        client.send_raw(&[0x00, 0x01, 0x08, 0x01]).await.unwrap();
        expect_closed(&mut client).await;
    });

    assert!(wait_for(|| server.connection_count() == 0));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

fn unknown_kind_keeps_connection(backend: BackendKind) {
    let calls = Arc::new(AtomicUsize::new(0));
    let (_server, addr) = start_server(backend, &calls);

    client_runtime().block_on(async {
        let mut client = Client::connect(addr).await.unwrap();
        client.send(99, &b"nobody listens"[..]).await.unwrap();
        round_trip(&mut client, b"still here").await;
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

fn many_clients(backend: BackendKind) {
    let calls = Arc::new(AtomicUsize::new(0));
    let (server, addr) = start_server(backend, &calls);
    let rt = client_runtime();

    let mut clients = Vec::new();
    for _ in 0..8 {
        let mut client = rt.block_on(Client::connect(addr)).unwrap();
        rt.block_on(round_trip(&mut client, b"hi"));
        clients.push(client);
    }

    assert_eq!(server.connection_count(), 8);
    assert_eq!(calls.load(Ordering::SeqCst), 8);

    drop(clients);
    assert!(wait_for(|| server.connection_count() == 0));
}

fn stop_with_connected_clients(backend: BackendKind) {
    let calls = Arc::new(AtomicUsize::new(0));
    let (mut server, addr) = start_server(backend, &calls);
    let rt = client_runtime();

    let mut clients = Vec::new();
    for _ in 0..3 {
        let mut client = rt.block_on(Client::connect(addr)).unwrap();
        rt.block_on(round_trip(&mut client, b"ping"));
        clients.push(client);
    }

    server.stop();
    assert!(!server.is_running());
    assert_eq!(server.connection_count(), 0);
    assert_eq!(server.local_addr(), None);

    rt.block_on(async {
        for client in &mut clients {
            expect_closed(client).await;
        }
    });

    // Second stop is a no-op
    server.stop();
}

#[test]
fn test_stop_releases_port() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (mut server, addr) = start_server(BackendKind::PerWorker, &calls);
    server.stop();

    let rt = client_runtime();
    let result = rt.block_on(Client::connect(addr));
    assert!(result.is_err());
}

#[test]
fn test_start_twice_fails() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (mut server, addr) = start_server(BackendKind::PerWorker, &calls);

    assert_eq!(server.local_addr(), Some(addr));
    assert!(matches!(server.start(), Err(ServerError::Internal(_))));

    server.stop();
    assert!(matches!(server.start(), Err(ServerError::Internal(_))));
}

#[test]
fn test_invalid_config_rejected() {
    let config = ServerConfig { workers: 0, ..config(BackendKind::PerWorker) };
    let result = Server::new(config, HandlerRegistry::new());
    assert!(matches!(result, Err(ServerError::Config(_))));
}

#[test]
fn test_bind_failure_reported() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (_first, addr) = start_server(BackendKind::PerWorker, &calls);

    let config =
        ServerConfig { bind_address: addr.to_string(), ..config(BackendKind::PerWorker) };
    let mut second = Server::new(config, HandlerRegistry::new()).unwrap();
    assert!(matches!(second.start(), Err(ServerError::Transport(_))));
}

fn send_after_disconnect_fails(backend: BackendKind) {
    let calls = Arc::new(AtomicUsize::new(0));
    let (server, addr) = start_server(backend, &calls);
    let rt = client_runtime();

    let mut client = rt.block_on(Client::connect(addr)).unwrap();
    rt.block_on(round_trip(&mut client, b"x"));

    let id = server.connection_ids()[0];
    let session = server.session(id).unwrap();

    drop(client);
    assert!(wait_for(|| session.is_closed()));
    assert!(session.send(KIND_ECHO, Bytes::from_static(b"late")).is_err());
    assert!(server.session(id).is_none());
}

/// Run each scenario once per backend.
macro_rules! lifecycle_suite {
    ($($scenario:ident),* $(,)?) => {
        mod per_worker {
            $(
                #[test]
                fn $scenario() {
                    super::$scenario(super::BackendKind::PerWorker);
                }
            )*
        }

        mod shared_pool {
            $(
                #[test]
                fn $scenario() {
                    super::$scenario(super::BackendKind::SharedPool);
                }
            )*
        }
    };
}

lifecycle_suite!(
    disconnect_removes_connection,
    oversized_header_closes_connection,
    unknown_kind_keeps_connection,
    many_clients,
    stop_with_connected_clients,
    send_after_disconnect_fails,
);
