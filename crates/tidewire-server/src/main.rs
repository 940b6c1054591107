//! Tidewire server binary.
//!
//! Runs the framework with two demo handlers:
//!
//! - kind 1 (echo): replies with the received body plus a trailing `!`
//! - kind 2 (whoami): replies with the connection id as text
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 0.0.0.0:10086, one reactor per CPU
//! tidewire-server
//!
//! # Shared multi-threaded reactor with 4 workers
//! tidewire-server --bind 127.0.0.1:9000 --backend shared-pool --workers 4
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use clap::{Parser, ValueEnum};
use tidewire_server::{
    BackendKind, ConnectionLimits, HandlerRegistry, OverflowPolicy, Server, ServerConfig,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Message kind echoed back with a `!` appended.
const KIND_ECHO: u16 = 1;

/// Message kind answered with the caller's connection id.
const KIND_WHOAMI: u16 = 2;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    /// One single-threaded reactor per worker thread
    PerWorker,
    /// One multi-threaded reactor shared by all workers
    SharedPool,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::PerWorker => Self::PerWorker,
            BackendArg::SharedPool => Self::SharedPool,
        }
    }
}

/// Tidewire frame protocol server
#[derive(Parser, Debug)]
#[command(name = "tidewire-server")]
#[command(about = "Asynchronous TCP server for the Tidewire frame protocol")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:10086")]
    bind: String,

    /// Concurrency backend
    #[arg(long, value_enum, default_value = "per-worker")]
    backend: BackendArg,

    /// Number of I/O worker threads (defaults to available parallelism)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Largest accepted frame body in bytes
    #[arg(long, default_value = "2048")]
    max_body_len: usize,

    /// Outbound queue bound per connection (frames)
    #[arg(long, default_value = "1000")]
    send_queue: usize,

    /// Close a connection instead of dropping frames when its queue is full
    #[arg(long)]
    close_on_overflow: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let defaults = ServerConfig::default();
    let config = ServerConfig {
        bind_address: args.bind,
        backend: args.backend.into(),
        workers: args.workers.unwrap_or(defaults.workers),
        limits: ConnectionLimits {
            max_body_len: args.max_body_len,
            outbound_capacity: args.send_queue,
            overflow_policy: if args.close_on_overflow {
                OverflowPolicy::Close
            } else {
                OverflowPolicy::RejectNewest
            },
        },
        ..defaults
    };

    let mut server = Server::new(config, demo_handlers())?;
    server.start()?;

    // Park the main thread until Ctrl-C; stop() must run outside any runtime
    let signals = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    signals.block_on(tokio::signal::ctrl_c())?;
    drop(signals);

    tracing::info!("shutdown requested");
    server.stop();

    Ok(())
}

fn demo_handlers() -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();

    handlers.register(KIND_ECHO, |session, body| {
        let mut reply = BytesMut::with_capacity(body.len() + 1);
        reply.put_slice(&body);
        reply.put_u8(b'!');
        session.send(KIND_ECHO, reply.freeze())?;
        Ok(())
    });

    handlers.register(KIND_WHOAMI, |session, _body| {
        session.send(KIND_WHOAMI, Bytes::from(session.id().to_string()))?;
        Ok(())
    });

    handlers
}
