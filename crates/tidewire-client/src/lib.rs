//! Tidewire client.
//!
//! A thin async TCP client for the Tidewire frame protocol: connect, send
//! frames, receive frames. There is no request/response matching; replies
//! arrive in whatever order the server's handlers produce them.
//!
//! ```no_run
//! # async fn demo() -> Result<(), tidewire_client::ClientError> {
//! let mut client = tidewire_client::Client::connect("127.0.0.1:10086").await?;
//! client.send(1, &b"ping"[..]).await?;
//! let reply = client.recv().await?;
//! assert_eq!(reply.body.as_ref(), b"ping!");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;

use std::net::SocketAddr;

use bytes::Bytes;
pub use error::ClientError;
pub use tidewire_proto::Frame;
use tidewire_proto::{
    FrameHeader,
    stream::{read_frame, write_frame},
};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

/// Connected client.
#[derive(Debug)]
pub struct Client {
    reader: ClientReader,
    writer: ClientWriter,
}

impl Client {
    /// Connect with the default body limit.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        Self::connect_with_limit(addr, FrameHeader::MAX_BODY_LEN).await
    }

    /// Connect, accepting and producing bodies up to `max_body_len` bytes.
    pub async fn connect_with_limit(
        addr: impl ToSocketAddrs,
        max_body_len: usize,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: ClientReader { inner: BufReader::new(read_half), max_body_len },
            writer: ClientWriter { inner: write_half, max_body_len, local_addr, peer_addr },
        })
    }

    /// Send one frame.
    pub async fn send(&mut self, kind: u16, body: impl Into<Bytes>) -> Result<(), ClientError> {
        self.writer.send(kind, body).await
    }

    /// Write raw bytes, bypassing framing. For exercising server error paths.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.writer.send_raw(bytes).await
    }

    /// Wait for the next frame.
    ///
    /// # Errors
    ///
    /// `ClientError::Closed` once the server has closed the connection.
    pub async fn recv(&mut self) -> Result<Frame, ClientError> {
        self.reader.recv().await
    }

    /// Split into independently owned halves, e.g. to send from one task while
    /// receiving on another.
    pub fn into_split(self) -> (ClientReader, ClientWriter) {
        (self.reader, self.writer)
    }

    /// Local socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.writer.local_addr
    }

    /// Server address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.writer.peer_addr
    }
}

/// Receiving half of a [`Client`].
#[derive(Debug)]
pub struct ClientReader {
    inner: BufReader<OwnedReadHalf>,
    max_body_len: usize,
}

impl ClientReader {
    /// Wait for the next frame.
    pub async fn recv(&mut self) -> Result<Frame, ClientError> {
        read_frame(&mut self.inner, self.max_body_len).await?.ok_or(ClientError::Closed)
    }
}

/// Sending half of a [`Client`].
#[derive(Debug)]
pub struct ClientWriter {
    inner: OwnedWriteHalf,
    max_body_len: usize,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl ClientWriter {
    /// Send one frame.
    pub async fn send(&mut self, kind: u16, body: impl Into<Bytes>) -> Result<(), ClientError> {
        let frame = Frame::with_limit(kind, body, self.max_body_len)?;
        write_frame(&mut self.inner, &frame).await?;
        Ok(())
    }

    /// Write raw bytes, bypassing framing.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.inner.write_all(bytes).await?;
        Ok(())
    }

    /// Half-close the connection. The server sees EOF.
    pub async fn shutdown(&mut self) -> Result<(), ClientError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
