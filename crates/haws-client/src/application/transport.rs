//! Transport port: the socket abstraction the session rides on.
//!
//! The session never touches `tokio-tungstenite` directly.  It asks a
//! [`Connector`] for one connection and receives the two halves of an
//! ordered, bidirectional text-frame stream:
//!
//! - [`FrameSink`] – written by `send`, the handshake reply and keepalive
//!   probes, always behind the session's write lock so frames never
//!   interleave.
//! - [`FrameStream`] – read only by the session's read loop.
//!
//! Infrastructure implementations: `ws_transport::WsConnector` for real hubs
//! and `memory::MemoryConnector` for tests.

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be opened.
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading from the socket failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// The connection was already closed.
    #[error("connection closed")]
    Closed,
}

/// One frame read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame; the only class that carries protocol messages.
    Text(String),
    /// Binary frame.  Not part of the protocol.
    Binary(Vec<u8>),
    /// Transport-level liveness frames, answered by the socket library.
    Ping,
    Pong,
    /// The peer closed the connection, with its reason if one was given.
    Close(Option<String>),
}

/// Opens connections to the hub.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens exactly one connection and returns its write and read halves.
    async fn connect(&self) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError>;

    /// Human-readable address of the remote end, for log records.
    fn endpoint(&self) -> String;
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Writes one complete text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Closes the connection.  Called at most once per connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Returns the next frame, an error, or `None` once the stream has ended.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;
}
