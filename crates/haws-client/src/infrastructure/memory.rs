//! In-memory transport for tests and local experiments.
//!
//! A [`MemoryConnector`] hands out pre-arranged connections, one per
//! `connect()` call.  Each connection's far end is a [`MemoryPeer`] through
//! which a test plays the hub: it pushes inbound frames and inspects what the
//! session wrote.  When no connection is left, `connect()` fails like a
//! refused socket.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::application::session::lock;
use crate::application::transport::{Connector, Frame, FrameSink, FrameStream, TransportError};

type Inbound = Result<Frame, TransportError>;

/// Counters and switches shared between a peer and its session-side halves.
#[derive(Debug, Default)]
struct PeerState {
    close_calls: AtomicUsize,
    closed: AtomicBool,
    fail_writes: AtomicBool,
}

/// Session-side halves of one prepared connection.
struct Halves {
    sink: MemorySink,
    stream: MemoryStream,
}

/// Connector serving prepared in-memory connections in order.
#[derive(Default)]
pub struct MemoryConnector {
    pending: Mutex<VecDeque<Halves>>,
    connects: AtomicUsize,
}

impl MemoryConnector {
    /// A connector with no connections prepared; every `connect()` fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector with exactly one prepared connection, and its peer.
    pub fn pair() -> (Self, MemoryPeer) {
        let connector = Self::new();
        let peer = connector.add_peer();
        (connector, peer)
    }

    /// Prepares one more connection and returns its hub-side end.
    pub fn add_peer(&self) -> MemoryPeer {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(PeerState::default());

        lock(&self.pending).push_back(Halves {
            sink: MemorySink {
                outbound: outbound_tx,
                state: Arc::clone(&state),
            },
            stream: MemoryStream { inbound: inbound_rx },
        });

        MemoryPeer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
            state,
        }
    }

    /// Number of `connect()` calls so far, successful or not.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let halves = lock(&self.pending)
            .pop_front()
            .ok_or_else(|| TransportError::Connect {
                url: self.endpoint(),
                reason: "connection refused".to_string(),
            })?;
        Ok((Box::new(halves.sink), Box::new(halves.stream)))
    }

    fn endpoint(&self) -> String {
        "memory://hub".to_string()
    }
}

struct MemorySink {
    outbound: mpsc::UnboundedSender<String>,
    state: Arc<PeerState>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Send("write failure injected".to_string()));
        }
        self.outbound.send(text).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryStream {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn next_frame(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }
}

/// The hub's end of one in-memory connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    outbound: mpsc::UnboundedReceiver<String>,
    state: Arc<PeerState>,
}

impl MemoryPeer {
    /// Delivers a text frame to the session.  Returns `false` if the read
    /// side is gone.
    pub fn push_text(&self, text: &str) -> bool {
        self.push_frame(Frame::Text(text.to_string()))
    }

    pub fn push_frame(&self, frame: Frame) -> bool {
        self.push(Ok(frame))
    }

    /// Makes the session's next read fail.
    pub fn push_error(&self, reason: &str) -> bool {
        self.push(Err(TransportError::Receive(reason.to_string())))
    }

    fn push(&self, item: Inbound) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(item).is_ok())
    }

    /// Ends the inbound stream, as if the hub dropped the connection.
    pub fn end_stream(&mut self) {
        self.inbound = None;
    }

    /// Waits up to `within` for the next frame the session wrote.
    pub async fn expect_sent(&mut self, within: Duration) -> Option<String> {
        tokio::time::timeout(within, self.outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Returns an already-written frame without waiting.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    /// Waits up to `within` for the session to close its write half.
    pub async fn wait_closed(&self, within: Duration) -> bool {
        let poll = async {
            while !self.state.closed.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(within, poll).await.is_ok()
    }

    /// How many times the session closed this connection.
    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// Makes every following write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
