//! The protocol session: one connection, its handshake, and request/result
//! correlation.
//!
//! # Lifecycle
//!
//! ```text
//! Session::new ─▶ start() ─▶ [read loop task]
//!                               connect ─▶ auth_required ─▶ send auth
//!                                       ─▶ auth_ok ─▶ ids active, signal fired
//!                                       ─▶ result / event / other frames …
//!                               transport fault, auth_invalid, handler panic
//!                                       ─▶ close()
//! ```
//!
//! A session instance is single-use: once closed it stays closed, and the
//! supervisor builds a new instance to reconnect.  Nothing (ids, handlers,
//! the authentication signal) survives from one instance to the next.
//!
//! # Concurrency
//!
//! Three activities share a session: the read loop, the keepalive task and
//! whatever application tasks call [`Session::send`].  They meet at two
//! places:
//!
//! - the state lock (`std::sync::Mutex<Shared>`), which guards the session
//!   state and both tables and is never held across an `.await`;
//! - the write lock (`tokio::sync::Mutex` around the frame sink), which makes
//!   each frame write atomic.
//!
//! Frames are dispatched one at a time on the read loop, in arrival order.
//! Handlers are taken out of the tables before they are awaited, so a handler
//! may call `send`, `subscribe` or `close` on the same session.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use haws_core::protocol::messages::{self, message_id, message_type, RESERVED_TYPES};
use haws_core::{decode, encode, Inbound, Message, MessageId, MessageIdAllocator, ProtocolError, SessionState};

use crate::application::handlers::{Delivery, MessageHandler, ResultHandler};
use crate::application::tables::{CorrelationTable, DispatchTable};
use crate::application::transport::{Connector, Frame, FrameSink, TransportError};
use crate::domain::config::SessionConfig;

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors reported by the session.
///
/// Only misuse and timeouts reach callers.  Transport and protocol faults are
/// handled inside the read loop (logged, then `close()`); they appear here
/// because the read loop uses this type internally.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `start()` was called while the read loop is still running.
    #[error("session already started")]
    AlreadyStarted,

    /// `start_keepalive()` was called while a keepalive is running.
    #[error("keepalive already in progress")]
    AlreadyInProgress,

    /// The session has been closed; build a new one to reconnect.
    #[error("session is closed")]
    Closed,

    /// The handshake did not complete within the allowed time.
    #[error("not authenticated within {0:?}")]
    Timeout(Duration),

    /// A type-level handler was offered for a type the session handles itself.
    #[error("message type {0:?} is handled by the session")]
    ReservedType(String),

    /// A type-level handler is already registered for this type.
    #[error("a handler for message type {0:?} is already registered")]
    HandlerRegistered(String),

    /// A frame arrived that is not legal in the current state.
    #[error("unexpected {frame} frame in state {state}")]
    UnexpectedFrame {
        frame: &'static str,
        state: SessionState,
    },

    /// A frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A caller-supplied handler panicked while processing a frame.
    #[error("handler for {0} panicked")]
    HandlerPanicked(String),
}

// ── Shared state ──────────────────────────────────────────────────────────────

/// Everything guarded by the state lock.
#[derive(Debug, Default)]
struct Shared {
    state: SessionState,
    correlation: CorrelationTable,
    dispatch: DispatchTable,
    ha_version: Option<String>,
}

struct Inner {
    /// Short per-instance identifier used in every log record.
    tag: String,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    ids: MessageIdAllocator,
    shared: Mutex<Shared>,
    sink: tokio::sync::Mutex<Option<Box<dyn FrameSink>>>,
    /// Authentication signal: `true` once `auth_ok` has been processed.
    authenticated: watch::Sender<bool>,
    read_loop: Mutex<Option<JoinHandle<()>>>,
    keepalive: Mutex<Option<JoinHandle<()>>>,
    transport_open: AtomicBool,
    loop_running: AtomicBool,
    closed: AtomicBool,
}

/// Locks a std mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A handle to one protocol session.
///
/// Cloning is cheap and every clone refers to the same connection, so
/// handlers can capture a clone to issue follow-up requests.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tag", &self.inner.tag)
            .field("state", &self.state())
            .field("connected", &self.connected())
            .finish()
    }
}

impl Session {
    /// Creates a session that will connect through `connector` when started.
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        let (authenticated, _) = watch::channel(false);
        let mut tag = uuid::Uuid::new_v4().simple().to_string();
        tag.truncate(8);
        Self {
            inner: Arc::new(Inner {
                tag,
                config,
                connector,
                ids: MessageIdAllocator::new(),
                shared: Mutex::new(Shared::default()),
                sink: tokio::sync::Mutex::new(None),
                authenticated,
                read_loop: Mutex::new(None),
                keepalive: Mutex::new(None),
                transport_open: AtomicBool::new(false),
                loop_running: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    // ── Observers ─────────────────────────────────────────────────────────────

    /// Short identifier of this instance, as it appears in log records.
    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        self.shared().state
    }

    /// Version reported by the hub in `auth_ok`.
    pub fn ha_version(&self) -> Option<String> {
        self.shared().ha_version.clone()
    }

    /// `true` while the transport is open, the read loop is running and
    /// message ids are being allocated.
    pub fn connected(&self) -> bool {
        let inner = &self.inner;
        !inner.closed.load(Ordering::SeqCst)
            && inner.transport_open.load(Ordering::SeqCst)
            && inner.loop_running.load(Ordering::SeqCst)
            && inner.ids.is_active()
    }

    /// Number of handlers waiting in the correlation table.
    pub fn pending_handlers(&self) -> usize {
        self.shared().correlation.len()
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        lock(&self.inner.shared)
    }

    pub(crate) fn keepalive_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        lock(&self.inner.keepalive)
    }

    pub(crate) fn with_dispatch<R>(&self, f: impl FnOnce(&mut DispatchTable) -> R) -> R {
        f(&mut self.shared().dispatch)
    }

    /// Moves to `next` if the transition is legal.
    fn transition(&self, next: SessionState) -> Result<(), SessionState> {
        let mut shared = self.shared();
        let current = shared.state;
        if !current.can_transition_to(next) {
            return Err(current);
        }
        shared.state = next;
        trace!("session {}: {current} -> {next}", self.inner.tag);
        Ok(())
    }

    // ── Start / authenticate ──────────────────────────────────────────────────

    /// Opens the transport and starts the read loop in the background.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AlreadyStarted`] if this instance was started before
    ///   and its read loop is still active.
    /// - [`SessionError::Closed`] if the instance has been closed.
    pub fn start(&self) -> Result<(), SessionError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        let mut slot = lock(&self.inner.read_loop);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(SessionError::AlreadyStarted);
        }
        self.transition(SessionState::Connecting)
            .map_err(|_| SessionError::AlreadyStarted)?;

        *slot = Some(tokio::spawn(self.clone().read_loop()));
        Ok(())
    }

    /// Waits until the hub has accepted the credentials.
    ///
    /// Returns immediately if `auth_ok` was already processed.  On success
    /// the current [`connected`](Self::connected) value is returned.
    ///
    /// `close()` does not wake waiters: after an `auth_invalid` or a dropped
    /// connection, callers find out through the timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Timeout`] if `timeout` elapses first.
    pub async fn wait_authenticated(&self, timeout: Duration) -> Result<bool, SessionError> {
        let mut rx = self.inner.authenticated.subscribe();
        let outcome = tokio::time::timeout(timeout, rx.wait_for(|ok| *ok))
            .await
            .map(|signal| signal.map(|_| ()));
        match outcome {
            Ok(Ok(())) => Ok(self.connected()),
            // The sender lives as long as `inner`, which `self` keeps alive.
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => Err(SessionError::Timeout(timeout)),
        }
    }

    // ── Read loop ─────────────────────────────────────────────────────────────

    async fn read_loop(self) {
        let tag = self.inner.tag.clone();
        info!(
            "session {tag}: connecting to {}",
            self.inner.connector.endpoint()
        );

        let (sink, mut stream) = match self.inner.connector.connect().await {
            Ok(halves) => halves,
            Err(e) => {
                error!("session {tag}: {e}");
                self.close().await;
                return;
            }
        };

        {
            let mut slot = self.inner.sink.lock().await;
            if self.inner.closed.load(Ordering::SeqCst) {
                // close() ran while we were connecting and found no sink.
                drop(slot);
                let mut sink = sink;
                if let Err(e) = sink.close().await {
                    debug!("session {tag}: closing late transport failed: {e}");
                }
                return;
            }
            *slot = Some(sink);
            self.inner.transport_open.store(true, Ordering::SeqCst);
            self.inner.loop_running.store(true, Ordering::SeqCst);
        }
        debug!("session {tag}: transport open");

        loop {
            let frame = match stream.next_frame().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    error!("session {tag}: connection failed: {e}");
                    break;
                }
                None => {
                    info!("session {tag}: connection closed by hub");
                    break;
                }
            };

            match frame {
                Frame::Text(text) => {
                    if let Err(e) = self.handle_text(&text).await {
                        error!("session {tag}: error handling websocket message: {e}");
                        break;
                    }
                    if self.inner.closed.load(Ordering::SeqCst) {
                        break;
                    }
                }
                Frame::Binary(data) => {
                    warn!(
                        "session {tag}: unexpected binary frame ({} bytes) ignored",
                        data.len()
                    );
                }
                Frame::Ping | Frame::Pong => {
                    trace!("session {tag}: transport-level ping/pong");
                }
                Frame::Close(reason) => {
                    info!(
                        "session {tag}: close frame received ({})",
                        reason.as_deref().unwrap_or("no reason")
                    );
                    break;
                }
            }
        }

        self.inner.loop_running.store(false, Ordering::SeqCst);
        self.close().await;
        warn!("session {tag}: websocket connection closed");
    }

    /// Decodes and dispatches one text frame.
    ///
    /// Returns an error only for faults that must end the connection.
    async fn handle_text(&self, text: &str) -> Result<(), SessionError> {
        let msg = match decode(text) {
            Ok(msg) => msg,
            Err(e) => return self.protocol_violation(e),
        };
        let inbound = match Inbound::from_message(&msg) {
            Ok(inbound) => inbound,
            Err(e) => return self.protocol_violation(e),
        };
        trace!(
            "session {}: received {}",
            self.inner.tag,
            message_type(&msg).unwrap_or_default()
        );

        match inbound {
            Inbound::AuthRequired => self.handle_auth_required().await,
            Inbound::AuthOk { ha_version } => self.handle_auth_ok(ha_version),
            Inbound::AuthInvalid { message } => {
                self.handle_auth_invalid(message).await;
                Ok(())
            }
            Inbound::CommandResult {
                id,
                success,
                result,
                error,
            } => self.handle_result(id, success, result, error).await,
            Inbound::Event { id, event } => self.handle_event(id, event).await,
            Inbound::Other => self.handle_other(msg).await,
        }
    }

    /// Malformed frames are dropped once authenticated, fatal during the
    /// handshake.
    fn protocol_violation(&self, e: ProtocolError) -> Result<(), SessionError> {
        if self.state().is_handshake() {
            return Err(e.into());
        }
        warn!("session {}: dropping malformed frame: {e}", self.inner.tag);
        Ok(())
    }

    // ── Handshake ─────────────────────────────────────────────────────────────

    async fn handle_auth_required(&self) -> Result<(), SessionError> {
        self.transition(SessionState::AwaitingAuth)
            .map_err(|state| SessionError::UnexpectedFrame {
                frame: messages::TYPE_AUTH_REQUIRED,
                state,
            })?;
        debug!("session {}: sending auth frame", self.inner.tag);
        let frame = encode(&messages::auth(&self.inner.config.token));
        self.write_frame(frame).await?;
        Ok(())
    }

    fn handle_auth_ok(&self, ha_version: Option<String>) -> Result<(), SessionError> {
        self.transition(SessionState::Authenticated)
            .map_err(|state| SessionError::UnexpectedFrame {
                frame: messages::TYPE_AUTH_OK,
                state,
            })?;
        info!(
            "session {}: websocket authentication successful [version {}]",
            self.inner.tag,
            ha_version.as_deref().unwrap_or("unknown")
        );
        self.shared().ha_version = ha_version;
        self.inner.ids.activate();
        self.inner.authenticated.send_replace(true);
        Ok(())
    }

    async fn handle_auth_invalid(&self, message: Option<String>) {
        error!(
            "session {}: websocket authentication failed ({}); closing connection",
            self.inner.tag,
            message.as_deref().unwrap_or("no reason given")
        );
        self.close().await;
    }

    // ── Correlated frames ─────────────────────────────────────────────────────

    async fn handle_result(
        &self,
        id: MessageId,
        success: bool,
        result: Value,
        error: Option<Value>,
    ) -> Result<(), SessionError> {
        let tag = &self.inner.tag;
        if !success {
            let reason = error.as_ref().map(|e| e.to_string()).unwrap_or_default();
            error!("session {tag}: command {id} failed: {reason}");
        }

        let route = {
            let mut shared = self.shared();
            // A failed subscription will never deliver events.
            if !success && shared.correlation.is_persistent(id) {
                shared.correlation.remove(id);
                None
            } else {
                shared.correlation.route(id)
            }
        };

        match route {
            Some(ResultHandler::Once(handler)) => {
                let delivery = Delivery::Result {
                    success,
                    result,
                    error,
                };
                self.run_handler(format!("result {id}"), handler(delivery))
                    .await
            }
            Some(ResultHandler::Persistent(_)) => {
                debug!("session {tag}: subscription {id} confirmed");
                Ok(())
            }
            None => {
                warn!("session {tag}: unhandled result for id {id}");
                Ok(())
            }
        }
    }

    async fn handle_event(&self, id: MessageId, event: Value) -> Result<(), SessionError> {
        let route = self.shared().correlation.route(id);
        let handler = match route {
            Some(ResultHandler::Once(handler)) => handler(Delivery::Event(event)),
            Some(ResultHandler::Persistent(handler)) => handler(Delivery::Event(event)),
            None => {
                warn!("session {}: unhandled websocket event id {id}", self.inner.tag);
                return Ok(());
            }
        };
        self.run_handler(format!("event {id}"), handler).await
    }

    async fn handle_other(&self, msg: Message) -> Result<(), SessionError> {
        let frame_type = message_type(&msg).unwrap_or_default().to_string();
        let Some(handler) = self.shared().dispatch.get(&frame_type) else {
            warn!(
                "session {}: unhandled message type {frame_type:?}",
                self.inner.tag
            );
            return Ok(());
        };
        self.run_handler(format!("type {frame_type:?}"), handler(msg))
            .await
    }

    /// Awaits a caller-supplied handler, converting a panic into an error so
    /// the read loop can tear the connection down instead of dying silently.
    async fn run_handler(
        &self,
        what: String,
        handler: BoxFuture<'static, ()>,
    ) -> Result<(), SessionError> {
        AssertUnwindSafe(handler)
            .catch_unwind()
            .await
            .map_err(|_| SessionError::HandlerPanicked(what))
    }

    // ── Sending ───────────────────────────────────────────────────────────────

    /// Sends `msg`, allocating an id if it has none.
    ///
    /// If `handler` is given it is registered under the id *before* the frame
    /// is written, so even an immediate reply finds it.
    ///
    /// Returns the id used, or `None` without writing anything when the
    /// session is not connected.  A failed write is logged, unregisters
    /// `handler` and also returns `None`; it does not close the session.
    pub async fn send(&self, mut msg: Message, handler: Option<ResultHandler>) -> Option<MessageId> {
        let tag = &self.inner.tag;
        if !self.connected() {
            warn!(
                "session {tag}: websocket is not connected; dropping {} message",
                message_type(&msg).unwrap_or("untyped")
            );
            return None;
        }

        let explicit = message_id(&msg);
        let id = match explicit {
            Some(id) => {
                self.inner.ids.observe(id);
                id
            }
            None => {
                let Some(id) = self.inner.ids.next() else {
                    warn!("session {tag}: message ids exhausted or inactive");
                    return None;
                };
                msg.insert("id".into(), Value::from(id));
                id
            }
        };

        {
            let mut shared = self.shared();
            if explicit.is_some() && shared.correlation.contains(id) {
                warn!("session {tag}: id {id} is already pending; message not sent");
                return None;
            }
            if let Some(handler) = handler {
                shared.correlation.insert(id, handler);
            }
        }

        let frame = encode(&msg);
        trace!("session {tag}: sending {frame}");
        if let Err(e) = self.write_frame(frame).await {
            error!("session {tag}: failed to send message {id}: {e}");
            self.shared().correlation.remove(id);
            return None;
        }
        Some(id)
    }

    /// Sends `msg` and registers `on_event` for every event delivered on its
    /// id until [`unsubscribe`](Self::unsubscribe) or close.
    pub async fn subscribe<F, Fut>(&self, msg: Message, on_event: F) -> Option<MessageId>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let handler = ResultHandler::persistent(move |delivery: Delivery| {
            on_event(match delivery {
                Delivery::Event(event) => event,
                Delivery::Result { result, .. } => result,
            })
        });
        self.send(msg, Some(handler)).await
    }

    /// Writes one text frame under the write lock.
    async fn write_frame(&self, frame: String) -> Result<(), TransportError> {
        let mut sink = self.inner.sink.lock().await;
        match sink.as_mut() {
            Some(sink) => sink.send_text(frame).await,
            None => Err(TransportError::Closed),
        }
    }

    /// Drops the handler registered under `id`.  Returns `true` if there was one.
    pub fn forget(&self, id: MessageId) -> bool {
        self.shared().correlation.remove(id).is_some()
    }

    // ── Type-level handlers ───────────────────────────────────────────────────

    /// Registers a handler for every frame of type `frame_type`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ReservedType`] for handshake, `result` and `event`
    ///   types, which the session handles itself.
    /// - [`SessionError::HandlerRegistered`] if the type already has a handler.
    pub fn on_message(&self, frame_type: &str, handler: MessageHandler) -> Result<(), SessionError> {
        if RESERVED_TYPES.contains(&frame_type) {
            return Err(SessionError::ReservedType(frame_type.to_string()));
        }
        if !self.shared().dispatch.insert(frame_type, handler) {
            return Err(SessionError::HandlerRegistered(frame_type.to_string()));
        }
        Ok(())
    }

    /// Removes the handler for `frame_type`.  Returns `true` if there was one.
    pub fn remove_message_handler(&self, frame_type: &str) -> bool {
        self.shared().dispatch.remove(frame_type).is_some()
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Tears the session down.
    ///
    /// Idempotent and safe to call concurrently (including from the read
    /// loop's own error path): only the first call does any work, later
    /// calls return immediately.  Stops the keepalive and the read loop,
    /// drops every registered handler, resets the authentication signal and
    /// closes the transport exactly once.
    pub async fn close(&self) {
        let inner = &self.inner;
        let tag = &inner.tag;
        if inner.closed.swap(true, Ordering::SeqCst) {
            trace!("session {tag}: already closed");
            return;
        }
        info!("session {tag}: closing");

        {
            let mut shared = self.shared();
            shared.state = SessionState::Closing;
            let subscriptions = shared.correlation.clear();
            shared.dispatch.clear();
            if subscriptions > 0 {
                debug!("session {tag}: dropped {subscriptions} subscription(s)");
            }
        }
        inner.ids.deactivate();
        inner.authenticated.send_replace(false);

        if let Some(keepalive) = self.keepalive_slot().take() {
            keepalive.abort();
        }

        let sink = inner.sink.lock().await.take();
        inner.transport_open.store(false, Ordering::SeqCst);
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!("session {tag}: transport close failed: {e}");
            }
        }

        // Last, because close() may be running on the read loop itself.
        if let Some(read_loop) = lock(&inner.read_loop).take() {
            read_loop.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
