//! Reconnect supervision.
//!
//! A [`Session`] is single-use.  The [`Supervisor`] keeps one live instance
//! around: every `reconnect_interval` it checks whether the current session
//! is still connected and, if not, closes it and brings up a fresh one
//! (start, wait for authentication, start the keepalive, run the
//! `on_connected` hook).  Subscriptions belong to the instance that made
//! them, so the hook is where callers re-subscribe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{error, info, warn};

use crate::application::session::{lock, Session};
use crate::application::transport::Connector;
use crate::domain::config::SessionConfig;

/// Granularity at which the supervisor notices a shutdown request.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

type OnConnected = Arc<dyn Fn(Session) -> BoxFuture<'static, ()> + Send + Sync>;

/// Keeps a connected session available until shutdown.
pub struct Supervisor {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    on_connected: Option<OnConnected>,
    current: Mutex<Option<Session>>,
}

impl Supervisor {
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            on_connected: None,
            current: Mutex::new(None),
        }
    }

    /// Sets a hook run after every successful (re)connect.
    pub fn on_connected<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.on_connected = Some(Arc::new(move |session| hook(session).boxed()));
        self
    }

    /// The session currently in use, if any.
    pub fn current(&self) -> Option<Session> {
        lock(&self.current).clone()
    }

    /// Supervises until `running` is cleared, then closes the current session.
    pub async fn run(&self, running: Arc<AtomicBool>) {
        info!(
            "supervisor: hub {} (check every {:?})",
            self.config.websocket_url(),
            self.config.reconnect_interval
        );

        while running.load(Ordering::SeqCst) {
            let healthy = self.current().is_some_and(|s| s.connected());
            if !healthy {
                self.reconnect().await;
            }
            self.pause(&running).await;
        }

        info!("supervisor: shutting down");
        let last = lock(&self.current).take();
        if let Some(session) = last {
            session.close().await;
        }
    }

    /// Replaces the current session with a freshly connected one.
    ///
    /// Returns `true` if the new session authenticated.  On failure the new
    /// instance is kept as current (closed or about to be) and the next
    /// check retries.
    pub async fn reconnect(&self) -> bool {
        let previous = lock(&self.current).take();
        if let Some(previous) = previous {
            warn!(
                "supervisor: session {} disconnected; reconnecting",
                previous.tag()
            );
            previous.close().await;
        }

        let session = Session::new(self.config.clone(), Arc::clone(&self.connector));
        *lock(&self.current) = Some(session.clone());
        if let Err(e) = session.start() {
            error!("supervisor: could not start session {}: {e}", session.tag());
            return false;
        }

        match session.wait_authenticated(self.config.auth_timeout).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("supervisor: session {} lost before it was usable", session.tag());
                return false;
            }
            Err(e) => {
                warn!("supervisor: session {}: {e}", session.tag());
                session.close().await;
                return false;
            }
        }

        if let Err(e) =
            session.start_keepalive(self.config.ping_interval, self.config.ping_count)
        {
            warn!("supervisor: session {}: {e}", session.tag());
        }
        if let Some(hook) = &self.on_connected {
            hook(session.clone()).await;
        }
        info!("supervisor: session {} ready", session.tag());
        true
    }

    /// Sleeps for `reconnect_interval`, returning early on shutdown.
    async fn pause(&self, running: &AtomicBool) {
        let mut left = self.config.reconnect_interval;
        while !left.is_zero() && running.load(Ordering::SeqCst) {
            let step = left.min(SHUTDOWN_POLL);
            tokio::time::sleep(step).await;
            left = left.saturating_sub(step);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
