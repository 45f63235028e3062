//! Application-level keepalive.
//!
//! The hub answers every `ping` frame with a `pong` carrying the same id.
//! The keepalive task sends one probe immediately and then one per interval,
//! stopping after `count` probes (unlimited when `count == 0`), as soon as
//! the session is no longer connected, or when a probe cannot be written.
//!
//! While the task runs it owns the `pong` type handler.  The handler is
//! removed when the task ends, however it ends (aborted tasks included), so
//! a later restart can register it again.

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use haws_core::protocol::messages::{self, message_id, TYPE_PONG};
use haws_core::Message;

use crate::application::handlers::{callback, MessageHandler};
use crate::application::session::{Session, SessionError};

/// Removes the keepalive's `pong` handler when the task is dropped.
struct PongHandlerGuard {
    session: Session,
    handler: MessageHandler,
}

impl Drop for PongHandlerGuard {
    fn drop(&mut self) {
        let removed = self
            .session
            .with_dispatch(|table| table.remove_if_same(TYPE_PONG, &self.handler));
        if removed {
            trace!("session {}: pong handler removed", self.session.tag());
        }
    }
}

impl Session {
    /// Starts sending `ping` probes every `interval`.
    ///
    /// Returns `Ok(())` without starting anything if the session is not
    /// connected.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyInProgress`] if a keepalive is already
    /// running or another `pong` handler is registered.
    pub fn start_keepalive(&self, interval: Duration, count: u32) -> Result<(), SessionError> {
        let mut slot = self.keepalive_slot();
        let running = slot.as_ref().is_some_and(|task| !task.is_finished());
        if running || self.with_dispatch(|table| table.contains(TYPE_PONG)) {
            return Err(SessionError::AlreadyInProgress);
        }
        if !self.connected() {
            warn!(
                "session {}: websocket is not connected; keepalive not started",
                self.tag()
            );
            return Ok(());
        }

        let tag = self.tag().to_string();
        let handler = callback(move |msg: Message| {
            let tag = tag.clone();
            async move {
                trace!("session {tag}: pong {}", message_id(&msg).unwrap_or_default());
            }
        });
        self.with_dispatch(|table| table.insert(TYPE_PONG, handler.clone()));

        let guard = PongHandlerGuard {
            session: self.clone(),
            handler,
        };
        *slot = Some(tokio::spawn(keepalive_loop(guard, interval, count)));
        info!(
            "session {}: keepalive started (every {interval:?}, {})",
            self.tag(),
            if count == 0 {
                "unlimited".to_string()
            } else {
                format!("{count} probes")
            }
        );
        Ok(())
    }

    /// Stops the keepalive, if one is running.  Returns `true` if it was.
    pub fn stop_keepalive(&self) -> bool {
        let Some(task) = self.keepalive_slot().take() else {
            return false;
        };
        let was_running = !task.is_finished();
        task.abort();
        // The guard would do this when the aborted task is dropped; doing it
        // now lets the caller restart immediately.
        self.remove_message_handler(TYPE_PONG);
        was_running
    }

    /// `true` while the keepalive task is running.
    pub fn keepalive_active(&self) -> bool {
        self.keepalive_slot()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

async fn keepalive_loop(guard: PongHandlerGuard, interval: Duration, count: u32) {
    let session = guard.session.clone();
    let tag = session.tag().to_string();
    let mut remaining = count;

    if session.send(messages::ping(), None).await.is_none() {
        debug!("session {tag}: first keepalive probe not sent; stopping");
        return;
    }

    loop {
        if remaining > 0 {
            remaining -= 1;
            if remaining == 0 {
                break;
            }
        }

        tokio::time::sleep(interval).await;

        if !session.connected() {
            debug!("session {tag}: disconnected; keepalive stopping");
            break;
        }
        if session.send(messages::ping(), None).await.is_none() {
            warn!("session {tag}: keepalive probe failed; stopping");
            break;
        }
    }

    debug!("session {tag}: keepalive finished");
    drop(guard);
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::SessionConfig;
    use crate::infrastructure::memory::{MemoryConnector, MemoryPeer};
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(2);

    async fn authenticated() -> (Session, MemoryPeer) {
        let (connector, mut peer) = MemoryConnector::pair();
        let session = Session::new(SessionConfig::new("http://hub", "T"), Arc::new(connector));
        session.start().unwrap();
        peer.push_text(r#"{"type":"auth_required"}"#);
        peer.expect_sent(WAIT).await.unwrap();
        peer.push_text(r#"{"type":"auth_ok"}"#);
        assert!(session.wait_authenticated(WAIT).await.unwrap());
        (session, peer)
    }

    #[tokio::test]
    async fn test_keepalive_not_connected_is_noop() {
        let (connector, _peer) = MemoryConnector::pair();
        let session = Session::new(SessionConfig::default(), Arc::new(connector));

        assert!(session.start_keepalive(Duration::from_millis(10), 1).is_ok());
        assert!(!session.keepalive_active());
        assert!(!session.remove_message_handler(TYPE_PONG));
    }

    #[tokio::test]
    async fn test_keepalive_sends_count_probes_then_stops() {
        // Arrange
        let (session, mut peer) = authenticated().await;

        // Act
        session
            .start_keepalive(Duration::from_millis(10), 3)
            .unwrap();

        // Assert
        for expected_id in 1..=3u64 {
            let frame = peer.expect_sent(WAIT).await.unwrap();
            assert_eq!(frame, format!(r#"{{"id":{expected_id},"type":"ping"}}"#));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(peer.try_next_sent().is_none(), "no fourth probe");
        assert!(!session.keepalive_active());
        assert!(
            !session.remove_message_handler(TYPE_PONG),
            "pong handler removed once the task ends"
        );
    }

    #[tokio::test]
    async fn test_second_keepalive_is_rejected() {
        let (session, _peer) = authenticated().await;
        session.start_keepalive(Duration::from_secs(60), 0).unwrap();

        let second = session.start_keepalive(Duration::from_secs(60), 0);

        assert!(matches!(second, Err(SessionError::AlreadyInProgress)));
    }

    #[tokio::test]
    async fn test_stop_then_restart_keepalive() {
        let (session, mut peer) = authenticated().await;
        session.start_keepalive(Duration::from_secs(60), 0).unwrap();
        peer.expect_sent(WAIT).await.unwrap();

        assert!(session.stop_keepalive());
        session.start_keepalive(Duration::from_secs(60), 0).unwrap();

        let frame = peer.expect_sent(WAIT).await.unwrap();
        assert!(frame.contains(r#""type":"ping""#));
        assert!(session.keepalive_active());
    }

    #[tokio::test]
    async fn test_pong_frames_are_consumed() {
        let (session, mut peer) = authenticated().await;
        session.start_keepalive(Duration::from_secs(60), 0).unwrap();
        peer.expect_sent(WAIT).await.unwrap();

        peer.push_text(r#"{"id":1,"type":"pong"}"#);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(session.connected());
    }

    #[tokio::test]
    async fn test_close_stops_keepalive() {
        let (session, _peer) = authenticated().await;
        session.start_keepalive(Duration::from_millis(10), 0).unwrap();

        session.close().await;

        assert!(!session.keepalive_active());
    }
}
