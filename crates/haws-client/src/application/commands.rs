//! Typed hub commands built on [`Session::send`] and [`Session::subscribe`].
//!
//! Each command registers its own result handler so the reply is always
//! routable.  Failed results are logged by the session itself; the handlers
//! here only add a debug record on success.

use serde_json::Value;
use tracing::{debug, error};

use haws_core::protocol::messages;
use haws_core::MessageId;

use crate::application::handlers::{Delivery, ResultHandler, TemplateCallback};
use crate::application::session::Session;

/// One-shot handler that records a successful reply at debug level.
fn log_result(tag: &str, what: &'static str) -> ResultHandler {
    let tag = tag.to_string();
    ResultHandler::once(move |delivery: Delivery| async move {
        if delivery.is_success() {
            debug!("session {tag}: {what} succeeded");
        }
    })
}

/// Text form of a rendered template value.
fn rendered_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl Session {
    /// Calls `domain_service` (`"light.turn_on"` form) on the hub.
    ///
    /// `service_data` and `target` are omitted from the frame when `None`.
    /// Returns the request id, or `None` if nothing was sent.
    pub async fn call_service(
        &self,
        domain_service: &str,
        service_data: Option<Value>,
        target: Option<Value>,
        return_response: bool,
    ) -> Option<MessageId> {
        let msg = messages::call_service(domain_service, service_data, target, return_response);
        self.send(msg, Some(log_result(self.tag(), "call_service")))
            .await
    }

    /// Subscribes to hub events, all of them when `event_type` is `None`.
    ///
    /// `on_event` receives the `event` payload of every matching event until
    /// [`unsubscribe`](Self::unsubscribe) is called with the returned id.
    pub async fn subscribe_events<F, Fut>(&self, event_type: Option<&str>, on_event: F) -> Option<MessageId>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.subscribe(messages::subscribe_events(event_type), on_event)
            .await
    }

    /// Subscribes to an automation trigger.  `on_event` receives each firing.
    pub async fn subscribe_trigger<F, Fut>(&self, trigger: Value, on_event: F) -> Option<MessageId>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.subscribe(messages::subscribe_trigger(trigger), on_event)
            .await
    }

    /// Cancels the subscription registered under `subscription`.
    ///
    /// The local handler is dropped even if the request cannot be sent, so
    /// no further events are delivered either way.
    pub async fn unsubscribe(&self, subscription: MessageId) -> Option<MessageId> {
        if !self.forget(subscription) {
            debug!(
                "session {}: no local handler for subscription {subscription}",
                self.tag()
            );
        }
        self.send(
            messages::unsubscribe_events(subscription),
            Some(log_result(self.tag(), "unsubscribe_events")),
        )
        .await
    }

    /// Subscribes to the rendered value of `template`.
    ///
    /// The hub re-renders whenever an entity the template depends on
    /// changes; `callback` receives every rendering.  Renderings that carry
    /// an `error` field are logged at error level and not delivered.
    pub async fn render_template(
        &self,
        template: &str,
        callback: TemplateCallback,
        report_errors: bool,
    ) -> Option<MessageId> {
        let tag = self.tag().to_string();
        self.subscribe(
            messages::render_template(template, report_errors),
            move |event: Value| {
                let callback = callback.clone();
                let tag = tag.clone();
                async move {
                    if let Some(err) = event.get("error") {
                        let level = event.get("level").and_then(|l| l.as_str()).unwrap_or("ERROR");
                        let reason = rendered_text(err);
                        error!("session {tag}: template error [{level}]: {reason}");
                        return;
                    }
                    let text = rendered_text(event.get("result").unwrap_or(&Value::Null));
                    callback.call(text, event).await;
                }
            },
        )
        .await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::SessionConfig;
    use crate::infrastructure::memory::{MemoryConnector, MemoryPeer};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

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

    #[test]
    fn test_rendered_text() {
        assert_eq!(rendered_text(&json!("on")), "on");
        assert_eq!(rendered_text(&json!(21.5)), "21.5");
        assert_eq!(rendered_text(&Value::Null), "");
    }

    #[tokio::test]
    async fn test_call_service_frame() {
        // Arrange
        let (session, mut peer) = authenticated().await;

        // Act
        let id = session
            .call_service(
                "light.turn_on",
                Some(json!({"brightness": 255})),
                Some(json!({"entity_id": "light.kitchen"})),
                false,
            )
            .await
            .unwrap();

        // Assert
        let sent: Value = serde_json::from_str(&peer.expect_sent(WAIT).await.unwrap()).unwrap();
        assert_eq!(sent["id"], id);
        assert_eq!(sent["type"], "call_service");
        assert_eq!(sent["domain"], "light");
        assert_eq!(sent["service"], "turn_on");
        assert_eq!(sent["target"]["entity_id"], "light.kitchen");
        assert_eq!(session.pending_handlers(), 1);

        peer.push_text(&format!(r#"{{"id":{id},"type":"result","success":true,"result":null}}"#));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.pending_handlers(), 0);
    }

    #[tokio::test]
    async fn test_subscription_receives_every_event_until_unsubscribed() {
        // Arrange
        let (session, mut peer) = authenticated().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = session
            .subscribe_events(Some("state_changed"), move |event| {
                let sink = Arc::clone(&sink);
                async move { sink.lock().unwrap().push(event); }
            })
            .await
            .unwrap();
        peer.expect_sent(WAIT).await.unwrap();

        // Act
        peer.push_text(&format!(r#"{{"id":{id},"type":"result","success":true,"result":null}}"#));
        peer.push_text(&format!(r#"{{"id":{id},"type":"event","event":{{"n":1}}}}"#));
        peer.push_text(&format!(r#"{{"id":{id},"type":"event","event":{{"n":2}}}}"#));
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.unsubscribe(id).await.unwrap();
        peer.push_text(&format!(r#"{{"id":{id},"type":"event","event":{{"n":3}}}}"#));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Assert
        assert_eq!(*seen.lock().unwrap(), vec![json!({"n": 1}), json!({"n": 2})]);
        let unsub: Value = serde_json::from_str(&peer.expect_sent(WAIT).await.unwrap()).unwrap();
        assert_eq!(unsub["type"], "unsubscribe_events");
        assert_eq!(unsub["subscription"], id);
    }

    #[tokio::test]
    async fn test_failed_subscription_is_dropped() {
        let (session, mut peer) = authenticated().await;
        let id = session
            .subscribe_trigger(json!({"platform": "state"}), |_| async {})
            .await
            .unwrap();
        peer.expect_sent(WAIT).await.unwrap();

        peer.push_text(&format!(
            r#"{{"id":{id},"type":"result","success":false,"error":{{"code":"invalid_format"}}}}"#
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(session.pending_handlers(), 0);
        assert!(session.connected());
    }

    #[tokio::test]
    async fn test_render_template_delivers_text_and_skips_errors() {
        // Arrange
        let (session, mut peer) = authenticated().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = TemplateCallback::text_only(move |text| {
            let sink = Arc::clone(&sink);
            async move { sink.lock().unwrap().push(text); }
        });
        let id = session
            .render_template("{{ states('sun.sun') }}", callback, true)
            .await
            .unwrap();
        let sent: Value = serde_json::from_str(&peer.expect_sent(WAIT).await.unwrap()).unwrap();
        assert_eq!(sent["template"], "{{ states('sun.sun') }}");
        assert_eq!(sent["report_errors"], true);

        // Act
        peer.push_text(&format!(
            r#"{{"id":{id},"type":"event","event":{{"result":"above_horizon","listeners":{{}}}}}}"#
        ));
        peer.push_text(&format!(
            r#"{{"id":{id},"type":"event","event":{{"error":"UndefinedError","level":"ERROR"}}}}"#
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Assert
        assert_eq!(*seen.lock().unwrap(), vec!["above_horizon".to_string()]);
    }
}
