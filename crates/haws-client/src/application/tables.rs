//! Correlation and dispatch tables.
//!
//! Both tables are owned by the session and only ever touched under its
//! single state lock.  Lookups hand back an owned handler (removed, for
//! one-shot handlers; an `Arc` clone, for persistent ones) so the lock is
//! released before the handler is awaited.  A handler that calls back into
//! the session therefore cannot deadlock it.

use std::collections::HashMap;
use std::sync::Arc;

use haws_core::MessageId;

use crate::application::handlers::{MessageHandler, ResultHandler};

/// Message id → pending result handler.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    handlers: HashMap<MessageId, ResultHandler>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `id`, returning any handler it displaced.
    pub fn insert(&mut self, id: MessageId, handler: ResultHandler) -> Option<ResultHandler> {
        self.handlers.insert(id, handler)
    }

    /// Removes the handler for `id`, whatever its kind.
    pub fn remove(&mut self, id: MessageId) -> Option<ResultHandler> {
        self.handlers.remove(&id)
    }

    /// Returns the handler to run for a delivery on `id`.
    ///
    /// One-shot handlers are removed by this call, so a second delivery for
    /// the same id finds nothing.  Persistent handlers stay registered and a
    /// clone of the callback is returned.
    pub fn route(&mut self, id: MessageId) -> Option<ResultHandler> {
        match self.handlers.get(&id)? {
            ResultHandler::Persistent(cb) => Some(ResultHandler::Persistent(cb.clone())),
            ResultHandler::Once(_) => self.handlers.remove(&id),
        }
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Returns `true` if a persistent handler is registered under `id`.
    pub fn is_persistent(&self, id: MessageId) -> bool {
        self.handlers
            .get(&id)
            .is_some_and(ResultHandler::is_persistent)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drops every handler and returns how many persistent subscriptions
    /// were among them.
    pub fn clear(&mut self) -> usize {
        let persistent = self.handlers.values().filter(|h| h.is_persistent()).count();
        self.handlers.clear();
        persistent
    }
}

/// Message type → type-level handler, for frames that carry no correlation.
#[derive(Default)]
pub struct DispatchTable {
    handlers: HashMap<String, MessageHandler>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `frame_type`.  Returns `false` and leaves the
    /// table untouched if a handler is already registered for that type.
    pub fn insert(&mut self, frame_type: &str, handler: MessageHandler) -> bool {
        if self.handlers.contains_key(frame_type) {
            return false;
        }
        self.handlers.insert(frame_type.to_string(), handler);
        true
    }

    pub fn remove(&mut self, frame_type: &str) -> Option<MessageHandler> {
        self.handlers.remove(frame_type)
    }

    /// Removes the handler for `frame_type` only if it is `handler` itself,
    /// so an owner cannot remove a replacement registered after it.
    pub fn remove_if_same(&mut self, frame_type: &str, handler: &MessageHandler) -> bool {
        if !self
            .handlers
            .get(frame_type)
            .is_some_and(|current| Arc::ptr_eq(current, handler))
        {
            return false;
        }
        self.handlers.remove(frame_type);
        true
    }

    /// Returns a clone of the handler for `frame_type`.
    pub fn get(&self, frame_type: &str) -> Option<MessageHandler> {
        self.handlers.get(frame_type).cloned()
    }

    pub fn contains(&self, frame_type: &str) -> bool {
        self.handlers.contains_key(frame_type)
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::callback;
    use haws_core::Message;

    fn once() -> ResultHandler {
        ResultHandler::once(|_| async {})
    }

    fn persistent() -> ResultHandler {
        ResultHandler::persistent(|_| async {})
    }

    #[test]
    fn test_route_removes_one_shot_handler() {
        // Arrange
        let mut table = CorrelationTable::new();
        table.insert(1, once());

        // Act
        let first = table.route(1);
        let second = table.route(1);

        // Assert
        assert!(matches!(first, Some(ResultHandler::Once(_))));
        assert!(second.is_none(), "one-shot handler must not fire twice");
        assert!(table.is_empty());
    }

    #[test]
    fn test_route_keeps_persistent_handler() {
        let mut table = CorrelationTable::new();
        table.insert(5, persistent());

        assert!(matches!(table.route(5), Some(ResultHandler::Persistent(_))));
        assert!(matches!(table.route(5), Some(ResultHandler::Persistent(_))));
        assert!(table.contains(5));
        assert!(table.is_persistent(5));
    }

    #[test]
    fn test_route_unknown_id_is_none() {
        let mut table = CorrelationTable::new();
        table.insert(1, once());
        assert!(table.route(999).is_none());
        assert_eq!(table.len(), 1, "other handlers are untouched");
    }

    #[test]
    fn test_clear_counts_persistent_subscriptions() {
        let mut table = CorrelationTable::new();
        table.insert(1, once());
        table.insert(2, persistent());
        table.insert(3, persistent());

        assert_eq!(table.clear(), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_insert_returns_displaced_handler() {
        let mut table = CorrelationTable::new();
        assert!(table.insert(1, once()).is_none());
        assert!(table.insert(1, persistent()).is_some());
        assert!(table.is_persistent(1));
    }

    #[test]
    fn test_dispatch_insert_refuses_duplicates() {
        // Arrange
        let mut table = DispatchTable::new();
        let handler = callback(|_: Message| async {});

        // Act / Assert
        assert!(table.insert("pong", handler.clone()));
        assert!(!table.insert("pong", handler));
        assert!(table.contains("pong"));
    }

    #[test]
    fn test_dispatch_remove_if_same_ignores_replacement() {
        // Arrange
        let mut table = DispatchTable::new();
        let original = callback(|_: Message| async {});
        let replacement = callback(|_: Message| async {});
        table.insert("pong", original.clone());
        table.remove("pong");
        table.insert("pong", replacement.clone());

        // Act
        let removed_stale = table.remove_if_same("pong", &original);

        // Assert
        assert!(!removed_stale);
        assert!(table.contains("pong"));
        assert!(table.remove_if_same("pong", &replacement));
        assert!(!table.contains("pong"));
    }

    #[test]
    fn test_dispatch_remove_and_clear() {
        let mut table = DispatchTable::new();
        table.insert("pong", callback(|_: Message| async {}));
        table.insert("other", callback(|_: Message| async {}));

        assert!(table.remove("pong").is_some());
        assert!(table.get("pong").is_none());
        table.clear();
        assert!(!table.contains("other"));
    }
}
