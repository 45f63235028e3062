//! Handler shapes callers hand to the session.
//!
//! Every handler is asynchronous and is awaited on the read loop, in frame
//! arrival order.  The shape is chosen by the caller when registering, never
//! inferred from the closure:
//!
//! - [`ResultHandler::Once`] fires for the first `result` or `event` that
//!   carries its id and is then dropped.
//! - [`ResultHandler::Persistent`] fires for every `event` on its id until
//!   unsubscribed or the session closes.
//! - [`TemplateCallback`] picks between receiving only the rendered text or
//!   the text plus the full event payload.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;

use haws_core::Message;

/// A shareable async callback taking one argument.
pub type Callback<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// A type-level handler stored in the dispatch table; receives the whole frame.
pub type MessageHandler = Callback<Message>;

/// Wraps an async closure into a [`Callback`].
pub fn callback<T, F, Fut>(f: F) -> Callback<T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |value| f(value).boxed())
}

/// What a correlated handler receives.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A `result` frame for the handler's id.
    Result {
        success: bool,
        result: Value,
        error: Option<Value>,
    },
    /// The `event` payload of an `event` frame for the handler's id.
    Event(Value),
}

impl Delivery {
    /// The payload: `result` for results, `event` for events.
    pub fn value(&self) -> &Value {
        match self {
            Delivery::Result { result, .. } => result,
            Delivery::Event(event) => event,
        }
    }

    /// `false` only for a failed `result`.
    pub fn is_success(&self) -> bool {
        match self {
            Delivery::Result { success, .. } => *success,
            Delivery::Event(_) => true,
        }
    }
}

type OnceFn = Box<dyn FnOnce(Delivery) -> BoxFuture<'static, ()> + Send>;

/// A handler registered in the correlation table under one message id.
pub enum ResultHandler {
    /// Fired at most once, then removed.
    Once(OnceFn),
    /// Fired for every event on the id until removed.
    Persistent(Callback<Delivery>),
}

impl ResultHandler {
    /// Builds a one-shot handler.
    pub fn once<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Delivery) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        ResultHandler::Once(Box::new(move |delivery| f(delivery).boxed()))
    }

    /// Builds a persistent subscription handler.
    pub fn persistent<F, Fut>(f: F) -> Self
    where
        F: Fn(Delivery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        ResultHandler::Persistent(callback(f))
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, ResultHandler::Persistent(_))
    }
}

impl std::fmt::Debug for ResultHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultHandler::Once(_) => f.write_str("ResultHandler::Once"),
            ResultHandler::Persistent(_) => f.write_str("ResultHandler::Persistent"),
        }
    }
}

/// Receiver of rendered template values.
#[derive(Clone)]
pub enum TemplateCallback {
    /// Receives only the rendered text.
    TextOnly(Callback<String>),
    /// Receives the rendered text and the full event payload.
    TextWithContext(Arc<dyn Fn(String, Value) -> BoxFuture<'static, ()> + Send + Sync>),
}

impl TemplateCallback {
    pub fn text_only<F, Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        TemplateCallback::TextOnly(callback(f))
    }

    pub fn with_context<F, Fut>(f: F) -> Self
    where
        F: Fn(String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        TemplateCallback::TextWithContext(Arc::new(move |text, ctx| f(text, ctx).boxed()))
    }

    /// Runs the callback for one rendered value.
    pub fn call(&self, text: String, context: Value) -> BoxFuture<'static, ()> {
        match self {
            TemplateCallback::TextOnly(cb) => cb(text),
            TemplateCallback::TextWithContext(cb) => cb(text, context),
        }
    }
}
