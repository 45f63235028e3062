//! Application layer for haws-client.
//!
//! The application layer owns the protocol session: it knows *what* to send
//! and *how to route* what comes back, but delegates the socket itself to an
//! infrastructure [`Connector`](transport::Connector).
//!
//! # Responsibilities
//!
//! - The authentication handshake and the session state machine
//! - Message-id correlation of results and events to caller handlers
//! - Type-level dispatch for uncorrelated frames
//! - Keepalive probes, typed hub commands, and reconnect supervision
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or websocket framing (that is infrastructure)
//! - Reading config files or the environment (that is done in `main.rs`)

pub mod commands;
pub mod handlers;
pub mod keepalive;
pub mod session;
pub mod supervisor;
pub mod tables;
pub mod transport;

pub use handlers::{callback, Callback, Delivery, MessageHandler, ResultHandler, TemplateCallback};
pub use session::{Session, SessionError};
pub use supervisor::Supervisor;
pub use transport::{Connector, Frame, FrameSink, FrameStream, TransportError};
