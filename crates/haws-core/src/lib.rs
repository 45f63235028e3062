//! # haws-core
//!
//! Shared library for the hub websocket client containing the JSON wire
//! codec, outbound message builders, the message-id allocator and the
//! session state machine.
//!
//! This crate has zero dependencies on sockets or async runtimes, so every
//! rule it encodes can be tested without a network.
//!
//! # Architecture overview
//!
//! The hub speaks a bidirectional, message-multiplexed protocol: every frame
//! is a JSON object with a `"type"` field.  Requests carry an integer `"id"`
//! and the hub answers with a `"result"` frame (and, for subscriptions, any
//! number of `"event"` frames) carrying the same id.
//!
//! - **`protocol`** – How frames travel over the socket: [`encode`] and
//!   [`decode`] translate between wire text and [`Message`] records, the
//!   [`Inbound`] view classifies received frames, and
//!   [`MessageIdAllocator`] hands out correlation ids.
//!
//! - **`domain`** – Pure rules with no I/O.  [`SessionState`] describes the
//!   connection lifecycle and which transitions between states are legal.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `haws_core::Message` instead of `haws_core::protocol::messages::Message`.
pub use domain::state::SessionState;
pub use protocol::codec::{decode, encode, ProtocolError};
pub use protocol::messages::{Inbound, Message, MessageId};
pub use protocol::sequence::MessageIdAllocator;
