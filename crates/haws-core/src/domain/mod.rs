//! Domain entities for the hub websocket client.
//!
//! This module contains pure rules with no infrastructure dependencies: no
//! sockets, no timers, no async runtime.  Code in the client crate depends on
//! these types, but nothing here depends on the client.

/// Connection lifecycle of one session instance.
///
/// See [`state::SessionState`] for the main type.
pub mod state;
