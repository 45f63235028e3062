//! Domain layer for haws-client.
//!
//! Pure configuration types with no dependencies on sockets, timers or files.
//! The infrastructure layer fills them in from the TOML file, the command
//! line and the environment.

pub mod config;

pub use config::{websocket_url, SessionConfig};
