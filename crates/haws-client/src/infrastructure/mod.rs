//! Infrastructure layer for haws-client.
//!
//! # Responsibilities
//!
//! - Opening websocket connections to the hub (`ws_transport`)
//! - An in-memory transport that plays the hub in tests (`memory`)
//! - Loading the TOML config file (`config_file`)
//! - Locating the access token (`credentials`)

pub mod config_file;
pub mod credentials;
pub mod memory;
pub mod ws_transport;

pub use config_file::{ConfigError, FileConfig};
pub use credentials::{resolve_token, CredentialSource, EnvToken, StaticToken};
pub use memory::{MemoryConnector, MemoryPeer};
pub use ws_transport::WsConnector;
