//! haws-client library crate.
//!
//! An asynchronous client for the hub's websocket control protocol.  One
//! [`Session`](application::Session) authenticates with the hub, allocates
//! correlation ids for requests, and routes results, events and other
//! frames to the handlers callers registered.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Hub (JSON over WebSocket)
//!         ↕
//! [haws-client]
//!   ├── domain/           SessionConfig and websocket URL derivation
//!   ├── application/      Session, keepalive, commands, supervisor
//!   └── infrastructure/
//!         ├── ws_transport/ tokio-tungstenite connector
//!         ├── memory/       in-memory connector for tests
//!         ├── config_file/  TOML config
//!         └── credentials/  token sources
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies (no I/O, no async).
//! - `application` depends on `domain` and `haws-core`, and reaches the
//!   network only through the `Connector` trait.
//! - `infrastructure` depends on all other layers plus `tokio-tungstenite`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use haws_client::application::Session;
//! use haws_client::domain::SessionConfig;
//! use haws_client::infrastructure::WsConnector;
//!
//! # async fn demo() -> Result<(), haws_client::application::SessionError> {
//! let config = SessionConfig::new("http://homeassistant.local:8123", "TOKEN");
//! let session = Session::new(config.clone(), Arc::new(WsConnector::from_config(&config)));
//! session.start()?;
//! session.wait_authenticated(config.auth_timeout).await?;
//! session
//!     .subscribe_events(Some("state_changed"), |event| async move {
//!         println!("{event}");
//!     })
//!     .await;
//! # Ok(())
//! # }
//! ```

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: the protocol session and everything built on it.
pub mod application;

/// Infrastructure layer: transports, config file and credentials.
pub mod infrastructure;
