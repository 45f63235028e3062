//! Session configuration types.
//!
//! [`SessionConfig`] is everything one session instance needs to reach and
//! authenticate with the hub, plus the keepalive and supervision timings.
//! It is a plain struct: no global state and no environment reads inside the
//! domain.  The infrastructure layer populates it.

use std::time::Duration;

/// Default hub address inside an add-on container.
pub const DEFAULT_HUB_URL: &str = "http://supervisor/core/";

/// Path of the websocket endpoint relative to the hub's base URL.
const WEBSOCKET_PATH: &str = "api/websocket";

/// All runtime configuration for one hub session.
///
/// # Example
///
/// ```rust
/// use haws_client::domain::SessionConfig;
///
/// let cfg = SessionConfig::default();
/// assert_eq!(cfg.websocket_url(), "ws://supervisor/core/api/websocket");
/// ```
#[derive(Clone, PartialEq)]
pub struct SessionConfig {
    /// Base URL of the hub (`http`, `https`, `ws` or `wss`).
    pub url: String,

    /// Long-lived access token sent in the auth frame.
    pub token: String,

    /// How long callers wait for the handshake before giving up.
    pub auth_timeout: Duration,

    /// Delay between keepalive probes.
    pub ping_interval: Duration,

    /// Number of keepalive probes to send; `0` means unlimited.
    pub ping_count: u32,

    /// How often the supervisor checks whether the session is still connected.
    pub reconnect_interval: Duration,
}

impl SessionConfig {
    /// Builds a config for `url` authenticated with `token`, other fields at
    /// their defaults.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            ..Self::default()
        }
    }

    /// The websocket endpoint derived from [`url`](Self::url).
    pub fn websocket_url(&self) -> String {
        websocket_url(&self.url)
    }
}

impl Default for SessionConfig {
    /// | Field              | Default                   |
    /// |--------------------|---------------------------|
    /// | url                | `http://supervisor/core/` |
    /// | token              | empty                     |
    /// | auth_timeout       | 10 seconds                |
    /// | ping_interval      | 10 seconds                |
    /// | ping_count         | 0 (unlimited)             |
    /// | reconnect_interval | 5 seconds                 |
    fn default() -> Self {
        Self {
            url: DEFAULT_HUB_URL.to_string(),
            token: String::new(),
            auth_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(10),
            ping_count: 0,
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

// The token must never end up in log output.
impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("url", &self.url)
            .field("token", &if self.token.is_empty() { "<empty>" } else { "<redacted>" })
            .field("auth_timeout", &self.auth_timeout)
            .field("ping_interval", &self.ping_interval)
            .field("ping_count", &self.ping_count)
            .field("reconnect_interval", &self.reconnect_interval)
            .finish()
    }
}

/// Derives the websocket endpoint from a hub base URL.
///
/// The base is normalised to end in exactly one `/` before `api/websocket`
/// is appended.  `http` becomes `ws` and `https` becomes `wss`; `ws`/`wss`
/// bases are kept as they are.  An empty base falls back to
/// [`DEFAULT_HUB_URL`].
pub fn websocket_url(base: &str) -> String {
    let base = base.trim();
    let base = if base.is_empty() { DEFAULT_HUB_URL } else { base };
    let joined = format!("{}/{WEBSOCKET_PATH}", base.trim_end_matches('/'));

    if let Some(rest) = joined.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = joined.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        joined
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
