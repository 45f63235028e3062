//! Hub websocket client: entry point.
//!
//! Keeps an authenticated session to the hub open, reconnecting whenever it
//! drops, and logs every event of the types given with `--subscribe`.
//!
//! # Usage
//!
//! ```text
//! haws-client [OPTIONS]
//!
//! Options:
//!   --config <PATH>              TOML config file
//!   --url <URL>                  Hub base URL [default: http://supervisor/core/]
//!   --token <TOKEN>              Long-lived access token
//!   --auth-timeout <SECS>        Handshake timeout [default: 10]
//!   --ping-interval <SECS>       Keepalive interval [default: 10]
//!   --ping-count <N>             Keepalive probes, 0 = unlimited [default: 0]
//!   --reconnect-interval <SECS>  Connection check interval [default: 5]
//!   --subscribe <EVENT_TYPE>     Log events of this type (repeatable)
//!   --log-level <FILTER>         Log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable           | Description                                   |
//! |--------------------|-----------------------------------------------|
//! | `HAWS_CONFIG`      | Config file path                              |
//! | `HAWS_URL`         | Hub base URL                                  |
//! | `HAWS_TOKEN`       | Access token                                  |
//! | `SUPERVISOR_TOKEN` | Token fallback inside add-on containers       |
//! | `RUST_LOG`         | `tracing` filter, overrides `--log-level`     |
//!
//! Precedence: command line, then environment, then config file, then the
//! built-in defaults.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use haws_client::application::Supervisor;
use haws_client::domain::SessionConfig;
use haws_client::infrastructure::{resolve_token, EnvToken, FileConfig, StaticToken, WsConnector};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Hub websocket client.
#[derive(Debug, Parser)]
#[command(
    name = "haws-client",
    about = "Keeps an authenticated websocket session to the hub and logs events",
    version
)]
struct Cli {
    /// TOML config file.  Values given on the command line take precedence.
    #[arg(long, env = "HAWS_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the hub; the websocket endpoint is derived from it.
    #[arg(long, env = "HAWS_URL")]
    url: Option<String>,

    /// Long-lived access token.  Falls back to `SUPERVISOR_TOKEN`.
    #[arg(long, env = "HAWS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Seconds to wait for the hub to accept the token.
    #[arg(long, value_name = "SECS")]
    auth_timeout: Option<u64>,

    /// Seconds between keepalive probes.
    #[arg(long, value_name = "SECS")]
    ping_interval: Option<u64>,

    /// Keepalive probes per connection; 0 means unlimited.
    #[arg(long, value_name = "N")]
    ping_count: Option<u32>,

    /// Seconds between connection checks.
    #[arg(long, value_name = "SECS")]
    reconnect_interval: Option<u64>,

    /// Event type to subscribe to and log.  May be repeated.
    #[arg(long = "subscribe", value_name = "EVENT_TYPE")]
    subscriptions: Vec<String>,

    /// `tracing` filter used when `RUST_LOG` is not set.
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

/// Everything `main` needs once flags, file and environment are merged.
#[derive(Debug)]
struct RunConfig {
    session: SessionConfig,
    subscriptions: Vec<String>,
    log_level: String,
    token_source: Option<String>,
}

impl Cli {
    /// Merges the command line over the config file (if any).
    ///
    /// # Errors
    ///
    /// Returns an error if `--config` names a file that cannot be read or
    /// parsed.
    fn into_run_config(self) -> anyhow::Result<RunConfig> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)
                .with_context(|| format!("loading config file {}", path.display()))?,
            None => FileConfig::default(),
        };
        let mut session = file.session_config();

        if let Some(url) = self.url {
            session.url = url;
        }
        if let Some(token) = self.token {
            session.token = token;
        }
        if let Some(secs) = self.auth_timeout {
            session.auth_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.ping_interval {
            session.ping_interval = Duration::from_secs(secs);
        }
        if let Some(count) = self.ping_count {
            session.ping_count = count;
        }
        if let Some(secs) = self.reconnect_interval {
            session.reconnect_interval = Duration::from_secs(secs);
        }

        let configured = StaticToken::new(session.token.clone());
        let supervisor = EnvToken::supervisor();
        let token_source = match resolve_token(&[&configured, &supervisor]) {
            Some((token, source)) => {
                session.token = token;
                Some(source)
            }
            None => None,
        };

        Ok(RunConfig {
            session,
            subscriptions: self.subscriptions,
            log_level: self.log_level.unwrap_or(file.log_level),
            token_source,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. CLI arguments are parsed and merged with the config file.
/// 2. `tracing_subscriber` is initialised from `RUST_LOG`, falling back to
///    the configured level.
/// 3. A Ctrl+C handler clears the shared `running` flag.
/// 4. The [`Supervisor`] keeps a session up until the flag is cleared,
///    re-subscribing to every `--subscribe` type after each reconnect.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_run_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "hub websocket client starting: endpoint={}",
        config.session.websocket_url()
    );
    match &config.token_source {
        Some(source) => info!("using access token from {source}"),
        None => warn!("no access token configured; the hub will reject authentication"),
    }

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::SeqCst);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Supervision loop ───────────────────────────────────────────────────────
    let connector = Arc::new(WsConnector::from_config(&config.session));
    let subscriptions = Arc::new(config.subscriptions);
    let supervisor = Supervisor::new(config.session, connector).on_connected(move |session| {
        let subscriptions = Arc::clone(&subscriptions);
        async move {
            for event_type in subscriptions.iter() {
                let label = event_type.clone();
                let id = session
                    .subscribe_events(Some(event_type.as_str()), move |event| {
                        let label = label.clone();
                        async move { info!("event {label}: {event}") }
                    })
                    .await;
                match id {
                    Some(id) => info!("subscribed to {event_type} events (id {id})"),
                    None => warn!("could not subscribe to {event_type} events"),
                }
            }
        }
    });
    supervisor.run(running).await;

    info!("hub websocket client stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
