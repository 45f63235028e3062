//! WebSocket transport backed by `tokio-tungstenite`.
//!
//! [`WsConnector`] opens one client connection per `connect()` call and
//! splits the socket into a write half ([`WsSink`]) and a read half
//! ([`WsReader`]), which the session drives independently.  Transport-level
//! pings are answered by tungstenite itself; they surface here only as
//! [`Frame::Ping`]/[`Frame::Pong`] for logging.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use crate::application::transport::{Connector, Frame, FrameSink, FrameStream, TransportError};
use crate::domain::config::SessionConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens websocket connections to one endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Connects to the websocket endpoint `url` as given.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Connects to the endpoint derived from `config.url`.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.websocket_url())
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError> {
        let (stream, response) =
            connect_async(self.url.as_str())
                .await
                .map_err(|e| TransportError::Connect {
                    url: self.url.clone(),
                    reason: e.to_string(),
                })?;
        debug!("websocket upgrade to {} ({})", self.url, response.status());

        let (sink, stream) = stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsReader { stream })))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

/// Write half of a tungstenite connection.
pub struct WsSink {
    sink: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| match e {
                WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
                other => TransportError::Send(other.to_string()),
            })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}

/// Read half of a tungstenite connection.
pub struct WsReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for WsReader {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            };
            let frame = match msg {
                WsMessage::Text(text) => Frame::Text(text),
                WsMessage::Binary(data) => Frame::Binary(data),
                WsMessage::Ping(_) => Frame::Ping,
                WsMessage::Pong(_) => Frame::Pong,
                WsMessage::Close(close) => Frame::Close(close.map(|c| c.reason.to_string())),
                // Raw frames are never yielded while reading.
                WsMessage::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_from_config_derives_endpoint() {
        let cfg = SessionConfig::new("https://hub.example.com", "T");
        let connector = WsConnector::from_config(&cfg);
        assert_eq!(connector.endpoint(), "wss://hub.example.com/api/websocket");
    }

    #[tokio::test]
    async fn test_connect_refused_reports_connect_error() {
        // Arrange: nothing listens on port 1.
        let connector = WsConnector::new("ws://127.0.0.1:1/api/websocket");

        // Act
        let result = connector.connect().await;

        // Assert
        match result {
            Err(TransportError::Connect { url, .. }) => {
                assert_eq!(url, "ws://127.0.0.1:1/api/websocket");
            }
            Err(other) => panic!("expected Connect error, got {other}"),
            Ok(_) => panic!("connect to a closed port succeeded"),
        }
    }
}
