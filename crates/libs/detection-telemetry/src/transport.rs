//! Collector transports
//!
//! The sender only needs "open a connection" and "write one text frame",
//! so those two operations are the seam. `WebSocketTransport` is the
//! production implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

use crate::error::{TelemetryError, TelemetryResult};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// An open, send-only connection to the collector
#[async_trait]
pub trait CollectorConnection: Send {
    /// Write one serialized message
    async fn send_text(&mut self, payload: String) -> TelemetryResult<()>;

    /// Best-effort graceful close
    async fn close(&mut self) {}
}

/// Factory for collector connections; reused for every reconnect
#[async_trait]
pub trait CollectorTransport: Send + Sync + 'static {
    type Connection: CollectorConnection + 'static;

    /// Endpoint description for logs
    fn endpoint(&self) -> &str;

    /// Open a fresh connection to the same endpoint
    async fn connect(&self) -> TelemetryResult<Self::Connection>;
}

/// WebSocket transport to a `ws://` or `wss://` collector
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl CollectorTransport for WebSocketTransport {
    type Connection = WebSocketConnection;

    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> TelemetryResult<WebSocketConnection> {
        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| TelemetryError::ConnectTimeout {
                    timeout_ms: self.connect_timeout.as_millis() as u64,
                    url: self.url.clone(),
                })?
                .map_err(|e| TelemetryError::Connect(e.to_string()))?;

        Ok(WebSocketConnection { stream })
    }
}

/// Open WebSocket to the collector
pub struct WebSocketConnection {
    stream: WsStream,
}

impl WebSocketConnection {
    /// Consume whatever the collector sent without waiting
    ///
    /// Replies are never acted on, but reading lets the protocol layer
    /// answer pings and surfaces a close frame before the next write.
    fn drain_incoming(&mut self) -> TelemetryResult<()> {
        while let Some(incoming) = self.stream.next().now_or_never() {
            match incoming {
                None | Some(Ok(Message::Close(_))) => return Err(TelemetryError::Closed),
                Some(Err(e)) => return Err(TelemetryError::Send(e.to_string())),
                Some(Ok(_)) => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CollectorConnection for WebSocketConnection {
    async fn send_text(&mut self, payload: String) -> TelemetryResult<()> {
        self.drain_incoming()?;
        self.stream
            .send(Message::Text(payload))
            .await
            .map_err(|e| TelemetryError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "Collector close handshake failed");
        }
    }
}
