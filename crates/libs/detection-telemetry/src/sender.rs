//! Resilient sender
//!
//! Owns the single collector connection. Drains the delivery queue in
//! order and reconnects with a fixed backoff whenever the connection
//! cannot be opened or a write fails. Every failure sleeps the backoff, so
//! a collector that accepts and then fails each write costs at most one
//! report per backoff period.
//!
//! ```text
//!            connect ok
//!  Disconnected ─────────▶ Connected ──┐ pop + send
//!     ▲   │                    │  ▲    │
//!     │   │ connect err        │  └────┘
//!     │   ▼                    │ send err (message dropped)
//!     │ sleep(backoff) ◀───────┘
//!     └───┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::TelemetryConfig;
use crate::metrics::TelemetryMetrics;
use crate::queue::DeliveryQueue;
use crate::transport::{CollectorConnection, CollectorTransport};

/// Sender configuration
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Delay after a failed connection attempt
    pub reconnect_backoff: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: Duration::from_secs(5),
        }
    }
}

impl SenderConfig {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            reconnect_backoff: config.reconnect_backoff(),
        }
    }
}

/// Connection state of the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Disconnected,
    Connected,
    Stopped,
}

enum Delivery {
    /// The connection failed; reconnect
    Dropped,
    /// Shutdown was requested while connected
    Shutdown,
}

/// Queue consumer that owns the collector connection
pub struct ResilientSender<T: CollectorTransport> {
    transport: T,
    queue: DeliveryQueue,
    config: SenderConfig,
    metrics: Arc<TelemetryMetrics>,
    shutdown_rx: broadcast::Receiver<()>,
    state_tx: watch::Sender<SenderState>,
}

impl<T: CollectorTransport> ResilientSender<T> {
    /// Create a sender; it stops when `shutdown_rx` fires or its sender is dropped
    pub fn new(
        transport: T,
        queue: DeliveryQueue,
        config: SenderConfig,
        metrics: Arc<TelemetryMetrics>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SenderState::Disconnected);
        Self {
            transport,
            queue,
            config,
            metrics,
            shutdown_rx,
            state_tx,
        }
    }

    /// Observe state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SenderState> {
        self.state_tx.subscribe()
    }

    /// Run on the current tokio runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    fn set_state(&self, state: SenderState) {
        self.state_tx.send_replace(state);
    }

    /// Run until shutdown
    pub async fn run(mut self) {
        let endpoint = self.transport.endpoint().to_string();
        tracing::info!(endpoint = %endpoint, "Collector sender started");

        loop {
            self.set_state(SenderState::Disconnected);

            let attempt = tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => break,
                result = self.transport.connect() => result,
            };

            let mut connection = match attempt {
                Ok(connection) => connection,
                Err(e) => {
                    self.metrics.connect_failed();
                    tracing::warn!(
                        endpoint = %endpoint,
                        error = %e,
                        backoff_ms = self.config.reconnect_backoff.as_millis() as u64,
                        pending = self.queue.len(),
                        "Collector connection failed, retrying after backoff"
                    );
                    tokio::select! {
                        biased;
                        _ = self.shutdown_rx.recv() => break,
                        _ = sleep(self.config.reconnect_backoff) => continue,
                    }
                }
            };

            self.metrics.connected();
            self.set_state(SenderState::Connected);
            tracing::info!(
                endpoint = %endpoint,
                pending = self.queue.len(),
                "Collector connected"
            );

            match self.deliver(&mut connection).await {
                Delivery::Shutdown => {
                    connection.close().await;
                    break;
                }
                Delivery::Dropped => {
                    self.set_state(SenderState::Disconnected);
                    tracing::info!(
                        endpoint = %endpoint,
                        backoff_ms = self.config.reconnect_backoff.as_millis() as u64,
                        pending = self.queue.len(),
                        "Collector connection dropped, reconnecting after backoff"
                    );
                    tokio::select! {
                        biased;
                        _ = self.shutdown_rx.recv() => break,
                        _ = sleep(self.config.reconnect_backoff) => {}
                    }
                }
            }
        }

        let discarded = self.queue.clear();
        self.set_state(SenderState::Stopped);
        tracing::info!(
            endpoint = %endpoint,
            discarded = discarded,
            "Collector sender stopped"
        );
    }

    /// Send queued messages until the connection fails or shutdown
    ///
    /// A message whose write fails is not re-queued; everything still in
    /// the queue waits for the next connection.
    async fn deliver(&mut self, connection: &mut T::Connection) -> Delivery {
        loop {
            let message = tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => return Delivery::Shutdown,
                message = self.queue.pop() => message,
            };

            let payload = match message.to_json() {
                Ok(payload) => payload,
                Err(e) => {
                    self.metrics.send_failed();
                    tracing::warn!(error = %e, "Failed to encode detection report, dropping it");
                    return Delivery::Dropped;
                }
            };

            let result = tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => return Delivery::Shutdown,
                result = connection.send_text(payload) => result,
            };

            match result {
                Ok(()) => {
                    self.metrics.message_sent();
                    tracing::debug!(
                        device_id = %message.device_id(),
                        people_count = message.people_count(),
                        vehicle_count = message.vehicle_count(),
                        "Sent detection report"
                    );
                }
                Err(e) => {
                    self.metrics.send_failed();
                    tracing::warn!(
                        error = %e,
                        kind = e.kind(),
                        pending = self.queue.len(),
                        "Collector send failed, report dropped"
                    );
                    return Delivery::Dropped;
                }
            }
        }
    }
}
