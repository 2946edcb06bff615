//! Frame callback entry point and service wiring
//!
//! [`FrameReporter`] is what the perception pipeline calls once per frame.
//! It is owned by the callback thread (`&mut self` is the single-writer
//! guarantee for the report state) and never performs I/O: its only
//! side effect towards the network is a non-blocking queue push.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::aggregator::FrameAggregator;
use crate::change::{ChangeDetector, ReportState};
use crate::config::TelemetryConfig;
use crate::detection::Detection;
use crate::metrics::TelemetryMetrics;
use crate::queue::DeliveryQueue;
use crate::sender::{ResilientSender, SenderConfig, SenderState};
use crate::transport::{CollectorTransport, WebSocketTransport};

/// What happened to one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Inside the reporting interval; not evaluated
    RateLimited,
    /// Evaluated but too similar to the last report
    Suppressed,
    /// Evaluated and queued for delivery
    Enqueued,
}

/// Synchronous per-frame reporter
pub struct FrameReporter {
    aggregator: FrameAggregator,
    detector: ChangeDetector,
    metrics: Arc<TelemetryMetrics>,
    progress_log_every: u64,
}

impl FrameReporter {
    pub fn new(
        config: &TelemetryConfig,
        queue: DeliveryQueue,
        metrics: Arc<TelemetryMetrics>,
    ) -> Self {
        Self {
            aggregator: FrameAggregator::from_config(config),
            detector: ChangeDetector::new(
                config.device_id.clone(),
                config.reporting.change_threshold,
                queue,
                metrics.clone(),
            ),
            metrics,
            progress_log_every: config.reporting.progress_log_every,
        }
    }

    /// Handle one frame's detections observed at `now_nanos`
    ///
    /// Never blocks and never fails; delivery problems stay with the sender.
    pub fn on_frame(&mut self, detections: &[Detection], now_nanos: u64) -> FrameOutcome {
        let tally = self.aggregator.tally(detections);
        let frame = self.metrics.frame_observed(tally.people, tally.vehicles);
        if self.progress_log_every > 0 && frame % self.progress_log_every == 0 {
            tracing::info!(
                frame = frame,
                people = tally.people,
                vehicles = tally.vehicles,
                "Processing frames"
            );
        }

        let last = self.detector.state().last_report_nanos();
        if !self.aggregator.is_due(last, now_nanos) {
            return FrameOutcome::RateLimited;
        }

        self.metrics.aggregate_evaluated();
        let aggregate = self.aggregator.aggregate(detections, now_nanos);
        if self.detector.process(aggregate).is_significant() {
            FrameOutcome::Enqueued
        } else {
            FrameOutcome::Suppressed
        }
    }

    /// [`on_frame`](Self::on_frame) stamped with the wall clock
    pub fn on_frame_now(&mut self, detections: &[Detection]) -> FrameOutcome {
        self.on_frame(detections, unix_nanos())
    }

    pub fn state(&self) -> &ReportState {
        self.detector.state()
    }
}

/// Wall-clock time in nanoseconds since the Unix epoch
pub fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Running telemetry subsystem: a reporter for the callback thread plus
/// the sender task draining its queue
pub struct TelemetryService {
    reporter: Option<FrameReporter>,
    queue: DeliveryQueue,
    metrics: Arc<TelemetryMetrics>,
    shutdown_tx: broadcast::Sender<()>,
    sender_state: watch::Receiver<SenderState>,
    sender_handle: JoinHandle<()>,
}

impl TelemetryService {
    /// Wire everything and spawn the sender on the current tokio runtime
    pub fn start<T: CollectorTransport>(config: &TelemetryConfig, transport: T) -> Self {
        let queue = DeliveryQueue::new(config.reporting.max_pending);
        let metrics = Arc::new(TelemetryMetrics::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let sender = ResilientSender::new(
            transport,
            queue.clone(),
            SenderConfig::from_config(config),
            metrics.clone(),
            shutdown_rx,
        );
        let sender_state = sender.subscribe_state();
        let sender_handle = sender.spawn();

        tracing::info!(
            device_id = %config.device_id,
            collector = %config.collector.url,
            interval_ms = config.reporting.interval_ms,
            threshold = config.reporting.change_threshold,
            "Telemetry service started"
        );

        Self {
            reporter: Some(FrameReporter::new(config, queue.clone(), metrics.clone())),
            queue,
            metrics,
            shutdown_tx,
            sender_state,
            sender_handle,
        }
    }

    /// Start with the WebSocket transport from configuration
    pub fn start_websocket(config: &TelemetryConfig) -> Self {
        let transport =
            WebSocketTransport::new(config.collector.url.clone(), config.connect_timeout());
        Self::start(config, transport)
    }

    /// Hand the reporter to the frame callback thread; only the first call
    /// returns it
    pub fn take_reporter(&mut self) -> Option<FrameReporter> {
        self.reporter.take()
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    pub fn metrics(&self) -> Arc<TelemetryMetrics> {
        self.metrics.clone()
    }

    pub fn sender_state(&self) -> watch::Receiver<SenderState> {
        self.sender_state.clone()
    }

    /// Stop the sender and wait for it; pending messages are discarded
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.sender_handle.await {
            tracing::error!(error = %e, "Collector sender task failed");
        }
    }
}
