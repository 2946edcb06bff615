//! Edge Reporter Binary
//!
//! Usage: `edge-reporter [CONFIG_PATH] [INPUT]`
//!
//! `INPUT` is a JSON-lines file of frame detections, or `-` for stdin.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::oneshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edgecount_reporter::{replay, FrameSource, ReplayError, ReplaySettings, ReplaySummary};
use edgecount_telemetry::{ClassMap, MetricsSnapshot, TelemetryConfig, TelemetryService};

const DEFAULT_CONFIG_PATH: &str = "edgecount.toml";
const DRAIN_GRACE: Duration = Duration::from_secs(5);
const DRAIN_POLL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = PathBuf::from(args.next().unwrap_or_else(|| DEFAULT_CONFIG_PATH.into()));
    let input = args.next().unwrap_or_else(|| "-".into());

    let config = TelemetryConfig::load(Some(&config_path))
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    let reader: Box<dyn BufRead + Send> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(
            File::open(&input).with_context(|| format!("opening input {input}"))?,
        ))
    };

    tracing::info!(
        device_id = %config.device_id,
        input = %input,
        grid_size = config.frame.grid_size,
        "Starting edge reporter"
    );

    let mut service = TelemetryService::start_websocket(&config);
    let mut reporter = service
        .take_reporter()
        .context("frame reporter already taken")?;
    let classes = ClassMap::from_config(&config.classes);
    let settings = ReplaySettings::from_env();

    // Plain thread: stdin reads cannot be interrupted, so the runtime must
    // not wait on this at exit
    let stop = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = oneshot::channel::<Result<ReplaySummary, ReplayError>>();
    {
        let stop = stop.clone();
        std::thread::Builder::new()
            .name("frame-input".into())
            .spawn(move || {
                let mut source = FrameSource::new(reader);
                let result = replay(&mut source, &mut reporter, &classes, &settings, &stop);
                let _ = done_tx.send(result);
            })
            .context("spawning frame input thread")?;
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let end_of_input = tokio::select! {
        result = done_rx => {
            match result {
                Ok(Ok(summary)) => tracing::info!(
                    frames = summary.frames,
                    skipped = summary.skipped,
                    enqueued = summary.enqueued,
                    suppressed = summary.suppressed,
                    rate_limited = summary.rate_limited,
                    "End of input"
                ),
                Ok(Err(e)) => tracing::error!(error = %e, "Frame input failed"),
                Err(_) => tracing::error!("Frame input thread exited unexpectedly"),
            }
            true
        }
        _ = &mut shutdown => {
            tracing::info!("Shutdown signal received, stopping...");
            stop.store(true, Ordering::Relaxed);
            false
        }
    };

    let metrics = service.metrics();
    if end_of_input {
        // Give the sender a bounded chance to flush what the input produced
        let grace = tokio::time::sleep(DRAIN_GRACE);
        tokio::pin!(grace);
        while !delivery_settled(&metrics.snapshot()) {
            tokio::select! {
                _ = &mut grace => {
                    tracing::warn!(pending = service.queue().len(), "Collector did not drain before exit");
                    break;
                }
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(DRAIN_POLL) => {}
            }
        }
    }

    let pending = service.queue().len();
    service.shutdown().await;

    let snapshot = metrics.snapshot();
    tracing::info!(
        frames = snapshot.frames_seen,
        people_total = snapshot.people_observed,
        vehicles_total = snapshot.vehicles_observed,
        reports_sent = snapshot.messages_sent,
        reports_suppressed = snapshot.messages_suppressed,
        reports_dropped = snapshot.messages_dropped,
        send_failures = snapshot.send_failures,
        connect_failures = snapshot.connect_failures,
        discarded_pending = pending,
        uptime_secs = snapshot.uptime_secs,
        "Session summary"
    );

    Ok(())
}

/// Every enqueued report was either written, lost to a failed write, or
/// evicted by the capacity cap
fn delivery_settled(snapshot: &MetricsSnapshot) -> bool {
    snapshot.messages_sent + snapshot.send_failures + snapshot.messages_dropped
        >= snapshot.messages_enqueued
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
