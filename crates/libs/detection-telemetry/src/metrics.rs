//! Session counters for the reporter and sender
//!
//! Lock-free so the frame callback can record without contention.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Telemetry metrics collector
pub struct TelemetryMetrics {
    /// Frames handed to the reporter
    frames_seen: AtomicU64,

    /// People summed over every frame
    people_observed: AtomicU64,

    /// Vehicles summed over every frame
    vehicles_observed: AtomicU64,

    /// Aggregates that passed the rate gate
    aggregates_evaluated: AtomicU64,

    /// Aggregates judged significant and queued
    messages_enqueued: AtomicU64,

    /// Aggregates judged insignificant
    messages_suppressed: AtomicU64,

    /// Messages written to the collector
    messages_sent: AtomicU64,

    /// Messages lost to a failed write
    send_failures: AtomicU64,

    /// Failed connection attempts
    connect_failures: AtomicU64,

    /// Successful connections
    connections: AtomicU64,

    /// Messages evicted by the queue capacity cap
    messages_dropped: AtomicU64,

    started: Instant,
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            frames_seen: AtomicU64::new(0),
            people_observed: AtomicU64::new(0),
            vehicles_observed: AtomicU64::new(0),
            aggregates_evaluated: AtomicU64::new(0),
            messages_enqueued: AtomicU64::new(0),
            messages_suppressed: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Record one frame and its counts; returns the running frame number
    pub fn frame_observed(&self, people: usize, vehicles: usize) -> u64 {
        self.people_observed
            .fetch_add(people as u64, Ordering::Relaxed);
        self.vehicles_observed
            .fetch_add(vehicles as u64, Ordering::Relaxed);
        self.frames_seen.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn aggregate_evaluated(&self) {
        self.aggregates_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_enqueued(&self) {
        self.messages_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_suppressed(&self) {
        self.messages_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_failed(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connect_failed(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connected(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_dropped(&self, count: u64) {
        self.messages_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_seen: self.frames_seen.load(Ordering::Relaxed),
            people_observed: self.people_observed.load(Ordering::Relaxed),
            vehicles_observed: self.vehicles_observed.load(Ordering::Relaxed),
            aggregates_evaluated: self.aggregates_evaluated.load(Ordering::Relaxed),
            messages_enqueued: self.messages_enqueued.load(Ordering::Relaxed),
            messages_suppressed: self.messages_suppressed.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

/// Point-in-time view of [`TelemetryMetrics`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub frames_seen: u64,
    pub people_observed: u64,
    pub vehicles_observed: u64,
    pub aggregates_evaluated: u64,
    pub messages_enqueued: u64,
    pub messages_suppressed: u64,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub connect_failures: u64,
    pub connections: u64,
    pub messages_dropped: u64,
    pub uptime_secs: u64,
}
