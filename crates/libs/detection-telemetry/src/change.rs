//! Significance check between consecutive reported aggregates
//!
//! Detections carry no identity across frames, so old and new positions
//! are paired by sorting both lists on `(x, y)`. Clustered objects can be
//! mis-paired; this is accepted.

use std::sync::Arc;

use crate::aggregator::FrameAggregate;
use crate::message::TelemetryMessage;
use crate::metrics::TelemetryMetrics;
use crate::projector::GridPosition;
use crate::queue::DeliveryQueue;

/// Why an aggregate was or was not reported
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Significance {
    /// Nothing reported yet
    Bootstrap,
    /// Person or vehicle count differs from the last report
    CountChanged,
    /// A paired position moved further than the threshold
    Moved { distance: f64 },
    /// Within tolerance of the last report
    Insignificant,
}

impl Significance {
    pub fn is_significant(&self) -> bool {
        !matches!(self, Significance::Insignificant)
    }
}

/// Last reported aggregate and last evaluation time
///
/// Written only by [`ChangeDetector`]; starts empty and is never persisted.
#[derive(Debug, Clone, Default)]
pub struct ReportState {
    last: Option<FrameAggregate>,
    last_report_nanos: Option<u64>,
}

impl ReportState {
    pub fn last(&self) -> Option<&FrameAggregate> {
        self.last.as_ref()
    }

    pub fn last_report_nanos(&self) -> Option<u64> {
        self.last_report_nanos
    }
}

/// Decides whether an aggregate is worth sending and queues it if so
pub struct ChangeDetector {
    threshold: f64,
    device_id: String,
    queue: DeliveryQueue,
    metrics: Arc<TelemetryMetrics>,
    state: ReportState,
}

impl ChangeDetector {
    pub fn new(
        device_id: impl Into<String>,
        threshold: f64,
        queue: DeliveryQueue,
        metrics: Arc<TelemetryMetrics>,
    ) -> Self {
        Self {
            threshold,
            device_id: device_id.into(),
            queue,
            metrics,
            state: ReportState::default(),
        }
    }

    pub fn state(&self) -> &ReportState {
        &self.state
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compare `current` against `previous` without touching any state
    pub fn compare(
        &self,
        current: &FrameAggregate,
        previous: Option<&FrameAggregate>,
    ) -> Significance {
        let Some(previous) = previous else {
            return Significance::Bootstrap;
        };

        if current.person_count != previous.person_count
            || current.vehicle_count != previous.vehicle_count
        {
            return Significance::CountChanged;
        }

        let person = max_paired_distance(&current.person_positions, &previous.person_positions);
        let vehicle = max_paired_distance(&current.vehicle_positions, &previous.vehicle_positions);

        let furthest = match (person, vehicle) {
            (Some(p), Some(v)) => Some(p.max(v)),
            (p, v) => p.or(v),
        };

        match furthest {
            Some(distance) if distance > self.threshold => Significance::Moved { distance },
            _ => Significance::Insignificant,
        }
    }

    /// Evaluate an aggregate that passed the rate gate
    ///
    /// Significant aggregates become a [`TelemetryMessage`] on the queue
    /// and replace the last reported aggregate. Either way the report
    /// timestamp advances so the rate gate keeps moving.
    pub fn process(&mut self, aggregate: FrameAggregate) -> Significance {
        let significance = self.compare(&aggregate, self.state.last.as_ref());
        self.state.last_report_nanos = Some(aggregate.timestamp_nanos);

        if !significance.is_significant() {
            self.metrics.message_suppressed();
            tracing::debug!(
                device_id = %self.device_id,
                people_count = aggregate.person_count,
                vehicle_count = aggregate.vehicle_count,
                "Scene unchanged, report suppressed"
            );
            return significance;
        }

        let message = TelemetryMessage::from_aggregate(self.device_id.clone(), &aggregate);
        let evicted = self.queue.push(message);
        if evicted > 0 {
            self.metrics.messages_dropped(evicted as u64);
        }
        self.metrics.message_enqueued();

        tracing::info!(
            device_id = %self.device_id,
            timestamp_ns = aggregate.timestamp_nanos,
            people_count = aggregate.person_count,
            vehicle_count = aggregate.vehicle_count,
            reason = ?significance,
            "Queued detection report"
        );

        self.state.last = Some(aggregate);
        significance
    }
}

/// Largest distance between sorted, pairwise-matched positions
///
/// `None` when either side is empty. Unequal lengths never reach here in
/// practice because the count check fires first.
fn max_paired_distance(current: &[GridPosition], previous: &[GridPosition]) -> Option<f64> {
    if current.len() != previous.len() {
        return None;
    }

    let mut current_sorted = current.to_vec();
    let mut previous_sorted = previous.to_vec();
    current_sorted.sort_unstable();
    previous_sorted.sort_unstable();

    current_sorted
        .iter()
        .zip(previous_sorted.iter())
        .map(|(c, p)| c.distance(p))
        .fold(None, |max: Option<f64>, d| Some(max.map_or(d, |m| m.max(d))))
}
