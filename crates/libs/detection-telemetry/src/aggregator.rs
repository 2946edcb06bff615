//! Per-frame aggregation of detections into per-class counts and positions

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TelemetryConfig;
use crate::detection::Detection;
use crate::projector::{GridPosition, GridProjector};

/// Summary of one qualifying frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAggregate {
    pub person_positions: Vec<GridPosition>,
    pub vehicle_positions: Vec<GridPosition>,
    pub person_count: usize,
    pub vehicle_count: usize,
    pub timestamp_nanos: u64,
}

impl FrameAggregate {
    /// Aggregate with no detections at the given time
    pub fn empty(timestamp_nanos: u64) -> Self {
        Self::from_positions(Vec::new(), Vec::new(), timestamp_nanos)
    }

    /// Build an aggregate whose counts match the position lists
    pub fn from_positions(
        person_positions: Vec<GridPosition>,
        vehicle_positions: Vec<GridPosition>,
        timestamp_nanos: u64,
    ) -> Self {
        Self {
            person_count: person_positions.len(),
            vehicle_count: vehicle_positions.len(),
            person_positions,
            vehicle_positions,
            timestamp_nanos,
        }
    }
}

/// Raw per-frame counts, taken on every frame regardless of the rate gate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameTally {
    pub people: usize,
    pub vehicles: usize,
}

/// Classifies and projects one invocation's detections
///
/// Runs on the frame callback thread: no I/O, no allocation beyond the
/// output vectors.
#[derive(Debug, Clone)]
pub struct FrameAggregator {
    projector: GridProjector,
    min_confidence: f32,
    interval_nanos: u64,
}

impl FrameAggregator {
    pub fn new(projector: GridProjector, min_confidence: f32, report_interval: Duration) -> Self {
        Self {
            projector,
            min_confidence,
            interval_nanos: u64::try_from(report_interval.as_nanos()).unwrap_or(u64::MAX),
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(
            GridProjector::from_config(&config.frame),
            config.classes.min_confidence,
            config.report_interval(),
        )
    }

    fn is_reportable(&self, detection: &Detection) -> bool {
        detection.confidence >= self.min_confidence
            && (detection.class.is_person() || detection.class.is_vehicle())
    }

    /// Count people and vehicles without projecting
    pub fn tally(&self, detections: &[Detection]) -> FrameTally {
        detections
            .iter()
            .filter(|d| self.is_reportable(d))
            .fold(FrameTally::default(), |mut tally, d| {
                if d.class.is_person() {
                    tally.people += 1;
                } else {
                    tally.vehicles += 1;
                }
                tally
            })
    }

    /// Whether enough time has passed since the last evaluated aggregate
    ///
    /// A clock that stepped backwards past `last_report_nanos` opens the gate.
    pub fn is_due(&self, last_report_nanos: Option<u64>, now_nanos: u64) -> bool {
        match last_report_nanos {
            None => true,
            Some(last) => match now_nanos.checked_sub(last) {
                Some(elapsed) => elapsed >= self.interval_nanos,
                None => true,
            },
        }
    }

    /// Partition, project and count the frame's detections
    ///
    /// Position lists keep the detection order of the input.
    pub fn aggregate(&self, detections: &[Detection], timestamp_nanos: u64) -> FrameAggregate {
        let mut person_positions = Vec::new();
        let mut vehicle_positions = Vec::new();

        for detection in detections.iter().filter(|d| self.is_reportable(d)) {
            let position = self.projector.project(&detection.bbox);
            if detection.class.is_person() {
                person_positions.push(position);
            } else {
                vehicle_positions.push(position);
            }
        }

        FrameAggregate::from_positions(person_positions, vehicle_positions, timestamp_nanos)
    }
}
