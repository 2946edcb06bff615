//! Collector wire message
//!
//! One JSON text frame per message:
//!
//! ```json
//! {
//!   "deviceId": "cam-01",
//!   "detections": {
//!     "person":  [{"x": 12, "y": 140}],
//!     "vehicle": [{"x": 200, "y": 88}]
//!   },
//!   "people_count": 1,
//!   "vehicle_count": 1
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::aggregator::FrameAggregate;
use crate::error::TelemetryResult;
use crate::projector::GridPosition;

/// Per-class position lists
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassDetections {
    #[serde(default)]
    pub person: Vec<GridPosition>,
    #[serde(default)]
    pub vehicle: Vec<GridPosition>,
}

/// Telemetry payload for one emitted aggregate
///
/// Immutable once built. `timestamp_nanos` stays local: the collector
/// stamps arrival time itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    #[serde(rename = "deviceId")]
    device_id: String,
    detections: ClassDetections,
    people_count: usize,
    vehicle_count: usize,
    #[serde(skip)]
    timestamp_nanos: u64,
}

impl TelemetryMessage {
    pub fn from_aggregate(device_id: impl Into<String>, aggregate: &FrameAggregate) -> Self {
        Self {
            device_id: device_id.into(),
            detections: ClassDetections {
                person: aggregate.person_positions.clone(),
                vehicle: aggregate.vehicle_positions.clone(),
            },
            people_count: aggregate.person_count,
            vehicle_count: aggregate.vehicle_count,
            timestamp_nanos: aggregate.timestamp_nanos,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn detections(&self) -> &ClassDetections {
        &self.detections
    }

    pub fn people_count(&self) -> usize {
        self.people_count
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicle_count
    }

    pub fn timestamp_nanos(&self) -> u64 {
        self.timestamp_nanos
    }

    /// Encode to the JSON text sent on the wire
    pub fn to_json(&self) -> TelemetryResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
