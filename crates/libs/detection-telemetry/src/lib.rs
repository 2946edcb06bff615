//! EdgeCount Detection Telemetry
//!
//! Summarizes per-frame object detections into coarse people/vehicle
//! reports and streams them to a remote collector over a long-lived
//! WebSocket, without ever blocking the frame callback that feeds it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        edgecount-telemetry                           │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  frame callback thread (sync, never blocks)                          │
//! │  ┌───────────────┐   ┌────────────────┐   ┌──────────────────────┐   │
//! │  │ FrameReporter │──▶│ FrameAggregator│──▶│ ChangeDetector       │   │
//! │  │ (rate gate)   │   │ (GridProjector)│   │ (ReportState owner)  │   │
//! │  └───────────────┘   └────────────────┘   └──────────┬───────────┘   │
//! │                                                      │ push          │
//! │                                                      ▼               │
//! │                                           ┌──────────────────────┐   │
//! │                                           │ DeliveryQueue (FIFO) │   │
//! │                                           └──────────┬───────────┘   │
//! │  sender task (tokio)                                 │ pop           │
//! │                                                      ▼               │
//! │                                           ┌──────────────────────┐   │
//! │                                           │ ResilientSender      │───┼─▶ collector
//! │                                           │ (reconnect/backoff)  │   │
//! │                                           └──────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod aggregator;
pub mod change;
pub mod config;
pub mod detection;
pub mod error;
pub mod message;
pub mod metrics;
pub mod projector;
pub mod queue;
pub mod reporter;
pub mod sender;
pub mod transport;

pub use aggregator::{FrameAggregate, FrameAggregator, FrameTally};
pub use change::{ChangeDetector, ReportState, Significance};
pub use config::{ConfigError, TelemetryConfig};
pub use detection::{BoundingBox, ClassMap, Detection, ObjectClass};
pub use error::{TelemetryError, TelemetryResult};
pub use message::{ClassDetections, TelemetryMessage};
pub use metrics::{MetricsSnapshot, TelemetryMetrics};
pub use projector::{GridPosition, GridProjector};
pub use queue::DeliveryQueue;
pub use reporter::{unix_nanos, FrameOutcome, FrameReporter, TelemetryService};
pub use sender::{ResilientSender, SenderConfig, SenderState};
pub use transport::{
    CollectorConnection, CollectorTransport, WebSocketConnection, WebSocketTransport,
};
