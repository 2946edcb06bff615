//! EdgeCount Edge Reporter
//!
//! Runs the detection telemetry subsystem against a stream of recorded
//! per-frame detections (JSON lines from a file or stdin).
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       edge-reporter                        │
//! ├────────────────────────────────────────────────────────────┤
//! │                                                            │
//! │  input thread                   tokio runtime              │
//! │  ┌─────────────┐               ┌────────────────────────┐  │
//! │  │ FrameSource │               │ TelemetryService       │  │
//! │  │ (JSON lines)│               │  └─ ResilientSender ───┼──┼─▶ collector
//! │  └──────┬──────┘               └───────────▲────────────┘  │
//! │         │ on_frame                         │ DeliveryQueue │
//! │         ▼                                  │               │
//! │  ┌─────────────┐                           │               │
//! │  │FrameReporter│───────────────────────────┘               │
//! │  └─────────────┘                                           │
//! │                                                            │
//! │  shutdown: end of input, Ctrl+C or SIGTERM                 │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod replay;

pub use replay::{
    replay, DetectionRecord, FrameRecord, FrameSource, ReplayError, ReplaySettings, ReplaySummary,
};
