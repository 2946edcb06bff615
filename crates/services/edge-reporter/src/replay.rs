//! JSON-lines detection replay
//!
//! Each line is one frame:
//!
//! ```text
//! {"timestamp_ns": 1700000000000000000,
//!  "detections": [{"class_id": 2, "left": 100, "top": 80, "width": 40, "height": 90}]}
//! ```
//!
//! `timestamp_ns` and `confidence` are optional. Malformed lines are
//! logged and skipped so one bad record cannot end a session.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;

use edgecount_telemetry::{unix_nanos, BoundingBox, ClassMap, Detection, FrameOutcome, FrameReporter};

/// Replay errors
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to read input line {line}: {source}")]
    Io {
        line: u64,
        #[source]
        source: std::io::Error,
    },
}

/// One raw detection as written by the pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionRecord {
    pub class_id: u32,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

/// One frame of raw detections
#[derive(Debug, Clone, Deserialize)]
pub struct FrameRecord {
    #[serde(default)]
    pub timestamp_ns: Option<u64>,
    #[serde(default)]
    pub detections: Vec<DetectionRecord>,
}

impl FrameRecord {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Parse one raw input line; invalid UTF-8 is a parse error
    pub fn parse_bytes(line: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(line)
    }

    /// Resolve raw class ids into reporter detections
    pub fn to_detections(&self, classes: &ClassMap) -> Vec<Detection> {
        self.detections
            .iter()
            .map(|d| {
                classes.detection(
                    d.class_id,
                    BoundingBox::new(d.left, d.top, d.width, d.height),
                    d.confidence,
                )
            })
            .collect()
    }
}

/// Reads frame records line by line
pub struct FrameSource<R> {
    reader: R,
    buf: Vec<u8>,
    line: u64,
    skipped: u64,
}

impl<R: BufRead> FrameSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line: 0,
            skipped: 0,
        }
    }

    /// Next well-formed record, or `None` at end of input
    ///
    /// Lines are parsed as raw bytes, so invalid UTF-8 is skipped like any
    /// other malformed record. Only a failing reader is an error.
    pub fn next_record(&mut self) -> Result<Option<FrameRecord>, ReplayError> {
        loop {
            self.buf.clear();
            self.line += 1;
            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .map_err(|source| ReplayError::Io {
                    line: self.line,
                    source,
                })?;
            if read == 0 {
                self.line -= 1;
                return Ok(None);
            }

            let line = self.buf.trim_ascii();
            if line.is_empty() {
                continue;
            }
            match FrameRecord::parse_bytes(line) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!(line = self.line, error = %e, "Skipping malformed frame record");
                }
            }
        }
    }

    /// Lines consumed so far, including skipped ones
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Malformed lines skipped so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

/// Replay pacing
#[derive(Debug, Clone, Default)]
pub struct ReplaySettings {
    /// Sleep between frames; zero replays as fast as possible
    pub pace: Duration,
}

impl ReplaySettings {
    /// Read `EDGECOUNT_REPLAY_PACE_MS`
    pub fn from_env() -> Self {
        let pace_ms = std::env::var("EDGECOUNT_REPLAY_PACE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        Self {
            pace: Duration::from_millis(pace_ms),
        }
    }
}

/// Per-run frame counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub frames: u64,
    pub skipped: u64,
    pub enqueued: u64,
    pub suppressed: u64,
    pub rate_limited: u64,
}

/// Feed every record to the reporter until end of input or `stop` is set
///
/// Blocking; run it on a dedicated thread.
pub fn replay<R: BufRead>(
    source: &mut FrameSource<R>,
    reporter: &mut FrameReporter,
    classes: &ClassMap,
    settings: &ReplaySettings,
    stop: &AtomicBool,
) -> Result<ReplaySummary, ReplayError> {
    let mut summary = ReplaySummary::default();

    while !stop.load(Ordering::Relaxed) {
        let Some(record) = source.next_record()? else {
            break;
        };

        let detections = record.to_detections(classes);
        let now = record.timestamp_ns.unwrap_or_else(unix_nanos);
        summary.frames += 1;
        match reporter.on_frame(&detections, now) {
            FrameOutcome::Enqueued => summary.enqueued += 1,
            FrameOutcome::Suppressed => summary.suppressed += 1,
            FrameOutcome::RateLimited => summary.rate_limited += 1,
        }

        if !settings.pace.is_zero() {
            std::thread::sleep(settings.pace);
        }
    }

    summary.skipped = source.skipped();
    Ok(summary)
}
