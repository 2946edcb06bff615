//! Configuration for detection telemetry
//!
//! Configuration can be loaded from a TOML file and/or environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Identifier reported as `deviceId` in every message
    #[serde(default)]
    pub device_id: String,

    /// Collector endpoint configuration
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Reporting cadence and significance settings
    #[serde(default)]
    pub reporting: ReportingConfig,

    /// Source frame geometry
    #[serde(default)]
    pub frame: FrameConfig,

    /// Inference class id mapping
    #[serde(default)]
    pub classes: ClassConfig,
}

/// Collector endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// WebSocket URL of the collector (ws:// or wss://)
    #[serde(default = "default_collector_url")]
    pub url: String,

    /// Fixed delay between reconnect attempts in milliseconds
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_ms: u64,

    /// Connection attempt timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_collector_url() -> String {
    "ws://127.0.0.1:3001/edge".to_string()
}

fn default_reconnect_backoff() -> u64 {
    5000
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            url: default_collector_url(),
            reconnect_backoff_ms: default_reconnect_backoff(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

/// Reporting cadence and significance settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Minimum time between evaluated aggregates in milliseconds
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Position delta (grid units) above which a move is significant
    #[serde(default = "default_change_threshold")]
    pub change_threshold: f64,

    /// Optional cap on pending messages; oldest are dropped beyond it
    #[serde(default)]
    pub max_pending: Option<usize>,

    /// Emit a progress log line every N frames (0 disables)
    #[serde(default = "default_progress_log_every")]
    pub progress_log_every: u64,
}

fn default_interval() -> u64 {
    1000
}

fn default_change_threshold() -> f64 {
    20.0
}

fn default_progress_log_every() -> u64 {
    120
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            change_threshold: default_change_threshold(),
            max_pending: None,
            progress_log_every: default_progress_log_every(),
        }
    }
}

/// Source frame geometry used for grid normalization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Coarse grid extent; positions fall in `[0, grid_size]`
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_grid_size() -> u32 {
    300
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            grid_size: default_grid_size(),
        }
    }
}

/// Raw inference class ids for each reported object class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassConfig {
    #[serde(default = "default_person_ids")]
    pub person: Vec<u32>,

    #[serde(default = "default_vehicle_ids")]
    pub vehicle: Vec<u32>,

    #[serde(default = "default_bicycle_ids")]
    pub bicycle: Vec<u32>,

    #[serde(default = "default_road_sign_ids")]
    pub road_sign: Vec<u32>,

    /// Detections below this confidence are ignored
    #[serde(default)]
    pub min_confidence: f32,
}

fn default_person_ids() -> Vec<u32> {
    vec![2]
}

fn default_vehicle_ids() -> Vec<u32> {
    vec![0]
}

fn default_bicycle_ids() -> Vec<u32> {
    vec![1]
}

fn default_road_sign_ids() -> Vec<u32> {
    vec![3]
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            person: default_person_ids(),
            vehicle: default_vehicle_ids(),
            bicycle: default_bicycle_ids(),
            road_sign: default_road_sign_ids(),
            min_confidence: 0.0,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            collector: CollectorConfig::default(),
            reporting: ReportingConfig::default(),
            frame: FrameConfig::default(),
            classes: ClassConfig::default(),
        }
    }
}

impl TelemetryConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: TelemetryConfig =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = TelemetryConfig::default();
        config.apply_env();
        config
    }

    /// Overlay `EDGECOUNT_*` environment variables onto this configuration
    pub fn apply_env(&mut self) {
        if let Ok(id) = std::env::var("EDGECOUNT_DEVICE_ID") {
            self.device_id = id;
        }
        if let Ok(url) = std::env::var("EDGECOUNT_COLLECTOR_URL") {
            self.collector.url = url;
        }
        if let Ok(backoff) = std::env::var("EDGECOUNT_RECONNECT_BACKOFF_MS") {
            if let Ok(b) = backoff.parse() {
                self.collector.reconnect_backoff_ms = b;
            }
        }

        // Reporting
        if let Ok(interval) = std::env::var("EDGECOUNT_REPORT_INTERVAL_MS") {
            if let Ok(i) = interval.parse() {
                self.reporting.interval_ms = i;
            }
        }
        if let Ok(threshold) = std::env::var("EDGECOUNT_CHANGE_THRESHOLD") {
            if let Ok(t) = threshold.parse() {
                self.reporting.change_threshold = t;
            }
        }
        if let Ok(max) = std::env::var("EDGECOUNT_MAX_PENDING") {
            if let Ok(m) = max.parse() {
                self.reporting.max_pending = Some(m);
            }
        }

        // Frame geometry
        if let Ok(width) = std::env::var("EDGECOUNT_FRAME_WIDTH") {
            if let Ok(w) = width.parse() {
                self.frame.width = w;
            }
        }
        if let Ok(height) = std::env::var("EDGECOUNT_FRAME_HEIGHT") {
            if let Ok(h) = height.parse() {
                self.frame.height = h;
            }
        }
        if let Ok(grid) = std::env::var("EDGECOUNT_GRID_SIZE") {
            if let Ok(g) = grid.parse() {
                self.frame.grid_size = g;
            }
        }
    }

    /// Load from file if it exists, overlay the environment, then validate
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) if p.as_ref().exists() => Self::from_file(p)?,
            _ => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the reporter cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::invalid("device_id", "must not be empty"));
        }

        let url = url::Url::parse(&self.collector.url)
            .map_err(|e| ConfigError::invalid("collector.url", e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::invalid(
                "collector.url",
                format!("scheme must be ws or wss, got {}", url.scheme()),
            ));
        }

        if self.frame.width == 0 || self.frame.height == 0 {
            return Err(ConfigError::invalid(
                "frame",
                "width and height must be greater than 0",
            ));
        }
        if self.frame.grid_size == 0 {
            return Err(ConfigError::invalid("frame.grid_size", "must be greater than 0"));
        }

        if !self.reporting.change_threshold.is_finite() || self.reporting.change_threshold < 0.0 {
            return Err(ConfigError::invalid(
                "reporting.change_threshold",
                format!("must be a non-negative number, got {}", self.reporting.change_threshold),
            ));
        }
        if self.reporting.max_pending == Some(0) {
            return Err(ConfigError::invalid(
                "reporting.max_pending",
                "must be at least 1 when set",
            ));
        }

        if !(0.0..=1.0).contains(&self.classes.min_confidence) {
            return Err(ConfigError::invalid(
                "classes.min_confidence",
                "must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }

    /// Reporting interval as a duration
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.reporting.interval_ms)
    }

    /// Reconnect backoff as a duration
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.collector.reconnect_backoff_ms)
    }

    /// Connect timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.collector.connect_timeout_seconds)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
