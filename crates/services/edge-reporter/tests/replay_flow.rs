//! Replay Flow Tests
//!
//! Recorded JSON-lines sessions through the frame reporter, checked at
//! the delivery queue.

use std::io::{Cursor, Write};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use edgecount_reporter::{replay, FrameSource, ReplaySettings, ReplaySummary};
use edgecount_telemetry::{
    ClassMap, DeliveryQueue, FrameReporter, TelemetryConfig, TelemetryMetrics,
};

const SECOND: u64 = 1_000_000_000;

fn line(timestamp_ns: u64, detections: &[(u32, f32, f32)]) -> String {
    let detections: Vec<serde_json::Value> = detections
        .iter()
        .map(|(class_id, left, top)| {
            serde_json::json!({
                "class_id": class_id,
                "left": left,
                "top": top,
                "width": 40.0,
                "height": 80.0,
            })
        })
        .collect();
    serde_json::json!({ "timestamp_ns": timestamp_ns, "detections": detections }).to_string()
}

struct Session {
    reporter: FrameReporter,
    queue: DeliveryQueue,
    metrics: Arc<TelemetryMetrics>,
    config: TelemetryConfig,
}

fn session() -> Session {
    let config = TelemetryConfig {
        device_id: "dock-3".to_string(),
        ..Default::default()
    };
    let queue = DeliveryQueue::unbounded();
    let metrics = Arc::new(TelemetryMetrics::new());
    Session {
        reporter: FrameReporter::new(&config, queue.clone(), metrics.clone()),
        queue,
        metrics,
        config,
    }
}

fn run(session: &mut Session, input: &str) -> ReplaySummary {
    let mut source = FrameSource::new(Cursor::new(input.to_string()));
    let classes = ClassMap::from_config(&session.config.classes);
    replay(
        &mut source,
        &mut session.reporter,
        &classes,
        &ReplaySettings::default(),
        &AtomicBool::new(false),
    )
    .unwrap()
}

#[test]
fn test_recorded_session() {
    let mut session = session();

    // Class 2 is person, 0 is vehicle, 3 is road sign (not reported)
    let input = [
        line(10 * SECOND, &[(2, 100.0, 100.0), (3, 50.0, 50.0)]),
        line(10 * SECOND + SECOND / 3, &[(2, 100.0, 100.0), (0, 500.0, 300.0)]),
        line(11 * SECOND, &[(2, 101.0, 100.0), (0, 500.0, 300.0)]),
        "{ truncated".to_string(),
        line(12 * SECOND, &[(2, 101.0, 100.0), (0, 501.0, 300.0)]),
        line(13 * SECOND, &[(2, 900.0, 600.0), (0, 501.0, 300.0)]),
    ]
    .join("\n");

    let summary = run(&mut session, &input);
    assert_eq!(
        summary,
        ReplaySummary {
            frames: 5,
            skipped: 1,
            // bootstrap, vehicle appears, person walks across the frame
            enqueued: 3,
            suppressed: 1,
            rate_limited: 1,
        }
    );

    let counts: Vec<(usize, usize)> = std::iter::from_fn(|| session.queue.try_pop())
        .map(|m| (m.people_count(), m.vehicle_count()))
        .collect();
    assert_eq!(counts, vec![(1, 0), (1, 1), (1, 1)]);

    let snapshot = session.metrics.snapshot();
    assert_eq!(snapshot.frames_seen, 5);
    assert_eq!(snapshot.people_observed, 5);
    assert_eq!(snapshot.vehicles_observed, 4);
}

#[test]
fn test_low_confidence_detections_ignored() {
    let mut config = TelemetryConfig {
        device_id: "dock-3".to_string(),
        ..Default::default()
    };
    config.classes.min_confidence = 0.5;
    let queue = DeliveryQueue::unbounded();
    let metrics = Arc::new(TelemetryMetrics::new());
    let mut session = Session {
        reporter: FrameReporter::new(&config, queue.clone(), metrics.clone()),
        queue,
        metrics,
        config,
    };

    let input = r#"{"timestamp_ns": 1000000000, "detections": [
{"class_id": 2, "left": 10, "top": 10, "width": 5, "height": 5, "confidence": 0.2}]}"#
        .replace('\n', "");
    run(&mut session, &input);

    let message = session.queue.try_pop().unwrap();
    assert_eq!(message.people_count(), 0);
}

#[test]
fn test_stop_flag_halts_replay() {
    let mut session = session();
    let input = line(10 * SECOND, &[(2, 100.0, 100.0)]);
    let mut source = FrameSource::new(Cursor::new(input));

    let summary = replay(
        &mut source,
        &mut session.reporter,
        &ClassMap::default(),
        &ReplaySettings::default(),
        &AtomicBool::new(true),
    )
    .unwrap();

    assert_eq!(summary.frames, 0);
    assert!(session.queue.is_empty());
}

#[test]
fn test_replay_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for second in 0..4u64 {
        writeln!(file, "{}", line((10 + second) * SECOND, &[(2, 100.0, 100.0)])).unwrap();
    }

    let mut session = session();
    let reader = std::io::BufReader::new(std::fs::File::open(file.path()).unwrap());
    let summary = replay(
        &mut FrameSource::new(reader),
        &mut session.reporter,
        &ClassMap::default(),
        &ReplaySettings::default(),
        &AtomicBool::new(false),
    )
    .unwrap();

    assert_eq!(summary.frames, 4);
    assert_eq!(summary.enqueued, 1);
    assert_eq!(summary.suppressed, 3);
    assert_eq!(session.queue.len(), 1);
}

#[test]
fn test_invalid_utf8_line_does_not_end_session() {
    let mut session = session();
    let mut input = line(10 * SECOND, &[(2, 100.0, 100.0)]).into_bytes();
    input.extend_from_slice(b"\n\xff\xfe garbage\n");
    input.extend_from_slice(line(11 * SECOND, &[]).as_bytes());
    input.push(b'\n');

    let summary = replay(
        &mut FrameSource::new(Cursor::new(input)),
        &mut session.reporter,
        &ClassMap::default(),
        &ReplaySettings::default(),
        &AtomicBool::new(false),
    )
    .unwrap();

    assert_eq!(summary.frames, 2);
    assert_eq!(summary.skipped, 1);
    // Person leaves the scene on the record after the bad line
    assert_eq!(summary.enqueued, 2);
    assert_eq!(session.queue.len(), 2);
}
