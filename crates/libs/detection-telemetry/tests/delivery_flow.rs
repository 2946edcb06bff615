//! Delivery Flow Tests
//!
//! Drive the resilient sender against scripted transports that refuse
//! connections and break mid-stream, and check what reaches the collector.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use edgecount_telemetry::{
    CollectorConnection, CollectorTransport, DeliveryQueue, FrameAggregate, GridPosition,
    ResilientSender, SenderConfig, SenderState, TelemetryError, TelemetryMessage,
    TelemetryMetrics, TelemetryResult,
};

/// What the next connect attempt does
#[derive(Clone, Copy)]
enum Step {
    Refuse,
    /// Accept, then fail the write after this many successful sends
    AcceptFailingAfter(usize),
}

#[derive(Clone, Default)]
struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Step>>>,
    delivered: Arc<Mutex<Vec<String>>>,
    attempts: Arc<Mutex<u32>>,
}

impl ScriptedTransport {
    fn new(steps: &[Step]) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.iter().copied().collect())),
            ..Default::default()
        }
    }

    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().clone()
    }
}

struct ScriptedConnection {
    delivered: Arc<Mutex<Vec<String>>>,
    remaining: Option<usize>,
}

#[async_trait]
impl CollectorConnection for ScriptedConnection {
    async fn send_text(&mut self, payload: String) -> TelemetryResult<()> {
        match self.remaining {
            Some(0) => Err(TelemetryError::Send("broken pipe".into())),
            Some(ref mut n) => {
                *n -= 1;
                self.delivered.lock().push(payload);
                Ok(())
            }
            None => {
                self.delivered.lock().push(payload);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CollectorTransport for ScriptedTransport {
    type Connection = ScriptedConnection;

    fn endpoint(&self) -> &str {
        "test://scripted"
    }

    async fn connect(&self) -> TelemetryResult<ScriptedConnection> {
        *self.attempts.lock() += 1;
        let step = self.script.lock().pop_front();
        match step {
            Some(Step::Refuse) => Err(TelemetryError::Connect("connection refused".into())),
            Some(Step::AcceptFailingAfter(n)) => Ok(ScriptedConnection {
                delivered: self.delivered.clone(),
                remaining: Some(n),
            }),
            None => Ok(ScriptedConnection {
                delivered: self.delivered.clone(),
                remaining: None,
            }),
        }
    }
}

fn report(id: u32) -> TelemetryMessage {
    let aggregate =
        FrameAggregate::from_positions(vec![GridPosition::new(id, 0)], Vec::new(), id as u64);
    TelemetryMessage::from_aggregate("cam-07", &aggregate)
}

fn wire(id: u32) -> String {
    report(id).to_json().unwrap()
}

struct Harness {
    transport: ScriptedTransport,
    queue: DeliveryQueue,
    metrics: Arc<TelemetryMetrics>,
    shutdown_tx: broadcast::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
    state: tokio::sync::watch::Receiver<SenderState>,
}

fn start(transport: ScriptedTransport, queue: DeliveryQueue) -> Harness {
    start_with_backoff(transport, queue, Duration::from_millis(10))
}

fn start_with_backoff(
    transport: ScriptedTransport,
    queue: DeliveryQueue,
    reconnect_backoff: Duration,
) -> Harness {
    let metrics = Arc::new(TelemetryMetrics::new());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sender = ResilientSender::new(
        transport.clone(),
        queue.clone(),
        SenderConfig { reconnect_backoff },
        metrics.clone(),
        shutdown_rx,
    );
    let state = sender.subscribe_state();
    let handle = sender.spawn();
    Harness {
        transport,
        queue,
        metrics,
        shutdown_tx,
        handle,
        state,
    }
}

async fn wait_for_delivered(transport: &ScriptedTransport, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.delivered.lock().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for deliveries");
}

impl Harness {
    async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        tokio::time::timeout(Duration::from_secs(1), self.handle)
            .await
            .expect("sender did not stop")
            .unwrap();
    }
}

/// Refused connections delay delivery but lose nothing
#[tokio::test]
async fn test_refused_connects_preserve_queue() {
    let queue = DeliveryQueue::unbounded();
    for id in 1..=3 {
        queue.push(report(id));
    }

    let transport = ScriptedTransport::new(&[Step::Refuse, Step::Refuse, Step::Refuse]);
    let harness = start(transport, queue);

    wait_for_delivered(&harness.transport, 3).await;
    assert_eq!(harness.transport.delivered(), vec![wire(1), wire(2), wire(3)]);
    assert_eq!(*harness.transport.attempts.lock(), 4);
    assert_eq!(harness.metrics.snapshot().connect_failures, 3);
    harness.stop().await;
}

/// A failed write drops only the in-flight report; the rest follow on the
/// next connection, oldest first, exactly once
#[tokio::test]
async fn test_send_failure_drops_only_in_flight_message() {
    let queue = DeliveryQueue::unbounded();
    for id in 1..=5 {
        queue.push(report(id));
    }

    let transport = ScriptedTransport::new(&[
        Step::AcceptFailingAfter(1),
        Step::Refuse,
        Step::Refuse,
        Step::AcceptFailingAfter(0),
    ]);
    let harness = start(transport, queue);

    wait_for_delivered(&harness.transport, 3).await;
    // 1 sent, 2 lost mid-write, refused twice, 3 lost mid-write, then 4 and 5
    assert_eq!(harness.transport.delivered(), vec![wire(1), wire(4), wire(5)]);

    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.messages_sent, 3);
    assert_eq!(snapshot.send_failures, 2);
    assert_eq!(snapshot.connect_failures, 2);
    assert_eq!(snapshot.connections, 3);
    assert!(harness.queue.is_empty());
    harness.stop().await;
}

/// A collector that accepts and then fails every write costs one report
/// per backoff period, not the whole backlog
#[tokio::test]
async fn test_write_failure_waits_for_backoff() {
    let queue = DeliveryQueue::unbounded();
    for id in 1..=100 {
        queue.push(report(id));
    }

    let transport = ScriptedTransport::new(&[Step::AcceptFailingAfter(0); 200]);
    let harness = start_with_backoff(transport, queue, Duration::from_secs(5));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*harness.transport.attempts.lock(), 1);
    assert_eq!(harness.queue.len(), 99);
    assert!(harness.transport.delivered().is_empty());

    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.send_failures, 1);
    assert_eq!(snapshot.connections, 1);
    assert_eq!(*harness.state.borrow(), SenderState::Disconnected);

    // Shutdown interrupts the backoff sleep
    harness.stop().await;
}

/// After the backoff the sender reconnects and the backlog follows in order
#[tokio::test]
async fn test_reconnect_after_write_failure_backoff() {
    let queue = DeliveryQueue::unbounded();
    for id in 1..=3 {
        queue.push(report(id));
    }

    let transport = ScriptedTransport::new(&[Step::AcceptFailingAfter(0)]);
    let harness = start_with_backoff(transport, queue, Duration::from_millis(300));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*harness.transport.attempts.lock(), 1);
    assert_eq!(harness.queue.len(), 2);

    wait_for_delivered(&harness.transport, 2).await;
    assert_eq!(harness.transport.delivered(), vec![wire(2), wire(3)]);
    assert_eq!(*harness.transport.attempts.lock(), 2);
    harness.stop().await;
}

/// Reports pushed while disconnected are delivered after reconnect in order
#[tokio::test]
async fn test_reports_queued_during_outage() {
    let transport = ScriptedTransport::new(&[Step::AcceptFailingAfter(1)]);
    let harness = start(transport, DeliveryQueue::unbounded());

    harness.queue.push(report(1));
    wait_for_delivered(&harness.transport, 1).await;

    // Connection breaks on the next write
    harness.queue.push(report(2));
    for id in 3..=6 {
        harness.queue.push(report(id));
    }

    wait_for_delivered(&harness.transport, 5).await;
    assert_eq!(
        harness.transport.delivered(),
        vec![wire(1), wire(3), wire(4), wire(5), wire(6)]
    );
    assert_eq!(*harness.state.borrow(), SenderState::Connected);
    harness.stop().await;
}

/// Shutdown while connected and idle returns promptly
#[tokio::test]
async fn test_shutdown_while_waiting_for_queue() {
    let transport = ScriptedTransport::new(&[]);
    let mut harness = start(transport, DeliveryQueue::unbounded());

    tokio::time::timeout(Duration::from_secs(1), async {
        while *harness.state.borrow_and_update() != SenderState::Connected {
            harness.state.changed().await.unwrap();
        }
    })
    .await
    .expect("sender never connected");

    let state = harness.state.clone();
    harness.stop().await;
    assert_eq!(*state.borrow(), SenderState::Stopped);
}

/// The capacity cap keeps the newest reports during a long outage
#[tokio::test]
async fn test_capacity_cap_during_outage() {
    let queue = DeliveryQueue::with_capacity(2);
    for id in 1..=4 {
        queue.push(report(id));
    }
    assert_eq!(queue.dropped(), 2);

    let harness = start(ScriptedTransport::new(&[Step::Refuse]), queue);
    wait_for_delivered(&harness.transport, 2).await;
    assert_eq!(harness.transport.delivered(), vec![wire(3), wire(4)]);
    harness.stop().await;
}
