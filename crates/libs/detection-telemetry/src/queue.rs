//! Delivery queue between the frame callback and the sender task
//!
//! FIFO, unbounded by default. `push` is synchronous and only holds the
//! internal lock for a `VecDeque` operation, so the frame callback never
//! waits on the sender. `pop` is async and suspends the sender until an
//! item arrives. An optional capacity applies a drop-oldest policy.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::message::TelemetryMessage;

struct QueueInner {
    items: Mutex<VecDeque<TelemetryMessage>>,
    notify: Notify,
    capacity: Option<usize>,
    dropped: AtomicU64,
}

/// Cloneable handle to a single-producer / single-consumer message queue
#[derive(Clone)]
pub struct DeliveryQueue {
    inner: Arc<QueueInner>,
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl DeliveryQueue {
    /// Queue that grows without limit
    pub fn unbounded() -> Self {
        Self::build(None)
    }

    /// Queue that evicts the oldest pending message beyond `capacity`
    pub fn with_capacity(capacity: usize) -> Self {
        Self::build(Some(capacity.max(1)))
    }

    /// Unbounded unless a capacity is given
    pub fn new(capacity: Option<usize>) -> Self {
        match capacity {
            Some(c) => Self::with_capacity(c),
            None => Self::unbounded(),
        }
    }

    fn build(capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                items: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                capacity,
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Append a message; returns how many old messages were evicted
    pub fn push(&self, message: TelemetryMessage) -> usize {
        let mut evicted = 0usize;
        {
            let mut items = self.inner.items.lock();
            if let Some(capacity) = self.inner.capacity {
                while items.len() >= capacity {
                    if items.pop_front().is_some() {
                        evicted += 1;
                    }
                }
            }
            items.push_back(message);
        }

        if evicted > 0 {
            self.inner
                .dropped
                .fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::warn!(
                dropped = evicted,
                capacity = ?self.inner.capacity,
                "Delivery queue full, dropped oldest messages"
            );
        }

        self.inner.notify.notify_one();
        evicted
    }

    /// Wait for and remove the oldest message
    ///
    /// Cancel safe: a message is only removed when the future completes.
    pub async fn pop(&self) -> TelemetryMessage {
        loop {
            if let Some(message) = self.try_pop() {
                return message;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Remove the oldest message if one is pending
    pub fn try_pop(&self) -> Option<TelemetryMessage> {
        self.inner.items.lock().pop_front()
    }

    /// Discard every pending message; returns how many were discarded
    pub fn clear(&self) -> usize {
        let mut items = self.inner.items.lock();
        let count = items.len();
        items.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.lock().is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity
    }

    /// Total messages evicted by the capacity cap
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}
