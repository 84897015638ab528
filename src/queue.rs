//! Thread-safe priority queue between the orchestrator and the delivery worker
//!
//! Items are ordered by priority (lower first), then by the time they were first
//! enqueued. A retried item keeps its original position, so envelopes produced
//! after it never overtake it.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::util::unix_now;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    High = 0,
    #[default]
    Normal = 1,
    Low = 2,
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Priority::High),
            1 => Ok(Priority::Normal),
            2 => Ok(Priority::Low),
            other => Err(format!("invalid priority {other} (expected 0, 1 or 2)")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// One serialized envelope waiting for delivery
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub priority: Priority,
    /// Unix seconds of the first enqueue, kept across retries
    pub enqueue_time: f64,
    sequence: u64,
    attempts: u32,
    body: Vec<u8>,
}

impl QueueItem {
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Failed delivery attempts so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn record_failure(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.enqueue_time.total_cmp(&other.enqueue_time))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

#[derive(Debug, Default)]
pub struct PriorityQueue {
    heap: Mutex<BinaryHeap<Reverse<QueueItem>>>,
    sequence: AtomicU64,
    signal: Notify,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn heap(&self) -> MutexGuard<'_, BinaryHeap<Reverse<QueueItem>>> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a new body stamped with the current time. Returns the new length.
    pub fn push(&self, priority: Priority, body: Vec<u8>) -> usize {
        let item = QueueItem {
            priority,
            enqueue_time: unix_now(),
            sequence: self.sequence.fetch_add(1, AtomicOrdering::Relaxed),
            attempts: 0,
            body,
        };
        self.requeue(item)
    }

    /// Put an item back unchanged. Returns the new length.
    pub fn requeue(&self, item: QueueItem) -> usize {
        let len = {
            let mut heap = self.heap();
            heap.push(Reverse(item));
            heap.len()
        };
        self.signal.notify_one();
        len
    }

    pub fn pop(&self) -> Option<QueueItem> {
        self.heap().pop().map(|Reverse(item)| item)
    }

    pub fn len(&self) -> usize {
        self.heap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap().is_empty()
    }

    /// Resolves once something has been pushed since the last wake-up
    pub async fn notified(&self) {
        self.signal.notified().await
    }
}
