//! Canary-level status aggregation and the status-event stream.
//!
//! One run's per-check outcomes fold into a single `StatusEvent`:
//! overall pass/fail, summarized messages and errors, the highest
//! observed latency, aggregate uptime, and per-check transition flags.
//! Events are delivered through a bounded queue that drops the oldest
//! entry when the consumer stalls, so a stalled consumer never grows
//! memory without bound.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use kestrel_core::types::{Latency, Uptime};

/// Default capacity of the status-event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Per-check summary carried in a status event.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckStatusSummary {
    pub uptime: Uptime,
    pub latency: Latency,
    /// True on the first observed status and whenever pass/fail differs
    /// from the immediately preceding recorded status.
    pub transitioned: bool,
}

/// Canary-level aggregation of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub canary_id: Uuid,
    pub canary_name: String,
    pub namespace: String,
    pub pass: bool,
    /// First message, "(N more)" appended when several.
    pub message: String,
    /// First error, "(N more)" appended when several.
    pub error_message: String,
    pub uptime: Uptime,
    /// Highest p95 latency across the run's checks.
    pub latency: Latency,
    pub check_statuses: HashMap<Uuid, CheckStatusSummary>,
    /// True when any check transitioned this run.
    pub transitioned: bool,
    pub time: DateTime<Utc>,
}

/// Summarize a list of messages as "first, (N more)".
pub fn summarize(messages: &[String]) -> String {
    match messages.len() {
        0 => String::new(),
        1 => messages[0].clone(),
        n => format!("{}, ({} more)", messages[0], n - 1),
    }
}

/// Bounded drop-oldest queue for status events.
pub struct StatusEventQueue {
    events: Mutex<VecDeque<StatusEvent>>,
    capacity: usize,
}

impl StatusEventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue an event, dropping the oldest entry when full.
    pub fn push(&self, event: StatusEvent) {
        let mut events = self.events.lock().expect("status queue lock poisoned");
        if events.len() == self.capacity {
            events.pop_front();
            debug!("status event queue full, oldest event dropped");
        }
        events.push_back(event);
    }

    /// Dequeue the oldest event, if any.
    pub fn pop(&self) -> Option<StatusEvent> {
        self.events
            .lock()
            .expect("status queue lock poisoned")
            .pop_front()
    }

    /// Drain every queued event.
    pub fn drain(&self) -> Vec<StatusEvent> {
        self.events
            .lock()
            .expect("status queue lock poisoned")
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("status queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StatusEventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
