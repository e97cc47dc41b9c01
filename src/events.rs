//! Event and notification bus
//!
//! Two delivery mechanisms share one emission point:
//! - Callback listeners, invoked synchronously on the emitting worker. The
//!   listener list is snapshotted before each dispatch, so registration during
//!   active downloads is safe, and a panicking listener is caught and logged.
//! - A broadcast channel for async consumers (`subscribe()`).
//!
//! Within each mechanism, events for one task arrive in the order its worker
//! produced them. No ordering is promised between the progress and status
//! listener lists.

use crate::types::{Event, EventKind, Task, TaskId};
use chrono::Utc;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Capacity of the broadcast channel before slow subscribers start lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Callback invoked on every telemetry tick with the task snapshot
pub type ProgressListener = Arc<dyn Fn(TaskId, &Task) + Send + Sync>;

/// Callback invoked on every status change with its message
pub type StatusListener = Arc<dyn Fn(TaskId, EventKind, &str) + Send + Sync>;

/// Fan-out of progress and status events
#[derive(Clone)]
pub struct EventBus {
    progress_listeners: Arc<RwLock<Vec<ProgressListener>>>,
    status_listeners: Arc<RwLock<Vec<StatusListener>>>,
    event_tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with no listeners
    pub fn new() -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            progress_listeners: Arc::new(RwLock::new(Vec::new())),
            status_listeners: Arc::new(RwLock::new(Vec::new())),
            event_tx,
        }
    }

    /// Register a progress callback
    pub fn add_progress_listener<F>(&self, listener: F)
    where
        F: Fn(TaskId, &Task) + Send + Sync + 'static,
    {
        let mut listeners = self
            .progress_listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.push(Arc::new(listener));
    }

    /// Register a status callback
    pub fn add_status_listener<F>(&self, listener: F)
    where
        F: Fn(TaskId, EventKind, &str) + Send + Sync + 'static,
    {
        let mut listeners = self
            .status_listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.push(Arc::new(listener));
    }

    /// Subscribe to every event through a broadcast channel
    ///
    /// A subscriber that falls more than 1000 events behind receives
    /// `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Emit a progress tick for `task`
    pub fn progress(&self, task: &Task) {
        let listeners: Vec<ProgressListener> = self
            .progress_listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(task.id, task))).is_err() {
                tracing::warn!(task_id = %task.id, "progress listener panicked");
            }
        }

        // send() fails only when nobody is subscribed
        self.event_tx
            .send(Event {
                task_id: task.id,
                kind: EventKind::Progress,
                timestamp: Utc::now(),
                message: String::new(),
                task: Some(task.clone()),
            })
            .ok();
    }

    /// Emit a status change
    pub fn status(&self, task_id: TaskId, kind: EventKind, message: impl Into<String>) {
        let message = message.into();
        let listeners: Vec<StatusListener> = self
            .status_listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(task_id, kind, &message))).is_err() {
                tracing::warn!(task_id = %task_id, %kind, "status listener panicked");
            }
        }

        self.event_tx
            .send(Event {
                task_id,
                kind,
                timestamp: Utc::now(),
                message,
                task: None,
            })
            .ok();
    }
}
