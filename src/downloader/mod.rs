//! Core downloader implementation split into focused submodules.
//!
//! The `RomDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Submission, admission control and auto-advance
//! - [`control`] - Task lifecycle control (pause/resume/cancel/remove)
//! - [`transfer`] - Resumable HTTP transfer worker with telemetry
//! - [`post_process`] - Hand-off from a completed transfer to post-processing
//! - [`lifecycle`] - Shutdown coordination

mod control;
mod lifecycle;
mod post_process;
mod queue;
mod transfer;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::decompression::{self, Decompressor, KeyStore};
use crate::error::Result;
use crate::events::EventBus;
use crate::post_processing::PostProcessor;
use crate::types::{DecompressionStatus, Event, EventKind, QueueStats, Status, Task, TaskId};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running transfer worker
pub(crate) struct ActiveTransfer {
    /// Cancelled by pause, cancel and shutdown
    pub(crate) cancel_token: CancellationToken,
    /// Taken by whoever waits for the worker to stop
    pub(crate) handle: Option<JoinHandle<()>>,
}

/// Task table plus the set of running workers, guarded by one lock
///
/// Admission decisions read and write both maps, so they live together.
#[derive(Default)]
pub(crate) struct Registry {
    /// All known tasks; id order is submission order
    pub(crate) tasks: BTreeMap<TaskId, Task>,
    /// Workers currently holding a transfer slot
    pub(crate) active: HashMap<TaskId, ActiveTransfer>,
}

/// Queue and download state management
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Task registry and active workers
    pub(crate) registry: Arc<tokio::sync::Mutex<Registry>>,
    /// Next task id to hand out
    pub(crate) next_id: Arc<AtomicU64>,
    /// Flag to indicate whether new tasks are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            registry: Arc::new(tokio::sync::Mutex::new(Registry::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            accepting_new: Arc::new(AtomicBool::new(true)),
        }
    }
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct RomDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// HTTP client shared by all transfers
    pub(crate) client: reqwest::Client,
    /// Progress and status fan-out
    pub(crate) events: EventBus,
    /// Queue and download state management
    pub(crate) queue_state: QueueState,
    /// Post-processing pipeline executor
    pub(crate) processing: Arc<PostProcessor>,
}

impl RomDownloader {
    /// Create a new RomDownloader instance
    ///
    /// The decompressor is picked from `config.tools`: an explicit `nsz_path`,
    /// then `nsz` on `PATH`, then a no-op fallback that reports every `.nsz`
    /// as a decompression failure.
    pub fn new(config: Config) -> Result<Self> {
        let decompressor = decompression::select_decompressor(&config.tools);
        Self::with_decompressor(config, decompressor)
    }

    /// Create a RomDownloader with a specific decompressor implementation
    pub fn with_decompressor(config: Config, decompressor: Arc<dyn Decompressor>) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.download.connect_timeout)
            .user_agent(config.download.user_agent.clone())
            .build()?;

        let events = EventBus::new();
        let key_store = Arc::new(KeyStore::new(
            config.tools.keys_dir.clone(),
            config.tools.keys_path.as_deref(),
        ));

        tracing::info!(
            decompressor = decompressor.name(),
            available = decompressor.is_available(),
            keys = ?key_store.keys_path(),
            max_concurrent = config.download.max_concurrent_downloads,
            "downloader initialized"
        );

        let processing = Arc::new(PostProcessor::new(
            events.clone(),
            config.processing.clone(),
            &config.tools,
            key_store,
            decompressor,
        ));

        Ok(Self {
            config: Arc::new(config),
            client,
            events,
            queue_state: QueueState::new(),
            processing,
        })
    }

    /// Subscribe to all events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// If a subscriber falls behind by more than 1000 events, it will receive a
    /// `RecvError::Lagged` error.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Register a callback invoked on every progress tick
    ///
    /// Callbacks run synchronously on the worker; a panicking callback is
    /// logged and does not affect the transfer or other callbacks.
    pub fn add_progress_listener<F>(&self, listener: F)
    where
        F: Fn(TaskId, &Task) + Send + Sync + 'static,
    {
        self.events.add_progress_listener(listener);
    }

    /// Register a callback invoked on every status change
    pub fn add_status_listener<F>(&self, listener: F)
    where
        F: Fn(TaskId, EventKind, &str) + Send + Sync + 'static,
    {
        self.events.add_status_listener(listener);
    }

    /// Snapshot of one task, or None if it does not exist (or was cancelled)
    pub async fn get(&self, id: TaskId) -> Option<Task> {
        self.queue_state.registry.lock().await.tasks.get(&id).cloned()
    }

    /// Snapshots of all tasks in submission order
    pub async fn get_all(&self) -> Vec<Task> {
        self.queue_state
            .registry
            .lock()
            .await
            .tasks
            .values()
            .cloned()
            .collect()
    }

    /// Count tasks by status
    pub async fn stats(&self) -> QueueStats {
        let registry = self.queue_state.registry.lock().await;
        let mut stats = QueueStats {
            total: registry.tasks.len(),
            ..Default::default()
        };
        for task in registry.tasks.values() {
            match task.status {
                Status::Pending => stats.pending += 1,
                Status::Downloading => stats.downloading += 1,
                Status::Completed => stats.completed += 1,
                Status::Failed => stats.failed += 1,
                Status::Paused => stats.paused += 1,
                Status::Cancelled => {}
            }
        }
        stats
    }

    /// Number of workers currently holding a transfer slot
    pub async fn active_count(&self) -> usize {
        self.queue_state.registry.lock().await.active.len()
    }

    /// Use the key file at `path` (a `.keys` file or a directory holding `prod.keys`)
    ///
    /// Returns the resolved key file. The file is validated and copied into the
    /// keys directory unless a copy is already there.
    pub fn set_keys_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        self.processing.key_store().set_keys_path(path.as_ref())
    }

    /// Report whether `.nsz` decompression can currently run
    pub fn decompression_status(&self) -> DecompressionStatus {
        self.processing.decompression_status()
    }
}
