//! Submission and admission control: create tasks, start them under the
//! concurrency limit, and advance the queue when a worker finishes.

use crate::catalog::{self, CatalogEntry, SystemInfo};
use crate::error::{DownloadError, Error, Result};
use crate::types::{DownloadRequest, EventKind, Status, Task, TaskId};
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

use super::{ActiveTransfer, Registry, RomDownloader};

impl RomDownloader {
    /// Create one pending task
    ///
    /// The destination directory is created first; if that fails the task is
    /// never registered.
    ///
    /// # Errors
    ///
    /// `InvalidFilename` if the filename is not a plain file name, `Io` if
    /// the destination directory cannot be created, `ShuttingDown` once
    /// `shutdown()` has been called.
    pub async fn submit(&self, request: DownloadRequest) -> Result<TaskId> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if !request.has_plain_filename() {
            return Err(DownloadError::InvalidFilename {
                filename: request.filename,
            }
            .into());
        }

        tokio::fs::create_dir_all(&request.dest_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "failed to create destination directory '{}': {}",
                        request.dest_dir.display(),
                        e
                    ),
                ))
            })?;

        let id = TaskId(self.queue_state.next_id.fetch_add(1, Ordering::SeqCst));
        let task = Task::new(id, request);
        let filename = task.filename.clone();

        tracing::info!(task_id = %id, url = %task.url, path = ?task.output_path(), "task added");
        self.queue_state.registry.lock().await.tasks.insert(id, task);

        self.events
            .status(id, EventKind::Added, format!("Added download: {}", filename));
        Ok(id)
    }

    /// Create one pending task per request, without starting any
    ///
    /// Stops at the first request that cannot be registered; tasks created
    /// before it stay registered.
    pub async fn submit_batch(
        &self,
        requests: impl IntoIterator<Item = DownloadRequest>,
    ) -> Result<Vec<TaskId>> {
        let mut ids = Vec::new();
        for request in requests {
            ids.push(self.submit(request).await?);
        }
        Ok(ids)
    }

    /// Resolve catalog entries for one system and submit them
    ///
    /// Files go to `base_dir/<system folder>`. Entries without a name or a
    /// resolvable URL are skipped.
    pub async fn submit_catalog(
        &self,
        entries: &[CatalogEntry],
        system: &SystemInfo,
        base_dir: &Path,
    ) -> Result<Vec<TaskId>> {
        let requests = catalog::resolve_entries(entries, system, base_dir);
        if requests.len() < entries.len() {
            tracing::warn!(
                skipped = entries.len() - requests.len(),
                "some catalog entries could not be resolved"
            );
        }
        self.submit_batch(requests).await
    }

    /// Start a pending task if a transfer slot is free
    ///
    /// Returns false, changing nothing, if the task does not exist, is not
    /// pending, or the concurrency limit is reached.
    pub async fn start(&self, id: TaskId) -> bool {
        let mut registry = self.queue_state.registry.lock().await;
        self.start_locked(&mut registry, id)
    }

    /// Start pending tasks in submission order until the limit is reached
    ///
    /// Returns the number of tasks started.
    pub async fn start_all(&self) -> usize {
        let mut registry = self.queue_state.registry.lock().await;
        let pending: Vec<TaskId> = registry
            .tasks
            .values()
            .filter(|t| t.status == Status::Pending)
            .map(|t| t.id)
            .collect();

        let mut started = 0;
        for id in pending {
            if registry.active.len() >= self.config.download.max_concurrent_downloads {
                break;
            }
            if self.start_locked(&mut registry, id) {
                started += 1;
            }
        }

        tracing::debug!(started, active = registry.active.len(), "start_all");
        started
    }

    /// Remove completed and failed tasks from the registry
    ///
    /// Files on disk are not touched. Returns the number of tasks removed.
    pub async fn clear_finished(&self) -> usize {
        let mut registry = self.queue_state.registry.lock().await;
        let Registry { tasks, active } = &mut *registry;
        let before = tasks.len();
        tasks.retain(|id, task| {
            !matches!(task.status, Status::Completed | Status::Failed) || active.contains_key(id)
        });
        let removed = before - tasks.len();
        tracing::info!(removed, "cleared finished tasks");
        removed
    }

    /// Admission decision and worker spawn; the caller holds the registry lock
    pub(crate) fn start_locked(&self, registry: &mut Registry, id: TaskId) -> bool {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            tracing::debug!(task_id = %id, "not starting task: shutting down");
            return false;
        }
        if registry.active.len() >= self.config.download.max_concurrent_downloads {
            tracing::debug!(task_id = %id, "not starting task: concurrency limit reached");
            return false;
        }
        // A worker that is still winding down after pause keeps its slot
        if registry.active.contains_key(&id) {
            return false;
        }
        let Some(task) = registry.tasks.get_mut(&id) else {
            return false;
        };
        if task.status != Status::Pending {
            return false;
        }

        task.status = Status::Downloading;
        task.started_at = Some(Utc::now());
        task.finished_at = None;
        task.error_message = None;
        task.speed_bps = 0.0;

        let cancel_token = CancellationToken::new();
        let downloader = self.clone();
        let worker_token = cancel_token.clone();
        let handle = tokio::spawn(async move {
            super::transfer::run_transfer_task(downloader, id, worker_token).await;
        });

        registry.active.insert(
            id,
            ActiveTransfer {
                cancel_token,
                handle: Some(handle),
            },
        );
        tracing::info!(task_id = %id, active = registry.active.len(), "task started");
        true
    }

    /// Release the worker's slot and start exactly one more pending task
    pub(crate) async fn on_worker_finished(&self, id: TaskId) {
        let mut registry = self.queue_state.registry.lock().await;
        registry.active.remove(&id);

        let next = registry
            .tasks
            .values()
            .find(|t| t.status == Status::Pending && !registry.active.contains_key(&t.id))
            .map(|t| t.id);

        if let Some(next_id) = next {
            self.start_locked(&mut registry, next_id);
        }
    }
}
