//! Task lifecycle control: pause, resume, cancel, remove.

use crate::error::{DownloadError, Error, Result};
use crate::types::{EventKind, Status, TaskId};
use std::path::Path;

use super::RomDownloader;

fn not_found(id: TaskId) -> Error {
    Error::NotFound(format!("task {} not found", id))
}

fn invalid_state(id: TaskId, operation: &str, status: Status) -> Error {
    Error::Download(DownloadError::InvalidState {
        id: id.get(),
        operation: operation.to_string(),
        current_state: format!("{:?}", status),
    })
}

/// Delete a task's output file; a missing file is not an error
async fn remove_output_file(id: TaskId, path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(task_id = %id, ?path, "removed output file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(task_id = %id, ?path, error = %e, "failed to remove output file"),
    }
}

impl RomDownloader {
    /// Pause a downloading task
    ///
    /// The worker stops before its next write, keeping the partial file and
    /// byte counters for a later `resume()`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `InvalidState` unless the task is downloading.
    pub async fn pause(&self, id: TaskId) -> Result<()> {
        {
            let mut registry = self.queue_state.registry.lock().await;
            let task = registry.tasks.get_mut(&id).ok_or_else(|| not_found(id))?;
            if task.status != Status::Downloading {
                return Err(invalid_state(id, "pause", task.status));
            }
            task.status = Status::Paused;
            task.speed_bps = 0.0;

            if let Some(active) = registry.active.get(&id) {
                active.cancel_token.cancel();
            }
        }

        tracing::info!(task_id = %id, "task paused");
        self.events
            .status(id, EventKind::Paused, "Download paused");
        Ok(())
    }

    /// Put a paused task back in the queue and start it if a slot is free
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `InvalidState` unless the task is paused.
    pub async fn resume(&self, id: TaskId) -> Result<()> {
        let mut registry = self.queue_state.registry.lock().await;
        let task = registry.tasks.get_mut(&id).ok_or_else(|| not_found(id))?;
        if task.status != Status::Paused {
            return Err(invalid_state(id, "resume", task.status));
        }
        task.status = Status::Pending;

        let started = self.start_locked(&mut registry, id);
        tracing::info!(task_id = %id, started, "task resumed");
        Ok(())
    }

    /// Cancel a pending, downloading or paused task
    ///
    /// Stops the worker if one is running and waits for it, deletes the
    /// partial file, and removes the task: `get(id)` returns None afterwards.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `InvalidState` for completed or failed tasks.
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        let handle = {
            let mut registry = self.queue_state.registry.lock().await;
            let task = registry.tasks.get_mut(&id).ok_or_else(|| not_found(id))?;
            if task.status.is_terminal() {
                return Err(invalid_state(id, "cancel", task.status));
            }
            task.status = Status::Cancelled;

            registry.active.get_mut(&id).and_then(|active| {
                active.cancel_token.cancel();
                active.handle.take()
            })
        };

        // Cancellation is cooperative: wait until the worker has closed the file
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(task_id = %id, error = %e, "transfer worker ended abnormally");
        }

        let removed = self.queue_state.registry.lock().await.tasks.remove(&id);
        if let Some(task) = removed {
            remove_output_file(id, &task.output_path()).await;
        }

        tracing::info!(task_id = %id, "task cancelled");
        self.events
            .status(id, EventKind::Cancelled, "Download cancelled");
        Ok(())
    }

    /// Remove a task from the registry
    ///
    /// A task that is still pending, downloading or paused is cancelled. For
    /// any other task the output file is deleted first unless the transfer
    /// completed, so no half-written file is left without a tracking entry.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn remove_task(&self, id: TaskId) -> Result<()> {
        let mut registry = self.queue_state.registry.lock().await;
        let task = registry.tasks.get(&id).ok_or_else(|| not_found(id))?;
        let status = task.status;

        if !status.is_terminal() {
            drop(registry);
            return self.cancel(id).await;
        }

        if status != Status::Completed {
            remove_output_file(id, &task.output_path()).await;
        }
        registry.tasks.remove(&id);

        tracing::info!(task_id = %id, ?status, "task removed");
        Ok(())
    }
}
