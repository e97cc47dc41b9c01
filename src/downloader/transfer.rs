//! Resumable HTTP transfer worker
//!
//! One worker per started task. The resume token is the size of the partial
//! file already on disk: a non-empty file turns the request into
//! `Range: bytes=<size>-` and the body is appended. Byte counters are owned by
//! the worker and copied into the registry on every telemetry tick.

use crate::error::{DownloadError, Error, Result};
use crate::types::{EventKind, Status, Task, TaskId};
use chrono::Utc;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::RomDownloader;

/// Size of the pieces written to disk between pause/cancel checks
pub(crate) const CHUNK_SIZE: usize = 8 * 1024;

/// Minimum wall-clock time between progress events
pub(crate) const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(500);

/// Byte counters and speed window for one transfer
#[derive(Debug, Clone)]
pub(crate) struct TransferMeter {
    pub(crate) downloaded: u64,
    pub(crate) total: u64,
    pub(crate) speed_bps: f64,
    window_bytes: u64,
    window_start: Instant,
}

impl TransferMeter {
    pub(crate) fn new(downloaded: u64, total: u64, now: Instant) -> Self {
        Self {
            downloaded,
            total,
            speed_bps: 0.0,
            window_bytes: 0,
            window_start: now,
        }
    }

    pub(crate) fn record(&mut self, bytes: usize) {
        self.downloaded += bytes as u64;
        self.window_bytes += bytes as u64;
    }

    /// Close the speed window if at least one interval has passed
    ///
    /// Returns true when a progress event is due.
    pub(crate) fn tick(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < PROGRESS_UPDATE_INTERVAL {
            return false;
        }
        self.speed_bps = self.window_bytes as f64 / elapsed.as_secs_f64();
        self.window_bytes = 0;
        self.window_start = now;
        true
    }

    /// Percentage complete, None while the total size is unknown
    pub(crate) fn percent(&self) -> Option<f32> {
        (self.total > 0).then(|| (self.downloaded as f64 / self.total as f64 * 100.0) as f32)
    }

    /// Whether the stream delivered everything it announced
    pub(crate) fn is_complete(&self) -> bool {
        self.total == 0 || self.downloaded >= self.total
    }

    fn apply_to(&self, task: &mut Task) {
        task.downloaded_bytes = self.downloaded;
        task.total_bytes = self.total;
        task.speed_bps = self.speed_bps;
        if let Some(percent) = self.percent() {
            task.progress = percent;
        }
    }
}

/// How the read loop ended
enum TransferEnd {
    /// Body fully read (or nothing left to read)
    Finished(TransferMeter),
    /// Pause, cancel or shutdown was observed
    Stopped(Option<TransferMeter>),
}

/// Worker entry point spawned by the scheduler
///
/// Never returns an error: every outcome is turned into task state plus
/// events, then the slot is released so the next pending task can start.
pub(crate) async fn run_transfer_task(
    downloader: RomDownloader,
    id: TaskId,
    cancel_token: CancellationToken,
) {
    let Some(task) = downloader.get(id).await else {
        downloader.on_worker_finished(id).await;
        return;
    };

    downloader.events.status(
        id,
        EventKind::Started,
        format!("Starting download: {}", task.filename),
    );

    match downloader.transfer(&task, &cancel_token).await {
        Ok(TransferEnd::Finished(meter)) if meter.is_complete() => {
            downloader.complete_task(id, &meter).await;
        }
        Ok(TransferEnd::Finished(meter)) => {
            let err = DownloadError::Incomplete {
                downloaded: meter.downloaded,
                total: meter.total,
            };
            downloader
                .fail_task(id, Some(&meter), Error::Download(err))
                .await;
        }
        Ok(TransferEnd::Stopped(meter)) => {
            tracing::info!(task_id = %id, "transfer stopped");
            if let Some(meter) = meter {
                downloader.sync_counters(id, &meter).await;
            }
        }
        Err(e) => {
            downloader.fail_task(id, None, e).await;
        }
    }

    if let Some(snapshot) = downloader.get(id).await {
        downloader.events.progress(&snapshot);
    }
    downloader.on_worker_finished(id).await;
}

impl RomDownloader {
    async fn transfer(&self, task: &Task, cancel_token: &CancellationToken) -> Result<TransferEnd> {
        let path = task.output_path();
        let mut offset = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let mut request = self.client.get(&task.url);
        if offset > 0 {
            tracing::info!(task_id = %task.id, offset, "resuming partial download");
            request = request.header(RANGE, format!("bytes={}-", offset));
        }

        let read_timeout = self.config.download.read_timeout;
        let response = tokio::select! {
            _ = cancel_token.cancelled() => return Ok(TransferEnd::Stopped(None)),
            response = tokio::time::timeout(read_timeout, request.send()) => match response {
                Ok(response) => response?,
                Err(_) => {
                    return Err(DownloadError::Stalled {
                        seconds: read_timeout.as_secs(),
                    }
                    .into());
                }
            },
        };

        let status = response.status();
        if offset > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE {
            tracing::info!(task_id = %task.id, offset, "partial file already complete");
            return Ok(TransferEnd::Finished(TransferMeter::new(
                offset,
                offset,
                Instant::now(),
            )));
        }
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                status: status.as_u16(),
            }
            .into());
        }
        if offset > 0 && status != StatusCode::PARTIAL_CONTENT {
            tracing::warn!(task_id = %task.id, %status, "server ignored range request, restarting from zero");
            offset = 0;
        }

        let total = response
            .content_length()
            .map(|len| len + offset)
            .unwrap_or(0);

        let mut file = if offset > 0 {
            tokio::fs::OpenOptions::new().append(true).open(&path).await?
        } else {
            tokio::fs::File::create(&path).await?
        };

        let mut meter = TransferMeter::new(offset, total, Instant::now());
        self.sync_counters(task.id, &meter).await;

        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                _ = cancel_token.cancelled() => None,
                next = tokio::time::timeout(read_timeout, stream.next()) => Some(next),
            };

            let chunk = match next {
                None => {
                    file.flush().await?;
                    return Ok(TransferEnd::Stopped(Some(meter)));
                }
                Some(Err(_)) => {
                    file.flush().await?;
                    self.sync_counters(task.id, &meter).await;
                    return Err(DownloadError::Stalled {
                        seconds: read_timeout.as_secs(),
                    }
                    .into());
                }
                Some(Ok(None)) => break,
                Some(Ok(Some(chunk))) => chunk,
            };

            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    file.flush().await?;
                    self.sync_counters(task.id, &meter).await;
                    // Body cut short of the announced length
                    if meter.total > 0 && meter.downloaded < meter.total {
                        tracing::debug!(task_id = %task.id, error = %e, "stream ended early");
                        return Err(DownloadError::Incomplete {
                            downloaded: meter.downloaded,
                            total: meter.total,
                        }
                        .into());
                    }
                    return Err(e.into());
                }
            };

            for piece in chunk.chunks(CHUNK_SIZE) {
                if cancel_token.is_cancelled() {
                    file.flush().await?;
                    return Ok(TransferEnd::Stopped(Some(meter)));
                }
                file.write_all(piece).await?;
                meter.record(piece.len());

                if meter.tick(Instant::now()) {
                    self.publish_progress(task.id, &meter).await;
                }
            }
        }

        file.flush().await?;
        Ok(TransferEnd::Finished(meter))
    }

    /// Copy the worker's counters into the registry without emitting
    async fn sync_counters(&self, id: TaskId, meter: &TransferMeter) {
        let mut registry = self.queue_state.registry.lock().await;
        if let Some(task) = registry.tasks.get_mut(&id) {
            meter.apply_to(task);
        }
    }

    /// Copy counters into the registry and emit a progress event
    async fn publish_progress(&self, id: TaskId, meter: &TransferMeter) {
        let snapshot = {
            let mut registry = self.queue_state.registry.lock().await;
            registry.tasks.get_mut(&id).map(|task| {
                meter.apply_to(task);
                task.clone()
            })
        };
        if let Some(snapshot) = snapshot {
            self.events.progress(&snapshot);
        }
    }

    /// Mark a fully received task completed, post-process it, then announce it
    ///
    /// A task paused or cancelled while the last bytes arrived keeps that status.
    async fn complete_task(&self, id: TaskId, meter: &TransferMeter) {
        let snapshot = {
            let mut registry = self.queue_state.registry.lock().await;
            let Some(task) = registry.tasks.get_mut(&id) else {
                return;
            };
            meter.apply_to(task);
            if task.status != Status::Downloading {
                return;
            }
            task.status = Status::Completed;
            task.progress = 100.0;
            task.finished_at = Some(Utc::now());
            task.clone()
        };

        tracing::info!(
            task_id = %id,
            bytes = snapshot.downloaded_bytes,
            path = ?snapshot.output_path(),
            "transfer completed"
        );

        self.run_post_processing(&snapshot).await;

        self.events.status(
            id,
            EventKind::Completed,
            format!("Download completed: {}", snapshot.filename),
        );
    }

    /// Mark a task failed with the error text and announce it
    async fn fail_task(&self, id: TaskId, meter: Option<&TransferMeter>, error: Error) {
        let message = match &error {
            Error::Download(inner) => inner.to_string(),
            other => other.to_string(),
        };

        {
            let mut registry = self.queue_state.registry.lock().await;
            let Some(task) = registry.tasks.get_mut(&id) else {
                return;
            };
            if let Some(meter) = meter {
                meter.apply_to(task);
            }
            if task.status != Status::Downloading {
                return;
            }
            task.status = Status::Failed;
            task.speed_bps = 0.0;
            task.error_message = Some(message.clone());
            task.finished_at = Some(Utc::now());
        }

        tracing::warn!(task_id = %id, error = %message, "transfer failed");
        self.events
            .status(id, EventKind::Failed, format!("Download failed: {}", message));
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_waits_for_a_full_interval() {
        let start = Instant::now();
        let mut meter = TransferMeter::new(0, 1000, start);
        meter.record(100);
        assert!(!meter.tick(start + Duration::from_millis(499)));
        assert_eq!(meter.speed_bps, 0.0);

        assert!(meter.tick(start + Duration::from_millis(500)));
        assert!((meter.speed_bps - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tick_resets_the_window() {
        let start = Instant::now();
        let mut meter = TransferMeter::new(0, 0, start);
        meter.record(1000);
        assert!(meter.tick(start + Duration::from_secs(1)));
        assert!((meter.speed_bps - 1000.0).abs() < 1e-9);

        // No bytes in the next window: speed decays to zero
        assert!(meter.tick(start + Duration::from_secs(2)));
        assert_eq!(meter.speed_bps, 0.0);
        assert_eq!(meter.downloaded, 1000);
    }

    #[test]
    fn percent_needs_a_known_total() {
        let now = Instant::now();
        let mut meter = TransferMeter::new(0, 0, now);
        meter.record(4096);
        assert_eq!(meter.percent(), None);

        let mut meter = TransferMeter::new(250, 1000, now);
        meter.record(250);
        assert_eq!(meter.percent(), Some(50.0));
    }

    #[test]
    fn completion_rule() {
        let now = Instant::now();
        assert!(TransferMeter::new(10, 0, now).is_complete());
        assert!(TransferMeter::new(100, 100, now).is_complete());
        assert!(!TransferMeter::new(99, 100, now).is_complete());
    }

    #[test]
    fn resumed_meter_starts_from_offset() {
        let now = Instant::now();
        let mut meter = TransferMeter::new(4_194_304, 10_485_760, now);
        meter.record(CHUNK_SIZE);
        assert_eq!(meter.downloaded, 4_194_304 + 8192);
        assert!(!meter.is_complete());
    }
}
