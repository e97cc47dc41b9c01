//! Shared test helpers for creating RomDownloader instances in tests.

use crate::config::Config;
use crate::decompression::{Decompressor, NoOpDecompressor};
use crate::downloader::RomDownloader;
use crate::types::{Event, EventKind, Status, TaskId};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::broadcast;

/// Upper bound for any single wait in downloader tests
const WAIT_TIMEOUT: Duration = Duration::from_secs(15);

fn test_config(temp_dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.download.max_concurrent_downloads = 3;
    config.download.read_timeout = Duration::from_secs(10);
    config.tools.keys_dir = temp_dir.path().join("switch");
    config.tools.keys_path = None;
    config.tools.nsz_path = None;
    config.tools.search_path = false;
    config
}

/// Helper to create a test RomDownloader with a no-op decompressor.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (RomDownloader, tempfile::TempDir) {
    create_test_downloader_with(|_| {}, Arc::new(NoOpDecompressor)).await
}

/// Like [`create_test_downloader`], with config tweaks and a chosen decompressor
pub(crate) async fn create_test_downloader_with(
    configure: impl FnOnce(&mut Config),
    decompressor: Arc<dyn Decompressor>,
) -> (RomDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(&temp_dir);
    configure(&mut config);
    let downloader = RomDownloader::with_decompressor(config, decompressor).unwrap();
    (downloader, temp_dir)
}

/// Deterministic, non-repeating-looking payload of `len` bytes
pub(crate) fn test_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}

/// Wait for an event of `kind` for task `id`, skipping everything else
pub(crate) async fn wait_for_event(
    rx: &mut broadcast::Receiver<Event>,
    id: TaskId,
    kind: EventKind,
) -> Event {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) if event.task_id == id && event.kind == kind => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {} on task {}", kind, id))
}

/// Poll until task `id` reaches `status`
pub(crate) async fn wait_for_status(downloader: &RomDownloader, id: TaskId, status: Status) {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            if downloader.get(id).await.map(|t| t.status) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for task {} to become {:?}", id, status));
}

/// Poll until no worker holds a transfer slot
pub(crate) async fn wait_until_idle(downloader: &RomDownloader) {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while downloader.active_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
