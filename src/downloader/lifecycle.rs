//! Shutdown coordination.

use crate::error::Result;
use crate::types::Status;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::RomDownloader;

/// How long shutdown waits for workers to close their files
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl RomDownloader {
    /// Gracefully shut down the downloader
    ///
    /// 1. Stops accepting new tasks and starting pending ones
    /// 2. Marks downloading tasks paused and signals their workers
    /// 3. Waits (up to 30 seconds) for the workers to stop
    ///
    /// Partial files stay on disk, so a later session can resume them.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("initiating graceful shutdown");
        self.queue_state.accepting_new.store(false, Ordering::SeqCst);

        let handles: Vec<_> = {
            let mut registry = self.queue_state.registry.lock().await;
            let super::Registry { tasks, active } = &mut *registry;
            active
                .iter_mut()
                .filter_map(|(id, transfer)| {
                    if let Some(task) = tasks.get_mut(id)
                        && task.status == Status::Downloading
                    {
                        task.status = Status::Paused;
                        task.speed_bps = 0.0;
                    }
                    transfer.cancel_token.cancel();
                    transfer.handle.take()
                })
                .collect()
        };

        tracing::info!(workers = handles.len(), "signalled active transfers");

        let wait_all = futures::future::join_all(handles);
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await {
            Ok(_) => tracing::info!("all transfers stopped"),
            Err(_) => tracing::warn!("timeout waiting for transfers to stop, proceeding with shutdown"),
        }

        Ok(())
    }
}
