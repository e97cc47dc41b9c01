//! # rom-dl
//!
//! Download pipeline library for large ROM files.
//!
//! ## Design Philosophy
//!
//! rom-dl is designed to be:
//! - **Bounded** - at most `max_concurrent_downloads` transfers run at once;
//!   the queue advances by itself as transfers finish
//! - **Resumable** - a partial file is continued with an HTTP range request
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers register listeners or subscribe to events,
//!   no polling required
//!
//! After a transfer completes, `.zip` archives are extracted (and removed) and
//! `.nsz` containers are decompressed to `.nsp` when a key file is available.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rom_dl::{Config, DownloadRequest, RomDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = RomDownloader::new(Config::default())?;
//!
//!     downloader.add_status_listener(|id, kind, message| {
//!         println!("[{}] {}: {}", id, kind, message);
//!     });
//!
//!     downloader
//!         .submit_batch(vec![DownloadRequest::new(
//!             "https://example.com/roms/game.zip",
//!             "game.zip",
//!             "roms/snes",
//!         )])
//!         .await?;
//!     downloader.start_all().await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Catalog listing entries resolved into download requests
pub mod catalog;
/// Configuration types
pub mod config;
/// Compressed container decompression and key material
pub mod decompression;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Progress and status event bus
pub mod events;
/// Archive extraction
pub mod extraction;
/// Post-processing pipeline
pub mod post_processing;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use catalog::{CatalogEntry, SystemInfo};
pub use config::{Config, DownloadConfig, ProcessingConfig, ToolsConfig};
pub use decompression::{CliDecompressor, Decompressor, NoOpDecompressor};
pub use downloader::RomDownloader;
pub use error::{DownloadError, Error, PostProcessError, Result};
pub use post_processing::PostProcessOutcome;
pub use types::{
    ArtifactKind, DecompressionStatus, DownloadRequest, Event, EventKind, QueueStats, Status,
    Task, TaskId,
};

/// Helper function to run the downloader until a termination signal arrives.
///
/// Waits for SIGTERM/SIGINT (Ctrl+C elsewhere) and then calls the downloader's
/// `shutdown()` method, leaving partial files in place for the next session.
///
/// # Example
///
/// ```no_run
/// use rom_dl::{Config, RomDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = RomDownloader::new(Config::default())?;
///     downloader.start_all().await;
///     run_with_shutdown(downloader).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: RomDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
