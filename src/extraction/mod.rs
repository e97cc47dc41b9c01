//! Archive extraction
//!
//! Only ZIP archives are handled; extraction runs on the blocking pool so the
//! async runtime is not stalled by archive I/O.

mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use zip::ZipExtractor;

use crate::error::{Error, PostProcessError, Result};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::info;

/// Extract every entry of `archive_path` into `dest_path`
///
/// Returns the list of files written. The archive itself is left in place;
/// removing it is the caller's decision.
pub async fn extract_archive(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
    info!(?archive_path, ?dest_path, "extracting archive");

    let archive_owned = archive_path.to_path_buf();
    let dest_owned = dest_path.to_path_buf();

    spawn_blocking(move || ZipExtractor::extract(&archive_owned, &dest_owned))
        .await
        .map_err(|e| {
            Error::PostProcess(PostProcessError::ExtractionFailed {
                archive: archive_path.to_path_buf(),
                reason: format!("extraction task panicked: {}", e),
            })
        })?
}
