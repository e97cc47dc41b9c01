//! Post-processing pipeline for completed transfers
//!
//! Runs once per task, after the transfer reached `completed`, and dispatches
//! on the filename suffix:
//! 1. `.zip` - extract into the destination directory, then delete the archive
//! 2. `.nsz` - decompress to `.nsp` with the configured tool and key file
//! 3. anything else - nothing to do
//!
//! Failures here never fail the transfer. They are reported as
//! `extract_failed` / `decompress_failed` events and returned so the caller can
//! attach the message to the task.

use crate::config::{ProcessingConfig, ToolsConfig};
use crate::decompression::{Decompressor, KeyStore};
use crate::error::{Error, PostProcessError, Result};
use crate::events::EventBus;
use crate::extraction::extract_archive;
use crate::types::{
    ArtifactKind, CONTAINER_EXTENSION, DecompressionStatus, EventKind, Task,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

/// Result of post-processing one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcessOutcome {
    /// Nothing to do for this file (plain file or path disabled)
    Skipped,
    /// Archive extracted and removed
    Extracted {
        /// Files written by the extraction
        files: Vec<PathBuf>,
    },
    /// Container decompressed
    Decompressed {
        /// Description of the produced artifact(s)
        message: String,
    },
    /// Processing failed; the transfer stays completed
    Failed {
        /// Message attached to the task
        message: String,
    },
}

impl PostProcessOutcome {
    /// Error message to attach to the task, if processing failed
    pub fn error_message(&self) -> Option<&str> {
        match self {
            PostProcessOutcome::Failed { message } => Some(message),
            _ => None,
        }
    }
}

/// Post-processing pipeline executor
pub struct PostProcessor {
    /// Bus for extracted/decompressed/failure events
    events: EventBus,
    /// Which paths are enabled
    config: ProcessingConfig,
    /// Upper bound for one decompression run
    decompress_timeout: Duration,
    /// Key file lookup and installation
    key_store: Arc<KeyStore>,
    /// Container decompression tool
    decompressor: Arc<dyn Decompressor>,
}

impl PostProcessor {
    /// Create a new post-processing pipeline executor
    pub fn new(
        events: EventBus,
        config: ProcessingConfig,
        tools: &ToolsConfig,
        key_store: Arc<KeyStore>,
        decompressor: Arc<dyn Decompressor>,
    ) -> Self {
        Self {
            events,
            config,
            decompress_timeout: tools.decompress_timeout,
            key_store,
            decompressor,
        }
    }

    /// Key store shared with the downloader
    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.key_store
    }

    /// Report whether the decompression path can currently run
    pub fn decompression_status(&self) -> DecompressionStatus {
        let tool_available = self.decompressor.is_available();
        let keys_ready = self.key_store.is_ready();
        DecompressionStatus {
            tool: self.decompressor.name().to_string(),
            tool_available,
            keys_path: self.key_store.keys_path(),
            ready: tool_available && keys_ready,
        }
    }

    /// Run the pipeline for a task whose transfer just completed
    pub async fn process(&self, task: &Task) -> PostProcessOutcome {
        let kind = task.artifact_kind();
        info!(task_id = %task.id, ?kind, filename = %task.filename, "post-processing");

        match kind {
            ArtifactKind::Archive if self.config.extract_archives => self.extract(task).await,
            ArtifactKind::CompressedContainer if self.config.decompress_containers => {
                self.decompress(task).await
            }
            _ => {
                debug!(task_id = %task.id, ?kind, "no post-processing needed");
                PostProcessOutcome::Skipped
            }
        }
    }

    async fn extract(&self, task: &Task) -> PostProcessOutcome {
        let archive = task.output_path();

        match extract_archive(&archive, &task.dest_dir).await {
            Ok(files) => {
                if let Err(e) = tokio::fs::remove_file(&archive).await {
                    warn!(task_id = %task.id, ?archive, error = %e, "failed to remove extracted archive");
                }
                self.events.status(
                    task.id,
                    EventKind::Extracted,
                    format!("Extracted ZIP: {}", task.filename),
                );
                PostProcessOutcome::Extracted { files }
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "archive extraction failed");
                let message = format!("ZIP extraction failed: {}", describe(&e));
                self.events
                    .status(task.id, EventKind::ExtractFailed, message.clone());
                PostProcessOutcome::Failed { message }
            }
        }
    }

    async fn decompress(&self, task: &Task) -> PostProcessOutcome {
        self.events.status(
            task.id,
            EventKind::Decompressing,
            format!("Decompressing NSZ: {}", task.filename),
        );

        match self.run_decompression(task).await {
            Ok(message) => {
                info!(task_id = %task.id, %message, "decompression finished");
                self.events.status(
                    task.id,
                    EventKind::Decompressed,
                    format!("Decompressed NSZ: {}", message),
                );
                PostProcessOutcome::Decompressed { message }
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "decompression failed");
                let message = format!("NSZ decompression failed: {}", describe(&e));
                self.events
                    .status(task.id, EventKind::DecompressFailed, message.clone());
                PostProcessOutcome::Failed { message }
            }
        }
    }

    async fn run_decompression(&self, task: &Task) -> Result<String> {
        self.key_store.ensure_ready()?;

        let source = task.output_path();
        let expected = task
            .dest_dir
            .join(Path::new(&task.filename).with_extension(CONTAINER_EXTENSION));
        let before = list_containers(&task.dest_dir).await?;

        match tokio::time::timeout(
            self.decompress_timeout,
            self.decompressor.decompress(&source, &task.dest_dir, false),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::PostProcess(PostProcessError::Timeout {
                    tool: self.decompressor.name().to_string(),
                    seconds: self.decompress_timeout.as_secs(),
                }));
            }
        }

        if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
            return Ok(format!("Successfully decompressed to {}", expected.display()));
        }

        let after = list_containers(&task.dest_dir).await?;
        let created: Vec<&str> = after.difference(&before).map(String::as_str).collect();
        if created.is_empty() {
            return Err(Error::PostProcess(PostProcessError::DecompressionFailed {
                source_path: source,
                reason: "decompression completed but no NSP files found".to_string(),
            }));
        }

        Ok(format!(
            "Successfully decompressed. Created: {}",
            created.join(", ")
        ))
    }
}

/// Names of the plain containers currently in `dir`, sorted
async fn list_containers(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_container = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(CONTAINER_EXTENSION));
        if is_container && let Some(name) = path.file_name() {
            names.insert(name.to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Human-readable reason without the error category prefix
fn describe(error: &Error) -> String {
    match error {
        Error::PostProcess(inner) => inner.to_string(),
        other => other.to_string(),
    }
}
