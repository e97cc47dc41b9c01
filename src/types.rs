//! Core types for rom-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Unique identifier for a task
///
/// Ids are allocated from a monotonically increasing counter, so ordering by id
/// is submission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<TaskId> for u64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Task lifecycle status
///
/// `pending -> downloading -> {completed | failed | paused -> pending | cancelled}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Waiting for a free transfer slot
    Pending,
    /// A worker is streaming the body to disk
    Downloading,
    /// Stopped by the user, partial file kept for resume
    Paused,
    /// Transfer finished (post-processing outcome is reported separately)
    Completed,
    /// Transfer failed
    Failed,
    /// Cancelled by the user; only observable while the worker winds down
    Cancelled,
}

impl Status {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Cancelled)
    }
}

/// One requested file transfer: `(url, filename, destination directory)`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Absolute source URL
    pub url: String,
    /// Target filename inside `dest_dir`
    pub filename: String,
    /// Target directory (created on submission)
    pub dest_dir: PathBuf,
}

impl DownloadRequest {
    /// Create a request
    pub fn new(url: impl Into<String>, filename: impl Into<String>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            dest_dir: dest_dir.into(),
        }
    }

    /// Whether `filename` names a single entry directly inside `dest_dir`
    ///
    /// Rejects empty names, `.`/`..`, absolute paths and anything containing a
    /// path separator.
    pub fn has_plain_filename(&self) -> bool {
        is_plain_filename(&self.filename)
    }
}

pub(crate) fn is_plain_filename(name: &str) -> bool {
    if name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

/// Snapshot of a task as stored in the registry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,
    /// Source URL
    pub url: String,
    /// Target filename
    pub filename: String,
    /// Target directory
    pub dest_dir: PathBuf,
    /// Current status
    pub status: Status,
    /// Bytes present in the output file
    pub downloaded_bytes: u64,
    /// Full size in bytes, 0 until known
    pub total_bytes: u64,
    /// Progress percentage (0.0 to 100.0), only meaningful when `total_bytes > 0`
    pub progress: f32,
    /// Speed over the last telemetry window, in bytes per second
    pub speed_bps: f64,
    /// Transfer error, or post-processing error on a completed task
    pub error_message: Option<String>,
    /// When the task was submitted
    pub created_at: DateTime<Utc>,
    /// When the most recent transfer attempt started
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached completed or failed
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a fresh pending task
    pub fn new(id: TaskId, request: DownloadRequest) -> Self {
        Self {
            id,
            url: request.url,
            filename: request.filename,
            dest_dir: request.dest_dir,
            status: Status::Pending,
            downloaded_bytes: 0,
            total_bytes: 0,
            progress: 0.0,
            speed_bps: 0.0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Full path of the output file
    pub fn output_path(&self) -> PathBuf {
        self.dest_dir.join(&self.filename)
    }

    /// Post-processing path this task's file will take
    pub fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::detect(Path::new(&self.filename))
    }
}

/// Post-processing path selected by filename suffix (case-insensitive)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// `.zip` archive, extracted into the destination directory
    Archive,
    /// `.nsz` compressed container, decompressed to `.nsp`
    CompressedContainer,
    /// Anything else, left as is
    Plain,
}

/// Suffix of archives handled by the extraction path
pub const ARCHIVE_EXTENSION: &str = "zip";
/// Suffix of compressed containers handled by the decompression path
pub const COMPRESSED_EXTENSION: &str = "nsz";
/// Suffix of the plain containers produced by decompression
pub const CONTAINER_EXTENSION: &str = "nsp";

impl ArtifactKind {
    /// Detect the artifact kind from a file path
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            ARCHIVE_EXTENSION => ArtifactKind::Archive,
            COMPRESSED_EXTENSION => ArtifactKind::CompressedContainer,
            _ => ArtifactKind::Plain,
        }
    }
}

/// Kind of a status or progress notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Task created and queued
    Added,
    /// Worker started the transfer
    Started,
    /// Telemetry tick
    Progress,
    /// Archive extracted and removed
    Extracted,
    /// Decompression starting
    Decompressing,
    /// Decompression produced a container
    Decompressed,
    /// Extraction failed (transfer stays completed)
    ExtractFailed,
    /// Decompression failed (transfer stays completed)
    DecompressFailed,
    /// Transfer completed
    Completed,
    /// Transfer failed
    Failed,
    /// Task cancelled and removed
    Cancelled,
    /// Transfer paused
    Paused,
}

impl EventKind {
    /// Wire name of the kind (`"extract_failed"`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Started => "started",
            EventKind::Progress => "progress",
            EventKind::Extracted => "extracted",
            EventKind::Decompressing => "decompressing",
            EventKind::Decompressed => "decompressed",
            EventKind::ExtractFailed => "extract_failed",
            EventKind::DecompressFailed => "decompress_failed",
            EventKind::Completed => "completed",
            EventKind::Failed => "failed",
            EventKind::Cancelled => "cancelled",
            EventKind::Paused => "paused",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of a status or progress change
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    /// Task the event belongs to
    pub task_id: TaskId,
    /// What happened
    pub kind: EventKind,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Human-readable message (empty for progress ticks)
    pub message: String,
    /// Task snapshot, present on progress events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
}

/// Aggregate counters by status
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Number of tasks in the registry
    pub total: usize,
    /// Waiting for a slot
    pub pending: usize,
    /// Currently transferring
    pub downloading: usize,
    /// Transfer finished
    pub completed: usize,
    /// Transfer failed
    pub failed: usize,
    /// Paused by the user
    pub paused: usize,
}

/// Availability of the decompression path
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecompressionStatus {
    /// Name of the decompressor implementation in use
    pub tool: String,
    /// Whether the decompressor can run at all
    pub tool_available: bool,
    /// Validated key file in use, if any
    pub keys_path: Option<PathBuf>,
    /// Tool and keys both available
    pub ready: bool,
}
