//! Error types for rom-dl
//!
//! Errors fall into three groups:
//! - Transfer errors (network, HTTP status, truncated stream) that fail a task
//! - Post-processing errors (extraction, decompression, key material) that are
//!   attached to an already completed task without failing it
//! - Control errors returned to callers (unknown task, illegal transition)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rom-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rom-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "keys_path")
        key: Option<String>,
    },

    /// Transfer-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Post-processing error (extraction, decompression)
    #[error("post-processing error: {0}")]
    PostProcess(#[from] PostProcessError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Task not found in the registry
    #[error("task not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// External tool execution failed (nsz)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary)
    #[error("not supported: {0}")]
    NotSupported(String),
}

/// Transfer-related errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Cannot perform operation in current state
    #[error("cannot {operation} task {id} in state {current_state}")]
    InvalidState {
        /// The task that is in an invalid state for the operation
        id: u64,
        /// The operation that was attempted (e.g., "pause", "resume")
        operation: String,
        /// The current state that prevents the operation
        current_state: String,
    },

    /// Server answered with a non-success status code
    #[error("server responded with HTTP {status}")]
    HttpStatus {
        /// The HTTP status code
        status: u16,
    },

    /// No body data arrived within the read timeout
    #[error("no data received for {seconds}s")]
    Stalled {
        /// The idle time that was exceeded
        seconds: u64,
    },

    /// Target filename would place the file outside its destination directory
    #[error("invalid filename {filename:?}: must be a plain file name")]
    InvalidFilename {
        /// The rejected filename
        filename: String,
    },

    /// Stream ended before the announced length was received
    #[error("download incomplete: received {downloaded} of {total} bytes")]
    Incomplete {
        /// Bytes present on disk when the stream ended
        downloaded: u64,
        /// Expected total size
        total: u64,
    },
}

/// Post-processing errors (extraction, decompression, key material)
#[derive(Debug, Error)]
pub enum PostProcessError {
    /// Archive extraction failed
    #[error("extraction failed for {archive}: {reason}")]
    ExtractionFailed {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// Decompression of a compressed container failed
    #[error("decompression failed for {source_path}: {reason}")]
    DecompressionFailed {
        /// The compressed container
        source_path: PathBuf,
        /// The reason decompression failed
        reason: String,
    },

    /// No key material configured or discovered
    #[error(
        "decryption keys not found: place prod.keys in the keys directory or configure keys_path"
    )]
    MissingKeys,

    /// Key material present but not recognisable as a key file
    #[error("invalid key file {path}: expected name=value lines with 32-character hex keys")]
    InvalidKeys {
        /// The rejected key file
        path: PathBuf,
    },

    /// External tool exceeded its time budget
    #[error("{tool} timed out after {seconds}s")]
    Timeout {
        /// Tool name
        tool: String,
        /// Budget that was exceeded, in seconds
        seconds: u64,
    },

    /// Invalid path encountered during post-processing
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The invalid path that was encountered
        path: PathBuf,
        /// The reason the path is invalid
        reason: String,
    },
}

impl PostProcessError {
    /// Whether this error is a configuration problem (missing or invalid keys)
    /// rather than a failure of the transform itself
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PostProcessError::MissingKeys | PostProcessError::InvalidKeys { .. }
        )
    }
}
