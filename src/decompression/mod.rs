//! Compressed container handling
//!
//! Decompression of `.nsz` containers to `.nsp` needs two things: a tool that
//! performs the transform and a key file it can read. Both are pluggable:
//!
//! - [`Decompressor`] is the transform. [`CliDecompressor`] drives the external
//!   `nsz` binary; [`NoOpDecompressor`] is used when no binary is available
//!   and fails every call with `Error::NotSupported`.
//! - [`KeyStore`] locates, validates and installs the key file into the
//!   directory the tool reads from.
//!
//! ```no_run
//! use rom_dl::decompression::{CliDecompressor, Decompressor};
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! if let Some(tool) = CliDecompressor::from_path() {
//!     tool.decompress(Path::new("game.nsz"), Path::new("out"), false).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod cli;
mod keys;
mod noop;
mod traits;

pub use cli::CliDecompressor;
pub use keys::{KeyStore, validate_keys_file};
pub use noop::NoOpDecompressor;
pub use traits::Decompressor;

use crate::config::ToolsConfig;
use std::sync::Arc;

/// Pick the decompressor for the given tool settings
///
/// An explicit `nsz_path` wins; otherwise `PATH` is searched when allowed.
/// Falls back to [`NoOpDecompressor`] so downloads keep working without the tool.
pub fn select_decompressor(tools: &ToolsConfig) -> Arc<dyn Decompressor> {
    if let Some(path) = &tools.nsz_path {
        tracing::debug!(?path, "using configured nsz binary");
        return Arc::new(CliDecompressor::new(path.clone()));
    }
    if tools.search_path
        && let Some(cli) = CliDecompressor::from_path()
    {
        tracing::debug!("using nsz found in PATH");
        return Arc::new(cli);
    }
    tracing::info!("nsz not available, container decompression disabled");
    Arc::new(NoOpDecompressor)
}
