//! Trait for compressed container decompression

use async_trait::async_trait;
use std::path::Path;

/// Transform from a compressed container to a plain container
///
/// Implementations only run the transform. Locating the produced file and
/// bounding the run time is the caller's job, so a test double can stand in
/// for the external tool.
#[async_trait]
pub trait Decompressor: Send + Sync {
    /// Decompress `source` into `output_dir`
    ///
    /// # Errors
    ///
    /// Returns an error if the tool cannot be executed, exits unsuccessfully,
    /// or is not available at all (`Error::NotSupported`).
    async fn decompress(
        &self,
        source: &Path,
        output_dir: &Path,
        fix_padding: bool,
    ) -> crate::Result<()>;

    /// Whether this implementation can run at all
    fn is_available(&self) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
