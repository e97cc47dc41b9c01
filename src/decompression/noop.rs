//! No-op decompressor for graceful degradation

use super::traits::Decompressor;
use async_trait::async_trait;
use std::path::Path;

/// Decompressor used when no `nsz` binary is available
///
/// Every call fails with `Error::NotSupported`; the download itself is
/// unaffected and the failure is reported as a post-processing outcome.
pub struct NoOpDecompressor;

#[async_trait]
impl Decompressor for NoOpDecompressor {
    async fn decompress(
        &self,
        _source: &Path,
        _output_dir: &Path,
        _fix_padding: bool,
    ) -> crate::Result<()> {
        Err(crate::Error::NotSupported(
            "container decompression requires the external nsz binary. \
             Configure nsz_path in config or ensure nsz is in PATH."
                .into(),
        ))
    }

    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
