//! CLI-based decompressor using the external nsz binary

use super::traits::Decompressor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Number of trailing stderr bytes kept in error messages
const STDERR_TAIL: usize = 512;

/// Decompressor that runs `nsz -D -o <output_dir> <source>`
///
/// The child is killed if the returned future is dropped, so wrapping the call
/// in `tokio::time::timeout` really stops the tool.
pub struct CliDecompressor {
    binary_path: PathBuf,
}

impl CliDecompressor {
    /// Create a decompressor with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find nsz in PATH
    pub fn from_path() -> Option<Self> {
        which::which("nsz").ok().map(Self::new)
    }

    fn build_command(&self, source: &Path, output_dir: &Path, fix_padding: bool) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("-D").arg("-o").arg(output_dir);
        if fix_padding {
            cmd.arg("--fix-padding");
        }
        cmd.arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map(|(i, _)| i)
        .unwrap_or(0);
    text[start..].to_string()
}

#[async_trait]
impl Decompressor for CliDecompressor {
    async fn decompress(
        &self,
        source: &Path,
        output_dir: &Path,
        fix_padding: bool,
    ) -> crate::Result<()> {
        tracing::info!(
            binary = ?self.binary_path,
            ?source,
            ?output_dir,
            "running nsz decompression"
        );

        let output = self
            .build_command(source, output_dir, fix_padding)
            .output()
            .await
            .map_err(|e| crate::Error::ExternalTool(format!("failed to execute nsz: {}", e)))?;

        if output.status.success() {
            return Ok(());
        }

        let detail = stderr_tail(&output.stderr);
        Err(crate::Error::ExternalTool(if detail.is_empty() {
            format!("nsz exited with {}", output.status)
        } else {
            format!("nsz exited with {}: {}", output.status, detail)
        }))
    }

    fn is_available(&self) -> bool {
        self.binary_path.is_file()
    }

    fn name(&self) -> &'static str {
        "cli-nsz"
    }
}
