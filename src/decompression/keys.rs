//! Key material lookup, validation and installation

use crate::error::{Error, PostProcessError, Result};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// File name the decompressor looks for inside the keys directory
pub const KEYS_FILE_NAME: &str = "prod.keys";

/// Length of a 128-bit key written as hex
const KEY_HEX_LEN: usize = 32;

/// Shortest line that can hold a `name=value` key entry
const MIN_KEY_LINE_LEN: usize = 10;

/// Check that `path` looks like a key file
///
/// A key file is line-oriented `name=value` pairs; at least one value must be a
/// 32-character hex token. This is a structural check, not a cryptographic one.
/// Unreadable files are reported as invalid.
pub fn validate_keys_file(path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(content) => content.lines().any(is_key_line),
        Err(e) => {
            tracing::debug!(?path, error = %e, "cannot read key file");
            false
        }
    }
}

fn is_key_line(line: &str) -> bool {
    let line = line.trim();
    if line.len() <= MIN_KEY_LINE_LEN {
        return false;
    }
    let Some((_, value)) = line.split_once('=') else {
        return false;
    };
    let value = value.trim();
    value.len() == KEY_HEX_LEN && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Holder of the key file used by the decompression path
///
/// The selected key file is copied into `keys_dir/prod.keys` (the location the
/// decompressor reads) only when no copy exists there yet; an existing copy is
/// never overwritten.
#[derive(Debug)]
pub struct KeyStore {
    keys_dir: PathBuf,
    active: RwLock<Option<PathBuf>>,
}

impl KeyStore {
    /// Create a store, using `configured` when given or discovering a key file otherwise
    ///
    /// Discovery checks `<keys_dir>/prod.keys`, `./keys.txt` and `./prod.keys`
    /// in that order. Validation is deferred to first use.
    pub fn new(keys_dir: PathBuf, configured: Option<&Path>) -> Self {
        let active = match configured {
            Some(path) => resolve_keys_path(path),
            None => discover(&keys_dir),
        };
        if let Some(path) = &active {
            tracing::debug!(?path, "key file selected");
        }
        Self {
            keys_dir,
            active: RwLock::new(active),
        }
    }

    /// Directory the decompressor reads keys from
    pub fn keys_dir(&self) -> &Path {
        &self.keys_dir
    }

    /// Currently selected key file, if any
    pub fn keys_path(&self) -> Option<PathBuf> {
        self.active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether a key file is selected and passes validation
    pub fn is_ready(&self) -> bool {
        self.keys_path()
            .is_some_and(|path| path.is_file() && validate_keys_file(&path))
    }

    /// Select a key file supplied by the user
    ///
    /// Accepts a `.keys` file or a directory containing `prod.keys`. The file
    /// is validated and installed before it replaces the current selection.
    ///
    /// # Errors
    ///
    /// - `InvalidPath` if `path` is neither a `.keys` file nor a directory
    ///   holding `prod.keys`
    /// - `InvalidKeys` if the file fails validation
    /// - `Io` if installing the copy fails
    pub fn set_keys_path(&self, path: &Path) -> Result<PathBuf> {
        let resolved = resolve_keys_path(path).ok_or_else(|| {
            Error::PostProcess(PostProcessError::InvalidPath {
                path: path.to_path_buf(),
                reason: format!(
                    "expected a .keys file or a directory containing {}",
                    KEYS_FILE_NAME
                ),
            })
        })?;

        if !validate_keys_file(&resolved) {
            return Err(Error::PostProcess(PostProcessError::InvalidKeys {
                path: resolved,
            }));
        }

        self.install(&resolved)?;
        *self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(resolved.clone());

        tracing::info!(path = ?resolved, "key file configured");
        Ok(resolved)
    }

    /// Make sure a valid key file is in place for the decompressor
    ///
    /// # Errors
    ///
    /// `MissingKeys` when nothing is selected or the selected file vanished,
    /// `InvalidKeys` when it fails validation.
    pub fn ensure_ready(&self) -> Result<PathBuf> {
        let path = self
            .keys_path()
            .filter(|p| p.is_file())
            .ok_or(Error::PostProcess(PostProcessError::MissingKeys))?;

        if !validate_keys_file(&path) {
            return Err(Error::PostProcess(PostProcessError::InvalidKeys { path }));
        }

        self.install(&path)?;
        Ok(path)
    }

    /// Copy `source` to `<keys_dir>/prod.keys` unless a copy is already there
    fn install(&self, source: &Path) -> Result<()> {
        let target = self.keys_dir.join(KEYS_FILE_NAME);
        if target.exists() || source == target {
            return Ok(());
        }
        std::fs::create_dir_all(&self.keys_dir)?;
        std::fs::copy(source, &target)?;
        tracing::info!(?source, ?target, "installed key file");
        Ok(())
    }
}

/// Map a user-supplied path to the key file it designates
fn resolve_keys_path(path: &Path) -> Option<PathBuf> {
    if path.is_dir() {
        let candidate = path.join(KEYS_FILE_NAME);
        return candidate.is_file().then_some(candidate);
    }
    let is_keys_file = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("keys"));
    (path.is_file() && is_keys_file).then(|| path.to_path_buf())
}

fn discover(keys_dir: &Path) -> Option<PathBuf> {
    let mut candidates = vec![keys_dir.join(KEYS_FILE_NAME)];
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("keys.txt"));
        candidates.push(cwd.join(KEYS_FILE_NAME));
    }
    candidates.into_iter().find(|p| p.is_file())
}
