//! Configuration types for rom-dl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Transfer behavior configuration (concurrency, HTTP client)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum simultaneously downloading tasks (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// TCP connect timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Maximum idle time between body reads before the transfer fails (default: 30 seconds)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Post-download processing switches
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Extract `.zip` archives after download and delete the archive (default: true)
    #[serde(default = "default_true")]
    pub extract_archives: bool,

    /// Decompress `.nsz` containers to `.nsp` after download (default: true)
    #[serde(default = "default_true")]
    pub decompress_containers: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            extract_archives: true,
            decompress_containers: true,
        }
    }
}

/// External tool and key material configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Key file (or directory containing `prod.keys`) supplied by the user
    #[serde(default)]
    pub keys_path: Option<PathBuf>,

    /// Well-known directory the decompressor reads keys from (default: `~/.switch`)
    #[serde(default = "default_keys_dir")]
    pub keys_dir: PathBuf,

    /// Path to the nsz executable (auto-detected if None)
    #[serde(default)]
    pub nsz_path: Option<PathBuf>,

    /// Whether to search PATH for nsz if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Upper bound for a single decompression run (default: 30 minutes)
    #[serde(default = "default_decompress_timeout", with = "duration_serde")]
    pub decompress_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            keys_path: None,
            keys_dir: default_keys_dir(),
            nsz_path: None,
            search_path: true,
            decompress_timeout: default_decompress_timeout(),
        }
    }
}

/// Main configuration for RomDownloader
///
/// Sub-configs are flattened, so the serialized form is a single flat object:
///
/// ```
/// use rom_dl::Config;
///
/// let config: Config = serde_json::from_str(r#"{"max_concurrent_downloads": 5}"#).unwrap();
/// assert_eq!(config.download.max_concurrent_downloads, 5);
/// assert!(config.processing.extract_archives);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transfer settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Post-processing switches
    #[serde(flatten)]
    pub processing: ProcessingConfig,

    /// External tools and key material
    #[serde(flatten)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Reject settings the scheduler cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(crate::Error::Config {
                message: "max_concurrent_downloads must be at least 1".to_string(),
                key: Some("max_concurrent_downloads".to_string()),
            });
        }
        if self.tools.decompress_timeout.is_zero() {
            return Err(crate::Error::Config {
                message: "decompress_timeout must be greater than zero".to_string(),
                key: Some("decompress_timeout".to_string()),
            });
        }
        Ok(())
    }
}

fn default_max_concurrent() -> usize {
    3
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("rom-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

fn default_keys_dir() -> PathBuf {
    home::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switch")
}

fn default_decompress_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
