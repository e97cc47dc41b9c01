//! Catalog entries from the listing collaborator, resolved into download requests
//!
//! A listing entry names a file (`filename` or `name`) and where to get it
//! (`url` or `href`). Relative locations are resolved against the system's base
//! URL; entries with no location at all fall back to `base_url + name`.

use crate::types::{DownloadRequest, is_plain_filename};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Folder used when a system does not name one
const DEFAULT_SYSTEM_FOLDER: &str = "unknown_system";

/// One selectable item from a catalog listing
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Preferred target filename
    #[serde(default)]
    pub filename: Option<String>,
    /// Display name, used as filename when `filename` is absent
    #[serde(default)]
    pub name: Option<String>,
    /// Absolute or relative location
    #[serde(default)]
    pub url: Option<String>,
    /// Relative location scraped from a listing page
    #[serde(default)]
    pub href: Option<String>,
}

/// System-level listing configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Subfolder of the download directory for this system
    #[serde(default)]
    pub roms_folder: Option<String>,
    /// Base URL of the listing, used to resolve relative hrefs
    #[serde(default)]
    pub url: Option<String>,
}

impl CatalogEntry {
    fn target_filename(&self) -> Option<&str> {
        self.filename
            .as_deref()
            .or(self.name.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    fn location(&self) -> Option<&str> {
        self.url
            .as_deref()
            .or(self.href.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Resolve `location` against `base`; absolute http(s) locations pass through
fn resolve_url(location: &str, base: Option<&str>) -> Option<String> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return Some(location.to_string());
    }
    let base = Url::parse(base?).ok()?;
    base.join(location).ok().map(String::from)
}

/// Turn catalog entries into requests targeting `base_dir/<system folder>`
///
/// Entries without a usable name, or without any way to build a URL, are
/// skipped with a debug log.
pub fn resolve_entries(
    entries: &[CatalogEntry],
    system: &SystemInfo,
    base_dir: &Path,
) -> Vec<DownloadRequest> {
    let folder = system
        .roms_folder
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SYSTEM_FOLDER);
    let dest_dir = base_dir.join(folder);
    let base_url = system.url.as_deref().filter(|s| !s.is_empty());

    entries
        .iter()
        .filter_map(|entry| {
            let Some(filename) = entry.target_filename() else {
                tracing::debug!(?entry, "skipping catalog entry without a name");
                return None;
            };
            if !is_plain_filename(filename) {
                tracing::warn!(filename, "skipping catalog entry with an unsafe name");
                return None;
            }
            let url = match entry.location() {
                Some(location) => resolve_url(location, base_url),
                None => resolve_url(filename, base_url),
            };
            let Some(url) = url else {
                tracing::debug!(filename, "skipping catalog entry without a resolvable URL");
                return None;
            };
            Some(DownloadRequest::new(url, filename, dest_dir.clone()))
        })
        .collect()
}
