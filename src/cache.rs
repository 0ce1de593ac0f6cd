//! Persisted cache metadata for one updater instance
//!
//! A single `cache.json` record per instance remembers which remote artifact
//! was last fetched and whether it has been installed. Reads never fail: a
//! missing or corrupt record reads as the zero value, which the change
//! detector treats as "never installed".

use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

const CACHE_FILE: &str = "cache.json";

/// Identity of one updater instance; determines its cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceIdentity {
    pub namespace: String,
    pub family: String,
    pub model: String,
    pub name: String,
}

impl InstanceIdentity {
    /// Identity under the default `autoupdate/windows/updater` model.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            namespace: "autoupdate".to_string(),
            family: "windows".to_string(),
            model: "updater".to_string(),
            name: name.into(),
        }
    }

    /// Per-instance directory below `root`.
    pub fn cache_dir_in(&self, root: &Path) -> PathBuf {
        root.join(&self.namespace)
            .join(&self.family)
            .join(&self.model)
            .join(&self.name)
    }

    /// Per-instance directory below the platform cache root.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir_in(&default_cache_root())
    }
}

/// Platform cache root, falling back to the system temp directory.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir().unwrap_or_else(std::env::temp_dir)
}

/// Last-seen remote artifact and its install status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDetails {
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub content_length: u64,
    #[serde(default)]
    pub etag: String,
    #[serde(default)]
    pub installed: bool,
}

/// File-backed store for [`CacheDetails`]. No locking: callers serialize runs.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Store rooted at `dir` (created on first write).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn for_instance(identity: &InstanceIdentity) -> Self {
        Self::new(identity.cache_dir())
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn file(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    /// Read the record; anything unreadable yields the zero value.
    pub fn read(&self) -> CacheDetails {
        let path = self.file();
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("could not read cache details {}: {e}", path.display());
                }
                return CacheDetails::default();
            }
        };

        serde_json::from_slice(&raw).unwrap_or_else(|e| {
            warn!("discarding corrupt cache details {}: {e}", path.display());
            CacheDetails::default()
        })
    }

    /// Overwrite the record atomically (temp file + rename).
    pub fn write(&self, details: &CacheDetails) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, details)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.file()).map_err(|e| e.error)?;

        debug!("saved cache details to {}", self.file().display());
        Ok(())
    }
}
