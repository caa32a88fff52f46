// # SPF cache file
//
// Persists a `TxtCache` so that a later run can resolve SPF includes without
// touching DNS (`PreloadedResolver`).
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Backup: the previous file is kept as `.backup`
// - Recovery: a corrupted file falls back to the backup, then to empty
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "saved_at": "2025-01-09T12:00:00Z",
//   "entries": {
//     "_spf.example.com": { "txt": ["v=spf1 ip4:192.0.2.0/24 ~all"] }
//   }
// }
// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::spf::resolver::TxtCache;

/// Cache file format version
const CACHE_FILE_VERSION: &str = "1.0";

type Entries = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFileFormat {
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    entries: Entries,
}

/// On-disk home of an SPF TXT cache
#[derive(Debug, Clone)]
pub struct SpfCacheFile {
    path: PathBuf,
}

impl SpfCacheFile {
    /// Cache file at `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file into `cache`, recovering from the backup if needed.
    ///
    /// A missing file is an empty cache.
    pub async fn load_into(&self, cache: &TxtCache) -> Result<usize> {
        let entries = match Self::read(&self.path).await {
            Ok(entries) => entries,
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "SPF cache {} appears corrupted: {}. Attempting recovery from backup.",
                    self.path.display(),
                    e
                );
                let backup = Self::backup_path(&self.path);
                match Self::read(&backup).await {
                    Ok(entries) => {
                        tracing::info!("Recovered SPF cache from backup: {} labels", entries.len());
                        entries
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "SPF cache backup unusable: {}. Starting with empty cache.",
                            backup_err
                        );
                        Entries::new()
                    }
                }
            }
            Err(e) => return Err(e),
        };
        let count = entries.len();
        cache.extend(entries).await;
        tracing::debug!("Loaded {} labels from {}", count, self.path.display());
        Ok(count)
    }

    async fn read(path: &Path) -> Result<Entries> {
        if !path.exists() {
            tracing::debug!("SPF cache file does not exist: {}", path.display());
            return Ok(Entries::new());
        }
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!("Failed to read SPF cache {}: {}", path.display(), e))
        })?;
        let file: CacheFileFormat = serde_json::from_str(&content)?;
        if file.version != CACHE_FILE_VERSION {
            tracing::warn!(
                "SPF cache version mismatch: expected {}, got {}. Attempting to load anyway.",
                CACHE_FILE_VERSION,
                file.version
            );
        }
        Ok(file.entries)
    }

    /// Write the whole cache atomically.
    pub async fn save(&self, cache: &TxtCache) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = CacheFileFormat {
            version: CACHE_FILE_VERSION.to_string(),
            saved_at: Some(Utc::now()),
            entries: cache.snapshot().await,
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.write_all(json.as_bytes()).await?;
            out.flush().await?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to back up SPF cache: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::config(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;
        tracing::debug!("SPF cache written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}
