//! Key-value cache used for chat/embedding results and health probes.
//!
//! The client depends only on the `CacheStore` trait. Two stores ship with
//! the crate: a process-local `MemoryCache` and a `FileCache` that writes one
//! JSON file per entry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::config::{CacheDriver, LmStudioConfig};
use super::errors::LmStudioError;

/// Prefix shared by every key the client writes.
pub const KEY_PREFIX: &str = "lmstudio";

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A TTL-aware key-value store holding JSON values.
///
/// Implementations must treat expired entries as absent. There is no
/// locking across a `get`/`put` pair; concurrent writers of the same key
/// simply overwrite each other.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, LmStudioError>;

    fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), LmStudioError>;

    fn has(&self, key: &str) -> Result<bool, LmStudioError> {
        Ok(self.get(key)?.is_some())
    }

    fn forget(&self, key: &str) -> Result<(), LmStudioError>;
}

/// Build a content-addressed key: `lmstudio:<kind>:<sha256(content + options)>`.
pub fn cache_key(kind: &str, content: &str, options_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(options_json.as_bytes());
    format!("{KEY_PREFIX}:{kind}:{:x}", hasher.finalize())
}

/// The store selected by `cache.driver`.
pub fn store_for(config: &LmStudioConfig) -> Arc<dyn CacheStore> {
    match config.cache.driver {
        CacheDriver::Memory => Arc::new(MemoryCache::new()),
        CacheDriver::File => Arc::new(FileCache::new(default_cache_dir())),
    }
}

/// Platform cache directory for the file store (`~/.cache/lmstudio` on Linux).
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("lmstudio")
}

// ─── MemoryCache ─────────────────────────────────────────────────────────────

/// Expiry instant (`None` = never) and the stored value.
type MemoryEntry = (Option<Instant>, Value);

/// Mutex-guarded in-process map with per-entry expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryEntry>>, LmStudioError> {
        self.entries.lock().map_err(|e| LmStudioError::Cache {
            reason: format!("lock poisoned: {e}"),
        })
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Value>, LmStudioError> {
        let mut entries = self.lock()?;
        let stale = match entries.get(key) {
            Some((expires_at, value)) if expires_at.map_or(true, |at| at > Instant::now()) => {
                return Ok(Some(value.clone()))
            }
            Some(_) => true,
            None => false,
        };
        if stale {
            entries.remove(key);
        }
        Ok(None)
    }

    fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), LmStudioError> {
        // A TTL past the clock's range never expires
        let expires_at = Instant::now().checked_add(ttl);
        self.lock()?.insert(key.to_string(), (expires_at, value));
        Ok(())
    }

    fn forget(&self, key: &str) -> Result<(), LmStudioError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

// ─── FileCache ───────────────────────────────────────────────────────────────

/// On-disk envelope for a cached value.
#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    /// Unix timestamp (seconds) after which the entry is stale.
    expires_at: i64,
    value: Value,
}

/// One JSON file per key, named by the SHA-256 of the key.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{:x}.json", Sha256::digest(key.as_bytes())))
    }
}

impl CacheStore for FileCache {
    fn get(&self, key: &str) -> Result<Option<Value>, LmStudioError> {
        let path = self.path_for(key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LmStudioError::Cache {
                    reason: format!("failed to read {}: {e}", path.display()),
                })
            }
        };

        // A corrupt entry is treated as a miss and dropped.
        let entry: FileEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable cache entry");
                let _ = std::fs::remove_file(&path);
                return Ok(None);
            }
        };

        if entry.expires_at <= chrono::Utc::now().timestamp() {
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), LmStudioError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| LmStudioError::Cache {
            reason: format!("failed to create {}: {e}", self.dir.display()),
        })?;

        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let entry = FileEntry {
            expires_at: chrono::Utc::now().timestamp().saturating_add(ttl_secs),
            value,
        };
        let json = serde_json::to_string(&entry).map_err(|e| LmStudioError::Cache {
            reason: format!("failed to serialize entry: {e}"),
        })?;

        let path = self.path_for(key);
        std::fs::write(&path, json).map_err(|e| LmStudioError::Cache {
            reason: format!("failed to write {}: {e}", path.display()),
        })
    }

    fn forget(&self, key: &str) -> Result<(), LmStudioError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LmStudioError::Cache {
                reason: format!("failed to remove entry: {e}"),
            }),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
