//! Offset cache for faster attach
//!
//! Saves resolved offsets to a file and reuses them on later attaches,
//! skipping the module scans when the loaded build is unchanged.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::GameOffsets;

/// Default cache file name
pub const CACHE_FILE: &str = ".sourcesplit-cache.json";

/// Maximum age for cache validity (7 days)
const MAX_CACHE_AGE_SECS: u64 = 7 * 24 * 60 * 60;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Cached offset data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetCache {
    /// Module bases and sizes of the process the offsets were resolved in
    pub fingerprint: String,
    pub offsets: GameOffsets,
    /// Cache creation timestamp (Unix seconds)
    pub created_at: u64,
}

impl OffsetCache {
    pub fn new(fingerprint: String, offsets: GameOffsets) -> Self {
        Self {
            fingerprint,
            offsets,
            created_at: now_secs(),
        }
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                debug!("Cache file not found or unreadable: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<OffsetCache>(&content) {
            Ok(cache) => {
                debug!(
                    "Loaded cache: fingerprint={}, created_at={}",
                    cache.fingerprint, cache.created_at
                );
                Some(cache)
            }
            Err(e) => {
                warn!("Failed to parse cache file: {}", e);
                None
            }
        }
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(&path, content)?;
        info!("Saved offset cache to {}", path.as_ref().display());
        Ok(())
    }

    /// Check if the cache was written for the build identified by `fingerprint`
    pub fn is_valid_for(&self, fingerprint: &str) -> bool {
        if self.fingerprint != fingerprint {
            debug!(
                "Cache fingerprint mismatch: cached={}, current={}",
                self.fingerprint, fingerprint
            );
            return false;
        }

        let age = now_secs().saturating_sub(self.created_at);
        if age > MAX_CACHE_AGE_SECS {
            debug!("Cache expired: age={} seconds", age);
            return false;
        }

        if !self.offsets.is_valid() {
            debug!("Cached offsets are incomplete");
            return false;
        }

        true
    }
}

/// Try to load cached offsets if valid for the given build
pub fn try_load_cached_offsets<P: AsRef<Path>>(path: P, fingerprint: &str) -> Option<GameOffsets> {
    let cache = OffsetCache::load_from_path(path)?;

    if cache.is_valid_for(fingerprint) {
        info!(
            "Using cached offsets (build: {}, age: {}s)",
            cache.fingerprint,
            now_secs().saturating_sub(cache.created_at)
        );
        Some(cache.offsets)
    } else {
        None
    }
}

/// Save offsets to cache; failures are only logged
pub fn save_offsets_to_cache<P: AsRef<Path>>(path: P, fingerprint: &str, offsets: &GameOffsets) {
    let cache = OffsetCache::new(fingerprint.to_string(), offsets.clone());
    if let Err(e) = cache.save_to_path(path) {
        warn!("Failed to save offset cache: {}", e);
    }
}
