//! Driver configuration
//!
//! Read from a JSON file. Every field is optional; a missing file means
//! all defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::memory::DEFAULT_PROCESS_NAMES;
use crate::memory::layout::timing;
use crate::offset::CACHE_FILE;

pub const CONFIG_FILE: &str = "sourcesplit.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poll_interval_ms: u64,
    /// Executable names to attach to, in priority order
    pub process_names: Vec<String>,
    /// Signature set to use instead of the built-in one
    pub signatures_path: Option<PathBuf>,
    /// Offset cache location; `None` disables caching
    pub cache_path: Option<PathBuf>,
    /// Feature flags applied after attach, e.g. `{"xenstart": true}`
    pub initial_flags: BTreeMap<String, bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: timing::POLL_INTERVAL_MS,
            process_names: DEFAULT_PROCESS_NAMES.iter().map(|s| s.to_string()).collect(),
            signatures_path: None,
            cache_path: Some(PathBuf::from(CACHE_FILE)),
            initial_flags: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Config = serde_json::from_str(&content)?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Zero is bumped to 1 ms so the loop never spins
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn process_name_refs(&self) -> Vec<&str> {
        self.process_names.iter().map(String::as_str).collect()
    }
}
