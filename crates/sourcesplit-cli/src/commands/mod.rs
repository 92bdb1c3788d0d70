//! CLI command implementations.
//!
//! Shared attach plumbing lives here; each subcommand has its own module.

pub mod offsets;
pub mod run;
pub mod scan;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use sourcesplit_core::memory::layout::timing;
use sourcesplit_core::offset::{
    CLIENT_MODULE, ENGINE_MODULE, SERVER_MODULE, save_offsets_to_cache, try_load_cached_offsets,
};
use sourcesplit_core::{
    Config, GameOffsets, MemoryReader, OffsetResolver, OffsetSignatureSet, ProcessHandle,
    builtin_signatures, load_signatures,
};
use tracing::{debug, info, warn};

use crate::shutdown::ShutdownSignal;

/// Options shared by every subcommand that attaches to the game
#[derive(Debug, Clone)]
pub struct AttachOptions {
    pub config_path: PathBuf,
    pub signatures_path: Option<PathBuf>,
    pub process: Option<String>,
}

impl AttachOptions {
    /// Config file merged with command-line overrides
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(&self.config_path)
            .with_context(|| format!("loading {}", self.config_path.display()))?;
        if let Some(path) = &self.signatures_path {
            config.signatures_path = Some(path.clone());
        }
        if let Some(process) = &self.process {
            config.process_names = vec![process.clone()];
        }
        Ok(config)
    }
}

pub fn load_signature_set(config: &Config) -> Result<OffsetSignatureSet> {
    match &config.signatures_path {
        Some(path) => {
            let signatures = load_signatures(path)
                .with_context(|| format!("loading signatures from {}", path.display()))?;
            info!(
                "Loaded signature set {} ({} entries)",
                signatures.version,
                signatures.entries.len()
            );
            Ok(signatures)
        }
        None => Ok(builtin_signatures()),
    }
}

/// Open the game once, without waiting
pub fn open_process(config: &Config) -> Result<ProcessHandle> {
    let mut process = ProcessHandle::find_and_open(&config.process_name_refs())
        .with_context(|| format!("no running process among {:?}", config.process_names))?;
    process.refresh_modules()?;
    Ok(process)
}

/// Wait until the game runs and its engine modules are loaded.
///
/// Returns `None` when shutdown was requested while waiting.
pub fn wait_for_process(config: &Config, shutdown: &ShutdownSignal) -> Option<ProcessHandle> {
    let retry = Duration::from_millis(timing::ATTACH_RETRY_MS);
    let names = config.process_name_refs();

    while !shutdown.is_shutdown() {
        match ProcessHandle::find_and_open(&names) {
            Ok(mut process) => loop {
                if has_engine_modules(&process) {
                    info!("Found {} (pid {})", process.name, process.pid);
                    return Some(process);
                }
                debug!("Engine modules not loaded yet");
                if shutdown.wait(retry) || !process.is_alive() {
                    break;
                }
                if let Err(e) = process.refresh_modules() {
                    debug!("Module refresh failed: {}", e);
                }
            },
            Err(e) => debug!("Process not found: {}", e),
        }
        if shutdown.wait(retry) {
            break;
        }
    }
    None
}

fn has_engine_modules(process: &ProcessHandle) -> bool {
    [ENGINE_MODULE, SERVER_MODULE]
        .iter()
        .all(|name| process.module(name).is_some())
}

/// Resolve offsets, reusing the cache when it matches the loaded build
pub fn resolve_offsets(
    process: &ProcessHandle,
    reader: &MemoryReader<'_>,
    config: &Config,
    signatures: &OffsetSignatureSet,
) -> GameOffsets {
    let resolver = OffsetResolver::new(reader, &process.modules, signatures);
    let fingerprint = resolver.module_fingerprint();
    debug!("Module fingerprint: {}", fingerprint);

    if let Some(path) = &config.cache_path
        && let Some(offsets) = try_load_cached_offsets(path, &fingerprint)
        && offsets.version == signatures.version
    {
        return offsets;
    }

    if process.module(CLIENT_MODULE).is_none() {
        warn!("{} not loaded, fade detection unavailable", CLIENT_MODULE);
    }

    let offsets = resolver.resolve();
    if let Some(path) = &config.cache_path
        && offsets.is_valid()
    {
        save_offsets_to_cache(path, &fingerprint, &offsets);
    }
    offsets
}
