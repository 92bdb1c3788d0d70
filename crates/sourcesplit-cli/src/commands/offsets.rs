//! Offset dump command.

use std::path::Path;

use anyhow::Result;
use sourcesplit_core::{MemoryReader, OffsetDump, OffsetResolver};
use tracing::info;

use super::{AttachOptions, load_signature_set, open_process};

/// Attach once, resolve from scratch (ignoring the cache) and dump the table
pub fn run(options: &AttachOptions, output: Option<&Path>) -> Result<()> {
    let config = options.load_config()?;
    let signatures = load_signature_set(&config)?;
    let process = open_process(&config)?;
    let reader = MemoryReader::new(&process);

    let offsets = OffsetResolver::new(&reader, &process.modules, &signatures).resolve();
    let dump = OffsetDump::from_offsets(&offsets, &process.modules, &reader);

    match output {
        Some(path) => {
            dump.save(path)?;
            info!("Offset dump written to {}", path.display());
        }
        None => println!("{}", dump.to_json()?),
    }
    Ok(())
}
