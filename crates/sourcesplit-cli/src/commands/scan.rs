//! Ad-hoc signature scan command.

use anyhow::{Context, Result};
use sourcesplit_core::offset::{format_pattern, parse_pattern};
use sourcesplit_core::{MemoryReader, ModuleImage, SignatureScanner};

use super::{AttachOptions, open_process};

pub fn run(options: &AttachOptions, module_name: &str, pattern: &str) -> Result<()> {
    let pattern = parse_pattern(pattern)?;
    let config = options.load_config()?;
    let process = open_process(&config)?;
    let module = process
        .module(module_name)
        .cloned()
        .with_context(|| format!("module {} is not loaded", module_name))?;

    let reader = MemoryReader::new(&process);
    let matches = SignatureScanner::new(&reader, module.clone()).scan_all(&pattern);

    println!(
        "{}: {} match(es) in {} (base 0x{:X}, size 0x{:X})",
        format_pattern(&pattern),
        matches.len(),
        module.name,
        module.base,
        module.size
    );
    for line in format_matches(&module, &matches) {
        println!("{}", line);
    }
    Ok(())
}

fn format_matches(module: &ModuleImage, matches: &[u64]) -> Vec<String> {
    matches
        .iter()
        .map(|&addr| format!("  0x{:08X}  {}+0x{:X}", addr, module.name, addr - module.base))
        .collect()
}
