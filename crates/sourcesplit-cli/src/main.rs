use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod input;
mod shutdown;

#[derive(Parser)]
#[command(name = "sourcesplit")]
#[command(about = "Autosplitter for Source engine games", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Attach to the game and report splits (default)
    Run(RunArgs),

    /// Attach once and print the resolved offset table as JSON
    Offsets {
        #[command(flatten)]
        attach: AttachArgs,

        /// Write the dump to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print every match of an ad-hoc signature inside a module
    Scan {
        /// Module to scan, e.g. server.dll
        module: String,

        /// Space-separated hex bytes, `??` for a wildcard
        pattern: String,

        #[command(flatten)]
        attach: AttachArgs,
    },
}

#[derive(clap::Args, Default)]
struct AttachArgs {
    /// Config file (JSON)
    #[arg(short, long, default_value = sourcesplit_core::config::CONFIG_FILE)]
    config: PathBuf,

    /// Signature file overriding the built-in set
    #[arg(short, long)]
    signatures: Option<PathBuf>,

    /// Process name overriding the configured ones
    #[arg(short, long)]
    process: Option<String>,
}

#[derive(clap::Args)]
struct RunArgs {
    #[command(flatten)]
    attach: AttachArgs,

    /// Print splits as JSON lines
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sourcesplit=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Command::Run(args)) => commands::run::run(&args.attach.into(), args.json),
        None => commands::run::run(&AttachArgs::bare().into(), false),
        Some(Command::Offsets { attach, output }) => {
            commands::offsets::run(&attach.into(), output.as_deref())
        }
        Some(Command::Scan {
            module,
            pattern,
            attach,
        }) => commands::scan::run(&attach.into(), &module, &pattern),
    }
}

impl AttachArgs {
    /// Defaults for a bare `sourcesplit` invocation
    fn bare() -> Self {
        Self {
            config: PathBuf::from(sourcesplit_core::config::CONFIG_FILE),
            ..Self::default()
        }
    }
}

impl From<AttachArgs> for commands::AttachOptions {
    fn from(args: AttachArgs) -> Self {
        Self {
            config_path: args.config,
            signatures_path: args.signatures,
            process: args.process,
        }
    }
}
