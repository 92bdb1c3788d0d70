//! # sourcesplit-core
//!
//! Core library of the sourcesplit autosplitter for Source engine games.
//!
//! This crate provides:
//! - Read-only access to the game process memory (Windows)
//! - Offset resolution via signature scanning and datamap lookups
//! - Entity table, pending I/O event and screen fade parsers
//! - A per-tick game snapshot and the split-rule engine driving per-game rule sets
//!
//! ## Feature Flags
//!
//! - `debug-tools`: Enables the offset dump used by the CLI diagnostics.
//!   This feature is intended for CLI tools and development, not production use.

pub mod config;
pub mod entity;
pub mod error;
pub mod memory;
pub mod offset;
pub mod queue;
pub mod rules;
pub mod state;
pub mod watcher;

pub use config::Config;
pub use entity::{EntityDirectory, EntityRecord, Proximity};
pub use error::{Error, Result};
pub use memory::{
    DEFAULT_PROCESS_NAMES, MemoryReader, ModuleImage, ProcessHandle, ReadMemory, ReadValueExt,
    RemoteValue, Vector3f,
};
pub use offset::{
    CodeSignature, GameOffsets, OffsetResolver, OffsetSignatureEntry, OffsetSignatureSet,
    SignatureScanner, builtin_signatures, load_signatures, save_signatures,
};
pub use queue::{EventQuery, EventQueue, FadeList, FadeQuery, TextMatch};
pub use rules::{
    EnginePhase, FeatureFlags, GameContext, GameProfile, GameSupport, RuleResult, SplitEngine,
    SplitOutcome, detect, supported_games,
};
pub use state::{GameState, HostState, ServerState, SignOnState};
pub use watcher::{StringWatcher, Watcher};

#[cfg(feature = "debug-tools")]
pub use offset::OffsetDump;
