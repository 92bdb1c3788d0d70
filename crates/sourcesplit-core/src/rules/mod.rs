//! Split classification
//!
//! Each supported game implements [`GameSupport`]. The [`SplitEngine`] drives
//! it once per poll with a [`GameContext`] holding the reader, the resolved
//! offsets and the fresh snapshot, and applies the session latch to whatever
//! the game reports.

mod check;
mod commands;
mod engine;
pub mod games;
mod registry;

use serde::{Deserialize, Serialize};
use strum::Display;

pub use check::*;
pub use commands::*;
pub use engine::*;
pub use registry::*;

use crate::entity::EntityDirectory;
use crate::error::Result;
use crate::memory::{ModuleImage, ReadMemory, find_module};
use crate::offset::{GameOffsets, SERVER_MODULE, datamap_member_offset};
use crate::queue::{EventQueue, FadeList};
use crate::state::{GameState, RequiredProperties};

/// What the external timer should do this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum SplitOutcome {
    #[default]
    NoAction,
    /// Start the timer
    PlayerGainedControl,
    /// Split or end the timer
    PlayerLostControl,
}

/// Outcome of one rule evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuleResult {
    pub outcome: SplitOutcome,
    /// Suppress every later outcome until the next session start
    pub latch: bool,
}

impl RuleResult {
    pub const NONE: Self = Self {
        outcome: SplitOutcome::NoAction,
        latch: false,
    };

    pub fn gained() -> Self {
        Self {
            outcome: SplitOutcome::PlayerGainedControl,
            latch: false,
        }
    }

    pub fn lost() -> Self {
        Self {
            outcome: SplitOutcome::PlayerLostControl,
            latch: false,
        }
    }

    pub fn latched(mut self) -> Self {
        self.latch = true;
        self
    }

    pub fn is_action(&self) -> bool {
        self.outcome != SplitOutcome::NoAction
    }
}

/// Static description of a supported game
#[derive(Debug, Clone, Default)]
pub struct GameProfile {
    pub name: &'static str,
    /// Game directory names that identify the game, lowercase
    pub game_dirs: &'static [&'static str],
    pub first_maps: &'static [&'static str],
    pub last_map: Option<&'static str>,
    /// Maps that start the timer as soon as a session begins on them
    pub start_on_load_maps: &'static [&'static str],
    pub required: RequiredProperties,
}

impl GameProfile {
    pub fn is_first_map(&self, map: &str) -> bool {
        self.first_maps.contains(&map)
    }

    pub fn is_last_map(&self, map: &str) -> bool {
        self.last_map == Some(map)
    }

    pub fn starts_on_load(&self, map: &str) -> bool {
        self.start_on_load_maps.contains(&map)
    }

    pub fn matches_game_dir(&self, dir_name: &str) -> bool {
        self.game_dirs
            .iter()
            .any(|dir| dir.eq_ignore_ascii_case(dir_name))
    }
}

/// Everything a game rule may look at during one call
#[derive(Clone, Copy)]
pub struct GameContext<'a> {
    pub reader: &'a dyn ReadMemory,
    pub offsets: &'a GameOffsets,
    pub state: &'a GameState,
    pub modules: &'a [ModuleImage],
}

impl<'a> GameContext<'a> {
    pub fn entities(&self) -> EntityDirectory<'a, dyn ReadMemory + 'a> {
        EntityDirectory::new(self.reader, self.offsets)
    }

    pub fn events(&self) -> Option<EventQueue<'a, dyn ReadMemory + 'a>> {
        self.offsets
            .event_queue
            .map(|head| EventQueue::new(self.reader, head))
    }

    pub fn fades(&self) -> Option<FadeList<'a, dyn ReadMemory + 'a>> {
        self.offsets
            .fade_list
            .map(|base| FadeList::new(self.reader, base))
    }

    pub fn module(&self, name: &str) -> Option<&'a ModuleImage> {
        find_module(self.modules, name)
    }

    /// Datamap offset of a server entity member. Scans the module; call at attach.
    pub fn server_member_offset(&self, field: &str) -> Option<u64> {
        let server = self.module(SERVER_MODULE)?;
        datamap_member_offset(self.reader, server, field)
    }

    pub fn map(&self) -> &'a str {
        &self.state.current_map
    }
}

/// One game's split logic
pub trait GameSupport {
    fn profile(&self) -> &GameProfile;

    /// Once per attach, after offsets are resolved
    fn on_attach(&mut self, _ctx: &GameContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Cache entity lookups for the new session
    fn on_session_start(&mut self, ctx: &GameContext<'_>) -> Result<()>;

    fn on_update(&mut self, ctx: &GameContext<'_>) -> Result<RuleResult>;

    fn on_timer_reset(&mut self) {}

    /// Runtime toggles, for games that have any
    fn features_mut(&mut self) -> Option<&mut FeatureFlags> {
        None
    }
}
