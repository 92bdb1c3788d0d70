use serde::{Deserialize, Serialize};
use strum::Display;

use crate::memory::layout::{entity, globals, host_state, POINTER_SIZE};

/// Size of one `CEntInfo` record in the global entity list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum EntRecordLayout {
    /// Entity pointer, serial and links only
    #[default]
    Legacy,
    /// Adds cached target and class name pointers
    Modern,
}

impl EntRecordLayout {
    pub fn size(self) -> u64 {
        match self {
            Self::Legacy => entity::INFO_SIZE_LEGACY,
            Self::Modern => entity::INFO_SIZE_MODERN,
        }
    }
}

/// How the entity table is walked when scanning every entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum EntityTableKind {
    /// Index through the flat record array up to the live entity count
    #[default]
    Array,
    /// Follow the records' forward links from slot 0
    Linked,
}

/// Engine build traits that change structure layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineVariant {
    pub record: EntRecordLayout,
    pub table: EntityTableKind,
    /// 2003 leak branch (different host-state layout)
    pub source2003: bool,
    pub ehandle_mask: u32,
}

impl Default for EngineVariant {
    fn default() -> Self {
        Self {
            record: EntRecordLayout::Legacy,
            table: EntityTableKind::Array,
            source2003: false,
            ehandle_mask: entity::EHANDLE_INDEX_MASK_LEGACY,
        }
    }
}

/// Byte offsets of `CBaseEntity` members
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMemberOffsets {
    pub flags: Option<u64>,
    pub abs_origin: Option<u64>,
    pub target_name: Option<u64>,
    pub parent_handle: Option<u64>,
    pub view_entity: Option<u64>,
}

impl EntityMemberOffsets {
    /// `m_iEFlags` sits right before `m_fFlags`
    pub fn eflags(&self) -> Option<u64> {
        self.flags.and_then(|flags| flags.checked_sub(4))
    }
}

/// Addresses and member offsets resolved at attach.
///
/// `None` marks an entry that could not be resolved; only the features that
/// depend on it are disabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameOffsets {
    pub version: String,
    pub cur_time: Option<u64>,
    pub sign_on_state: Option<u64>,
    pub cur_map: Option<u64>,
    pub game_dir: Option<u64>,
    pub host_state: Option<u64>,
    pub server_state: Option<u64>,
    pub global_entity_list: Option<u64>,
    pub current_ent_count: Option<u64>,
    pub event_queue: Option<u64>,
    pub fade_list: Option<u64>,
    pub variant: EngineVariant,
    pub entity: EntityMemberOffsets,
}

impl GameOffsets {
    /// Minimum set needed to tick the session snapshot
    pub fn is_valid(&self) -> bool {
        self.cur_time.is_some() && self.sign_on_state.is_some() && self.cur_map.is_some()
    }

    pub fn frame_time(&self) -> Option<u64> {
        self.cur_time.map(|addr| addr + globals::FRAME_TIME)
    }

    pub fn tick_count(&self) -> Option<u64> {
        self.cur_time.map(|addr| addr + globals::TICK_COUNT)
    }

    pub fn interval_per_tick(&self) -> Option<u64> {
        self.cur_time.map(|addr| addr + globals::INTERVAL_PER_TICK)
    }

    /// Only valid while the host state is NewGame, ChangeLevelSP or ChangeLevelMP
    pub fn host_state_level_name(&self) -> Option<u64> {
        let words = if self.variant.source2003 {
            host_state::LEVEL_NAME_WORDS_LEGACY
        } else {
            host_state::LEVEL_NAME_WORDS_MODERN
        };
        self.host_state.map(|addr| addr + POINTER_SIZE * words)
    }

    /// Names of unresolved engine pointers, for logging
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("curTime", self.cur_time),
            ("signOnState", self.sign_on_state),
            ("curMap", self.cur_map),
            ("gameDir", self.game_dir),
            ("hostState", self.host_state),
            ("serverState", self.server_state),
            ("globalEntityList", self.global_entity_list),
            ("currentEntCount", self.current_ent_count),
            ("eventQueue", self.event_queue),
            ("fadeList", self.fade_list),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_global_addresses() {
        let offsets = GameOffsets {
            cur_time: Some(0x1000),
            ..Default::default()
        };
        assert_eq!(offsets.frame_time(), Some(0x1004));
        assert_eq!(offsets.tick_count(), Some(0x100C));
        assert_eq!(offsets.interval_per_tick(), Some(0x1010));
        assert_eq!(GameOffsets::default().tick_count(), None);
    }

    #[test]
    fn test_host_state_level_name_by_branch() {
        let mut offsets = GameOffsets {
            host_state: Some(0x2000),
            ..Default::default()
        };
        assert_eq!(offsets.host_state_level_name(), Some(0x2020));
        offsets.variant.source2003 = true;
        assert_eq!(offsets.host_state_level_name(), Some(0x2008));
    }

    #[test]
    fn test_validity_and_missing() {
        let mut offsets = GameOffsets::default();
        assert!(!offsets.is_valid());
        assert_eq!(offsets.missing().len(), 10);

        offsets.cur_time = Some(1);
        offsets.sign_on_state = Some(2);
        offsets.cur_map = Some(3);
        assert!(offsets.is_valid());
        assert!(!offsets.missing().contains(&"curMap"));
    }

    #[test]
    fn test_eflags_offset() {
        let members = EntityMemberOffsets {
            flags: Some(0x2BC),
            ..Default::default()
        };
        assert_eq!(members.eflags(), Some(0x2B8));
        assert_eq!(EntityMemberOffsets::default().eflags(), None);
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(EntRecordLayout::Legacy.size(), 16);
        assert_eq!(EntRecordLayout::Modern.size(), 24);
    }
}
