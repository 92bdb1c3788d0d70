//! Entity directory over the server's global entity list
//!
//! Slot lookups are cheap. Name and position searches walk the whole table
//! and take a few milliseconds, so callers run them at session start and keep
//! the result for the rest of the session.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::memory::layout::entity;
use crate::memory::{LeBytes, ReadMemory, ReadValueExt, RemoteValue, Vector3f};
use crate::offset::{EntRecordLayout, EntityTableKind, GameOffsets};

/// Hard upper bound on table slots, whatever the live count claims
const MAX_ENTITY_SLOTS: usize = 8192;

/// One `CEntInfo` record (modern shape)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntInfo {
    pub entity_ptr: u64,
    pub serial_number: i32,
    pub prev: u64,
    pub next: u64,
    pub target_name: u64,
    pub class_name: u64,
}

impl RemoteValue for EntInfo {
    const SIZE: usize = entity::INFO_SIZE_MODERN as usize;

    fn decode(bytes: &[u8]) -> Self {
        let legacy = LegacyEntInfo::decode(bytes);
        let mut cursor = LeBytes::at(bytes, entity::TARGET_NAME as usize);
        Self {
            target_name: u64::from(cursor.u32()),
            class_name: u64::from(cursor.u32()),
            ..legacy.into()
        }
    }
}

/// `CEntInfo` of builds without cached names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyEntInfo {
    pub entity_ptr: u64,
    pub serial_number: i32,
    pub prev: u64,
    pub next: u64,
}

impl RemoteValue for LegacyEntInfo {
    const SIZE: usize = entity::INFO_SIZE_LEGACY as usize;

    fn decode(bytes: &[u8]) -> Self {
        let mut cursor = LeBytes::new(bytes);
        Self {
            entity_ptr: u64::from(cursor.u32()),
            serial_number: cursor.i32(),
            prev: u64::from(cursor.u32()),
            next: u64::from(cursor.u32()),
        }
    }
}

impl From<LegacyEntInfo> for EntInfo {
    fn from(v1: LegacyEntInfo) -> Self {
        Self {
            entity_ptr: v1.entity_ptr,
            serial_number: v1.serial_number,
            prev: v1.prev,
            next: v1.next,
            target_name: 0,
            class_name: 0,
        }
    }
}

/// A table slot together with what could be read about its entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub index: usize,
    /// Zero for an empty slot
    pub entity_ptr: u64,
    pub serial_number: i32,
    pub name: Option<String>,
    pub position: Option<Vector3f>,
}

impl EntityRecord {
    pub fn is_empty(&self) -> bool {
        self.entity_ptr == 0
    }
}

/// How close an entity must be to match a position query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Proximity {
    /// Bit-identical origin; for props that never move
    Exact,
    /// Horizontal distance within the radius; for moving bodies
    Planar(f32),
    /// Full 3D distance within the radius; for moving bodies
    Volumetric(f32),
}

impl Proximity {
    pub fn matches(&self, candidate: &Vector3f, target: &Vector3f) -> bool {
        match *self {
            Self::Exact => candidate.bit_equals(target),
            Self::Planar(radius) => candidate.distance_xy(target) <= radius,
            Self::Volumetric(radius) => candidate.distance(target) <= radius,
        }
    }
}

pub struct EntityDirectory<'a, R: ReadMemory + ?Sized> {
    reader: &'a R,
    offsets: &'a GameOffsets,
}

impl<'a, R: ReadMemory + ?Sized> EntityDirectory<'a, R> {
    pub fn new(reader: &'a R, offsets: &'a GameOffsets) -> Self {
        Self { reader, offsets }
    }

    fn record_size(&self) -> u64 {
        self.offsets.variant.record.size()
    }

    fn read_info(&self, address: u64) -> Option<EntInfo> {
        match self.offsets.variant.record {
            EntRecordLayout::Legacy => self
                .reader
                .read_value::<LegacyEntInfo>(address)
                .ok()
                .map(EntInfo::from),
            EntRecordLayout::Modern => self.reader.read_value::<EntInfo>(address).ok(),
        }
    }

    /// Address of table slot `index`
    fn slot_address(&self, index: usize) -> Option<u64> {
        let list = self.offsets.global_entity_list?;
        Some(list + self.record_size() * index as u64)
    }

    fn index_of_slot(&self, address: u64) -> Option<usize> {
        let list = self.offsets.global_entity_list?;
        let delta = address.checked_sub(list)?;
        (delta % self.record_size() == 0).then(|| (delta / self.record_size()) as usize)
    }

    /// Raw record of slot `index`
    pub fn info_by_index(&self, index: usize) -> Option<EntInfo> {
        self.read_info(self.slot_address(index)?)
    }

    /// Slot `index` with the entity's name and position when readable
    pub fn by_index(&self, index: usize) -> Option<EntityRecord> {
        let info = self.info_by_index(index)?;
        Some(self.record_from(index, &info))
    }

    /// The local player's slot
    pub fn player(&self) -> Option<EntityRecord> {
        self.by_index(entity::PLAYER_INDEX)
    }

    fn record_from(&self, index: usize, info: &EntInfo) -> EntityRecord {
        let (name, position) = if info.entity_ptr == 0 {
            (None, None)
        } else {
            (
                self.entity_name(info.entity_ptr),
                self.entity_position(info.entity_ptr),
            )
        };

        EntityRecord {
            index,
            entity_ptr: info.entity_ptr,
            serial_number: info.serial_number,
            name,
            position,
        }
    }

    pub fn entity_name(&self, entity_ptr: u64) -> Option<String> {
        let offset = self.offsets.entity.target_name?;
        let name_ptr = self.reader.read_pointer(entity_ptr + offset).ok()?;
        if name_ptr == 0 {
            return None;
        }
        Some(self.reader.read_string(name_ptr, entity::NAME_MAX_LEN))
    }

    pub fn entity_position(&self, entity_ptr: u64) -> Option<Vector3f> {
        let offset = self.offsets.entity.abs_origin?;
        self.reader.read_value(entity_ptr + offset).ok()
    }

    pub fn position_of(&self, index: usize) -> Option<Vector3f> {
        let info = self.info_by_index(index)?;
        if info.entity_ptr == 0 {
            return None;
        }
        self.entity_position(info.entity_ptr)
    }

    /// Live entity count, or the default table size when unknown
    pub fn max_entities(&self) -> usize {
        self.offsets
            .current_ent_count
            .and_then(|addr| self.reader.read_i32(addr).ok())
            .map(|count| (count.max(0) as usize).min(MAX_ENTITY_SLOTS))
            .unwrap_or(entity::DEFAULT_MAX_ENTITIES)
    }

    /// Visit every occupied slot except the player's until `visit` returns true
    fn find_slot<F>(&self, mut visit: F) -> Option<(usize, u64)>
    where
        F: FnMut(usize, u64) -> bool,
    {
        match self.offsets.variant.table {
            EntityTableKind::Array => self.find_in_array(&mut visit),
            EntityTableKind::Linked => self.find_in_chain(&mut visit),
        }
    }

    fn find_in_array<F>(&self, visit: &mut F) -> Option<(usize, u64)>
    where
        F: FnMut(usize, u64) -> bool,
    {
        let mut max_ents = self.max_entities();
        let mut index = 0;

        while index < max_ents {
            // The count changes as entities spawn and die mid-scan
            if index % entity::COUNT_REFRESH_INTERVAL == 0 {
                max_ents = self.max_entities();
                if index >= max_ents {
                    break;
                }
            }

            if index != entity::PLAYER_INDEX
                && let Some(info) = self.info_by_index(index)
                && info.entity_ptr != 0
                && visit(index, info.entity_ptr)
            {
                return Some((index, info.entity_ptr));
            }
            index += 1;
        }

        None
    }

    fn find_in_chain<F>(&self, visit: &mut F) -> Option<(usize, u64)>
    where
        F: FnMut(usize, u64) -> bool,
    {
        let mut address = self.slot_address(0)?;

        for _ in 0..MAX_ENTITY_SLOTS {
            let info = self.read_info(address)?;
            if info.entity_ptr == 0 {
                return None;
            }

            let index = self.index_of_slot(address)?;
            if index != entity::PLAYER_INDEX && visit(index, info.entity_ptr) {
                return Some((index, info.entity_ptr));
            }

            if info.next == 0 {
                return None;
            }
            address = info.next;
        }

        debug!("Entity chain exceeded {} links, giving up", MAX_ENTITY_SLOTS);
        None
    }

    /// Slot index of the entity with target name `name`. Expensive.
    pub fn index_by_name(&self, name: &str) -> Option<usize> {
        self.offsets.entity.target_name?;
        self.find_slot(|_, ptr| self.entity_name(ptr).as_deref() == Some(name))
            .map(|(index, _)| index)
    }

    /// Entity pointer of the entity with target name `name`. Expensive.
    pub fn entity_by_name(&self, name: &str) -> Option<u64> {
        self.offsets.entity.target_name?;
        self.find_slot(|_, ptr| self.entity_name(ptr).as_deref() == Some(name))
            .map(|(_, ptr)| ptr)
    }

    /// Slot index of an entity near `point`. Never returns the player. Expensive.
    pub fn index_by_position(&self, point: Vector3f, proximity: Proximity) -> Option<usize> {
        self.offsets.entity.abs_origin?;
        self.find_slot(|_, ptr| {
            self.entity_position(ptr)
                .is_some_and(|pos| proximity.matches(&pos, &point))
        })
        .map(|(index, _)| index)
    }

    /// Slot index encoded in an EHANDLE, `None` for the invalid handle
    pub fn handle_to_index(&self, handle: u32) -> Option<usize> {
        let mask = self.offsets.variant.ehandle_mask;
        let index = handle & mask;
        (index != mask).then_some(index as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MockMemoryBuilder, MockMemoryReader};
    use crate::offset::{EngineVariant, EntityMemberOffsets};

    const LIST: u64 = 0x10_0000;
    const COUNT: u64 = 0x0F_0000;
    const ENTITIES: u64 = 0x20_0000;
    const NAMES: u64 = 0x30_0000;
    const ORIGIN: u64 = 0x100;
    const TARGET_NAME: u64 = 0x80;

    fn offsets(record: EntRecordLayout, table: EntityTableKind) -> GameOffsets {
        GameOffsets {
            global_entity_list: Some(LIST),
            current_ent_count: Some(COUNT),
            variant: EngineVariant {
                record,
                table,
                ..Default::default()
            },
            entity: EntityMemberOffsets {
                abs_origin: Some(ORIGIN),
                target_name: Some(TARGET_NAME),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Table with entities at the given slots; `None` leaves the slot empty
    fn table(
        offsets: &GameOffsets,
        slots: &[Option<(&str, Vector3f)>],
    ) -> MockMemoryReader {
        let size = offsets.variant.record.size();
        let mut mem = MockMemoryBuilder::new()
            .write_i32(COUNT, slots.len() as i32)
            .build();

        let occupied: Vec<usize> = (0..slots.len()).filter(|&i| slots[i].is_some()).collect();
        for (i, slot) in slots.iter().enumerate() {
            let record = LIST + size * i as u64;
            let entity = ENTITIES + 0x1000 * i as u64;
            mem.write_bytes(record, &vec![0u8; size as usize]);

            if let Some((name, pos)) = slot {
                mem.write_u32(record, entity as u32);
                mem.write_i32(record + 4, i as i32 + 100);
                let next = occupied
                    .iter()
                    .find(|&&j| j > i)
                    .map(|&j| LIST + size * j as u64)
                    .unwrap_or(0);
                mem.write_u32(record + entity::NEXT, next as u32);

                let name_addr = NAMES + 0x40 * i as u64;
                mem.write_str(name_addr, name);
                mem.write_u32(entity + TARGET_NAME, name_addr as u32);
                mem.write_vec3(entity + ORIGIN, *pos);
            }
        }
        mem
    }

    fn sample(offsets: &GameOffsets) -> MockMemoryReader {
        let origin = Vector3f::new(10.0, 20.0, 30.0);
        table(
            offsets,
            &[
                Some(("worldspawn", Vector3f::default())),
                Some(("player", origin)),
                None,
                Some(("bonzibutton", Vector3f::new(100.0, 0.0, 0.0))),
                Some(("twin", origin)),
            ],
        )
    }

    #[test]
    fn test_by_index_reads_slot() {
        let offsets = offsets(EntRecordLayout::Modern, EntityTableKind::Array);
        let mem = sample(&offsets);
        let dir = EntityDirectory::new(&mem, &offsets);

        let player = dir.player().unwrap();
        assert_eq!(player.index, 1);
        assert_eq!(player.entity_ptr, ENTITIES + 0x1000);
        assert_eq!(player.name.as_deref(), Some("player"));
        assert_eq!(player.serial_number, 101);

        let empty = dir.by_index(2).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.name, None);

        assert_eq!(dir.position_of(3), Some(Vector3f::new(100.0, 0.0, 0.0)));
        assert_eq!(dir.position_of(2), None);
    }

    #[test]
    fn test_legacy_records_are_widened() {
        let offsets = offsets(EntRecordLayout::Legacy, EntityTableKind::Array);
        let mem = sample(&offsets);
        let dir = EntityDirectory::new(&mem, &offsets);

        let info = dir.info_by_index(3).unwrap();
        assert_eq!(info.entity_ptr, ENTITIES + 0x3000);
        assert_eq!(info.target_name, 0);
        assert_eq!(dir.index_by_name("bonzibutton"), Some(3));
    }

    #[test]
    fn test_name_search_both_layouts() {
        for table_kind in [EntityTableKind::Array, EntityTableKind::Linked] {
            let offsets = offsets(EntRecordLayout::Modern, table_kind);
            let mem = sample(&offsets);
            let dir = EntityDirectory::new(&mem, &offsets);

            assert_eq!(dir.index_by_name("bonzibutton"), Some(3), "{}", table_kind);
            assert_eq!(dir.entity_by_name("twin"), Some(ENTITIES + 0x4000));
            assert_eq!(dir.index_by_name("missing"), None);
            // The player's slot is never a search result
            assert_eq!(dir.index_by_name("player"), None);
        }
    }

    #[test]
    fn test_position_search_excludes_player_at_zero_distance() {
        let offsets = offsets(EntRecordLayout::Modern, EntityTableKind::Array);
        let mem = sample(&offsets);
        let dir = EntityDirectory::new(&mem, &offsets);

        // Player (1) and twin (4) share the exact origin
        let origin = Vector3f::new(10.0, 20.0, 30.0);
        assert_eq!(dir.index_by_position(origin, Proximity::Exact), Some(4));
        assert_eq!(dir.index_by_position(origin, Proximity::Volumetric(0.0)), Some(4));
    }

    #[test]
    fn test_exact_and_tolerance_modes_differ() {
        let offsets = offsets(EntRecordLayout::Modern, EntityTableKind::Array);
        let mem = sample(&offsets);
        let dir = EntityDirectory::new(&mem, &offsets);

        let near_button = Vector3f::new(100.5, 0.0, 40.0);
        assert_eq!(dir.index_by_position(near_button, Proximity::Exact), None);
        assert_eq!(dir.index_by_position(near_button, Proximity::Planar(1.0)), Some(3));
        assert_eq!(dir.index_by_position(near_button, Proximity::Volumetric(1.0)), None);
    }

    #[test]
    fn test_live_count_bounds_array_scan() {
        let offsets = offsets(EntRecordLayout::Modern, EntityTableKind::Array);
        let mut mem = sample(&offsets);
        mem.write_i32(COUNT, 3);
        let dir = EntityDirectory::new(&mem, &offsets);

        assert_eq!(dir.max_entities(), 3);
        assert_eq!(dir.index_by_name("bonzibutton"), None);
    }

    #[test]
    fn test_missing_count_uses_default() {
        let mut offsets = offsets(EntRecordLayout::Modern, EntityTableKind::Array);
        offsets.current_ent_count = None;
        let mem = sample(&offsets);
        let dir = EntityDirectory::new(&mem, &offsets);
        assert_eq!(dir.max_entities(), entity::DEFAULT_MAX_ENTITIES);
        // Unreadable slots past the table end are skipped, not fatal
        assert_eq!(dir.index_by_name("twin"), Some(4));
    }

    #[test]
    fn test_searches_need_member_offsets() {
        let mut offsets = offsets(EntRecordLayout::Modern, EntityTableKind::Array);
        offsets.entity = EntityMemberOffsets::default();
        let mem = sample(&offsets);
        let dir = EntityDirectory::new(&mem, &offsets);
        assert_eq!(dir.index_by_name("twin"), None);
        assert_eq!(dir.index_by_position(Vector3f::default(), Proximity::Exact), None);
    }

    #[test]
    fn test_handle_to_index() {
        let mut offsets = offsets(EntRecordLayout::Modern, EntityTableKind::Array);
        let mem = MockMemoryBuilder::new().build();
        {
            let dir = EntityDirectory::new(&mem, &offsets);
            assert_eq!(dir.handle_to_index(0x0003_0005), Some(5));
            assert_eq!(dir.handle_to_index(0xFFFF_FFFF), None);
        }
        offsets.variant.ehandle_mask = entity::EHANDLE_INDEX_MASK_MODERN;
        let dir = EntityDirectory::new(&mem, &offsets);
        assert_eq!(dir.handle_to_index(0x0000_1005), Some(0x1005));
    }
}
