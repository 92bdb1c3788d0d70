//! One-shot resolution of every address the engine needs
//!
//! # Strategy
//!
//! Engine pointers come from code signatures (see [`builtin_signatures`]).
//! `CBaseEntity` member offsets come from the game's own datamaps: each
//! `typedescription_t` stores a pointer to the member name followed by the
//! member's byte offset, so finding the name string and then a reference to it
//! yields the offset without any per-build constants.
//!
//! ```text
//!   typedescription_t
//!   +0x0  fieldType
//!   +0x4  fieldName ──► "m_iHealth\0"
//!   +0x8  fieldOffset[0]
//! ```
//!
//! [`builtin_signatures`]: crate::offset::builtin_signatures

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::memory::layout::entity;
use crate::memory::{ModuleImage, ReadMemory, find_module};
use crate::offset::signature::names;
use crate::offset::{
    EngineVariant, EntRecordLayout, EntityMemberOffsets, EntityTableKind, GameOffsets,
    OffsetSignatureSet, SignatureScanner,
};

pub const ENGINE_MODULE: &str = "engine.dll";
pub const SERVER_MODULE: &str = "server.dll";
pub const CLIENT_MODULE: &str = "client.dll";

/// engine.dll of the 2003 leak branch is at most this large
pub const SOURCE2003_ENGINE_MAX_SIZE: u64 = 0x28_0000;
/// engine.dll builds up to this size use the 16-byte entity record
pub const LEGACY_ENGINE_MAX_SIZE: u64 = 0x3A_0000;
/// engine.dll builds from this size on use the 24-byte entity record
pub const MODERN_ENGINE_MIN_SIZE: u64 = 0x40_0000;

/// Member offsets above this are rejected as garbage
const MAX_MEMBER_OFFSET: i32 = 0x4000;

/// Distance from the name pointer to `fieldOffset[0]` in `typedescription_t`
const TYPEDESC_NAME_TO_OFFSET: u64 = 4;

/// Choose structure layouts from the engine module size.
///
/// Sizes between the legacy and modern bands match no known build; the older
/// layout is assumed there.
pub fn detect_variant(engine_size: u64) -> EngineVariant {
    if engine_size <= SOURCE2003_ENGINE_MAX_SIZE {
        return EngineVariant {
            record: EntRecordLayout::Legacy,
            table: EntityTableKind::Array,
            source2003: true,
            ehandle_mask: entity::EHANDLE_INDEX_MASK_LEGACY,
        };
    }

    if engine_size >= MODERN_ENGINE_MIN_SIZE {
        return EngineVariant {
            record: EntRecordLayout::Modern,
            table: EntityTableKind::Linked,
            source2003: false,
            ehandle_mask: entity::EHANDLE_INDEX_MASK_MODERN,
        };
    }

    if engine_size > LEGACY_ENGINE_MAX_SIZE {
        warn!(
            "engine.dll size {:#x} matches no known build, assuming the legacy entity layout",
            engine_size
        );
    }

    EngineVariant {
        record: EntRecordLayout::Legacy,
        table: EntityTableKind::Linked,
        source2003: false,
        ehandle_mask: entity::EHANDLE_INDEX_MASK_LEGACY,
    }
}

/// Byte offset of a datamap member, looked up by its name inside `module`
pub fn datamap_member_offset<R: ReadMemory + ?Sized>(
    reader: &R,
    module: &ModuleImage,
    field: &str,
) -> Option<u64> {
    let scanner = SignatureScanner::new(reader, module.clone());
    let name_addr = scanner.find_string(field)?;

    scanner
        .find_references(name_addr)
        .into_iter()
        .find_map(|reference| {
            let offset = reader
                .read_i32(reference + TYPEDESC_NAME_TO_OFFSET)
                .ok()?;
            (1..MAX_MEMBER_OFFSET)
                .contains(&offset)
                .then_some(offset as u64)
        })
}

pub struct OffsetResolver<'a, R: ReadMemory + ?Sized> {
    reader: &'a R,
    modules: &'a [ModuleImage],
    signatures: &'a OffsetSignatureSet,
}

impl<'a, R: ReadMemory + ?Sized> OffsetResolver<'a, R> {
    pub fn new(
        reader: &'a R,
        modules: &'a [ModuleImage],
        signatures: &'a OffsetSignatureSet,
    ) -> Self {
        Self {
            reader,
            modules,
            signatures,
        }
    }

    pub fn module(&self, name: &str) -> Option<&'a ModuleImage> {
        find_module(self.modules, name)
    }

    /// Resolve everything. Never fails: unresolved entries stay `None`.
    pub fn resolve(&self) -> GameOffsets {
        debug!("Resolving offsets (signature set: {})...", self.signatures.version);

        let variant = match self.module(ENGINE_MODULE) {
            Some(engine) => detect_variant(engine.size),
            None => {
                warn!("{} not loaded, assuming the legacy engine layout", ENGINE_MODULE);
                EngineVariant::default()
            }
        };
        debug!(
            "  Engine variant: record={}, table={}, source2003={}",
            variant.record, variant.table, variant.source2003
        );

        let offsets = GameOffsets {
            version: self.signatures.version.clone(),
            cur_time: self.resolve_pointer(names::CUR_TIME),
            sign_on_state: self.resolve_pointer(names::SIGN_ON_STATE),
            cur_map: self.resolve_pointer(names::CUR_MAP),
            game_dir: self.resolve_pointer(names::GAME_DIR),
            host_state: self.resolve_pointer(names::HOST_STATE),
            server_state: self.resolve_pointer(names::SERVER_STATE),
            global_entity_list: self.resolve_pointer(names::GLOBAL_ENTITY_LIST),
            current_ent_count: self.resolve_pointer(names::CURRENT_ENT_COUNT),
            event_queue: self.resolve_pointer(names::EVENT_QUEUE),
            fade_list: self.resolve_pointer(names::FADE_LIST),
            variant,
            entity: self.resolve_entity_members(),
        };

        let missing = offsets.missing();
        if missing.is_empty() {
            info!("All offsets resolved");
        } else {
            warn!(
                "Unresolved offsets (dependent features disabled): {}",
                missing.join(", ")
            );
        }

        offsets
    }

    /// Resolve one named signature entry inside its module
    pub fn resolve_pointer(&self, name: &str) -> Option<u64> {
        let Some(entry) = self.signatures.entry(name) else {
            debug!("  {}: no signature entry", name);
            return None;
        };

        let Some(module) = self.module(&entry.module) else {
            warn!("  {}: {}", name, Error::ModuleNotFound(entry.module.clone()));
            return None;
        };

        let scanner = SignatureScanner::new(self.reader, module.clone());
        let target = scanner.scan_entry(entry);
        if target.is_none() {
            warn!(
                "  {}",
                Error::SignatureNotFound(format!("{} in {}", name, entry.module))
            );
        }
        target
    }

    /// Datamap member offset looked up in `module_name`
    pub fn member_offset(&self, module_name: &str, field: &str) -> Option<u64> {
        let module = self.module(module_name)?;
        let offset = datamap_member_offset(self.reader, module, field);
        match offset {
            Some(offset) => debug!("  {}::{} = 0x{:X}", module_name, field, offset),
            None => debug!("  {}::{} not found", module_name, field),
        }
        offset
    }

    fn resolve_entity_members(&self) -> EntityMemberOffsets {
        EntityMemberOffsets {
            flags: self.member_offset(SERVER_MODULE, "m_fFlags"),
            abs_origin: self.member_offset(SERVER_MODULE, "m_vecAbsOrigin"),
            target_name: self.member_offset(SERVER_MODULE, "m_iName"),
            parent_handle: self.member_offset(SERVER_MODULE, "m_hMoveParent"),
            view_entity: self.member_offset(SERVER_MODULE, "m_hViewEntity"),
        }
    }

    /// Identifies the loaded build and its load addresses for the offset cache.
    ///
    /// Cached offsets are absolute, so a module mapped at a new base must miss.
    pub fn module_fingerprint(&self) -> String {
        [ENGINE_MODULE, SERVER_MODULE, CLIENT_MODULE]
            .iter()
            .map(|name| match self.module(name) {
                Some(module) => format!("{}@{:#x}:{:#x}", name, module.base, module.size),
                None => format!("{}:-", name),
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}
