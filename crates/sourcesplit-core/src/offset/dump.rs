use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::memory::{ModuleImage, ReadMemory};
use crate::offset::GameOffsets;

/// Offset dump for diagnostic purposes
#[derive(Debug, Clone, Serialize)]
pub struct OffsetDump {
    pub version: String,
    pub modules: Vec<ModuleImage>,
    pub variant: String,
    /// Engine pointers in hex, "(unresolved)" when missing
    pub pointers: BTreeMap<&'static str, String>,
    /// Entity member offsets in hex
    pub members: BTreeMap<&'static str, String>,
    /// First 16 bytes at each resolved pointer
    pub memory_samples: BTreeMap<&'static str, String>,
}

impl OffsetDump {
    pub fn from_offsets<R: ReadMemory + ?Sized>(
        offsets: &GameOffsets,
        modules: &[ModuleImage],
        reader: &R,
    ) -> Self {
        let pointers_raw = [
            ("cur_time", offsets.cur_time),
            ("sign_on_state", offsets.sign_on_state),
            ("cur_map", offsets.cur_map),
            ("game_dir", offsets.game_dir),
            ("host_state", offsets.host_state),
            ("server_state", offsets.server_state),
            ("global_entity_list", offsets.global_entity_list),
            ("current_ent_count", offsets.current_ent_count),
            ("event_queue", offsets.event_queue),
            ("fade_list", offsets.fade_list),
        ];

        let members_raw = [
            ("m_fFlags", offsets.entity.flags),
            ("m_vecAbsOrigin", offsets.entity.abs_origin),
            ("m_iName", offsets.entity.target_name),
            ("m_hMoveParent", offsets.entity.parent_handle),
            ("m_hViewEntity", offsets.entity.view_entity),
        ];

        let pointers = pointers_raw
            .iter()
            .map(|(name, value)| (*name, Self::format_optional(*value)))
            .collect();
        let members = members_raw
            .iter()
            .map(|(name, value)| (*name, Self::format_optional(*value)))
            .collect();
        let memory_samples = pointers_raw
            .iter()
            .filter_map(|(name, value)| value.map(|addr| (*name, Self::read_memory_hex(reader, addr, 16))))
            .collect();

        Self {
            version: offsets.version.clone(),
            modules: modules.to_vec(),
            variant: format!(
                "record={}, table={}, source2003={}",
                offsets.variant.record, offsets.variant.table, offsets.variant.source2003
            ),
            pointers,
            members,
            memory_samples,
        }
    }

    fn format_optional(value: Option<u64>) -> String {
        match value {
            Some(v) => format!("0x{:X}", v),
            None => "(unresolved)".to_string(),
        }
    }

    fn read_memory_hex<R: ReadMemory + ?Sized>(reader: &R, address: u64, size: usize) -> String {
        match reader.read_bytes(address, size) {
            Ok(bytes) => bytes
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" "),
            Err(_) => "(read failed)".to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save dump to JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockMemoryBuilder;

    #[test]
    fn test_dump_formats_resolved_and_missing() {
        let reader = MockMemoryBuilder::new()
            .write_bytes(0x1000, &[0xAA; 16])
            .build();
        let offsets = GameOffsets {
            cur_time: Some(0x1000),
            event_queue: Some(0x9000),
            ..Default::default()
        };

        let dump = OffsetDump::from_offsets(&offsets, &[], &reader);
        assert_eq!(dump.pointers["cur_time"], "0x1000");
        assert_eq!(dump.pointers["fade_list"], "(unresolved)");
        assert!(dump.memory_samples["cur_time"].starts_with("AA AA"));
        assert_eq!(dump.memory_samples["event_queue"], "(read failed)");
        assert!(!dump.memory_samples.contains_key("cur_map"));
    }
}
