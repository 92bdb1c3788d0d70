use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// A byte pattern plus the rule that turns its match site into a target address.
///
/// The match site is rarely the address itself: usually an absolute operand
/// sits `offset` bytes into the matched instruction and has to be dereferenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSignature {
    pub pattern: String,
    /// Signed displacement from the first matched byte
    #[serde(default)]
    pub offset: i64,
    /// Read a pointer at `match + offset`
    #[serde(default)]
    pub deref: bool,
    /// Added after the optional dereference
    #[serde(default)]
    pub addend: i64,
}

impl CodeSignature {
    pub fn new(pattern: &str, offset: i64) -> Self {
        Self {
            pattern: pattern.to_string(),
            offset,
            deref: false,
            addend: 0,
        }
    }

    /// Signature whose operand is an absolute pointer to the target
    pub fn deref(pattern: &str, offset: i64) -> Self {
        Self {
            deref: true,
            ..Self::new(pattern, offset)
        }
    }

    pub fn with_addend(mut self, addend: i64) -> Self {
        self.addend = addend;
        self
    }

    pub fn pattern_bytes(&self) -> Result<Vec<Option<u8>>> {
        parse_pattern(&self.pattern)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetSignatureEntry {
    pub name: String,
    /// Module the pattern lives in
    pub module: String,
    /// Alternatives for different binary builds, tried in order
    pub signatures: Vec<CodeSignature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetSignatureSet {
    pub version: String,
    pub entries: Vec<OffsetSignatureEntry>,
}

impl OffsetSignatureSet {
    pub fn entry(&self, name: &str) -> Option<&OffsetSignatureEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }
}

pub fn load_signatures<P: AsRef<Path>>(path: P) -> Result<OffsetSignatureSet> {
    let content = fs::read_to_string(&path)?;
    let data = serde_json::from_str(&content)?;
    Ok(data)
}

pub fn save_signatures<P: AsRef<Path>>(path: P, signatures: &OffsetSignatureSet) -> Result<()> {
    let content = serde_json::to_string_pretty(signatures)?;
    fs::write(path, content)?;
    Ok(())
}

pub fn parse_pattern(pattern: &str) -> Result<Vec<Option<u8>>> {
    let mut bytes = Vec::new();
    for token in pattern.split_whitespace() {
        if token == "??" || token == "?" {
            bytes.push(None);
            continue;
        }

        let value = u8::from_str_radix(token, 16).map_err(|e| {
            Error::InvalidSignature(format!("Invalid signature token '{}': {}", token, e))
        })?;
        bytes.push(Some(value));
    }

    if bytes.is_empty() {
        return Err(Error::InvalidSignature(
            "Signature pattern is empty".to_string(),
        ));
    }

    Ok(bytes)
}

pub fn format_pattern(bytes: &[Option<u8>]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            Some(value) => format!("{:02X}", value),
            None => "??".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Signature names resolved at attach
pub mod names {
    pub const CUR_TIME: &str = "curTime";
    pub const SIGN_ON_STATE: &str = "signOnState";
    pub const CUR_MAP: &str = "curMap";
    pub const GAME_DIR: &str = "gameDir";
    pub const HOST_STATE: &str = "hostState";
    pub const SERVER_STATE: &str = "serverState";
    pub const GLOBAL_ENTITY_LIST: &str = "globalEntityList";
    pub const CURRENT_ENT_COUNT: &str = "currentEntCount";
    pub const EVENT_QUEUE: &str = "eventQueue";
    pub const FADE_LIST: &str = "fadeList";
}

/// Signatures for the Steam builds of the 2007-2013 engine branches
pub fn builtin_signatures() -> OffsetSignatureSet {
    let entry = |name: &str, module: &str, signatures: Vec<CodeSignature>| OffsetSignatureEntry {
        name: name.to_string(),
        module: module.to_string(),
        signatures,
    };

    OffsetSignatureSet {
        version: "builtin".to_string(),
        entries: vec![
            // CGlobalVarsBase::curtime
            entry(
                names::CUR_TIME,
                "engine.dll",
                vec![
                    CodeSignature::deref("A3 ?? ?? ?? ?? 89 0D ?? ?? ?? ?? A1 ?? ?? ?? ?? 3B C6", 12),
                    CodeSignature::deref("D9 1D ?? ?? ?? ?? 8B 4E ?? 8B 11 FF 52 ?? D9 1D", 2),
                ],
            ),
            // CBaseClientState::m_nSignonState
            entry(
                names::SIGN_ON_STATE,
                "engine.dll",
                vec![
                    CodeSignature::deref("74 ?? 8B 74 87 04 83 7E 18 00 74 2D 8B 0D ?? ?? ?? ?? 8B 49 18", 14)
                        .with_addend(0x70),
                    CodeSignature::deref("83 3D ?? ?? ?? ?? 02 7C ?? 8B 0D ?? ?? ?? ?? 8B 01", 2),
                ],
            ),
            // CBaseServer::m_szMapname
            entry(
                names::CUR_MAP,
                "engine.dll",
                vec![
                    CodeSignature::deref("68 ?? ?? ?? ?? 8D 4C 24 ?? 51 E8 ?? ?? ?? ?? 83 C4 08 85 C0", 1),
                    CodeSignature::deref("68 ?? ?? ?? ?? 8D 45 ?? 50 E8 ?? ?? ?? ?? 83 C4 08 85 C0", 1),
                ],
            ),
            entry(
                names::GAME_DIR,
                "engine.dll",
                vec![CodeSignature::deref(
                    "68 ?? ?? ?? ?? 8D 85 ?? ?? ?? ?? 50 68 ?? ?? ?? ?? E8 ?? ?? ?? ?? 83 C4 0C",
                    13,
                )],
            ),
            // CHostState::m_currentState
            entry(
                names::HOST_STATE,
                "engine.dll",
                vec![
                    CodeSignature::deref("C7 05 ?? ?? ?? ?? 07 00 00 00 C3", 2),
                    CodeSignature::deref("C7 05 ?? ?? ?? ?? 05 00 00 00 C3", 2),
                ],
            ),
            // CBaseServer::m_State
            entry(
                names::SERVER_STATE,
                "engine.dll",
                vec![CodeSignature::deref("83 F8 01 0F 8C ?? ?? ?? ?? 3D 00 02 00 00 0F 8F ?? ?? ?? ?? 83 3D ?? ?? ?? ?? 02", 22)],
            ),
            // CGlobalEntityList::m_EntPtrArray
            entry(
                names::GLOBAL_ENTITY_LIST,
                "server.dll",
                vec![
                    CodeSignature::deref("6A 00 68 ?? ?? ?? ?? B9 ?? ?? ?? ?? E8 ?? ?? ?? ?? 5E", 8),
                    CodeSignature::deref("B9 ?? ?? ?? ?? E8 ?? ?? ?? ?? 8B 5D 08 85 DB", 1),
                ],
            ),
            // CGlobalEntityList::m_iNumEnts
            entry(
                names::CURRENT_ENT_COUNT,
                "server.dll",
                vec![CodeSignature::deref("A1 ?? ?? ?? ?? 48 A3 ?? ?? ?? ?? 8B 06", 7)],
            ),
            // CEventQueue::m_Events.m_pNext
            entry(
                names::EVENT_QUEUE,
                "server.dll",
                vec![
                    CodeSignature::deref("53 8B 1D ?? ?? ?? ?? 56 85 DB 74 ?? 8B 74 24 0C", 3),
                    CodeSignature::deref("8B 1D ?? ?? ?? ?? 85 DB 74 ?? 56 8B 75 08", 2),
                ],
            ),
            // CViewEffects::m_FadeList
            entry(
                names::FADE_LIST,
                "client.dll",
                vec![CodeSignature::deref("8B 0D ?? ?? ?? ?? 8B 01 8B 40 ?? FF D0 D9 5D", 2)],
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_pattern_with_wildcards() {
        let bytes = parse_pattern("55 8B EC 8D 45 ?? 50").unwrap();
        assert_eq!(bytes.len(), 7);
        assert_eq!(bytes[0], Some(0x55));
        assert_eq!(bytes[1], Some(0x8B));
        assert_eq!(bytes[5], None);
        assert_eq!(bytes[6], Some(0x50));
    }

    #[test]
    fn test_parse_pattern_rejects_bad_tokens() {
        assert!(parse_pattern("").is_err());
        assert!(parse_pattern("55 XZ").is_err());
        assert!(parse_pattern("   ").is_err());
    }

    #[test]
    fn test_format_pattern_roundtrip() {
        let pattern = vec![Some(0x68), None, None, Some(0x04), Some(0xFF)];
        let formatted = format_pattern(&pattern);
        assert_eq!(formatted, "68 ?? ?? 04 FF");
        let parsed = parse_pattern(&formatted).unwrap();
        assert_eq!(parsed, pattern);
    }

    #[test]
    fn test_builtin_signatures_parse() {
        let set = builtin_signatures();
        for entry in &set.entries {
            assert!(!entry.signatures.is_empty(), "{} has no signatures", entry.name);
            for sig in &entry.signatures {
                assert!(sig.pattern_bytes().is_ok(), "{}: {}", entry.name, sig.pattern);
            }
        }
        assert!(set.entry("EVENTQUEUE").is_some());
    }

    #[test]
    fn test_signature_file_roundtrip() {
        let file = NamedTempFile::new().unwrap();
        let set = OffsetSignatureSet {
            version: "test".to_string(),
            entries: vec![OffsetSignatureEntry {
                name: "commandBuffer".to_string(),
                module: "server.dll".to_string(),
                signatures: vec![CodeSignature::deref("55 8B EC ?? 68", 4)],
            }],
        };
        save_signatures(file.path(), &set).unwrap();

        let loaded = load_signatures(file.path()).unwrap();
        assert_eq!(loaded.version, "test");
        let entry = loaded.entry("commandBuffer").unwrap();
        assert_eq!(entry.signatures[0], CodeSignature::deref("55 8B EC ?? 68", 4));
    }

    #[test]
    fn test_signature_defaults_when_omitted() {
        let sig: CodeSignature = serde_json::from_str(r#"{"pattern": "AA ?? BB"}"#).unwrap();
        assert_eq!(sig.offset, 0);
        assert!(!sig.deref);
        assert_eq!(sig.addend, 0);
    }
}
