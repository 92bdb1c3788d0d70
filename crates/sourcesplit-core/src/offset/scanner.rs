//! Byte-pattern search inside a loaded module
//!
//! Scans run once per attach, so a linear byte-wise search is fine. The module
//! is read in chunks; the last `pattern.len() - 1` bytes of every chunk are
//! carried over so matches spanning a chunk boundary are still found.

use std::ops::ControlFlow;

use memchr::memmem;
use tracing::{debug, warn};

use crate::memory::{ModuleImage, ReadMemory};
use crate::offset::{CodeSignature, OffsetSignatureEntry};

/// Bytes read per request while scanning
pub const SCAN_CHUNK_SIZE: usize = 0x10000;

pub struct SignatureScanner<'a, R: ReadMemory + ?Sized> {
    reader: &'a R,
    module: ModuleImage,
}

impl<'a, R: ReadMemory + ?Sized> SignatureScanner<'a, R> {
    pub fn new(reader: &'a R, module: ModuleImage) -> Self {
        Self { reader, module }
    }

    pub fn module(&self) -> &ModuleImage {
        &self.module
    }

    /// Find the first match of `signature` and resolve it to a target address
    pub fn scan(&self, signature: &CodeSignature) -> Option<u64> {
        let pattern = match signature.pattern_bytes() {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!("Skipping signature '{}': {}", signature.pattern, e);
                return None;
            }
        };

        let match_addr = self.find_first(&pattern)?;
        self.resolve(signature, match_addr)
    }

    /// Try each alternative of an entry until one resolves
    pub fn scan_entry(&self, entry: &OffsetSignatureEntry) -> Option<u64> {
        entry.signatures.iter().find_map(|signature| {
            let target = self.scan(signature)?;
            debug!(
                "  {}: 0x{:X} (signature: {})",
                entry.name, target, signature.pattern
            );
            Some(target)
        })
    }

    /// Apply the displacement/dereference rule of `signature` to a match site
    pub fn resolve(&self, signature: &CodeSignature, match_addr: u64) -> Option<u64> {
        let mut target = match_addr.wrapping_add_signed(signature.offset);

        if signature.deref {
            target = self.reader.read_pointer(target).ok()?;
        }

        if signature.addend != 0 {
            target = target.wrapping_add_signed(signature.addend);
        }

        (target != 0).then_some(target)
    }

    pub fn find_first(&self, pattern: &[Option<u8>]) -> Option<u64> {
        let mut found = None;
        self.for_each_chunk(pattern.len().saturating_sub(1), |data, data_base| {
            match find_matches_with_wildcards(data, pattern).next() {
                Some(pos) => {
                    found = Some(data_base + pos as u64);
                    ControlFlow::Break(())
                }
                None => ControlFlow::Continue(()),
            }
        });
        found
    }

    /// Every match of `pattern` in the module
    pub fn scan_all(&self, pattern: &[Option<u8>]) -> Vec<u64> {
        let mut results = Vec::new();
        self.for_each_chunk(pattern.len().saturating_sub(1), |data, data_base| {
            results.extend(find_matches_with_wildcards(data, pattern).map(|pos| data_base + pos as u64));
            ControlFlow::Continue(())
        });
        results
    }

    /// Address of a NUL-delimited ASCII string (the byte before it must be NUL too)
    pub fn find_string(&self, text: &str) -> Option<u64> {
        let mut needle = Vec::with_capacity(text.len() + 2);
        needle.push(0);
        needle.extend_from_slice(text.as_bytes());
        needle.push(0);

        self.find_literal(&needle).map(|addr| addr + 1)
    }

    /// Every place the module stores `target` as a 32-bit little-endian value
    pub fn find_references(&self, target: u64) -> Vec<u64> {
        let Ok(target) = u32::try_from(target) else {
            return Vec::new();
        };
        let needle = target.to_le_bytes();
        let finder = memmem::Finder::new(&needle);

        let mut results = Vec::new();
        self.for_each_chunk(needle.len() - 1, |data, data_base| {
            results.extend(finder.find_iter(data).map(|pos| data_base + pos as u64));
            ControlFlow::Continue(())
        });
        results
    }

    fn find_literal(&self, needle: &[u8]) -> Option<u64> {
        let finder = memmem::Finder::new(needle);
        let mut found = None;
        self.for_each_chunk(needle.len().saturating_sub(1), |data, data_base| {
            match finder.find(data) {
                Some(pos) => {
                    found = Some(data_base + pos as u64);
                    ControlFlow::Break(())
                }
                None => ControlFlow::Continue(()),
            }
        });
        found
    }

    fn for_each_chunk<F>(&self, overlap: usize, mut visit: F)
    where
        F: FnMut(&[u8], u64) -> ControlFlow<()>,
    {
        let mut offset: u64 = 0;
        let mut tail: Vec<u8> = Vec::new();

        while offset < self.module.size {
            let read_size = ((self.module.size - offset) as usize).min(SCAN_CHUNK_SIZE);
            let addr = self.module.base + offset;
            offset += read_size as u64;

            let chunk = match self.reader.read_bytes(addr, read_size) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(
                        "Scan of {} skipped unreadable chunk at {:#x}: {}",
                        self.module.name, addr, e
                    );
                    tail.clear();
                    continue;
                }
            };

            let mut data = Vec::with_capacity(tail.len() + chunk.len());
            data.extend_from_slice(&tail);
            data.extend_from_slice(&chunk);
            let data_base = addr - tail.len() as u64;

            if visit(&data, data_base).is_break() {
                return;
            }

            tail = if overlap > 0 && data.len() >= overlap {
                data[data.len() - overlap..].to_vec()
            } else if overlap > 0 {
                data
            } else {
                Vec::new()
            };
        }
    }
}

/// Positions in `buffer` where `pattern` matches, wildcards matching any byte
pub fn find_matches_with_wildcards<'b>(
    buffer: &'b [u8],
    pattern: &'b [Option<u8>],
) -> impl Iterator<Item = usize> + 'b {
    let last = if pattern.is_empty() || buffer.len() < pattern.len() {
        None
    } else {
        Some(buffer.len() - pattern.len())
    };

    last.into_iter().flat_map(move |last| {
        (0..=last).filter(move |&i| {
            pattern
                .iter()
                .enumerate()
                .all(|(j, byte)| byte.is_none_or(|value| buffer[i + j] == value))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockMemoryBuilder;
    use crate::offset::parse_pattern;

    const BASE: u64 = 0x1000_0000;

    fn module_with(bytes: &[u8]) -> (crate::memory::MockMemoryReader, ModuleImage) {
        let reader = MockMemoryBuilder::new().write_bytes(BASE, bytes).build();
        let module = ModuleImage::new("server.dll", BASE, bytes.len() as u64);
        (reader, module)
    }

    #[test]
    fn test_exact_sequence_at_offset() {
        let mut bytes = vec![0xCC; 0x400];
        let k = 0x123;
        bytes[k..k + 5].copy_from_slice(&[0x55, 0x8B, 0xEC, 0x8D, 0x45]);
        let (reader, module) = module_with(&bytes);

        let scanner = SignatureScanner::new(&reader, module);
        let pattern = parse_pattern("55 8B ?? 8D 45").unwrap();
        assert_eq!(scanner.find_first(&pattern), Some(BASE + k as u64));
    }

    #[test]
    fn test_match_across_chunk_boundary() {
        let mut bytes = vec![0u8; SCAN_CHUNK_SIZE * 2];
        let k = SCAN_CHUNK_SIZE - 2;
        bytes[k..k + 4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let (reader, module) = module_with(&bytes);

        let scanner = SignatureScanner::new(&reader, module);
        let pattern = parse_pattern("DE AD BE EF").unwrap();
        assert_eq!(scanner.scan_all(&pattern), vec![BASE + k as u64]);
    }

    #[test]
    fn test_no_match_returns_none() {
        let (reader, module) = module_with(&[0x90; 64]);
        let scanner = SignatureScanner::new(&reader, module);
        let pattern = parse_pattern("55 8B EC").unwrap();
        assert_eq!(scanner.find_first(&pattern), None);
    }

    #[test]
    fn test_resolve_with_deref() {
        // 68 <imm32> : push of an absolute address
        let mut bytes = vec![0x90; 32];
        bytes[8] = 0x68;
        bytes[9..13].copy_from_slice(&0x2000_1000u32.to_le_bytes());
        let (reader, module) = module_with(&bytes);

        let scanner = SignatureScanner::new(&reader, module);
        let sig = CodeSignature::deref("90 68 ?? ?? ?? ??", 2);
        assert_eq!(scanner.scan(&sig), Some(0x2000_1000));

        let with_addend = CodeSignature::deref("90 68 ?? ?? ?? ??", 2).with_addend(0x11);
        assert_eq!(scanner.scan(&with_addend), Some(0x2000_1011));

        let plain = CodeSignature::new("90 68 ?? ?? ?? ??", 1);
        assert_eq!(scanner.scan(&plain), Some(BASE + 8));
    }

    #[test]
    fn test_invalid_signature_is_skipped() {
        let (reader, module) = module_with(&[0x90; 16]);
        let scanner = SignatureScanner::new(&reader, module);
        assert_eq!(scanner.scan(&CodeSignature::new("ZZ", 0)), None);
    }

    #[test]
    fn test_find_string_and_reference() {
        let mut bytes = vec![0u8; 0x100];
        bytes[0x40..0x49].copy_from_slice(b"m_iHealth");
        let string_addr = BASE + 0x40;
        bytes[0x80..0x84].copy_from_slice(&(string_addr as u32).to_le_bytes());
        let (reader, module) = module_with(&bytes);

        let scanner = SignatureScanner::new(&reader, module);
        assert_eq!(scanner.find_string("m_iHealth"), Some(string_addr));
        assert_eq!(scanner.find_string("iHealth"), None);
        assert_eq!(scanner.find_references(string_addr), vec![BASE + 0x80]);
    }

    #[test]
    fn test_wildcard_matcher_on_slices() {
        let pattern = parse_pattern("01 ?? 03").unwrap();
        let hits: Vec<usize> =
            find_matches_with_wildcards(&[1, 2, 3, 1, 9, 3, 1], &pattern).collect();
        assert_eq!(hits, vec![0, 3]);
        assert_eq!(find_matches_with_wildcards(&[1, 2], &pattern).count(), 0);
    }
}
