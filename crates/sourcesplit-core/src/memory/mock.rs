//! In-memory stand-in for a target process, used by tests

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::memory::{ReadMemory, Vector3f};

/// Sparse byte map; any byte that was never written is unmapped
#[derive(Debug, Default, Clone)]
pub struct MockMemoryReader {
    bytes: BTreeMap<u64, u8>,
}

impl MockMemoryReader {
    pub fn write_bytes(&mut self, address: u64, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.bytes.insert(address + i as u64, *byte);
        }
    }

    pub fn write_i32(&mut self, address: u64, value: i32) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    pub fn write_u32(&mut self, address: u64, value: u32) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    pub fn write_f32(&mut self, address: u64, value: f32) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    pub fn write_u8(&mut self, address: u64, value: u8) {
        self.write_bytes(address, &[value]);
    }

    pub fn write_vec3(&mut self, address: u64, value: Vector3f) {
        self.write_f32(address, value.x);
        self.write_f32(address + 4, value.y);
        self.write_f32(address + 8, value.z);
    }

    pub fn write_str(&mut self, address: u64, value: &str) {
        self.write_bytes(address, value.as_bytes());
        self.write_bytes(address + value.len() as u64, &[0]);
    }

    /// Remove a byte range, simulating a page that became unreadable
    pub fn unmap(&mut self, address: u64, size: usize) {
        for i in 0..size as u64 {
            self.bytes.remove(&(address + i));
        }
    }
}

impl ReadMemory for MockMemoryReader {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        (0..size as u64)
            .map(|i| {
                self.bytes
                    .get(&(address + i))
                    .copied()
                    .ok_or_else(|| Error::read_failed(address + i, "unmapped"))
            })
            .collect()
    }
}

/// Builder for [`MockMemoryReader`]
#[derive(Debug, Default)]
pub struct MockMemoryBuilder {
    memory: MockMemoryReader,
}

impl MockMemoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bytes(mut self, address: u64, data: &[u8]) -> Self {
        self.memory.write_bytes(address, data);
        self
    }

    pub fn write_i32(mut self, address: u64, value: i32) -> Self {
        self.memory.write_i32(address, value);
        self
    }

    pub fn write_u32(mut self, address: u64, value: u32) -> Self {
        self.memory.write_u32(address, value);
        self
    }

    pub fn write_f32(mut self, address: u64, value: f32) -> Self {
        self.memory.write_f32(address, value);
        self
    }

    pub fn write_u8(mut self, address: u64, value: u8) -> Self {
        self.memory.write_u8(address, value);
        self
    }

    pub fn write_vec3(mut self, address: u64, value: Vector3f) -> Self {
        self.memory.write_vec3(address, value);
        self
    }

    pub fn write_str(mut self, address: u64, value: &str) -> Self {
        self.memory.write_str(address, value);
        self
    }

    pub fn build(self) -> MockMemoryReader {
        self.memory
    }
}
