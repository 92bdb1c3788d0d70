use encoding_rs::WINDOWS_1252;

use crate::error::{Error, Result};
use crate::memory::layout::strings;
use crate::memory::process::ProcessHandle;
use crate::memory::value::RemoteValue;

/// Read-only access to the address space of the target process.
///
/// Every read is fallible: unmapped pages, a paused or exiting process and
/// null pointers all surface as `Err`, never as a panic. Callers treat an
/// error as "unavailable this tick".
pub trait ReadMemory {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;

    fn read_u8(&self, address: u64) -> Result<u8> {
        Ok(read_array::<1, Self>(self, address)?[0])
    }

    fn read_i32(&self, address: u64) -> Result<i32> {
        Ok(i32::from_le_bytes(read_array(self, address)?))
    }

    fn read_u32(&self, address: u64) -> Result<u32> {
        Ok(u32::from_le_bytes(read_array(self, address)?))
    }

    fn read_f32(&self, address: u64) -> Result<f32> {
        Ok(f32::from_le_bytes(read_array(self, address)?))
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        Ok(u64::from_le_bytes(read_array(self, address)?))
    }

    /// Read a 32-bit pointer of the target process
    fn read_pointer(&self, address: u64) -> Result<u64> {
        self.read_u32(address).map(u64::from)
    }

    /// Read a NUL-terminated single-byte string of at most `max_len` bytes.
    ///
    /// Returns an empty string when nothing could be read.
    fn read_string(&self, address: u64, max_len: usize) -> String {
        if address == 0 || max_len == 0 {
            return String::new();
        }

        let mut raw = Vec::with_capacity(max_len.min(strings::READ_CHUNK));
        let mut chunk_len = strings::READ_CHUNK;
        while raw.len() < max_len {
            let want = (max_len - raw.len()).min(chunk_len);
            let chunk = match self.read_bytes(address + raw.len() as u64, want) {
                Ok(chunk) => chunk,
                // The string may end right before an unmapped page
                Err(_) if want > 1 => {
                    chunk_len = want / 2;
                    continue;
                }
                Err(_) => break,
            };

            if let Some(end) = chunk.iter().position(|&b| b == 0) {
                raw.extend_from_slice(&chunk[..end]);
                break;
            }
            raw.extend_from_slice(&chunk);
        }

        let (decoded, _, _) = WINDOWS_1252.decode(&raw);
        decoded.into_owned()
    }
}

fn read_array<const N: usize, R: ReadMemory + ?Sized>(reader: &R, address: u64) -> Result<[u8; N]> {
    let bytes = reader.read_bytes(address, N)?;
    bytes
        .get(..N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| Error::read_failed(address, "short read"))
}

/// Typed reads of fixed-layout values
pub trait ReadValueExt: ReadMemory {
    fn read_value<T: RemoteValue>(&self, address: u64) -> Result<T> {
        let bytes = self.read_bytes(address, T::SIZE)?;
        if bytes.len() < T::SIZE {
            return Err(Error::read_failed(address, "short read"));
        }
        Ok(T::decode(&bytes))
    }
}

impl<R: ReadMemory + ?Sized> ReadValueExt for R {}

/// Memory reader backed by an attached process
pub struct MemoryReader<'a> {
    process: &'a ProcessHandle,
}

impl<'a> MemoryReader<'a> {
    pub fn new(process: &'a ProcessHandle) -> Self {
        Self { process }
    }

    pub fn process(&self) -> &ProcessHandle {
        self.process
    }
}

impl ReadMemory for MemoryReader<'_> {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        if address == 0 {
            return Err(Error::read_failed(address, "null pointer"));
        }
        self.process.read_bytes(address, size)
    }
}
