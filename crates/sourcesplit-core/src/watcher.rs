//! Change-tracking probes over remote values
//!
//! A watcher keeps the previous and the current observation of one remote
//! location so rules can detect edges. Only [`Watcher::update`] ever writes
//! `old`; a failed read leaves both values untouched, which is how a paused or
//! loading process shows up ("no observation this tick").
//!
//! The first successful update leaves `old` at `T::default()`, which is not a
//! real prior value. Rules that care check [`Watcher::is_primed`].

use crate::memory::{ReadMemory, ReadValueExt, RemoteValue};

#[derive(Debug, Clone)]
pub struct Watcher<T: RemoteValue> {
    address: u64,
    old: T,
    current: T,
    observations: u32,
}

impl<T: RemoteValue> Watcher<T> {
    pub fn new(address: u64) -> Self {
        Self {
            address,
            old: T::default(),
            current: T::default(),
            observations: 0,
        }
    }

    /// Watcher for `base + offset`; a null base or an address past the end of
    /// the address space yields a watcher that never observes
    pub fn at_member(base: u64, offset: u64) -> Self {
        match base {
            0 => Self::new(0),
            base => Self::new(base.checked_add(offset).unwrap_or(0)),
        }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn is_attached(&self) -> bool {
        self.address != 0
    }

    pub fn old(&self) -> T {
        self.old
    }

    pub fn current(&self) -> T {
        self.current
    }

    pub fn changed(&self) -> bool {
        self.old != self.current
    }

    /// Both `old` and `current` hold real observations
    pub fn is_primed(&self) -> bool {
        self.observations >= 2
    }

    /// Shift `current` into `old` and read a fresh `current`.
    ///
    /// Returns `false` and keeps both values when the read fails.
    pub fn update<R: ReadMemory + ?Sized>(&mut self, reader: &R) -> bool {
        if self.address == 0 {
            return false;
        }

        match reader.read_value::<T>(self.address) {
            Ok(value) => {
                self.old = self.current;
                self.current = value;
                self.observations = self.observations.saturating_add(1);
                true
            }
            Err(_) => false,
        }
    }

    pub fn reset(&mut self) {
        self.old = T::default();
        self.current = T::default();
        self.observations = 0;
    }
}

/// [`Watcher`] over a bounded NUL-terminated string
#[derive(Debug, Clone)]
pub struct StringWatcher {
    address: u64,
    max_len: usize,
    old: String,
    current: String,
    observations: u32,
}

impl StringWatcher {
    pub fn new(address: u64, max_len: usize) -> Self {
        Self {
            address,
            max_len,
            old: String::new(),
            current: String::new(),
            observations: 0,
        }
    }

    pub fn old(&self) -> &str {
        &self.old
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn changed(&self) -> bool {
        self.old != self.current
    }

    pub fn is_primed(&self) -> bool {
        self.observations >= 2
    }

    pub fn update<R: ReadMemory + ?Sized>(&mut self, reader: &R) -> bool {
        // An empty string and an unreadable address both read as ""; probe first
        if self.address == 0 || reader.read_u8(self.address).is_err() {
            return false;
        }

        let value = reader.read_string(self.address, self.max_len);
        self.old = std::mem::replace(&mut self.current, value);
        self.observations = self.observations.saturating_add(1);
        true
    }

    pub fn reset(&mut self) {
        self.old.clear();
        self.current.clear();
        self.observations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MockMemoryBuilder, Vector3f};

    #[test]
    fn test_first_update_leaves_old_default() {
        let reader = MockMemoryBuilder::new().write_i32(0x100, 75).build();
        let mut watcher = Watcher::<i32>::new(0x100);

        assert!(watcher.update(&reader));
        assert_eq!(watcher.current(), 75);
        assert_eq!(watcher.old(), 0);
        assert!(!watcher.is_primed());
    }

    #[test]
    fn test_update_shifts_current_into_old() {
        let mut reader = MockMemoryBuilder::new().write_i32(0x100, 100).build();
        let mut watcher = Watcher::<i32>::new(0x100);
        watcher.update(&reader);

        reader.write_i32(0x100, 0);
        assert!(watcher.update(&reader));
        assert_eq!(watcher.old(), 100);
        assert_eq!(watcher.current(), 0);
        assert!(watcher.changed());
        assert!(watcher.is_primed());
    }

    #[test]
    fn test_failed_read_preserves_values() {
        let mut reader = MockMemoryBuilder::new().write_i32(0x100, 3).build();
        let mut watcher = Watcher::<i32>::new(0x100);
        watcher.update(&reader);
        reader.write_i32(0x100, 4);
        watcher.update(&reader);

        reader.unmap(0x100, 4);
        assert!(!watcher.update(&reader));
        assert_eq!(watcher.old(), 3);
        assert_eq!(watcher.current(), 4);
    }

    #[test]
    fn test_struct_watcher() {
        let mut reader = MockMemoryBuilder::new()
            .write_vec3(0x200, Vector3f::new(1.0, 2.0, 3.0))
            .build();
        let mut watcher = Watcher::<Vector3f>::new(0x200);
        watcher.update(&reader);
        reader.write_vec3(0x200, Vector3f::new(1.5, 2.0, 3.0));
        watcher.update(&reader);

        assert_eq!(watcher.old().x, 1.0);
        assert_eq!(watcher.current().x, 1.5);
    }

    #[test]
    fn test_null_member_never_observes() {
        let reader = MockMemoryBuilder::new().write_i32(0x10, 1).build();
        let mut watcher = Watcher::<i32>::at_member(0, 0x10);
        assert!(!watcher.is_attached());
        assert!(!watcher.update(&reader));
        assert_eq!(Watcher::<i32>::at_member(0x1000, 0x10).address(), 0x1010);
    }

    #[test]
    fn test_member_past_address_space_is_detached() {
        let reader = MockMemoryBuilder::new().write_i32(0x10, 1).build();
        let mut watcher = Watcher::<i32>::at_member(u64::MAX - 4, 0x10);
        assert!(!watcher.is_attached());
        assert!(!watcher.update(&reader));
    }

    #[test]
    fn test_reset() {
        let reader = MockMemoryBuilder::new().write_u8(0x10, 1).build();
        let mut watcher = Watcher::<u8>::new(0x10);
        watcher.update(&reader);
        watcher.update(&reader);
        watcher.reset();
        assert_eq!(watcher.current(), 0);
        assert!(!watcher.is_primed());
    }

    #[test]
    fn test_string_watcher() {
        let mut reader = MockMemoryBuilder::new().write_str(0x300, "ebend1").build();
        let mut watcher = StringWatcher::new(0x300, 20);
        assert!(watcher.update(&reader));
        assert_eq!(watcher.current(), "ebend1");
        assert!(watcher.changed());

        assert!(watcher.update(&reader));
        assert!(!watcher.changed());

        reader.write_str(0x300, "xenstart0");
        watcher.update(&reader);
        assert_eq!(watcher.old(), "ebend1");
        assert_eq!(watcher.current(), "xenstart0");
    }

    #[test]
    fn test_string_watcher_unreadable() {
        let reader = MockMemoryBuilder::new().build();
        let mut watcher = StringWatcher::new(0x300, 20);
        assert!(!watcher.update(&reader));
        assert_eq!(watcher.current(), "");
    }
}
