//! Memory layout constants for Source engine data structures
//!
//! This module centralizes all memory layout constants used for reading game data.
//! Every target is a 32-bit process, so pointers inside these structures are 4 bytes wide.
//! Constants are organized by structure type.

/// Size of a pointer inside the target process
pub const POINTER_SIZE: u64 = 4;

/// `CGlobalVarsBase` members, relative to the resolved `curtime` address
pub mod globals {
    pub const CUR_TIME: u64 = 0;
    pub const FRAME_TIME: u64 = 4;
    pub const TICK_COUNT: u64 = 12;
    pub const INTERVAL_PER_TICK: u64 = 16;
}

/// `CEntInfo` records of the global entity list
pub mod entity {
    /// Record without the cached target/class names (2004-2006 engine builds)
    pub const INFO_SIZE_LEGACY: u64 = 16;
    /// Record with cached target/class names
    pub const INFO_SIZE_MODERN: u64 = 24;

    pub const ENTITY_PTR: u64 = 0;
    pub const SERIAL_NUMBER: u64 = 4;
    pub const PREV: u64 = 8;
    pub const NEXT: u64 = 12;
    pub const TARGET_NAME: u64 = 16;
    pub const CLASS_NAME: u64 = 20;

    /// Index reserved for the local player
    pub const PLAYER_INDEX: usize = 1;

    /// Table size assumed when the live entity count cannot be read
    pub const DEFAULT_MAX_ENTITIES: usize = 2048;

    /// The live entity count is re-read every this many slots during a scan
    pub const COUNT_REFRESH_INTERVAL: usize = 100;

    /// Maximum length read for an entity target name
    pub const NAME_MAX_LEN: usize = 32;

    /// EHANDLE index mask for engine builds with 4096 entity slots
    pub const EHANDLE_INDEX_MASK_LEGACY: u32 = 0xFFF;
    /// EHANDLE index mask for engine builds with 8192 entity slots
    pub const EHANDLE_INDEX_MASK_MODERN: u32 = 0x1FFF;
}

/// `EventQueuePrioritizedEvent_t` nodes of the server's I/O event queue
pub mod event_queue {
    pub const FIRE_TIME: u64 = 0;
    pub const TARGET: u64 = 4;
    pub const TARGET_INPUT: u64 = 8;
    pub const ACTIVATOR: u64 = 12;
    pub const CALLER: u64 = 16;
    pub const OUTPUT_ID: u64 = 20;
    pub const ENT_TARGET: u64 = 24;
    /// First word of the `variant_t` payload; holds the parameter string pointer
    pub const PARAMETER: u64 = 28;
    pub const NEXT: u64 = 48;
    pub const PREV: u64 = 52;

    pub const NODE_SIZE: usize = 56;

    /// Maximum length read for target/input/parameter strings
    pub const STRING_MAX_LEN: usize = 256;

    /// Default number of nodes walked before giving up
    pub const DEFAULT_CAP: usize = 100;
}

/// Client-side list of active `ScreenFade_t` records
pub mod fade {
    /// Pointer to the element storage (array of pointers)
    pub const LIST_STORAGE: u64 = 0x4;
    /// Number of live elements
    pub const LIST_COUNT: u64 = 0x10;
    /// Distance between element pointers in storage
    pub const ENTRY_STRIDE: u64 = 4;

    pub const SPEED: u64 = 0;
    pub const END: u64 = 4;
    pub const RESET: u64 = 8;
    pub const COLOR: u64 = 12;
    pub const FLAGS: u64 = 16;

    pub const INFO_SIZE: usize = 20;

    pub const DEFAULT_CAP: usize = 100;
}

/// `CHostState` members
pub mod host_state {
    /// Level name offset in words for the 2003 leak engine
    pub const LEVEL_NAME_WORDS_LEGACY: u64 = 2;
    /// Level name offset in words for every later engine
    pub const LEVEL_NAME_WORDS_MODERN: u64 = 8;
}

/// Fixed string buffers
pub mod strings {
    pub const MAP_NAME_MAX_LEN: usize = 64;
    pub const GAME_DIR_MAX_LEN: usize = 260;
    /// Chunk size used when reading NUL-terminated strings
    pub const READ_CHUNK: usize = 32;
}

/// Timing constants for polling
pub mod timing {
    /// Interval between engine updates in the driver loop (ms)
    pub const POLL_INTERVAL_MS: u64 = 15;

    /// Interval between process lookups while detached (ms)
    pub const ATTACH_RETRY_MS: u64 = 2000;
}
