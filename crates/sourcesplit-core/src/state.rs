//! Per-tick snapshot of engine and player state

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr};
use tracing::trace;

use crate::entity::EntityDirectory;
use crate::error::{Error, Result};
use crate::memory::layout::strings;
use crate::memory::{ReadMemory, ReadValueExt, Vector3f};
use crate::offset::GameOffsets;

/// Entity slot of the local player
pub const ENT_INDEX_PLAYER: usize = 1;

/// Default tolerance when comparing an I/O event fire time to the game clock (about 2 ticks)
pub const IO_EPSILON: f32 = 0.03;

/// Absorbs f32 rounding in `tick * interval` (well below one tick)
const TIMER_SLACK: f64 = 1e-4;
/// Longest frame time the game allows without cheats
const MAX_FRAME_TIME: f64 = 0.05;
const LAG_DIVISOR: f64 = 1.15;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, FromRepr,
)]
#[repr(i32)]
pub enum SignOnState {
    #[default]
    None = 0,
    Challenge = 1,
    Connected = 2,
    New = 3,
    PreSpawn = 4,
    Spawn = 5,
    Full = 6,
    ChangeLevel = 7,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, FromRepr,
)]
#[repr(i32)]
pub enum HostState {
    #[default]
    NewGame = 0,
    LoadGame = 1,
    ChangeLevelSP = 2,
    ChangeLevelMP = 3,
    Run = 4,
    GameShutdown = 5,
    Shutdown = 6,
    Restart = 7,
}

impl HostState {
    /// States during which the host state's level name is valid
    pub fn has_level_name(self) -> bool {
        matches!(
            self,
            Self::NewGame | Self::ChangeLevelSP | Self::ChangeLevelMP
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, FromRepr,
)]
#[repr(i32)]
pub enum ServerState {
    #[default]
    Dead = 0,
    Loading = 1,
    Active = 2,
    Paused = 3,
}

bitflags! {
    /// `m_fFlags` of a player entity
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct PlayerFlags: u32 {
        const ON_GROUND = 1 << 0;
        const DUCKING = 1 << 1;
        const WATER_JUMP = 1 << 2;
        const ON_TRAIN = 1 << 3;
        const IN_RAIN = 1 << 4;
        const FROZEN = 1 << 5;
        const AT_CONTROLS = 1 << 6;
        const CLIENT = 1 << 7;
        const FAKE_CLIENT = 1 << 8;
        const IN_WATER = 1 << 9;
        const FLY = 1 << 10;
        const SWIM = 1 << 11;
        const CONVEYOR = 1 << 12;
        const NPC = 1 << 13;
        const GOD_MODE = 1 << 14;
        const NO_TARGET = 1 << 15;
        const AIM_TARGET = 1 << 16;
    }
}

bitflags! {
    /// `m_fEffects` of any entity
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct EntityEffects: u32 {
        const BONE_MERGE = 0x001;
        const BRIGHT_LIGHT = 0x002;
        const DIM_LIGHT = 0x004;
        const NO_INTERP = 0x008;
        const NO_SHADOW = 0x010;
        const NO_DRAW = 0x020;
        const NO_RECEIVE_SHADOW = 0x040;
        const BONE_MERGE_FAST_CULL = 0x080;
        const ITEM_BLINK = 0x100;
        const PARENT_ANIMATES = 0x200;
    }
}

bitflags! {
    /// Player members a game needs in the snapshot; the rest are not read
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct RequiredProperties: u8 {
        const POSITION = 1 << 0;
        const FLAGS = 1 << 1;
        const PARENT_ENTITY = 1 << 2;
        const VIEW_ENTITY = 1 << 3;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GameState {
    pub raw_tick_count: i32,
    pub prev_raw_tick_count: i32,
    /// Raw tick at session start
    pub tick_base: i32,
    pub interval_per_tick: f32,
    pub frame_time: f32,
    pub cur_time: f32,

    pub current_map: String,
    pub prev_map: String,
    pub game_dir: String,
    /// Level being loaded; only set while the host state carries one
    pub host_level_name: String,

    pub sign_on_state: SignOnState,
    pub prev_sign_on_state: SignOnState,
    pub host_state: HostState,
    pub prev_host_state: HostState,
    pub server_state: ServerState,
    pub prev_server_state: ServerState,

    pub player_entity: u64,
    pub player_flags: PlayerFlags,
    pub prev_player_flags: PlayerFlags,
    pub player_position: Vector3f,
    pub prev_player_position: Vector3f,
    pub player_view_entity_index: usize,
    pub prev_player_view_entity_index: usize,
    pub player_parent_handle: u32,
    pub prev_player_parent_handle: u32,

    pub update_count: u64,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            player_view_entity_index: ENT_INDEX_PLAYER,
            prev_player_view_entity_index: ENT_INDEX_PLAYER,
            ..Default::default()
        }
    }

    /// Ticks since session start. Garbage reads wrap instead of overflowing.
    pub fn tick_count(&self) -> i32 {
        self.raw_tick_count.wrapping_sub(self.tick_base)
    }

    /// Seconds since session start
    pub fn tick_time(&self) -> f32 {
        self.tick_count() as f32 * self.interval_per_tick
    }

    pub fn map_changed(&self) -> bool {
        self.current_map != self.prev_map
    }

    pub fn sign_on_changed(&self) -> bool {
        self.sign_on_state != self.prev_sign_on_state
    }

    pub fn game_dir_name(&self) -> String {
        game_dir_name(&self.game_dir)
    }

    pub fn start_session(&mut self) {
        self.tick_base = self.raw_tick_count;
        trace!("Session tick base {}", self.tick_base);
    }

    fn shift(&mut self) {
        self.prev_raw_tick_count = self.raw_tick_count;
        self.prev_map.clone_from(&self.current_map);
        self.prev_sign_on_state = self.sign_on_state;
        self.prev_host_state = self.host_state;
        self.prev_server_state = self.server_state;
        self.prev_player_flags = self.player_flags;
        self.prev_player_position = self.player_position;
        self.prev_player_view_entity_index = self.player_view_entity_index;
        self.prev_player_parent_handle = self.player_parent_handle;
    }

    /// Shift every field into its previous counterpart and read fresh values.
    ///
    /// Individual read failures keep the last-known value. Fails only when the
    /// sign-on state cannot be read, which means the process is gone or mid-load.
    pub fn update<R: ReadMemory + ?Sized>(
        &mut self,
        reader: &R,
        offsets: &GameOffsets,
        required: RequiredProperties,
    ) -> Result<()> {
        let sign_on_addr = offsets
            .sign_on_state
            .ok_or_else(|| Error::OffsetUnavailable("signOnState".to_string()))?;
        let sign_on = reader.read_i32(sign_on_addr)?;

        self.shift();
        self.update_count += 1;

        if let Some(state) = SignOnState::from_repr(sign_on) {
            self.sign_on_state = state;
        }

        read_into(reader, offsets.tick_count(), &mut self.raw_tick_count);
        read_into(reader, offsets.interval_per_tick(), &mut self.interval_per_tick);
        read_into(reader, offsets.frame_time(), &mut self.frame_time);
        read_into(reader, offsets.cur_time, &mut self.cur_time);

        if let Some(addr) = offsets.cur_map
            && reader.read_u8(addr).is_ok()
        {
            self.current_map = reader
                .read_string(addr, strings::MAP_NAME_MAX_LEN)
                .to_lowercase();
        }

        if self.game_dir.is_empty()
            && let Some(addr) = offsets.game_dir
        {
            self.game_dir = reader.read_string(addr, strings::GAME_DIR_MAX_LEN);
        }

        if let Some(addr) = offsets.host_state
            && let Some(state) = reader.read_i32(addr).ok().and_then(HostState::from_repr)
        {
            self.host_state = state;
        }
        self.host_level_name = match offsets.host_state_level_name() {
            Some(addr) if self.host_state.has_level_name() => reader
                .read_string(addr, strings::MAP_NAME_MAX_LEN)
                .to_lowercase(),
            _ => String::new(),
        };

        if let Some(addr) = offsets.server_state
            && let Some(state) = reader.read_i32(addr).ok().and_then(ServerState::from_repr)
        {
            self.server_state = state;
        }

        self.update_player(reader, offsets, required);
        Ok(())
    }

    fn update_player<R: ReadMemory + ?Sized>(
        &mut self,
        reader: &R,
        offsets: &GameOffsets,
        required: RequiredProperties,
    ) {
        let Some(info) = EntityDirectory::new(reader, offsets).info_by_index(ENT_INDEX_PLAYER)
        else {
            return;
        };
        self.player_entity = info.entity_ptr;
        if info.entity_ptr == 0 {
            return;
        }
        let member = |offset: Option<u64>| offset.map(|o| info.entity_ptr + o);

        if required.contains(RequiredProperties::POSITION) {
            read_into(reader, member(offsets.entity.abs_origin), &mut self.player_position);
        }

        if required.contains(RequiredProperties::FLAGS)
            && let Some(addr) = member(offsets.entity.flags)
            && let Ok(bits) = reader.read_u32(addr)
        {
            self.player_flags = PlayerFlags::from_bits_retain(bits);
        }

        if required.contains(RequiredProperties::PARENT_ENTITY) {
            read_into(
                reader,
                member(offsets.entity.parent_handle),
                &mut self.player_parent_handle,
            );
        }

        if required.contains(RequiredProperties::VIEW_ENTITY)
            && let Some(addr) = member(offsets.entity.view_entity)
            && let Ok(handle) = reader.read_u32(addr)
        {
            // An invalid handle means the player looks through their own eyes
            self.player_view_entity_index = EntityDirectory::new(reader, offsets)
                .handle_to_index(handle)
                .unwrap_or(ENT_INDEX_PLAYER);
        }
    }

    fn timer_reached(&self, raw_tick: i32, target: f64, epsilon: f32) -> bool {
        let elapsed = f64::from(raw_tick) * f64::from(self.interval_per_tick);
        let delta = elapsed - target;
        if delta < -TIMER_SLACK {
            return false;
        }
        epsilon == 0.0 || delta <= f64::from(epsilon) + TIMER_SLACK
    }

    /// Whether the game clock has reached `target` seconds (an I/O event fire
    /// time or fade end time) and overshot it by at most `epsilon`.
    ///
    /// With `check_before` the previous tick must not have satisfied the same
    /// condition, so the result is true on one tick only. `adjust_for_lag`
    /// pulls the target earlier when frames run longer than a tick.
    pub fn compare_to_internal_timer(
        &self,
        target: f32,
        epsilon: f32,
        check_before: bool,
        adjust_for_lag: bool,
    ) -> bool {
        if target == 0.0 {
            return false;
        }

        let mut target = f64::from(target);
        let frame_time = f64::from(self.frame_time);
        if adjust_for_lag && frame_time > f64::from(self.interval_per_tick) {
            target = (target - frame_time.min(MAX_FRAME_TIME) / LAG_DIVISOR).max(0.0);
        }

        self.timer_reached(self.raw_tick_count, target, epsilon)
            && !(check_before && self.timer_reached(self.prev_raw_tick_count, target, epsilon))
    }
}

/// Last path component of a game directory, lowercase
pub fn game_dir_name(path: &str) -> String {
    path.trim_end_matches(['\\', '/'])
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn read_into<R, T>(reader: &R, address: Option<u64>, slot: &mut T)
where
    R: ReadMemory + ?Sized,
    T: crate::memory::RemoteValue,
{
    if let Some(addr) = address
        && let Ok(value) = reader.read_value::<T>(addr)
    {
        *slot = value;
    }
}
