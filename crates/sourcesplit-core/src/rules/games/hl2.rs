//! Half-Life 2
//!
//! Start: first tick the player stands on the train at the start position.
//! End: the weapon strip before the final fade on d3_breen_01.
//! Experimental Fuel: starts when the blocking brush is removed and ends when
//! the switch removes the dust mote entity.

use tracing::debug;

use crate::error::Result;
use crate::memory::{ReadMemory, Vector3f};
use crate::rules::{GameContext, GameProfile, GameSupport, RuleResult};
use crate::state::RequiredProperties;

const FIRST_MAP: &str = "d1_trainstation_01";
const FUEL_MAP: &str = "bmg1_experimental_fuel";
const LAST_MAP: &str = "d3_breen_01";

const START_POS: Vector3f = Vector3f::new(-9419.0, -2483.0, 22.0);
/// The player is stripped once shortly after spawning here; that strip is ignored
const SPAWN_STRIP_POS: Vector3f = Vector3f::new(-2449.5, -1380.2, -446.0);
const SPAWN_STRIP_RADIUS: f32 = 256.0;
const FUEL_SPAWN_POS: Vector3f = Vector3f::new(7784.5, 7284.0, -15107.0);

/// Handle value of "no active weapon"
const NO_WEAPON: i32 = -1;

pub struct HalfLife2 {
    profile: GameProfile,
    active_weapon_offset: Option<u64>,
    health_offset: Option<u64>,
    prev_active_weapon: i32,
    fuel_brush: Option<usize>,
    fuel_dustmote: Option<usize>,
    /// Survives sessions; cleared by a timer reset
    fuel_started: bool,
}

impl HalfLife2 {
    pub fn new() -> Self {
        Self {
            profile: GameProfile {
                name: "Half-Life 2",
                game_dirs: &["hl2"],
                first_maps: &[FIRST_MAP, FUEL_MAP],
                last_map: Some(LAST_MAP),
                start_on_load_maps: &[],
                required: RequiredProperties::POSITION,
            },
            active_weapon_offset: None,
            health_offset: None,
            prev_active_weapon: 0,
            fuel_brush: None,
            fuel_dustmote: None,
            fuel_started: false,
        }
    }

    fn player_member(ctx: &GameContext<'_>, offset: Option<u64>) -> Option<u64> {
        let player = ctx.state.player_entity;
        (player != 0).then_some(player).zip(offset).map(|(p, o)| p + o)
    }

    fn update_end(&mut self, ctx: &GameContext<'_>) -> Result<RuleResult> {
        let (Some(weapon_addr), Some(health_addr)) = (
            Self::player_member(ctx, self.active_weapon_offset),
            Self::player_member(ctx, self.health_offset),
        ) else {
            return Ok(RuleResult::NONE);
        };

        let active_weapon = ctx.reader.read_i32(weapon_addr)?;
        let stripped = active_weapon == NO_WEAPON && self.prev_active_weapon != NO_WEAPON;
        self.prev_active_weapon = active_weapon;

        if stripped && ctx.state.player_position.distance(&SPAWN_STRIP_POS) > SPAWN_STRIP_RADIUS {
            let health = ctx.reader.read_i32(health_addr)?;
            if health > 0 {
                debug!("hl2 end");
                return Ok(RuleResult::lost().latched());
            }
        }
        Ok(RuleResult::NONE)
    }

    fn update_fuel(&mut self, ctx: &GameContext<'_>) -> RuleResult {
        let Some(dustmote) = self.fuel_dustmote else {
            return RuleResult::NONE;
        };
        let entities = ctx.entities();
        let removed = |index: Option<usize>| {
            index
                .and_then(|i| entities.info_by_index(i))
                .is_some_and(|info| info.entity_ptr == 0)
        };

        if !self.fuel_started
            && removed(self.fuel_brush)
            && ctx.state.player_position.distance_xy(&FUEL_SPAWN_POS) >= 2.0
        {
            debug!("experimental fuel start");
            self.fuel_started = true;
            return RuleResult::gained();
        }

        if removed(Some(dustmote)) {
            debug!("experimental fuel end");
            self.fuel_dustmote = None;
            return RuleResult::lost();
        }
        RuleResult::NONE
    }
}

impl Default for HalfLife2 {
    fn default() -> Self {
        Self::new()
    }
}

impl GameSupport for HalfLife2 {
    fn profile(&self) -> &GameProfile {
        &self.profile
    }

    fn on_attach(&mut self, ctx: &GameContext<'_>) -> Result<()> {
        self.active_weapon_offset = ctx.server_member_offset("m_hActiveWeapon");
        self.health_offset = ctx.server_member_offset("m_iHealth");
        debug!(
            "m_hActiveWeapon={:?} m_iHealth={:?}",
            self.active_weapon_offset, self.health_offset
        );
        Ok(())
    }

    fn on_session_start(&mut self, ctx: &GameContext<'_>) -> Result<()> {
        let map = ctx.map();

        if self.profile.is_last_map(map)
            && let Some(addr) = Self::player_member(ctx, self.active_weapon_offset)
        {
            self.prev_active_weapon = ctx.reader.read_i32(addr)?;
        }

        if map == FUEL_MAP {
            let entities = ctx.entities();
            self.fuel_brush = entities.index_by_name("dontrunaway");
            self.fuel_dustmote = entities.index_by_name("kokedepth");
            debug!(
                "fuel brush={:?} dustmote={:?}",
                self.fuel_brush, self.fuel_dustmote
            );
        }
        Ok(())
    }

    fn on_update(&mut self, ctx: &GameContext<'_>) -> Result<RuleResult> {
        let map = ctx.map();

        if map == FIRST_MAP {
            if ctx.state.player_position.distance_xy(&START_POS) <= 1.0 {
                debug!("hl2 start");
                return Ok(RuleResult::gained().latched());
            }
        } else if self.profile.is_last_map(map) {
            return self.update_end(ctx);
        } else if map == FUEL_MAP {
            return Ok(self.update_fuel(ctx));
        }

        Ok(RuleResult::NONE)
    }

    fn on_timer_reset(&mut self) {
        self.fuel_started = false;
    }
}
