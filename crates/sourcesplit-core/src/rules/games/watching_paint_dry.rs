//! Watching Paint Dry (mod)
//!
//! All categories start on chapter load. The mod shipped twice with two
//! different map sets, so both first maps count.

use tracing::debug;

use crate::error::Result;
use crate::queue::EventQuery;
use crate::rules::{
    Axis, Check, GameContext, GameProfile, GameSupport, Probe, RuleList, RuleResult, SplitOutcome,
    ValueRule,
};
use crate::state::{IO_EPSILON, RequiredProperties};
use crate::watcher::Watcher;

const FIRST_MAPS: &[&str] = &["wpd_st", "watchingpaintdry"];
const LAST_MAP: &str = "wpd_uni";
const CE_MAPS: &[&str] = &["wpd_tp", "hallway"];

const COLOR_CORRECTION_ENABLED: u64 = 0x355;
/// The relay fires its outputs a few events deep
const CE_QUEUE_DEPTH: usize = 3;

pub struct WatchingPaintDry {
    profile: GameProfile,
    rules: RuleList,
}

impl WatchingPaintDry {
    pub fn new() -> Self {
        Self {
            profile: GameProfile {
                name: "Watching Paint Dry",
                game_dirs: &["watchingpaintdry"],
                first_maps: FIRST_MAPS,
                last_map: Some(LAST_MAP),
                start_on_load_maps: FIRST_MAPS,
                required: RequiredProperties::empty(),
            },
            rules: RuleList::new(),
        }
    }

    fn commands_fired(ctx: &GameContext<'_>) -> bool {
        let Some(events) = ctx.events() else {
            return false;
        };
        let fire_time = events.find_fire_time(&EventQuery::target("commands"), CE_QUEUE_DEPTH);
        ctx.state
            .compare_to_internal_timer(fire_time, IO_EPSILON, false, false)
    }
}

impl Default for WatchingPaintDry {
    fn default() -> Self {
        Self::new()
    }
}

impl GameSupport for WatchingPaintDry {
    fn profile(&self) -> &GameProfile {
        &self.profile
    }

    fn on_session_start(&mut self, ctx: &GameContext<'_>) -> Result<()> {
        self.rules.clear();
        let map = ctx.map();
        let entities = ctx.entities();

        if self.profile.is_first_map(map) {
            if let (Some(button), Some(origin)) = (
                entities.entity_by_name("bonzibutton"),
                ctx.offsets.entity.abs_origin,
            ) {
                self.rules.push(ValueRule::new(
                    "ice end",
                    Probe::Position(Watcher::at_member(button, origin)),
                    Check::AxisIncreased(Axis::X),
                    SplitOutcome::PlayerLostControl,
                ));
            }
        } else if self.profile.is_last_map(map)
            && let Some(correction) = entities.entity_by_name("Color_Correction")
        {
            self.rules.push(ValueRule::new(
                "ee end",
                Probe::Byte(Watcher::at_member(correction, COLOR_CORRECTION_ENABLED)),
                Check::Transition { from: 1, to: 0 },
                SplitOutcome::PlayerLostControl,
            ));
        }
        Ok(())
    }

    fn on_update(&mut self, ctx: &GameContext<'_>) -> Result<RuleResult> {
        if let Some((name, result)) = self.rules.evaluate(ctx) {
            debug!("wpd {}", name);
            return Ok(result);
        }

        if CE_MAPS.contains(&ctx.map()) && Self::commands_fired(ctx) {
            debug!("wpd ce end");
            return Ok(RuleResult::lost().latched());
        }
        Ok(RuleResult::NONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Vector3f;
    use crate::memory::layout::event_queue;
    use crate::rules::games::fixture::World;

    const HEAD: u64 = 0x50_0000;
    const NODE: u64 = 0x51_0000;
    const TARGET: u64 = 0x52_0000;

    fn queue_commands(world: &mut World, fire_time: f32) {
        world.offsets.event_queue = Some(HEAD);
        world.mem.write_u32(HEAD, NODE as u32);
        world.mem.write_bytes(NODE, &[0; event_queue::NODE_SIZE]);
        world.mem.write_f32(NODE + event_queue::FIRE_TIME, fire_time);
        world.mem.write_str(TARGET, "commands");
        world.mem.write_u32(NODE + event_queue::TARGET, TARGET as u32);
    }

    #[test]
    fn test_button_push_ends_ice() {
        for map in FIRST_MAPS {
            let mut world = World::new(map);
            world.spawn(3, "bonzibutton", Vector3f::new(100.0, 0.0, 0.0));
            let mut game = WatchingPaintDry::new();
            game.on_session_start(&world.ctx()).unwrap();

            assert!(!game.on_update(&world.ctx()).unwrap().is_action());
            assert!(!game.on_update(&world.ctx()).unwrap().is_action());
            world.move_to(3, Vector3f::new(101.0, 0.0, 0.0));
            assert_eq!(
                game.on_update(&world.ctx()).unwrap(),
                RuleResult::lost().latched()
            );
        }
    }

    #[test]
    fn test_button_spawning_at_origin_is_ignored() {
        let mut world = World::new("wpd_st");
        world.spawn(3, "bonzibutton", Vector3f::default());
        let mut game = WatchingPaintDry::new();
        game.on_session_start(&world.ctx()).unwrap();
        game.on_update(&world.ctx()).unwrap();

        world.move_to(3, Vector3f::new(50.0, 0.0, 0.0));
        assert!(!game.on_update(&world.ctx()).unwrap().is_action());
    }

    #[test]
    fn test_color_correction_disabled_ends_ee() {
        let mut world = World::new(LAST_MAP);
        let correction = world.spawn(5, "Color_Correction", Vector3f::default());
        world.mem.write_u8(correction + COLOR_CORRECTION_ENABLED, 1);
        let mut game = WatchingPaintDry::new();
        game.on_session_start(&world.ctx()).unwrap();
        game.on_update(&world.ctx()).unwrap();

        world.mem.write_u8(correction + COLOR_CORRECTION_ENABLED, 0);
        assert_eq!(
            game.on_update(&world.ctx()).unwrap(),
            RuleResult::lost().latched()
        );
    }

    #[test]
    fn test_commands_relay_ends_ce() {
        let mut world = World::new("hallway");
        // 0.015 s per tick: tick 100 is 1.5 s
        queue_commands(&mut world, 1.5);
        let mut game = WatchingPaintDry::new();
        game.on_session_start(&world.ctx()).unwrap();

        world.state.raw_tick_count = 90;
        assert!(!game.on_update(&world.ctx()).unwrap().is_action());
        world.state.raw_tick_count = 100;
        assert_eq!(
            game.on_update(&world.ctx()).unwrap(),
            RuleResult::lost().latched()
        );
        world.state.raw_tick_count = 110;
        assert!(!game.on_update(&world.ctx()).unwrap().is_action());
    }

    #[test]
    fn test_commands_ignored_on_other_maps() {
        let mut world = World::new("wpd_2");
        queue_commands(&mut world, 1.5);
        world.state.raw_tick_count = 100;
        let mut game = WatchingPaintDry::new();
        game.on_session_start(&world.ctx()).unwrap();
        assert!(!game.on_update(&world.ctx()).unwrap().is_action());
    }
}
