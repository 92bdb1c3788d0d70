//! Black Mesa
//!
//! Start: loading the first map. End: the Nihilanth's health reaching zero.
//! Optional milestones are toggled from the console (see [`FeatureFlags`]):
//!
//! - `ebend`: end the Earthbound category when the view switches to the ending camera
//! - `xenstart` / `xensplit`: start or split when the Xen intro camera hands control back
//! - `nihisplit`: split on every Nihilanth phase
//!
//! The Hazard Course mod starts when the tram door finishes opening and ends
//! when the camera flash sprite is hidden.

use tracing::{debug, info};

use crate::error::Result;
use crate::memory::{ModuleImage, Vector3f};
use crate::offset::{CodeSignature, SERVER_MODULE, SignatureScanner};
use crate::rules::{
    Check, CommandChannel, FeatureFlags, GameContext, GameProfile, GameSupport, Probe, RuleList,
    RuleResult, SplitOutcome, ValueRule,
};
use crate::state::{ENT_INDEX_PLAYER, EntityEffects, RequiredProperties};
use crate::watcher::Watcher;

const FIRST_MAP: &str = "bm_c1a0a";
const LAST_MAP: &str = "bm_c4a4a";
const EB_END_MAP: &str = "bm_c3a2i";
/// Earthbound's final map in the free mod release
const EB_END_MAP_MOD: &str = "bm_c3a2h";
const XEN_START_MAP: &str = "bm_c4a1a";
const HC_START_MAP: &str = "hc_t0a0";
const HC_END_MAP: &str = "hc_t0a3";

/// server.dll of the current retail build
const SERVER_MODERN_SIZE: u64 = 0x9D_6000;
/// server.dll of the free mod release
const SERVER_MOD_SIZE: u64 = 0x81_B000;

const NIHILANTH_PHASE_COUNTER: u64 = 0x1_A6E4;
const HC_DOOR_OPEN_POS: Vector3f = Vector3f::new(4152.7, -2853.1, 105.0);
const HC_DOOR_TOLERANCE: f32 = 0.05;
/// The flash sprite toggles during map spawn
const HC_END_MIN_TICKS: i32 = 10;

/// Points at the console command buffer
const COMMAND_SIGNATURE: &str = "55 8B EC 8D 45 ?? 50 FF 75 ?? 68 00 04 00 00 68 ?? ?? ?? ??";
const COMMAND_SIGNATURE_OFFSET: i64 = 16;
const COMMAND_BUFFER_OFFSET: u64 = 0x11;

pub const FEATURE_EB_END: &str = "ebend";
pub const FEATURE_XEN_START: &str = "xenstart";
pub const FEATURE_XEN_SPLIT: &str = "xensplit";
pub const FEATURE_NIHI_SPLIT: &str = "nihisplit";

const RULE_NIHILANTH_DEAD: &str = "nihilanth dead";
const RULE_NIHILANTH_PHASE: &str = "nihilanth phase";

pub struct BlackMesa {
    profile: GameProfile,
    health_offset: Option<u64>,
    effects_offset: Option<u64>,
    features: FeatureFlags,
    command: Option<CommandChannel>,
    eb_end_map: &'static str,
    eb_camera: Option<usize>,
    xen_camera: Option<usize>,
    rules: RuleList,
}

impl BlackMesa {
    pub fn new() -> Self {
        Self {
            profile: GameProfile {
                name: "Black Mesa",
                game_dirs: &["bms"],
                first_maps: &[FIRST_MAP],
                last_map: Some(LAST_MAP),
                start_on_load_maps: &[FIRST_MAP],
                required: RequiredProperties::VIEW_ENTITY,
            },
            health_offset: None,
            effects_offset: None,
            features: FeatureFlags::new([
                (FEATURE_EB_END, false),
                (FEATURE_XEN_START, false),
                (FEATURE_XEN_SPLIT, false),
                (FEATURE_NIHI_SPLIT, false),
            ])
            .with_exclusive(FEATURE_XEN_START, FEATURE_XEN_SPLIT),
            command: None,
            eb_end_map: EB_END_MAP,
            eb_camera: None,
            xen_camera: None,
            rules: RuleList::new(),
        }
    }

    /// Older builds predate the console toggles and always end Earthbound
    fn configure_for_build(&mut self, server: &ModuleImage) -> bool {
        if server.size >= SERVER_MODERN_SIZE {
            return true;
        }
        info!(
            "Pre-toggle server.dll ({:#x}): Earthbound end always on",
            server.size
        );
        self.features.set(FEATURE_EB_END, true);
        if server.size <= SERVER_MOD_SIZE {
            self.eb_end_map = EB_END_MAP_MOD;
        }
        false
    }

    fn find_command_buffer(ctx: &GameContext<'_>, server: &ModuleImage) -> Option<u64> {
        let scanner = SignatureScanner::new(ctx.reader, server.clone());
        let signature = CodeSignature::deref(COMMAND_SIGNATURE, COMMAND_SIGNATURE_OFFSET);
        let buffer = scanner.scan(&signature)? + COMMAND_BUFFER_OFFSET;
        debug!("Command buffer at 0x{:X}", buffer);
        Some(buffer)
    }

    fn poll_commands(&mut self, ctx: &GameContext<'_>) {
        if let Some(channel) = self.command.as_mut() {
            channel.poll(ctx.reader, &mut self.features);
        }
    }

    fn build_rules(&mut self, ctx: &GameContext<'_>, map: &str) {
        let entities = ctx.entities();

        if map == LAST_MAP && ctx.state.player_entity != 0 {
            let Some(nihilanth) = entities.entity_by_name("nihilanth") else {
                debug!("nihilanth not found");
                return;
            };
            if let Some(health) = self.health_offset {
                self.rules.push(ValueRule::new(
                    RULE_NIHILANTH_DEAD,
                    Probe::Int(Watcher::at_member(nihilanth, health)),
                    Check::FallsTo(0.0),
                    SplitOutcome::PlayerLostControl,
                ));
            }
            self.rules.push(
                ValueRule::new(
                    RULE_NIHILANTH_PHASE,
                    Probe::Int(Watcher::at_member(nihilanth, NIHILANTH_PHASE_COUNTER)),
                    Check::IncreasedBy(1),
                    SplitOutcome::PlayerLostControl,
                )
                .unlatched(),
            );
        } else if map == HC_START_MAP {
            if let (Some(door), Some(origin)) = (
                entities.entity_by_name("tram_door_door_out"),
                ctx.offsets.entity.abs_origin,
            ) {
                self.rules.push(
                    ValueRule::new(
                        "hazard course start",
                        Probe::Position(Watcher::at_member(door, origin)),
                        Check::Arrives {
                            target: HC_DOOR_OPEN_POS,
                            planar: false,
                        },
                        SplitOutcome::PlayerGainedControl,
                    )
                    .tolerance(HC_DOOR_TOLERANCE),
                );
            }
        } else if map == HC_END_MAP
            && let (Some(sprite), Some(effects)) = (
                entities.entity_by_name("spr_camera_flash"),
                self.effects_offset,
            )
        {
            self.rules.push(
                ValueRule::new(
                    "hazard course end",
                    Probe::UInt(Watcher::at_member(sprite, effects)),
                    Check::BitRaised(EntityEffects::NO_DRAW.bits()),
                    SplitOutcome::PlayerLostControl,
                )
                .after_ticks(HC_END_MIN_TICKS),
            );
        }
    }

    fn camera_transition(&self, ctx: &GameContext<'_>) -> RuleResult {
        let state = ctx.state;
        let (prev, current) = (
            state.prev_player_view_entity_index,
            state.player_view_entity_index,
        );
        let map = ctx.map();

        if map == self.eb_end_map && self.features.is_enabled(FEATURE_EB_END) {
            if let Some(camera) = self.eb_camera
                && current == camera
                && prev == ENT_INDEX_PLAYER
            {
                debug!("earthbound end");
                return RuleResult::lost().latched();
            }
        } else if map == XEN_START_MAP
            && let Some(camera) = self.xen_camera
            && current == ENT_INDEX_PLAYER
            && prev == camera
        {
            if self.features.is_enabled(FEATURE_XEN_START) {
                debug!("xen start");
                return RuleResult::gained().latched();
            }
            if self.features.is_enabled(FEATURE_XEN_SPLIT) {
                debug!("xen split");
                return RuleResult::lost().latched();
            }
        }
        RuleResult::NONE
    }
}

impl Default for BlackMesa {
    fn default() -> Self {
        Self::new()
    }
}

impl GameSupport for BlackMesa {
    fn profile(&self) -> &GameProfile {
        &self.profile
    }

    fn on_attach(&mut self, ctx: &GameContext<'_>) -> Result<()> {
        self.health_offset = ctx.server_member_offset("m_iHealth");
        self.effects_offset = ctx.server_member_offset("m_fEffects");
        debug!(
            "m_iHealth={:?} m_fEffects={:?}",
            self.health_offset, self.effects_offset
        );

        self.command = None;
        let Some(server) = ctx.module(SERVER_MODULE) else {
            return Ok(());
        };
        if self.configure_for_build(server) {
            match Self::find_command_buffer(ctx, server) {
                Some(buffer) => self.command = Some(CommandChannel::new(buffer)),
                None => debug!("Command buffer not found, console toggles disabled"),
            }
        }
        // A toggle typed before attaching still counts
        self.poll_commands(ctx);
        Ok(())
    }

    fn on_session_start(&mut self, ctx: &GameContext<'_>) -> Result<()> {
        self.rules.clear();
        self.eb_camera = None;
        self.xen_camera = None;

        let map = ctx.map();
        if map == self.eb_end_map {
            self.eb_camera = ctx.entities().index_by_name("locked_in");
        } else if map == XEN_START_MAP {
            self.xen_camera = ctx.entities().index_by_name("stand_viewcontrol");
        } else {
            self.build_rules(ctx, map);
        }
        Ok(())
    }

    fn on_update(&mut self, ctx: &GameContext<'_>) -> Result<RuleResult> {
        self.poll_commands(ctx);

        if let Some((name, result)) = self.rules.evaluate(ctx) {
            if name == RULE_NIHILANTH_PHASE && !self.features.is_enabled(FEATURE_NIHI_SPLIT) {
                return Ok(RuleResult::NONE);
            }
            debug!("{}", name);
            return Ok(result);
        }

        Ok(self.camera_transition(ctx))
    }

    fn features_mut(&mut self) -> Option<&mut FeatureFlags> {
        Some(&mut self.features)
    }
}
