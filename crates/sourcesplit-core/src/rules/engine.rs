use strum::Display;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::memory::{ModuleImage, ReadMemory};
use crate::offset::GameOffsets;
use crate::rules::{GameContext, GameSupport, RuleResult, SplitOutcome};
use crate::state::{GameState, SignOnState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EnginePhase {
    Unattached,
    Attached,
    SessionActive,
}

/// Drives one game's rules against a live process
pub struct SplitEngine {
    game: Box<dyn GameSupport>,
    offsets: Option<GameOffsets>,
    modules: Vec<ModuleImage>,
    state: GameState,
    phase: EnginePhase,
    /// A latching outcome fired this session
    latched: bool,
    /// What the rules reported last tick, before suppression
    last_outcome: SplitOutcome,
    /// The game's rules failed this session
    faulted: bool,
}

impl SplitEngine {
    pub fn new(game: Box<dyn GameSupport>) -> Self {
        Self {
            game,
            offsets: None,
            modules: Vec::new(),
            state: GameState::new(),
            phase: EnginePhase::Unattached,
            latched: false,
            last_outcome: SplitOutcome::NoAction,
            faulted: false,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn offsets(&self) -> Option<&GameOffsets> {
        self.offsets.as_ref()
    }

    pub fn game(&self) -> &dyn GameSupport {
        self.game.as_ref()
    }

    pub fn game_mut(&mut self) -> &mut dyn GameSupport {
        self.game.as_mut()
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Take resolved offsets for a newly opened process and run the game's attach hook.
    ///
    /// A failing hook is logged and leaves the game's optional features off.
    pub fn attach(
        &mut self,
        reader: &dyn ReadMemory,
        offsets: GameOffsets,
        modules: Vec<ModuleImage>,
    ) {
        self.offsets = Some(offsets);
        self.modules = modules;
        self.state = GameState::new();
        self.latched = false;
        self.last_outcome = SplitOutcome::NoAction;
        self.faulted = false;

        let hooked = self.call_game(reader, |game, ctx| game.on_attach(ctx));
        if let Some(Err(e)) = hooked {
            warn!("{} attach hook failed: {}", self.game.profile().name, e);
        }

        self.phase = EnginePhase::Attached;
        info!("Attached ({})", self.game.profile().name);
    }

    pub fn detach(&mut self) {
        if self.phase != EnginePhase::Unattached {
            info!("Detached");
        }
        self.offsets = None;
        self.modules.clear();
        self.phase = EnginePhase::Unattached;
    }

    /// Forward a timer reset from the host
    pub fn on_timer_reset(&mut self) {
        self.game.on_timer_reset();
    }

    /// Poll once. Never fails: read problems and rule faults become `NoAction`.
    pub fn update(&mut self, reader: &dyn ReadMemory) -> SplitOutcome {
        let Some(offsets) = self.offsets.as_ref() else {
            return SplitOutcome::NoAction;
        };

        let required = self.game.profile().required;
        if let Err(e) = self.state.update(reader, offsets, required) {
            if e.is_transient() {
                debug!("Snapshot read failed, retrying next tick: {}", e);
            } else {
                warn!("Snapshot unavailable: {}", e);
            }
            return SplitOutcome::NoAction;
        }

        let full = self.state.sign_on_state == SignOnState::Full;
        let session_started = full
            && (self.state.prev_sign_on_state != SignOnState::Full || self.state.map_changed());

        if !full {
            if self.phase == EnginePhase::SessionActive {
                debug!("Session ended ({})", self.state.sign_on_state);
                self.phase = EnginePhase::Attached;
            }
            return SplitOutcome::NoAction;
        }

        if session_started {
            return self.start_session(reader);
        }

        self.run_rules(reader)
    }

    /// Run a game hook with a context borrowed from the engine's own fields
    fn call_game<T>(
        &mut self,
        reader: &dyn ReadMemory,
        hook: impl FnOnce(&mut dyn GameSupport, &GameContext<'_>) -> T,
    ) -> Option<T> {
        let ctx = GameContext {
            reader,
            offsets: self.offsets.as_ref()?,
            state: &self.state,
            modules: &self.modules,
        };
        Some(hook(self.game.as_mut(), &ctx))
    }

    fn start_session(&mut self, reader: &dyn ReadMemory) -> SplitOutcome {
        self.state.start_session();
        self.latched = false;
        self.last_outcome = SplitOutcome::NoAction;
        self.faulted = false;
        self.phase = EnginePhase::SessionActive;
        info!("Session started on {}", self.state.current_map);

        let result = self
            .call_game(reader, |game, ctx| game.on_session_start(ctx))
            .unwrap_or(Ok(()));
        if let Err(e) = result {
            self.fail(&e);
            return SplitOutcome::NoAction;
        }

        if self.game.profile().starts_on_load(&self.state.current_map) {
            info!("Start on load: {}", self.state.current_map);
            return SplitOutcome::PlayerGainedControl;
        }
        SplitOutcome::NoAction
    }

    /// Games keep seeing every tick while latched; only their outcomes are dropped.
    ///
    /// An outcome reported on consecutive ticks is one edge and is emitted once.
    fn run_rules(&mut self, reader: &dyn ReadMemory) -> SplitOutcome {
        if self.faulted {
            return SplitOutcome::NoAction;
        }

        let result: Result<RuleResult> = self
            .call_game(reader, |game, ctx| game.on_update(ctx))
            .unwrap_or(Ok(RuleResult::NONE));

        let repeated = matches!(&result, Ok(r) if r.is_action() && r.outcome == self.last_outcome);
        if let Ok(r) = &result {
            self.last_outcome = r.outcome;
        }

        match result {
            Ok(result) if self.latched => {
                if result.is_action() {
                    debug!("Suppressed {} (latched)", result.outcome);
                }
                SplitOutcome::NoAction
            }
            Ok(result) if repeated => {
                debug!("Suppressed {} (same edge as last tick)", result.outcome);
                SplitOutcome::NoAction
            }
            Ok(result) => {
                if result.latch && result.is_action() {
                    self.latched = true;
                }
                if result.is_action() {
                    info!(
                        "{} on {} at tick {}",
                        result.outcome,
                        self.state.current_map,
                        self.state.tick_count()
                    );
                }
                result.outcome
            }
            Err(e) => {
                self.fail(&e);
                SplitOutcome::NoAction
            }
        }
    }

    /// Read failures retry next tick; anything else disables the rules for the session
    fn fail(&mut self, error: &Error) {
        if error.is_transient() {
            debug!("Rule read failed, retrying next tick: {}", error);
            return;
        }
        warn!(
            "{} rules disabled until next session: {}",
            self.game.profile().name,
            error
        );
        self.faulted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::layout::globals;
    use crate::memory::{MockMemoryBuilder, MockMemoryReader};
    use crate::rules::GameProfile;

    const GLOBALS: u64 = 0x1000;
    const SIGN_ON: u64 = 0x1100;
    const MAP: u64 = 0x1200;
    const TRIGGER: u64 = 0x1300;

    /// Fires whatever the trigger byte says: 1 lost (latched), 2 gained, 3 fault
    struct Scripted {
        profile: GameProfile,
        sessions: u32,
        resets: u32,
    }

    impl Scripted {
        fn new() -> Self {
            Self {
                profile: GameProfile {
                    name: "scripted",
                    start_on_load_maps: &["intro"],
                    ..Default::default()
                },
                sessions: 0,
                resets: 0,
            }
        }
    }

    impl GameSupport for Scripted {
        fn profile(&self) -> &GameProfile {
            &self.profile
        }

        fn on_session_start(&mut self, _ctx: &GameContext<'_>) -> Result<()> {
            self.sessions += 1;
            Ok(())
        }

        fn on_update(&mut self, ctx: &GameContext<'_>) -> Result<RuleResult> {
            match ctx.reader.read_u8(TRIGGER)? {
                1 => Ok(RuleResult::lost().latched()),
                2 => Ok(RuleResult::gained()),
                3 => Err(Error::LogicFault("scripted".to_string())),
                _ => Ok(RuleResult::NONE),
            }
        }

        fn on_timer_reset(&mut self) {
            self.resets += 1;
        }
    }

    fn process(map: &str) -> MockMemoryReader {
        MockMemoryBuilder::new()
            .write_i32(GLOBALS + globals::TICK_COUNT, 100)
            .write_f32(GLOBALS + globals::INTERVAL_PER_TICK, 0.015)
            .write_i32(SIGN_ON, SignOnState::Full as i32)
            .write_str(MAP, map)
            .write_u8(TRIGGER, 0)
            .build()
    }

    fn offsets() -> GameOffsets {
        GameOffsets {
            cur_time: Some(GLOBALS),
            sign_on_state: Some(SIGN_ON),
            cur_map: Some(MAP),
            ..Default::default()
        }
    }

    fn attached(mem: &MockMemoryReader) -> SplitEngine {
        let mut engine = SplitEngine::new(Box::new(Scripted::new()));
        engine.attach(mem, offsets(), Vec::new());
        engine
    }

    #[test]
    fn test_unattached_engine_does_nothing() {
        let mem = process("d1_canals_01");
        let mut engine = SplitEngine::new(Box::new(Scripted::new()));
        assert_eq!(engine.phase(), EnginePhase::Unattached);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
    }

    #[test]
    fn test_session_starts_when_sign_on_reaches_full() {
        let mut mem = process("d1_canals_01");
        mem.write_i32(SIGN_ON, SignOnState::PreSpawn as i32);
        let mut engine = attached(&mem);
        assert_eq!(engine.phase(), EnginePhase::Attached);

        engine.update(&mem);
        assert_eq!(engine.phase(), EnginePhase::Attached);

        mem.write_i32(SIGN_ON, SignOnState::Full as i32);
        engine.update(&mem);
        assert_eq!(engine.phase(), EnginePhase::SessionActive);
        assert_eq!(engine.state().tick_count(), 0);

        mem.write_i32(SIGN_ON, SignOnState::ChangeLevel as i32);
        engine.update(&mem);
        assert_eq!(engine.phase(), EnginePhase::Attached);
    }

    #[test]
    fn test_start_on_load_map_emits_once() {
        let mem = process("intro");
        let mut engine = attached(&mem);
        assert_eq!(engine.update(&mem), SplitOutcome::PlayerGainedControl);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
    }

    #[test]
    fn test_latch_suppresses_until_session_restart() {
        let mut mem = process("d1_canals_01");
        let mut engine = attached(&mem);
        engine.update(&mem);

        mem.write_u8(TRIGGER, 1);
        assert_eq!(engine.update(&mem), SplitOutcome::PlayerLostControl);
        assert!(engine.is_latched());
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);

        // A map change while fully signed on starts a new session
        mem.write_str(MAP, "d1_canals_02");
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
        assert!(!engine.is_latched());
        assert_eq!(engine.update(&mem), SplitOutcome::PlayerLostControl);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
    }

    #[test]
    fn test_unlatched_outcome_fires_once_per_edge() {
        let mut mem = process("d1_canals_01");
        let mut engine = attached(&mem);
        engine.update(&mem);

        mem.write_u8(TRIGGER, 2);
        assert_eq!(engine.update(&mem), SplitOutcome::PlayerGainedControl);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
        assert!(!engine.is_latched());

        // Trigger drops then rises again: a new edge
        mem.write_u8(TRIGGER, 0);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
        mem.write_u8(TRIGGER, 2);
        assert_eq!(engine.update(&mem), SplitOutcome::PlayerGainedControl);
    }

    #[test]
    fn test_read_failure_does_not_split_an_edge() {
        let mut mem = process("d1_canals_01");
        let mut engine = attached(&mem);
        engine.update(&mem);

        mem.write_u8(TRIGGER, 2);
        assert_eq!(engine.update(&mem), SplitOutcome::PlayerGainedControl);
        mem.unmap(TRIGGER, 1);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
        mem.write_u8(TRIGGER, 2);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
    }

    #[test]
    fn test_fault_disables_rules_for_session() {
        let mut mem = process("d1_canals_01");
        let mut engine = attached(&mem);
        engine.update(&mem);

        mem.write_u8(TRIGGER, 3);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
        assert!(engine.is_faulted());

        mem.write_u8(TRIGGER, 2);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);

        mem.write_str(MAP, "d1_canals_02");
        engine.update(&mem);
        assert!(!engine.is_faulted());
        assert_eq!(engine.update(&mem), SplitOutcome::PlayerGainedControl);
    }

    #[test]
    fn test_rule_read_failure_does_not_fault() {
        let mut mem = process("d1_canals_01");
        let mut engine = attached(&mem);
        engine.update(&mem);

        mem.unmap(TRIGGER, 1);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
        assert!(!engine.is_faulted());

        mem.write_u8(TRIGGER, 2);
        assert_eq!(engine.update(&mem), SplitOutcome::PlayerGainedControl);
    }

    #[test]
    fn test_transient_read_failure_is_no_action() {
        let mut mem = process("d1_canals_01");
        let mut engine = attached(&mem);
        engine.update(&mem);

        mem.write_u8(TRIGGER, 2);
        mem.unmap(SIGN_ON, 4);
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
        assert_eq!(engine.phase(), EnginePhase::SessionActive);

        mem.write_i32(SIGN_ON, SignOnState::Full as i32);
        assert_eq!(engine.update(&mem), SplitOutcome::PlayerGainedControl);
    }

    #[test]
    fn test_detach_and_timer_reset() {
        let mem = process("d1_canals_01");
        let mut engine = attached(&mem);
        engine.on_timer_reset();
        engine.detach();
        assert_eq!(engine.phase(), EnginePhase::Unattached);
        assert!(engine.offsets().is_none());
        assert_eq!(engine.update(&mem), SplitOutcome::NoAction);
    }
}
