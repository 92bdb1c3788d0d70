//! Main autosplitting mode.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Local};
use owo_colors::OwoColorize;
use serde_json::{Value, json};
use sourcesplit_core::memory::layout::{strings, timing};
use sourcesplit_core::{
    Config, GameOffsets, GameState, GameSupport, MemoryReader, OffsetSignatureSet,
    ProcessHandle, ReadMemory, SplitEngine, SplitOutcome, detect,
};
use tracing::{debug, error, info, warn};

use super::{AttachOptions, load_signature_set, resolve_offsets, wait_for_process};
use crate::input;
use crate::shutdown::ShutdownSignal;

pub fn run(options: &AttachOptions, json_output: bool) -> Result<()> {
    let config = options.load_config()?;
    let signatures = load_signature_set(&config)?;

    let shutdown = Arc::new(ShutdownSignal::new());
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        shutdown_ctrlc.trigger();
    })?;
    let _keyboard = input::spawn_keyboard_monitor(Arc::clone(&shutdown));

    info!("sourcesplit {}", env!("CARGO_PKG_VERSION"));
    println!("Waiting for the game... (Esc or q to quit, r to reset the timer)");

    while !shutdown.is_shutdown() {
        let Some(process) = wait_for_process(&config, &shutdown) else {
            break;
        };

        if let Err(e) = track(&process, &config, &signatures, &shutdown, json_output) {
            error!("Tracking stopped: {:#}", e);
        }

        // Do not re-attach to a process we already gave up on
        let retry = Duration::from_millis(timing::ATTACH_RETRY_MS);
        while process.is_alive() && !shutdown.wait(retry) {}
        if !shutdown.is_shutdown() {
            info!("Game closed, waiting for restart...");
        }
    }

    info!("Stopped");
    Ok(())
}

fn track(
    process: &ProcessHandle,
    config: &Config,
    signatures: &OffsetSignatureSet,
    shutdown: &ShutdownSignal,
    json_output: bool,
) -> Result<()> {
    let reader = MemoryReader::new(process);
    let offsets = resolve_offsets(process, &reader, config, signatures);
    if !offsets.is_valid() {
        bail!(
            "required offsets unresolved: {}",
            offsets.missing().join(", ")
        );
    }

    let Some(game) = detect_game(process, &reader, &offsets, shutdown)? else {
        return Ok(());
    };

    let mut engine = SplitEngine::new(game);
    engine.attach(&reader, offsets, process.modules.clone());
    apply_initial_flags(&mut engine, &config.initial_flags);

    let poll = config.poll_interval();
    while process.is_alive() {
        if shutdown.take_timer_reset() {
            engine.on_timer_reset();
        }

        let outcome = engine.update(&reader);
        if outcome != SplitOutcome::NoAction {
            report(outcome, engine.state(), json_output);
        }

        if shutdown.wait(poll) {
            break;
        }
    }

    engine.detach();
    Ok(())
}

/// Pick the rule set from the game directory, waiting for the engine to publish it
fn detect_game(
    process: &ProcessHandle,
    reader: &MemoryReader<'_>,
    offsets: &GameOffsets,
    shutdown: &ShutdownSignal,
) -> Result<Option<Box<dyn GameSupport>>> {
    let Some(game_dir) = offsets.game_dir else {
        bail!("game directory offset unresolved, cannot identify the game");
    };

    let retry = Duration::from_millis(timing::ATTACH_RETRY_MS);
    loop {
        let dir = reader.read_string(game_dir, strings::GAME_DIR_MAX_LEN);
        if !dir.is_empty() {
            return match detect(&dir) {
                Some(game) => {
                    info!("Detected {} ({})", game.profile().name, dir);
                    Ok(Some(game))
                }
                None => bail!("unsupported game directory '{}'", dir),
            };
        }
        debug!("Game directory not set yet");
        if shutdown.wait(retry) || !process.is_alive() {
            return Ok(None);
        }
    }
}

fn apply_initial_flags(engine: &mut SplitEngine, flags: &BTreeMap<String, bool>) {
    if flags.is_empty() {
        return;
    }
    let name = engine.game().profile().name;
    let Some(features) = engine.game_mut().features_mut() else {
        warn!("{} has no feature flags, ignoring initial_flags", name);
        return;
    };
    for (flag, enabled) in flags {
        if !features.set(flag, *enabled) {
            warn!("Unknown feature flag '{}' for {}", flag, name);
        }
    }
}

fn report(outcome: SplitOutcome, state: &GameState, json_output: bool) {
    let now = Local::now();
    info!(
        "{} on {} at tick {}",
        outcome,
        state.current_map,
        state.tick_count()
    );

    if json_output {
        println!("{}", split_json(now, outcome, state));
        return;
    }

    let label = match outcome {
        SplitOutcome::PlayerGainedControl => "START".green().bold().to_string(),
        SplitOutcome::PlayerLostControl => "SPLIT".red().bold().to_string(),
        SplitOutcome::NoAction => return,
    };
    println!(
        "[{}] {} {} {}",
        now.format("%H:%M:%S%.3f").dimmed(),
        label,
        state.current_map.cyan(),
        format!("tick {} ({:.3}s)", state.tick_count(), state.tick_time()).dimmed()
    );
}

fn split_json(time: DateTime<Local>, outcome: SplitOutcome, state: &GameState) -> Value {
    json!({
        "time": time,
        "outcome": outcome,
        "map": state.current_map,
        "tick": state.tick_count(),
        "game_time": state.tick_time(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_json() {
        let state = GameState {
            current_map: "d1_trainstation_01".to_string(),
            raw_tick_count: 150,
            tick_base: 50,
            interval_per_tick: 0.015,
            ..GameState::new()
        };
        let value = split_json(Local::now(), SplitOutcome::PlayerGainedControl, &state);

        assert_eq!(value["outcome"], "PlayerGainedControl");
        assert_eq!(value["map"], "d1_trainstation_01");
        assert_eq!(value["tick"], 100);
        assert!(value["time"].is_string());
    }

    #[test]
    fn test_unknown_initial_flag_is_ignored() {
        let mut engine = SplitEngine::new(detect("bms").unwrap());
        let flags = BTreeMap::from([
            ("xenstart".to_string(), true),
            ("bogus".to_string(), true),
        ]);
        apply_initial_flags(&mut engine, &flags);

        let features = engine.game_mut().features_mut().unwrap();
        assert!(features.is_enabled("xenstart"));
        assert!(!features.is_enabled("bogus"));
    }
}
