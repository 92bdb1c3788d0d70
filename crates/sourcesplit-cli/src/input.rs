use crate::shutdown::ShutdownSignal;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Quit,
    ResetTimer,
}

/// Watch the console for control keys: Esc or `q` quits, `r` resets the timer.
pub fn spawn_keyboard_monitor(signal: Arc<ShutdownSignal>) -> JoinHandle<()> {
    thread::spawn(move || {
        debug!("Keyboard monitor started");

        while !signal.is_shutdown() {
            if !event::poll(Duration::from_millis(100)).unwrap_or(false) {
                continue;
            }
            let Ok(Event::Key(key)) = event::read() else {
                continue;
            };
            match action_for(&key) {
                Some(KeyAction::Quit) => {
                    debug!("Quit key pressed: {:?}", key.code);
                    signal.trigger();
                    break;
                }
                Some(KeyAction::ResetTimer) => {
                    info!("Timer reset requested");
                    signal.request_timer_reset();
                }
                None => {}
            }
        }

        debug!("Keyboard monitor stopped");
    })
}

fn action_for(key: &KeyEvent) -> Option<KeyAction> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => Some(KeyAction::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyAction::Quit)
        }
        KeyCode::Char('r') | KeyCode::Char('R') => Some(KeyAction::ResetTimer),
        _ => None,
    }
}
