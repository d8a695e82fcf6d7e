//! Keyboard quit listener for watch mode
//!
//! Raw mode is needed to see single key presses, which also means Ctrl+C
//! arrives as a key event rather than SIGINT. The listener cancels the shared
//! token on `q`, `Esc` or `Ctrl+C` and exits when the token trips for any
//! other reason.

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Raw mode for as long as the guard lives.
pub struct RawModeGuard(());

impl RawModeGuard {
    pub fn enable() -> std::io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

pub fn is_quit_key(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Listen for quit keys until one is pressed or `cancel` trips elsewhere.
pub fn spawn_quit_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = EventStream::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.next() => match event {
                    Some(Ok(Event::Key(key))) if is_quit_key(&key) => {
                        debug!(code = ?key.code, "quit key pressed");
                        cancel.cancel();
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "keyboard input failed, quit keys disabled");
                        break;
                    }
                    None => break,
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode, modifiers: KeyModifiers, kind: KeyEventKind) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind,
            state: KeyEventState::NONE,
        }
    }

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        key(code, modifiers, KeyEventKind::Press)
    }

    #[test]
    fn quit_keys() {
        assert!(is_quit_key(&press(KeyCode::Char('q'), KeyModifiers::NONE)));
        assert!(is_quit_key(&press(KeyCode::Char('Q'), KeyModifiers::SHIFT)));
        assert!(is_quit_key(&press(KeyCode::Esc, KeyModifiers::NONE)));
        assert!(is_quit_key(&press(KeyCode::Char('c'), KeyModifiers::CONTROL)));
    }

    #[test]
    fn other_keys_are_ignored() {
        assert!(!is_quit_key(&press(KeyCode::Char('c'), KeyModifiers::NONE)));
        assert!(!is_quit_key(&press(KeyCode::Char('x'), KeyModifiers::NONE)));
        assert!(!is_quit_key(&press(KeyCode::Enter, KeyModifiers::NONE)));
    }

    #[test]
    fn key_release_is_ignored() {
        assert!(!is_quit_key(&key(
            KeyCode::Char('q'),
            KeyModifiers::NONE,
            KeyEventKind::Release
        )));
    }
}
