//! Input handling for the TUI.
//!
//! Every keypress is one intent; the navigation controller decides whether
//! it is honored. Wheel notches carry no magnitude in a terminal, so each one
//! is reported as `wheel_step` pixels and goes through the wheel threshold.

use crate::app::App;
use crossterm::event::{KeyCode, KeyModifiers, MouseEventKind};
use reelsync::navigation::Direction;

use super::Action;

/// Map a key to a navigation direction.
pub(super) fn key_direction(code: KeyCode) -> Option<Direction> {
    match code {
        KeyCode::Char('j') | KeyCode::Down | KeyCode::PageDown | KeyCode::Char(' ') => {
            Some(Direction::Next)
        }
        KeyCode::Char('k') | KeyCode::Up | KeyCode::PageUp => Some(Direction::Prev),
        _ => None,
    }
}

pub(super) fn handle_key(app: &mut App, code: KeyCode, modifiers: KeyModifiers) -> Action {
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        return Action::Quit;
    }

    match code {
        KeyCode::Char('q') | KeyCode::Esc => return Action::Quit,
        KeyCode::Char('g') | KeyCode::Home => app.jump_to_top(),
        _ => {
            if let Some(direction) = key_direction(code) {
                app.step(direction);
            }
        }
    }
    Action::Continue
}

pub(super) fn handle_mouse(app: &mut App, kind: MouseEventKind) {
    match kind {
        MouseEventKind::ScrollDown => app.wheel(Direction::Next),
        MouseEventKind::ScrollUp => app.wheel(Direction::Prev),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_directions() {
        for code in [
            KeyCode::Char('j'),
            KeyCode::Down,
            KeyCode::PageDown,
            KeyCode::Char(' '),
        ] {
            assert_eq!(key_direction(code), Some(Direction::Next));
        }
        for code in [KeyCode::Char('k'), KeyCode::Up, KeyCode::PageUp] {
            assert_eq!(key_direction(code), Some(Direction::Prev));
        }
        assert_eq!(key_direction(KeyCode::Char('x')), None);
        assert_eq!(key_direction(KeyCode::Enter), None);
    }
}
