//! Key conversion from crossterm to the session's key model.

use crossterm::event::{KeyCode as CtKeyCode, KeyEvent, KeyModifiers};
use evalbox::{Key, KeyCode};

/// Convert a crossterm KeyEvent to a session Key.
///
/// Keys the session has no use for (function keys, page keys, media keys)
/// come back as `None`.
pub fn convert_key(event: KeyEvent) -> Option<Key> {
    let code = match event.code {
        CtKeyCode::Char(c) => KeyCode::Char(c),
        CtKeyCode::Esc => KeyCode::Escape,
        CtKeyCode::Backspace => KeyCode::Backspace,
        CtKeyCode::Delete => KeyCode::Delete,
        CtKeyCode::Left => KeyCode::Left,
        CtKeyCode::Right => KeyCode::Right,
        CtKeyCode::Up => KeyCode::Up,
        CtKeyCode::Down => KeyCode::Down,
        CtKeyCode::Home => KeyCode::Home,
        CtKeyCode::End => KeyCode::End,
        CtKeyCode::Tab => KeyCode::Tab,
        CtKeyCode::Enter => KeyCode::Enter,
        _ => return None,
    };

    Some(Key {
        code,
        ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
        shift: event.modifiers.contains(KeyModifiers::SHIFT),
    })
}
