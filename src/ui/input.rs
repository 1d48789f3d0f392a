// Global playback shortcuts.
// Only active when the URL input isn't being typed into; a matched key is
// consumed and never reaches the input.

use crossterm::event::KeyCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    TogglePlay,
    Next,
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Normal,
    UrlInput,
}

pub fn map_key(key: KeyCode, focus: Focus) -> Option<Shortcut> {
    if focus == Focus::UrlInput {
        return None;
    }
    match key {
        KeyCode::Char(' ') => Some(Shortcut::TogglePlay),
        KeyCode::Right => Some(Shortcut::Next),
        KeyCode::Left => Some(Shortcut::Previous),
        _ => None,
    }
}
