//! Keyboard shortcuts
//!
//! Bindings work on physical key codes so they do not change with the
//! keyboard layout.

use serde::{Deserialize, Serialize};

/// Control triggered by a shortcut
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControlAction {
    PlayPause,
    SeekForward,
    SeekBackward,
    VolumeUp,
    VolumeDown,
    Mute,
    Fullscreen,
}

impl ControlAction {
    pub fn description(&self) -> &'static str {
        match self {
            ControlAction::PlayPause => "Play / pause",
            ControlAction::SeekForward => "Skip forward",
            ControlAction::SeekBackward => "Skip backward",
            ControlAction::VolumeUp => "Volume up",
            ControlAction::VolumeDown => "Volume down",
            ControlAction::Mute => "Mute / unmute",
            ControlAction::Fullscreen => "Toggle fullscreen",
        }
    }
}

/// Every binding, in display order
pub const BINDINGS: [(&str, ControlAction); 10] = [
    ("Space", ControlAction::PlayPause),
    ("KeyK", ControlAction::PlayPause),
    ("ArrowRight", ControlAction::SeekForward),
    ("KeyL", ControlAction::SeekForward),
    ("ArrowLeft", ControlAction::SeekBackward),
    ("KeyJ", ControlAction::SeekBackward),
    ("ArrowUp", ControlAction::VolumeUp),
    ("ArrowDown", ControlAction::VolumeDown),
    ("KeyF", ControlAction::Fullscreen),
    ("KeyM", ControlAction::Mute),
];

/// Action bound to a key code
pub fn action_for(code: &str) -> Option<ControlAction> {
    BINDINGS
        .iter()
        .find(|(bound, _)| *bound == code)
        .map(|(_, action)| *action)
}

/// Keys whose default action scrolls the page
pub fn suppresses_default(code: &str) -> bool {
    matches!(
        code,
        "Space" | "ArrowUp" | "ArrowDown" | "ArrowLeft" | "ArrowRight"
    )
}

/// Result of routing a key press through the session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyOutcome {
    pub action: Option<ControlAction>,
    /// The host must cancel the browser's default handling
    pub prevent_default: bool,
}

impl KeyOutcome {
    pub fn for_code(code: &str) -> Self {
        Self {
            action: action_for(code),
            prevent_default: suppresses_default(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings() {
        assert_eq!(action_for("Space"), Some(ControlAction::PlayPause));
        assert_eq!(action_for("KeyK"), Some(ControlAction::PlayPause));
        assert_eq!(action_for("ArrowRight"), Some(ControlAction::SeekForward));
        assert_eq!(action_for("KeyJ"), Some(ControlAction::SeekBackward));
        assert_eq!(action_for("ArrowDown"), Some(ControlAction::VolumeDown));
        assert_eq!(action_for("KeyF"), Some(ControlAction::Fullscreen));
        assert_eq!(action_for("KeyM"), Some(ControlAction::Mute));
        assert_eq!(action_for("KeyQ"), None);
    }

    #[test]
    fn test_scroll_keys_suppressed() {
        assert!(KeyOutcome::for_code("Space").prevent_default);
        assert!(KeyOutcome::for_code("ArrowUp").prevent_default);
        assert!(!KeyOutcome::for_code("KeyK").prevent_default);
        assert!(!KeyOutcome::for_code("Tab").prevent_default);
    }
}
