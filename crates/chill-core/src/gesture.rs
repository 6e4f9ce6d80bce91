//! Tap and click gestures on the player surface
//!
//! The surface is split into three zones. A tap arriving less than the
//! double-tap window after the previous one is a double tap; otherwise it is
//! a single tap whose effect the session defers until the window has passed.
//! Only timestamps are compared, so touch and pointer input behave the same.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Horizontal zone of the player surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TapZone {
    Left,
    Center,
    Right,
}

impl TapZone {
    /// Share of the width taken by each side zone
    pub const SIDE_FRACTION: f64 = 0.35;

    /// Zone for a horizontal offset inside a surface of `width`
    pub fn from_offset(x: f64, width: f64) -> Self {
        if !(width > 0.0) {
            return TapZone::Center;
        }
        let fraction = x / width;
        if fraction < Self::SIDE_FRACTION {
            TapZone::Left
        } else if fraction < 1.0 - Self::SIDE_FRACTION {
            TapZone::Center
        } else {
            TapZone::Right
        }
    }

    pub fn double_tap_action(&self) -> GestureAction {
        match self {
            TapZone::Left => GestureAction::SkipBackward,
            TapZone::Center => GestureAction::ToggleFullscreen,
            TapZone::Right => GestureAction::SkipForward,
        }
    }
}

/// What a double tap does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GestureAction {
    SkipBackward,
    SkipForward,
    ToggleFullscreen,
}

/// Classification of one tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    /// First tap of a possible pair; act once the window passes
    Single,
    Double(GestureAction),
}

/// Double-tap detector
#[derive(Debug, Clone)]
pub struct TapDetector {
    window: Duration,
    last_tap: Option<Duration>,
}

impl TapDetector {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_tap: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Classify a tap at host timestamp `at`
    pub fn register(&mut self, zone: TapZone, at: Duration) -> TapOutcome {
        let outcome = match self.last_tap {
            Some(previous) if at >= previous && at - previous < self.window => {
                TapOutcome::Double(zone.double_tap_action())
            }
            _ => TapOutcome::Single,
        };
        self.last_tap = Some(at);
        outcome
    }

    /// Forget the last tap so the next one is a single tap
    pub fn reset(&mut self) {
        self.last_tap = None;
    }
}
