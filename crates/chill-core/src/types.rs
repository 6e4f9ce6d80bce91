//! Core types for Chill Core

use crate::error::{ErrorKind, PlaybackError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Playback rates offered by the player UI
pub const PLAYBACK_RATES: [f64; 6] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0];

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Language used for user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Vi,
    En,
}

/// What to play. Immutable for the life of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSource {
    pub url: String,
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
    #[serde(default)]
    pub poster: Option<String>,
}

fn default_autoplay() -> bool {
    true
}

impl PlaybackSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            autoplay: true,
            poster: None,
        }
    }

    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn with_poster(mut self, poster: impl Into<String>) -> Self {
        self.poster = Some(poster.into());
        self
    }

    /// Empty or blank URLs never start a pipeline
    pub fn is_empty(&self) -> bool {
        self.url.trim().is_empty()
    }
}

/// A quality tier discovered after the manifest is parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamLevel {
    /// Engine index of this tier
    pub index: usize,
    /// Vertical resolution in pixels
    pub height: u32,
    /// Advertised bandwidth in bits per second
    pub bitrate: Option<u64>,
}

impl StreamLevel {
    pub fn new(index: usize, height: u32) -> Self {
        Self {
            index,
            height,
            bitrate: None,
        }
    }
}

/// Sort levels for display: highest resolution first, engine order on ties
pub fn sort_levels_for_display(levels: &mut [StreamLevel]) {
    levels.sort_by(|a, b| b.height.cmp(&a.height).then(a.index.cmp(&b.index)));
}

/// Quality selection: automatic (`-1`) or a pinned level index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum LevelSelection {
    #[default]
    Auto,
    Pinned(usize),
}

impl LevelSelection {
    /// Engine-facing index, `-1` for automatic selection
    pub fn index(&self) -> i32 {
        match self {
            LevelSelection::Auto => -1,
            LevelSelection::Pinned(index) => i32::try_from(*index).unwrap_or(i32::MAX),
        }
    }
}

impl From<i32> for LevelSelection {
    fn from(index: i32) -> Self {
        match usize::try_from(index) {
            Ok(index) => LevelSelection::Pinned(index),
            Err(_) => LevelSelection::Auto,
        }
    }
}

impl From<LevelSelection> for i32 {
    fn from(selection: LevelSelection) -> Self {
        selection.index()
    }
}

/// Observable playback status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    /// No pipeline attached
    #[default]
    Idle,
    /// Waiting for the manifest or metadata
    Loading,
    Playing,
    Paused,
    /// Playback wants to progress but ran out of data
    Buffering,
    Errored,
    Ended,
}

impl PlaybackStatus {
    /// Waiting on the network rather than on the user
    pub fn is_busy(&self) -> bool {
        matches!(self, PlaybackStatus::Loading | PlaybackStatus::Buffering)
    }
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackStatus::Idle => write!(f, "idle"),
            PlaybackStatus::Loading => write!(f, "loading"),
            PlaybackStatus::Playing => write!(f, "playing"),
            PlaybackStatus::Paused => write!(f, "paused"),
            PlaybackStatus::Buffering => write!(f, "buffering"),
            PlaybackStatus::Errored => write!(f, "errored"),
            PlaybackStatus::Ended => write!(f, "ended"),
        }
    }
}

/// Everything the presentation layer needs, published on every change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub session_id: SessionId,
    pub status: PlaybackStatus,
    pub position: f64,
    /// 0 until known
    pub duration: f64,
    /// End of the last buffered range
    pub buffered_end: f64,
    pub buffered_ahead: f64,
    pub volume: f64,
    pub muted: bool,
    pub playback_rate: f64,
    pub selected_level: LevelSelection,
    /// Level the engine reports as currently playing
    pub current_level: Option<usize>,
    /// Discovered levels, highest resolution first
    pub levels: Vec<StreamLevel>,
    pub fullscreen: bool,
    pub controls_visible: bool,
    pub retry_count: u32,
    pub error: Option<PlaybackError>,
    /// Autoplay was refused by the host; the user has to press play
    pub autoplay_blocked: bool,
    /// Playback was handed to the fallback delivery path
    pub fallback_requested: bool,
    /// A fallback callback exists, so the UI can offer the switch
    pub can_fallback: bool,
}

impl PlaybackState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            status: PlaybackStatus::Idle,
            position: 0.0,
            duration: 0.0,
            buffered_end: 0.0,
            buffered_ahead: 0.0,
            volume: 1.0,
            muted: false,
            playback_rate: 1.0,
            selected_level: LevelSelection::Auto,
            current_level: None,
            levels: Vec::new(),
            fullscreen: false,
            controls_visible: true,
            retry_count: 0,
            error: None,
            autoplay_blocked: false,
            fallback_requested: false,
            can_fallback: false,
        }
    }

    /// Spinner visibility
    pub fn is_loading(&self) -> bool {
        self.status.is_busy()
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Serialize for host bindings
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Why playback was handed to the fallback path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The user asked for it
    UserRequested,
    /// Retries for a recoverable error ran out
    RetriesExhausted(ErrorKind),
}

/// Hand-off report given to the caller's fallback callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRequest {
    pub url: String,
    pub reason: FallbackReason,
    /// Where the primary pipeline was when it was torn down
    pub position: f64,
}
