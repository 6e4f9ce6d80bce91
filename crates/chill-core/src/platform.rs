//! Host abstractions the session is built on
//!
//! The session never talks to a browser or decoder directly. A host supplies:
//! - a [`MediaElement`]: the native playback primitive
//! - an [`EngineProvider`]: the adaptive streaming engine factory
//! - a [`FullscreenController`](crate::fullscreen::FullscreenController)
//! - a [`HostDocument`]: document-level event sources
//! - a [`Scheduler`]: one-shot timers
//!
//! Events flow back into the session through its `handle_*` methods, tagged
//! with the listener, engine or timer id they belong to. Ids that are no
//! longer registered are dropped, so a torn down pipeline can never update
//! the state of its successor.
//!
//! Everything here is single-threaded: handles are shared with `Rc` and
//! implementations use interior mutability.

use crate::{config::EngineConfig, fullscreen::FullscreenController, types::StreamLevel};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::time::Duration;

/// MIME type of adaptive manifests for native playback probing
pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";

/// Identifies one registered event listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

/// Identifies one engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineId(pub u64);

/// Identifies one scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(pub u64);

/// Answer of the media primitive's format probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanPlay {
    No,
    Maybe,
    Probably,
}

impl CanPlay {
    /// Parse the browser's `canPlayType` answer
    pub fn from_answer(answer: &str) -> Self {
        match answer {
            "probably" => CanPlay::Probably,
            "maybe" => CanPlay::Maybe,
            _ => CanPlay::No,
        }
    }

    pub fn is_playable(&self) -> bool {
        !matches!(self, CanPlay::No)
    }
}

/// Media element event types a listener can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaEventKind {
    Play,
    Pause,
    Playing,
    Waiting,
    TimeUpdate,
    DurationChange,
    LoadedMetadata,
    Ended,
    Error,
    /// Rejection of a play request
    PlayRejected,
    /// Fullscreen entered or left on the element itself
    FullscreenChange,
}

impl MediaEventKind {
    pub const ALL: [MediaEventKind; 11] = [
        MediaEventKind::Play,
        MediaEventKind::Pause,
        MediaEventKind::Playing,
        MediaEventKind::Waiting,
        MediaEventKind::TimeUpdate,
        MediaEventKind::DurationChange,
        MediaEventKind::LoadedMetadata,
        MediaEventKind::Ended,
        MediaEventKind::Error,
        MediaEventKind::PlayRejected,
        MediaEventKind::FullscreenChange,
    ];
}

/// Why a play request was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayRejection {
    /// Interrupted by a later pause or source change; expected and harmless
    Aborted,
    /// Autoplay policy or a missing user gesture
    NotAllowed(String),
    Other(String),
}

/// Event reported by the media primitive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MediaEvent {
    Play,
    Pause,
    Playing,
    Waiting,
    TimeUpdate { position: f64, buffered_end: Option<f64> },
    DurationChange(f64),
    LoadedMetadata,
    Ended,
    Error(String),
    PlayRejected(PlayRejection),
    FullscreenChange(bool),
}

impl MediaEvent {
    pub fn kind(&self) -> MediaEventKind {
        match self {
            MediaEvent::Play => MediaEventKind::Play,
            MediaEvent::Pause => MediaEventKind::Pause,
            MediaEvent::Playing => MediaEventKind::Playing,
            MediaEvent::Waiting => MediaEventKind::Waiting,
            MediaEvent::TimeUpdate { .. } => MediaEventKind::TimeUpdate,
            MediaEvent::DurationChange(_) => MediaEventKind::DurationChange,
            MediaEvent::LoadedMetadata => MediaEventKind::LoadedMetadata,
            MediaEvent::Ended => MediaEventKind::Ended,
            MediaEvent::Error(_) => MediaEventKind::Error,
            MediaEvent::PlayRejected(_) => MediaEventKind::PlayRejected,
            MediaEvent::FullscreenChange(_) => MediaEventKind::FullscreenChange,
        }
    }
}

/// The native media playback primitive
pub trait MediaElement {
    /// Assign a source URL, `None` clears it
    fn set_source(&self, url: Option<&str>);

    fn can_play_type(&self, mime: &str) -> CanPlay;

    /// Request playback. Refusals arrive later as [`MediaEvent::PlayRejected`].
    fn play(&self);

    fn pause(&self);

    fn is_paused(&self) -> bool;

    fn current_time(&self) -> f64;

    fn set_current_time(&self, seconds: f64);

    fn set_volume(&self, volume: f64);

    fn set_muted(&self, muted: bool);

    fn set_playback_rate(&self, rate: f64);

    fn add_listener(&self, kind: MediaEventKind) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);
}

/// Engine error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineErrorKind {
    Network,
    Media,
    Other,
}

/// Event reported by a streaming engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    ManifestParsed { levels: Vec<StreamLevel> },
    LevelSwitched { level: usize },
    Error {
        fatal: bool,
        kind: EngineErrorKind,
        details: String,
    },
}

/// One adaptive streaming engine instance, bound to the session's media element
pub trait StreamingEngine {
    fn id(&self) -> EngineId;

    fn load_source(&mut self, url: &str);

    fn attach_media(&mut self);

    /// Resume fragment loading, optionally from a position in seconds
    fn start_load(&mut self, position: Option<f64>);

    /// Reset the decoder after a media error
    fn recover_media_error(&mut self);

    /// `-1` re-enables automatic selection, otherwise pins a level
    fn set_current_level(&mut self, level: i32);

    /// Detach from the media element and release every engine resource
    fn destroy(&mut self);
}

/// Creates streaming engines when the host supports them
pub trait EngineProvider {
    /// Whether the host can run the adaptive engine at all
    fn is_supported(&self) -> bool;

    fn create(&self, config: &EngineConfig) -> Box<dyn StreamingEngine>;
}

/// Document-level event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentEventKind {
    FullscreenChange,
    KeyDown,
}

/// Event reported by the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentEvent {
    FullscreenChange,
    /// Physical key code, e.g. `"Space"` or `"KeyK"`
    KeyDown(String),
}

impl DocumentEvent {
    pub fn kind(&self) -> DocumentEventKind {
        match self {
            DocumentEvent::FullscreenChange => DocumentEventKind::FullscreenChange,
            DocumentEvent::KeyDown(_) => DocumentEventKind::KeyDown,
        }
    }
}

/// Global event sources shared by every session on the page
pub trait HostDocument {
    fn add_listener(&self, kind: DocumentEventKind) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);
}

/// One-shot timers. Fired timers come back through `PlaybackSession::handle_timer`.
pub trait Scheduler {
    fn schedule(&self, delay: Duration) -> TimerId;

    /// Cancelling an unknown or already fired timer is a no-op
    fn cancel(&self, id: TimerId);
}

/// Bundle of host handles a session runs on
#[derive(Clone)]
pub struct Host {
    pub media: Rc<dyn MediaElement>,
    pub engines: Rc<dyn EngineProvider>,
    pub fullscreen: Rc<dyn FullscreenController>,
    pub document: Rc<dyn HostDocument>,
    pub scheduler: Rc<dyn Scheduler>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_play_answers() {
        assert_eq!(CanPlay::from_answer("probably"), CanPlay::Probably);
        assert_eq!(CanPlay::from_answer("maybe"), CanPlay::Maybe);
        assert_eq!(CanPlay::from_answer(""), CanPlay::No);
        assert!(!CanPlay::No.is_playable());
        assert!(CanPlay::Maybe.is_playable());
    }

    #[test]
    fn test_event_kinds_match() {
        let event = MediaEvent::TimeUpdate {
            position: 1.0,
            buffered_end: None,
        };
        assert_eq!(event.kind(), MediaEventKind::TimeUpdate);
        assert_eq!(
            DocumentEvent::KeyDown("Space".into()).kind(),
            DocumentEventKind::KeyDown
        );
        assert_eq!(MediaEventKind::ALL.len(), 11);
    }
}
