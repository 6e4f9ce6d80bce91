//! Chill Core - Adaptive playback session for the Chill player
//!
//! This crate provides the playback logic behind the player UI:
//! - One playback session per source, with a load watchdog
//! - Bounded recovery of network and decode failures
//! - Hand-off to a fallback player when recovery is exhausted
//! - Transport controls, quality selection and fullscreen
//! - Tap gestures, keyboard shortcuts and control visibility
//! - Episode navigation across servers
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        Chill Core                         │
//! ├───────────────────────────────────────────────────────────┤
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐           │
//! │  │  Gestures  │  │  Keyboard  │  │  Controls  │           │
//! │  └─────┬──────┘  └─────┬──────┘  └─────┬──────┘           │
//! │        └───────────────┼───────────────┘                  │
//! │                 ┌──────┴──────┐      watch::Receiver      │
//! │                 │  Playback   │ ───► PlaybackState        │
//! │                 │  Session    │                           │
//! │                 └──────┬──────┘                           │
//! │        ┌───────────────┼───────────────┐                  │
//! │  ┌─────┴──────┐  ┌─────┴──────┐  ┌─────┴──────┐           │
//! │  │   Media    │  │  Streaming │  │ Fullscreen │  (host)   │
//! │  │  Element   │  │   Engine   │  │ Controller │           │
//! │  └────────────┘  └────────────┘  └────────────┘           │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod controls;
pub mod error;
pub mod format;
pub mod fullscreen;
pub mod gesture;
pub mod keyboard;
pub mod manifest;
pub mod platform;
pub mod playlist;
pub mod session;
pub mod sim;
pub mod types;

pub use config::{EngineConfig, PlayerConfig, SessionConfig};
pub use error::{Error, ErrorKind, PlaybackError, Result};
pub use fullscreen::{FullscreenController, FullscreenError, FullscreenTarget};
pub use gesture::{GestureAction, TapZone};
pub use keyboard::{ControlAction, KeyOutcome};
pub use manifest::{detect_source_kind, parse_levels, SourceKind};
pub use platform::Host;
pub use playlist::{EpisodeCursor, EpisodePlaylist, PlayerMode};
pub use session::{PlaybackSession, SessionCallbacks};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the player library
pub fn init() {
    tracing::info!(version = VERSION, "Chill Core initialized");
}
