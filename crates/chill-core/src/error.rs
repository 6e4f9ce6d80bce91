//! Error types for Chill Core
//!
//! Two families live here:
//! - [`Error`]: misuse of the control surface or configuration problems,
//!   returned through [`Result`]
//! - [`PlaybackError`]: what went wrong with the media itself, surfaced in
//!   [`PlaybackState`](crate::PlaybackState) when the session is `Errored`

use crate::types::Locale;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Control surface and configuration errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid playback rate: {0}")]
    InvalidPlaybackRate(f64),

    #[error("Unknown quality level: {0}")]
    UnknownLevel(i32),

    #[error("No source loaded")]
    NoSource,

    #[error("No fallback player configured")]
    FallbackUnavailable,

    #[error("Playback session disposed")]
    Disposed,

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid configuration file: {0}")]
    ConfigFormat(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for logs and host bindings
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidPlaybackRate(_) => "INVALID_RATE",
            Error::UnknownLevel(_) => "UNKNOWN_LEVEL",
            Error::NoSource => "NO_SOURCE",
            Error::FallbackUnavailable => "NO_FALLBACK",
            Error::Disposed => "DISPOSED",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::ConfigFormat(_) => "CONFIG_FORMAT",
        }
    }
}

/// Playback failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Nothing became playable before the load watchdog expired
    LoadTimeout,
    /// Manifest or fragment delivery failed (retryable)
    NetworkError,
    /// Decoder failure (retryable)
    MediaDecodeError,
    /// Neither the engine nor the media primitive can play the source
    UnsupportedFormat,
    /// Any other fatal failure
    GenericFatal,
    /// The host refused to start playback without a user gesture
    AutoplayRejected,
}

impl ErrorKind {
    /// Whether the session recovers from this locally before surfacing it
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::NetworkError | ErrorKind::MediaDecodeError)
    }

    /// Whether this kind puts the session into `Errored`
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorKind::AutoplayRejected)
    }

    /// Whether exhausting this kind hands playback to the fallback path on its own
    pub fn triggers_auto_fallback(&self) -> bool {
        self.is_retryable()
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorKind::LoadTimeout => "LOAD_TIMEOUT",
            ErrorKind::NetworkError => "NETWORK",
            ErrorKind::MediaDecodeError => "MEDIA_DECODE",
            ErrorKind::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorKind::GenericFatal => "FATAL",
            ErrorKind::AutoplayRejected => "AUTOPLAY_REJECTED",
        }
    }

    /// Short user-facing message
    pub fn message(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::Vi => match self {
                ErrorKind::LoadTimeout => "Không thể tải video. Vui lòng thử chế độ Embed.",
                ErrorKind::NetworkError => "Lỗi mạng. Đang chuyển sang chế độ Dự phòng...",
                ErrorKind::MediaDecodeError => "Lỗi media. Đang chuyển sang chế độ Dự phòng...",
                ErrorKind::UnsupportedFormat => {
                    "Trình duyệt không hỗ trợ phát video này. Vui lòng thử chế độ Embed."
                }
                ErrorKind::GenericFatal => "Không thể tải video. Vui lòng thử chế độ Dự phòng.",
                ErrorKind::AutoplayRejected => "Nhấn phát để bắt đầu xem.",
            },
            Locale::En => match self {
                ErrorKind::LoadTimeout => "Load timeout. Please try fallback mode.",
                ErrorKind::NetworkError => "Network error. Switching to fallback mode...",
                ErrorKind::MediaDecodeError => "Media error. Switching to fallback mode...",
                ErrorKind::UnsupportedFormat => {
                    "This browser cannot play this video. Please try fallback mode."
                }
                ErrorKind::GenericFatal => "Could not play this video. Please try fallback mode.",
                ErrorKind::AutoplayRejected => "Press play to start watching.",
            },
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::LoadTimeout => write!(f, "load timeout"),
            ErrorKind::NetworkError => write!(f, "network error"),
            ErrorKind::MediaDecodeError => write!(f, "media error"),
            ErrorKind::UnsupportedFormat => write!(f, "unsupported format"),
            ErrorKind::GenericFatal => write!(f, "fatal error"),
            ErrorKind::AutoplayRejected => write!(f, "autoplay rejected"),
        }
    }
}

/// A playback failure with its localized message
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct PlaybackError {
    pub kind: ErrorKind,
    pub message: String,
    /// Engine or host supplied detail, for logs only
    pub details: Option<String>,
}

impl PlaybackError {
    pub fn new(kind: ErrorKind, locale: Locale) -> Self {
        Self {
            kind,
            message: kind.message(locale).to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::NetworkError.is_retryable());
        assert!(ErrorKind::MediaDecodeError.is_retryable());
        assert!(!ErrorKind::LoadTimeout.is_retryable());
        assert!(!ErrorKind::UnsupportedFormat.is_retryable());
        assert!(!ErrorKind::GenericFatal.is_retryable());
    }

    #[test]
    fn test_autoplay_rejection_is_not_fatal() {
        assert!(!ErrorKind::AutoplayRejected.is_fatal());
        assert!(ErrorKind::LoadTimeout.is_fatal());
    }

    #[test]
    fn test_messages_are_localized() {
        let vi = PlaybackError::new(ErrorKind::NetworkError, Locale::Vi);
        let en = PlaybackError::new(ErrorKind::NetworkError, Locale::En);
        assert!(vi.message.starts_with("Lỗi mạng"));
        assert!(en.message.starts_with("Network error"));
        assert_eq!(en.to_string(), format!("network error: {}", en.message));
    }
}
