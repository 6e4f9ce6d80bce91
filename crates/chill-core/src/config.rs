//! Session and streaming engine configuration
//!
//! `EngineConfig` is serialized with the option names the browser streaming
//! engine understands, so hosts can hand it over verbatim.

use crate::{error::Error, types::Locale, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Streaming engine configuration tuned for fast start and high quality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Demux in a worker
    pub enable_worker: bool,
    pub low_latency_mode: bool,

    /// Initial forward buffer target in seconds (small for a fast first frame)
    pub max_buffer_length: f64,
    /// Buffer memory cap in bytes
    pub max_buffer_size: u32,
    /// Largest gap in seconds jumped over while buffering
    pub max_buffer_hole: f64,

    /// First level to load, -1 lets the engine pick
    pub start_level: i32,
    /// Bandwidth seed in bits per second, high so the first pick favors quality
    pub abr_ewma_default_estimate: u32,
    /// Share of the estimate that must cover the current level before dropping
    pub abr_band_width_factor: f64,
    /// Share of the estimate that must cover the next level before climbing
    pub abr_band_width_up_factor: f64,
    pub abr_ewma_fast_live: f64,
    pub abr_ewma_slow_live: f64,

    /// Never cap quality to the player size
    pub cap_level_to_player_size: bool,
    pub max_loading_delay: f64,
    pub min_auto_bitrate: u32,

    pub start_frag_prefetch: bool,
    #[serde(rename = "maxFragLookUpTolerance")]
    pub max_frag_lookup_tolerance: f64,
    pub progressive: bool,

    pub back_buffer_length: f64,
    pub front_buffer_flush_threshold: f64,

    pub manifest_loading_max_retry: u32,
    pub manifest_loading_retry_delay: u32,
    pub level_loading_max_retry: u32,
    pub level_loading_retry_delay: u32,
    pub frag_loading_max_retry: u32,
    pub frag_loading_retry_delay: u32,

    #[serde(rename = "manifestLoadingTimeOut")]
    pub manifest_loading_timeout: u32,
    #[serde(rename = "levelLoadingTimeOut")]
    pub level_loading_timeout: u32,
    #[serde(rename = "fragLoadingTimeOut")]
    pub frag_loading_timeout: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_worker: true,
            low_latency_mode: true,
            max_buffer_length: 10.0,
            max_buffer_size: 60 * 1000 * 1000,
            max_buffer_hole: 0.5,
            start_level: -1,
            abr_ewma_default_estimate: 20_000_000,
            abr_band_width_factor: 0.9,
            abr_band_width_up_factor: 0.5,
            abr_ewma_fast_live: 2.0,
            abr_ewma_slow_live: 6.0,
            cap_level_to_player_size: false,
            max_loading_delay: 4.0,
            min_auto_bitrate: 500_000,
            start_frag_prefetch: true,
            max_frag_lookup_tolerance: 0.1,
            progressive: true,
            back_buffer_length: 20.0,
            front_buffer_flush_threshold: 600.0,
            manifest_loading_max_retry: 8,
            manifest_loading_retry_delay: 500,
            level_loading_max_retry: 8,
            level_loading_retry_delay: 500,
            frag_loading_max_retry: 8,
            frag_loading_retry_delay: 500,
            manifest_loading_timeout: 10_000,
            level_loading_timeout: 10_000,
            frag_loading_timeout: 20_000,
        }
    }
}

/// Session behavior: watchdog, retries and input timings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Load watchdog budget in milliseconds
    pub load_timeout_ms: u64,
    /// Recovery attempts for network and decode errors
    pub max_retries: u32,
    /// Fixed delay before each recovery attempt
    pub retry_delay_ms: u64,
    /// Delay between exhausting retries and the automatic fallback
    pub fallback_delay_ms: u64,
    /// Seconds skipped by double taps and arrow keys
    pub skip_seconds: f64,
    /// Volume change per arrow key press
    pub volume_step: f64,
    /// Window separating a double tap from two single taps
    pub double_tap_window_ms: u64,
    /// Idle time before controls hide while playing
    pub controls_idle_ms: u64,
    /// Language for error messages
    pub locale: Locale,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: 30_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            fallback_delay_ms: 1_500,
            skip_seconds: 10.0,
            volume_step: 0.1,
            double_tap_window_ms: 300,
            controls_idle_ms: 3_000,
            locale: Locale::Vi,
        }
    }
}

impl SessionConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }

    pub fn double_tap_window(&self) -> Duration {
        Duration::from_millis(self.double_tap_window_ms)
    }

    pub fn controls_idle(&self) -> Duration {
        Duration::from_millis(self.controls_idle_ms)
    }

    /// Reject values the session cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.load_timeout_ms == 0 {
            return Err(Error::InvalidConfig("load_timeout_ms must be positive".into()));
        }
        if !(self.skip_seconds.is_finite() && self.skip_seconds > 0.0) {
            return Err(Error::InvalidConfig("skip_seconds must be positive".into()));
        }
        if !(self.volume_step > 0.0 && self.volume_step <= 1.0) {
            return Err(Error::InvalidConfig("volume_step must be in (0, 1]".into()));
        }
        if self.double_tap_window_ms == 0 {
            return Err(Error::InvalidConfig("double_tap_window_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Full player configuration as read from a file or a host options object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub session: SessionConfig,
    pub engine: EngineConfig,
}

impl PlayerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.session.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.load_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.double_tap_window(), Duration::from_millis(300));
        assert_eq!(config.controls_idle(), Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_config_uses_engine_option_names() {
        let value = serde_json::to_value(EngineConfig::default()).unwrap();
        assert_eq!(value["maxBufferLength"], 10.0);
        assert_eq!(value["abrEwmaDefaultEstimate"], 20_000_000);
        assert_eq!(value["capLevelToPlayerSize"], false);
        assert_eq!(value["maxFragLookUpTolerance"], 0.1);
        assert_eq!(value["fragLoadingTimeOut"], 20_000);
        assert_eq!(value["fragLoadingMaxRetry"], 8);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PlayerConfig::from_json(r#"{"session": {"max_retries": 5, "locale": "en"}}"#)
            .unwrap();
        assert_eq!(config.session.max_retries, 5);
        assert_eq!(config.session.locale, Locale::En);
        assert_eq!(config.session.load_timeout_ms, 30_000);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = SessionConfig::from_json(r#"{"volume_step": 0}"#).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
        assert!(SessionConfig::from_json("not json").is_err());
    }
}
