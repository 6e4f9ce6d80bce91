//! CLI command implementations

use crate::output::{self, OutputFormat};
use anyhow::Context;
use chill_core::format::{format_time, level_label};
use chill_core::keyboard::{suppresses_default, ControlAction, BINDINGS};
use chill_core::platform::{CanPlay, EngineErrorKind};
use chill_core::sim::{AutoplayPolicy, SimHost};
use chill_core::{
    detect_source_kind, parse_levels, FallbackRequest, LevelSelection, PlaybackError,
    PlaybackSession, PlaybackSource, PlaybackState, PlaybackStatus, PlayerConfig,
    SessionCallbacks, SourceKind, StreamLevel,
};
use clap::ValueEnum;
use indicatif::ProgressBar;
use serde::Serialize;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;
use tabled::Tabled;
use tracing::info;
use url::Url;

/// Virtual time between two simulation steps
const STEP: Duration = Duration::from_millis(250);

/// Read a JSON configuration file, or use the defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<PlayerConfig> {
    let Some(path) = path else {
        return Ok(PlayerConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = PlayerConfig::from_json(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    info!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

// ============================================================================
// Simulation
// ============================================================================

/// Host behavior to replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Manifest parses and playback starts
    Happy,
    /// Every fragment load fails
    NetworkFailure,
    /// The decoder fails after every recovery
    MediaFailure,
    /// Unrecoverable engine error
    FatalOther,
    /// The manifest never parses
    Timeout,
    /// No engine and no native support
    Unsupported,
    /// No engine, native HLS playback
    Native,
    /// The host refuses autoplay
    AutoplayBlocked,
}

impl Scenario {
    fn prepare(&self, sim: &SimHost) {
        match self {
            Scenario::Happy => {}
            Scenario::NetworkFailure => {
                sim.engines
                    .configure(|script| script.failure = Some(EngineErrorKind::Network));
            }
            Scenario::MediaFailure => {
                sim.engines
                    .configure(|script| script.failure = Some(EngineErrorKind::Media));
            }
            Scenario::FatalOther => {
                sim.engines
                    .configure(|script| script.failure = Some(EngineErrorKind::Other));
            }
            Scenario::Timeout => sim.engines.configure(|script| script.stall_manifest = true),
            Scenario::Unsupported => {
                sim.engines.configure(|script| script.supported = false);
                sim.media.set_native_hls(CanPlay::No);
            }
            Scenario::Native => {
                sim.engines.configure(|script| script.supported = false);
                sim.media.set_native_hls(CanPlay::Probably);
            }
            Scenario::AutoplayBlocked => sim.media.set_autoplay(AutoplayPolicy::Block),
        }
    }
}

/// One observed change of status, retries or error
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub at_ms: u64,
    pub status: PlaybackStatus,
    pub position: f64,
    pub retry_count: u32,
    pub error: Option<String>,
}

impl Transition {
    fn observe(at: Duration, state: &PlaybackState) -> Self {
        Self {
            at_ms: at.as_millis() as u64,
            status: state.status,
            position: state.position,
            retry_count: state.retry_count,
            error: state.error.as_ref().map(|e| e.kind.error_code().to_string()),
        }
    }

    fn same_phase(&self, other: &Transition) -> bool {
        self.status == other.status
            && self.retry_count == other.retry_count
            && self.error == other.error
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FallbackEvent {
    pub at_ms: u64,
    pub request: FallbackRequest,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineSummary {
    pub created: u32,
    pub destroyed: u32,
    pub start_loads: usize,
    pub media_recoveries: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub scenario: Scenario,
    pub url: String,
    pub timeline: Vec<Transition>,
    pub fallbacks: Vec<FallbackEvent>,
    pub errors: Vec<PlaybackError>,
    pub engine: EngineSummary,
    pub final_state: PlaybackState,
}

#[derive(Default)]
struct Outcome {
    fallbacks: Vec<FallbackEvent>,
    errors: Vec<PlaybackError>,
}

/// Run `scenario` for `seconds` of virtual time
pub fn simulate(scenario: Scenario, url: &str, seconds: u64, config: PlayerConfig) -> SimulationReport {
    let sim = SimHost::new();
    scenario.prepare(&sim);

    let outcome = Rc::new(RefCell::new(Outcome::default()));
    let callbacks = {
        let fallbacks = Rc::clone(&outcome);
        let errors = Rc::clone(&outcome);
        let clock = Rc::clone(&sim.scheduler);
        SessionCallbacks::new()
            .on_fallback(move |request| {
                fallbacks.borrow_mut().fallbacks.push(FallbackEvent {
                    at_ms: clock.now().as_millis() as u64,
                    request: request.clone(),
                });
            })
            .on_error(move |error| errors.borrow_mut().errors.push(error.clone()))
    };

    info!(scenario = ?scenario, url, seconds, "Starting simulation");
    let mut session =
        PlaybackSession::new(sim.host(), PlaybackSource::new(url), config, callbacks);
    let mut timeline: Vec<Transition> = Vec::new();
    let mut observe = |sim: &SimHost, session: &PlaybackSession| {
        let next = Transition::observe(sim.scheduler.now(), session.state());
        if timeline.last().map_or(true, |last| !last.same_phase(&next)) {
            timeline.push(next);
        }
    };

    sim.pump(&mut session);
    observe(&sim, &session);
    let steps = seconds * (1000 / STEP.as_millis() as u64);
    for _ in 0..steps {
        sim.media.tick(STEP.as_secs_f64());
        sim.advance(&mut session, STEP);
        observe(&sim, &session);
    }

    let log = sim.engines.log();
    let final_state = session.state().clone();
    session.dispose();

    let Outcome { fallbacks, errors } = std::mem::take(&mut *outcome.borrow_mut());
    SimulationReport {
        scenario,
        url: url.to_string(),
        timeline,
        fallbacks,
        errors,
        engine: EngineSummary {
            created: log.created,
            destroyed: log.destroyed,
            start_loads: log.start_loads.len(),
            media_recoveries: log.media_recoveries,
        },
        final_state,
    }
}

#[derive(Tabled)]
struct TransitionRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Status")]
    status: PlaybackStatus,
    #[tabled(rename = "Position")]
    position: String,
    #[tabled(rename = "Retries")]
    retries: u32,
    #[tabled(rename = "Error")]
    error: String,
}

pub fn print_report(report: &SimulationReport, format: &str) {
    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(report)),
        OutputFormat::Table => {
            let rows = report.timeline.iter().map(|t| TransitionRow {
                time: format!("{:.2}s", t.at_ms as f64 / 1000.0),
                status: t.status,
                position: format_time(t.position),
                retries: t.retry_count,
                error: t.error.clone().unwrap_or_default(),
            });
            println!("{}", output::table(rows));
            print_summary(report);
        }
        OutputFormat::Text => {
            println!("Scenario: {:?}", report.scenario);
            println!("Source:   {}\n", report.url);
            for t in &report.timeline {
                println!(
                    "  [{:>6} ms] {} {:>7}  retries={}{}",
                    t.at_ms,
                    output::status(t.status),
                    format_time(t.position),
                    t.retry_count,
                    t.error
                        .as_ref()
                        .map(|code| format!("  error={code}"))
                        .unwrap_or_default(),
                );
            }
            println!();
            print_summary(report);
        }
    }
}

fn print_summary(report: &SimulationReport) {
    let engine = &report.engine;
    println!(
        "Engines: created={} destroyed={} start_loads={} media_recoveries={}",
        engine.created, engine.destroyed, engine.start_loads, engine.media_recoveries
    );
    for fallback in &report.fallbacks {
        println!(
            "Fallback at {} ms: {:?} (position {})",
            fallback.at_ms,
            fallback.request.reason,
            format_time(fallback.request.position)
        );
    }
    for error in &report.errors {
        println!("Error: {} ({})", error.message, error.kind.error_code());
    }
    if report.final_state.autoplay_blocked {
        println!("Autoplay blocked: waiting for the user to press play");
    }
}

// ============================================================================
// Probe
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub source: String,
    pub kind: &'static str,
    pub mime: Option<&'static str>,
    pub levels: Vec<StreamLevel>,
}

#[derive(Tabled)]
struct LevelRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Quality")]
    label: String,
    #[tabled(rename = "Bandwidth")]
    bandwidth: String,
}

async fn fetch(location: &str) -> anyhow::Result<Vec<u8>> {
    match Url::parse(location) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            let spinner = ProgressBar::new_spinner();
            spinner.set_message(format!("Fetching {}", url));
            spinner.enable_steady_tick(Duration::from_millis(100));
            let result = async {
                let response = reqwest::get(url.clone()).await?.error_for_status()?;
                Ok::<_, reqwest::Error>(response.bytes().await?.to_vec())
            }
            .await;
            spinner.finish_and_clear();
            result.with_context(|| format!("fetching {}", url))
        }
        _ => tokio::fs::read(location)
            .await
            .with_context(|| format!("reading {}", location)),
    }
}

/// Fetch a manifest and list what the player would offer
pub async fn probe(location: &str, format: &str) -> anyhow::Result<()> {
    let report = match detect_source_kind(location) {
        SourceKind::Progressive { mime } => ProbeReport {
            source: location.to_string(),
            kind: "progressive",
            mime: Some(mime),
            levels: Vec::new(),
        },
        SourceKind::Manifest => {
            let content = fetch(location).await?;
            ProbeReport {
                source: location.to_string(),
                kind: "manifest",
                mime: None,
                levels: parse_levels(&content)?,
            }
        }
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&report)),
        OutputFormat::Table | OutputFormat::Text => {
            println!("Source: {}", report.source);
            match report.mime {
                Some(mime) => println!("Progressive file ({mime}), played natively"),
                None => {
                    println!("Adaptive manifest, {} level(s)\n", report.levels.len());
                    let rows = report.levels.iter().map(|level| LevelRow {
                        index: level.index,
                        label: level_label(LevelSelection::Pinned(level.index), Some(level.height)),
                        bandwidth: level
                            .bitrate
                            .map(|b| format!("{} kbps", b / 1000))
                            .unwrap_or_else(|| "-".to_string()),
                    });
                    println!("{}", output::table(rows));
                }
            }
        }
    }
    Ok(())
}

// ============================================================================
// Keys
// ============================================================================

#[derive(Serialize, Tabled)]
struct KeyRow {
    #[tabled(rename = "Key")]
    key: &'static str,
    #[tabled(rename = "Action")]
    #[serde(skip)]
    description: &'static str,
    #[tabled(skip)]
    action: ControlAction,
    #[tabled(rename = "Blocks browser default")]
    prevent_default: bool,
}

pub fn keys(format: &str) {
    let rows: Vec<KeyRow> = BINDINGS
        .iter()
        .map(|&(key, action)| KeyRow {
            key,
            description: action.description(),
            action,
            prevent_default: suppresses_default(key),
        })
        .collect();

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&rows)),
        OutputFormat::Table | OutputFormat::Text => println!("{}", output::table(rows)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chill_core::{ErrorKind, FallbackReason};

    const URL: &str = "https://cdn.example.com/phim/tap-01/index.m3u8";

    fn run(scenario: Scenario, seconds: u64) -> SimulationReport {
        simulate(scenario, URL, seconds, PlayerConfig::default())
    }

    #[test]
    fn test_happy_scenario_plays() {
        let report = run(Scenario::Happy, 5);
        assert_eq!(report.final_state.status, PlaybackStatus::Playing);
        assert!(report.final_state.position > 4.0);
        assert!(report.fallbacks.is_empty());
        assert!(report.errors.is_empty());
        assert_eq!(report.engine.created, 1);
    }

    #[test]
    fn test_network_failure_hands_off_once() {
        let report = run(Scenario::NetworkFailure, 10);
        assert_eq!(report.engine.start_loads, 3);
        assert_eq!(report.fallbacks.len(), 1);
        assert_eq!(
            report.fallbacks[0].request.reason,
            FallbackReason::RetriesExhausted(ErrorKind::NetworkError)
        );
        assert_eq!(report.final_state.status, PlaybackStatus::Errored);
    }

    #[test]
    fn test_media_failure_recovers_three_times() {
        let report = run(Scenario::MediaFailure, 10);
        assert_eq!(report.engine.media_recoveries, 3);
        assert_eq!(report.fallbacks.len(), 1);
    }

    #[test]
    fn test_fatal_other_has_no_fallback() {
        let report = run(Scenario::FatalOther, 5);
        assert_eq!(report.final_state.error_kind(), Some(ErrorKind::GenericFatal));
        assert!(report.fallbacks.is_empty());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_timeout_after_watchdog() {
        let report = run(Scenario::Timeout, 31);
        assert_eq!(report.final_state.error_kind(), Some(ErrorKind::LoadTimeout));
        let errored = report
            .timeline
            .iter()
            .find(|t| t.status == PlaybackStatus::Errored)
            .unwrap();
        assert_eq!(errored.at_ms, 30_000);
    }

    #[test]
    fn test_native_and_unsupported() {
        let native = run(Scenario::Native, 3);
        assert_eq!(native.engine.created, 0);
        assert_eq!(native.final_state.status, PlaybackStatus::Playing);

        let unsupported = run(Scenario::Unsupported, 3);
        assert_eq!(
            unsupported.final_state.error_kind(),
            Some(ErrorKind::UnsupportedFormat)
        );
    }

    #[test]
    fn test_autoplay_blocked_waits_for_user() {
        let report = run(Scenario::AutoplayBlocked, 3);
        assert_eq!(report.final_state.status, PlaybackStatus::Paused);
        assert!(report.final_state.autoplay_blocked);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_timeline_collapses_repeats() {
        let report = run(Scenario::Happy, 5);
        for pair in report.timeline.windows(2) {
            assert!(!pair[0].same_phase(&pair[1]));
        }
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config, PlayerConfig::default());
    }
}
