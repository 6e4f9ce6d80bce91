//! Integration tests for Chill Core

use chill_core::{
    platform::{CanPlay, EngineErrorKind, EngineEvent, MediaEvent},
    sim::SimHost,
    EpisodeCursor, EpisodePlaylist, ErrorKind, FallbackReason, FallbackRequest, LevelSelection,
    PlaybackSession, PlaybackSource, PlaybackStatus, PlayerConfig, PlayerMode, SessionCallbacks,
    TapZone,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

const MANIFEST_URL: &str = "https://cdn.example.com/phim/tap-01/index.m3u8";
const OTHER_URL: &str = "https://cdn.example.com/phim/tap-02/index.m3u8";

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn start(sim: &SimHost, url: &str) -> PlaybackSession {
    PlaybackSession::new(
        sim.host(),
        PlaybackSource::new(url),
        PlayerConfig::default(),
        SessionCallbacks::new(),
    )
}

/// Session whose fallback hand-offs are recorded
fn start_with_fallback(
    sim: &SimHost,
    url: &str,
) -> (PlaybackSession, Rc<RefCell<Vec<FallbackRequest>>>) {
    let requests = Rc::new(RefCell::new(Vec::new()));
    let callbacks = {
        let requests = Rc::clone(&requests);
        SessionCallbacks::new().on_fallback(move |request| requests.borrow_mut().push(request.clone()))
    };
    let session = PlaybackSession::new(
        sim.host(),
        PlaybackSource::new(url),
        PlayerConfig::default(),
        callbacks,
    );
    (session, requests)
}

// =============================================================================
// Initialization
// =============================================================================

#[test]
fn test_load_reaches_playing_within_watchdog_budget() {
    let sim = SimHost::new();
    let mut session = start(&sim, MANIFEST_URL);
    assert_eq!(session.state().status, PlaybackStatus::Loading);

    sim.pump(&mut session);
    assert_eq!(session.state().status, PlaybackStatus::Playing);
    assert!(sim.scheduler.now() < session.config().load_timeout());

    // The watchdog was cleared: nothing fails later
    sim.advance(&mut session, Duration::from_secs(60));
    assert_eq!(session.state().status, PlaybackStatus::Playing);
}

#[test]
fn test_load_timeout_at_exact_budget() {
    let sim = SimHost::new();
    sim.engines.configure(|script| script.stall_manifest = true);
    let mut session = start(&sim, MANIFEST_URL);

    sim.advance(&mut session, ms(29_999));
    assert_eq!(session.state().status, PlaybackStatus::Loading);

    sim.advance(&mut session, ms(1));
    let state = session.state();
    assert_eq!(state.status, PlaybackStatus::Errored);
    assert_eq!(state.error_kind(), Some(ErrorKind::LoadTimeout));
    assert!(state.error.as_ref().is_some_and(|e| !e.message.is_empty()));

    // Not retried automatically
    sim.advance(&mut session, Duration::from_secs(60));
    assert_eq!(sim.engines.log().created, 1);
    assert_eq!(session.state().retry_count, 0);
}

#[test]
fn test_happy_manifest_scenario() {
    let sim = SimHost::new();
    let mut session = start(&sim, MANIFEST_URL);
    sim.pump(&mut session);

    let state = session.state();
    assert_eq!(state.status, PlaybackStatus::Playing);
    assert_eq!(state.retry_count, 0);
    assert_eq!(state.selected_level.index(), -1);
    assert!(!state.levels.is_empty());
    assert!(state.error.is_none());
    assert_eq!(sim.engines.log().loaded_urls, vec![MANIFEST_URL.to_string()]);
}

#[test]
fn test_engine_receives_fast_start_config() {
    let sim = SimHost::new();
    let _session = start(&sim, MANIFEST_URL);
    let config = sim.engines.log().last_config.unwrap();
    assert_eq!(config.max_buffer_length, 10.0);
    assert_eq!(config.start_level, -1);
    assert!(!config.cap_level_to_player_size);
}

#[test]
fn test_empty_url_scenario() {
    let sim = SimHost::new();
    let mut session = start(&sim, "");
    sim.advance(&mut session, Duration::from_secs(60));

    assert_eq!(session.state().status, PlaybackStatus::Idle);
    assert!(!session.has_pipeline());
    assert_eq!(sim.engines.log().created, 0);
    assert_eq!(sim.media.active_listener_count(), 0);
    assert_eq!(sim.scheduler.pending_count(), 0);
}

#[test]
fn test_native_manifest_playback() {
    let sim = SimHost::new();
    sim.engines.configure(|script| script.supported = false);
    sim.media.set_native_hls(CanPlay::Probably);
    let mut session = start(&sim, MANIFEST_URL);
    sim.pump(&mut session);

    assert_eq!(session.state().status, PlaybackStatus::Playing);
    assert_eq!(sim.engines.log().created, 0);
    assert!(session.state().levels.is_empty());
}

#[test]
fn test_levels_from_real_master_playlist() {
    let sim = SimHost::new();
    sim.engines
        .use_manifest(
            "#EXTM3U\n\
             #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n360.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n1080.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720\n720.m3u8\n",
        )
        .unwrap();
    let mut session = start(&sim, MANIFEST_URL);
    sim.pump(&mut session);

    let heights: Vec<u32> = session.state().levels.iter().map(|l| l.height).collect();
    assert_eq!(heights, vec![1080, 720, 360]);
}

// =============================================================================
// Recovery and fallback
// =============================================================================

#[test]
fn test_sustained_network_failure_exhausts_retries_then_falls_back_once() {
    let sim = SimHost::new();
    sim.engines
        .configure(|script| script.failure = Some(EngineErrorKind::Network));
    let (mut session, requests) = start_with_fallback(&sim, MANIFEST_URL);

    sim.advance(&mut session, Duration::from_secs(3));
    assert_eq!(sim.engines.log().start_loads.len(), 3);
    let state = session.state();
    assert_eq!(state.status, PlaybackStatus::Errored);
    assert_eq!(state.retry_count, 3);
    assert_eq!(state.error_kind(), Some(ErrorKind::NetworkError));
    assert_eq!(ErrorKind::NetworkError.to_string(), "network error");
    assert!(requests.borrow().is_empty(), "fallback waits for its delay");

    sim.advance(&mut session, ms(1_500));
    assert_eq!(requests.borrow().len(), 1);
    assert_eq!(
        requests.borrow()[0].reason,
        FallbackReason::RetriesExhausted(ErrorKind::NetworkError)
    );
    assert_eq!(requests.borrow()[0].url, MANIFEST_URL);
    assert!(session.state().fallback_requested);
    assert_eq!(session.state().status, PlaybackStatus::Errored);

    sim.advance(&mut session, Duration::from_secs(60));
    assert_eq!(requests.borrow().len(), 1);
    assert_eq!(sim.engines.log().start_loads.len(), 3);
}

#[test]
fn test_automatic_fallback_not_repeated_after_manual_retry() {
    let sim = SimHost::new();
    sim.engines
        .configure(|script| script.failure = Some(EngineErrorKind::Network));
    let (mut session, requests) = start_with_fallback(&sim, MANIFEST_URL);
    sim.advance(&mut session, Duration::from_secs(5));
    assert_eq!(requests.borrow().len(), 1);

    session.retry();
    assert_eq!(session.state().retry_count, 0);
    assert_eq!(session.state().status, PlaybackStatus::Loading);
    sim.advance(&mut session, Duration::from_secs(10));
    assert_eq!(session.state().status, PlaybackStatus::Errored);
    assert_eq!(requests.borrow().len(), 1);

    // The user can still ask for it
    session.switch_to_fallback().unwrap();
    assert_eq!(requests.borrow().len(), 2);
    assert_eq!(requests.borrow()[1].reason, FallbackReason::UserRequested);
}

#[test]
fn test_new_source_gets_a_fresh_fallback_budget() {
    let sim = SimHost::new();
    sim.engines
        .configure(|script| script.failure = Some(EngineErrorKind::Network));
    let (mut session, requests) = start_with_fallback(&sim, MANIFEST_URL);
    sim.advance(&mut session, Duration::from_secs(5));

    let first_id = session.session_id();
    session.load(PlaybackSource::new(OTHER_URL));
    assert_ne!(session.session_id(), first_id);
    sim.advance(&mut session, Duration::from_secs(5));

    let requests = requests.borrow();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].url, OTHER_URL);
}

#[test]
fn test_sustained_decode_failure_recovers_decoder() {
    let sim = SimHost::new();
    sim.engines
        .configure(|script| script.failure = Some(EngineErrorKind::Media));
    let (mut session, requests) = start_with_fallback(&sim, MANIFEST_URL);
    sim.advance(&mut session, Duration::from_secs(5));

    let log = sim.engines.log();
    assert_eq!(log.media_recoveries, 3);
    assert!(log.start_loads.is_empty());
    assert_eq!(session.state().error_kind(), Some(ErrorKind::MediaDecodeError));
    assert_eq!(requests.borrow().len(), 1);
}

#[test]
fn test_retry_after_recovered_failure_resets_count() {
    let sim = SimHost::new();
    let mut session = start(&sim, MANIFEST_URL);
    sim.pump(&mut session);
    let engine = sim.engines.current().unwrap();
    session.handle_engine_event(
        engine,
        EngineEvent::Error {
            fatal: true,
            kind: EngineErrorKind::Network,
            details: "levelLoadError".into(),
        },
    );
    sim.advance(&mut session, ms(1_000));
    assert_eq!(session.state().retry_count, 1);
    assert_eq!(session.state().status, PlaybackStatus::Playing);

    session.retry();
    sim.pump(&mut session);
    assert_eq!(session.state().retry_count, 0);
    assert_eq!(sim.engines.log().destroyed, 1);
}

#[test]
fn test_manual_fallback() {
    let sim = SimHost::new();
    let mut without = start(&sim, MANIFEST_URL);
    let err = without.switch_to_fallback().unwrap_err();
    assert_eq!(err.error_code(), "NO_FALLBACK");
    assert!(!without.state().can_fallback);
    drop(without);

    let (mut session, requests) = start_with_fallback(&sim, MANIFEST_URL);
    sim.pump(&mut session);
    session.seek(42.0);
    session.switch_to_fallback().unwrap();

    assert_eq!(session.state().status, PlaybackStatus::Idle);
    assert!(session.state().fallback_requested);
    assert!(!session.has_pipeline());
    assert_eq!(requests.borrow()[0].position, 42.0);
    assert_eq!(sim.engines.log().live_count(), 0);
}

// =============================================================================
// Resource discipline
// =============================================================================

#[test]
fn test_dispose_then_new_session_leaves_no_residue() {
    let sim = SimHost::new();
    let mut first = start(&sim, MANIFEST_URL);
    sim.pump(&mut first);
    // Events still queued when the first session goes away
    sim.media.tick(5.0);
    first.pause();
    first.dispose();

    assert_eq!(sim.residual_listeners(), 0);
    assert_eq!(sim.scheduler.pending_count(), 0);
    assert_eq!(sim.engines.log().live_count(), 0);

    let mut second = start(&sim, OTHER_URL);
    let mut updates = second.subscribe();
    sim.pump(&mut second);

    assert!(updates.has_changed().unwrap());
    let state = updates.borrow_and_update().clone();
    assert_eq!(state.status, PlaybackStatus::Playing);
    assert_eq!(state.position, 0.0);
    assert_eq!(state.session_id, second.session_id());
    assert_ne!(first.session_id(), second.session_id());
    assert_eq!(sim.engines.log().live_count(), 1);
}

#[test]
fn test_drop_releases_everything() {
    let sim = SimHost::new();
    {
        let mut session = start(&sim, MANIFEST_URL);
        sim.pump(&mut session);
        session.handle_tap(TapZone::Center, sim.scheduler.now());
        assert!(sim.residual_listeners() > 0);
    }
    assert_eq!(sim.residual_listeners(), 0);
    assert_eq!(sim.scheduler.pending_count(), 0);
    assert_eq!(sim.engines.log().destroyed, 1);
    assert_eq!(sim.media.source(), None);
}

#[test]
fn test_input_after_dispose_is_ignored() {
    let sim = SimHost::new();
    {
        let mut session = start(&sim, MANIFEST_URL);
        sim.pump(&mut session);
        session.dispose();
        let volume = sim.media.volume();

        session.handle_tap(TapZone::Left, sim.scheduler.now());
        session.pointer_activity();
        session.handle_key("KeyM");
        session.set_volume(0.2);
        session.toggle_fullscreen();
        assert!(session.set_playback_rate(2.0).is_err());

        assert_eq!(sim.scheduler.pending_count(), 0);
        assert_eq!(sim.media.volume(), volume);
        assert!(!sim.media.is_muted());
        assert_eq!(sim.media.playback_rate(), 1.0);
        assert_eq!(sim.fullscreen.active_target(), None);
    }
    assert_eq!(sim.scheduler.pending_count(), 0);
    assert_eq!(sim.residual_listeners(), 0);
}

#[test]
fn test_state_stream_reports_changes() {
    let sim = SimHost::new();
    let mut session = start(&sim, MANIFEST_URL);
    let mut rx = session.subscribe();
    assert_eq!(rx.borrow().status, PlaybackStatus::Loading);

    sim.pump(&mut session);
    tokio_test::block_on(async {
        rx.changed().await.unwrap();
    });
    assert_eq!(rx.borrow_and_update().status, PlaybackStatus::Playing);

    // No change, no notification
    sim.pump(&mut session);
    assert!(!rx.has_changed().unwrap());
}

#[test]
fn test_repeated_waiting_is_one_buffering_episode() {
    let sim = SimHost::new();
    let mut session = start(&sim, MANIFEST_URL);
    sim.pump(&mut session);
    let mut rx = session.subscribe();

    let mut statuses = vec![rx.borrow_and_update().status];
    let mut record = |status: PlaybackStatus| {
        if statuses.last() != Some(&status) {
            statuses.push(status);
        }
    };
    for _ in 0..3 {
        sim.media.emit(MediaEvent::Waiting);
        sim.media.tick(0.25);
        sim.pump(&mut session);
        record(rx.borrow_and_update().status);
    }
    sim.media.emit(MediaEvent::Playing);
    sim.media.emit(MediaEvent::Playing);
    sim.pump(&mut session);
    record(rx.borrow_and_update().status);

    assert_eq!(
        statuses,
        vec![
            PlaybackStatus::Playing,
            PlaybackStatus::Buffering,
            PlaybackStatus::Playing
        ]
    );
    assert_eq!(session.state().retry_count, 0);
    assert_eq!(sim.engines.log().created, 1);
}

// =============================================================================
// Transport controls
// =============================================================================

#[test]
fn test_seek_clamps_for_all_targets() {
    let sim = SimHost::new();
    sim.media.set_duration(120.0);
    let mut session = start(&sim, MANIFEST_URL);
    sim.pump(&mut session);

    for (target, expected) in [
        (-50.0, 0.0),
        (0.0, 0.0),
        (42.5, 42.5),
        (120.0, 120.0),
        (1_000.0, 120.0),
    ] {
        session.seek(target);
        sim.pump(&mut session);
        assert_eq!(session.state().position, expected, "seek({})", target);
    }
}

#[test]
fn test_seek_before_duration_known_only_floors() {
    let sim = SimHost::new();
    sim.engines.configure(|script| script.stall_manifest = true);
    let mut session = start(&sim, MANIFEST_URL);
    session.seek(5_000.0);
    assert_eq!(session.state().position, 5_000.0);
    session.seek(-1.0);
    assert_eq!(session.state().position, 0.0);
}

#[test]
fn test_volume_mute_property() {
    let sim = SimHost::new();
    let mut session = start(&sim, MANIFEST_URL);

    session.set_volume(0.0);
    assert!(session.state().muted);
    session.set_volume(0.5);
    assert!(!session.state().muted);

    session.set_volume(0.0);
    session.toggle_mute();
    assert!(!session.state().muted);
    assert!(session.state().volume > 0.0);
}

/// Unmuting restores the last audible volume instead of jumping to full
#[test]
fn test_unmute_restores_previous_volume_not_full() {
    let sim = SimHost::new();
    let mut session = start(&sim, MANIFEST_URL);
    session.set_volume(0.3);
    session.toggle_mute();
    assert_eq!(sim.media.volume(), 0.3);
    assert!(sim.media.is_muted());

    session.toggle_mute();
    assert_eq!(session.state().volume, 0.3);
    assert_ne!(session.state().volume, 1.0);
}

#[test]
fn test_pinned_quality_survives_engine_switches() {
    let sim = SimHost::new();
    let mut session = start(&sim, MANIFEST_URL);
    sim.pump(&mut session);

    session.set_quality_level(LevelSelection::from(2)).unwrap();
    let engine = sim.engines.current().unwrap();
    sim.engines
        .emit(engine, EngineEvent::LevelSwitched { level: 0 });
    sim.pump(&mut session);
    assert_eq!(session.state().selected_level, LevelSelection::Pinned(2));
    assert_eq!(session.state().current_level, Some(0));

    session.set_quality_level(LevelSelection::from(-1)).unwrap();
    assert_eq!(session.state().selected_level.index(), -1);
}

// =============================================================================
// Gestures
// =============================================================================

#[test]
fn test_double_tap_skips_exactly_once() {
    let sim = SimHost::new();
    let mut session = start(&sim, MANIFEST_URL);
    sim.pump(&mut session);
    session.pause();
    session.seek(50.0);
    sim.pump(&mut session);
    let visible = session.state().controls_visible;

    session.handle_tap(TapZone::Right, sim.scheduler.now());
    sim.advance(&mut session, ms(200));
    session.handle_tap(TapZone::Right, sim.scheduler.now());
    sim.advance(&mut session, ms(1_000));

    assert_eq!(session.state().position, 60.0);
    assert_eq!(sim.media.seeks(), vec![50.0, 60.0]);
    assert_eq!(session.state().controls_visible, visible);

    session.handle_tap(TapZone::Left, sim.scheduler.now());
    sim.advance(&mut session, ms(100));
    session.handle_tap(TapZone::Left, sim.scheduler.now());
    sim.pump(&mut session);
    assert_eq!(session.state().position, 50.0);
}

#[test]
fn test_spaced_single_taps_toggle_controls_twice() {
    let sim = SimHost::new();
    let mut session = start(&sim, MANIFEST_URL);
    sim.pump(&mut session);
    session.pause();
    sim.pump(&mut session);
    assert!(session.state().controls_visible);
    let seeks = sim.media.seeks().len();

    session.handle_tap(TapZone::Left, sim.scheduler.now());
    sim.advance(&mut session, ms(300));
    assert!(!session.state().controls_visible);

    session.handle_tap(TapZone::Left, sim.scheduler.now());
    sim.advance(&mut session, ms(300));
    assert!(session.state().controls_visible);
    assert_eq!(sim.media.seeks().len(), seeks);
}

#[test]
fn test_center_double_tap_toggles_fullscreen() {
    let sim = SimHost::new();
    let mut session = start(&sim, MANIFEST_URL);
    sim.pump(&mut session);

    session.handle_tap(TapZone::Center, sim.scheduler.now());
    session.handle_tap(TapZone::Center, sim.scheduler.now() + ms(150));
    sim.pump(&mut session);
    assert!(session.state().fullscreen);
}

// =============================================================================
// Auto-advance
// =============================================================================

#[test]
fn test_ended_advances_through_playlist() {
    let playlist = EpisodePlaylist::from_json(
        r#"[{"server_name": "Vietsub #1", "server_data": [
            {"name": "Tap 1", "slug": "tap-1", "link_m3u8": "https://cdn.example.com/1.m3u8", "link_embed": "https://embed.example.com/1"},
            {"name": "Tap 2", "slug": "tap-2", "link_m3u8": "https://cdn.example.com/2.m3u8", "link_embed": "https://embed.example.com/2"}
        ]}]"#,
    )
    .unwrap();

    let sim = SimHost::new();
    let ended = Rc::new(RefCell::new(false));
    let callbacks = {
        let ended = Rc::clone(&ended);
        SessionCallbacks::new().on_ended(move || *ended.borrow_mut() = true)
    };
    let mut cursor = EpisodeCursor::default();
    let url = playlist.link_for(cursor, PlayerMode::M3u8).unwrap();
    let mut session = PlaybackSession::new(
        sim.host(),
        PlaybackSource::new(url),
        PlayerConfig::default(),
        callbacks,
    );
    sim.pump(&mut session);

    sim.media.finish();
    sim.pump(&mut session);
    assert_eq!(session.state().status, PlaybackStatus::Ended);
    assert!(*ended.borrow());

    cursor = playlist.next_after(cursor).unwrap();
    let next = playlist.link_for(cursor, PlayerMode::M3u8).unwrap();
    session.load(PlaybackSource::new(next));
    sim.pump(&mut session);
    assert_eq!(session.state().status, PlaybackStatus::Playing);
    assert_eq!(
        sim.engines.log().loaded_urls.last().map(String::as_str),
        Some("https://cdn.example.com/2.m3u8")
    );
    assert!(playlist.next_after(cursor).is_none());
}
