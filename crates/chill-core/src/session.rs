//! Playback Session - supervises one playback attempt
//!
//! Coordinates:
//! - Capability detection (streaming engine, native playback, progressive file)
//! - The load watchdog
//! - Bounded recovery of network and decode failures
//! - The hand-off to a fallback player
//! - Transport controls, gestures, keyboard shortcuts and control visibility
//!
//! The session is a synchronous state machine. It never blocks: host calls
//! return immediately and their outcome comes back later through
//! [`handle_media_event`](PlaybackSession::handle_media_event),
//! [`handle_engine_event`](PlaybackSession::handle_engine_event),
//! [`handle_document_event`](PlaybackSession::handle_document_event) and
//! [`handle_timer`](PlaybackSession::handle_timer). Every state change is
//! published on a `watch` channel.

use crate::{
    config::{EngineConfig, PlayerConfig, SessionConfig},
    controls::ControlsVisibility,
    error::{Error, ErrorKind, PlaybackError},
    fullscreen::preferred_target,
    gesture::{GestureAction, TapDetector, TapOutcome, TapZone},
    keyboard::{ControlAction, KeyOutcome},
    manifest::{detect_source_kind, SourceKind},
    platform::{
        DocumentEvent, DocumentEventKind, EngineErrorKind, EngineEvent, EngineId, Host,
        ListenerId, MediaEvent, MediaEventKind, PlayRejection, StreamingEngine, TimerId, HLS_MIME,
    },
    types::*,
    Result,
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

type FallbackCallback = Box<dyn FnMut(&FallbackRequest)>;
type EndedCallback = Box<dyn FnMut()>;
type ErrorCallback = Box<dyn FnMut(&PlaybackError)>;

/// Caller hooks
#[derive(Default)]
pub struct SessionCallbacks {
    on_fallback: Option<FallbackCallback>,
    on_ended: Option<EndedCallback>,
    on_error: Option<ErrorCallback>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives the hand-off when playback moves to the fallback player.
    /// Without it the session never falls back.
    pub fn on_fallback(mut self, callback: impl FnMut(&FallbackRequest) + 'static) -> Self {
        self.on_fallback = Some(Box::new(callback));
        self
    }

    pub fn on_ended(mut self, callback: impl FnMut() + 'static) -> Self {
        self.on_ended = Some(Box::new(callback));
        self
    }

    /// Called on every transition into `Errored`
    pub fn on_error(mut self, callback: impl FnMut(&PlaybackError) + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.on_fallback.is_some()
    }
}

impl std::fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("on_fallback", &self.on_fallback.is_some())
            .field("on_ended", &self.on_ended.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Lifecycle phase. The observable status is derived from it and the media flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Loading,
    Ready,
    Errored,
}

/// Last state reported by the media element
#[derive(Debug, Clone, Copy)]
struct MediaFlags {
    paused: bool,
    waiting: bool,
    ended: bool,
}

impl Default for MediaFlags {
    fn default() -> Self {
        Self {
            paused: true,
            waiting: false,
            ended: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecoveryAction {
    /// Restart fragment loading from the current position
    RestartLoad,
    /// Reset the decoder
    RecoverDecoder,
}

enum Delivery {
    Engine(Box<dyn StreamingEngine>),
    Native,
}

/// Everything attached for the current source
struct Pipeline {
    delivery: Delivery,
    listeners: Vec<ListenerId>,
}

#[derive(Debug, Default)]
struct Timers {
    watchdog: Option<TimerId>,
    recovery: Option<(TimerId, RecoveryAction)>,
    fallback: Option<(TimerId, ErrorKind)>,
    tap: Option<TimerId>,
}

/// Playback session for one source at a time
pub struct PlaybackSession {
    host: Host,
    config: SessionConfig,
    engine_config: EngineConfig,
    callbacks: SessionCallbacks,
    source: PlaybackSource,
    pipeline: Option<Pipeline>,
    phase: Phase,
    flags: MediaFlags,
    timers: Timers,
    /// Document listeners, held for the whole life of the session
    document_listeners: Vec<ListenerId>,
    controls: ControlsVisibility,
    taps: TapDetector,
    /// Volume restored by unmuting
    restore_volume: f64,
    /// The automatic hand-off already happened for this source
    auto_fallback_used: bool,
    disposed: bool,
    state: PlaybackState,
    state_tx: watch::Sender<PlaybackState>,
}

impl PlaybackSession {
    /// Create a session and start loading `source`
    pub fn new(
        host: Host,
        source: PlaybackSource,
        config: PlayerConfig,
        callbacks: SessionCallbacks,
    ) -> Self {
        let session_id = SessionId::new();
        let mut state = PlaybackState::new(session_id);
        state.can_fallback = callbacks.has_fallback();
        let (state_tx, _) = watch::channel(state.clone());

        let document_listeners = vec![
            host.document.add_listener(DocumentEventKind::FullscreenChange),
            host.document.add_listener(DocumentEventKind::KeyDown),
        ];

        let mut session = Self {
            controls: ControlsVisibility::new(config.session.controls_idle()),
            taps: TapDetector::new(config.session.double_tap_window()),
            host,
            config: config.session,
            engine_config: config.engine,
            callbacks,
            source,
            pipeline: None,
            phase: Phase::Idle,
            flags: MediaFlags::default(),
            timers: Timers::default(),
            document_listeners,
            restore_volume: 1.0,
            auto_fallback_used: false,
            disposed: false,
            state,
            state_tx,
        };

        info!(session_id = %session_id, "Playback session created");
        session.start();
        session
    }

    pub fn session_id(&self) -> SessionId {
        self.state.session_id
    }

    pub fn source(&self) -> &PlaybackSource {
        &self.source
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current state snapshot
    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    /// Whether a playback pipeline is attached
    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Input and control calls after `dispose` are ignored
    fn is_live(&self) -> bool {
        if self.disposed {
            debug!("Ignoring call on a disposed session");
        }
        !self.disposed
    }

    /// Replace the source. The current pipeline is torn down first and the
    /// new source starts a fresh session id, retry budget and fallback budget.
    #[instrument(skip(self))]
    pub fn load(&mut self, source: PlaybackSource) {
        if self.disposed {
            warn!("Ignoring load on a disposed session");
            return;
        }
        self.source = source;
        self.auto_fallback_used = false;
        self.taps.reset();
        self.state.session_id = SessionId::new();
        info!(session_id = %self.state.session_id, "Source changed");
        self.start();
    }

    /// Reload the current source from scratch
    #[instrument(skip(self))]
    pub fn retry(&mut self) {
        if self.disposed {
            warn!("Ignoring retry on a disposed session");
            return;
        }
        info!(url = %self.source.url, "Manual retry");
        self.start();
    }

    /// Hand playback to the fallback player on the user's request
    #[instrument(skip(self))]
    pub fn switch_to_fallback(&mut self) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        if !self.callbacks.has_fallback() {
            return Err(Error::FallbackUnavailable);
        }
        if self.source.is_empty() {
            return Err(Error::NoSource);
        }
        self.hand_off(FallbackReason::UserRequested);
        Ok(())
    }

    /// Release everything the session holds. Further events are ignored.
    #[instrument(skip(self))]
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.release_pipeline();
        self.cancel_session_timers();
        self.cancel_tap();
        self.controls.cancel(self.host.scheduler.as_ref());
        for id in self.document_listeners.drain(..) {
            self.host.document.remove_listener(id);
        }
        self.phase = Phase::Idle;
        info!(session_id = %self.state.session_id, "Playback session disposed");
        self.publish();
    }

    #[instrument(skip(self))]
    pub fn play(&mut self) {
        if self.pipeline.is_none() {
            debug!("No pipeline, ignoring play");
            return;
        }
        if self.host.media.is_paused() {
            self.host.media.play();
        }
    }

    #[instrument(skip(self))]
    pub fn pause(&mut self) {
        if self.pipeline.is_none() {
            debug!("No pipeline, ignoring pause");
            return;
        }
        if !self.host.media.is_paused() {
            self.host.media.pause();
        }
    }

    #[instrument(skip(self))]
    pub fn toggle_play(&mut self) {
        if !self.is_live() {
            return;
        }
        if self.host.media.is_paused() {
            self.play();
        } else {
            self.pause();
        }
    }

    /// Seek, clamped to `[0, duration]` once the duration is known
    #[instrument(skip(self))]
    pub fn seek(&mut self, position: f64) {
        if self.pipeline.is_none() || !position.is_finite() {
            debug!("Ignoring seek");
            return;
        }
        let duration = self.state.duration;
        let target = if duration > 0.0 {
            position.clamp(0.0, duration)
        } else {
            position.max(0.0)
        };

        info!(from = self.state.position, to = target, "Seeking");
        self.host.media.set_current_time(target);
        self.state.position = target;
        if self.flags.ended && target < duration {
            self.flags.ended = false;
        }
        self.publish();
    }

    /// Seek relative to the current position
    #[instrument(skip(self))]
    pub fn skip(&mut self, delta: f64) {
        self.seek(self.state.position + delta);
    }

    /// Set the volume, clamped to `[0, 1]`. Zero mutes, anything else unmutes.
    #[instrument(skip(self))]
    pub fn set_volume(&mut self, volume: f64) {
        if !self.is_live() {
            return;
        }
        if !volume.is_finite() {
            debug!("Ignoring non-finite volume");
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.state.volume = volume;
        self.state.muted = volume == 0.0;
        if volume > 0.0 {
            self.restore_volume = volume;
        }
        self.host.media.set_volume(volume);
        self.host.media.set_muted(self.state.muted);
        self.publish();
    }

    /// Mute, or unmute back to the last audible volume
    #[instrument(skip(self))]
    pub fn toggle_mute(&mut self) {
        if !self.is_live() {
            return;
        }
        if self.state.muted {
            let volume = if self.restore_volume > 0.0 {
                self.restore_volume
            } else {
                1.0
            };
            self.state.muted = false;
            self.state.volume = volume;
            self.host.media.set_volume(volume);
        } else {
            if self.state.volume > 0.0 {
                self.restore_volume = self.state.volume;
            }
            self.state.muted = true;
        }
        self.host.media.set_muted(self.state.muted);
        self.publish();
    }

    #[instrument(skip(self))]
    pub fn set_playback_rate(&mut self, rate: f64) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        if !(rate.is_finite() && rate > 0.0) {
            return Err(Error::InvalidPlaybackRate(rate));
        }
        self.state.playback_rate = rate;
        self.host.media.set_playback_rate(rate);
        self.publish();
        Ok(())
    }

    /// Pin a discovered level or go back to automatic selection.
    /// Only the engine path has levels; elsewhere this is a no-op.
    #[instrument(skip(self))]
    pub fn set_quality_level(&mut self, selection: LevelSelection) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        let on_engine = matches!(
            self.pipeline.as_ref().map(|p| &p.delivery),
            Some(Delivery::Engine(_))
        );
        if !on_engine {
            debug!("Quality selection needs the streaming engine, ignoring");
            return Ok(());
        }
        if let LevelSelection::Pinned(index) = selection {
            if !self.state.levels.iter().any(|level| level.index == index) {
                return Err(Error::UnknownLevel(selection.index()));
            }
        }

        if let Some(Pipeline {
            delivery: Delivery::Engine(engine),
            ..
        }) = self.pipeline.as_mut()
        {
            engine.set_current_level(selection.index());
        }
        info!(level = selection.index(), "Quality level selected");
        self.state.selected_level = selection;
        self.publish();
        Ok(())
    }

    /// Enter fullscreen on the container, or on the media element when the
    /// container cannot go fullscreen. Exits when already fullscreen.
    #[instrument(skip(self))]
    pub fn toggle_fullscreen(&mut self) {
        if !self.is_live() {
            return;
        }
        let controller = self.host.fullscreen.clone();
        if controller.is_fullscreen() {
            if let Err(e) = controller.unlock_orientation() {
                debug!(error = %e, "Orientation unlock skipped");
            }
            if let Err(e) = controller.exit() {
                warn!(error = %e, "Failed to exit fullscreen");
            }
            return;
        }

        let Some(target) = preferred_target(controller.as_ref()) else {
            debug!(family = controller.name(), "Fullscreen unavailable");
            return;
        };
        match controller.request(target) {
            Ok(()) => {
                info!(target = ?target, family = controller.name(), "Entering fullscreen");
                if let Err(e) = controller.lock_landscape() {
                    debug!(error = %e, "Orientation lock skipped");
                }
            }
            Err(e) => warn!(error = %e, "Fullscreen request failed"),
        }
    }

    /// Tap or click on the player surface at host time `at`
    #[instrument(skip(self))]
    pub fn handle_tap(&mut self, zone: TapZone, at: Duration) {
        if !self.is_live() {
            return;
        }
        match self.taps.register(zone, at) {
            TapOutcome::Single => {
                self.cancel_tap();
                self.timers.tap = Some(self.host.scheduler.schedule(self.taps.window()));
            }
            TapOutcome::Double(action) => {
                self.cancel_tap();
                debug!(action = ?action, "Double tap");
                match action {
                    GestureAction::SkipBackward => self.skip(-self.config.skip_seconds),
                    GestureAction::SkipForward => self.skip(self.config.skip_seconds),
                    GestureAction::ToggleFullscreen => self.toggle_fullscreen(),
                }
            }
        }
    }

    /// Route a key press. The host must cancel the default action when the
    /// outcome asks for it.
    #[instrument(skip(self))]
    pub fn handle_key(&mut self, code: &str) -> KeyOutcome {
        let outcome = KeyOutcome::for_code(code);
        if !self.is_live() {
            return outcome;
        }
        if let Some(action) = outcome.action {
            match action {
                ControlAction::PlayPause => self.toggle_play(),
                ControlAction::SeekForward => self.skip(self.config.skip_seconds),
                ControlAction::SeekBackward => self.skip(-self.config.skip_seconds),
                ControlAction::VolumeUp => self.set_volume(self.state.volume + self.config.volume_step),
                ControlAction::VolumeDown => {
                    self.set_volume(self.state.volume - self.config.volume_step)
                }
                ControlAction::Mute => self.toggle_mute(),
                ControlAction::Fullscreen => self.toggle_fullscreen(),
            }
        }
        self.pointer_activity();
        outcome
    }

    /// Pointer moved over the player
    pub fn pointer_activity(&mut self) {
        if !self.is_live() {
            return;
        }
        let playing = self.state.is_playing();
        self.controls.show(playing, self.host.scheduler.as_ref());
        self.publish();
    }

    /// Pointer left the player
    pub fn pointer_left(&mut self) {
        if self.is_live() && self.state.is_playing() {
            self.controls.hide(self.host.scheduler.as_ref());
            self.publish();
        }
    }

    /// Event from a media element listener
    pub fn handle_media_event(&mut self, listener: ListenerId, event: MediaEvent) {
        let native = match &self.pipeline {
            Some(pipeline) if pipeline.listeners.contains(&listener) => {
                matches!(pipeline.delivery, Delivery::Native)
            }
            _ => {
                debug!(listener = listener.0, "Ignoring event from a detached listener");
                return;
            }
        };

        match event {
            MediaEvent::Play => {
                self.flags.paused = false;
                self.flags.ended = false;
            }
            MediaEvent::Pause => self.flags.paused = true,
            MediaEvent::Playing => {
                self.flags = MediaFlags {
                    paused: false,
                    waiting: false,
                    ended: false,
                };
                self.state.autoplay_blocked = false;
            }
            MediaEvent::Waiting => self.flags.waiting = true,
            MediaEvent::TimeUpdate {
                position,
                buffered_end,
            } => self.update_position(position, buffered_end),
            MediaEvent::DurationChange(duration) => {
                self.state.duration = if duration.is_finite() && duration > 0.0 {
                    duration
                } else {
                    0.0
                };
                if self.state.duration > 0.0 && self.state.position > self.state.duration {
                    self.state.position = self.state.duration;
                }
            }
            MediaEvent::LoadedMetadata => {
                if native {
                    self.mark_ready();
                }
            }
            MediaEvent::Ended => {
                self.flags.ended = true;
                self.flags.paused = true;
                info!("Playback ended");
                self.publish();
                if let Some(callback) = self.callbacks.on_ended.as_mut() {
                    callback();
                }
                return;
            }
            MediaEvent::Error(details) => {
                if native {
                    self.fail(ErrorKind::GenericFatal, details);
                    return;
                }
                debug!(details = %details, "Media error left to the streaming engine");
            }
            MediaEvent::PlayRejected(PlayRejection::Aborted) => {
                debug!("Play request interrupted");
            }
            MediaEvent::PlayRejected(
                PlayRejection::NotAllowed(reason) | PlayRejection::Other(reason),
            ) => {
                warn!(reason = %reason, "Autoplay blocked");
                self.state.autoplay_blocked = true;
            }
            MediaEvent::FullscreenChange(active) => self.state.fullscreen = active,
        }
        self.publish();
    }

    /// Event from the streaming engine
    pub fn handle_engine_event(&mut self, engine: EngineId, event: EngineEvent) {
        let attached = match &self.pipeline {
            Some(Pipeline {
                delivery: Delivery::Engine(current),
                ..
            }) => current.id() == engine,
            _ => false,
        };
        if !attached {
            debug!(engine = engine.0, "Ignoring event from a detached engine");
            return;
        }

        match event {
            EngineEvent::ManifestParsed { mut levels } => {
                sort_levels_for_display(&mut levels);
                info!(levels = levels.len(), "Manifest parsed");
                self.state.levels = levels;
                self.mark_ready();
            }
            EngineEvent::LevelSwitched { level } => {
                debug!(level, "Level switched");
                self.state.current_level = Some(level);
            }
            EngineEvent::Error {
                fatal: false,
                kind,
                details,
            } => {
                debug!(kind = ?kind, details = %details, "Non-fatal engine error");
                return;
            }
            EngineEvent::Error {
                fatal: true,
                kind,
                details,
            } => {
                self.handle_fatal_engine_error(kind, details);
                return;
            }
        }
        self.publish();
    }

    /// Event from a document listener
    pub fn handle_document_event(&mut self, listener: ListenerId, event: DocumentEvent) {
        if !self.document_listeners.contains(&listener) {
            debug!(listener = listener.0, "Ignoring event from a detached listener");
            return;
        }
        match event {
            DocumentEvent::FullscreenChange => {
                let active = self.host.fullscreen.is_fullscreen();
                if !active {
                    if let Err(e) = self.host.fullscreen.unlock_orientation() {
                        debug!(error = %e, "Orientation unlock skipped");
                    }
                }
                self.state.fullscreen = active;
                self.publish();
            }
            DocumentEvent::KeyDown(code) => {
                self.handle_key(&code);
            }
        }
    }

    /// A scheduled timer fired
    pub fn handle_timer(&mut self, id: TimerId) {
        if self.timers.watchdog == Some(id) {
            self.timers.watchdog = None;
            if self.phase == Phase::Loading {
                let details = format!("nothing playable after {} ms", self.config.load_timeout_ms);
                self.fail(ErrorKind::LoadTimeout, details);
            }
            return;
        }
        if let Some((timer, action)) = self.timers.recovery {
            if timer == id {
                self.timers.recovery = None;
                self.run_recovery(action);
                return;
            }
        }
        if let Some((timer, kind)) = self.timers.fallback {
            if timer == id {
                self.timers.fallback = None;
                self.auto_fallback(kind);
                return;
            }
        }
        if self.timers.tap == Some(id) {
            self.timers.tap = None;
            let playing = self.state.is_playing();
            self.controls.toggle(playing, self.host.scheduler.as_ref());
            self.publish();
            return;
        }
        if self.controls.owns_timer(id) {
            if self.controls.idle_elapsed(id, self.state.is_playing()) {
                self.publish();
            }
            return;
        }
        debug!(timer = id.0, "Ignoring stale timer");
    }

    /// Tear down and attach a pipeline for the current source
    fn start(&mut self) {
        self.release_pipeline();
        self.cancel_session_timers();

        self.phase = Phase::Idle;
        self.flags = MediaFlags::default();
        self.state.position = 0.0;
        self.state.duration = 0.0;
        self.state.buffered_end = 0.0;
        self.state.buffered_ahead = 0.0;
        self.state.selected_level = LevelSelection::Auto;
        self.state.current_level = None;
        self.state.levels.clear();
        self.state.retry_count = 0;
        self.state.error = None;
        self.state.autoplay_blocked = false;
        self.state.fallback_requested = false;

        if self.source.is_empty() {
            debug!("Empty source, staying idle");
            self.publish();
            return;
        }

        self.phase = Phase::Loading;
        self.timers.watchdog = Some(self.host.scheduler.schedule(self.config.load_timeout()));
        info!(url = %self.source.url, autoplay = self.source.autoplay, "Loading source");

        self.host.media.set_volume(self.state.volume);
        self.host.media.set_muted(self.state.muted);
        self.host.media.set_playback_rate(self.state.playback_rate);

        match detect_source_kind(&self.source.url) {
            SourceKind::Progressive { mime } => self.attach_native(mime),
            SourceKind::Manifest if self.host.engines.is_supported() => self.attach_engine(),
            SourceKind::Manifest => self.attach_native(HLS_MIME),
        }
        self.publish();
    }

    fn register_media_listeners(&self) -> Vec<ListenerId> {
        MediaEventKind::ALL
            .iter()
            .map(|kind| self.host.media.add_listener(*kind))
            .collect()
    }

    fn attach_engine(&mut self) {
        let listeners = self.register_media_listeners();
        let mut engine = self.host.engines.create(&self.engine_config);
        info!(engine = engine.id().0, "Streaming engine attached");
        engine.load_source(&self.source.url);
        engine.attach_media();
        self.pipeline = Some(Pipeline {
            delivery: Delivery::Engine(engine),
            listeners,
        });
    }

    fn attach_native(&mut self, mime: &str) {
        if !self.host.media.can_play_type(mime).is_playable() {
            self.fail(
                ErrorKind::UnsupportedFormat,
                format!("no playback path for {}", mime),
            );
            return;
        }
        let listeners = self.register_media_listeners();
        info!(mime, "Native playback attached");
        self.host.media.set_source(Some(self.source.url.as_str()));
        self.pipeline = Some(Pipeline {
            delivery: Delivery::Native,
            listeners,
        });
    }

    /// Detach listeners, destroy the engine and clear the media source
    fn release_pipeline(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            for id in pipeline.listeners {
                self.host.media.remove_listener(id);
            }
            if let Delivery::Engine(mut engine) = pipeline.delivery {
                engine.destroy();
            }
            self.host.media.set_source(None);
            debug!("Pipeline released");
        }
    }

    fn cancel_session_timers(&mut self) {
        let pending = [
            self.timers.watchdog.take(),
            self.timers.recovery.take().map(|(id, _)| id),
            self.timers.fallback.take().map(|(id, _)| id),
        ];
        for id in pending.into_iter().flatten() {
            self.host.scheduler.cancel(id);
        }
    }

    fn cancel_tap(&mut self) {
        if let Some(id) = self.timers.tap.take() {
            self.host.scheduler.cancel(id);
        }
    }

    fn mark_ready(&mut self) {
        if self.phase != Phase::Loading {
            return;
        }
        if let Some(id) = self.timers.watchdog.take() {
            self.host.scheduler.cancel(id);
        }
        self.phase = Phase::Ready;
        self.flags.paused = self.host.media.is_paused();
        info!("Source ready");
        if self.source.autoplay {
            self.host.media.play();
        }
    }

    fn update_position(&mut self, position: f64, buffered_end: Option<f64>) {
        if !position.is_finite() {
            return;
        }
        let mut position = position.max(0.0);
        if self.state.duration > 0.0 {
            position = position.min(self.state.duration);
        }
        self.state.position = position;
        if let Some(end) = buffered_end.filter(|end| end.is_finite()) {
            self.state.buffered_end = end;
            self.state.buffered_ahead = (end - position).max(0.0);
        }
    }

    fn handle_fatal_engine_error(&mut self, kind: EngineErrorKind, details: String) {
        let (error_kind, action) = match kind {
            EngineErrorKind::Network => (ErrorKind::NetworkError, RecoveryAction::RestartLoad),
            EngineErrorKind::Media => (ErrorKind::MediaDecodeError, RecoveryAction::RecoverDecoder),
            EngineErrorKind::Other => {
                self.fail(ErrorKind::GenericFatal, details);
                return;
            }
        };

        if self.timers.recovery.is_some() {
            debug!(details = %details, "Recovery already scheduled, ignoring duplicate error");
            return;
        }

        if self.state.retry_count < self.config.max_retries {
            self.state.retry_count += 1;
            warn!(
                kind = %error_kind,
                details = %details,
                attempt = self.state.retry_count,
                max_retries = self.config.max_retries,
                "Fatal engine error, scheduling recovery"
            );
            let timer = self.host.scheduler.schedule(self.config.retry_delay());
            self.timers.recovery = Some((timer, action));
            self.publish();
        } else {
            self.fail(error_kind, details);
        }
    }

    fn run_recovery(&mut self, action: RecoveryAction) {
        let position = self.host.media.current_time();
        match self.pipeline.as_mut().map(|p| &mut p.delivery) {
            Some(Delivery::Engine(engine)) => match action {
                RecoveryAction::RestartLoad => {
                    info!(position, "Restarting load");
                    engine.start_load(Some(position));
                }
                RecoveryAction::RecoverDecoder => {
                    info!("Recovering decoder");
                    engine.recover_media_error();
                }
            },
            _ => debug!("No engine to recover"),
        }
    }

    /// Enter `Errored`. The pipeline is released, so nothing attached to it
    /// can move the session again.
    fn fail(&mut self, kind: ErrorKind, details: impl Into<String>) {
        if self.phase == Phase::Errored {
            return;
        }
        let error = PlaybackError::new(kind, self.config.locale).with_details(details);
        warn!(
            code = kind.error_code(),
            details = ?error.details,
            retry_count = self.state.retry_count,
            "Playback failed"
        );

        self.release_pipeline();
        if let Some(id) = self.timers.watchdog.take() {
            self.host.scheduler.cancel(id);
        }
        if let Some((id, _)) = self.timers.recovery.take() {
            self.host.scheduler.cancel(id);
        }

        self.phase = Phase::Errored;
        self.state.error = Some(error.clone());
        self.publish();

        if let Some(callback) = self.callbacks.on_error.as_mut() {
            callback(&error);
        }

        if kind.triggers_auto_fallback() && self.callbacks.has_fallback() && !self.auto_fallback_used
        {
            let timer = self.host.scheduler.schedule(self.config.fallback_delay());
            self.timers.fallback = Some((timer, kind));
            info!(
                delay_ms = self.config.fallback_delay_ms,
                "Automatic fallback scheduled"
            );
        }
    }

    fn auto_fallback(&mut self, kind: ErrorKind) {
        if self.auto_fallback_used {
            debug!("Automatic fallback already used for this source");
            return;
        }
        self.auto_fallback_used = true;
        self.hand_off(FallbackReason::RetriesExhausted(kind));
    }

    fn hand_off(&mut self, reason: FallbackReason) {
        let position = self.state.position;
        self.release_pipeline();
        self.cancel_session_timers();
        if self.phase != Phase::Errored {
            self.phase = Phase::Idle;
        }
        self.state.fallback_requested = true;
        info!(reason = ?reason, position, "Handing playback to the fallback player");
        self.publish();

        let request = FallbackRequest {
            url: self.source.url.clone(),
            reason,
            position,
        };
        if let Some(callback) = self.callbacks.on_fallback.as_mut() {
            callback(&request);
        }
    }

    fn derive_status(&self) -> PlaybackStatus {
        match self.phase {
            Phase::Idle => PlaybackStatus::Idle,
            Phase::Loading => PlaybackStatus::Loading,
            Phase::Errored => PlaybackStatus::Errored,
            Phase::Ready if self.flags.ended => PlaybackStatus::Ended,
            Phase::Ready if self.flags.paused => PlaybackStatus::Paused,
            Phase::Ready if self.flags.waiting => PlaybackStatus::Buffering,
            Phase::Ready => PlaybackStatus::Playing,
        }
    }

    /// Recompute the status and broadcast the state if anything changed
    fn publish(&mut self) {
        let status = self.derive_status();
        let playing = status == PlaybackStatus::Playing;
        if playing != self.state.is_playing() {
            self.controls
                .playing_changed(playing, self.host.scheduler.as_ref());
        }
        if status != self.state.status {
            info!(from = %self.state.status, to = %status, "State transition");
            self.state.status = status;
        }
        self.state.controls_visible = self.controls.is_visible();

        let snapshot = self.state.clone();
        self.state_tx.send_if_modified(move |current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.dispose();
    }
}
