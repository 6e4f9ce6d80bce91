//! Deterministic in-memory host
//!
//! Drives a [`PlaybackSession`] without a browser: a virtual-clock
//! scheduler, a scripted streaming engine, a media element that records what
//! the session asked of it, a fullscreen controller and a document. Used by
//! the test suites, the benches and `chill-cli simulate`.
//!
//! Host calls never re-enter the session. Events are queued and only
//! delivered by [`SimHost::pump`] and [`SimHost::advance`], in the same order
//! a browser event loop would deliver them.

use crate::{
    config::EngineConfig,
    fullscreen::{FullscreenController, FullscreenError, FullscreenTarget},
    manifest::parse_levels,
    platform::{
        CanPlay, DocumentEvent, DocumentEventKind, EngineErrorKind, EngineEvent, EngineId,
        EngineProvider, Host, HostDocument, ListenerId, MediaElement, MediaEvent, MediaEventKind,
        PlayRejection, Scheduler, StreamingEngine, TimerId, HLS_MIME,
    },
    session::PlaybackSession,
    types::StreamLevel,
    Result,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;
use tracing::trace;

/// Scheduler on a virtual clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Cell<Duration>,
    next_id: Cell<u64>,
    pending: RefCell<BTreeMap<TimerId, Duration>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now.get()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.borrow().contains_key(&id)
    }

    /// Remove the earliest timer due at or before `until` and move the clock
    /// to its deadline. Timers sharing a deadline fire in scheduling order.
    pub fn pop_due(&self, until: Duration) -> Option<TimerId> {
        let mut pending = self.pending.borrow_mut();
        let (&id, &deadline) = pending
            .iter()
            .filter(|(_, deadline)| **deadline <= until)
            .min_by_key(|(id, deadline)| (**deadline, **id))?;
        pending.remove(&id);
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
        Some(id)
    }

    /// Move the clock forward without firing anything
    pub fn settle(&self, at: Duration) {
        if at > self.now.get() {
            self.now.set(at);
        }
    }

    /// Move the clock forward, returning every timer that came due in order
    pub fn advance(&self, by: Duration) -> Vec<TimerId> {
        let target = self.now.get() + by;
        let mut fired = Vec::new();
        while let Some(id) = self.pop_due(target) {
            fired.push(id);
        }
        self.settle(target);
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.pending.borrow_mut().insert(id, self.now.get() + delay);
        trace!(timer = id.0, delay_ms = delay.as_millis() as u64, "Timer scheduled");
        id
    }

    fn cancel(&self, id: TimerId) {
        self.pending.borrow_mut().remove(&id);
    }
}

/// How the simulated element answers play requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoplayPolicy {
    #[default]
    Allow,
    /// Every request is refused as needing a user gesture
    Block,
    /// Every request is interrupted before it starts
    Interrupt,
}

#[derive(Debug)]
struct MediaInner {
    source: Option<String>,
    native_hls: CanPlay,
    loads_metadata: bool,
    duration: f64,
    paused: bool,
    time: f64,
    volume: f64,
    muted: bool,
    rate: f64,
    autoplay: AutoplayPolicy,
    listeners: BTreeMap<ListenerId, MediaEventKind>,
    queue: VecDeque<MediaEvent>,
    play_requests: u32,
    seeks: Vec<f64>,
}

/// Media element that plays whatever it is given, instantly
#[derive(Debug)]
pub struct SimMedia {
    inner: RefCell<MediaInner>,
    next_listener: Cell<u64>,
}

impl Default for SimMedia {
    fn default() -> Self {
        Self {
            inner: RefCell::new(MediaInner {
                source: None,
                native_hls: CanPlay::No,
                loads_metadata: true,
                duration: 600.0,
                paused: true,
                time: 0.0,
                volume: 1.0,
                muted: false,
                rate: 1.0,
                autoplay: AutoplayPolicy::Allow,
                listeners: BTreeMap::new(),
                queue: VecDeque::new(),
                play_requests: 0,
                seeks: Vec::new(),
            }),
            next_listener: Cell::new(1),
        }
    }
}

impl SimMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer given when probed for native manifest playback
    pub fn set_native_hls(&self, answer: CanPlay) {
        self.inner.borrow_mut().native_hls = answer;
    }

    /// Whether assigning a source ever produces metadata
    pub fn set_loads_metadata(&self, loads: bool) {
        self.inner.borrow_mut().loads_metadata = loads;
    }

    pub fn set_duration(&self, duration: f64) {
        self.inner.borrow_mut().duration = duration;
    }

    pub fn set_autoplay(&self, policy: AutoplayPolicy) {
        self.inner.borrow_mut().autoplay = policy;
    }

    pub fn source(&self) -> Option<String> {
        self.inner.borrow().source.clone()
    }

    pub fn volume(&self) -> f64 {
        self.inner.borrow().volume
    }

    pub fn is_muted(&self) -> bool {
        self.inner.borrow().muted
    }

    pub fn playback_rate(&self) -> f64 {
        self.inner.borrow().rate
    }

    pub fn play_requests(&self) -> u32 {
        self.inner.borrow().play_requests
    }

    /// Positions the session seeked to, in order
    pub fn seeks(&self) -> Vec<f64> {
        self.inner.borrow().seeks.clone()
    }

    pub fn active_listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    pub fn listeners_for(&self, kind: MediaEventKind) -> Vec<ListenerId> {
        self.inner
            .borrow()
            .listeners
            .iter()
            .filter(|(_, registered)| **registered == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Queue an event as if the element had fired it
    pub fn emit(&self, event: MediaEvent) {
        self.inner.borrow_mut().queue.push_back(event);
    }

    pub fn next_event(&self) -> Option<MediaEvent> {
        self.inner.borrow_mut().queue.pop_front()
    }

    /// Stream attached through the engine: duration and metadata arrive
    pub fn load_stream(&self) {
        let mut inner = self.inner.borrow_mut();
        let duration = inner.duration;
        inner.queue.push_back(MediaEvent::DurationChange(duration));
        inner.queue.push_back(MediaEvent::LoadedMetadata);
    }

    /// Let playback run for `seconds` of media time
    pub fn tick(&self, seconds: f64) {
        let mut inner = self.inner.borrow_mut();
        if inner.paused {
            return;
        }
        let mut time = inner.time + seconds * inner.rate;
        if inner.duration > 0.0 {
            time = time.min(inner.duration);
        }
        inner.time = time;
        let buffered_end = Self::buffered_end(&inner, time);
        inner.queue.push_back(MediaEvent::TimeUpdate {
            position: time,
            buffered_end,
        });
    }

    /// Playback reached the end of the media
    pub fn finish(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.time = inner.duration;
        inner.paused = true;
        inner.queue.push_back(MediaEvent::Pause);
        inner.queue.push_back(MediaEvent::Ended);
    }

    fn buffered_end(inner: &MediaInner, position: f64) -> Option<f64> {
        let end = position + 10.0;
        Some(if inner.duration > 0.0 {
            end.min(inner.duration)
        } else {
            end
        })
    }
}

impl MediaElement for SimMedia {
    fn set_source(&self, url: Option<&str>) {
        let mut inner = self.inner.borrow_mut();
        // A new load aborts everything the element had pending
        inner.queue.clear();
        inner.source = url.map(str::to_string);
        inner.time = 0.0;
        inner.paused = true;
        if url.is_some() && inner.loads_metadata {
            let duration = inner.duration;
            inner.queue.push_back(MediaEvent::DurationChange(duration));
            inner.queue.push_back(MediaEvent::LoadedMetadata);
        }
    }

    fn can_play_type(&self, mime: &str) -> CanPlay {
        if mime == HLS_MIME {
            self.inner.borrow().native_hls
        } else if mime.starts_with("video/") {
            CanPlay::Maybe
        } else {
            CanPlay::No
        }
    }

    fn play(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.play_requests += 1;
        match inner.autoplay {
            AutoplayPolicy::Allow => {
                if inner.paused {
                    inner.paused = false;
                    inner.queue.push_back(MediaEvent::Play);
                    inner.queue.push_back(MediaEvent::Playing);
                }
            }
            AutoplayPolicy::Block => inner.queue.push_back(MediaEvent::PlayRejected(
                PlayRejection::NotAllowed("play() requires a user gesture".into()),
            )),
            AutoplayPolicy::Interrupt => inner
                .queue
                .push_back(MediaEvent::PlayRejected(PlayRejection::Aborted)),
        }
    }

    fn pause(&self) {
        let mut inner = self.inner.borrow_mut();
        if !inner.paused {
            inner.paused = true;
            inner.queue.push_back(MediaEvent::Pause);
        }
    }

    fn is_paused(&self) -> bool {
        self.inner.borrow().paused
    }

    fn current_time(&self) -> f64 {
        self.inner.borrow().time
    }

    fn set_current_time(&self, seconds: f64) {
        let mut inner = self.inner.borrow_mut();
        let mut time = seconds.max(0.0);
        if inner.duration > 0.0 {
            time = time.min(inner.duration);
        }
        inner.time = time;
        inner.seeks.push(time);
        let buffered_end = Self::buffered_end(&inner, time);
        inner.queue.push_back(MediaEvent::TimeUpdate {
            position: time,
            buffered_end,
        });
    }

    fn set_volume(&self, volume: f64) {
        self.inner.borrow_mut().volume = volume;
    }

    fn set_muted(&self, muted: bool) {
        self.inner.borrow_mut().muted = muted;
    }

    fn set_playback_rate(&self, rate: f64) {
        self.inner.borrow_mut().rate = rate;
    }

    fn add_listener(&self, kind: MediaEventKind) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.inner.borrow_mut().listeners.insert(id, kind);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.inner.borrow_mut().listeners.remove(&id);
    }
}

/// What the simulated engine does once attached
#[derive(Debug, Clone)]
pub struct EngineScript {
    pub supported: bool,
    /// Levels announced when the manifest parses, in engine order
    pub levels: Vec<StreamLevel>,
    /// Never finish parsing the manifest
    pub stall_manifest: bool,
    /// Fatal error raised after attaching and again on every recovery attempt
    pub failure: Option<EngineErrorKind>,
}

impl Default for EngineScript {
    fn default() -> Self {
        Self {
            supported: true,
            levels: vec![
                StreamLevel::new(0, 360),
                StreamLevel::new(1, 480),
                StreamLevel::new(2, 720),
                StreamLevel::new(3, 1080),
            ],
            stall_manifest: false,
            failure: None,
        }
    }
}

/// Everything the session asked of the engines
#[derive(Debug, Clone, Default)]
pub struct EngineLog {
    pub created: u32,
    pub destroyed: u32,
    pub loaded_urls: Vec<String>,
    pub start_loads: Vec<Option<f64>>,
    pub media_recoveries: u32,
    pub level_requests: Vec<i32>,
    pub last_config: Option<EngineConfig>,
    live: BTreeSet<u64>,
}

impl EngineLog {
    /// Engines created and not yet destroyed
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

#[derive(Debug)]
struct EngineShared {
    script: RefCell<EngineScript>,
    log: RefCell<EngineLog>,
    queue: RefCell<VecDeque<(EngineId, EngineEvent)>>,
    media: Rc<SimMedia>,
    next_id: Cell<u64>,
}

impl EngineShared {
    fn raise_failure(&self, id: EngineId) {
        let failure = self.script.borrow().failure;
        if let Some(kind) = failure {
            let details = match kind {
                EngineErrorKind::Network => "fragLoadError",
                EngineErrorKind::Media => "bufferAppendError",
                EngineErrorKind::Other => "internalException",
            };
            self.queue.borrow_mut().push_back((
                id,
                EngineEvent::Error {
                    fatal: true,
                    kind,
                    details: details.to_string(),
                },
            ));
        }
    }
}

/// Factory for scripted engines
#[derive(Debug)]
pub struct SimEngineProvider {
    shared: Rc<EngineShared>,
}

impl SimEngineProvider {
    pub fn new(media: Rc<SimMedia>) -> Self {
        Self {
            shared: Rc::new(EngineShared {
                script: RefCell::new(EngineScript::default()),
                log: RefCell::new(EngineLog::default()),
                queue: RefCell::new(VecDeque::new()),
                media,
                next_id: Cell::new(1),
            }),
        }
    }

    pub fn configure(&self, f: impl FnOnce(&mut EngineScript)) {
        f(&mut self.shared.script.borrow_mut());
    }

    /// Announce the levels of a real master playlist
    pub fn use_manifest(&self, content: &str) -> Result<()> {
        let mut levels = parse_levels(content.as_bytes())?;
        levels.sort_by_key(|level| level.index);
        self.shared.script.borrow_mut().levels = levels;
        Ok(())
    }

    pub fn log(&self) -> EngineLog {
        self.shared.log.borrow().clone()
    }

    /// Most recently created engine
    pub fn current(&self) -> Option<EngineId> {
        match self.shared.next_id.get() {
            1 => None,
            next => Some(EngineId(next - 1)),
        }
    }

    /// Queue an arbitrary event from an engine
    pub fn emit(&self, id: EngineId, event: EngineEvent) {
        self.shared.queue.borrow_mut().push_back((id, event));
    }

    pub fn next_event(&self) -> Option<(EngineId, EngineEvent)> {
        self.shared.queue.borrow_mut().pop_front()
    }
}

impl EngineProvider for SimEngineProvider {
    fn is_supported(&self) -> bool {
        self.shared.script.borrow().supported
    }

    fn create(&self, config: &EngineConfig) -> Box<dyn StreamingEngine> {
        let id = EngineId(self.shared.next_id.get());
        self.shared.next_id.set(id.0 + 1);
        {
            let mut log = self.shared.log.borrow_mut();
            log.created += 1;
            log.live.insert(id.0);
            log.last_config = Some(config.clone());
        }
        Box::new(SimEngine {
            id,
            shared: Rc::clone(&self.shared),
            destroyed: false,
        })
    }
}

/// One scripted engine instance
#[derive(Debug)]
pub struct SimEngine {
    id: EngineId,
    shared: Rc<EngineShared>,
    destroyed: bool,
}

impl StreamingEngine for SimEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn load_source(&mut self, url: &str) {
        self.shared.log.borrow_mut().loaded_urls.push(url.to_string());
    }

    fn attach_media(&mut self) {
        let script = self.shared.script.borrow().clone();
        if script.stall_manifest {
            return;
        }
        self.shared.queue.borrow_mut().push_back((
            self.id,
            EngineEvent::ManifestParsed {
                levels: script.levels.clone(),
            },
        ));
        if script.failure.is_some() {
            self.shared.raise_failure(self.id);
            return;
        }
        self.shared.media.load_stream();
        if let Some(top) = script.levels.iter().max_by_key(|level| level.height) {
            self.shared.queue.borrow_mut().push_back((
                self.id,
                EngineEvent::LevelSwitched { level: top.index },
            ));
        }
    }

    fn start_load(&mut self, position: Option<f64>) {
        self.shared.log.borrow_mut().start_loads.push(position);
        self.shared.raise_failure(self.id);
    }

    fn recover_media_error(&mut self) {
        self.shared.log.borrow_mut().media_recoveries += 1;
        self.shared.raise_failure(self.id);
    }

    fn set_current_level(&mut self, level: i32) {
        self.shared.log.borrow_mut().level_requests.push(level);
        if let Ok(level) = usize::try_from(level) {
            self.shared
                .queue
                .borrow_mut()
                .push_back((self.id, EngineEvent::LevelSwitched { level }));
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let mut log = self.shared.log.borrow_mut();
        log.destroyed += 1;
        log.live.remove(&self.id.0);
    }
}

/// Document with fullscreen and keyboard events
#[derive(Debug)]
pub struct SimDocument {
    listeners: RefCell<BTreeMap<ListenerId, DocumentEventKind>>,
    queue: RefCell<VecDeque<DocumentEvent>>,
    next_listener: Cell<u64>,
}

impl Default for SimDocument {
    fn default() -> Self {
        Self {
            listeners: RefCell::new(BTreeMap::new()),
            queue: RefCell::new(VecDeque::new()),
            next_listener: Cell::new(1),
        }
    }
}

impl SimDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, code: &str) {
        self.emit(DocumentEvent::KeyDown(code.to_string()));
    }

    pub fn emit(&self, event: DocumentEvent) {
        self.queue.borrow_mut().push_back(event);
    }

    pub fn next_event(&self) -> Option<DocumentEvent> {
        self.queue.borrow_mut().pop_front()
    }

    pub fn active_listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn listeners_for(&self, kind: DocumentEventKind) -> Vec<ListenerId> {
        self.listeners
            .borrow()
            .iter()
            .filter(|(_, registered)| **registered == kind)
            .map(|(id, _)| *id)
            .collect()
    }
}

impl HostDocument for SimDocument {
    fn add_listener(&self, kind: DocumentEventKind) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().insert(id, kind);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().remove(&id);
    }
}

/// Fullscreen controller that reports changes like a browser would
#[derive(Debug)]
pub struct SimFullscreen {
    container: Cell<bool>,
    media_target: Cell<bool>,
    active: Cell<Option<FullscreenTarget>>,
    orientation_locked: Cell<bool>,
    document: Rc<SimDocument>,
    media: Rc<SimMedia>,
}

impl SimFullscreen {
    pub fn new(document: Rc<SimDocument>, media: Rc<SimMedia>) -> Self {
        Self {
            container: Cell::new(true),
            media_target: Cell::new(true),
            active: Cell::new(None),
            orientation_locked: Cell::new(false),
            document,
            media,
        }
    }

    /// Media-element-only hosts, like iOS Safari
    pub fn set_container_supported(&self, supported: bool) {
        self.container.set(supported);
    }

    pub fn set_media_supported(&self, supported: bool) {
        self.media_target.set(supported);
    }

    pub fn active_target(&self) -> Option<FullscreenTarget> {
        self.active.get()
    }

    pub fn is_orientation_locked(&self) -> bool {
        self.orientation_locked.get()
    }

    fn announce(&self, target: FullscreenTarget, active: bool) {
        match target {
            FullscreenTarget::Container => self.document.emit(DocumentEvent::FullscreenChange),
            FullscreenTarget::Media => self.media.emit(MediaEvent::FullscreenChange(active)),
        }
    }
}

impl FullscreenController for SimFullscreen {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn supports(&self, target: FullscreenTarget) -> bool {
        match target {
            FullscreenTarget::Container => self.container.get(),
            FullscreenTarget::Media => self.media_target.get(),
        }
    }

    fn is_fullscreen(&self) -> bool {
        self.active.get().is_some()
    }

    fn request(&self, target: FullscreenTarget) -> std::result::Result<(), FullscreenError> {
        if !self.supports(target) {
            return Err(FullscreenError::Unsupported(target));
        }
        self.active.set(Some(target));
        self.announce(target, true);
        Ok(())
    }

    fn exit(&self) -> std::result::Result<(), FullscreenError> {
        if let Some(target) = self.active.take() {
            self.announce(target, false);
        }
        Ok(())
    }

    fn lock_landscape(&self) -> std::result::Result<(), FullscreenError> {
        match self.active.get() {
            Some(FullscreenTarget::Container) => {
                self.orientation_locked.set(true);
                Ok(())
            }
            _ => Err(FullscreenError::OrientationUnsupported),
        }
    }

    fn unlock_orientation(&self) -> std::result::Result<(), FullscreenError> {
        self.orientation_locked.set(false);
        Ok(())
    }
}

/// The whole simulated host
#[derive(Debug)]
pub struct SimHost {
    pub media: Rc<SimMedia>,
    pub engines: Rc<SimEngineProvider>,
    pub fullscreen: Rc<SimFullscreen>,
    pub document: Rc<SimDocument>,
    pub scheduler: Rc<ManualScheduler>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    pub fn new() -> Self {
        let media = Rc::new(SimMedia::new());
        let document = Rc::new(SimDocument::new());
        Self {
            engines: Rc::new(SimEngineProvider::new(Rc::clone(&media))),
            fullscreen: Rc::new(SimFullscreen::new(Rc::clone(&document), Rc::clone(&media))),
            scheduler: Rc::new(ManualScheduler::new()),
            media,
            document,
        }
    }

    /// Handles for a session
    pub fn host(&self) -> Host {
        Host {
            media: self.media.clone(),
            engines: self.engines.clone(),
            fullscreen: self.fullscreen.clone(),
            document: self.document.clone(),
            scheduler: self.scheduler.clone(),
        }
    }

    /// Deliver every queued event. Returns how many were delivered.
    pub fn pump(&self, session: &mut PlaybackSession) -> usize {
        let mut delivered = 0;
        loop {
            if let Some((id, event)) = self.engines.next_event() {
                session.handle_engine_event(id, event);
            } else if let Some(event) = self.media.next_event() {
                for listener in self.media.listeners_for(event.kind()) {
                    session.handle_media_event(listener, event.clone());
                }
            } else if let Some(event) = self.document.next_event() {
                for listener in self.document.listeners_for(event.kind()) {
                    session.handle_document_event(listener, event.clone());
                }
            } else {
                return delivered;
            }
            delivered += 1;
        }
    }

    /// Run the virtual clock forward, firing timers and delivering the events
    /// they cause. Returns how many timers fired.
    pub fn advance(&self, session: &mut PlaybackSession, by: Duration) -> usize {
        let target = self.scheduler.now() + by;
        let mut fired = 0;
        self.pump(session);
        while let Some(id) = self.scheduler.pop_due(target) {
            session.handle_timer(id);
            fired += 1;
            self.pump(session);
        }
        self.scheduler.settle(target);
        fired
    }

    /// Media and document listeners still registered
    pub fn residual_listeners(&self) -> usize {
        self.media.active_listener_count() + self.document.active_listener_count()
    }
}
