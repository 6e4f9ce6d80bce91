//! Event routing between browser callbacks and the playback session
//!
//! Browser callbacks can fire while the session is already handling a call,
//! e.g. a `pause` event raised synchronously by `video.pause()` or a JS
//! `onEnded` handler that immediately loads the next episode. Every event and
//! deferred command goes through one FIFO queue; whoever holds the session
//! drains it, and nested pushes simply wait for the outer drain.

use chill_core::platform::{DocumentEvent, EngineEvent, EngineId, ListenerId, MediaEvent, TimerId};
use chill_core::{PlaybackSession, PlaybackState};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Deferred session call
pub type Command = Box<dyn FnOnce(&mut PlaybackSession)>;

/// Something the session has to process
pub enum HostEvent {
    Media(ListenerId, MediaEvent),
    Engine(EngineId, EngineEvent),
    Document(ListenerId, DocumentEvent),
    Timer(TimerId),
    Command(Command),
}

impl HostEvent {
    fn label(&self) -> &'static str {
        match self {
            HostEvent::Media(..) => "media",
            HostEvent::Engine(..) => "engine",
            HostEvent::Document(..) => "document",
            HostEvent::Timer(_) => "timer",
            HostEvent::Command(_) => "command",
        }
    }
}

/// Owns the session and serializes everything that touches it.
///
/// Events pushed before [`Dispatcher::install`] wait for the session; events
/// pushed after [`Dispatcher::shutdown`] are dropped.
#[derive(Default)]
pub struct Dispatcher {
    session: RefCell<Option<PlaybackSession>>,
    closed: Cell<bool>,
    queue: RefCell<VecDeque<HostEvent>>,
    updates: RefCell<Option<watch::Receiver<PlaybackState>>>,
    on_state: RefCell<Option<Box<dyn FnMut(&PlaybackState)>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand the session over. Events queued before this point are processed now.
    pub fn install(&self, session: PlaybackSession) {
        *self.updates.borrow_mut() = Some(session.subscribe());
        *self.session.borrow_mut() = Some(session);
        self.drain();
    }

    /// Observer called with the latest state after each drain that changed it
    pub fn set_state_observer(&self, observer: impl FnMut(&PlaybackState) + 'static) {
        *self.on_state.borrow_mut() = Some(Box::new(observer));
    }

    pub fn is_installed(&self) -> bool {
        self.session
            .try_borrow()
            .map(|session| session.is_some())
            .unwrap_or(true)
    }

    pub fn push(&self, event: HostEvent) {
        self.queue.borrow_mut().push_back(event);
        self.drain();
    }

    /// Run `command` against the session as soon as it is free
    pub fn defer(&self, command: impl FnOnce(&mut PlaybackSession) + 'static) {
        self.push(HostEvent::Command(Box::new(command)));
    }

    /// Run `f` against the session right now, or `None` while it is busy or gone
    pub fn with_session<R>(&self, f: impl FnOnce(&mut PlaybackSession) -> R) -> Option<R> {
        let result = {
            let mut slot = self.session.try_borrow_mut().ok()?;
            slot.as_mut().map(f)
        };
        self.drain();
        result
    }

    /// Latest published state
    pub fn snapshot(&self) -> Option<PlaybackState> {
        self.updates
            .borrow()
            .as_ref()
            .map(|updates| updates.borrow().clone())
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Dispose the session and drop anything still queued
    pub fn shutdown(&self) {
        let session = match self.session.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                warn!("Shutdown requested while the session is busy, deferring");
                self.queue
                    .borrow_mut()
                    .push_back(HostEvent::Command(Box::new(|session| session.dispose())));
                return;
            }
        };
        self.closed.set(true);
        if let Some(mut session) = session {
            session.dispose();
        }
        debug!(dropped = self.pending(), "Dispatcher shut down");
        self.queue.borrow_mut().clear();
        self.notify();
        self.updates.borrow_mut().take();
    }

    fn drain(&self) {
        loop {
            let Ok(mut slot) = self.session.try_borrow_mut() else {
                return;
            };
            if slot.is_none() && !self.closed.get() {
                return;
            }
            let Some(event) = self.queue.borrow_mut().pop_front() else {
                break;
            };
            match slot.as_mut() {
                Some(session) => deliver(session, event),
                None => debug!(kind = event.label(), "Session shut down, dropping event"),
            }
        }
        self.notify();
    }

    fn notify(&self) {
        let state = {
            let mut updates = self.updates.borrow_mut();
            match updates.as_mut() {
                Some(rx) if rx.has_changed().unwrap_or(false) => rx.borrow_and_update().clone(),
                _ => return,
            }
        };
        let Ok(mut observer) = self.on_state.try_borrow_mut() else {
            return;
        };
        if let Some(observer) = observer.as_mut() {
            observer(&state);
        }
    }
}

fn deliver(session: &mut PlaybackSession, event: HostEvent) {
    match event {
        HostEvent::Media(id, event) => session.handle_media_event(id, event),
        HostEvent::Engine(id, event) => session.handle_engine_event(id, event),
        HostEvent::Document(id, event) => session.handle_document_event(id, event),
        HostEvent::Timer(id) => session.handle_timer(id),
        HostEvent::Command(command) => command(session),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chill_core::platform::MediaEventKind;
    use chill_core::sim::SimHost;
    use chill_core::{PlaybackSource, PlaybackStatus, PlayerConfig, SessionCallbacks};
    use std::rc::Rc;

    fn session(sim: &SimHost) -> PlaybackSession {
        PlaybackSession::new(
            sim.host(),
            PlaybackSource::new("https://cdn.example.com/phim/index.m3u8"),
            PlayerConfig::default(),
            SessionCallbacks::new(),
        )
    }

    /// Forward everything the simulated host queued through the dispatcher
    fn forward(sim: &SimHost, dispatcher: &Dispatcher) {
        loop {
            if let Some((id, event)) = sim.engines.next_event() {
                dispatcher.push(HostEvent::Engine(id, event));
            } else if let Some(event) = sim.media.next_event() {
                for id in sim.media.listeners_for(event.kind()) {
                    dispatcher.push(HostEvent::Media(id, event.clone()));
                }
            } else {
                break;
            }
        }
    }

    #[test]
    fn test_events_reach_session() {
        let sim = SimHost::new();
        let dispatcher = Dispatcher::new();
        dispatcher.install(session(&sim));
        forward(&sim, &dispatcher);

        let state = dispatcher.snapshot().unwrap();
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(state.levels.len(), 4);
    }

    #[test]
    fn test_nested_commands_run_after_outer() {
        let dispatcher = Rc::new(Dispatcher::new());
        let sim = SimHost::new();
        dispatcher.install(session(&sim));
        forward(&sim, &dispatcher);

        let order = Rc::new(RefCell::new(Vec::new()));
        let inner = Rc::clone(&dispatcher);
        let log = Rc::clone(&order);
        dispatcher.defer(move |session| {
            log.borrow_mut().push("outer");
            let log = Rc::clone(&log);
            inner.defer(move |_| log.borrow_mut().push("inner"));
            assert_eq!(inner.pending(), 1);
            session.pause();
        });

        assert_eq!(*order.borrow(), vec!["outer", "inner"]);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_with_session_refuses_reentry() {
        let dispatcher = Rc::new(Dispatcher::new());
        let sim = SimHost::new();
        dispatcher.install(session(&sim));

        let inner = Rc::clone(&dispatcher);
        let nested = dispatcher.with_session(move |_| inner.with_session(|_| ()));
        assert_eq!(nested, Some(None));
    }

    #[test]
    fn test_observer_sees_changes_only() {
        let sim = SimHost::new();
        let dispatcher = Dispatcher::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        dispatcher.set_state_observer(move |state| sink.borrow_mut().push(state.status));
        dispatcher.install(session(&sim));
        forward(&sim, &dispatcher);

        let count = seen.borrow().len();
        assert!(count > 0);
        assert_eq!(seen.borrow().last(), Some(&PlaybackStatus::Playing));

        // No state change, no notification
        dispatcher.with_session(|_| ());
        assert_eq!(seen.borrow().len(), count);
    }

    #[test]
    fn test_events_wait_for_install() {
        let sim = SimHost::new();
        let dispatcher = Dispatcher::new();
        dispatcher.push(HostEvent::Timer(TimerId(999)));
        assert_eq!(dispatcher.pending(), 1);
        assert!(dispatcher.snapshot().is_none());

        dispatcher.install(session(&sim));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_events_after_shutdown_are_dropped() {
        let sim = SimHost::new();
        let dispatcher = Dispatcher::new();
        dispatcher.install(session(&sim));
        dispatcher.shutdown();

        dispatcher.push(HostEvent::Timer(TimerId(1)));
        dispatcher.defer(|session| session.play());
        assert_eq!(dispatcher.pending(), 0);
        assert!(dispatcher.snapshot().is_none());
    }

    #[test]
    fn test_shutdown_releases_host_resources() {
        let sim = SimHost::new();
        let dispatcher = Dispatcher::new();
        dispatcher.install(session(&sim));
        forward(&sim, &dispatcher);
        assert!(!sim.media.listeners_for(MediaEventKind::TimeUpdate).is_empty());

        dispatcher.shutdown();
        assert!(!dispatcher.is_installed());
        assert_eq!(sim.residual_listeners(), 0);
        assert_eq!(sim.engines.log().live_count(), 0);
    }
}
