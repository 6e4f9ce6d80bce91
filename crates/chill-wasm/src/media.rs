//! `MediaElement` over an `HTMLVideoElement`

use crate::dispatch::{Dispatcher, HostEvent};
use chill_core::platform::{
    CanPlay, ListenerId, MediaElement, MediaEvent, MediaEventKind, PlayRejection,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::debug;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Event, HtmlVideoElement};

type EventClosure = Closure<dyn FnMut(Event)>;

/// DOM event names backing one listener kind
pub fn dom_events(kind: MediaEventKind) -> &'static [&'static str] {
    match kind {
        MediaEventKind::Play => &["play"],
        MediaEventKind::Pause => &["pause"],
        MediaEventKind::Playing => &["playing"],
        MediaEventKind::Waiting => &["waiting"],
        MediaEventKind::TimeUpdate => &["timeupdate"],
        MediaEventKind::DurationChange => &["durationchange"],
        MediaEventKind::LoadedMetadata => &["loadedmetadata"],
        MediaEventKind::Ended => &["ended"],
        MediaEventKind::Error => &["error"],
        // Produced by the play() promise, not by a DOM event
        MediaEventKind::PlayRejected => &[],
        // iOS only lets the video element itself go fullscreen
        MediaEventKind::FullscreenChange => &["webkitbeginfullscreen", "webkitendfullscreen"],
    }
}

/// Classify a rejected play() promise by its `DOMException` name
pub fn classify_rejection(name: &str, message: &str) -> PlayRejection {
    match name {
        "AbortError" => PlayRejection::Aborted,
        "NotAllowedError" => PlayRejection::NotAllowed(message.to_string()),
        _ => PlayRejection::Other(format!("{name}: {message}")),
    }
}

/// Describe `MediaError.code`
pub fn media_error_text(code: u16, message: &str) -> String {
    let label = match code {
        1 => "MEDIA_ERR_ABORTED",
        2 => "MEDIA_ERR_NETWORK",
        3 => "MEDIA_ERR_DECODE",
        4 => "MEDIA_ERR_SRC_NOT_SUPPORTED",
        _ => "MEDIA_ERR_UNKNOWN",
    };
    if message.is_empty() {
        label.to_string()
    } else {
        format!("{label}: {message}")
    }
}

struct Listener {
    kind: MediaEventKind,
    handlers: Vec<(&'static str, EventClosure)>,
}

/// The page's video element, reporting into a [`Dispatcher`]
pub struct DomMedia {
    video: HtmlVideoElement,
    dispatcher: Weak<Dispatcher>,
    listeners: RefCell<HashMap<ListenerId, Listener>>,
    next_id: Cell<u64>,
}

impl DomMedia {
    pub fn new(video: HtmlVideoElement, dispatcher: Weak<Dispatcher>) -> Self {
        Self {
            video,
            dispatcher,
            listeners: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }

    fn rejection_listeners(&self) -> Vec<ListenerId> {
        self.listeners
            .borrow()
            .iter()
            .filter(|(_, listener)| listener.kind == MediaEventKind::PlayRejected)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Read what a DOM event means from the element's current properties
fn read_event(video: &HtmlVideoElement, kind: MediaEventKind, dom_type: &str) -> MediaEvent {
    match kind {
        MediaEventKind::Play => MediaEvent::Play,
        MediaEventKind::Pause => MediaEvent::Pause,
        MediaEventKind::Playing => MediaEvent::Playing,
        MediaEventKind::Waiting => MediaEvent::Waiting,
        MediaEventKind::TimeUpdate => {
            let ranges = video.buffered();
            let count = ranges.length();
            let buffered_end = if count > 0 {
                ranges.end(count - 1).ok()
            } else {
                None
            };
            MediaEvent::TimeUpdate {
                position: video.current_time(),
                buffered_end,
            }
        }
        MediaEventKind::DurationChange => MediaEvent::DurationChange(video.duration()),
        MediaEventKind::LoadedMetadata => MediaEvent::LoadedMetadata,
        MediaEventKind::Ended => MediaEvent::Ended,
        MediaEventKind::Error => {
            let text = video
                .error()
                .map(|error| media_error_text(error.code(), &error.message()))
                .unwrap_or_else(|| "MEDIA_ERR_UNKNOWN".to_string());
            MediaEvent::Error(text)
        }
        MediaEventKind::PlayRejected => MediaEvent::PlayRejected(PlayRejection::Aborted),
        MediaEventKind::FullscreenChange => {
            MediaEvent::FullscreenChange(dom_type == "webkitbeginfullscreen")
        }
    }
}

impl MediaElement for DomMedia {
    fn set_source(&self, url: Option<&str>) {
        match url {
            Some(url) => self.video.set_src(url),
            None => {
                let _ = self.video.remove_attribute("src");
                self.video.load();
            }
        }
    }

    fn can_play_type(&self, mime: &str) -> CanPlay {
        CanPlay::from_answer(&self.video.can_play_type(mime))
    }

    fn play(&self) {
        let promise = match self.video.play() {
            Ok(promise) => promise,
            Err(err) => {
                debug!(error = ?err, "play() threw synchronously");
                return;
            }
        };
        let listeners = self.rejection_listeners();
        let dispatcher = self.dispatcher.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let Err(err) = JsFuture::from(promise).await else {
                return;
            };
            let rejection = match err.dyn_ref::<web_sys::DomException>() {
                Some(exception) => classify_rejection(&exception.name(), &exception.message()),
                None => PlayRejection::Other(err.as_string().unwrap_or_default()),
            };
            if let Some(dispatcher) = dispatcher.upgrade() {
                for id in listeners {
                    dispatcher.push(HostEvent::Media(
                        id,
                        MediaEvent::PlayRejected(rejection.clone()),
                    ));
                }
            }
        });
    }

    fn pause(&self) {
        let _ = self.video.pause();
    }

    fn is_paused(&self) -> bool {
        self.video.paused()
    }

    fn current_time(&self) -> f64 {
        self.video.current_time()
    }

    fn set_current_time(&self, seconds: f64) {
        self.video.set_current_time(seconds);
    }

    fn set_volume(&self, volume: f64) {
        self.video.set_volume(volume);
    }

    fn set_muted(&self, muted: bool) {
        self.video.set_muted(muted);
    }

    fn set_playback_rate(&self, rate: f64) {
        self.video.set_playback_rate(rate);
    }

    fn add_listener(&self, kind: MediaEventKind) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let mut handlers = Vec::new();
        for &dom_type in dom_events(kind) {
            let video = self.video.clone();
            let dispatcher = self.dispatcher.clone();
            let closure = EventClosure::new(move |_event: Event| {
                if let Some(dispatcher) = dispatcher.upgrade() {
                    dispatcher.push(HostEvent::Media(id, read_event(&video, kind, dom_type)));
                }
            });
            if self
                .video
                .add_event_listener_with_callback(dom_type, closure.as_ref().unchecked_ref())
                .is_ok()
            {
                handlers.push((dom_type, closure));
            }
        }

        self.listeners
            .borrow_mut()
            .insert(id, Listener { kind, handlers });
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        let Some(listener) = self.listeners.borrow_mut().remove(&id) else {
            return;
        };
        for (dom_type, closure) in listener.handlers {
            let _ = self
                .video
                .remove_event_listener_with_callback(dom_type, closure.as_ref().unchecked_ref());
        }
    }
}

impl Drop for DomMedia {
    fn drop(&mut self) {
        let ids: Vec<ListenerId> = self.listeners.borrow().keys().copied().collect();
        for id in ids {
            self.remove_listener(id);
        }
    }
}

/// Shared handle as stored in the host bundle
pub fn shared(video: HtmlVideoElement, dispatcher: &Rc<Dispatcher>) -> Rc<DomMedia> {
    Rc::new(DomMedia::new(video, Rc::downgrade(dispatcher)))
}
