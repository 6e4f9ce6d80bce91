//! Chill WASM - Browser host for the Chill player
//!
//! Binds a [`chill_core::PlaybackSession`] to the page:
//! - `<video>` element events and the play() promise
//! - hls.js as the adaptive streaming engine
//! - vendor fullscreen APIs and screen orientation lock
//! - `setTimeout` timers and document keyboard shortcuts
//!
//! ## Usage
//!
//! ```javascript
//! import init, { ChillPlayer } from '@chill/wasm';
//!
//! await init();
//! const player = new ChillPlayer(video, container, {
//!   source: { url: 'https://cdn.example.com/phim/index.m3u8', autoplay: true },
//!   onStateChange: (state) => render(state),
//!   onFallback: (request) => showEmbed(request.url),
//!   onEnded: () => player.load({ url: nextEpisodeUrl, autoplay: true }),
//! });
//! ```

use wasm_bindgen::prelude::*;

mod dispatch;
mod document;
mod engine;
mod fullscreen;
mod logging;
mod media;
mod scheduler;

use chill_core::fullscreen::select_controller;
use chill_core::gesture::TapZone;
use chill_core::{
    FallbackRequest, Host, LevelSelection, PlaybackError, PlaybackSession, PlaybackSource,
    PlaybackState, PlayerConfig, SessionCallbacks,
};
use dispatch::Dispatcher;
use js_sys::{Function, Reflect};
use serde::Serialize;
use std::rc::Rc;
use std::time::Duration;
use web_sys::{HtmlElement, HtmlVideoElement};

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    logging::init(tracing::Level::INFO);
    web_sys::console::log_1(&"[Chill WASM] Initialized".into());
}

/// Library version
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn to_js<T: Serialize>(value: &T) -> JsValue {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    value.serialize(&serializer).unwrap_or(JsValue::NULL)
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

fn option(options: &JsValue, key: &str) -> Option<JsValue> {
    Reflect::get(options, &JsValue::from_str(key))
        .ok()
        .filter(|value| !value.is_undefined() && !value.is_null())
}

fn callback(options: &JsValue, key: &str) -> Option<Function> {
    option(options, key).and_then(|value| value.dyn_into::<Function>().ok())
}

fn read_source(value: JsValue) -> Result<PlaybackSource, JsValue> {
    if let Some(url) = value.as_string() {
        return Ok(PlaybackSource::new(url));
    }
    serde_wasm_bindgen::from_value(value).map_err(js_error)
}

fn read_config(options: &JsValue) -> Result<PlayerConfig, JsValue> {
    let Some(value) = option(options, "config") else {
        return Ok(PlayerConfig::default());
    };
    let config: PlayerConfig = serde_wasm_bindgen::from_value(value).map_err(js_error)?;
    config.session.validate().map_err(js_error)?;
    Ok(config)
}

/// Wire JS callbacks into session callbacks
fn read_callbacks(options: &JsValue) -> SessionCallbacks {
    let mut callbacks = SessionCallbacks::new();
    if let Some(f) = callback(options, "onFallback") {
        callbacks = callbacks.on_fallback(move |request: &FallbackRequest| {
            let _ = f.call1(&JsValue::NULL, &to_js(request));
        });
    }
    if let Some(f) = callback(options, "onEnded") {
        callbacks = callbacks.on_ended(move || {
            let _ = f.call0(&JsValue::NULL);
        });
    }
    if let Some(f) = callback(options, "onError") {
        callbacks = callbacks.on_error(move |error: &PlaybackError| {
            let _ = f.call1(&JsValue::NULL, &to_js(error));
        });
    }
    callbacks
}

/// Player handle exported to the page
#[wasm_bindgen]
pub struct ChillPlayer {
    dispatcher: Rc<Dispatcher>,
    container: HtmlElement,
}

#[wasm_bindgen]
impl ChillPlayer {
    /// Create a player on `video`, with `container` as the fullscreen and
    /// gesture surface.
    ///
    /// `options`: `{ source, config?, onStateChange?, onFallback?, onEnded?, onError? }`
    /// where `source` is a URL string or `{ url, autoplay, poster }`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        video: HtmlVideoElement,
        container: HtmlElement,
        options: JsValue,
    ) -> Result<ChillPlayer, JsValue> {
        let window = web_sys::window().ok_or_else(|| js_error("no window"))?;
        let document = window.document().ok_or_else(|| js_error("no document"))?;

        let source = read_source(option(&options, "source").unwrap_or(JsValue::NULL))?;
        let config = read_config(&options)?;
        let callbacks = read_callbacks(&options);

        let dispatcher = Rc::new(Dispatcher::new());
        if let Some(f) = callback(&options, "onStateChange") {
            dispatcher.set_state_observer(move |state: &PlaybackState| {
                let _ = f.call1(&JsValue::NULL, &to_js(state));
            });
        }

        let weak = Rc::downgrade(&dispatcher);
        let host = Host {
            media: media::shared(video.clone(), &dispatcher),
            engines: Rc::new(engine::HlsProvider::new(
                video.clone().into(),
                weak.clone(),
            )),
            fullscreen: select_controller(fullscreen::candidates(&document, &container, &video)),
            document: Rc::new(document::DomDocument::new(document, weak.clone())),
            scheduler: scheduler::WindowScheduler::new(window, weak),
        };

        dispatcher.install(PlaybackSession::new(host, source, config, callbacks));
        Ok(ChillPlayer {
            dispatcher,
            container,
        })
    }

    /// Current state as a plain object
    pub fn state(&self) -> JsValue {
        self.dispatcher
            .snapshot()
            .map(|state| to_js(&state))
            .unwrap_or(JsValue::NULL)
    }

    /// Replace the source; `source` is a URL string or `{ url, autoplay, poster }`
    pub fn load(&self, source: JsValue) -> Result<(), JsValue> {
        let source = read_source(source)?;
        self.dispatcher.defer(move |session| session.load(source));
        Ok(())
    }

    pub fn retry(&self) {
        self.dispatcher.defer(|session| session.retry());
    }

    #[wasm_bindgen(js_name = switchToFallback)]
    pub fn switch_to_fallback(&self) -> Result<(), JsValue> {
        match self.dispatcher.with_session(|session| session.switch_to_fallback()) {
            Some(result) => result.map_err(js_error),
            None => Err(js_error("player is busy or disposed")),
        }
    }

    pub fn play(&self) {
        self.dispatcher.defer(|session| session.play());
    }

    pub fn pause(&self) {
        self.dispatcher.defer(|session| session.pause());
    }

    #[wasm_bindgen(js_name = togglePlay)]
    pub fn toggle_play(&self) {
        self.dispatcher.defer(|session| session.toggle_play());
    }

    pub fn seek(&self, position: f64) {
        self.dispatcher.defer(move |session| session.seek(position));
    }

    pub fn skip(&self, delta: f64) {
        self.dispatcher.defer(move |session| session.skip(delta));
    }

    #[wasm_bindgen(js_name = setVolume)]
    pub fn set_volume(&self, volume: f64) {
        self.dispatcher.defer(move |session| session.set_volume(volume));
    }

    #[wasm_bindgen(js_name = toggleMute)]
    pub fn toggle_mute(&self) {
        self.dispatcher.defer(|session| session.toggle_mute());
    }

    #[wasm_bindgen(js_name = setPlaybackRate)]
    pub fn set_playback_rate(&self, rate: f64) -> Result<(), JsValue> {
        match self.dispatcher.with_session(|session| session.set_playback_rate(rate)) {
            Some(result) => result.map_err(js_error),
            None => Err(js_error("player is busy or disposed")),
        }
    }

    /// `-1` for automatic selection, otherwise an engine level index
    #[wasm_bindgen(js_name = setQualityLevel)]
    pub fn set_quality_level(&self, level: i32) -> Result<(), JsValue> {
        let selection = LevelSelection::from(level);
        match self
            .dispatcher
            .with_session(|session| session.set_quality_level(selection))
        {
            Some(result) => result.map_err(js_error),
            None => Err(js_error("player is busy or disposed")),
        }
    }

    #[wasm_bindgen(js_name = toggleFullscreen)]
    pub fn toggle_fullscreen(&self) {
        self.dispatcher.defer(|session| session.toggle_fullscreen());
    }

    /// Tap or click on the container at `offset_x` pixels from its left edge
    pub fn tap(&self, offset_x: f64) {
        let width = f64::from(self.container.client_width());
        let zone = TapZone::from_offset(offset_x, width);
        let at = now();
        self.dispatcher.defer(move |session| session.handle_tap(zone, at));
    }

    #[wasm_bindgen(js_name = pointerActivity)]
    pub fn pointer_activity(&self) {
        self.dispatcher.defer(|session| session.pointer_activity());
    }

    #[wasm_bindgen(js_name = pointerLeft)]
    pub fn pointer_left(&self) {
        self.dispatcher.defer(|session| session.pointer_left());
    }

    #[wasm_bindgen(getter, js_name = isDisposed)]
    pub fn is_disposed(&self) -> bool {
        !self.dispatcher.is_installed()
    }

    /// Release the engine, listeners and timers. The handle is inert afterwards.
    pub fn dispose(&self) {
        self.dispatcher.shutdown();
    }
}

impl Drop for ChillPlayer {
    fn drop(&mut self) {
        self.dispatcher.shutdown();
    }
}

/// Monotonic page clock
fn now() -> Duration {
    let millis = web_sys::window()
        .and_then(|window| window.performance())
        .map(|performance| performance.now())
        .unwrap_or(0.0);
    Duration::from_secs_f64(millis.max(0.0) / 1000.0)
}
