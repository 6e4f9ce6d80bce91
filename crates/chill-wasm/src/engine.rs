//! hls.js binding
//!
//! The page is expected to load hls.js as the global `Hls`. When it is
//! missing or reports no MediaSource support, the provider says so and the
//! session falls back to native playback.

use crate::dispatch::{Dispatcher, HostEvent};
use chill_core::platform::{EngineErrorKind, EngineEvent, EngineId, EngineProvider, StreamingEngine};
use chill_core::{EngineConfig, StreamLevel};
use serde::Serialize;
use std::cell::Cell;
use std::rc::Weak;
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use web_sys::HtmlMediaElement;

pub const MANIFEST_PARSED: &str = "hlsManifestParsed";
pub const LEVEL_SWITCHED: &str = "hlsLevelSwitched";
pub const ERROR: &str = "hlsError";

#[wasm_bindgen]
extern "C" {
    type Hls;

    #[wasm_bindgen(constructor, catch)]
    fn new(config: &JsValue) -> Result<Hls, JsValue>;

    #[wasm_bindgen(static_method_of = Hls, js_name = isSupported, catch)]
    fn is_supported() -> Result<bool, JsValue>;

    #[wasm_bindgen(method, js_name = loadSource)]
    fn load_source(this: &Hls, url: &str);

    #[wasm_bindgen(method, js_name = attachMedia)]
    fn attach_media(this: &Hls, media: &HtmlMediaElement);

    #[wasm_bindgen(method, js_name = startLoad)]
    fn start_load(this: &Hls, position: f64);

    #[wasm_bindgen(method, js_name = recoverMediaError)]
    fn recover_media_error(this: &Hls);

    #[wasm_bindgen(method, setter = currentLevel)]
    fn set_current_level(this: &Hls, level: i32);

    #[wasm_bindgen(method)]
    fn on(this: &Hls, event: &str, listener: &js_sys::Function);

    #[wasm_bindgen(method)]
    fn off(this: &Hls, event: &str, listener: &js_sys::Function);

    #[wasm_bindgen(method)]
    fn destroy(this: &Hls);
}

type EngineClosure = Closure<dyn FnMut(JsValue, JsValue)>;

/// Map an hls.js `ErrorTypes` value
pub fn error_kind(error_type: &str) -> EngineErrorKind {
    match error_type {
        "networkError" => EngineErrorKind::Network,
        "mediaError" => EngineErrorKind::Media,
        _ => EngineErrorKind::Other,
    }
}

/// Build a level from the numbers hls.js reports. Missing heights become 0.
pub fn level_from(index: usize, height: Option<f64>, bitrate: Option<f64>) -> StreamLevel {
    let height = height
        .filter(|h| h.is_finite() && *h > 0.0)
        .map(|h| h.round() as u32)
        .unwrap_or(0);
    StreamLevel {
        index,
        height,
        bitrate: bitrate.filter(|b| b.is_finite() && *b > 0.0).map(|b| b as u64),
    }
}

fn field(object: &JsValue, key: &str) -> Option<JsValue> {
    js_sys::Reflect::get(object, &JsValue::from_str(key))
        .ok()
        .filter(|value| !value.is_undefined() && !value.is_null())
}

fn number_field(object: &JsValue, key: &str) -> Option<f64> {
    field(object, key).and_then(|value| value.as_f64())
}

fn string_field(object: &JsValue, key: &str) -> String {
    field(object, key)
        .and_then(|value| value.as_string())
        .unwrap_or_default()
}

/// Translate one hls.js event payload
fn read_event(name: &str, data: &JsValue) -> Option<EngineEvent> {
    match name {
        MANIFEST_PARSED => {
            let levels = field(data, "levels")
                .map(|levels| js_sys::Array::from(&levels))
                .map(|levels| {
                    levels
                        .iter()
                        .enumerate()
                        .map(|(index, level)| {
                            level_from(
                                index,
                                number_field(&level, "height"),
                                number_field(&level, "bitrate"),
                            )
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(EngineEvent::ManifestParsed { levels })
        }
        LEVEL_SWITCHED => {
            let level = number_field(data, "level")?;
            Some(EngineEvent::LevelSwitched {
                level: level.max(0.0) as usize,
            })
        }
        ERROR => Some(EngineEvent::Error {
            fatal: field(data, "fatal")
                .and_then(|value| value.as_bool())
                .unwrap_or(false),
            kind: error_kind(&string_field(data, "type")),
            details: string_field(data, "details"),
        }),
        _ => None,
    }
}

/// One hls.js instance bound to the page's video element
pub struct HlsEngine {
    id: EngineId,
    hls: Hls,
    media: HtmlMediaElement,
    handlers: Vec<(&'static str, EngineClosure)>,
    destroyed: bool,
}

impl StreamingEngine for HlsEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn load_source(&mut self, url: &str) {
        self.hls.load_source(url);
    }

    fn attach_media(&mut self) {
        self.hls.attach_media(&self.media);
    }

    fn start_load(&mut self, position: Option<f64>) {
        // hls.js treats -1 as "resume from the last position"
        self.hls.start_load(position.unwrap_or(-1.0));
    }

    fn recover_media_error(&mut self) {
        self.hls.recover_media_error();
    }

    fn set_current_level(&mut self, level: i32) {
        self.hls.set_current_level(level);
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        for (name, closure) in self.handlers.drain(..) {
            self.hls.off(name, closure.as_ref().unchecked_ref());
        }
        self.hls.destroy();
        debug!(engine = self.id.0, "hls.js instance destroyed");
    }
}

impl Drop for HlsEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Engine that could not be constructed; it reports a fatal error once attached
struct FailedEngine {
    id: EngineId,
    dispatcher: Weak<Dispatcher>,
    reason: String,
}

impl StreamingEngine for FailedEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn load_source(&mut self, _url: &str) {}

    fn attach_media(&mut self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.push(HostEvent::Engine(
                self.id,
                EngineEvent::Error {
                    fatal: true,
                    kind: EngineErrorKind::Other,
                    details: self.reason.clone(),
                },
            ));
        }
    }

    fn start_load(&mut self, _position: Option<f64>) {}

    fn recover_media_error(&mut self) {}

    fn set_current_level(&mut self, _level: i32) {}

    fn destroy(&mut self) {}
}

/// Creates hls.js instances reporting into a [`Dispatcher`]
pub struct HlsProvider {
    media: HtmlMediaElement,
    dispatcher: Weak<Dispatcher>,
    next_id: Cell<u64>,
}

impl HlsProvider {
    pub fn new(media: HtmlMediaElement, dispatcher: Weak<Dispatcher>) -> Self {
        Self {
            media,
            dispatcher,
            next_id: Cell::new(1),
        }
    }
}

impl EngineProvider for HlsProvider {
    fn is_supported(&self) -> bool {
        let global = js_sys::global();
        if !js_sys::Reflect::has(&global, &JsValue::from_str("Hls")).unwrap_or(false) {
            return false;
        }
        Hls::is_supported().unwrap_or(false)
    }

    fn create(&self, config: &EngineConfig) -> Box<dyn StreamingEngine> {
        let id = EngineId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        let options = config.serialize(&serializer).unwrap_or(JsValue::UNDEFINED);
        let hls = match Hls::new(&options) {
            Ok(hls) => hls,
            Err(err) => {
                warn!(error = ?err, "Failed to construct hls.js");
                return Box::new(FailedEngine {
                    id,
                    dispatcher: self.dispatcher.clone(),
                    reason: "hls.js construction failed".to_string(),
                });
            }
        };

        let mut handlers = Vec::new();
        for name in [MANIFEST_PARSED, LEVEL_SWITCHED, ERROR] {
            let dispatcher = self.dispatcher.clone();
            let closure = EngineClosure::new(move |_event: JsValue, data: JsValue| {
                let Some(event) = read_event(name, &data) else {
                    return;
                };
                if let Some(dispatcher) = dispatcher.upgrade() {
                    dispatcher.push(HostEvent::Engine(id, event));
                }
            });
            hls.on(name, closure.as_ref().unchecked_ref());
            handlers.push((name, closure));
        }

        debug!(engine = id.0, "hls.js instance created");
        Box::new(HlsEngine {
            id,
            hls,
            media: self.media.clone(),
            handlers,
            destroyed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(error_kind("networkError"), EngineErrorKind::Network);
        assert_eq!(error_kind("mediaError"), EngineErrorKind::Media);
        assert_eq!(error_kind("muxError"), EngineErrorKind::Other);
        assert_eq!(error_kind(""), EngineErrorKind::Other);
    }

    #[test]
    fn test_level_from_reported_numbers() {
        let level = level_from(2, Some(720.0), Some(2_800_000.0));
        assert_eq!(level.index, 2);
        assert_eq!(level.height, 720);
        assert_eq!(level.bitrate, Some(2_800_000));
    }

    #[test]
    fn test_level_without_resolution() {
        let level = level_from(0, None, Some(f64::NAN));
        assert_eq!(level.height, 0);
        assert_eq!(level.bitrate, None);
    }
}
