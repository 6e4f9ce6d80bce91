//! Vendor fullscreen API families
//!
//! Each family is probed by property presence through `Reflect`, since the
//! prefixed names are not part of web-sys.

use chill_core::fullscreen::{FullscreenController, FullscreenError, FullscreenTarget};
use js_sys::{Function, Promise, Reflect};
use std::rc::Rc;
use tracing::debug;
use wasm_bindgen::prelude::*;
use web_sys::{Document, HtmlElement, HtmlVideoElement};

/// Method and property names of one element fullscreen family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiNames {
    pub family: &'static str,
    pub request: &'static str,
    pub exit: &'static str,
    pub element: &'static str,
    pub change_event: &'static str,
}

pub const STANDARD: ApiNames = ApiNames {
    family: "standard",
    request: "requestFullscreen",
    exit: "exitFullscreen",
    element: "fullscreenElement",
    change_event: "fullscreenchange",
};

pub const WEBKIT: ApiNames = ApiNames {
    family: "webkit",
    request: "webkitRequestFullscreen",
    exit: "webkitExitFullscreen",
    element: "webkitFullscreenElement",
    change_event: "webkitfullscreenchange",
};

pub const MOZ: ApiNames = ApiNames {
    family: "moz",
    request: "mozRequestFullScreen",
    exit: "mozCancelFullScreen",
    element: "mozFullScreenElement",
    change_event: "mozfullscreenchange",
};

pub const MS: ApiNames = ApiNames {
    family: "ms",
    request: "msRequestFullscreen",
    exit: "msExitFullscreen",
    element: "msFullscreenElement",
    change_event: "MSFullscreenChange",
};

/// Element families in preference order
pub const ELEMENT_FAMILIES: [ApiNames; 4] = [STANDARD, WEBKIT, MOZ, MS];

fn has_function(target: &JsValue, name: &str) -> bool {
    Reflect::get(target, &JsValue::from_str(name))
        .map(|value| value.is_function())
        .unwrap_or(false)
}

/// Call `target[name]()`, surfacing a returned promise's rejection in the logs
fn call_method(target: &JsValue, name: &str) -> Result<(), FullscreenError> {
    let method = Reflect::get(target, &JsValue::from_str(name))
        .ok()
        .and_then(|value| value.dyn_into::<Function>().ok())
        .ok_or_else(|| FullscreenError::Rejected(format!("{name} is not available")))?;
    let result = method
        .call0(target)
        .map_err(|err| FullscreenError::Rejected(format!("{name}: {err:?}")))?;
    if let Ok(promise) = result.dyn_into::<Promise>() {
        let name = name.to_string();
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(err) = wasm_bindgen_futures::JsFuture::from(promise).await {
                debug!(method = %name, error = ?err, "Fullscreen promise rejected");
            }
        });
    }
    Ok(())
}

/// `screen.orientation`, when the browser has it
fn screen_orientation() -> Option<JsValue> {
    let screen = web_sys::window()?.screen().ok()?;
    Reflect::get(&screen, &JsValue::from_str("orientation"))
        .ok()
        .filter(|value| value.is_object())
}

fn lock_landscape() -> Result<(), FullscreenError> {
    let orientation = screen_orientation().ok_or(FullscreenError::OrientationUnsupported)?;
    let lock = Reflect::get(&orientation, &JsValue::from_str("lock"))
        .ok()
        .and_then(|value| value.dyn_into::<Function>().ok())
        .ok_or(FullscreenError::OrientationUnsupported)?;
    let result = lock
        .call1(&orientation, &JsValue::from_str("landscape"))
        .map_err(|err| FullscreenError::Rejected(format!("{err:?}")))?;
    if let Ok(promise) = result.dyn_into::<Promise>() {
        // Desktop browsers always reject the lock
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(err) = wasm_bindgen_futures::JsFuture::from(promise).await {
                debug!(error = ?err, "Orientation lock rejected");
            }
        });
    }
    Ok(())
}

fn unlock_orientation() -> Result<(), FullscreenError> {
    let orientation = screen_orientation().ok_or(FullscreenError::OrientationUnsupported)?;
    if !has_function(&orientation, "unlock") {
        return Err(FullscreenError::OrientationUnsupported);
    }
    call_method(&orientation, "unlock")
}

/// Container fullscreen through one element API family
pub struct ElementFullscreen {
    names: ApiNames,
    document: Document,
    container: HtmlElement,
}

impl ElementFullscreen {
    pub fn new(names: ApiNames, document: Document, container: HtmlElement) -> Self {
        Self {
            names,
            document,
            container,
        }
    }
}

impl FullscreenController for ElementFullscreen {
    fn name(&self) -> &'static str {
        self.names.family
    }

    fn is_available(&self) -> bool {
        has_function(&self.container, self.names.request)
    }

    fn supports(&self, target: FullscreenTarget) -> bool {
        target == FullscreenTarget::Container && self.is_available()
    }

    fn is_fullscreen(&self) -> bool {
        Reflect::get(&self.document, &JsValue::from_str(self.names.element))
            .map(|element| !element.is_null() && !element.is_undefined())
            .unwrap_or(false)
    }

    fn request(&self, target: FullscreenTarget) -> Result<(), FullscreenError> {
        if !self.supports(target) {
            return Err(FullscreenError::Unsupported(target));
        }
        call_method(&self.container, self.names.request)
    }

    fn exit(&self) -> Result<(), FullscreenError> {
        if !self.is_fullscreen() {
            return Ok(());
        }
        call_method(&self.document, self.names.exit)
    }

    fn lock_landscape(&self) -> Result<(), FullscreenError> {
        lock_landscape()
    }

    fn unlock_orientation(&self) -> Result<(), FullscreenError> {
        unlock_orientation()
    }
}

/// iOS Safari: only the video element itself can go fullscreen
pub struct VideoFullscreen {
    video: HtmlVideoElement,
}

impl VideoFullscreen {
    pub fn new(video: HtmlVideoElement) -> Self {
        Self { video }
    }
}

impl FullscreenController for VideoFullscreen {
    fn name(&self) -> &'static str {
        "ios-video"
    }

    fn is_available(&self) -> bool {
        has_function(&self.video, "webkitEnterFullscreen")
    }

    fn supports(&self, target: FullscreenTarget) -> bool {
        target == FullscreenTarget::Media && self.is_available()
    }

    fn is_fullscreen(&self) -> bool {
        Reflect::get(&self.video, &JsValue::from_str("webkitDisplayingFullscreen"))
            .ok()
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    fn request(&self, target: FullscreenTarget) -> Result<(), FullscreenError> {
        if !self.supports(target) {
            return Err(FullscreenError::Unsupported(target));
        }
        call_method(&self.video, "webkitEnterFullscreen")
    }

    fn exit(&self) -> Result<(), FullscreenError> {
        if !self.is_fullscreen() {
            return Ok(());
        }
        call_method(&self.video, "webkitExitFullscreen")
    }
}

/// Every family the page could use, in preference order
pub fn candidates(
    document: &Document,
    container: &HtmlElement,
    video: &HtmlVideoElement,
) -> Vec<Rc<dyn FullscreenController>> {
    let mut families: Vec<Rc<dyn FullscreenController>> = ELEMENT_FAMILIES
        .iter()
        .map(|names| {
            Rc::new(ElementFullscreen::new(*names, document.clone(), container.clone()))
                as Rc<dyn FullscreenController>
        })
        .collect();
    families.push(Rc::new(VideoFullscreen::new(video.clone())));
    families
}
