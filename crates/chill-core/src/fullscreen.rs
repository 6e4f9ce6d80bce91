//! Fullscreen capability
//!
//! Browsers expose fullscreen through several vendor-specific API families,
//! and some mobile browsers only allow the media element itself to go
//! fullscreen. Each family is one [`FullscreenController`] implementation;
//! hosts probe them with [`select_controller`] once and the session only
//! ever talks to the trait.

use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

/// What to put in fullscreen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenTarget {
    /// The player container, controls included
    Container,
    /// The media element alone
    Media,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FullscreenError {
    #[error("Fullscreen not supported for {0:?}")]
    Unsupported(FullscreenTarget),

    #[error("Orientation lock not supported")]
    OrientationUnsupported,

    #[error("Fullscreen request rejected: {0}")]
    Rejected(String),
}

/// One fullscreen API family
pub trait FullscreenController {
    /// Family name for logs
    fn name(&self) -> &'static str;

    /// Capability probe: can this family work on the current host at all
    fn is_available(&self) -> bool;

    fn supports(&self, target: FullscreenTarget) -> bool;

    fn is_fullscreen(&self) -> bool;

    fn request(&self, target: FullscreenTarget) -> Result<(), FullscreenError>;

    fn exit(&self) -> Result<(), FullscreenError>;

    fn lock_landscape(&self) -> Result<(), FullscreenError> {
        Err(FullscreenError::OrientationUnsupported)
    }

    fn unlock_orientation(&self) -> Result<(), FullscreenError> {
        Err(FullscreenError::OrientationUnsupported)
    }
}

/// Host without any fullscreen support
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFullscreen;

impl FullscreenController for NoFullscreen {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn supports(&self, _target: FullscreenTarget) -> bool {
        false
    }

    fn is_fullscreen(&self) -> bool {
        false
    }

    fn request(&self, target: FullscreenTarget) -> Result<(), FullscreenError> {
        Err(FullscreenError::Unsupported(target))
    }

    fn exit(&self) -> Result<(), FullscreenError> {
        Ok(())
    }
}

/// Pick the first available family, in preference order
pub fn select_controller(
    candidates: Vec<Rc<dyn FullscreenController>>,
) -> Rc<dyn FullscreenController> {
    for candidate in candidates {
        if candidate.is_available() {
            debug!(family = candidate.name(), "Fullscreen family selected");
            return candidate;
        }
    }
    debug!("No fullscreen family available");
    Rc::new(NoFullscreen)
}

/// Best target a controller can serve: the container, else the media element
pub fn preferred_target(controller: &dyn FullscreenController) -> Option<FullscreenTarget> {
    if controller.supports(FullscreenTarget::Container) {
        Some(FullscreenTarget::Container)
    } else if controller.supports(FullscreenTarget::Media) {
        Some(FullscreenTarget::Media)
    } else {
        None
    }
}
