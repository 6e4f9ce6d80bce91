//! Control overlay visibility
//!
//! Controls stay visible unless playback is running; while playing they hide
//! after an idle period that any user activity restarts.

use crate::platform::{Scheduler, TimerId};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ControlsVisibility {
    visible: bool,
    idle: Duration,
    idle_timer: Option<TimerId>,
}

impl ControlsVisibility {
    pub fn new(idle: Duration) -> Self {
        Self {
            visible: true,
            idle,
            idle_timer: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.idle_timer == Some(id)
    }

    /// Show controls and restart the idle countdown when playing
    pub fn show(&mut self, playing: bool, scheduler: &dyn Scheduler) {
        self.visible = true;
        self.cancel(scheduler);
        if playing {
            self.idle_timer = Some(scheduler.schedule(self.idle));
        }
    }

    pub fn hide(&mut self, scheduler: &dyn Scheduler) {
        self.visible = false;
        self.cancel(scheduler);
    }

    /// Single tap behavior, decided on the visibility at the time it runs
    pub fn toggle(&mut self, playing: bool, scheduler: &dyn Scheduler) {
        if self.visible {
            self.hide(scheduler);
        } else {
            self.show(playing, scheduler);
        }
    }

    /// Playback started or stopped
    pub fn playing_changed(&mut self, playing: bool, scheduler: &dyn Scheduler) {
        self.show(playing, scheduler);
    }

    /// Idle timer fired. Returns whether visibility changed.
    pub fn idle_elapsed(&mut self, id: TimerId, playing: bool) -> bool {
        if !self.owns_timer(id) {
            return false;
        }
        self.idle_timer = None;
        if playing && self.visible {
            debug!("Hiding idle controls");
            self.visible = false;
            return true;
        }
        false
    }

    pub fn cancel(&mut self, scheduler: &dyn Scheduler) {
        if let Some(id) = self.idle_timer.take() {
            scheduler.cancel(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ManualScheduler;

    #[test]
    fn test_hides_after_idle_while_playing() {
        let scheduler = ManualScheduler::new();
        let mut controls = ControlsVisibility::new(Duration::from_secs(3));
        controls.playing_changed(true, &scheduler);
        assert!(controls.is_visible());

        let fired = scheduler.advance(Duration::from_secs(3));
        assert_eq!(fired.len(), 1);
        assert!(controls.idle_elapsed(fired[0], true));
        assert!(!controls.is_visible());
    }

    #[test]
    fn test_never_arms_while_paused() {
        let scheduler = ManualScheduler::new();
        let mut controls = ControlsVisibility::new(Duration::from_secs(3));
        controls.playing_changed(false, &scheduler);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_activity_restarts_countdown() {
        let scheduler = ManualScheduler::new();
        let mut controls = ControlsVisibility::new(Duration::from_secs(3));
        controls.playing_changed(true, &scheduler);
        assert!(scheduler.advance(Duration::from_secs(2)).is_empty());

        controls.show(true, &scheduler);
        assert!(scheduler.advance(Duration::from_secs(2)).is_empty());
        assert_eq!(scheduler.pending_count(), 1);
        assert!(controls.is_visible());
    }

    #[test]
    fn test_toggle_reads_current_visibility() {
        let scheduler = ManualScheduler::new();
        let mut controls = ControlsVisibility::new(Duration::from_secs(3));
        controls.toggle(true, &scheduler);
        assert!(!controls.is_visible());
        controls.toggle(true, &scheduler);
        assert!(controls.is_visible());
        assert_eq!(scheduler.pending_count(), 1);
    }
}
