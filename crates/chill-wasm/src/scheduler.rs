//! `Scheduler` over `window.setTimeout`

use crate::dispatch::{Dispatcher, HostEvent};
use chill_core::platform::{Scheduler, TimerId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::warn;
use wasm_bindgen::prelude::*;
use web_sys::Window;

type TimerClosure = Closure<dyn FnMut()>;

struct PendingTimer {
    handle: i32,
    closure: TimerClosure,
}

/// Browser timeout delay for a duration, saturating at the largest allowed value
pub fn timeout_millis(delay: Duration) -> i32 {
    i32::try_from(delay.as_millis()).unwrap_or(i32::MAX)
}

pub struct WindowScheduler {
    window: Window,
    dispatcher: Weak<Dispatcher>,
    me: Weak<WindowScheduler>,
    pending: RefCell<HashMap<TimerId, PendingTimer>>,
    /// Closures of fired timers. A closure cannot be freed while it runs, so
    /// each one is kept until the next timer fires.
    fired: RefCell<Vec<TimerClosure>>,
    next_id: Cell<u64>,
}

impl WindowScheduler {
    pub fn new(window: Window, dispatcher: Weak<Dispatcher>) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            window,
            dispatcher,
            me: me.clone(),
            pending: RefCell::new(HashMap::new()),
            fired: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        })
    }

    fn fire(&self, id: TimerId) {
        self.fired.borrow_mut().clear();
        let timer = self.pending.borrow_mut().remove(&id);
        let Some(timer) = timer else {
            return;
        };
        self.fired.borrow_mut().push(timer.closure);
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.push(HostEvent::Timer(id));
        }
    }
}

impl Scheduler for WindowScheduler {
    fn schedule(&self, delay: Duration) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let me = self.me.clone();
        let closure = TimerClosure::new(move || {
            if let Some(scheduler) = me.upgrade() {
                scheduler.fire(id);
            }
        });
        match self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                closure.as_ref().unchecked_ref(),
                timeout_millis(delay),
            ) {
            Ok(handle) => {
                self.pending
                    .borrow_mut()
                    .insert(id, PendingTimer { handle, closure });
            }
            Err(err) => warn!(timer = id.0, error = ?err, "setTimeout failed"),
        }
        id
    }

    fn cancel(&self, id: TimerId) {
        if let Some(timer) = self.pending.borrow_mut().remove(&id) {
            self.window.clear_timeout_with_handle(timer.handle);
        }
    }
}

impl Drop for WindowScheduler {
    fn drop(&mut self) {
        for (_, timer) in self.pending.borrow_mut().drain() {
            self.window.clear_timeout_with_handle(timer.handle);
        }
    }
}
