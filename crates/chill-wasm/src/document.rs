//! Document-level listeners: fullscreen changes and keyboard shortcuts

use crate::dispatch::{Dispatcher, HostEvent};
use crate::fullscreen::ELEMENT_FAMILIES;
use chill_core::keyboard;
use chill_core::platform::{DocumentEvent, DocumentEventKind, HostDocument, ListenerId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Weak;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Event, KeyboardEvent};

type EventClosure = Closure<dyn FnMut(Event)>;

/// DOM event names backing one listener kind
pub fn dom_events(kind: DocumentEventKind) -> Vec<&'static str> {
    match kind {
        DocumentEventKind::FullscreenChange => {
            ELEMENT_FAMILIES.iter().map(|family| family.change_event).collect()
        }
        DocumentEventKind::KeyDown => vec!["keydown"],
    }
}

pub struct DomDocument {
    document: Document,
    dispatcher: Weak<Dispatcher>,
    listeners: RefCell<HashMap<ListenerId, Vec<(&'static str, EventClosure)>>>,
    next_id: Cell<u64>,
}

impl DomDocument {
    pub fn new(document: Document, dispatcher: Weak<Dispatcher>) -> Self {
        Self {
            document,
            dispatcher,
            listeners: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }
}

fn handler(id: ListenerId, kind: DocumentEventKind, dispatcher: Weak<Dispatcher>) -> EventClosure {
    EventClosure::new(move |event: Event| {
        let document_event = match kind {
            DocumentEventKind::FullscreenChange => DocumentEvent::FullscreenChange,
            DocumentEventKind::KeyDown => {
                let Some(key) = event.dyn_ref::<KeyboardEvent>() else {
                    return;
                };
                let code = key.code();
                // Must happen synchronously, the session only sees the key later
                if keyboard::suppresses_default(&code) {
                    event.prevent_default();
                }
                DocumentEvent::KeyDown(code)
            }
        };
        if let Some(dispatcher) = dispatcher.upgrade() {
            dispatcher.push(HostEvent::Document(id, document_event));
        }
    })
}

impl HostDocument for DomDocument {
    fn add_listener(&self, kind: DocumentEventKind) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let mut handlers = Vec::new();
        for dom_type in dom_events(kind) {
            let closure = handler(id, kind, self.dispatcher.clone());
            if self
                .document
                .add_event_listener_with_callback(dom_type, closure.as_ref().unchecked_ref())
                .is_ok()
            {
                handlers.push((dom_type, closure));
            }
        }
        self.listeners.borrow_mut().insert(id, handlers);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        let Some(handlers) = self.listeners.borrow_mut().remove(&id) else {
            return;
        };
        for (dom_type, closure) in handlers {
            let _ = self
                .document
                .remove_event_listener_with_callback(dom_type, closure.as_ref().unchecked_ref());
        }
    }
}

impl Drop for DomDocument {
    fn drop(&mut self) {
        let ids: Vec<ListenerId> = self.listeners.borrow().keys().copied().collect();
        for id in ids {
            self.remove_listener(id);
        }
    }
}
