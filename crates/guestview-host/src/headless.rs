//! Headless host element.
//!
//! Stands in for a DOM element: attributes live in a map and every write,
//! from either side, is reported back to the engine as a mutation record.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use guestview_core::{ElementHandle, Size};
use guestview_engine::{ElementEvent, HostElement, HostEvent};
use guestview_runtime::{RuntimeResult, RuntimeSender};

#[derive(Default)]
struct ElementState {
    attributes: HashMap<String, String>,
    rendered: Size,
    observer: Option<(ElementHandle, RuntimeSender)>,
}

impl ElementState {
    /// Store a value and return the mutation record for it, if observed.
    fn write(&mut self, name: &str, value: Option<String>) -> Option<(ElementHandle, RuntimeSender, ElementEvent)> {
        let old = match &value {
            Some(v) => self.attributes.insert(name.to_string(), v.clone()),
            None => self.attributes.remove(name),
        };
        let (handle, sender) = self.observer.clone()?;
        let event = ElementEvent::attribute_changed(name, old.as_deref(), value.as_deref());
        Some((handle, sender, event))
    }
}

/// Host-side controller for a [`HeadlessElement`].
#[derive(Clone)]
pub struct ElementController {
    state: Arc<Mutex<ElementState>>,
}

impl ElementController {
    /// Start reporting mutations for `handle`.
    pub fn observe(&self, handle: ElementHandle, sender: RuntimeSender) {
        self.state.lock().observer = Some((handle, sender));
    }

    /// Write an attribute as page script would.
    pub fn set_attribute(&self, name: &str, value: &str) -> RuntimeResult<()> {
        let record = self.state.lock().write(name, Some(value.to_string()));
        match record {
            Some((handle, sender, event)) => sender.element_event(handle, event),
            None => Ok(()),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.state.lock().attributes.get(name).cloned()
    }

    pub fn rendered_size(&self) -> Size {
        self.state.lock().rendered
    }
}

/// Element half handed to the engine.
pub struct HeadlessElement {
    state: Arc<Mutex<ElementState>>,
}

impl HeadlessElement {
    pub fn new(rendered: Size) -> (Self, ElementController) {
        let state = Arc::new(Mutex::new(ElementState {
            rendered,
            ..ElementState::default()
        }));
        let controller = ElementController {
            state: Arc::clone(&state),
        };
        (Self { state }, controller)
    }
}

impl HostElement for HeadlessElement {
    fn attribute(&self, name: &str) -> Option<String> {
        self.state.lock().attributes.get(name).cloned()
    }

    fn set_attribute(&mut self, name: &str, value: Option<String>) {
        let record = self.state.lock().write(name, value);
        if let Some((handle, sender, event)) = record {
            if let Err(e) = sender.element_event(handle, event) {
                tracing::warn!(%handle, "Dropping mutation record: {}", e);
            }
        }
    }

    fn rendered_size(&self) -> Size {
        self.state.lock().rendered
    }

    fn computed_style_size(&self) -> Size {
        self.state.lock().rendered
    }

    fn set_visual_size(&mut self, size: Size) {
        self.state.lock().rendered = size;
    }

    fn dispatch_event(&mut self, event: &HostEvent) {
        match event {
            HostEvent::Guest { name, payload } => {
                tracing::info!(event = %name, %payload, "Host event");
            }
            other => tracing::info!(event = other.name(), "Host event"),
        }
    }
}
