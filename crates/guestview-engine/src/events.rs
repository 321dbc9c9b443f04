//! Host-facing events and `on<event>` handler properties.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use guestview_core::{EngineError, Size};

/// Event fired at the host element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostEvent {
    /// Element size changed.
    Resize { new_width: u32, new_height: u32 },

    /// Guest creation failed.
    DidFailLoad { reason: String },

    /// Guest-originated event, forwarded as-is.
    Guest { name: String, payload: Value },
}

impl HostEvent {
    pub fn resize(size: Size) -> Self {
        HostEvent::Resize {
            new_width: size.width,
            new_height: size.height,
        }
    }

    /// Event name as seen by host listeners.
    pub fn name(&self) -> &str {
        match self {
            HostEvent::Resize { .. } => "resize",
            HostEvent::DidFailLoad { .. } => "did-fail-load",
            HostEvent::Guest { name, .. } => name,
        }
    }
}

/// A host-registered event handler.
pub type EventHandler = Arc<dyn Fn(&HostEvent) + Send + Sync>;

/// Property name for an event: `on` + lowercased event name.
pub fn property_name(event_name: &str) -> String {
    format!("on{}", event_name.to_lowercase())
}

/// The `on<event>` properties of one element.
///
/// At most one handler per property; assigning replaces the previous one.
pub struct OnHandlers {
    /// Property names that exist on the element.
    properties: Arc<BTreeSet<String>>,

    handlers: HashMap<String, EventHandler>,
}

impl OnHandlers {
    /// Create the handler set for the given supported event names.
    pub fn new(properties: Arc<BTreeSet<String>>) -> Self {
        Self {
            properties,
            handlers: HashMap::new(),
        }
    }

    /// Build the property set from event names.
    pub fn properties_for<'a>(events: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
        events.into_iter().map(|e| property_name(e)).collect()
    }

    /// Current handler for a property.
    pub fn get(&self, property: &str) -> Result<Option<EventHandler>, EngineError> {
        self.check(property)?;
        Ok(self.handlers.get(property).cloned())
    }

    /// Assign a handler, or clear it with `None`.
    ///
    /// The previous handler is removed first and returned.
    pub fn set(
        &mut self,
        property: &str,
        handler: Option<EventHandler>,
    ) -> Result<Option<EventHandler>, EngineError> {
        self.check(property)?;
        let previous = self.handlers.remove(property);
        if let Some(handler) = handler {
            self.handlers.insert(property.to_string(), handler);
        }
        tracing::debug!(
            property,
            replaced = previous.is_some(),
            "Updated event handler property"
        );
        Ok(previous)
    }

    /// Invoke the handler registered for this event, if any.
    pub fn dispatch(&self, event: &HostEvent) {
        if let Some(handler) = self.handlers.get(&property_name(event.name())) {
            handler(event);
        }
    }

    /// Number of assigned handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn check(&self, property: &str) -> Result<(), EngineError> {
        if self.properties.contains(property) {
            Ok(())
        } else {
            Err(EngineError::UnknownEvent(property.to_string()))
        }
    }
}

impl fmt::Debug for OnHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnHandlers")
            .field("assigned", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
