//! Element registry.
//!
//! Maps host element handles to their [`ViewInstance`], plus two routing
//! tables the collaborators address instances by:
//! - plugin attachment id → element, for intrinsic size callbacks
//! - view instance id → element, for guest events and creation results
//!
//! Each instance sits behind its own mutex. Table locks are never held while
//! an instance runs, except the resize table, which is updated after an
//! event while that instance is still locked.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use guestview_core::{
    ConfigError, ElementHandle, EngineConfig, EngineError, GuestInstanceId, InternalInstanceId,
    Size, ViewInstanceId,
};

use crate::dispatch::{MethodOutcome, MethodTable};
use crate::events::{EventHandler, OnHandlers};
use crate::lifecycle::{
    Collaborators, ElementEvent, GuestEvent, InstanceSnapshot, LifecycleState, ViewInstance,
};
use crate::service::{CreateTicket, GuestMessageSink, GuestViewService, HostElement};

type SharedInstance = Arc<Mutex<ViewInstance>>;

/// All live host element bindings.
pub struct ViewRegistry {
    collaborators: Collaborators,
    elements: RwLock<HashMap<ElementHandle, SharedInstance>>,
    by_view: RwLock<HashMap<ViewInstanceId, ElementHandle>>,
    resize_routes: RwLock<HashMap<InternalInstanceId, ElementHandle>>,
}

impl ViewRegistry {
    /// Create a registry driving the given collaborators.
    pub fn new(
        service: Arc<dyn GuestViewService>,
        transport: Arc<dyn GuestMessageSink>,
        config: &EngineConfig,
    ) -> Result<Self, ConfigError> {
        let methods = MethodTable::from_config(&config.methods)?;
        tracing::debug!(
            methods = methods.len(),
            events = config.events.len(),
            "Created view registry"
        );
        Ok(Self {
            collaborators: Collaborators {
                service,
                transport,
                methods: Arc::new(methods),
                event_properties: Arc::new(OnHandlers::properties_for(&config.events)),
                user_agent_override: config.user_agent_override.clone(),
            },
            elements: RwLock::new(HashMap::new()),
            by_view: RwLock::new(HashMap::new()),
            resize_routes: RwLock::new(HashMap::new()),
        })
    }

    // =========================================================================
    // Elements
    // =========================================================================

    /// Bind a newly constructed host element. It starts detached.
    pub fn create_element(&self, host: Box<dyn HostElement>) -> ElementHandle {
        let handle = ElementHandle::allocate();
        let instance = ViewInstance::new(host, self.collaborators.clone());
        let view = instance.view_instance_id();

        self.elements
            .write()
            .insert(handle, Arc::new(Mutex::new(instance)));
        self.by_view.write().insert(view, handle);
        tracing::debug!(%handle, %view, "Registered element");
        handle
    }

    /// Unmount (if needed) and forget an element.
    pub fn remove_element(&self, handle: ElementHandle) -> Result<(), EngineError> {
        self.dispatch(handle, ElementEvent::Unmounted)?;

        let Some(instance) = self.elements.write().remove(&handle) else {
            return Err(EngineError::UnknownElement(handle));
        };
        let instance = instance.lock();
        self.by_view.write().remove(&instance.view_instance_id());
        if let Some(internal) = instance.internal_instance_id() {
            self.resize_routes.write().remove(&internal);
        }
        tracing::debug!(%handle, view = %instance.view_instance_id(), "Removed element");
        Ok(())
    }

    pub fn contains(&self, handle: ElementHandle) -> bool {
        self.elements.read().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }

    /// Lifecycle state of an element; `Unbound` when the handle is unknown.
    pub fn state(&self, handle: ElementHandle) -> LifecycleState {
        self.with_instance(handle, |instance| instance.state())
            .unwrap_or(LifecycleState::Unbound)
    }

    pub fn snapshot(&self, handle: ElementHandle) -> Option<InstanceSnapshot> {
        self.with_instance(handle, |instance| instance.snapshot()).ok()
    }

    /// Element bound to a view instance id.
    pub fn element_for_view(&self, view: ViewInstanceId) -> Option<ElementHandle> {
        self.by_view.read().get(&view).copied()
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Deliver an event to one element.
    pub fn dispatch(&self, handle: ElementHandle, event: ElementEvent) -> Result<(), EngineError> {
        let instance = self
            .instance(handle)
            .ok_or(EngineError::UnknownElement(handle))?;
        let mut instance = instance.lock();

        let before = instance.internal_instance_id();
        let result = instance.handle(event);
        let after = instance.internal_instance_id();

        if before != after {
            let mut routes = self.resize_routes.write();
            if let Some(old) = before {
                routes.remove(&old);
            }
            if let Some(new) = after {
                routes.insert(new, handle);
            }
        }
        result
    }

    /// Route an intrinsic size change by plugin attachment id.
    pub fn dispatch_element_resize(
        &self,
        internal: InternalInstanceId,
        size: Size,
    ) -> Result<(), EngineError> {
        let Some(handle) = self.resize_routes.read().get(&internal).copied() else {
            tracing::debug!(%internal, "No element registered for resize");
            return Ok(());
        };
        self.dispatch(handle, ElementEvent::ElementResized(size))
    }

    /// Route a `create_guest` result back to its element.
    ///
    /// When the element is gone the new guest has no owner and is destroyed.
    pub fn guest_created(
        &self,
        ticket: CreateTicket,
        result: Result<GuestInstanceId, String>,
    ) -> Result<(), EngineError> {
        let Some(handle) = self.element_for_view(ticket.view_instance_id) else {
            tracing::warn!(view = %ticket.view_instance_id, "Guest created for removed element");
            if let Ok(orphan) = result {
                self.collaborators.service.destroy_guest(orphan);
            }
            return Ok(());
        };
        self.dispatch(handle, ElementEvent::GuestCreated { ticket, result })
    }

    /// Route a guest-originated event by view instance id.
    pub fn dispatch_guest_event(
        &self,
        view: ViewInstanceId,
        event: GuestEvent,
    ) -> Result<(), EngineError> {
        let Some(handle) = self.element_for_view(view) else {
            tracing::debug!(%view, event = event.name(), "Dropped guest event for unknown view");
            return Ok(());
        };
        self.dispatch(handle, ElementEvent::Guest(event))
    }

    /// Deliver a zoom level broadcast to every element.
    pub fn broadcast_zoom_level(&self, level: f64) {
        let handles: Vec<ElementHandle> = self.elements.read().keys().copied().collect();
        for handle in handles {
            if let Err(error) = self.dispatch(handle, ElementEvent::ZoomLevelChanged(level)) {
                tracing::error!(%handle, %error, "Failed to forward zoom level");
            }
        }
    }

    // =========================================================================
    // Public Surface
    // =========================================================================

    pub fn invoke(
        &self,
        handle: ElementHandle,
        method: &str,
        args: Vec<Value>,
    ) -> Result<MethodOutcome, EngineError> {
        self.with_instance(handle, |instance| instance.invoke(method, args))?
    }

    pub fn set_event_handler(
        &self,
        handle: ElementHandle,
        property: &str,
        handler: Option<EventHandler>,
    ) -> Result<Option<EventHandler>, EngineError> {
        self.with_instance(handle, |instance| instance.set_event_handler(property, handler))?
    }

    pub fn event_handler(
        &self,
        handle: ElementHandle,
        property: &str,
    ) -> Result<Option<EventHandler>, EngineError> {
        self.with_instance(handle, |instance| instance.event_handler(property))?
    }

    /// Run `f` with the element's instance locked.
    pub fn with_instance<R>(
        &self,
        handle: ElementHandle,
        f: impl FnOnce(&mut ViewInstance) -> R,
    ) -> Result<R, EngineError> {
        let instance = self
            .instance(handle)
            .ok_or(EngineError::UnknownElement(handle))?;
        let mut instance = instance.lock();
        Ok(f(&mut instance))
    }

    fn instance(&self, handle: ElementHandle) -> Option<SharedInstance> {
        self.elements.read().get(&handle).cloned()
    }
}

impl std::fmt::Debug for ViewRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewRegistry")
            .field("elements", &self.elements.read().len())
            .field("resize_routes", &self.resize_routes.read().len())
            .field("collaborators", &self.collaborators)
            .finish()
    }
}
