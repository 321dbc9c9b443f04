//! Lifecycle State Machine
//!
//! One [`ViewInstance`] per host element. It owns the three ids and drives
//! the Guest View Service from discrete [`ElementEvent`]s.
//!
//! ## State Graph
//!
//! ```text
//!               Unbound
//!                  │ construct (allocate view id)
//!                  ▼
//!   ┌──────────► Detached ◄──────────────── unmount + reset (any state)
//!   │              │ mount
//!   │              ▼
//!   │       AttachedNoPlugin ──── src ────► GuestRequested{internal: None}
//!   │              │ plugin id                    │            │ plugin id
//!   │              ▼                              │            ▼
//!   │         PluginReady ─────── src ────► GuestRequested{internal: Some}
//!   │                                             │            │
//!   │                                   created   │            │ created
//!   │                                             ▼            ▼
//!   │                            GuestAwaitingPlugin ─► GuestAttached
//!   │                                         plugin id  (attach_guest once)
//!   └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A creation result is matched against the ticket of the in-flight request.
//! Reset bumps the generation, so a result for an older request is stale and
//! never touches the instance's ids.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};

use guestview_core::{
    AttributeValue, EngineError, GuestInstanceId, InternalInstanceId, Size, SizeParams,
    ViewInstanceId,
};

use crate::attributes::{names, AttributeEffect, AttributeRegistry, MutationContext};
use crate::dispatch::{call_blocking, AsyncOutbox, MethodClass, MethodOutcome, MethodTable};
use crate::events::{EventHandler, HostEvent, OnHandlers};
use crate::resize::{autosize_params, evaluate_layout_resize, ResizeDecision};
use crate::service::{CreateTicket, GuestHandle, GuestMessageSink, GuestViewService, HostElement};

mod state;

pub use state::{ElementEvent, GuestEvent, InstanceSnapshot, LifecycleState};

/// Shared collaborators handed to every instance.
#[derive(Clone)]
pub struct Collaborators {
    pub service: Arc<dyn GuestViewService>,
    pub transport: Arc<dyn GuestMessageSink>,
    pub methods: Arc<MethodTable>,

    /// `on<event>` property names that exist on every element.
    pub event_properties: Arc<BTreeSet<String>>,

    pub user_agent_override: Option<String>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("methods", &self.methods.len())
            .field("event_properties", &self.event_properties.len())
            .field("user_agent_override", &self.user_agent_override)
            .finish()
    }
}

// =============================================================================
// View Instance
// =============================================================================

/// Engine state for one host element.
pub struct ViewInstance {
    view_instance_id: ViewInstanceId,
    state: LifecycleState,
    element_attached: bool,

    /// True until the first creation request of the current session.
    before_first_navigation: bool,

    /// Bumped on every reset. Stamped on each creation ticket.
    generation: u64,

    attributes: AttributeRegistry,
    on: OnHandlers,

    /// Callable handle for the current guest.
    guest_handle: Option<Arc<dyn GuestHandle>>,

    outbox: AsyncOutbox,
    zoom_subscribed: bool,

    host: Box<dyn HostElement>,
    collaborators: Collaborators,
}

impl ViewInstance {
    /// Bind a new instance to a host element. Starts `Detached`.
    pub fn new(host: Box<dyn HostElement>, collaborators: Collaborators) -> Self {
        let view_instance_id = ViewInstanceId::allocate();
        tracing::debug!(view = %view_instance_id, "Created view instance");
        Self {
            view_instance_id,
            state: LifecycleState::Detached,
            element_attached: false,
            before_first_navigation: true,
            generation: 0,
            attributes: AttributeRegistry::new(),
            on: OnHandlers::new(Arc::clone(&collaborators.event_properties)),
            guest_handle: None,
            outbox: AsyncOutbox::new(),
            zoom_subscribed: false,
            host,
            collaborators,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn view_instance_id(&self) -> ViewInstanceId {
        self.view_instance_id
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn internal_instance_id(&self) -> Option<InternalInstanceId> {
        self.state.internal_instance_id()
    }

    pub fn guest_instance_id(&self) -> Option<GuestInstanceId> {
        self.state.guest_instance_id()
    }

    pub fn element_attached(&self) -> bool {
        self.element_attached
    }

    pub fn before_first_navigation(&self) -> bool {
        self.before_first_navigation
    }

    pub fn attributes(&self) -> &AttributeRegistry {
        &self.attributes
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            view_instance_id: self.view_instance_id,
            internal_instance_id: self.internal_instance_id(),
            guest_instance_id: self.guest_instance_id(),
            element_attached: self.element_attached,
            before_first_navigation: self.before_first_navigation,
            generation: self.generation,
            state: self.state,
            queued_calls: self.outbox.len(),
        }
    }

    // =========================================================================
    // Event Dispatch
    // =========================================================================

    /// Feed one event into the state machine.
    ///
    /// Errors for which [`EngineError::is_local`] is true have already been
    /// handled: the instance is consistent and nothing reached the guest.
    pub fn handle(&mut self, event: ElementEvent) -> Result<(), EngineError> {
        tracing::trace!(
            view = %self.view_instance_id,
            state = self.state.name(),
            event = event.kind(),
            "Handling element event"
        );

        match event {
            ElementEvent::Mounted => self.on_mounted(),
            ElementEvent::Unmounted => {
                self.on_unmounted();
                Ok(())
            }
            ElementEvent::AttributeChanged {
                name,
                old_value,
                new_value,
            } => self.on_attribute_changed(&name, old_value.as_deref(), new_value.as_deref()),
            ElementEvent::PluginAttributeChanged {
                name,
                old_value,
                new_value,
            } => self.on_plugin_attribute_changed(&name, old_value.as_deref(), new_value.as_deref()),
            ElementEvent::LayoutResized(size) => {
                if let Some(size) = self.apply_layout_resize(size) {
                    self.dispatch_host_event(HostEvent::resize(size));
                }
                Ok(())
            }
            ElementEvent::ElementResized(size) => {
                self.on_element_resized(size);
                Ok(())
            }
            ElementEvent::GuestCreated { ticket, result } => self.on_guest_created(ticket, result),
            ElementEvent::Guest(event) => self.on_guest_event(event),
            ElementEvent::ZoomLevelChanged(level) => self.on_zoom_level_changed(level),
        }
    }

    fn on_mounted(&mut self) -> Result<(), EngineError> {
        if self.element_attached {
            tracing::warn!(view = %self.view_instance_id, "Mount while already mounted");
            return Ok(());
        }

        self.element_attached = true;
        self.zoom_subscribed = true;
        self.state = LifecycleState::AttachedNoPlugin;
        self.collaborators.service.register_events(self.view_instance_id);

        for error in self.attributes.parse_all(self.host.as_ref()) {
            tracing::warn!(view = %self.view_instance_id, %error, "Ignored invalid attribute on mount");
        }
        tracing::debug!(view = %self.view_instance_id, "Mounted");
        self.parse_src()
    }

    fn on_unmounted(&mut self) {
        if !self.element_attached {
            return;
        }
        self.element_attached = false;
        self.collaborators
            .service
            .deregister_events(self.view_instance_id);
        self.reset();
        tracing::debug!(view = %self.view_instance_id, "Unmounted");
    }

    /// Tear down the current session.
    ///
    /// Destroys the guest if there is one, which also re-arms
    /// `before_first_navigation` and lets the partition be validated again.
    /// Always clears the plugin attachment id and invalidates any in-flight
    /// creation request. The view instance id is kept.
    pub fn reset(&mut self) {
        if let Some(guest) = self.guest_instance_id() {
            tracing::info!(view = %self.view_instance_id, %guest, "Destroying guest on reset");
            self.collaborators.service.destroy_guest(guest);
            self.guest_handle = None;
            self.before_first_navigation = true;
            self.attributes.revalidate_partition();
        }

        self.generation += 1;
        self.zoom_subscribed = false;

        let dropped = self.outbox.clear();
        if dropped > 0 {
            tracing::debug!(view = %self.view_instance_id, dropped, "Dropped queued async calls");
        }

        self.state = if self.element_attached {
            LifecycleState::AttachedNoPlugin
        } else {
            LifecycleState::Detached
        };
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    fn on_attribute_changed(
        &mut self,
        name: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
    ) -> Result<(), EngineError> {
        let ctx = MutationContext {
            before_first_navigation: self.before_first_navigation,
        };
        let effect =
            self.attributes
                .handle_mutation(name, old_value, new_value, ctx, self.host.as_mut())?;

        match effect {
            AttributeEffect::None => Ok(()),
            AttributeEffect::Navigate => self.parse_src(),
            AttributeEffect::AutosizeChanged => {
                if let Some(guest) = self.guest_instance_id() {
                    let params = autosize_params(&self.attributes, self.host.rendered_size());
                    self.collaborators.service.set_size(guest, params);
                }
                Ok(())
            }
            AttributeEffect::UserAgentChanged(user_agent) => {
                if self.guest_instance_id().is_none() {
                    return Ok(());
                }
                let args = [json!(user_agent.unwrap_or_default())];
                self.call_guest("setUserAgent", &args).map(|_| ())
            }
        }
    }

    /// Act on the current `src`: navigate the live guest, or request one.
    fn parse_src(&mut self) -> Result<(), EngineError> {
        if !self.element_attached || !self.attributes.partition_valid() {
            return Ok(());
        }
        let Some(src) = self.attributes.text(names::SRC).map(str::to_string) else {
            return Ok(());
        };

        if self.guest_instance_id().is_some() {
            let options = json!({
                "httpReferrer": self.attributes.text(names::HTTP_REFERRER),
                "userAgent": self.attributes.text(names::USER_AGENT),
            });
            return self.call_guest("loadURL", &[json!(src), options]).map(|_| ());
        }

        if !self.before_first_navigation {
            // The pending request will be attached with fresh params.
            return Err(EngineError::DuplicateGuestRequest {
                view_instance_id: self.view_instance_id,
            });
        }

        self.request_guest();
        Ok(())
    }

    fn request_guest(&mut self) {
        self.before_first_navigation = false;
        let ticket = CreateTicket {
            view_instance_id: self.view_instance_id,
            generation: self.generation,
        };
        let params = self.attributes.build_params(
            self.view_instance_id,
            self.collaborators.user_agent_override.as_deref(),
            self.host.as_ref(),
        );
        self.state = LifecycleState::GuestRequested {
            ticket,
            internal: self.internal_instance_id(),
        };
        tracing::info!(
            view = %self.view_instance_id,
            generation = ticket.generation,
            "Requesting guest"
        );
        self.collaborators.service.create_guest(ticket, params);
    }

    // =========================================================================
    // Id Arrival
    // =========================================================================

    fn on_plugin_attribute_changed(
        &mut self,
        name: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
    ) -> Result<(), EngineError> {
        if name != names::INTERNAL_INSTANCE_ID {
            return Ok(());
        }
        let old_empty = old_value.map_or(true, str::is_empty);
        let Some(raw) = new_value.filter(|v| old_empty && !v.is_empty()) else {
            return Ok(());
        };

        let internal = raw.parse::<InternalInstanceId>().map_err(|e| {
            EngineError::InvalidAttribute {
                name: name.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.on_plugin_ready(internal);
        Ok(())
    }

    fn on_plugin_ready(&mut self, internal: InternalInstanceId) {
        let state = self.state;
        self.state = match state {
            LifecycleState::AttachedNoPlugin => LifecycleState::PluginReady { internal },
            LifecycleState::GuestRequested {
                ticket,
                internal: None,
            } => LifecycleState::GuestRequested {
                ticket,
                internal: Some(internal),
            },
            LifecycleState::GuestAwaitingPlugin { guest } => {
                self.attach(internal, guest);
                return;
            }
            state => {
                tracing::warn!(
                    view = %self.view_instance_id,
                    %internal,
                    state = state.name(),
                    "Ignored plugin attachment id"
                );
                return;
            }
        };
        tracing::debug!(view = %self.view_instance_id, %internal, "Plugin attachment ready");
    }

    fn on_guest_created(
        &mut self,
        ticket: CreateTicket,
        result: Result<GuestInstanceId, String>,
    ) -> Result<(), EngineError> {
        if self.state.pending_ticket() != Some(ticket) {
            return Err(self.discard_stale_completion(ticket, result));
        }
        let internal = self.internal_instance_id();

        let guest = match result {
            Ok(guest) => guest,
            Err(reason) => {
                tracing::warn!(view = %self.view_instance_id, %reason, "Guest creation failed");
                self.before_first_navigation = true;
                self.state = match internal {
                    Some(internal) => LifecycleState::PluginReady { internal },
                    None => LifecycleState::AttachedNoPlugin,
                };
                self.dispatch_host_event(HostEvent::DidFailLoad { reason });
                return Ok(());
            }
        };

        tracing::info!(view = %self.view_instance_id, %guest, "Guest created");
        self.guest_handle = self.collaborators.service.guest_handle(guest);
        if self.guest_handle.is_none() {
            tracing::warn!(view = %self.view_instance_id, %guest, "No handle for guest");
        }

        match internal {
            Some(internal) => self.attach(internal, guest),
            None => self.state = LifecycleState::GuestAwaitingPlugin { guest },
        }

        if let Err(error) = self
            .outbox
            .flush(guest, self.collaborators.transport.as_ref())
        {
            tracing::error!(view = %self.view_instance_id, %error, "Failed to flush queued async calls");
        }
        Ok(())
    }

    /// Clean up after a completion that no longer matches the instance.
    fn discard_stale_completion(
        &mut self,
        ticket: CreateTicket,
        result: Result<GuestInstanceId, String>,
    ) -> EngineError {
        tracing::warn!(
            view = %self.view_instance_id,
            request_generation = ticket.generation,
            current_generation = self.generation,
            "Ignoring stale guest creation result"
        );

        if let Ok(orphan) = result {
            self.collaborators.service.destroy_guest(orphan);
        }

        // A reset during the request left navigation disarmed with nothing
        // in flight. Re-arm it so the element can create a guest again.
        if self.state.is_idle() && !self.before_first_navigation {
            self.before_first_navigation = true;
            if let Err(error) = self.parse_src() {
                tracing::warn!(view = %self.view_instance_id, %error, "Re-parsing src failed");
            }
        }

        EngineError::StaleCompletion {
            view_instance_id: self.view_instance_id,
            request_generation: ticket.generation,
            current_generation: self.generation,
        }
    }

    fn attach(&mut self, internal: InternalInstanceId, guest: GuestInstanceId) {
        let params = self.attributes.build_params(
            self.view_instance_id,
            self.collaborators.user_agent_override.as_deref(),
            self.host.as_ref(),
        );
        self.state = LifecycleState::GuestAttached { internal, guest };
        tracing::info!(view = %self.view_instance_id, %internal, %guest, "Attaching guest");
        self.collaborators
            .service
            .attach_guest(internal, guest, params);
    }

    // =========================================================================
    // Resize
    // =========================================================================

    /// Apply a proposed layout size. Returns the committed size, or `None`
    /// when it falls outside the autosize bounds and nothing changed.
    fn apply_layout_resize(&mut self, proposed: Size) -> Option<Size> {
        let current = self.host.rendered_size();
        match evaluate_layout_resize(&self.attributes, current, proposed) {
            ResizeDecision::Commit(size) => {
                self.host.set_visual_size(size);
                Some(size)
            }
            ResizeDecision::Reject { proposed, bounds } => {
                tracing::debug!(
                    view = %self.view_instance_id,
                    ?proposed,
                    ?bounds,
                    "Rejected resize outside autosize bounds"
                );
                None
            }
        }
    }

    fn on_element_resized(&mut self, size: Size) {
        self.dispatch_host_event(HostEvent::resize(size));
        if let Some(guest) = self.guest_instance_id() {
            self.collaborators
                .service
                .set_size(guest, SizeParams::normal(size));
        }
    }

    // =========================================================================
    // Guest Events
    // =========================================================================

    fn on_guest_event(&mut self, event: GuestEvent) -> Result<(), EngineError> {
        match &event {
            GuestEvent::LoadCommit { url, is_main_frame } => {
                if *is_main_frame && self.attributes.text(names::SRC) != Some(url.as_str()) {
                    self.attributes.set_value_ignore_mutation(
                        names::SRC,
                        AttributeValue::Text(url.clone()),
                        self.host.as_mut(),
                    );
                }
            }
            GuestEvent::DidAttach {
                partition: Some(partition),
            } => {
                if self.attributes.text(names::PARTITION) != Some(partition.as_str()) {
                    self.attributes.set_value_ignore_mutation(
                        names::PARTITION,
                        AttributeValue::Text(partition.clone()),
                        self.host.as_mut(),
                    );
                }
            }
            GuestEvent::SizeChanged(size) => {
                // Listeners only hear about sizes that were applied.
                if let Some(size) = self.apply_layout_resize(*size) {
                    self.dispatch_host_event(event.to_host_event());
                    self.dispatch_host_event(HostEvent::resize(size));
                }
                return Ok(());
            }
            GuestEvent::DidAttach { partition: None } | GuestEvent::Other { .. } => {}
        }

        self.dispatch_host_event(event.to_host_event());
        Ok(())
    }

    fn on_zoom_level_changed(&mut self, level: f64) -> Result<(), EngineError> {
        if !self.zoom_subscribed {
            return Ok(());
        }
        let guest = self.guest_instance_id();
        self.outbox
            .send_or_replace(
                guest,
                self.collaborators.transport.as_ref(),
                "setZoomLevel",
                vec![json!(level)],
            )
            .map(|_| ())
    }

    /// Fire an event at the host element and its `on<event>` handler.
    ///
    /// Handlers run with the instance locked and must not call back into it.
    fn dispatch_host_event(&mut self, event: HostEvent) {
        self.host.dispatch_event(&event);
        self.on.dispatch(&event);
    }

    // =========================================================================
    // Public Surface
    // =========================================================================

    /// Invoke a forwarded method.
    pub fn invoke(&mut self, method: &str, args: Vec<Value>) -> Result<MethodOutcome, EngineError> {
        let guest = self.guest_instance_id();
        match self.collaborators.methods.classify(method) {
            Some(MethodClass::Blocking) => self.call_guest(method, &args).map(MethodOutcome::Returned),
            Some(MethodClass::NonBlocking) => self.outbox.send_or_queue(
                guest,
                self.collaborators.transport.as_ref(),
                method,
                args,
            ),
            None => Err(EngineError::UnknownMethod(method.to_string())),
        }
    }

    fn call_guest(&self, method: &str, args: &[Value]) -> Result<Value, EngineError> {
        call_blocking(
            self.guest_instance_id(),
            self.guest_handle.as_ref(),
            method,
            args,
        )
    }

    /// Assign or clear the handler behind an `on<event>` property.
    pub fn set_event_handler(
        &mut self,
        property: &str,
        handler: Option<EventHandler>,
    ) -> Result<Option<EventHandler>, EngineError> {
        self.on.set(property, handler)
    }

    pub fn event_handler(&self, property: &str) -> Result<Option<EventHandler>, EngineError> {
        self.on.get(property)
    }
}

impl fmt::Debug for ViewInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewInstance")
            .field("view_instance_id", &self.view_instance_id)
            .field("state", &self.state)
            .field("element_attached", &self.element_attached)
            .field("before_first_navigation", &self.before_first_navigation)
            .field("generation", &self.generation)
            .field("on", &self.on)
            .finish_non_exhaustive()
    }
}
