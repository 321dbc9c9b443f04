//! Recording fakes for the collaborator traits.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use guestview_core::{
    EngineError, GuestInstanceId, GuestParams, InternalInstanceId, Size, SizeParams,
    ViewInstanceId,
};

use crate::events::HostEvent;
use crate::service::{CreateTicket, GuestHandle, GuestMessageSink, GuestViewService, HostElement};
use crate::transport::GuestMessage;

// =============================================================================
// Host Element
// =============================================================================

#[derive(Debug, Default)]
struct HostState {
    attributes: HashMap<String, String>,
    rendered: Size,
    styled: Size,
    visual: Option<Size>,
    events: Vec<HostEvent>,
    writes: Vec<(String, Option<String>)>,
}

/// Host element whose state stays inspectable after it is boxed.
#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(self, name: &str, value: &str) -> Self {
        self.state
            .lock()
            .attributes
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_rendered(self, size: Size) -> Self {
        self.state.lock().rendered = size;
        self
    }

    pub fn with_computed_style(self, size: Size) -> Self {
        self.state.lock().styled = size;
        self
    }

    pub fn host_attribute(&self, name: &str) -> Option<String> {
        self.state.lock().attributes.get(name).cloned()
    }

    /// Attribute writes made by the engine, in order.
    pub fn writes(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().writes.clone()
    }

    pub fn visual_size(&self) -> Option<Size> {
        self.state.lock().visual
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.state.lock().events.clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.state
            .lock()
            .events
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }
}

impl HostElement for FakeHost {
    fn attribute(&self, name: &str) -> Option<String> {
        self.host_attribute(name)
    }

    fn set_attribute(&mut self, name: &str, value: Option<String>) {
        let mut state = self.state.lock();
        state.writes.push((name.to_string(), value.clone()));
        match value {
            Some(v) => state.attributes.insert(name.to_string(), v),
            None => state.attributes.remove(name),
        };
    }

    fn rendered_size(&self) -> Size {
        self.state.lock().rendered
    }

    fn computed_style_size(&self) -> Size {
        self.state.lock().styled
    }

    fn set_visual_size(&mut self, size: Size) {
        let mut state = self.state.lock();
        state.visual = Some(size);
        state.rendered = size;
    }

    fn dispatch_event(&mut self, event: &HostEvent) {
        self.state.lock().events.push(event.clone());
    }
}

// =============================================================================
// Guest Handle
// =============================================================================

/// Guest handle that records calls and answers from a fixed table.
#[derive(Debug, Default)]
pub struct FakeHandle {
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    responses: Mutex<HashMap<String, Value>>,
}

impl FakeHandle {
    pub fn respond(&self, method: &str, value: Value) {
        self.responses.lock().insert(method.to_string(), value);
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().clone()
    }
}

impl GuestHandle for FakeHandle {
    fn call(&self, method: &str, args: &[Value]) -> Result<Value, String> {
        self.calls.lock().push((method.to_string(), args.to_vec()));
        Ok(self
            .responses
            .lock()
            .get(method)
            .cloned()
            .unwrap_or(Value::Null))
    }
}

// =============================================================================
// Guest View Service
// =============================================================================

/// One call made on the service.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCall {
    Create(CreateTicket, GuestParams),
    Destroy(GuestInstanceId),
    Attach(InternalInstanceId, GuestInstanceId, GuestParams),
    SetSize(GuestInstanceId, SizeParams),
    RegisterEvents(ViewInstanceId),
    DeregisterEvents(ViewInstanceId),
}

/// Service that records every call. Creation results are fed back by the test.
#[derive(Debug, Default)]
pub struct RecordingService {
    calls: Mutex<Vec<ServiceCall>>,
    handles: Mutex<HashMap<GuestInstanceId, Arc<FakeHandle>>>,
}

impl RecordingService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }

    pub fn tickets(&self) -> Vec<CreateTicket> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ServiceCall::Create(ticket, _) => Some(ticket),
                _ => None,
            })
            .collect()
    }

    pub fn attaches(&self) -> Vec<(InternalInstanceId, GuestInstanceId)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ServiceCall::Attach(internal, guest, _) => Some((internal, guest)),
                _ => None,
            })
            .collect()
    }

    pub fn destroyed(&self) -> Vec<GuestInstanceId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ServiceCall::Destroy(guest) => Some(guest),
                _ => None,
            })
            .collect()
    }

    /// The handle `guest_handle` resolves for `guest`.
    pub fn handle(&self, guest: GuestInstanceId) -> Arc<FakeHandle> {
        Arc::clone(self.handles.lock().entry(guest).or_default())
    }

    fn record(&self, call: ServiceCall) {
        self.calls.lock().push(call);
    }
}

impl GuestViewService for RecordingService {
    fn create_guest(&self, ticket: CreateTicket, params: GuestParams) {
        self.record(ServiceCall::Create(ticket, params));
    }

    fn destroy_guest(&self, guest: GuestInstanceId) {
        self.record(ServiceCall::Destroy(guest));
    }

    fn attach_guest(
        &self,
        internal: InternalInstanceId,
        guest: GuestInstanceId,
        params: GuestParams,
    ) {
        self.record(ServiceCall::Attach(internal, guest, params));
    }

    fn set_size(&self, guest: GuestInstanceId, size: SizeParams) {
        self.record(ServiceCall::SetSize(guest, size));
    }

    fn register_events(&self, view: ViewInstanceId) {
        self.record(ServiceCall::RegisterEvents(view));
    }

    fn deregister_events(&self, view: ViewInstanceId) {
        self.record(ServiceCall::DeregisterEvents(view));
    }

    fn guest_handle(&self, guest: GuestInstanceId) -> Option<Arc<dyn GuestHandle>> {
        let handle: Arc<dyn GuestHandle> = self.handle(guest);
        Some(handle)
    }
}

// =============================================================================
// Message Sink
// =============================================================================

/// Sink that keeps every message in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<GuestMessage>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<GuestMessage> {
        self.messages.lock().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.messages.lock().iter().map(|m| m.method.clone()).collect()
    }
}

impl GuestMessageSink for RecordingSink {
    fn send(&self, message: GuestMessage) -> Result<(), EngineError> {
        self.messages.lock().push(message);
        Ok(())
    }
}
