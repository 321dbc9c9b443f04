//! Test doubles shared by the runtime tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use guestview_core::{
    GuestInstanceId, GuestParams, InternalInstanceId, Size, SizeParams, ViewInstanceId,
};
use guestview_engine::{
    CreateTicket, GuestHandle, GuestMessage, GuestViewService, HostElement, HostEvent,
};

use crate::backend::{GuestEventSink, GuestViewBackend};

/// Service that does nothing.
pub struct NullService;

impl GuestViewService for NullService {
    fn create_guest(&self, _ticket: CreateTicket, _params: GuestParams) {}
    fn destroy_guest(&self, _guest: GuestInstanceId) {}
    fn attach_guest(&self, _internal: InternalInstanceId, _guest: GuestInstanceId, _params: GuestParams) {}
    fn set_size(&self, _guest: GuestInstanceId, _size: SizeParams) {}
    fn register_events(&self, _view: ViewInstanceId) {}
    fn deregister_events(&self, _view: ViewInstanceId) {}
    fn guest_handle(&self, _guest: GuestInstanceId) -> Option<Arc<dyn GuestHandle>> {
        None
    }
}

/// Host element with in-memory attributes.
#[derive(Default)]
pub struct TestHost {
    attributes: HashMap<String, String>,
}

impl TestHost {
    pub fn with_src(src: &str) -> Self {
        let mut host = Self::default();
        host.attributes.insert("src".to_string(), src.to_string());
        host
    }
}

impl HostElement for TestHost {
    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    fn set_attribute(&mut self, name: &str, value: Option<String>) {
        match value {
            Some(v) => self.attributes.insert(name.to_string(), v),
            None => self.attributes.remove(name),
        };
    }

    fn rendered_size(&self) -> Size {
        Size::new(800, 600)
    }

    fn computed_style_size(&self) -> Size {
        Size::default()
    }

    fn set_visual_size(&mut self, _size: Size) {}

    fn dispatch_event(&mut self, _event: &HostEvent) {}
}

struct EchoHandle;

impl GuestHandle for EchoHandle {
    fn call(&self, method: &str, _args: &[Value]) -> Result<Value, String> {
        Ok(Value::String(method.to_string()))
    }
}

/// Backend that records every call as a short string.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<String>>,
    delivered: Mutex<Vec<String>>,
    next_guest: AtomicU64,
}

impl RecordingBackend {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl GuestViewBackend for RecordingBackend {
    async fn create_guest(&self, params: GuestParams) -> Result<GuestInstanceId, String> {
        let guest = GuestInstanceId::new(self.next_guest.fetch_add(1, Ordering::Relaxed) + 100);
        self.record(format!("create {} -> {}", params.instance_id, guest));
        Ok(guest)
    }

    async fn destroy_guest(&self, guest: GuestInstanceId) {
        self.record(format!("destroy {}", guest));
    }

    async fn attach_guest(
        &self,
        internal: InternalInstanceId,
        guest: GuestInstanceId,
        _params: GuestParams,
    ) {
        self.record(format!("attach {} {}", internal, guest));
    }

    async fn set_size(&self, guest: GuestInstanceId, _size: SizeParams) {
        self.record(format!("set_size {}", guest));
    }

    async fn register_events(&self, events: GuestEventSink) {
        self.record(format!("register {}", events.view_instance_id()));
    }

    async fn deregister_events(&self, view: ViewInstanceId) {
        self.record(format!("deregister {}", view));
    }

    async fn deliver(&self, message: GuestMessage) {
        self.delivered.lock().push(message.method);
    }

    fn guest_handle(&self, _guest: GuestInstanceId) -> Option<Arc<dyn GuestHandle>> {
        Some(Arc::new(EchoHandle))
    }
}

/// Poll `condition` until it holds, failing the test after about a second.
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
