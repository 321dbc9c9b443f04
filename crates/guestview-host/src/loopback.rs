//! In-process guest service.
//!
//! Guests are plain records: navigation updates the URL, attachment reports
//! `did-attach` and `load-commit`, and script evaluation echoes back as a
//! `console-message`. Enough to drive the engine end to end without a
//! rendering process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use guestview_core::{
    GuestInstanceId, GuestParams, InternalInstanceId, Size, SizeParams, ViewInstanceId,
};
use guestview_engine::attributes::names;
use guestview_engine::{GuestEvent, GuestHandle, GuestMessage};
use guestview_runtime::{GuestEventSink, GuestViewBackend};

struct LoopbackGuest {
    view: ViewInstanceId,
    url: Arc<Mutex<String>>,
}

/// Guest service that keeps every guest in memory.
#[derive(Default)]
pub struct LoopbackBackend {
    next_guest: AtomicU64,
    guests: Mutex<HashMap<GuestInstanceId, LoopbackGuest>>,
    sinks: Mutex<HashMap<ViewInstanceId, GuestEventSink>>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guest_count(&self) -> usize {
        self.guests.lock().len()
    }

    fn emit(&self, view: ViewInstanceId, event: GuestEvent) {
        let Some(sink) = self.sinks.lock().get(&view).cloned() else {
            tracing::debug!(%view, event = event.name(), "No listener for guest event");
            return;
        };
        if let Err(e) = sink.emit(event) {
            tracing::warn!(%view, "Failed to emit guest event: {}", e);
        }
    }

    fn sink(&self, view: ViewInstanceId) -> Option<GuestEventSink> {
        self.sinks.lock().get(&view).cloned()
    }
}

#[async_trait]
impl GuestViewBackend for LoopbackBackend {
    async fn create_guest(&self, params: GuestParams) -> Result<GuestInstanceId, String> {
        let url = params
            .attribute(names::SRC)
            .and_then(|v| v.as_text())
            .ok_or_else(|| "guest created without a source".to_string())?
            .to_string();

        let guest = GuestInstanceId::new(self.next_guest.fetch_add(1, Ordering::Relaxed) + 1);
        tracing::info!(%guest, view = %params.instance_id, %url, "Created guest");
        self.guests.lock().insert(
            guest,
            LoopbackGuest {
                view: params.instance_id,
                url: Arc::new(Mutex::new(url)),
            },
        );
        Ok(guest)
    }

    async fn destroy_guest(&self, guest: GuestInstanceId) {
        if self.guests.lock().remove(&guest).is_some() {
            tracing::info!(%guest, "Destroyed guest");
        }
    }

    async fn attach_guest(
        &self,
        internal: InternalInstanceId,
        guest: GuestInstanceId,
        params: GuestParams,
    ) {
        let Some((view, url)) = self
            .guests
            .lock()
            .get(&guest)
            .map(|g| (g.view, g.url.lock().clone()))
        else {
            tracing::warn!(%guest, "Attach for unknown guest");
            return;
        };
        tracing::info!(%guest, %internal, "Attached guest");

        let partition = params
            .attribute(names::PARTITION)
            .and_then(|v| v.as_text())
            .map(str::to_string);
        self.emit(view, GuestEvent::DidAttach { partition });
        self.emit(
            view,
            GuestEvent::LoadCommit {
                url,
                is_main_frame: true,
            },
        );

        if let Some(sink) = self.sink(view) {
            let size = Size::new(params.element_width, params.element_height);
            if let Err(e) = sink.element_resized(internal, size) {
                tracing::warn!(%internal, "Failed to report slot size: {}", e);
            }
        }
    }

    async fn set_size(&self, guest: GuestInstanceId, size: SizeParams) {
        tracing::info!(%guest, ?size, "Guest size");
    }

    async fn register_events(&self, events: GuestEventSink) {
        self.sinks.lock().insert(events.view_instance_id(), events);
    }

    async fn deregister_events(&self, view: ViewInstanceId) {
        self.sinks.lock().remove(&view);
    }

    async fn deliver(&self, message: GuestMessage) {
        let view = self
            .guests
            .lock()
            .get(&message.guest_instance_id)
            .map(|g| g.view);
        let Some(view) = view else {
            tracing::warn!(guest = %message.guest_instance_id, method = %message.method, "Message for unknown guest");
            return;
        };

        if message.method == "executeJavaScript" {
            let script = message.args.first().cloned().unwrap_or(Value::Null);
            self.emit(
                view,
                GuestEvent::Other {
                    name: "console-message".to_string(),
                    payload: json!({ "level": 0, "message": script }),
                },
            );
        } else {
            tracing::info!(guest = %message.guest_instance_id, method = %message.method, "Delivered");
        }
    }

    fn guest_handle(&self, guest: GuestInstanceId) -> Option<Arc<dyn GuestHandle>> {
        let url = self.guests.lock().get(&guest).map(|g| Arc::clone(&g.url))?;
        Some(Arc::new(LoopbackHandle { url }))
    }
}

/// Blocking call target for one loopback guest.
struct LoopbackHandle {
    url: Arc<Mutex<String>>,
}

impl GuestHandle for LoopbackHandle {
    fn call(&self, method: &str, args: &[Value]) -> Result<Value, String> {
        match method {
            "getURL" => Ok(json!(self.url.lock().clone())),
            "loadURL" => {
                let url = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| "loadURL needs a url".to_string())?;
                *self.url.lock() = url.to_string();
                Ok(Value::Null)
            }
            "isLoading" | "isCrashed" | "canGoBack" | "canGoForward" => Ok(json!(false)),
            _ => Ok(Value::Null),
        }
    }
}
