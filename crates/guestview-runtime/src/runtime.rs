//! Engine runtime on a dedicated OS thread.
//!
//! Every engine input goes through one queue and is handled on one thread,
//! so the events of an element are applied in arrival order and no two
//! flows ever touch an instance at the same time. Async callers get their
//! answers back over oneshot channels.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::oneshot;

use guestview_core::{
    ElementHandle, EngineError, GuestInstanceId, InternalInstanceId, Size, ViewInstanceId,
};
use guestview_engine::{CreateTicket, ElementEvent, GuestEvent, ViewRegistry};

use crate::error::{RuntimeError, RuntimeResult};

/// Type alias for closures run against the registry.
type RegistryFn = Box<dyn FnOnce(&ViewRegistry) + Send>;

/// Request types for the engine runtime thread.
pub enum EngineRequest {
    /// Run arbitrary code against the registry.
    WithRegistry(RegistryFn),

    /// Host platform event for one element.
    Element {
        handle: ElementHandle,
        event: ElementEvent,
    },

    /// Intrinsic size change, keyed by plugin attachment id.
    ElementResized {
        internal: InternalInstanceId,
        size: Size,
    },

    /// `create_guest` finished.
    GuestCreated {
        ticket: CreateTicket,
        result: Result<GuestInstanceId, String>,
    },

    /// Guest-originated event, keyed by view instance id.
    Guest {
        view: ViewInstanceId,
        event: GuestEvent,
    },

    /// Host zoom level broadcast.
    ZoomLevelChanged(f64),

    Shutdown,
}

/// Cheap handle for posting events to the runtime thread without waiting.
#[derive(Debug, Clone)]
pub struct RuntimeSender {
    tx: mpsc::Sender<EngineRequest>,
}

impl RuntimeSender {
    pub fn element_event(&self, handle: ElementHandle, event: ElementEvent) -> RuntimeResult<()> {
        self.post(EngineRequest::Element { handle, event })
    }

    pub fn element_resized(&self, internal: InternalInstanceId, size: Size) -> RuntimeResult<()> {
        self.post(EngineRequest::ElementResized { internal, size })
    }

    pub fn guest_created(
        &self,
        ticket: CreateTicket,
        result: Result<GuestInstanceId, String>,
    ) -> RuntimeResult<()> {
        self.post(EngineRequest::GuestCreated { ticket, result })
    }

    pub fn guest_event(&self, view: ViewInstanceId, event: GuestEvent) -> RuntimeResult<()> {
        self.post(EngineRequest::Guest { view, event })
    }

    pub fn zoom_level_changed(&self, level: f64) -> RuntimeResult<()> {
        self.post(EngineRequest::ZoomLevelChanged(level))
    }

    fn post(&self, request: EngineRequest) -> RuntimeResult<()> {
        self.tx.send(request).map_err(|_| RuntimeError::Unavailable)
    }
}

/// Engine runtime that owns the [`ViewRegistry`] on a dedicated OS thread.
pub struct EngineRuntime {
    sender: RuntimeSender,
    _handle: JoinHandle<()>,
}

impl EngineRuntime {
    /// Build the registry and start the runtime thread.
    ///
    /// `build` receives a sender so collaborators can post results back.
    /// MUST use std::thread, NOT tokio::spawn: the thread blocks on its queue.
    pub fn new<F>(build: F) -> RuntimeResult<Self>
    where
        F: FnOnce(RuntimeSender) -> RuntimeResult<ViewRegistry>,
    {
        let (tx, rx) = mpsc::channel();
        let sender = RuntimeSender { tx };
        let registry = build(sender.clone())?;

        let handle = thread::Builder::new()
            .name("guestview-engine".to_string())
            .spawn(move || run(registry, rx))
            .map_err(|e| RuntimeError::Channel(e.to_string()))?;

        Ok(Self {
            sender,
            _handle: handle,
        })
    }

    /// Sender for fire-and-forget events.
    pub fn sender(&self) -> RuntimeSender {
        self.sender.clone()
    }

    /// Execute arbitrary code on the runtime thread and wait for its result.
    pub async fn with_registry<F, T>(&self, f: F) -> RuntimeResult<T>
    where
        F: FnOnce(&ViewRegistry) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (resp_tx, resp_rx) = oneshot::channel();

        let func: RegistryFn = Box::new(move |registry| {
            let _ = resp_tx.send(f(registry));
        });
        self.sender.post(EngineRequest::WithRegistry(func))?;

        resp_rx.await.map_err(|e| RuntimeError::Channel(e.to_string()))
    }

    /// Execute with timeout wrapper.
    ///
    /// If the timeout expires, returns `RuntimeError::Timeout`. The closure
    /// still runs when the thread gets to it.
    pub async fn with_registry_timeout<F, T>(&self, timeout: Duration, f: F) -> RuntimeResult<T>
    where
        F: FnOnce(&ViewRegistry) -> T + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(timeout, self.with_registry(f)).await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::Timeout { duration: timeout }),
        }
    }

    /// Shutdown the runtime thread. Queued requests ahead of it still run.
    pub fn shutdown(&self) {
        let _ = self.sender.post(EngineRequest::Shutdown);
    }
}

impl Drop for EngineRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(registry: ViewRegistry, rx: mpsc::Receiver<EngineRequest>) {
    tracing::info!("Engine runtime thread started");

    while let Ok(request) = rx.recv() {
        let result = match request {
            EngineRequest::WithRegistry(func) => {
                func(&registry);
                Ok(())
            }
            EngineRequest::Element { handle, event } => registry.dispatch(handle, event),
            EngineRequest::ElementResized { internal, size } => {
                registry.dispatch_element_resize(internal, size)
            }
            EngineRequest::GuestCreated { ticket, result } => registry.guest_created(ticket, result),
            EngineRequest::Guest { view, event } => registry.dispatch_guest_event(view, event),
            EngineRequest::ZoomLevelChanged(level) => {
                registry.broadcast_zoom_level(level);
                Ok(())
            }
            EngineRequest::Shutdown => {
                tracing::info!(elements = registry.len(), "Engine runtime thread shutting down");
                break;
            }
        };

        if let Err(error) = result {
            report(&error);
        }
    }
}

fn report(error: &EngineError) {
    if error.is_local() {
        tracing::debug!(code = error.error_code(), %error, "Rejected engine input");
    } else {
        tracing::warn!(code = error.error_code(), %error, "Engine event failed");
    }
}
