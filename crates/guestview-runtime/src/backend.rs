//! Async Guest View backend adapters.
//!
//! The engine drives a synchronous [`GuestViewService`]. Real guest services
//! are async, so [`QueuedGuestService`] puts every call on one queue drained
//! by a single tokio task. Creation results are posted back to the runtime
//! thread as events, which serializes them with everything else.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use guestview_core::{
    GuestInstanceId, GuestParams, InternalInstanceId, Size, SizeParams, ViewInstanceId,
};
use guestview_engine::{CreateTicket, GuestEvent, GuestHandle, GuestMessage, GuestViewService};

use crate::error::RuntimeResult;
use crate::runtime::RuntimeSender;

// =============================================================================
// Backend Trait
// =============================================================================

/// Where a backend reports guest-originated events for one view.
#[derive(Debug, Clone)]
pub struct GuestEventSink {
    view: ViewInstanceId,
    sender: RuntimeSender,
}

impl GuestEventSink {
    pub fn view_instance_id(&self) -> ViewInstanceId {
        self.view
    }

    /// Report a guest event for this view.
    pub fn emit(&self, event: GuestEvent) -> RuntimeResult<()> {
        self.sender.guest_event(self.view, event)
    }

    /// Report an intrinsic size change of a rendering slot.
    pub fn element_resized(&self, internal: InternalInstanceId, size: Size) -> RuntimeResult<()> {
        self.sender.element_resized(internal, size)
    }
}

/// Async Guest View Service.
#[async_trait]
pub trait GuestViewBackend: Send + Sync {
    async fn create_guest(&self, params: GuestParams) -> Result<GuestInstanceId, String>;

    async fn destroy_guest(&self, guest: GuestInstanceId);

    async fn attach_guest(
        &self,
        internal: InternalInstanceId,
        guest: GuestInstanceId,
        params: GuestParams,
    );

    async fn set_size(&self, guest: GuestInstanceId, size: SizeParams);

    /// Start delivering guest events for `events.view_instance_id()`.
    async fn register_events(&self, events: GuestEventSink);

    async fn deregister_events(&self, view: ViewInstanceId);

    /// Deliver a non-blocking method call.
    async fn deliver(&self, message: GuestMessage);

    /// Resolve a handle for blocking calls. Must not block on the backend queue.
    fn guest_handle(&self, guest: GuestInstanceId) -> Option<Arc<dyn GuestHandle>>;
}

// =============================================================================
// Queued Service
// =============================================================================

enum GuestCommand {
    Create {
        ticket: CreateTicket,
        params: GuestParams,
    },
    Destroy(GuestInstanceId),
    Attach {
        internal: InternalInstanceId,
        guest: GuestInstanceId,
        params: GuestParams,
    },
    SetSize {
        guest: GuestInstanceId,
        size: SizeParams,
    },
    RegisterEvents(GuestEventSink),
    DeregisterEvents(ViewInstanceId),
}

/// [`GuestViewService`] that forwards to an async backend, in call order.
pub struct QueuedGuestService {
    tx: mpsc::UnboundedSender<GuestCommand>,
    backend: Arc<dyn GuestViewBackend>,
    sender: RuntimeSender,
}

impl QueuedGuestService {
    /// Start the command worker on `runtime`.
    pub fn spawn(runtime: &Handle, backend: Arc<dyn GuestViewBackend>, sender: RuntimeSender) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(run_commands(rx, Arc::clone(&backend), sender.clone()));
        Self {
            tx,
            backend,
            sender,
        }
    }

    fn queue(&self, command: GuestCommand) {
        if self.tx.send(command).is_err() {
            tracing::error!("Guest command worker is gone, dropping command");
        }
    }
}

impl GuestViewService for QueuedGuestService {
    fn create_guest(&self, ticket: CreateTicket, params: GuestParams) {
        self.queue(GuestCommand::Create { ticket, params });
    }

    fn destroy_guest(&self, guest: GuestInstanceId) {
        self.queue(GuestCommand::Destroy(guest));
    }

    fn attach_guest(
        &self,
        internal: InternalInstanceId,
        guest: GuestInstanceId,
        params: GuestParams,
    ) {
        self.queue(GuestCommand::Attach {
            internal,
            guest,
            params,
        });
    }

    fn set_size(&self, guest: GuestInstanceId, size: SizeParams) {
        self.queue(GuestCommand::SetSize { guest, size });
    }

    fn register_events(&self, view: ViewInstanceId) {
        self.queue(GuestCommand::RegisterEvents(GuestEventSink {
            view,
            sender: self.sender.clone(),
        }));
    }

    fn deregister_events(&self, view: ViewInstanceId) {
        self.queue(GuestCommand::DeregisterEvents(view));
    }

    fn guest_handle(&self, guest: GuestInstanceId) -> Option<Arc<dyn GuestHandle>> {
        self.backend.guest_handle(guest)
    }
}

async fn run_commands(
    mut rx: mpsc::UnboundedReceiver<GuestCommand>,
    backend: Arc<dyn GuestViewBackend>,
    sender: RuntimeSender,
) {
    while let Some(command) = rx.recv().await {
        match command {
            GuestCommand::Create { ticket, params } => {
                let result = backend.create_guest(params).await;
                if let Err(e) = sender.guest_created(ticket, result) {
                    tracing::warn!(view = %ticket.view_instance_id, "Dropping creation result: {}", e);
                }
            }
            GuestCommand::Destroy(guest) => backend.destroy_guest(guest).await,
            GuestCommand::Attach {
                internal,
                guest,
                params,
            } => backend.attach_guest(internal, guest, params).await,
            GuestCommand::SetSize { guest, size } => backend.set_size(guest, size).await,
            GuestCommand::RegisterEvents(events) => backend.register_events(events).await,
            GuestCommand::DeregisterEvents(view) => backend.deregister_events(view).await,
        }
    }
    tracing::debug!("Guest command worker stopped");
}

// =============================================================================
// Message Pump
// =============================================================================

/// Deliver non-blocking calls to the backend one at a time, in send order.
///
/// Ends when every transport sender is dropped.
pub fn spawn_message_pump(
    runtime: &Handle,
    mut rx: mpsc::UnboundedReceiver<GuestMessage>,
    backend: Arc<dyn GuestViewBackend>,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        while let Some(message) = rx.recv().await {
            backend.deliver(message).await;
        }
        tracing::debug!("Message pump stopped");
    })
}
