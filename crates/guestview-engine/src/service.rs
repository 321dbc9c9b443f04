//! Collaborator interfaces.
//!
//! The engine never creates guests, lays out elements or moves bytes itself.
//! It drives these traits, and the integration feeds results back in as
//! [`ElementEvent`](crate::lifecycle::ElementEvent)s.
//!
//! Implementations must not call back into the [`ViewRegistry`](crate::ViewRegistry)
//! for the same element from inside these methods. Queue the event instead:
//! the instance is locked while its collaborators run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use guestview_core::{
    EngineError, GuestInstanceId, GuestParams, InternalInstanceId, Size, SizeParams,
    ViewInstanceId,
};

use crate::events::HostEvent;
use crate::transport::GuestMessage;

// =============================================================================
// Guest View Service
// =============================================================================

/// Identifies one guest-creation request.
///
/// `generation` is bumped on every reset, so a completion for a request
/// made before the reset no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreateTicket {
    pub view_instance_id: ViewInstanceId,
    pub generation: u64,
}

/// Handle to a live guest for blocking calls.
#[cfg_attr(test, mockall::automock)]
pub trait GuestHandle: Send + Sync {
    /// Call `method` on the guest and wait for its result.
    fn call(&self, method: &str, args: &[Value]) -> Result<Value, String>;
}

/// The out-of-process service that owns guest surfaces.
///
/// `create_guest` is asynchronous: the result comes back later as
/// `ElementEvent::GuestCreated` carrying the same ticket.
#[cfg_attr(test, mockall::automock)]
pub trait GuestViewService: Send + Sync {
    fn create_guest(&self, ticket: CreateTicket, params: GuestParams);

    fn destroy_guest(&self, guest: GuestInstanceId);

    /// Bind a plugin attachment handle to a guest. Called at most once per created guest.
    fn attach_guest(
        &self,
        internal: InternalInstanceId,
        guest: GuestInstanceId,
        params: GuestParams,
    );

    fn set_size(&self, guest: GuestInstanceId, size: SizeParams);

    /// Start delivering guest-originated events for `view` to the engine.
    fn register_events(&self, view: ViewInstanceId);

    fn deregister_events(&self, view: ViewInstanceId);

    /// Resolve a callable handle for blocking method dispatch.
    fn guest_handle(&self, guest: GuestInstanceId) -> Option<Arc<dyn GuestHandle>>;
}

// =============================================================================
// Host Element
// =============================================================================

/// The host platform's view of one element.
#[cfg_attr(test, mockall::automock)]
pub trait HostElement: Send {
    /// Current attribute string, `None` when absent.
    fn attribute(&self, name: &str) -> Option<String>;

    /// Write (or remove, for `None`) a host attribute.
    ///
    /// The platform reports the change back as an `AttributeChanged` event.
    fn set_attribute(&mut self, name: &str, value: Option<String>);

    /// Rendered box size. Zero when the element is not laid out.
    fn rendered_size(&self) -> Size;

    /// Computed style width/height. Zero when not explicitly sized.
    fn computed_style_size(&self) -> Size;

    /// Set the element's visual size.
    fn set_visual_size(&mut self, size: Size);

    /// Fire an event at the element's platform listeners.
    fn dispatch_event(&mut self, event: &HostEvent);
}

// =============================================================================
// Async Transport
// =============================================================================

/// One-way channel for non-blocking guest calls.
///
/// Messages sent through one sink must be delivered in send order.
#[cfg_attr(test, mockall::automock)]
pub trait GuestMessageSink: Send + Sync {
    fn send(&self, message: GuestMessage) -> Result<(), EngineError>;
}
