//! Lifecycle states and the inputs that drive them.

use serde::Serialize;
use serde_json::{json, Value};

use guestview_core::{GuestInstanceId, InternalInstanceId, Size, ViewInstanceId};

use crate::events::HostEvent;
use crate::service::CreateTicket;

// =============================================================================
// States
// =============================================================================

/// Where an instance is in the three-id reconciliation.
///
/// Every id the instance holds lives inside the variant that needs it, so a
/// state cannot claim a guest it does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum LifecycleState {
    /// No host element bound.
    Unbound,

    /// Element exists but is not mounted.
    Detached,

    /// Mounted, no plugin attachment id yet, no guest.
    AttachedNoPlugin,

    /// Plugin attachment id known, no guest.
    PluginReady { internal: InternalInstanceId },

    /// `create_guest` in flight. The plugin id may or may not be known.
    GuestRequested {
        ticket: CreateTicket,
        internal: Option<InternalInstanceId>,
    },

    /// Guest created, waiting for the plugin attachment id.
    GuestAwaitingPlugin { guest: GuestInstanceId },

    /// Both ids known and `attach_guest` issued.
    GuestAttached {
        internal: InternalInstanceId,
        guest: GuestInstanceId,
    },
}

impl LifecycleState {
    pub fn internal_instance_id(&self) -> Option<InternalInstanceId> {
        match *self {
            LifecycleState::PluginReady { internal }
            | LifecycleState::GuestAttached { internal, .. } => Some(internal),
            LifecycleState::GuestRequested { internal, .. } => internal,
            _ => None,
        }
    }

    pub fn guest_instance_id(&self) -> Option<GuestInstanceId> {
        match *self {
            LifecycleState::GuestAwaitingPlugin { guest }
            | LifecycleState::GuestAttached { guest, .. } => Some(guest),
            _ => None,
        }
    }

    /// Ticket of the in-flight creation request.
    pub fn pending_ticket(&self) -> Option<CreateTicket> {
        match *self {
            LifecycleState::GuestRequested { ticket, .. } => Some(ticket),
            _ => None,
        }
    }

    /// Neither a guest nor a creation request.
    pub fn is_idle(&self) -> bool {
        self.guest_instance_id().is_none() && self.pending_ticket().is_none()
    }

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Unbound => "unbound",
            LifecycleState::Detached => "detached",
            LifecycleState::AttachedNoPlugin => "attached-no-plugin",
            LifecycleState::PluginReady { .. } => "plugin-ready",
            LifecycleState::GuestRequested { .. } => "guest-requested",
            LifecycleState::GuestAwaitingPlugin { .. } => "guest-awaiting-plugin",
            LifecycleState::GuestAttached { .. } => "guest-attached",
        }
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// Everything the host platform and the guest side can tell an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEvent {
    /// Host element inserted into the document.
    Mounted,

    /// Host element removed from the document.
    Unmounted,

    /// An attribute on the host element changed.
    AttributeChanged {
        name: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },

    /// An attribute on the plugin attachment element changed.
    PluginAttributeChanged {
        name: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },

    /// Host layout proposes a new size. Subject to autosize bounds.
    LayoutResized(Size),

    /// Rendering slot reports a new intrinsic size. Never clamped.
    ElementResized(Size),

    /// Result of `create_guest`.
    GuestCreated {
        ticket: CreateTicket,
        result: Result<GuestInstanceId, String>,
    },

    /// Event raised by the guest.
    Guest(GuestEvent),

    /// Host zoom level broadcast.
    ZoomLevelChanged(f64),
}

impl ElementEvent {
    pub fn attribute_changed(name: &str, old_value: Option<&str>, new_value: Option<&str>) -> Self {
        ElementEvent::AttributeChanged {
            name: name.to_string(),
            old_value: old_value.map(str::to_string),
            new_value: new_value.map(str::to_string),
        }
    }

    /// The plugin attachment element was assigned `internal`.
    pub fn plugin_attached(internal: InternalInstanceId) -> Self {
        ElementEvent::PluginAttributeChanged {
            name: crate::attributes::names::INTERNAL_INSTANCE_ID.to_string(),
            old_value: None,
            new_value: Some(internal.get().to_string()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ElementEvent::Mounted => "mounted",
            ElementEvent::Unmounted => "unmounted",
            ElementEvent::AttributeChanged { .. } => "attribute-changed",
            ElementEvent::PluginAttributeChanged { .. } => "plugin-attribute-changed",
            ElementEvent::LayoutResized(_) => "layout-resized",
            ElementEvent::ElementResized(_) => "element-resized",
            ElementEvent::GuestCreated { .. } => "guest-created",
            ElementEvent::Guest(_) => "guest-event",
            ElementEvent::ZoomLevelChanged(_) => "zoom-level-changed",
        }
    }
}

/// Guest-originated event, delivered by view instance id.
#[derive(Debug, Clone, PartialEq)]
pub enum GuestEvent {
    LoadCommit { url: String, is_main_frame: bool },

    /// Guest attached; carries the storage partition it ended up in.
    DidAttach { partition: Option<String> },

    /// Guest's intrinsic content size changed.
    SizeChanged(Size),

    /// Anything else, forwarded to listeners untouched.
    Other { name: String, payload: Value },
}

impl GuestEvent {
    pub fn name(&self) -> &str {
        match self {
            GuestEvent::LoadCommit { .. } => "load-commit",
            GuestEvent::DidAttach { .. } => "did-attach",
            GuestEvent::SizeChanged(_) => "size-changed",
            GuestEvent::Other { name, .. } => name,
        }
    }

    /// Host-facing form of the event.
    pub fn to_host_event(&self) -> HostEvent {
        let payload = match self {
            GuestEvent::LoadCommit { url, is_main_frame } => {
                json!({ "url": url, "isMainFrame": is_main_frame })
            }
            GuestEvent::DidAttach { partition } => json!({ "partition": partition }),
            GuestEvent::SizeChanged(size) => {
                json!({ "newWidth": size.width, "newHeight": size.height })
            }
            GuestEvent::Other { payload, .. } => payload.clone(),
        };
        HostEvent::Guest {
            name: self.name().to_string(),
            payload,
        }
    }
}

/// Read-only view of an instance, for logging and inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSnapshot {
    pub view_instance_id: ViewInstanceId,
    pub internal_instance_id: Option<InternalInstanceId>,
    pub guest_instance_id: Option<GuestInstanceId>,
    pub element_attached: bool,
    pub before_first_navigation: bool,
    pub generation: u64,
    pub state: LifecycleState,
    pub queued_calls: usize,
}
