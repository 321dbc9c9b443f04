//! Lifecycle and synchronization engine for embedded guest surfaces.
//!
//! This crate keeps a host element and an out-of-process guest surface in sync:
//! - Attribute Registry with one-shot mutation suppression
//! - Resize Coordinator for layout and intrinsic size changes
//! - Lifecycle State Machine reconciling view, plugin and guest ids
//! - Method Dispatch Bridge for blocking and non-blocking guest calls
//! - Element registry routing collaborator callbacks to instances

pub mod attributes;
pub mod dispatch;
pub mod events;
pub mod lifecycle;
pub mod registry;
pub mod resize;
pub mod service;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use attributes::{AttributeDescriptor, AttributeEffect, AttributeRegistry, MutationContext};
pub use dispatch::{AsyncOutbox, MethodClass, MethodOutcome, MethodTable};
pub use events::{property_name, EventHandler, HostEvent, OnHandlers};
pub use lifecycle::{
    Collaborators, ElementEvent, GuestEvent, InstanceSnapshot, LifecycleState, ViewInstance,
};
pub use registry::ViewRegistry;
pub use resize::ResizeDecision;
pub use service::{CreateTicket, GuestHandle, GuestMessageSink, GuestViewService, HostElement};
pub use transport::{ChannelTransport, GuestMessage, ASYNC_CALL_CHANNEL};

// Re-export guestview_core types for convenience
pub use guestview_core::{
    ElementHandle, EngineConfig, EngineError, EngineResult, GuestInstanceId, GuestParams,
    InternalInstanceId, Size, SizeParams, ViewInstanceId,
};
