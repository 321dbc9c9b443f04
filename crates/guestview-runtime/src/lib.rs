//! Runtime wiring for the guest view engine.
//!
//! The engine itself is synchronous and single-owner. This crate runs it on
//! a dedicated OS thread and connects it to async guest services:
//!
//! ```text
//! host events ──► RuntimeSender ──► engine thread ──► QueuedGuestService ──► backend
//!                      ▲                  │
//!                      │                  └──► ChannelTransport ──► message pump ──► backend
//!                      └── creation results, guest events ◄──────────────────────────┘
//! ```

pub mod backend;
pub mod client;
mod error;
pub mod runtime;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::runtime::Handle;

use guestview_core::EngineConfig;
use guestview_engine::{ChannelTransport, ViewRegistry};

pub use backend::{spawn_message_pump, GuestEventSink, GuestViewBackend, QueuedGuestService};
pub use client::{EngineClient, RuntimeClient};
pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{EngineRequest, EngineRuntime, RuntimeSender};

/// Start the engine runtime against an async backend.
///
/// Must be called from within a tokio runtime; the command worker and the
/// message pump are spawned on it.
pub fn start(
    config: &EngineConfig,
    backend: Arc<dyn GuestViewBackend>,
) -> RuntimeResult<EngineRuntime> {
    let handle = Handle::try_current().map_err(|e| RuntimeError::NoReactor(e.to_string()))?;

    let runtime = EngineRuntime::new(|sender| {
        let (transport, rx) = ChannelTransport::new();
        spawn_message_pump(&handle, rx, Arc::clone(&backend));
        let service = QueuedGuestService::spawn(&handle, backend, sender);
        Ok(ViewRegistry::new(
            Arc::new(service),
            Arc::new(transport),
            config,
        )?)
    })?;

    tracing::info!(
        blocking = config.methods.blocking.len(),
        non_blocking = config.methods.non_blocking.len(),
        "Engine runtime started"
    );
    Ok(runtime)
}
