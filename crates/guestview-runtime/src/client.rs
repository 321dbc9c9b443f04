//! Async client surface for embedders.
//!
//! The `EngineClient` trait returns futures so callers can spawn them on
//! whatever executor drives their UI. `RuntimeClient` is the real
//! implementation on top of [`EngineRuntime`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use guestview_core::ElementHandle;
use guestview_engine::{
    ElementEvent, EventHandler, HostElement, InstanceSnapshot, LifecycleState, MethodOutcome,
};

use crate::error::RuntimeResult;
use crate::runtime::EngineRuntime;

// =============================================================================
// Client Trait
// =============================================================================

/// Async operations on the element registry.
pub trait EngineClient: Send + Sync {
    /// Register a new host element. It starts detached.
    fn create_element(
        &self,
        host: Box<dyn HostElement>,
    ) -> BoxFuture<'static, RuntimeResult<ElementHandle>>;

    /// Apply a host event and wait until it has been handled.
    fn dispatch(
        &self,
        handle: ElementHandle,
        event: ElementEvent,
    ) -> BoxFuture<'static, RuntimeResult<()>>;

    /// Invoke a forwarded guest method.
    fn invoke(
        &self,
        handle: ElementHandle,
        method: String,
        args: Vec<Value>,
    ) -> BoxFuture<'static, RuntimeResult<MethodOutcome>>;

    /// Set or clear an `on<event>` property. Returns the previous handler.
    fn set_event_handler(
        &self,
        handle: ElementHandle,
        property: String,
        handler: Option<EventHandler>,
    ) -> BoxFuture<'static, RuntimeResult<Option<EventHandler>>>;

    fn state(&self, handle: ElementHandle) -> BoxFuture<'static, RuntimeResult<LifecycleState>>;

    fn snapshot(
        &self,
        handle: ElementHandle,
    ) -> BoxFuture<'static, RuntimeResult<Option<InstanceSnapshot>>>;

    /// Unmount and forget an element.
    fn remove_element(&self, handle: ElementHandle) -> BoxFuture<'static, RuntimeResult<()>>;
}

// =============================================================================
// Runtime Client
// =============================================================================

/// Client backed by the engine runtime thread.
pub struct RuntimeClient {
    runtime: Arc<EngineRuntime>,
    timeout: Duration,
}

impl RuntimeClient {
    pub fn new(runtime: Arc<EngineRuntime>) -> Self {
        Self {
            runtime,
            timeout: Duration::from_secs(5),
        }
    }

    /// Create with a custom timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn runtime(&self) -> &Arc<EngineRuntime> {
        &self.runtime
    }
}

impl EngineClient for RuntimeClient {
    fn create_element(
        &self,
        host: Box<dyn HostElement>,
    ) -> BoxFuture<'static, RuntimeResult<ElementHandle>> {
        let runtime = self.runtime.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            runtime
                .with_registry_timeout(timeout, move |registry| registry.create_element(host))
                .await
        })
    }

    fn dispatch(
        &self,
        handle: ElementHandle,
        event: ElementEvent,
    ) -> BoxFuture<'static, RuntimeResult<()>> {
        let runtime = self.runtime.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            runtime
                .with_registry_timeout(timeout, move |registry| registry.dispatch(handle, event))
                .await??;
            Ok(())
        })
    }

    fn invoke(
        &self,
        handle: ElementHandle,
        method: String,
        args: Vec<Value>,
    ) -> BoxFuture<'static, RuntimeResult<MethodOutcome>> {
        let runtime = self.runtime.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let outcome = runtime
                .with_registry_timeout(timeout, move |registry| {
                    registry.invoke(handle, &method, args)
                })
                .await??;
            Ok(outcome)
        })
    }

    fn set_event_handler(
        &self,
        handle: ElementHandle,
        property: String,
        handler: Option<EventHandler>,
    ) -> BoxFuture<'static, RuntimeResult<Option<EventHandler>>> {
        let runtime = self.runtime.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let previous = runtime
                .with_registry_timeout(timeout, move |registry| {
                    registry.set_event_handler(handle, &property, handler)
                })
                .await??;
            Ok(previous)
        })
    }

    fn state(&self, handle: ElementHandle) -> BoxFuture<'static, RuntimeResult<LifecycleState>> {
        let runtime = self.runtime.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            runtime
                .with_registry_timeout(timeout, move |registry| registry.state(handle))
                .await
        })
    }

    fn snapshot(
        &self,
        handle: ElementHandle,
    ) -> BoxFuture<'static, RuntimeResult<Option<InstanceSnapshot>>> {
        let runtime = self.runtime.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            runtime
                .with_registry_timeout(timeout, move |registry| registry.snapshot(handle))
                .await
        })
    }

    fn remove_element(&self, handle: ElementHandle) -> BoxFuture<'static, RuntimeResult<()>> {
        let runtime = self.runtime.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            runtime
                .with_registry_timeout(timeout, move |registry| registry.remove_element(handle))
                .await??;
            Ok(())
        })
    }
}
