//! Guest view host - headless entry point.
//!
//! Starts the engine runtime against the loopback guest service and walks
//! one element through its lifecycle: mount, guest creation, plugin
//! attachment, method calls, navigation and teardown.

mod headless;
mod loopback;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use guestview_core::{ElementHandle, EngineConfig, InternalInstanceId, Size};
use guestview_engine::{ElementEvent, EventHandler, HostEvent, LifecycleState, MethodOutcome};
use guestview_runtime::{EngineClient, RuntimeClient, RuntimeError, RuntimeResult};

use headless::HeadlessElement;
use loopback::LoopbackBackend;

const DEFAULT_URL: &str = "https://example.com/";

// =============================================================================
// Demo Scenario
// =============================================================================

/// Poll until the element has an attached guest.
async fn wait_for_guest(client: &RuntimeClient, handle: ElementHandle) -> RuntimeResult<()> {
    for _ in 0..50 {
        if let LifecycleState::GuestAttached { guest, .. } = client.state(handle).await? {
            tracing::info!(%handle, %guest, "Guest attached");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Err(RuntimeError::Timeout {
        duration: Duration::from_secs(1),
    })
}

async fn run(config: &EngineConfig, url: String) -> RuntimeResult<()> {
    let backend = Arc::new(LoopbackBackend::new());
    let runtime = Arc::new(guestview_runtime::start(config, backend.clone())?);
    let client = RuntimeClient::new(runtime.clone()).with_timeout(config.runtime.request_timeout());

    // Element with a source, before it is mounted.
    let (element, controller) = HeadlessElement::new(Size::new(640, 480));
    controller.set_attribute("src", &url)?;
    let handle = client.create_element(Box::new(element)).await?;
    controller.observe(handle, runtime.sender());

    let on_console: EventHandler = Arc::new(|event: &HostEvent| {
        if let HostEvent::Guest { payload, .. } = event {
            tracing::info!(text = %payload["message"], "Guest console");
        }
    });
    client
        .set_event_handler(handle, "onconsole-message".to_string(), Some(on_console))
        .await?;

    client.dispatch(handle, ElementEvent::Mounted).await?;

    let outcome = client
        .invoke(
            handle,
            "executeJavaScript".to_string(),
            vec![serde_json::json!("document.title")],
        )
        .await?;
    tracing::info!(?outcome, "executeJavaScript before attach");

    // The renderer hands out the plugin slot.
    client
        .dispatch(handle, ElementEvent::plugin_attached(InternalInstanceId::new(1)))
        .await?;
    wait_for_guest(&client, handle).await?;

    if let MethodOutcome::Returned(current) = client.invoke(handle, "getURL".to_string(), vec![]).await? {
        tracing::info!(url = %current, "getURL");
    }

    // Navigate by attribute, as page script would.
    controller.set_attribute("src", "https://example.org/")?;
    if let MethodOutcome::Returned(current) = client.invoke(handle, "getURL".to_string(), vec![]).await? {
        tracing::info!(url = %current, "getURL after navigation");
    }

    runtime.sender().zoom_level_changed(1.5)?;

    if let Some(snapshot) = client.snapshot(handle).await? {
        match serde_json::to_string(&snapshot) {
            Ok(json) => tracing::info!(snapshot = %json, "Instance state"),
            Err(e) => tracing::warn!("Failed to serialize snapshot: {}", e),
        }
    }

    client.remove_element(handle).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    tracing::info!(guests = backend.guest_count(), "Element removed");

    runtime.shutdown();
    Ok(())
}

// =============================================================================
// Entry Point
// =============================================================================

fn main() -> ExitCode {
    let loaded = EngineConfig::load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // RUST_LOG wins over the configured filter.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .init();

    if let Err(e) = &loaded {
        tracing::error!("Config error: {} - continuing with defaults", e);
    }
    tracing::info!("Guest view host starting...");

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let url = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    match rt.block_on(run(&config, url)) {
        Ok(()) => {
            tracing::info!("Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Host failed: {}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
