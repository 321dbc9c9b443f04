//! Error types for the guest view engine.

use serde::Serialize;
use thiserror::Error;

use crate::ids::{ElementHandle, ViewInstanceId};

/// Engine errors.
///
/// `InvalidAttribute`, `StaleCompletion` and `DuplicateGuestRequest` are
/// handled where they occur: the input is rejected and nothing reaches the
/// guest. The rest are surfaced to whoever called into the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Attribute value failed validation. The attribute keeps its previous value.
    #[error("Invalid value {value:?} for attribute '{name}': {reason}")]
    InvalidAttribute {
        name: String,
        value: String,
        reason: String,
    },

    /// A public method was invoked in a state that cannot serve it.
    #[error("Cannot call '{method}': {reason}")]
    PreconditionViolation { method: String, reason: String },

    /// A guest-creation completion arrived for a request the instance no longer expects.
    #[error(
        "Stale guest creation for {view_instance_id} (request generation {request_generation}, current {current_generation})"
    )]
    StaleCompletion {
        view_instance_id: ViewInstanceId,
        request_generation: u64,
        current_generation: u64,
    },

    /// Guest creation was requested while one is pending or attached.
    #[error("{view_instance_id} already has a guest requested or attached")]
    DuplicateGuestRequest { view_instance_id: ViewInstanceId },

    /// No instance is bound to the element handle.
    #[error("Unknown element: {0}")]
    UnknownElement(ElementHandle),

    /// Method name is in neither forwarding table.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// No `on<event>` property with that name.
    #[error("Unknown event property: {0}")]
    UnknownEvent(String),

    /// The guest returned an error from a blocking call.
    #[error("Guest call '{method}' failed: {message}")]
    GuestCall { method: String, message: String },

    /// Async message transport is closed.
    #[error("Channel error: {0}")]
    Channel(String),
}

impl EngineError {
    /// Stable error code for structured logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::InvalidAttribute { .. } => "invalid_attribute",
            EngineError::PreconditionViolation { .. } => "precondition_violation",
            EngineError::StaleCompletion { .. } => "stale_completion",
            EngineError::DuplicateGuestRequest { .. } => "duplicate_guest_request",
            EngineError::UnknownElement(_) => "unknown_element",
            EngineError::UnknownMethod(_) => "unknown_method",
            EngineError::UnknownEvent(_) => "unknown_event",
            EngineError::GuestCall { .. } => "guest_call",
            EngineError::Channel(_) => "channel",
        }
    }

    /// Whether the error is fully handled by rejecting the input.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidAttribute { .. }
                | EngineError::StaleCompletion { .. }
                | EngineError::DuplicateGuestRequest { .. }
        )
    }
}

/// Serialize as `{ "kind": ..., "message": ... }` for host integrations.
impl Serialize for EngineError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("EngineError", 2)?;
        state.serialize_field("kind", self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config directory found.
    #[error("Config directory not found")]
    NoConfigDir,

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Method tables overlap or contain empty names.
    #[error("Invalid method table: {0}")]
    InvalidMethodTable(String),
}
