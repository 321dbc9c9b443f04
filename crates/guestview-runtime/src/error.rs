//! Runtime errors.

use std::time::Duration;
use thiserror::Error;

use guestview_core::{ConfigError, EngineError};

/// Errors from calling into the engine runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime thread did not answer in time.
    #[error("Engine runtime timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// The runtime thread has shut down.
    #[error("Engine runtime unavailable")]
    Unavailable,

    /// Called outside a tokio runtime context.
    #[error("No tokio runtime: {0}")]
    NoReactor(String),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    Channel(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
