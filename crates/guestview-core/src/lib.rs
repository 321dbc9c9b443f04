//! Core types for the guest view embedding engine.
//!
//! This crate contains shared data structures used across all guestview crates:
//! - Identifier newtypes and the process-wide id allocator
//! - Sizes and size bounds
//! - Guest construction parameters
//! - Configuration types
//! - Error types

mod config;
mod error;
mod geometry;
mod ids;
mod params;

pub use config::{
    config_dir, config_path, EngineConfig, LoggingConfig, MethodConfig, RuntimeConfig,
};
pub use error::{ConfigError, EngineError, EngineResult};
pub use geometry::{Size, SizeBounds, SizeParams};
pub use ids::{
    ElementHandle, GuestInstanceId, IdAllocator, InternalInstanceId, ViewInstanceId,
};
pub use params::{AttributeValue, GuestParams};
