//! Raiden SDK
//!
//! Shared library providing the error types used across Raiden components.
//! This crate is used by the engine and by anything embedding the engine.

/// Error types and handling
pub mod errors;

// Re-export commonly used types
pub use errors::{EngineError, RaidenErrorExt};
