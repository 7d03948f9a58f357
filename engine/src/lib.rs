//! Raiden Engine Library
//!
//! This library provides the core of the Raiden group chat bot: bounded
//! per-conversation memory, modes, reply triggering and completion
//! orchestration. It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret handling and text scrubbing
pub mod secrets;

/// Telemetry and Observability
pub mod telemetry;

/// Diagnostic bus for best-effort failures
pub mod diagnostics;

/// Conversation memory: store, gate and reply resolution
pub mod memory;

/// Conversation modes and their prompts
pub mod mode;

/// Reply triggering
pub mod trigger;

/// Completion provider abstraction layer
pub mod llm;

/// Completion orchestration
pub mod orchestrator;

/// Allow-list access control
pub mod access;

/// Conversation engine and Telegram transport
pub mod bot;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
