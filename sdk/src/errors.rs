//! Error types and handling
//!
//! This module provides the error types used throughout the Raiden engine.
//! All errors implement the `RaidenErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never carry the bot token or the completion API key.
//! Transport errors are scrubbed by the engine before they are built.

use thiserror::Error;

/// Trait for Raiden error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait RaidenErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to post back into a chat and does not contain
    /// secrets, file paths or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors only affect the message being processed. The bot
    /// keeps serving subsequent messages.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration and secrets
/// - **Storage**: Conversation log read/write failures
/// - **Completion**: LLM provider failures and timeouts
/// - **Mode**: Rejected mode switch requests
/// - **Transport**: Chat platform API failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, RaidenErrorExt};
///
/// let error = EngineError::InvalidMode("pirate".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::MissingSecret("TELEGRAM_BOT_TOKEN".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing secret: {0}")]
    MissingSecret(String),

    // Storage errors
    #[error("Storage error for conversation {conversation}: {reason}")]
    Storage {
        conversation: String,
        reason: String,
    },

    #[error("Corrupt conversation log {conversation}: {reason}")]
    CorruptLog {
        conversation: String,
        reason: String,
    },

    // Completion provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("LLM call timed out")]
    LLMTimeout,

    #[error("LLM returned an empty completion")]
    EmptyCompletion,

    // Mode errors
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    // Access errors
    #[error("Access denied for user {user} in chat {chat}")]
    AccessDenied { user: String, chat: String },

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RaidenErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",
            Self::MissingSecret(_) => "Set the required secret in the environment or .env file",

            // Storage errors
            Self::Storage { .. } => "Conversation memory could not be saved",
            Self::CorruptLog { .. } => "Conversation memory was unreadable and has been ignored",

            // Completion provider errors
            Self::LLMProvider(_) => "LLM provider unavailable. Check your API key and network",
            Self::LLMTimeout => "LLM provider took too long to respond. Try again",
            Self::EmptyCompletion => "LLM provider returned nothing. Try again",

            // Mode errors
            Self::InvalidMode(_) => "Use /mode chat or /mode assistant",

            // Access errors
            Self::AccessDenied { .. } => "This chat or user is not on the allow-list",

            // Transport errors
            Self::Transport(_) => "Chat platform request failed. Check your connection",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_) | Self::MissingSecret(_) => false,

            // All other errors only affect the current message
            _ => true,
        }
    }
}
