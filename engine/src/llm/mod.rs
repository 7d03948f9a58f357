//! Completion provider abstraction
//!
//! The bot talks to a single chat-completions endpoint. The
//! `CompletionProvider` trait is the seam between the orchestrator and the
//! HTTP client, so tests can swap in a scripted provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod deepseek;

pub use deepseek::DeepSeekProvider;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Empty completion")]
    EmptyCompletion,
}

impl From<LLMError> for sdk::errors::EngineError {
    fn from(e: LLMError) -> Self {
        match e {
            LLMError::Timeout => Self::LLMTimeout,
            LLMError::EmptyCompletion => Self::EmptyCompletion,
            other => Self::LLMProvider(other.to_string()),
        }
    }
}

/// Message in a completion request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Generation parameters sent with every request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    pub temperature: f64,
    /// Nucleus-sampling threshold
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

/// A complete request to the completion provider
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub params: GenerationParams,
}

/// Completion provider trait
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "deepseek")
    fn name(&self) -> &str;

    /// Generate a completion
    ///
    /// # Returns
    /// * `Ok(String)` - The generated text, trimmed and non-empty
    /// * `Err(LLMError)` - If the request fails or yields nothing
    async fn generate(&self, request: &CompletionRequest) -> Result<String>;

    /// Check if the provider is currently reachable and accepts our key
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}
