//! DeepSeek chat-completions provider
//!
//! Talks to the OpenAI-compatible `/chat/completions` endpoint. The API key
//! comes from the environment and is only ever sent as a bearer header.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::{CompletionProvider, CompletionRequest, LLMError, Message, Result};
use crate::config::LlmConfig;
use crate::secrets::SecretString;

/// Timeout for the health-check request
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct DeepSeekProvider {
    config: LlmConfig,
    api_key: SecretString,
    client: Client,
}

impl std::fmt::Debug for DeepSeekProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepSeekProvider")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("api_key", &self.api_key)
            .finish()
    }
}

impl DeepSeekProvider {
    pub fn new(config: LlmConfig, api_key: SecretString) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            config,
            api_key,
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn convert_message(msg: &Message) -> Value {
        json!({
            "role": msg.role.to_string(),
            "content": msg.content
        })
    }

    /// Build the JSON body for a request
    pub fn payload(&self, request: &CompletionRequest) -> Value {
        let api_messages: Vec<Value> = request.messages.iter().map(Self::convert_message).collect();
        let params = &request.params;

        json!({
            "model": self.config.model,
            "messages": api_messages,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "top_p": params.top_p,
            "frequency_penalty": params.frequency_penalty,
            "presence_penalty": params.presence_penalty,
        })
    }

    async fn post(&self, payload: &Value, timeout: Option<Duration>) -> Result<Value> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.api_key.unsecure()),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .json(payload);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LLMError::Timeout
            } else if e.is_connect() {
                LLMError::ProviderUnavailable(format!("Cannot connect to DeepSeek: {}", e))
            } else {
                LLMError::NetworkError(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    LLMError::AuthenticationFailed(error_text)
                }
                StatusCode::TOO_MANY_REQUESTS => LLMError::RateLimitExceeded,
                _ => LLMError::ProviderUnavailable(format!(
                    "DeepSeek API error ({}): {}",
                    status, error_text
                )),
            });
        }

        resp.json().await.map_err(|e| {
            if e.is_timeout() {
                LLMError::Timeout
            } else {
                LLMError::ParseError(format!("Failed to parse DeepSeek response: {}", e))
            }
        })
    }
}

/// Pull the first choice's text out of a chat-completions body
pub fn extract_content(body: &Value) -> Result<String> {
    let content = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .ok_or_else(|| LLMError::ParseError("No message content in response".to_string()))?;

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(LLMError::EmptyCompletion);
    }
    Ok(trimmed.to_string())
}

#[async_trait]
impl CompletionProvider for DeepSeekProvider {
    fn name(&self) -> &str {
        "deepseek"
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<String> {
        tracing::debug!(
            "DeepSeek request: model={}, messages={}, max_tokens={}",
            self.config.model,
            request.messages.len(),
            request.params.max_tokens
        );

        let body = self.post(&self.payload(request), None).await?;
        extract_content(&body)
    }

    async fn check_health(&self) -> bool {
        let payload = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": "Test"}],
            "max_tokens": 10
        });

        match self.post(&payload, Some(HEALTH_CHECK_TIMEOUT)).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("DeepSeek health check failed: {}", e);
                false
            }
        }
    }
}
