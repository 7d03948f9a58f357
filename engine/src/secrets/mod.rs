//! Secret handling
//!
//! The bot token and the completion API key come from the environment and
//! are held in [`SecretString`], which never prints its value. [`scrub`]
//! removes anything that looks like a credential from text that is about to
//! be logged or posted to a chat (reqwest errors embed the bot API URL, which
//! contains the token).

use regex::Regex;
use sdk::errors::EngineError;
use std::fmt;
use std::sync::OnceLock;

/// A wrapper for sensitive string data that prevents accidental logging.
///
/// `Debug` and `Display` always print `[REDACTED]`. Use `unsecure()` to get
/// at the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Read a non-empty secret from an environment variable
    pub fn from_env(var: &str) -> Result<Self, EngineError> {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Ok(Self(value.trim().to_string())),
            _ => Err(EngineError::MissingSecret(var.to_string())),
        }
    }

    /// Access the raw underlying string
    pub fn unsecure(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Environment variable holding the Telegram bot token
pub const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
/// Environment variable holding the DeepSeek API key
pub const DEEPSEEK_KEY_VAR: &str = "DEEPSEEK_API_KEY";

/// Credentials needed to run the bot
#[derive(Debug, Clone)]
pub struct Secrets {
    pub telegram_token: SecretString,
    pub deepseek_api_key: SecretString,
}

impl Secrets {
    /// Load both credentials from the environment
    ///
    /// # Errors
    ///
    /// Returns `EngineError::MissingSecret` naming the first unset variable.
    pub fn from_env() -> Result<Self, EngineError> {
        Ok(Self {
            telegram_token: SecretString::from_env(TELEGRAM_TOKEN_VAR)?,
            deepseek_api_key: SecretString::from_env(DEEPSEEK_KEY_VAR)?,
        })
    }
}

static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Patterns for credentials that may show up in logged or posted text:
/// - Telegram bot tokens: `<digits>:<35 chars>`
/// - `sk-` style API keys
/// - Bearer tokens
fn secret_patterns() -> &'static [Regex] {
    SECRET_PATTERNS.get_or_init(|| {
        [
            r"\b[0-9]{8,10}:[a-zA-Z0-9\-_]{35}\b",
            r"sk-[a-zA-Z0-9\-_]{20,}",
            r"Bearer\s+[^\s]{20,}",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Replace every credential-looking substring with `[REDACTED]`
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();
    for pattern in secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }
    result
}
