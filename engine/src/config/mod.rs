//! Configuration management
//!
//! This module handles loading, validation, and management of the bot
//! configuration. Configuration is stored in TOML format at
//! ~/.raiden/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **memory**: Conversation log directory and capacity
//! - **llm**: Completion endpoint, model and request timeout
//! - **telegram**: Long-polling settings
//! - **access**: Allow-list of users and chats
//!
//! Credentials never live in the file. The bot token and API key are read
//! from the environment (see [`crate::secrets::Secrets`]), and the
//! `WHITELIST_*` variables override the `[access]` section.
//!
//! # Examples
//!
//! ```no_run
//! use raiden_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Memory dir: {:?}", config.memory_dir());
//! println!("Model: {}", config.llm.model);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::memory::DEFAULT_MAX_MESSAGES;
use crate::mode::Mode;

/// Environment variable toggling the allow-list
pub const WHITELIST_ENABLED_VAR: &str = "WHITELIST_ENABLED";
/// Environment variable listing allowed users (ids or usernames)
pub const WHITELIST_USERS_VAR: &str = "WHITELIST_USERS";
/// Environment variable listing allowed chat ids
pub const WHITELIST_CHATS_VAR: &str = "WHITELIST_CHATS";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Conversation memory
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Completion endpoint
    #[serde(default)]
    pub llm: LlmConfig,

    /// Telegram transport
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Allow-list
    #[serde(default)]
    pub access: AccessConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Directory holding one JSON log per conversation, relative to data_dir
    /// unless absolute
    #[serde(default = "default_memory_dir")]
    pub dir: PathBuf,

    /// Records retained per conversation
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

/// Completion endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    // Note: API key comes from DEEPSEEK_API_KEY, not from config
}

/// Telegram configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Long-polling timeout for getUpdates in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    // Note: bot token comes from TELEGRAM_BOT_TOKEN, not from config
}

/// Allow-list configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessConfig {
    /// When false every user and chat is allowed
    #[serde(default)]
    pub enabled: bool,

    /// Numeric user ids, usernames or @usernames
    #[serde(default)]
    pub allowed_users: Vec<String>,

    /// Numeric chat ids
    #[serde(default)]
    pub allowed_chats: Vec<String>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.raiden")
}

fn default_memory_dir() -> PathBuf {
    PathBuf::from("memory")
}

fn default_max_messages() -> usize {
    DEFAULT_MAX_MESSAGES
}

fn default_llm_base_url() -> String {
    "https://api.deepseek.com/v1".to_string()
}

fn default_llm_model() -> String {
    "deepseek-chat".to_string()
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_poll_timeout() -> u64 {
    30
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dir: default_memory_dir(),
            max_messages: default_max_messages(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.raiden/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    /// Environment overrides are applied before validation.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env_overrides();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Parse without validation or environment overrides
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default_config();

        // The file gets the pristine defaults, not the env-derived values
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.apply_env_overrides();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.raiden/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".raiden").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            memory: MemoryConfig::default(),
            llm: LlmConfig::default(),
            telegram: TelegramConfig::default(),
            access: AccessConfig::default(),
        }
    }

    /// Directory holding the conversation logs
    pub fn memory_dir(&self) -> PathBuf {
        if self.memory.dir.is_absolute() {
            self.memory.dir.clone()
        } else {
            self.core.data_dir.join(&self.memory.dir)
        }
    }

    /// Apply `WHITELIST_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|var| std::env::var(var).ok());
    }

    /// Apply `WHITELIST_*` overrides from an arbitrary lookup.
    ///
    /// Lists are comma separated; entries are trimmed and empty ones dropped.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(enabled) = lookup(WHITELIST_ENABLED_VAR) {
            self.access.enabled = enabled.trim().eq_ignore_ascii_case("true");
        }
        if let Some(users) = lookup(WHITELIST_USERS_VAR) {
            self.access.allowed_users = split_list(&users);
        }
        if let Some(chats) = lookup(WHITELIST_CHATS_VAR) {
            self.access.allowed_chats = split_list(&chats);
        }
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level and numeric bounds
    /// - Expands ~ in paths
    /// - Creates the data directory if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` describing the first invalid field.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let history_window = Mode::largest_history_limit();
        if self.memory.max_messages < history_window {
            return Err(EngineError::Config(format!(
                "memory.max_messages must be at least {} (the largest mode history), got {}",
                history_window, self.memory.max_messages
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(EngineError::Config(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.llm.base_url.trim().is_empty() {
            return Err(EngineError::Config("llm.base_url must not be empty".to_string()));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.memory.dir = expand_path(&self.memory.dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
