//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - start: Run the Telegram bot until Ctrl-C
//! - doctor: Validate configuration, secrets and API reachability
//! - memory stats / show / clear: Inspect or reset a conversation log

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::access::AccessControl;
use crate::bot::telegram::TelegramBot;
use crate::bot::ConversationEngine;
use crate::config::Config;
use crate::diagnostics::{spawn_diagnostic_logger, DiagnosticBus};
use crate::llm::{CompletionProvider, DeepSeekProvider};
use crate::memory::ConversationStore;
use crate::secrets::{SecretString, Secrets, DEEPSEEK_KEY_VAR, TELEGRAM_TOKEN_VAR};

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Open the conversation store described by the config
pub fn open_store(config: &Config, diagnostics: DiagnosticBus) -> Result<ConversationStore> {
    let store = ConversationStore::new(config.memory_dir(), config.memory.max_messages)
        .context("Failed to open conversation memory")?;
    Ok(store.with_diagnostics(diagnostics))
}

/// Run the bot until Ctrl-C
pub async fn handle_start(config: &Config) -> Result<()> {
    let secrets = Secrets::from_env().context("Missing credentials")?;

    let diagnostics = DiagnosticBus::new();
    let _logger = spawn_diagnostic_logger(&diagnostics);

    let store = Arc::new(open_store(config, diagnostics.clone())?);
    let provider: Arc<dyn CompletionProvider> = Arc::new(DeepSeekProvider::new(
        config.llm.clone(),
        secrets.deepseek_api_key,
    ));

    if !provider.check_health().await {
        warn!("DeepSeek API did not answer the health check; continuing anyway");
    }

    let access = AccessControl::from_config(&config.access);
    if access.is_enabled() {
        info!(
            "Whitelist enabled: {} user(s), {} chat(s)",
            config.access.allowed_users.len(),
            config.access.allowed_chats.len()
        );
    } else {
        info!("Whitelist disabled (public access)");
    }

    let engine = ConversationEngine::new(store, provider, access, diagnostics)
        .with_completion_timeout(Duration::from_secs(config.llm.timeout_secs));

    let mut bot = TelegramBot::new(
        secrets.telegram_token,
        Arc::new(engine),
        config.telegram.poll_timeout_secs,
    );
    bot.identify()
        .await
        .context("Failed to authenticate with Telegram")?;

    info!("Memory directory: {:?}", config.memory_dir());

    tokio::select! {
        result = bot.start_polling() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
            Ok(())
        }
    }
}

/// Validate configuration and check dependencies
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(&str, String)> = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration", "Valid".to_string()));
    checks.push((
        "Build",
        format!("{} ({})", env!("GIT_COMMIT_HASH"), env!("BUILD_TIMESTAMP")),
    ));

    if config.core.data_dir.exists() {
        checks.push(("Data directory", "Exists".to_string()));
    } else {
        checks.push(("Data directory", "Missing".to_string()));
        issues.push(format!(
            "Data directory does not exist: {:?}",
            config.core.data_dir
        ));
    }

    match open_store(config, DiagnosticBus::new()) {
        Ok(store) => checks.push((
            "Memory directory",
            format!("{:?} ({} messages max)", store.dir(), store.max_messages()),
        )),
        Err(e) => {
            checks.push(("Memory directory", "Unavailable".to_string()));
            issues.push(format!("{:#}", e));
        }
    }

    match SecretString::from_env(TELEGRAM_TOKEN_VAR) {
        Ok(_) => checks.push(("Telegram token", "Configured".to_string())),
        Err(_) => {
            checks.push(("Telegram token", "Not configured".to_string()));
            issues.push(format!("Set {} to run the bot", TELEGRAM_TOKEN_VAR));
        }
    }

    match SecretString::from_env(DEEPSEEK_KEY_VAR) {
        Ok(key) => {
            checks.push(("DeepSeek API key", "Configured".to_string()));
            let provider = DeepSeekProvider::new(config.llm.clone(), key);
            if provider.check_health().await {
                checks.push(("DeepSeek API", "Reachable".to_string()));
            } else {
                checks.push(("DeepSeek API", "Unreachable".to_string()));
                issues.push(format!(
                    "DeepSeek API at {} did not accept a test request",
                    config.llm.base_url
                ));
            }
        }
        Err(_) => {
            checks.push(("DeepSeek API key", "Not configured".to_string()));
            issues.push(format!("Set {} to enable replies", DEEPSEEK_KEY_VAR));
        }
    }

    let access = if config.access.enabled {
        format!(
            "Enabled ({} users, {} chats)",
            config.access.allowed_users.len(),
            config.access.allowed_chats.len()
        )
    } else {
        "Disabled (public access)".to_string()
    };
    checks.push(("Whitelist", access));

    match format {
        OutputFormat::Text => {
            println!("Raiden Diagnostics");
            println!("==================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show a conversation's fill level
pub async fn handle_memory_stats(
    conversation: &str,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let store = open_store(config, DiagnosticBus::new())?;
    println!("{}", render_memory_stats(&store, conversation, format).await?);
    Ok(())
}

/// Print a conversation's most recent records
pub async fn handle_memory_show(
    conversation: &str,
    limit: usize,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let store = open_store(config, DiagnosticBus::new())?;
    println!(
        "{}",
        render_memory_show(&store, conversation, limit, format).await?
    );
    Ok(())
}

/// Empty a conversation's log
pub async fn handle_memory_clear(
    conversation: &str,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let store = open_store(config, DiagnosticBus::new())?;
    let removed = store.read(conversation, None).await.len();
    store.clear(conversation).await;

    match format {
        OutputFormat::Text => {
            println!(
                "Cleared {} message(s) from conversation {}",
                removed, conversation
            );
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "conversation": conversation,
                    "cleared": removed,
                }))?
            );
        }
    }

    Ok(())
}

pub async fn render_memory_stats(
    store: &ConversationStore,
    conversation: &str,
    format: OutputFormat,
) -> Result<String> {
    let stats = store.stats(conversation).await;

    Ok(match format {
        OutputFormat::Text => format!(
            "Conversation {}: {}/{} messages ({:.2}%)",
            conversation, stats.total_messages, stats.max_capacity, stats.memory_usage_percent
        ),
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "conversation": conversation,
            "total_messages": stats.total_messages,
            "max_capacity": stats.max_capacity,
            "memory_usage_percent": stats.memory_usage_percent,
        }))?,
    })
}

pub async fn render_memory_show(
    store: &ConversationStore,
    conversation: &str,
    limit: usize,
    format: OutputFormat,
) -> Result<String> {
    let records = store.read(conversation, Some(limit)).await;

    Ok(match format {
        OutputFormat::Text => {
            if records.is_empty() {
                return Ok(format!("No messages in conversation {}", conversation));
            }
            let mut out = format!(
                "Conversation {} (last {} messages):\n",
                conversation,
                records.len()
            );
            for record in &records {
                out.push('\n');
                out.push_str(&format!("[{}] {}", record.timestamp, record.author));
                if let Some(target) = &record.target {
                    out.push_str(&format!(" → {}", target));
                }
                out.push_str(&format!(" (#{}", record.message_id));
                if let Some(reply_to) = record.reply_to {
                    out.push_str(&format!(", reply to #{}", reply_to));
                }
                out.push_str(&format!("): {}", record.text));
            }
            out
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "conversation": conversation,
            "messages": records,
            "count": records.len(),
        }))?,
    })
}
