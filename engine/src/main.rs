// Raiden bot
// Main entry point for the raiden binary

use clap::Parser;
use raiden_engine::cli::{Cli, Command, MemoryAction};
use raiden_engine::config::Config;
use raiden_engine::handlers::{
    handle_doctor, handle_memory_clear, handle_memory_show, handle_memory_stats, handle_start,
    OutputFormat,
};
use raiden_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log beats the config file; RUST_LOG beats both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    tracing::info!(
        "Raiden v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    match cli.command {
        Command::Start => handle_start(&config).await,
        Command::Doctor => handle_doctor(&config, format).await,
        Command::Memory { action } => match action {
            MemoryAction::Stats { conversation } => {
                handle_memory_stats(&conversation, &config, format).await
            }
            MemoryAction::Show {
                conversation,
                limit,
            } => handle_memory_show(&conversation, limit, &config, format).await,
            MemoryAction::Clear { conversation } => {
                handle_memory_clear(&conversation, &config, format).await
            }
        },
    }
}
