//! CLI interface for the Raiden bot
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Raiden, a Telegram group chat bot with per-group memory
///
/// Keeps a short rolling history for every chat and answers through the
/// DeepSeek chat-completions API, either in character or as a plain
/// assistant.
#[derive(Parser, Debug)]
#[command(name = "raiden")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the Telegram bot until interrupted
    Start,

    /// Check configuration, memory directory, secrets and API reachability
    Doctor,

    /// Inspect or reset conversation memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
}

/// Conversation memory actions
#[derive(Subcommand, Debug)]
pub enum MemoryAction {
    /// Show how full a conversation's log is
    Stats {
        /// Conversation (chat) id
        conversation: String,
    },

    /// Print the most recent records of a conversation
    Show {
        /// Conversation (chat) id
        conversation: String,

        /// Number of records to show (0 for all)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Empty a conversation's log
    Clear {
        /// Conversation (chat) id
        conversation: String,
    },
}
