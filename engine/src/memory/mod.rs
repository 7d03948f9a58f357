//! Conversational memory
//!
//! Per-conversation bounded message logs persisted as JSON documents, the
//! per-conversation gate that serializes their read-modify-write cycles, and
//! the reply resolver that recovers the message a new message answers.
//!
//! # On-disk format
//!
//! One file per conversation, `<memory dir>/<conversation id>.json`, holding
//! an array of records in chronological order:
//!
//! ```json
//! [
//!   {
//!     "username": "alice",
//!     "target": null,
//!     "message": "hey Raiden",
//!     "message_id": 41,
//!     "timestamp": "2025-07-18T17:00:00+00:00"
//!   },
//!   {
//!     "username": "Raiden",
//!     "target": "alice",
//!     "message": "You called.",
//!     "message_id": 42,
//!     "timestamp": "2025-07-18T17:00:03+00:00",
//!     "reply_to_message_id": 41
//!   }
//! ]
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod gate;
pub mod reply;
pub mod store;

pub use gate::ConversationGate;
pub use reply::ReplyResolver;
pub use store::ConversationStore;

/// Default number of records retained per conversation
pub const DEFAULT_MAX_MESSAGES: usize = 30;

/// One message in a conversation log
///
/// `message_id` is assigned by the chat platform and is only unique inside
/// the retained window of one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRecord {
    /// Who sent the message
    #[serde(rename = "username")]
    pub author: String,

    /// Whom the message addresses, if it is a reply
    #[serde(default)]
    pub target: Option<String>,

    /// Message text
    #[serde(rename = "message")]
    pub text: String,

    /// Platform-assigned message identifier
    pub message_id: i64,

    /// ISO-8601 UTC timestamp
    pub timestamp: String,

    /// Identifier of the message this one replies to
    #[serde(
        rename = "reply_to_message_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reply_to: Option<i64>,
}

impl MessageRecord {
    /// Create a record stamped with the current time
    pub fn new(author: impl Into<String>, text: impl Into<String>, message_id: i64) -> Self {
        Self {
            author: author.into(),
            target: None,
            text: text.into(),
            message_id,
            timestamp: format_timestamp(Utc::now()),
            reply_to: None,
        }
    }

    /// Set the addressed user
    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }

    /// Set the reply-to link
    pub fn replying_to(mut self, message_id: Option<i64>) -> Self {
        self.reply_to = message_id;
        self
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = format_timestamp(timestamp);
        self
    }
}

/// Format a timestamp the way conversation logs store it
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
}

/// Fill level of one conversation log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MemoryStats {
    pub total_messages: usize,
    pub max_capacity: usize,
    pub memory_usage_percent: f64,
}

impl MemoryStats {
    pub fn new(total_messages: usize, max_capacity: usize) -> Self {
        let memory_usage_percent = if max_capacity > 0 {
            let raw = total_messages as f64 / max_capacity as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            total_messages,
            max_capacity,
            memory_usage_percent,
        }
    }
}
