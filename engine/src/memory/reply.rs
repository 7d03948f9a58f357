//! Reply Resolver
//!
//! Turns a reply-to link into a line of context for the completion request.
//! Only the retained window is searched; an evicted or unknown message simply
//! yields no context.

use std::sync::Arc;

use super::{ConversationStore, MessageRecord};

/// Resolves reply-to links against a conversation store
#[derive(Debug, Clone)]
pub struct ReplyResolver {
    store: Arc<ConversationStore>,
}

impl ReplyResolver {
    pub fn new(store: Arc<ConversationStore>) -> Self {
        Self { store }
    }

    /// Context describing the message `reply_to_id` points at, if retained
    pub async fn resolve(&self, conversation_id: &str, reply_to_id: i64) -> Option<String> {
        let original = self.store.find_by_id(conversation_id, reply_to_id).await;
        if original.is_none() {
            tracing::debug!(
                "Reply target {} not in retained window of {}",
                reply_to_id,
                conversation_id
            );
        }
        original.as_ref().map(format_reply_context)
    }
}

/// Describe a replied-to message for the model
pub fn format_reply_context(original: &MessageRecord) -> String {
    format!(
        "[User is replying to a message from {} that said: \"{}\"]",
        original.author, original.text
    )
}
