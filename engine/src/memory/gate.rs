//! Per-conversation mutual exclusion
//!
//! Every mutation of a conversation log is a load, modify, overwrite cycle on
//! one JSON document. Two messages from the same chat arriving together would
//! otherwise both load the old document and one append would be lost.
//!
//! Locks are created on first use and live for the whole process. The
//! registry is never pruned: one entry per chat the bot has ever seen.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-conversation locks
#[derive(Clone, Default)]
pub struct ConversationGate {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ConversationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a conversation, creating it if needed.
    ///
    /// The guard is owned so it can be held across `.await` points and
    /// moved into spawned work.
    pub async fn lock(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let handle = self.handle(conversation_id).await;
        handle.lock_owned().await
    }

    async fn handle(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Number of conversations with a registered lock
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl std::fmt::Debug for ConversationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationGate").finish_non_exhaustive()
    }
}
