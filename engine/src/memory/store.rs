//! Conversation Store
//!
//! File-backed, bounded, append-only logs keyed by conversation id. Every
//! mutation rewrites the whole document under the conversation's gate.
//!
//! Storage problems never reach the caller:
//! - a missing file is an empty log
//! - an unreadable or corrupt file is an empty log, reported as a diagnostic
//! - a failed write is reported and the in-flight result is dropped
//!
//! Every clear starts a new generation of the log. Writers that captured an
//! older generation use [`ConversationStore::append_if_current`] so records
//! from before a clear never land in the fresh log.

use sdk::errors::EngineError;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::gate::ConversationGate;
use super::{MemoryStats, MessageRecord};
use crate::diagnostics::{DiagnosticBus, DiagnosticEvent};

/// Bounded per-conversation message logs
#[derive(Debug)]
pub struct ConversationStore {
    /// Directory holding one JSON document per conversation
    dir: PathBuf,

    /// Maximum number of records retained per conversation
    max_messages: usize,

    /// Serializes mutations per conversation
    gate: ConversationGate,

    /// Clear count per conversation, absent means zero
    generations: RwLock<HashMap<String, u64>>,

    /// Where swallowed failures are reported
    diagnostics: DiagnosticBus,
}

impl ConversationStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_messages` is zero or the directory cannot be
    /// created.
    pub fn new(dir: impl Into<PathBuf>, max_messages: usize) -> Result<Self, EngineError> {
        if max_messages == 0 {
            return Err(EngineError::Config(
                "memory.max_messages must be greater than 0".to_string(),
            ));
        }

        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            EngineError::Config(format!("Failed to create memory directory {:?}: {}", dir, e))
        })?;

        Ok(Self {
            dir,
            max_messages,
            gate: ConversationGate::new(),
            generations: RwLock::new(HashMap::new()),
            diagnostics: DiagnosticBus::new(),
        })
    }

    /// Report swallowed failures on an existing bus
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticBus) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// The gate guarding this store's mutations
    pub fn gate(&self) -> &ConversationGate {
        &self.gate
    }

    /// Location of a conversation's document
    pub fn path_for(&self, conversation_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(conversation_id)))
    }

    /// Append a record, evicting the oldest records beyond the bound.
    ///
    /// Returns the length of the log after the append.
    pub async fn append(&self, conversation_id: &str, record: MessageRecord) -> usize {
        let _guard = self.gate.lock(conversation_id).await;
        self.append_locked(conversation_id, record).await
    }

    /// Append only if the log has not been cleared since `generation` was
    /// observed.
    ///
    /// Returns `None` when the record was dropped as stale.
    pub async fn append_if_current(
        &self,
        conversation_id: &str,
        record: MessageRecord,
        generation: u64,
    ) -> Option<usize> {
        let _guard = self.gate.lock(conversation_id).await;

        let current = self.generation(conversation_id).await;
        if current != generation {
            debug!(
                "Dropping record {} for conversation {}: log cleared since generation {} (now {})",
                record.message_id, conversation_id, generation, current
            );
            return None;
        }

        Some(self.append_locked(conversation_id, record).await)
    }

    /// Current generation of a conversation's log
    pub async fn generation(&self, conversation_id: &str) -> u64 {
        self.generations
            .read()
            .await
            .get(conversation_id)
            .copied()
            .unwrap_or_default()
    }

    async fn append_locked(&self, conversation_id: &str, record: MessageRecord) -> usize {
        let mut records = self.load(conversation_id).await;
        records.push(record);

        if records.len() > self.max_messages {
            let overflow = records.len() - self.max_messages;
            records.drain(..overflow);
            debug!(
                "Evicted {} record(s) from conversation {}",
                overflow, conversation_id
            );
        }

        self.persist_or_report(conversation_id, &records).await;
        records.len()
    }

    /// The most recent `limit` records in chronological order.
    ///
    /// `None` or `Some(0)` returns the whole log.
    pub async fn read(&self, conversation_id: &str, limit: Option<usize>) -> Vec<MessageRecord> {
        let mut records = self.load(conversation_id).await;

        if let Some(limit) = limit.filter(|l| *l > 0) {
            if records.len() > limit {
                records.drain(..records.len() - limit);
            }
        }

        records
    }

    /// Replace the log with an empty one
    pub async fn clear(&self, conversation_id: &str) {
        let _guard = self.gate.lock(conversation_id).await;
        self.persist_or_report(conversation_id, &[]).await;

        *self
            .generations
            .write()
            .await
            .entry(conversation_id.to_string())
            .or_default() += 1;
    }

    /// First retained record with the given platform id
    pub async fn find_by_id(&self, conversation_id: &str, message_id: i64) -> Option<MessageRecord> {
        self.load(conversation_id)
            .await
            .into_iter()
            .find(|record| record.message_id == message_id)
    }

    /// Fill level of a conversation's log
    pub async fn stats(&self, conversation_id: &str) -> MemoryStats {
        let records = self.load(conversation_id).await;
        MemoryStats::new(records.len(), self.max_messages)
    }

    /// Read a conversation's document, surfacing corruption.
    ///
    /// The conversational paths use [`ConversationStore::read`], which
    /// degrades to an empty log instead.
    pub async fn load_document(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<MessageRecord>, EngineError> {
        let path = self.path_for(conversation_id);

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(EngineError::CorruptLog {
                    conversation: conversation_id.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&contents).map_err(|e| EngineError::CorruptLog {
            conversation: conversation_id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn load(&self, conversation_id: &str) -> Vec<MessageRecord> {
        match self.load_document(conversation_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Treating conversation log as empty: {}", e);
                self.diagnostics
                    .publish(DiagnosticEvent::StorageReadFailed {
                        conversation: conversation_id.to_string(),
                        error: e.to_string(),
                    })
                    .await;
                Vec::new()
            }
        }
    }

    /// Overwrite a conversation's document via a temporary sibling file
    async fn persist(
        &self,
        conversation_id: &str,
        records: &[MessageRecord],
    ) -> Result<(), EngineError> {
        let storage_err = |reason: String| EngineError::Storage {
            conversation: conversation_id.to_string(),
            reason,
        };

        let path = self.path_for(conversation_id);
        let tmp_path = path.with_extension("json.tmp");

        let body = serde_json::to_string_pretty(records).map_err(|e| storage_err(e.to_string()))?;

        tokio::fs::write(&tmp_path, body)
            .await
            .map_err(|e| storage_err(format!("write {:?}: {}", tmp_path, e)))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| storage_err(format!("rename to {:?}: {}", path, e)))?;

        Ok(())
    }

    async fn persist_or_report(&self, conversation_id: &str, records: &[MessageRecord]) {
        if let Err(e) = self.persist(conversation_id, records).await {
            error!("{}", e);
            self.diagnostics
                .publish(DiagnosticEvent::StorageWriteFailed {
                    conversation: conversation_id.to_string(),
                    error: e.to_string(),
                })
                .await;
        }
    }
}

/// Map a conversation id onto a safe file name
fn file_stem(conversation_id: &str) -> String {
    if conversation_id.is_empty() {
        return "_".to_string();
    }

    conversation_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
