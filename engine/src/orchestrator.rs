//! Completion Orchestrator
//!
//! Turns a triggered message into a reply:
//!
//! 1. Read the conversation's most recent records, up to the mode's limit
//! 2. Assemble system prompt, history, reply context and the new text
//! 3. Call the completion provider (bounded by a timeout)
//! 4. Deliver the reply through a [`ReplySink`]
//! 5. Append the delivered reply to the conversation log
//!
//! Any failure along the way ends the turn silently: nothing is appended,
//! the failure is logged and published on the diagnostic bus. A reply whose
//! conversation switched modes while it was generated is still delivered but
//! not recorded.

use async_trait::async_trait;
use sdk::errors::EngineError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::diagnostics::{DiagnosticBus, DiagnosticEvent};
use crate::llm::{CompletionProvider, CompletionRequest, LLMError, Message};
use crate::memory::{ConversationStore, MessageRecord};
use crate::mode::prompts::BOT_NAME;
use crate::mode::Mode;

/// Default upper bound on one completion call
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

/// Where replies are delivered
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Post `text` into `chat_id` as a reply to `reply_to`.
    ///
    /// Returns the platform id of the posted message.
    async fn send_reply(&self, chat_id: i64, reply_to: i64, text: &str) -> Result<i64, EngineError>;
}

/// The message that triggered a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub conversation_id: String,
    pub chat_id: i64,
    pub author: String,
    pub text: String,
    pub message_id: i64,
    /// Log generation observed when the message arrived
    pub generation: u64,
}

/// Build the request sent to the provider.
///
/// The history block is skipped when `history` is empty and the reply
/// context block when there is none.
pub fn build_request(
    mode: Mode,
    history: &[MessageRecord],
    reply_context: Option<&str>,
    text: &str,
) -> CompletionRequest {
    let profile = mode.profile();
    let mut messages = vec![Message::system(profile.system_prompt)];

    if !history.is_empty() {
        messages.push(Message::system(format_history(history)));
    }

    if let Some(context) = reply_context.filter(|c| !c.is_empty()) {
        messages.push(Message::system(context));
    }

    messages.push(Message::user(text));

    CompletionRequest {
        messages,
        params: profile.params,
    }
}

/// Render the history block: the records as pretty JSON, each reply
/// annotated with a `reply_info` field.
pub fn format_history(history: &[MessageRecord]) -> String {
    let annotated: Vec<Value> = history
        .iter()
        .map(|record| {
            let mut value = serde_json::to_value(record).unwrap_or(Value::Null);
            if let (Some(reply_to), Value::Object(map)) = (record.reply_to, &mut value) {
                map.insert(
                    "reply_info".to_string(),
                    Value::String(format!("(replying to message {})", reply_to)),
                );
            }
            value
        })
        .collect();

    let rendered = serde_json::to_string_pretty(&annotated).unwrap_or_else(|_| "[]".to_string());

    format!(
        "RECENT CHAT HISTORY:\n{}\n\nBased on this chat history, respond to the latest message.",
        rendered
    )
}

pub struct CompletionOrchestrator {
    store: Arc<ConversationStore>,
    provider: Arc<dyn CompletionProvider>,
    timeout: Duration,
    diagnostics: DiagnosticBus,
}

impl std::fmt::Debug for CompletionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionOrchestrator")
            .field("provider", &self.provider.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CompletionOrchestrator {
    pub fn new(store: Arc<ConversationStore>, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            store,
            provider,
            timeout: DEFAULT_COMPLETION_TIMEOUT,
            diagnostics: DiagnosticBus::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticBus) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Generate, deliver and record a reply to `turn`.
    ///
    /// Returns the delivered text, or `None` when the turn ended without a
    /// reply.
    pub async fn respond(
        &self,
        turn: &Turn,
        mode: Mode,
        reply_context: Option<&str>,
        sink: &dyn ReplySink,
    ) -> Option<String> {
        let history = self
            .store
            .read(&turn.conversation_id, Some(mode.profile().history_limit))
            .await;
        let request = build_request(mode, &history, reply_context, &turn.text);

        debug!(
            "Requesting completion for {} ({} mode, {} history records)",
            turn.conversation_id,
            mode,
            history.len()
        );

        let reply = match self.generate(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    "Completion failed for conversation {}: {}",
                    turn.conversation_id, e
                );
                self.diagnostics
                    .publish(DiagnosticEvent::CompletionFailed {
                        conversation: turn.conversation_id.clone(),
                        error: e.to_string(),
                    })
                    .await;
                return None;
            }
        };

        let sent_id = match sink.send_reply(turn.chat_id, turn.message_id, &reply).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    "Failed to deliver reply in conversation {}: {}",
                    turn.conversation_id, e
                );
                self.diagnostics
                    .publish(DiagnosticEvent::DeliveryFailed {
                        conversation: turn.conversation_id.clone(),
                        error: e.to_string(),
                    })
                    .await;
                return None;
            }
        };

        let record = MessageRecord::new(BOT_NAME, reply.clone(), sent_id)
            .with_target(Some(turn.author.clone()));
        if self
            .store
            .append_if_current(&turn.conversation_id, record, turn.generation)
            .await
            .is_none()
        {
            info!(
                "Conversation {} changed mode during the reply; not recording message {}",
                turn.conversation_id, sent_id
            );
        }

        info!(
            "Replied to {} in conversation {} (message {})",
            turn.author, turn.conversation_id, sent_id
        );
        Some(reply)
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<String, LLMError> {
        let reply = timeout(self.timeout, self.provider.generate(request))
            .await
            .map_err(|_| LLMError::Timeout)??;

        let trimmed = reply.trim();
        if trimmed.is_empty() {
            return Err(LLMError::EmptyCompletion);
        }
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::EventType;
    use crate::llm::MessageRole;
    use std::sync::Mutex;

    /// Provider returning a canned result and recording requests
    struct ScriptedProvider {
        reply: std::result::Result<String, ()>,
        delay: Option<Duration>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &CompletionRequest) -> crate::llm::Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply
                .clone()
                .map_err(|_| LLMError::ProviderUnavailable("scripted failure".to_string()))
        }
    }

    /// Sink that records deliveries and hands out increasing ids
    struct RecordingSink {
        fail: bool,
        sent: Mutex<Vec<(i64, i64, String)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                fail: false,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReplySink for RecordingSink {
        async fn send_reply(&self, chat_id: i64, reply_to: i64, text: &str) -> Result<i64, EngineError> {
            if self.fail {
                return Err(EngineError::Transport("chat unreachable".to_string()));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((chat_id, reply_to, text.to_string()));
            Ok(1000 + sent.len() as i64)
        }
    }

    fn turn(text: &str, message_id: i64) -> Turn {
        Turn {
            conversation_id: "g1".to_string(),
            chat_id: -1001,
            author: "alice".to_string(),
            text: text.to_string(),
            message_id,
            generation: 0,
        }
    }

    #[test]
    fn test_build_request_without_history() {
        let request = build_request(Mode::Assistant, &[], None, "hello");

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.messages[1], Message::user("hello"));
        assert_eq!(request.params.max_tokens, 1300);
    }

    #[test]
    fn test_build_request_full_layout() {
        let history = vec![
            MessageRecord::new("alice", "first", 1),
            MessageRecord::new("bob", "second", 2).replying_to(Some(1)),
        ];
        let request = build_request(
            Mode::Persona,
            &history,
            Some("[User is replying to a message from alice that said: \"first\"]"),
            "third",
        );

        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[0].content, Mode::Persona.profile().system_prompt);

        let block = &request.messages[1].content;
        assert!(block.starts_with("RECENT CHAT HISTORY:\n"));
        assert!(block.ends_with("\n\nBased on this chat history, respond to the latest message."));
        assert!(block.contains("\"reply_info\": \"(replying to message 1)\""));
        assert_eq!(block.matches("reply_info").count(), 1);

        assert!(request.messages[2].content.starts_with("[User is replying"));
        assert_eq!(request.messages[3], Message::user("third"));
        assert_eq!(request.params.temperature, 1.3);
    }

    #[test]
    fn test_history_block_preserves_non_ascii() {
        let history = vec![MessageRecord::new("ei", "稲妻は永遠", 1)];
        assert!(format_history(&history).contains("稲妻は永遠"));
    }

    #[tokio::test]
    async fn test_respond_appends_bot_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConversationStore::new(dir.path(), 30).unwrap());
        store.append("g1", MessageRecord::new("alice", "hey Raiden", 7)).await;

        let provider = Arc::new(ScriptedProvider::ok("  Speak.  "));
        let orchestrator = CompletionOrchestrator::new(Arc::clone(&store), provider.clone());
        let sink = RecordingSink::new();

        let reply = orchestrator
            .respond(&turn("hey Raiden", 7), Mode::Persona, None, &sink)
            .await;

        assert_eq!(reply.as_deref(), Some("Speak."));
        assert_eq!(sink.sent.lock().unwrap()[0], (-1001, 7, "Speak.".to_string()));

        let log = store.read("g1", None).await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].author, BOT_NAME);
        assert_eq!(log[1].target.as_deref(), Some("alice"));
        assert_eq!(log[1].message_id, 1001);

        // The triggering message is the last history record sent
        let seen = provider.seen.lock().unwrap();
        assert!(seen[0].messages[1].content.contains("hey Raiden"));
    }

    #[tokio::test]
    async fn test_respond_reads_mode_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConversationStore::new(dir.path(), 30).unwrap());
        for id in 1..=25 {
            store
                .append("g1", MessageRecord::new("alice", format!("msg-{}", id), id))
                .await;
        }

        let provider = Arc::new(ScriptedProvider::ok("ok"));
        let orchestrator = CompletionOrchestrator::new(Arc::clone(&store), provider.clone());

        orchestrator
            .respond(&turn("help", 25), Mode::Assistant, None, &RecordingSink::new())
            .await;

        let seen = provider.seen.lock().unwrap();
        let block = &seen[0].messages[1].content;
        assert!(!block.contains("\"msg-15\""));
        assert!(block.contains("\"msg-16\""));
        assert!(block.contains("\"msg-25\""));
    }

    #[tokio::test]
    async fn test_provider_failure_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConversationStore::new(dir.path(), 30).unwrap());
        let bus = DiagnosticBus::new();
        let mut events = bus.subscribe(EventType::CompletionFailed).await;

        let orchestrator =
            CompletionOrchestrator::new(Arc::clone(&store), Arc::new(ScriptedProvider::failing()))
                .with_diagnostics(bus);
        let sink = RecordingSink::new();

        let reply = orchestrator.respond(&turn("hey ei", 1), Mode::Persona, None, &sink).await;

        assert!(reply.is_none());
        assert!(sink.sent.lock().unwrap().is_empty());
        assert!(store.read("g1", None).await.is_empty());
        assert_eq!(events.recv().await.unwrap().conversation(), "g1");
    }

    #[tokio::test]
    async fn test_empty_completion_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConversationStore::new(dir.path(), 30).unwrap());
        let orchestrator =
            CompletionOrchestrator::new(Arc::clone(&store), Arc::new(ScriptedProvider::ok("   ")));
        let sink = RecordingSink::new();

        assert!(orchestrator.respond(&turn("ei?", 1), Mode::Persona, None, &sink).await.is_none());
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConversationStore::new(dir.path(), 30).unwrap());
        let provider = ScriptedProvider {
            delay: Some(Duration::from_secs(5)),
            ..ScriptedProvider::ok("too late")
        };
        let orchestrator = CompletionOrchestrator::new(Arc::clone(&store), Arc::new(provider))
            .with_timeout(Duration::from_millis(50));

        let reply = orchestrator
            .respond(&turn("raiden", 1), Mode::Persona, None, &RecordingSink::new())
            .await;

        assert!(reply.is_none());
        assert!(store.read("g1", None).await.is_empty());
    }

    #[tokio::test]
    async fn test_reply_after_clear_is_delivered_but_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConversationStore::new(dir.path(), 30).unwrap());
        let provider = ScriptedProvider {
            delay: Some(Duration::from_millis(200)),
            ..ScriptedProvider::ok("I am the Electro Archon.")
        };
        let orchestrator = CompletionOrchestrator::new(Arc::clone(&store), Arc::new(provider));
        let sink = RecordingSink::new();
        let generation = store.generation("g1").await;

        let first = turn("hey Raiden", 1);
        let (reply, _) = tokio::join!(
            orchestrator.respond(&first, Mode::Persona, None, &sink),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                store.clear("g1").await;
            }
        );

        assert_eq!(generation, 0);
        assert_eq!(reply.as_deref(), Some("I am the Electro Archon."));
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
        assert!(store.read("g1", None).await.is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConversationStore::new(dir.path(), 30).unwrap());
        let bus = DiagnosticBus::new();
        let mut events = bus.subscribe(EventType::DeliveryFailed).await;
        let orchestrator =
            CompletionOrchestrator::new(Arc::clone(&store), Arc::new(ScriptedProvider::ok("hi")))
                .with_diagnostics(bus);
        let sink = RecordingSink {
            fail: true,
            sent: Mutex::new(Vec::new()),
        };

        assert!(orchestrator.respond(&turn("raiden", 1), Mode::Persona, None, &sink).await.is_none());
        assert!(store.read("g1", None).await.is_empty());
        assert!(events.recv().await.is_some());
    }
}
