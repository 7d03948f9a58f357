//! Conversation engine
//!
//! Platform-neutral handling of inbound chat traffic. The transport
//! ([`telegram`]) turns updates into [`InboundMessage`]s and hands them to a
//! shared [`ConversationEngine`], which runs the pipeline:
//!
//! access check → reply context → append → trigger → completion
//!
//! Commands (`/start`, `/mode`, `/info`) are answered with plain text that
//! the transport posts back.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::access::AccessControl;
use crate::diagnostics::DiagnosticBus;
use crate::llm::CompletionProvider;
use crate::memory::{ConversationStore, MessageRecord, ReplyResolver};
use crate::mode::{prompts, ModeController};
use crate::orchestrator::{CompletionOrchestrator, ReplySink, Turn};
use crate::trigger::TriggerEngine;

pub mod telegram;

/// The message an inbound message replies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRef {
    pub message_id: i64,
    /// Display name of the replied-to author, when known
    pub author: Option<String>,
    /// Whether the replied-to message was posted by this bot
    pub from_bot: bool,
}

/// A chat message as the engine sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub chat_type: String,
    pub chat_title: Option<String>,
    pub message_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub text: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub reply_to: Option<ReplyRef>,
}

impl InboundMessage {
    /// Username, else first name, else `user_<id>`
    pub fn display_name(&self) -> String {
        display_name(self.user_id, self.username.as_deref(), self.first_name.as_deref())
    }

    /// Conversation key for this chat
    pub fn conversation_id(&self) -> String {
        self.chat_id.to_string()
    }
}

/// Username, else first name, else `user_<id>`
pub fn display_name(user_id: i64, username: Option<&str>, first_name: Option<&str>) -> String {
    username
        .filter(|name| !name.is_empty())
        .or(first_name.filter(|name| !name.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("user_{}", user_id))
}

/// A parsed bot command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Mode(Option<String>),
    Info,
}

impl Command {
    /// Parse `/name[@bot] [args]`. Unknown commands yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let head = parts.next()?.strip_prefix('/')?;
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        match name.as_str() {
            "start" => Some(Command::Start),
            "mode" => Some(Command::Mode(parts.next().map(str::to_string))),
            "info" => Some(Command::Info),
            _ => None,
        }
    }
}

const WHITELIST_NOTE: &str = "\n\nWhitelist mode is **enabled**";

/// Shared per-process state behind every chat
pub struct ConversationEngine {
    store: Arc<ConversationStore>,
    modes: ModeController,
    trigger: TriggerEngine,
    resolver: ReplyResolver,
    orchestrator: CompletionOrchestrator,
    access: AccessControl,
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("store", &self.store.dir())
            .field("access_enabled", &self.access.is_enabled())
            .finish_non_exhaustive()
    }
}

impl ConversationEngine {
    /// Wire the engine around an opened store.
    ///
    /// `diagnostics` should be the bus the store reports on.
    pub fn new(
        store: Arc<ConversationStore>,
        provider: Arc<dyn CompletionProvider>,
        access: AccessControl,
        diagnostics: DiagnosticBus,
    ) -> Self {
        Self {
            modes: ModeController::new(Arc::clone(&store)).with_diagnostics(diagnostics.clone()),
            trigger: TriggerEngine::default(),
            resolver: ReplyResolver::new(Arc::clone(&store)),
            orchestrator: CompletionOrchestrator::new(Arc::clone(&store), provider)
                .with_diagnostics(diagnostics),
            access,
            store,
        }
    }

    /// Replace the trigger engine, e.g. with a fixed random source
    pub fn with_trigger(mut self, trigger: TriggerEngine) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.orchestrator = self.orchestrator.with_timeout(timeout);
        self
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn modes(&self) -> &ModeController {
        &self.modes
    }

    /// Run a non-command message through the pipeline.
    ///
    /// Returns the reply that was delivered, if any.
    pub async fn handle_message(&self, msg: &InboundMessage, sink: &dyn ReplySink) -> Option<String> {
        let text = msg.text.as_deref().filter(|t| !t.is_empty())?;

        if let Err(e) = self
            .access
            .check(msg.chat_id, msg.user_id, msg.username.as_deref())
        {
            debug!("Ignoring message: {}", e);
            return None;
        }

        let conversation_id = msg.conversation_id();
        let author = msg.display_name();
        let view = self.modes.view(&conversation_id).await;
        let mode = view.mode;

        // Resolve before appending so the lookup sees the window the sender saw
        let reply_context = match &msg.reply_to {
            Some(reply) => self.resolver.resolve(&conversation_id, reply.message_id).await,
            None => None,
        };

        let mut record = MessageRecord::new(author.clone(), text, msg.message_id)
            .with_target(msg.reply_to.as_ref().and_then(|r| r.author.clone()))
            .replying_to(msg.reply_to.as_ref().map(|r| r.message_id));
        if let Some(date) = msg.date {
            record = record.at(date);
        }
        if self
            .store
            .append_if_current(&conversation_id, record, view.generation)
            .await
            .is_none()
        {
            debug!(
                "Mode changed in {} before message {} was stored",
                conversation_id, msg.message_id
            );
            return None;
        }

        let is_reply_to_bot = msg.reply_to.as_ref().is_some_and(|r| r.from_bot);
        let decision = self.trigger.should_respond(text, is_reply_to_bot, mode);
        if !decision.responds() {
            return None;
        }
        debug!("Responding in {} ({:?})", conversation_id, decision);

        let turn = Turn {
            conversation_id,
            chat_id: msg.chat_id,
            author,
            text: text.to_string(),
            message_id: msg.message_id,
            generation: view.generation,
        };
        self.orchestrator
            .respond(&turn, mode, reply_context.as_deref(), sink)
            .await
    }

    /// Answer a command. Returns `None` when nothing should be posted.
    pub async fn handle_command(&self, msg: &InboundMessage, command: &Command) -> Option<String> {
        if *command == Command::Info {
            return Some(self.info_text(msg));
        }

        if let Err(e) = self
            .access
            .check(msg.chat_id, msg.user_id, msg.username.as_deref())
        {
            debug!("Ignoring command: {}", e);
            return None;
        }

        let conversation_id = msg.conversation_id();
        let reply = match command {
            Command::Start => {
                let mode = self.modes.get_mode(&conversation_id).await;
                self.with_whitelist_note(prompts::greeting(mode).to_string())
            }
            Command::Mode(None) => {
                let mode = self.modes.get_mode(&conversation_id).await;
                self.with_whitelist_note(format!(
                    "{}\n\n{}",
                    prompts::mode_listing(mode),
                    mode.description()
                ))
            }
            Command::Mode(Some(raw)) => match self.modes.set_mode(&conversation_id, raw).await {
                Ok(switch) => {
                    info!(
                        "{} switched conversation {} to {} mode",
                        msg.display_name(),
                        conversation_id,
                        switch.current
                    );
                    prompts::switch_message(switch.previous, switch.current)
                }
                Err(e) => {
                    debug!("Rejected mode switch: {}", e);
                    prompts::INVALID_MODE_MESSAGE.to_string()
                }
            },
            Command::Info => self.info_text(msg),
        };

        Some(reply)
    }

    fn with_whitelist_note(&self, mut text: String) -> String {
        if self.access.is_enabled() {
            text.push_str(WHITELIST_NOTE);
        }
        text
    }

    /// Ids and allow-list status for whoever asks
    fn info_text(&self, msg: &InboundMessage) -> String {
        let mut text = String::from("**Chat Information**\n\n");
        text.push_str(&format!("**Your User ID:** `{}`\n", msg.user_id));
        text.push_str(&format!(
            "**Your Username:** @{}\n",
            msg.username.as_deref().unwrap_or("None")
        ));
        text.push_str(&format!("**Chat ID:** `{}`\n", msg.chat_id));
        text.push_str(&format!("**Chat Type:** {}\n", msg.chat_type));
        if msg.chat_type == "group" || msg.chat_type == "supergroup" {
            text.push_str(&format!(
                "**Chat Title:** {}\n",
                msg.chat_title.as_deref().unwrap_or("None")
            ));
        }

        text.push_str("\n**For configuration:**\n");
        text.push_str(&format!("• Add `{}` to WHITELIST_USERS\n", msg.user_id));
        text.push_str(&format!("• Add `{}` to WHITELIST_CHATS\n", msg.chat_id));

        if self.access.is_enabled() {
            let user_ok = self
                .access
                .is_user_allowed(msg.user_id, msg.username.as_deref());
            let chat_ok = self.access.is_chat_allowed(msg.chat_id);
            text.push_str("\n**Whitelist Status:**\n");
            text.push_str(&format!(
                "• User access: {}\n",
                if user_ok { "Allowed" } else { "Blocked" }
            ));
            text.push_str(&format!(
                "• Chat access: {}\n",
                if chat_ok { "Allowed" } else { "Blocked" }
            ));
        } else {
            text.push_str("\n**Whitelist is disabled** - Public access mode");
        }

        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, LLMError};
    use crate::mode::Mode;
    use crate::trigger::FixedRandom;
    use async_trait::async_trait;
    use sdk::errors::EngineError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn generate(&self, _request: &CompletionRequest) -> Result<String, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("As you wish.".to_string())
        }
    }

    struct NullSink;

    #[async_trait]
    impl ReplySink for NullSink {
        async fn send_reply(&self, _chat_id: i64, reply_to: i64, _text: &str) -> Result<i64, EngineError> {
            Ok(reply_to + 1)
        }
    }

    fn message(id: i64, text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: -1001,
            chat_type: "supergroup".to_string(),
            chat_title: Some("Tenshukaku".to_string()),
            message_id: id,
            user_id: 42,
            username: Some("alice".to_string()),
            first_name: Some("Alice".to_string()),
            text: Some(text.to_string()),
            date: None,
            reply_to: None,
        }
    }

    fn engine(
        dir: &tempfile::TempDir,
        access: AccessControl,
        draw: f64,
    ) -> (ConversationEngine, Arc<CountingProvider>) {
        let store = Arc::new(ConversationStore::new(dir.path(), 30).unwrap());
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let engine = ConversationEngine::new(store, provider.clone(), access, DiagnosticBus::new())
            .with_trigger(TriggerEngine::new(Box::new(FixedRandom(draw))));
        (engine, provider)
    }

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(display_name(1, Some("alice"), Some("Alice")), "alice");
        assert_eq!(display_name(1, None, Some("Alice")), "Alice");
        assert_eq!(display_name(1, Some(""), None), "user_1");
        assert_eq!(display_name(7, None, None), "user_7");
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(
            Command::parse("/mode@RaidenBot assistant"),
            Some(Command::Mode(Some("assistant".to_string())))
        );
        assert_eq!(Command::parse("/mode"), Some(Command::Mode(None)));
        assert_eq!(Command::parse("/INFO"), Some(Command::Info));
        assert_eq!(Command::parse("/help"), None);
        assert_eq!(Command::parse("hello"), None);
    }

    #[tokio::test]
    async fn test_silent_message_is_still_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, provider) = engine(&dir, AccessControl::open(), 0.99);

        let reply = engine.handle_message(&message(1, "ok cool"), &NullSink).await;

        assert!(reply.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.store().read("-1001", None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_mention_gets_reply_and_both_records() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, provider) = engine(&dir, AccessControl::open(), 0.99);

        let reply = engine.handle_message(&message(10, "hey Raiden"), &NullSink).await;

        assert_eq!(reply.as_deref(), Some("As you wish."));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        let log = engine.store().read("-1001", None).await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].author, "alice");
        assert_eq!(log[1].author, "Raiden");
        assert_eq!(log[1].message_id, 11);
    }

    #[tokio::test]
    async fn test_reply_record_carries_target_and_link() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(&dir, AccessControl::open(), 0.99);
        engine.handle_message(&message(1, "first"), &NullSink).await;

        let mut reply = message(2, "agreed");
        reply.reply_to = Some(ReplyRef {
            message_id: 1,
            author: Some("bob".to_string()),
            from_bot: false,
        });
        engine.handle_message(&reply, &NullSink).await;

        let log = engine.store().read("-1001", None).await;
        assert_eq!(log[1].target.as_deref(), Some("bob"));
        assert_eq!(log[1].reply_to, Some(1));
    }

    #[tokio::test]
    async fn test_denied_sender_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let access = AccessControl::new(true, vec!["999".to_string()], vec!["-1001".to_string()]);
        let (engine, provider) = engine(&dir, access, 0.0);

        assert!(engine.handle_message(&message(1, "raiden!"), &NullSink).await.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(engine.store().read("-1001", None).await.is_empty());
        assert!(engine.handle_command(&message(2, "/start"), &Command::Start).await.is_none());
    }

    #[tokio::test]
    async fn test_info_bypasses_access() {
        let dir = tempfile::tempdir().unwrap();
        let access = AccessControl::new(true, vec![], vec![]);
        let (engine, _) = engine(&dir, access, 0.99);

        let text = engine
            .handle_command(&message(1, "/info"), &Command::Info)
            .await
            .unwrap();

        assert!(text.contains("`42`"));
        assert!(text.contains("`-1001`"));
        assert!(text.contains("Tenshukaku"));
        assert!(text.contains("User access: Blocked"));
    }

    #[tokio::test]
    async fn test_mode_command_flow() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(&dir, AccessControl::open(), 0.99);
        engine.handle_message(&message(1, "ok cool"), &NullSink).await;

        let listing = engine
            .handle_command(&message(2, "/mode"), &Command::Mode(None))
            .await
            .unwrap();
        assert!(listing.starts_with("Current mode: **Chat Mode**"));

        let switched = engine
            .handle_command(&message(3, "/mode assistant"), &Command::Mode(Some("assistant".into())))
            .await
            .unwrap();
        assert!(switched.starts_with("Switched from Chat Mode to **Assistant Mode**"));
        assert_eq!(engine.modes().get_mode("-1001").await, Mode::Assistant);
        assert!(engine.store().read("-1001", None).await.is_empty());

        let invalid = engine
            .handle_command(&message(4, "/mode pirate"), &Command::Mode(Some("pirate".into())))
            .await
            .unwrap();
        assert_eq!(invalid, prompts::INVALID_MODE_MESSAGE);
        assert_eq!(engine.modes().get_mode("-1001").await, Mode::Assistant);
    }
}
