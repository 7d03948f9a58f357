//! Telegram Bot Integration
//!
//! Long-polls the Bot API for updates and hands each message to the
//! [`ConversationEngine`] in its own task. Replies go back through
//! `sendMessage` as replies to the triggering message.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{display_name, Command, ConversationEngine, InboundMessage, ReplyRef};
use crate::orchestrator::ReplySink;
use crate::secrets::{scrub, SecretString};

/// Default Bot API endpoint
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram rejects messages longer than this many characters
const MAX_MESSAGE_CHARS: usize = 4096;

/// Pause after a failed poll
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct TelegramBot {
    token: SecretString,
    api_base: String,
    poll_timeout_secs: u64,
    client: Client,
    engine: Arc<ConversationEngine>,
    bot_id: Option<i64>,
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("api_base", &self.api_base)
            .field("bot_id", &self.bot_id)
            .field("token", &self.token)
            .finish()
    }
}

#[derive(Deserialize, Debug)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Deserialize, Debug)]
struct Message {
    message_id: i64,
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
    #[serde(default)]
    date: i64,
    reply_to_message: Option<Box<Message>>,
}

#[derive(Deserialize, Debug)]
struct Chat {
    id: i64,
    #[serde(rename = "type", default)]
    kind: String,
    title: Option<String>,
}

#[derive(Deserialize, Debug)]
struct User {
    id: i64,
    #[serde(default)]
    is_bot: bool,
    username: Option<String>,
    first_name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SentMessage {
    message_id: i64,
}

#[derive(Serialize)]
struct SendMsgReq<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

impl TelegramBot {
    pub fn new(token: SecretString, engine: Arc<ConversationEngine>, poll_timeout_secs: u64) -> Self {
        Self {
            token,
            api_base: TELEGRAM_API_BASE.to_string(),
            poll_timeout_secs,
            client: Client::builder()
                .timeout(Duration::from_secs(poll_timeout_secs + 30))
                .build()
                .unwrap_or_default(),
            engine,
            bot_id: None,
        }
    }

    /// Point at a different Bot API server
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token.unsecure(), method)
    }

    /// Ask the API who we are, so replies to other bots don't count as
    /// replies to us
    pub async fn identify(&mut self) -> Result<i64> {
        let response = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!(scrub(&e.to_string())))?
            .json::<ApiResponse<User>>()
            .await
            .map_err(|e| anyhow::anyhow!(scrub(&e.to_string())))?;

        let me = match response.result {
            Some(me) if response.ok => me,
            _ => {
                return Err(anyhow::anyhow!(
                    "getMe failed: {}",
                    response.description.unwrap_or_default()
                ))
            }
        };

        info!(
            "Authenticated as @{}",
            me.username.as_deref().unwrap_or("unknown")
        );
        self.bot_id = Some(me.id);
        Ok(me.id)
    }

    /// Start the long-polling loop
    ///
    /// Runs until the surrounding task is dropped. Each message is handled in
    /// its own spawned task.
    pub async fn start_polling(&self) -> Result<()> {
        info!("Starting Telegram long-polling loop...");
        let mut offset = 0;

        loop {
            match self.get_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        offset = update.update_id + 1;
                        let Some(msg) = update.message else {
                            continue;
                        };
                        let bot = self.clone();
                        tokio::spawn(async move {
                            bot.dispatch(msg).await;
                        });
                    }
                }
                Err(e) => {
                    error!("Failed to fetch Telegram updates: {}", e);
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.poll_timeout_secs.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!(scrub(&e.to_string())))?
            .json::<ApiResponse<Vec<Update>>>()
            .await
            .map_err(|e| anyhow::anyhow!(scrub(&e.to_string())))?;

        if !response.ok {
            return Err(anyhow::anyhow!(
                "Telegram API returned ok=false: {}",
                response.description.unwrap_or_default()
            ));
        }

        Ok(response.result.unwrap_or_default())
    }

    async fn dispatch(&self, msg: Message) {
        let Some(inbound) = to_inbound(&msg, self.bot_id) else {
            debug!("Message {} has no sender - ignoring", msg.message_id);
            return;
        };
        let Some(text) = inbound.text.as_deref() else {
            return;
        };

        if text.starts_with('/') {
            // Unknown commands are dropped, not treated as chat
            let Some(command) = Command::parse(text) else {
                return;
            };
            if let Some(reply) = self.engine.handle_command(&inbound, &command).await {
                if let Err(e) = self
                    .send_message(inbound.chat_id, &reply, Some(inbound.message_id), Some("Markdown"))
                    .await
                {
                    error!("Failed to send command reply: {}", e);
                }
            }
            return;
        }

        self.engine.handle_message(&inbound, self).await;
    }

    /// Post a message. Returns the id Telegram assigned to it.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
        parse_mode: Option<&str>,
    ) -> Result<i64, EngineError> {
        let scrubbed = truncate(&scrub(text));

        let req = SendMsgReq {
            chat_id,
            text: &scrubbed,
            reply_to_message_id: reply_to,
            parse_mode,
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&req)
            .send()
            .await
            .map_err(|e| EngineError::Transport(scrub(&e.to_string())))?
            .json::<ApiResponse<SentMessage>>()
            .await
            .map_err(|e| EngineError::Transport(scrub(&e.to_string())))?;

        match response.result {
            Some(sent) if response.ok => Ok(sent.message_id),
            _ => {
                let reason = response
                    .description
                    .unwrap_or_else(|| "sendMessage returned ok=false".to_string());
                warn!("Telegram rejected message to {}: {}", chat_id, reason);
                Err(EngineError::Transport(reason))
            }
        }
    }
}

#[async_trait]
impl ReplySink for TelegramBot {
    async fn send_reply(&self, chat_id: i64, reply_to: i64, text: &str) -> Result<i64, EngineError> {
        self.send_message(chat_id, text, Some(reply_to), None).await
    }
}

/// Convert a Bot API message. `None` when there is no sender.
fn to_inbound(msg: &Message, bot_id: Option<i64>) -> Option<InboundMessage> {
    let from = msg.from.as_ref()?;

    let reply_to = msg.reply_to_message.as_ref().map(|original| {
        let author = original.from.as_ref();
        ReplyRef {
            message_id: original.message_id,
            author: author.map(|u| display_name(u.id, u.username.as_deref(), u.first_name.as_deref())),
            from_bot: author.is_some_and(|u| match bot_id {
                Some(id) => u.id == id,
                None => u.is_bot,
            }),
        }
    });

    Some(InboundMessage {
        chat_id: msg.chat.id,
        chat_type: msg.chat.kind.clone(),
        chat_title: msg.chat.title.clone(),
        message_id: msg.message_id,
        user_id: from.id,
        username: from.username.clone(),
        first_name: from.first_name.clone(),
        text: msg.text.clone(),
        date: chrono::DateTime::<chrono::Utc>::from_timestamp(msg.date, 0).filter(|_| msg.date > 0),
        reply_to,
    })
}

/// Cut text to Telegram's length limit on a char boundary
fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let suffix = "...\n\n(truncated)";
    let keep = MAX_MESSAGE_CHARS - suffix.chars().count();
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str(suffix);
    cut
}
