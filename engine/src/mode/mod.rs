//! Mode Controller
//!
//! Each conversation runs in one of two modes:
//!
//! - **Persona** (`/mode chat`, the default): Raiden Ei character, 30 message
//!   memory, short replies, may reply unprompted.
//! - **Assistant** (`/mode assistant`): plain helpful assistant, 10 message
//!   memory, long replies, only replies when addressed.
//!
//! Everything a mode decides is static and lives in its [`ModeProfile`].
//! Switching modes wipes the conversation's log so the previous persona's
//! history never leaks into the new one.
//!
//! The mode map is in memory only. A restart puts every conversation back in
//! Persona mode.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::diagnostics::{DiagnosticBus, DiagnosticEvent};
use crate::llm::GenerationParams;
use crate::memory::ConversationStore;

pub mod prompts;

/// Operating mode of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Persona,
    Assistant,
}

/// Rejected mode argument
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModeError {
    #[error("Invalid mode '{0}'. Must be one of: chat, assistant")]
    InvalidMode(String),
}

impl From<ModeError> for sdk::errors::EngineError {
    fn from(e: ModeError) -> Self {
        match e {
            ModeError::InvalidMode(raw) => Self::InvalidMode(raw),
        }
    }
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Persona, Mode::Assistant];

    /// Widest history window any mode reads; storage must retain at least this
    pub fn largest_history_limit() -> usize {
        Self::ALL
            .iter()
            .map(|mode| mode.profile().history_limit)
            .max()
            .unwrap_or_default()
    }

    /// Command token selecting this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Persona => "chat",
            Mode::Assistant => "assistant",
        }
    }

    /// Capitalized name used in chat replies
    pub fn title(&self) -> &'static str {
        match self {
            Mode::Persona => "Chat",
            Mode::Assistant => "Assistant",
        }
    }

    pub fn profile(&self) -> &'static ModeProfile {
        match self {
            Mode::Persona => &PERSONA_PROFILE,
            Mode::Assistant => &ASSISTANT_PROFILE,
        }
    }

    pub fn description(&self) -> &'static str {
        prompts::description(*self)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chat" | "persona" => Ok(Mode::Persona),
            "assistant" => Ok(Mode::Assistant),
            _ => Err(ModeError::InvalidMode(s.to_string())),
        }
    }
}

/// Static behaviour of a mode
#[derive(Debug, Clone, PartialEq)]
pub struct ModeProfile {
    /// Records of history sent with each request
    pub history_limit: usize,

    /// System prompt opening each request
    pub system_prompt: &'static str,

    /// Generation parameters, including the reply length budget
    pub params: GenerationParams,

    /// Whether the bot may reply without being addressed
    pub spontaneous: bool,
}

static PERSONA_PROFILE: ModeProfile = ModeProfile {
    history_limit: 30,
    system_prompt: prompts::PERSONA_SYSTEM_PROMPT,
    params: GenerationParams {
        max_tokens: 500,
        temperature: 1.3,
        top_p: 0.95,
        frequency_penalty: 0.3,
        presence_penalty: 0.3,
    },
    spontaneous: true,
};

static ASSISTANT_PROFILE: ModeProfile = ModeProfile {
    history_limit: 10,
    system_prompt: prompts::ASSISTANT_SYSTEM_PROMPT,
    params: GenerationParams {
        max_tokens: 1300,
        temperature: 0.7,
        top_p: 0.9,
        frequency_penalty: 0.1,
        presence_penalty: 0.1,
    },
    spontaneous: false,
};

/// Outcome of an accepted mode switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSwitch {
    pub previous: Mode,
    pub current: Mode,
}

/// A conversation's mode together with the log generation it applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeView {
    pub mode: Mode,
    pub generation: u64,
}

/// Per-conversation mode assignments
#[derive(Debug)]
pub struct ModeController {
    modes: RwLock<HashMap<String, Mode>>,
    store: Arc<ConversationStore>,
    diagnostics: DiagnosticBus,
}

impl ModeController {
    pub fn new(store: Arc<ConversationStore>) -> Self {
        Self {
            modes: RwLock::new(HashMap::new()),
            store,
            diagnostics: DiagnosticBus::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticBus) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Current mode, Persona when never set
    pub async fn get_mode(&self, conversation_id: &str) -> Mode {
        self.modes
            .read()
            .await
            .get(conversation_id)
            .copied()
            .unwrap_or_default()
    }

    /// Current mode and log generation, read together.
    ///
    /// A mode switch holds the map's write lock while it clears the log, so
    /// the pair can never mix the old mode with the new generation.
    pub async fn view(&self, conversation_id: &str) -> ModeView {
        let modes = self.modes.read().await;
        let mode = modes.get(conversation_id).copied().unwrap_or_default();
        let generation = self.store.generation(conversation_id).await;
        ModeView { mode, generation }
    }

    /// Switch a conversation's mode from a raw command argument.
    ///
    /// The log is cleared before the new mode takes effect, even when the
    /// mode does not change.
    ///
    /// # Errors
    ///
    /// Returns `ModeError::InvalidMode` for anything but `chat`, `persona`
    /// or `assistant`; nothing is changed in that case.
    pub async fn set_mode(&self, conversation_id: &str, raw: &str) -> Result<ModeSwitch, ModeError> {
        let requested: Mode = raw.parse()?;

        let previous = {
            let mut modes = self.modes.write().await;
            let previous = modes.get(conversation_id).copied().unwrap_or_default();
            self.store.clear(conversation_id).await;
            modes.insert(conversation_id.to_string(), requested);
            previous
        };

        tracing::info!(
            "Conversation {} switched from {} to {} mode",
            conversation_id,
            previous,
            requested
        );
        self.diagnostics
            .publish(DiagnosticEvent::ModeChanged {
                conversation: conversation_id.to_string(),
                from: previous.to_string(),
                to: requested.to_string(),
            })
            .await;

        Ok(ModeSwitch {
            previous,
            current: requested,
        })
    }
}
