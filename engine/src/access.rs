//! Allow-list access control
//!
//! When enabled, a message is processed only if its chat id is listed and
//! its sender matches a user entry by numeric id, username or `@username`.
//! When disabled, everyone is allowed.

use sdk::errors::EngineError;

use crate::config::AccessConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessControl {
    enabled: bool,
    users: Vec<String>,
    chats: Vec<String>,
}

impl AccessControl {
    pub fn new(enabled: bool, users: Vec<String>, chats: Vec<String>) -> Self {
        Self {
            enabled,
            users,
            chats,
        }
    }

    pub fn from_config(config: &AccessConfig) -> Self {
        Self::new(
            config.enabled,
            config.allowed_users.clone(),
            config.allowed_chats.clone(),
        )
    }

    /// Everyone allowed
    pub fn open() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_user_allowed(&self, user_id: i64, username: Option<&str>) -> bool {
        if !self.enabled {
            return true;
        }
        let id = user_id.to_string();
        self.users.iter().any(|entry| {
            if *entry == id {
                return true;
            }
            match username {
                Some(name) if !name.is_empty() => {
                    entry == name || entry.strip_prefix('@') == Some(name)
                }
                _ => false,
            }
        })
    }

    pub fn is_chat_allowed(&self, chat_id: i64) -> bool {
        if !self.enabled {
            return true;
        }
        let id = chat_id.to_string();
        self.chats.iter().any(|entry| *entry == id)
    }

    /// Check both the chat and the sender
    ///
    /// # Errors
    ///
    /// Returns `EngineError::AccessDenied` when either is not listed.
    pub fn check(
        &self,
        chat_id: i64,
        user_id: i64,
        username: Option<&str>,
    ) -> Result<(), EngineError> {
        if self.is_chat_allowed(chat_id) && self.is_user_allowed(user_id, username) {
            Ok(())
        } else {
            Err(EngineError::AccessDenied {
                user: user_id.to_string(),
                chat: chat_id.to_string(),
            })
        }
    }
}
