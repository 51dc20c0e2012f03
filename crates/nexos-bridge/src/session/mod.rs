//! Current-chat pointer
//!
//! The bridge keeps exactly one piece of durable state: which upstream chat
//! new completions are sent to. Handlers reach it through the injected
//! [`SessionStore`] trait.

mod file;
mod ids;

pub use file::FileSessionStore;
pub use ids::{ChatId, FileId, IdError, IdKind};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Where the current chat id came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatSource {
    /// Persisted pointer
    File,
    /// Configured default
    Config,
}

/// The chat new completions are routed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentChat {
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub source: ChatSource,
}

/// Persistence for the current chat pointer
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read the current chat, falling back to the configured default.
    ///
    /// Never fails; read problems are logged and the default is returned.
    async fn get_current(&self) -> CurrentChat;

    /// Replace the current chat
    async fn set_current(&self, chat_id: &ChatId) -> Result<()>;
}
