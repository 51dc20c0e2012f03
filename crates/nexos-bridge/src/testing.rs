//! Test utilities for nexos-bridge
//!
//! An in-memory session store and builders for upstream event-stream bodies,
//! shared by unit and integration tests.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;

use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::session::{ChatId, ChatSource, CurrentChat, SessionStore};

/// Cookie value used by [`test_config`]
pub const TEST_COOKIE: &str = "session=test-cookie";

/// Session store kept in memory
#[derive(Debug)]
pub struct InMemorySessionStore {
    default_chat_id: String,
    current: Mutex<Option<String>>,
    fail_writes: bool,
}

impl InMemorySessionStore {
    pub fn new(default_chat_id: impl Into<String>) -> Self {
        Self {
            default_chat_id: default_chat_id.into(),
            current: Mutex::new(None),
            fail_writes: false,
        }
    }

    /// A store whose writes always fail
    pub fn failing(default_chat_id: impl Into<String>) -> Self {
        Self {
            fail_writes: true,
            ..Self::new(default_chat_id)
        }
    }

    /// A store that already has a persisted pointer
    pub fn with_current(default_chat_id: impl Into<String>, current: impl Into<String>) -> Self {
        let store = Self::new(default_chat_id);
        *store.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(current.into());
        store
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_current(&self) -> CurrentChat {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match current.as_ref() {
            Some(chat_id) => CurrentChat {
                chat_id: chat_id.clone(),
                source: ChatSource::File,
            },
            None => CurrentChat {
                chat_id: self.default_chat_id.clone(),
                source: ChatSource::Config,
            },
        }
    }

    async fn set_current(&self, chat_id: &ChatId) -> Result<()> {
        if self.fail_writes {
            return Err(BridgeError::Storage("write refused".to_string()));
        }
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(chat_id.to_string());
        Ok(())
    }
}

/// Configuration pointing at a mock upstream, with a cookie and history enabled
pub fn test_config(upstream_base_url: &str) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 3000;
    config.upstream.base_url = upstream_base_url.trim_end_matches('/').to_string();
    config.upstream.cookies = TEST_COOKIE.to_string();
    config.upstream.timeout_secs = 5;
    config
}

/// `event: <type>`
pub fn event_line(event_type: &str) -> String {
    format!("event: {event_type}")
}

/// A text delta data line
pub fn text_frame(text: &str) -> String {
    format!(
        "data: {}",
        json!({"content_type": "text", "content": {"text": text}})
    )
}

/// A reasoning data line
pub fn thinking_frame(text: &str) -> String {
    format!(
        "data: {}",
        json!({"content_type": "thinking", "content": {"text": "", "thinking": text}})
    )
}

/// A tool result announcing generated files as `(name, file_uuid)` pairs
pub fn files_frame(files: &[(&str, &str)]) -> String {
    let files: Vec<_> = files
        .iter()
        .map(|(name, uuid)| json!({"name": name, "file_uuid": uuid}))
        .collect();
    format!(
        "data: {}",
        json!({"tool_result": {"result": {"results": [{"files": {"files": files}}]}}})
    )
}

/// `data: [DONE]`
pub fn done_line() -> String {
    "data: [DONE]".to_string()
}

/// Join lines into an upstream body the way the upstream frames it
pub fn sse_body<S: AsRef<str>>(lines: &[S]) -> String {
    let mut body = String::new();
    for line in lines {
        body.push_str(line.as_ref());
        body.push_str("\n\n");
    }
    body
}
