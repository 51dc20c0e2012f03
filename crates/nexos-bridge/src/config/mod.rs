use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{BridgeError, Result};
use crate::models::{ModelEntry, default_models};

/// Main configuration structure for nexos-bridge
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Local HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// nexos.ai upstream configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Current-chat pointer persistence
    #[serde(default)]
    pub session: SessionConfig,
    /// Public model table (replaces the built-in table when present)
    #[serde(default = "default_models")]
    pub models: Vec<ModelEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            session: SessionConfig::default(),
            models: default_models(),
        }
    }
}

impl Config {
    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides using an arbitrary variable lookup
    ///
    /// Empty values are ignored so that `FOO=` in a shell does not wipe a
    /// configured value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("NEXOS_BASE_URL") {
            self.upstream.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("NEXOS_CHAT_ID") {
            self.upstream.chat_id = v;
        }
        if let Some(v) = get("NEXOS_HANDLER_ID") {
            self.upstream.handler_id = v;
        }
        if let Some(v) = get("NEXOS_COOKIES") {
            self.upstream.cookies = v;
        }
        if let Some(v) = get("DISABLE_HISTORY") {
            self.upstream.disable_history = v == "true";
        }
        if let Some(v) = get("NEXOS_TIMEOUT_SECS") {
            self.upstream.timeout_secs = v
                .parse()
                .map_err(|e| BridgeError::Config(format!("Invalid NEXOS_TIMEOUT_SECS '{v}': {e}")))?;
        }
        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = v
                .parse()
                .map_err(|e| BridgeError::Config(format!("Invalid PORT '{v}': {e}")))?;
        }
        if let Some(v) = get("NEXOS_PUBLIC_URL") {
            self.server.public_url = Some(v.trim_end_matches('/').to_string());
        }
        if let Some(v) = get("NEXOS_STATE_FILE") {
            self.session.state_file = PathBuf::from(v);
        }

        Ok(())
    }
}

/// Local HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL used in rewritten download links instead of the request's Host header
    #[serde(default)]
    pub public_url: Option<String>,
}

impl ServerConfig {
    /// The `host:port` pair the server listens on
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// nexos.ai upstream configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the nexos.ai workspace
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Chat used when no current chat has been persisted
    #[serde(default = "default_chat_id")]
    pub chat_id: String,
    /// Handler used for models missing from the model table
    #[serde(default = "default_handler_id")]
    pub handler_id: String,
    /// Browser session cookie header value
    #[serde(default)]
    pub cookies: String,
    /// Skip the history lookup that provides `last_message_id`
    #[serde(default)]
    pub disable_history: bool,
    /// Upper bound for every upstream call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    /// The cookie credential with line breaks and padding removed, if any
    pub fn credential(&self) -> Option<String> {
        let cleaned: String = self
            .cookies
            .chars()
            .filter(|c| *c != '\r' && *c != '\n')
            .collect();
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned.to_string())
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_id: default_chat_id(),
            handler_id: default_handler_id(),
            cookies: String::new(),
            disable_history: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://workspace.nexos.ai".to_string()
}

fn default_chat_id() -> String {
    "b6aa7e13-5a78-4436-8668-700da8b6b790".to_string()
}

fn default_handler_id() -> String {
    "4839e638-49d1-4c97-a1e5-0ad68b317c4b".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

/// Current-chat pointer persistence
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// JSON file holding `{"chatId": "..."}`
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

fn default_state_file() -> PathBuf {
    PathBuf::from("current-chat.json")
}
