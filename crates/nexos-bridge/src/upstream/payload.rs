//! Outbound chat payload
//!
//! nexos.ai receives one user message per call together with the handler that
//! should answer it. Everything here is pure: the client encodes the result
//! into a multipart form and sends it.

use serde::Serialize;

use crate::error::{BridgeError, Result};

/// Hard completion-token ceiling for Gemini handlers
pub const GEMINI_MAX_TOKENS: u64 = 65_536;

/// Completion-token budget used when a request does not set `max_tokens`
pub const DEFAULT_MAX_TOKENS: u64 = 128_000;

/// OpenAI's default sampling temperature; not forwarded
pub const DEFAULT_TEMPERATURE: f64 = 1.0;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HandlerSelection {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub fallbacks: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserMessage {
    pub text: String,
    pub client_metadata: serde_json::Map<String, serde_json::Value>,
    pub files: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AdvancedParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl AdvancedParameters {
    pub fn is_empty(&self) -> bool {
        self.max_completion_tokens.is_none() && self.temperature.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ToolToggle {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Tools {
    pub web_search: ToolToggle,
    pub deep_research: ToolToggle,
    pub code_interpreter: ToolToggle,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            web_search: ToolToggle { enabled: true },
            deep_research: ToolToggle { enabled: false },
            code_interpreter: ToolToggle { enabled: true },
        }
    }
}

/// Continuation marker: resume the chat after this message
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatContinuation {
    pub last_message_id: String,
}

/// The JSON blob sent as the `data` form field
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpstreamPayload {
    pub handler: HandlerSelection,
    pub user_message: UserMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced_parameters: Option<AdvancedParameters>,
    #[serde(rename = "functionalityHeader")]
    pub functionality_header: String,
    pub tools: Tools,
    pub enabled_integrations: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat: Option<ChatContinuation>,
}

/// Inputs for [`build_payload`]
#[derive(Debug, Clone, Default)]
pub struct PayloadRequest<'a> {
    /// Public model name, used to pick per-family limits
    pub model: &'a str,
    /// Resolved upstream handler
    pub handler_id: &'a str,
    /// Text of the last user message
    pub message: &'a str,
    /// Requested completion budget; `None` or zero leaves it to the upstream
    pub max_tokens: Option<u64>,
    /// Requested temperature; `None` means the caller did not set one
    pub temperature: Option<f64>,
    /// Id of the newest message already in the chat
    pub last_message_id: Option<String>,
}

/// Whether `model` belongs to the Gemini family
pub fn is_gemini(model: &str) -> bool {
    model.to_lowercase().contains("gemini")
}

/// Cap `requested` at the model family's ceiling
pub fn clamp_max_tokens(model: &str, requested: u64) -> u64 {
    if is_gemini(model) && requested > GEMINI_MAX_TOKENS {
        tracing::debug!(
            "Adjusted max_tokens from {requested} to {GEMINI_MAX_TOKENS} for Gemini model"
        );
        GEMINI_MAX_TOKENS
    } else {
        requested
    }
}

/// Build the upstream payload for one completion call
pub fn build_payload(request: &PayloadRequest<'_>) -> UpstreamPayload {
    let mut advanced = AdvancedParameters::default();

    if let Some(requested) = request.max_tokens.filter(|t| *t > 0) {
        advanced.max_completion_tokens = Some(clamp_max_tokens(request.model, requested));
    }

    if let Some(temperature) = request.temperature {
        if temperature != DEFAULT_TEMPERATURE {
            advanced.temperature = Some(temperature);
        }
    }

    UpstreamPayload {
        handler: HandlerSelection {
            id: request.handler_id.to_string(),
            kind: "model".to_string(),
            fallbacks: true,
        },
        user_message: UserMessage {
            text: request.message.to_string(),
            client_metadata: serde_json::Map::new(),
            files: Vec::new(),
        },
        advanced_parameters: (!advanced.is_empty()).then_some(advanced),
        functionality_header: "chat".to_string(),
        tools: Tools::default(),
        enabled_integrations: Vec::new(),
        chat: request
            .last_message_id
            .clone()
            .map(|last_message_id| ChatContinuation { last_message_id }),
    }
}

/// Multipart form fields for a completion call, in send order
pub fn form_fields(chat_id: &str, payload: &UpstreamPayload) -> Result<Vec<(&'static str, String)>> {
    let data = serde_json::to_string(payload)
        .map_err(|e| BridgeError::Serialization(format!("Failed to encode payload: {e}")))?;

    Ok(vec![
        ("action", "chat_completion".to_string()),
        ("chatId", chat_id.to_string()),
        ("data", data),
    ])
}
