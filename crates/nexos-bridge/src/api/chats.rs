//! Chat management: create a new upstream chat, switch the current chat and
//! report which chat is current.

use axum::{Json, extract::State};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::session::{ChatId, CurrentChat, IdError};

use super::error::ApiError;
use super::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateChatRequest {
    /// Make the new chat current; defaults to true
    #[serde(default)]
    pub auto_switch: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateChatResponse {
    pub success: bool,
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub url: String,
    #[serde(rename = "currentChat")]
    pub current_chat: bool,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SwitchChatRequest {
    #[serde(rename = "chatId", default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwitchChatResponse {
    pub success: bool,
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub message: String,
}

/// Decode an optional JSON body; an empty body yields the default
fn parse_body<T>(body: &Bytes) -> Result<T, ApiError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("Invalid JSON body: {e}")))
}

/// `POST /v1/chat/create`
pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<CreateChatResponse>, ApiError> {
    let request: CreateChatRequest = parse_body(&body)?;
    let auto_switch = request.auto_switch != Some(false);

    tracing::info!("Creating new chat");

    state.upstream.require_credential()?;
    let created = state.upstream.create_chat().await?;

    let Some(new_id) = created.chat_id else {
        tracing::error!("Failed to extract chat ID from response");
        return Err(ApiError::Transport {
            message: "Failed to extract chat ID from response".to_string(),
            details: Some(serde_json::Value::String(created.raw)),
        });
    };
    let chat_id = ChatId::try_from(new_id.as_str())?;

    tracing::info!("Created new chat ID: {chat_id}");

    let current_chat = auto_switch && state.sessions.set_current(&chat_id).await.is_ok();

    let message = if current_chat {
        format!("New chat created and set as current: {chat_id}")
    } else {
        format!(
            "New chat created: {chat_id}. Call POST /v1/chat/switch with chatId to switch to it."
        )
    };

    Ok(Json(CreateChatResponse {
        success: true,
        url: state.upstream.chat_url(chat_id.as_str()),
        chat_id: chat_id.into(),
        current_chat,
        message,
    }))
}

/// `POST /v1/chat/switch`
pub async fn switch_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SwitchChatResponse>, ApiError> {
    let request: SwitchChatRequest = parse_body(&body)?;

    let chat_id = match ChatId::try_from(request.chat_id.unwrap_or_default()) {
        Ok(id) => id,
        Err(IdError::Empty(_)) => {
            return Err(ApiError::Validation("chatId is required".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    state
        .sessions
        .set_current(&chat_id)
        .await
        .map_err(|_| ApiError::Storage("Failed to switch chat".to_string()))?;

    Ok(Json(SwitchChatResponse {
        success: true,
        message: format!("Switched to chat: {chat_id}"),
        chat_id: chat_id.into(),
    }))
}

/// `GET /v1/chat/current`
pub async fn current_handler(State(state): State<Arc<AppState>>) -> Json<CurrentChat> {
    Json(state.sessions.get_current().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_body_defaults() {
        let request: CreateChatRequest = parse_body(&Bytes::new()).unwrap();
        assert!(request.auto_switch.is_none());

        let request: SwitchChatRequest = parse_body(&Bytes::from_static(b"  \n")).unwrap();
        assert!(request.chat_id.is_none());
    }

    #[test]
    fn test_parse_body_fields() {
        let request: CreateChatRequest =
            parse_body(&Bytes::from_static(br#"{"auto_switch": false}"#)).unwrap();
        assert_eq!(request.auto_switch, Some(false));

        let request: SwitchChatRequest =
            parse_body(&Bytes::from_static(br#"{"chatId": "abc-123"}"#)).unwrap();
        assert_eq!(request.chat_id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_parse_body_rejects_garbage() {
        let err = parse_body::<SwitchChatRequest>(&Bytes::from_static(b"{nope")).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
