//! `POST /v1/chat/completions`
//!
//! Replays the last user message into the current nexos.ai chat and turns
//! the upstream event stream into either one `chat.completion` or a series
//! of `chat.completion.chunk` SSE events ending in `[DONE]`.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::Config;
use crate::openai::{ChatCompletion, ChatCompletionChunk, ChatCompletionRequest};
use crate::session::ChatId;
use crate::stream::{EmitMode, LineSplitter, LinkTarget, ResponseTranslator};
use crate::upstream::{DEFAULT_MAX_TOKENS, PayloadRequest, build_payload};

use super::error::ApiError;
use super::server::AppState;

/// Header that routes a single request to a specific chat
pub const CHAT_ID_HEADER: &str = "x-nexos-chat-id";

const STREAM_BUFFER: usize = 32;

pub async fn completions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::Validation(e.body_text()))?;

    let message = request
        .last_user_message()
        .ok_or_else(|| ApiError::Validation("No user message found".to_string()))?;

    state.upstream.require_credential()?;

    let chat_id = resolve_chat_id(&state, &headers, &request).await?;
    let model = request.model_name().to_string();
    let handler_id = state.registry.resolve(&model);

    tracing::info!(
        "New chat request: model={model}, chat={chat_id}, stream={}",
        request.stream
    );
    tracing::debug!("User message ({} chars)", message.len());

    let last_message_id = if state.config.upstream.disable_history || request.disable_history {
        tracing::debug!("History continuation disabled for this request");
        None
    } else {
        match state.upstream.fetch_last_message_id(&chat_id).await {
            Ok(Some(id)) => {
                tracing::debug!("Continuing after message {id}");
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to fetch chat history, starting fresh: {e}");
                None
            }
        }
    };

    let payload = build_payload(&PayloadRequest {
        model: &model,
        handler_id,
        message: &message,
        max_tokens: Some(request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        temperature: request.temperature,
        last_message_id,
    });

    let response = state.upstream.send_completion(&chat_id, &payload).await?;

    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        tracing::error!("Nexos API error: {status}");
        return Err(ApiError::upstream(status, &body));
    }

    let target = LinkTarget::new(public_base(&state.config, &headers), chat_id.as_str());

    if request.stream {
        let translator =
            ResponseTranslator::new(EmitMode::Incremental, state.rewriter.clone(), target);
        Ok(stream_response(response, translator, model))
    } else {
        let translator =
            ResponseTranslator::new(EmitMode::Aggregate, state.rewriter.clone(), target);
        aggregate_response(response, translator, &model).await
    }
}

/// Header override, then request body, then the session store
async fn resolve_chat_id(
    state: &AppState,
    headers: &HeaderMap,
    request: &ChatCompletionRequest,
) -> Result<ChatId, ApiError> {
    let from_header = headers
        .get(CHAT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(id) = from_header {
        tracing::debug!("Using chat id from {CHAT_ID_HEADER} header");
        return Ok(ChatId::try_from(id)?);
    }

    if let Some(id) = request.chat_id.as_deref().filter(|v| !v.is_empty()) {
        tracing::debug!("Using chat id from request body");
        return Ok(ChatId::try_from(id)?);
    }

    let current = state.sessions.get_current().await;
    ChatId::try_from(current.chat_id.as_str()).map_err(|e| {
        ApiError::Configuration(format!("Stored chat id '{}' is invalid: {e}", current.chat_id))
    })
}

/// Scheme and authority rewritten links should point at
pub fn public_base(config: &Config, headers: &HeaderMap) -> String {
    if let Some(url) = config.server.public_url.as_deref().filter(|u| !u.is_empty()) {
        return url.trim_end_matches('/').to_string();
    }

    match headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        Some(host) => format!("http://{host}"),
        None => format!("http://{}", config.server.listen_addr()),
    }
}

async fn aggregate_response(
    response: reqwest::Response,
    mut translator: ResponseTranslator,
    model: &str,
) -> Result<Response, ApiError> {
    let body = response.text().await.map_err(|e| ApiError::Transport {
        message: format!("Failed to read upstream response: {e}"),
        details: None,
    })?;

    for line in body.split('\n') {
        translator.feed_line(line);
    }
    let content = translator.finish();

    tracing::info!(
        "Completed non-streaming response ({} chars)",
        content.as_ref().map_or(0, String::len)
    );

    Ok(Json(ChatCompletion::new(model, content)).into_response())
}

fn stream_response(
    response: reqwest::Response,
    translator: ResponseTranslator,
    model: String,
) -> Response {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(relay_stream(response, translator, model, tx));

    let stream = ReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Pump the upstream body into SSE events
///
/// Returns early, dropping the upstream response, once the client is gone.
/// A body that breaks off mid-way ends with an error event instead of
/// `[DONE]`, so truncated output never looks complete.
async fn relay_stream(
    response: reqwest::Response,
    mut translator: ResponseTranslator,
    model: String,
    tx: mpsc::Sender<Event>,
) {
    let mut body = response.bytes_stream();
    let mut splitter = LineSplitter::new();
    let mut sent = 0usize;
    let mut failure = None;

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("Upstream stream interrupted after {sent} chunks: {e}");
                failure = Some(ApiError::Transport {
                    message: format!("Upstream stream interrupted: {e}"),
                    details: None,
                });
                break;
            }
        };

        for line in splitter.push(&chunk) {
            if let Some(text) = translator.feed_line(&line) {
                if !send_chunk(&tx, &model, text).await {
                    tracing::debug!("Client disconnected, abandoning upstream stream");
                    return;
                }
                sent += 1;
            }
        }
    }

    let tail = splitter
        .finish()
        .and_then(|line| translator.feed_line(&line))
        .into_iter()
        .chain(translator.finish());
    for text in tail {
        if !send_chunk(&tx, &model, text).await {
            return;
        }
        sent += 1;
    }

    let stats = translator.stats();
    tracing::info!(
        "Sent {sent} chunks in streaming mode ({} text, {} thinking upstream)",
        stats.text_chunks,
        stats.thinking_chunks
    );

    let last = match failure {
        Some(err) => Event::default().data(err.body().to_string()),
        None => Event::default().data("[DONE]"),
    };
    let _ = tx.send(last).await;
}

/// Returns false when the receiver has gone away
async fn send_chunk(tx: &mpsc::Sender<Event>, model: &str, text: String) -> bool {
    let event = match Event::default().json_data(ChatCompletionChunk::new(model, text)) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Failed to encode completion chunk: {e}");
            return true;
        }
    };
    tx.send(event).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_public_base_prefers_configured_url() {
        let mut config = Config::default();
        config.server.public_url = Some("https://bridge.example.com/".to_string());
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:3000"));

        assert_eq!(public_base(&config, &headers), "https://bridge.example.com");
    }

    #[test]
    fn test_public_base_uses_host_header() {
        let config = Config::default();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("10.0.0.5:8080"));

        assert_eq!(public_base(&config, &headers), "http://10.0.0.5:8080");
    }

    #[test]
    fn test_public_base_falls_back_to_bind_address() {
        let config = Config::default();
        assert_eq!(public_base(&config, &HeaderMap::new()), "http://0.0.0.0:3000");
    }
}
