//! `GET /v1/files/{chat_id}/{file_id}/download`
//!
//! Authenticated relay for files generated inside an upstream chat. The body
//! is streamed through without buffering.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use std::sync::Arc;

use crate::session::{ChatId, FileId};

use super::error::ApiError;
use super::server::AppState;

/// Upstream headers copied onto the relayed response
const FORWARDED_HEADERS: [HeaderName; 3] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_DISPOSITION,
];

pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    Path((chat_id, file_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let chat_id = ChatId::try_from(chat_id)?;
    let file_id = FileId::try_from(file_id)?;

    tracing::info!("File download request: chat={chat_id}, file={file_id}");

    state.upstream.require_credential()?;

    let response = state
        .upstream
        .download_file(&chat_id, &file_id)
        .await
        .map_err(|e| ApiError::FileDownload {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        })?;

    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::debug!("File download error body: {body}");
        return Err(ApiError::FileDownload {
            status,
            message: format!("Request failed with status code {}", status.as_u16()),
        });
    }

    let mut builder = Response::builder().status(StatusCode::OK);
    for name in FORWARDED_HEADERS {
        if let Some(value) = response.headers().get(name.as_str()) {
            if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
                builder = builder.header(name, value);
            }
        }
    }

    let body = Body::from_stream(response.bytes_stream());

    builder.body(body).map_err(|e| ApiError::FileDownload {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("Failed to build response: {e}"),
    })
}
