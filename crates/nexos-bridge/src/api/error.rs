//! HTTP error responses
//!
//! Every failure leaves the bridge as `{"error": {"message", "type",
//! "details"?}}` with an appropriate status code.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use crate::error::BridgeError;
use crate::session::IdError;

/// Errors surfaced to API clients
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or invalid local configuration
    #[error("{0}")]
    Configuration(String),

    /// nexos.ai answered with a non-success status
    #[error("{message}")]
    Upstream {
        status: StatusCode,
        message: String,
        details: Option<Value>,
    },

    /// Bad client input
    #[error("{0}")]
    Validation(String),

    /// The upstream could not be reached or misbehaved
    #[error("{message}")]
    Transport {
        message: String,
        details: Option<Value>,
    },

    /// The session pointer could not be persisted
    #[error("{0}")]
    Storage(String),

    /// Relaying a generated file failed
    #[error("{message}")]
    FileDownload { status: StatusCode, message: String },
}

impl ApiError {
    /// Build an upstream error from a status and the raw response body
    ///
    /// JSON bodies are passed through as parsed values, anything else as text.
    pub fn upstream(status: StatusCode, body: &str) -> Self {
        let reason = status.canonical_reason().unwrap_or("Unknown");
        let details = serde_json::from_str::<Value>(body)
            .unwrap_or_else(|_| Value::String(body.to_string()));

        ApiError::Upstream {
            status,
            message: format!("Nexos API returned {}: {reason}", status.as_u16()),
            details: Some(details),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Configuration(_) | ApiError::Transport { .. } | ApiError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Upstream { status, .. } | ApiError::FileDownload { status, .. } => *status,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Value of the `type` field
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Configuration(_) => "configuration_error",
            ApiError::Upstream { .. } => "nexos_api_error",
            ApiError::Validation(_) => "invalid_request_error",
            ApiError::Transport { .. } => "api_error",
            ApiError::Storage(_) => "storage_error",
            ApiError::FileDownload { .. } => "file_download_error",
        }
    }

    fn details(&self) -> Option<&Value> {
        match self {
            ApiError::Upstream { details, .. } | ApiError::Transport { details, .. } => {
                details.as_ref()
            }
            _ => None,
        }
    }

    /// `{"error": {...}}` body, also sent as the final event of a broken stream
    pub fn body(&self) -> Value {
        let mut error = json!({
            "message": self.to_string(),
            "type": self.error_type(),
        });
        if let Some(details) = self.details() {
            error["details"] = details.clone();
        }
        json!({ "error": error })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{} ({}): {}", self.error_type(), status, self);
        } else {
            tracing::warn!("{} ({}): {}", self.error_type(), status, self);
        }

        (status, Json(self.body())).into_response()
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Config(message) => ApiError::Configuration(message),
            BridgeError::Storage(message) => ApiError::Storage(message),
            BridgeError::Upstream(message) => ApiError::Transport {
                message,
                details: None,
            },
            other => ApiError::Transport {
                message: other.to_string(),
                details: None,
            },
        }
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        ApiError::Validation(format!("Invalid request: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_upstream_error_keeps_status_and_json_details() {
        let err = ApiError::upstream(StatusCode::UNAUTHORIZED, r#"{"detail":"expired"}"#);
        let (status, body) = body_json(err).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "nexos_api_error");
        assert_eq!(
            body["error"]["message"],
            "Nexos API returned 401: Unauthorized"
        );
        assert_eq!(body["error"]["details"]["detail"], "expired");
    }

    #[tokio::test]
    async fn test_upstream_error_text_details() {
        let err = ApiError::upstream(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        let (status, body) = body_json(err).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["details"], "<html>oops</html>");
    }

    #[tokio::test]
    async fn test_validation_error() {
        let (status, body) = body_json(ApiError::Validation("No user message found".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["message"], "No user message found");
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn test_id_errors_name_the_offending_id() {
        let err: ApiError = crate::session::FileId::try_from("../x").unwrap_err().into();
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["message"],
            "Invalid request: file id may only contain letters, digits, '_' and '-'"
        );
    }

    #[tokio::test]
    async fn test_bridge_errors_map_to_api_errors() {
        let err: ApiError = BridgeError::Config("NEXOS_COOKIES not configured".into()).into();
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["type"], "configuration_error");
        assert_eq!(body["error"]["message"], "NEXOS_COOKIES not configured");

        let err: ApiError = BridgeError::Upstream("completion request timed out".into()).into();
        assert_eq!(err.error_type(), "api_error");

        let err: ApiError = BridgeError::Storage("disk full".into()).into();
        assert_eq!(err.error_type(), "storage_error");
    }

    #[tokio::test]
    async fn test_file_download_error_status() {
        let err = ApiError::FileDownload {
            status: StatusCode::NOT_FOUND,
            message: "File download returned 404".into(),
        };
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "file_download_error");
    }
}
