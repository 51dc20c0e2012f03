//! nexos.ai HTTP client
//!
//! Wraps every call the bridge makes to the upstream workspace: history
//! lookup, chat completion, file download and chat creation. Requests carry
//! the browser session cookie and the headers the web client sends.

mod payload;

pub use payload::{
    AdvancedParameters, ChatContinuation, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
    GEMINI_MAX_TOKENS, HandlerSelection, PayloadRequest, Tools, UpstreamPayload, UserMessage,
    build_payload, clamp_max_tokens, form_fields, is_gemini,
};

use regex::Regex;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::{BridgeError, Result};
use crate::session::{ChatId, FileId};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/146.0.0.0 Safari/537.36";

const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

static CHAT_PATH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/chat/([a-f0-9-]{36})").expect("valid chat path pattern"));

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    items: Vec<HistoryItem>,
}

#[derive(Debug, Deserialize)]
struct HistoryItem {
    id: Option<String>,
}

/// Raw outcome of a chat-creation call
#[derive(Debug, Clone)]
pub struct CreatedChat {
    /// Newly issued chat id, if one could be found
    pub chat_id: Option<String>,
    /// Response body (and redirect target) the id was searched in
    pub raw: String,
}

/// Client for the nexos.ai workspace
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    no_redirect: reqwest::Client,
    base: Url,
    base_url: String,
    credential: Option<String>,
    timeout: Duration,
}

impl UpstreamClient {
    /// Create a client from upstream configuration
    ///
    /// `timeout_secs` bounds connecting, each idle read and the wait for
    /// response headers, never the length of a streamed body. A missing
    /// cookie is not an error here; calls fail individually with a
    /// configuration error.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to create HTTP client: {e}")))?;

        let no_redirect = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let base = Url::parse(&format!("{base_url}/")).map_err(|e| {
            BridgeError::Config(format!("Invalid upstream base URL '{base_url}': {e}"))
        })?;

        Ok(Self {
            http,
            no_redirect,
            base,
            base_url,
            credential: config.credential(),
            timeout,
        })
    }

    /// Upstream base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Browser URL of a chat
    pub fn chat_url(&self, chat_id: &str) -> String {
        format!("{}/chat/{chat_id}", self.base_url)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| BridgeError::Config(format!("Invalid upstream path '{path}': {e}")))
    }

    /// Ensure a cookie credential is configured
    pub fn require_credential(&self) -> Result<&str> {
        self.credential.as_deref().ok_or_else(|| {
            tracing::error!("NEXOS_COOKIES not configured");
            BridgeError::Config("NEXOS_COOKIES not configured".to_string())
        })
    }

    fn headers(&self, referer: &str) -> Result<HeaderMap> {
        let cookie = self.require_credential()?;

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(
            header::REFERER,
            HeaderValue::from_str(referer)
                .map_err(|e| BridgeError::Config(format!("Invalid referer header: {e}")))?,
        );
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(cookie)
                .map_err(|e| BridgeError::Config(format!("Invalid cookie value: {e}")))?,
        );
        Ok(headers)
    }

    /// Id of the newest message in a chat, used as the continuation marker
    ///
    /// `Ok(None)` means the chat has no history yet.
    pub async fn fetch_last_message_id(&self, chat_id: &ChatId) -> Result<Option<String>> {
        let mut url = self.endpoint(&format!("api/chat/{chat_id}/history"))?;
        url.set_query(Some("offset=0"));

        let mut headers = self.headers(&self.chat_url(chat_id.as_str()))?;
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let response = self
            .http
            .get(url)
            .headers(headers)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error("history request", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Upstream(format!(
                "History request returned {status}"
            )));
        }

        let history: HistoryResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::Upstream(format!("Invalid history response: {e}")))?;

        Ok(history.items.into_iter().next().and_then(|item| item.id))
    }

    /// Send a completion request and return the raw upstream response
    ///
    /// Any HTTP status is returned as-is; only transport failures are errors.
    /// Headers must arrive within the timeout, the body may run longer.
    pub async fn send_completion(
        &self,
        chat_id: &ChatId,
        payload: &UpstreamPayload,
    ) -> Result<reqwest::Response> {
        let url = self.endpoint(&format!("api/chat/{chat_id}"))?;

        let mut headers = self.headers(&self.chat_url(chat_id.as_str()))?;
        headers.insert(
            header::ORIGIN,
            HeaderValue::from_str(&self.base_url)
                .map_err(|e| BridgeError::Config(format!("Invalid origin header: {e}")))?,
        );
        headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));

        let form = form_fields(chat_id.as_str(), payload)?
            .into_iter()
            .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                form.text(name, value)
            });

        tracing::debug!("Sending request to: {url}");

        let request = self.http.post(url).headers(headers).multipart(form).send();
        self.await_headers("completion request", request).await
    }

    /// Request a generated file; the caller inspects the status
    pub async fn download_file(
        &self,
        chat_id: &ChatId,
        file_id: &FileId,
    ) -> Result<reqwest::Response> {
        let url = self.endpoint(&format!("api/chat/{chat_id}/files/{file_id}/download"))?;
        let headers = self.headers(&self.chat_url(chat_id.as_str()))?;

        tracing::debug!("Downloading from: {url}");

        let request = self.http.get(url).headers(headers).send();
        self.await_headers("file download", request).await
    }

    async fn await_headers(
        &self,
        what: &str,
        request: impl Future<Output = reqwest::Result<reqwest::Response>>,
    ) -> Result<reqwest::Response> {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(response) => response.map_err(|e| transport_error(what, e)),
            Err(_) => Err(BridgeError::Upstream(format!(
                "{what} timed out after {}s waiting for response headers",
                self.timeout.as_secs()
            ))),
        }
    }

    /// Ask the workspace for a fresh chat
    ///
    /// The new chat id is carried in a redirect or in the `chat.data` body,
    /// so redirects are not followed.
    pub async fn create_chat(&self) -> Result<CreatedChat> {
        let url = self.endpoint("chat.data")?;
        let headers = self.headers(&format!("{}/", self.base_url))?;

        let response = self
            .no_redirect
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| transport_error("chat creation", e))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(BridgeError::Upstream(format!(
                "Chat creation returned {status}"
            )));
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .text()
            .await
            .map_err(|e| transport_error("chat creation body", e))?;

        let raw = match location {
            Some(location) if body.is_empty() => location,
            Some(location) => format!("{body}\n{location}"),
            None => body,
        };

        Ok(CreatedChat {
            chat_id: extract_chat_id(&raw),
            raw,
        })
    }
}

/// Find the first `/chat/<36-char id>` in `text`
pub fn extract_chat_id(text: &str) -> Option<String> {
    CHAT_PATH_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn transport_error(what: &str, e: reqwest::Error) -> BridgeError {
    if e.is_timeout() {
        BridgeError::Upstream(format!("{what} timed out: {e}"))
    } else if e.is_connect() {
        BridgeError::Upstream(format!("Failed to connect to upstream for {what}: {e}"))
    } else {
        BridgeError::Upstream(format!("{what} failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str, cookies: &str) -> UpstreamConfig {
        UpstreamConfig {
            base_url: base_url.to_string(),
            cookies: cookies.to_string(),
            ..UpstreamConfig::default()
        }
    }

    #[test]
    fn test_extract_chat_id_from_path() {
        let body = r#"[{"redirect":"/chat/0f1e2d3c-4b5a-6978-8899-aabbccddeeff"}]"#;
        assert_eq!(
            extract_chat_id(body),
            Some("0f1e2d3c-4b5a-6978-8899-aabbccddeeff".to_string())
        );
    }

    #[test]
    fn test_extract_chat_id_takes_first_match() {
        let body = "/chat/11111111-1111-1111-1111-111111111111 /chat/22222222-2222-2222-2222-222222222222";
        assert_eq!(
            extract_chat_id(body),
            Some("11111111-1111-1111-1111-111111111111".to_string())
        );
    }

    #[test]
    fn test_extract_chat_id_absent() {
        assert!(extract_chat_id("no chat here").is_none());
        assert!(extract_chat_id("/chat/short-id").is_none());
        assert!(extract_chat_id("/chat/ZZZZZZZZ-ZZZZ-ZZZZ-ZZZZ-ZZZZZZZZZZZZ").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = UpstreamClient::new(&config("https://nexos.example.com/", "a=b")).unwrap();
        assert_eq!(client.base_url(), "https://nexos.example.com");
        assert_eq!(client.chat_url("abc"), "https://nexos.example.com/chat/abc");
    }

    #[test]
    fn test_endpoint_join_keeps_prefix() {
        let client = UpstreamClient::new(&config("https://host.example/workspace", "a=b")).unwrap();
        let url = client.endpoint("api/chat/abc").unwrap();
        assert_eq!(url.as_str(), "https://host.example/workspace/api/chat/abc");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = UpstreamClient::new(&config("not a url", "a=b"));
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_missing_credential() {
        let client = UpstreamClient::new(&config("https://nexos.example.com", "")).unwrap();
        assert!(matches!(
            client.require_credential(),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn test_headers_include_cookie_and_referer() {
        let client = UpstreamClient::new(&config("https://nexos.example.com", "sid=1\r\n")).unwrap();
        let headers = client.headers("https://nexos.example.com/chat/abc").unwrap();
        assert_eq!(headers.get(header::COOKIE).unwrap(), "sid=1");
        assert_eq!(
            headers.get(header::REFERER).unwrap(),
            "https://nexos.example.com/chat/abc"
        );
        assert_eq!(headers.get(header::USER_AGENT).unwrap(), USER_AGENT);
    }
}
