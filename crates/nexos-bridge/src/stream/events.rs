//! Upstream event decoding
//!
//! nexos.ai answers with an SSE-like body: `event: <type>` lines, `data:
//! <json>` lines and a terminal `data: [DONE]`. Each data line is decoded on
//! its own into one of a closed set of shapes; anything else is
//! [`StreamEvent::Unrecognized`] and ignored.

use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::Value;

/// A file produced by an upstream tool run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Name used in `sandbox:/mnt/output-data/<name>` links
    pub name: String,
    /// Upstream file id
    pub file_uuid: String,
}

/// A decoded data line
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Generated answer text
    TextDelta(String),
    /// Reasoning text; counted, never emitted
    Thinking,
    /// Tool result listing generated files
    Files(Vec<FileRef>),
    /// Upstream reported an error inside a content frame
    ContentError(String),
    /// Any other frame
    Unrecognized,
}

/// One line of the upstream body
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamLine {
    /// `event: <type>`
    EventType(String),
    /// `data: <json>`
    Data(StreamEvent),
    /// `data: [DONE]`
    Done,
    /// Blank lines, comments, anything else
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFrame {
    ToolResult {
        tool_result: ToolResultFrame,
    },
    Content {
        #[serde(default)]
        content_type: Option<String>,
        content: ContentFrame,
    },
    Unrecognized(IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct ToolResultFrame {
    result: ToolResultBody,
}

#[derive(Debug, Deserialize)]
struct ToolResultBody {
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ResultEntry {
    files: FileListing,
}

#[derive(Debug, Deserialize)]
struct FileListing {
    files: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct FileDescriptor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    file_uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentFrame {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thinking: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl RawFrame {
    fn into_event(self) -> StreamEvent {
        match self {
            RawFrame::ToolResult { tool_result } => {
                StreamEvent::Files(collect_files(tool_result.result.results))
            }
            RawFrame::Content {
                content_type,
                content,
            } => classify_content(content_type.as_deref(), content),
            RawFrame::Unrecognized(_) => StreamEvent::Unrecognized,
        }
    }
}

fn collect_files(results: Vec<Value>) -> Vec<FileRef> {
    results
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<ResultEntry>(entry).ok())
        .flat_map(|entry| entry.files.files)
        .filter_map(|file| serde_json::from_value::<FileDescriptor>(file).ok())
        .filter_map(|file| match (file.name, file.file_uuid) {
            (Some(name), Some(file_uuid)) if !name.is_empty() && !file_uuid.is_empty() => {
                Some(FileRef { name, file_uuid })
            }
            _ => None,
        })
        .collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn classify_content(content_type: Option<&str>, content: ContentFrame) -> StreamEvent {
    if content_type == Some("text") {
        if let Some(text) = content.text.filter(|t| !t.is_empty()) {
            return StreamEvent::TextDelta(text);
        }
    }

    if content_type == Some("thinking") || content.thinking.as_ref().is_some_and(is_truthy) {
        return StreamEvent::Thinking;
    }

    if let Some(error) = content.error.filter(is_truthy) {
        let message = match error {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return StreamEvent::ContentError(message);
    }

    StreamEvent::Unrecognized
}

/// Decode the JSON payload of a data line
///
/// Malformed JSON decodes to [`StreamEvent::Unrecognized`].
pub fn decode_event(json: &str) -> StreamEvent {
    match serde_json::from_str::<RawFrame>(json) {
        Ok(frame) => frame.into_event(),
        Err(_) => StreamEvent::Unrecognized,
    }
}

/// Classify one line of the upstream body
pub fn parse_line(line: &str) -> UpstreamLine {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if let Some(event_type) = line.strip_prefix("event: ") {
        return UpstreamLine::EventType(event_type.trim().to_string());
    }

    if let Some(data) = line.strip_prefix("data: ") {
        if data.contains("[DONE]") {
            return UpstreamLine::Done;
        }
        return UpstreamLine::Data(decode_event(data));
    }

    UpstreamLine::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta() {
        let event = decode_event(r#"{"content_type":"text","content":{"text":"Hello"}}"#);
        assert_eq!(event, StreamEvent::TextDelta("Hello".to_string()));
    }

    #[test]
    fn test_empty_text_is_not_a_delta() {
        let event = decode_event(r#"{"content_type":"text","content":{"text":""}}"#);
        assert_eq!(event, StreamEvent::Unrecognized);
    }

    #[test]
    fn test_text_without_text_content_type_is_ignored() {
        let event = decode_event(r#"{"content_type":"tool","content":{"text":"internal"}}"#);
        assert_eq!(event, StreamEvent::Unrecognized);
    }

    #[test]
    fn test_thinking_content() {
        let event = decode_event(r#"{"content_type":"thinking","content":{"text":"hmm"}}"#);
        assert_eq!(event, StreamEvent::Thinking);

        let event = decode_event(r#"{"content":{"text":"","thinking":"pondering"}}"#);
        assert_eq!(event, StreamEvent::Thinking);
    }

    #[test]
    fn test_content_error() {
        let event = decode_event(r#"{"content":{"error":"rate limited"}}"#);
        assert_eq!(event, StreamEvent::ContentError("rate limited".to_string()));
    }

    #[test]
    fn test_tool_result_files() {
        let json = r#"{"tool_result":{"result":{"results":[
            {"files":{"files":[{"name":"foo.png","file_uuid":"uuid-1"},{"name":"bar.csv","file_uuid":"uuid-2"}]}},
            {"stdout":"no files here"},
            {"files":{"files":[{"name":"incomplete"}]}}
        ]}}}"#;

        let event = decode_event(json);
        assert_eq!(
            event,
            StreamEvent::Files(vec![
                FileRef {
                    name: "foo.png".to_string(),
                    file_uuid: "uuid-1".to_string()
                },
                FileRef {
                    name: "bar.csv".to_string(),
                    file_uuid: "uuid-2".to_string()
                },
            ])
        );
    }

    #[test]
    fn test_tool_result_without_results_is_ignored() {
        let event = decode_event(r#"{"tool_result":{"status":"running"}}"#);
        assert_eq!(event, StreamEvent::Unrecognized);
    }

    #[test]
    fn test_malformed_json_is_ignored() {
        assert_eq!(decode_event("{not json"), StreamEvent::Unrecognized);
        assert_eq!(decode_event(""), StreamEvent::Unrecognized);
        assert_eq!(decode_event("42"), StreamEvent::Unrecognized);
    }

    #[test]
    fn test_parse_line_kinds() {
        assert_eq!(
            parse_line("event: message_delta"),
            UpstreamLine::EventType("message_delta".to_string())
        );
        assert_eq!(parse_line("data: [DONE]"), UpstreamLine::Done);
        assert_eq!(
            parse_line("data: {\"content_type\":\"text\",\"content\":{\"text\":\"x\"}}\r"),
            UpstreamLine::Data(StreamEvent::TextDelta("x".to_string()))
        );
        assert_eq!(parse_line(""), UpstreamLine::Other);
        assert_eq!(parse_line(": keep-alive"), UpstreamLine::Other);
        assert_eq!(parse_line("data:{}"), UpstreamLine::Other);
    }
}
