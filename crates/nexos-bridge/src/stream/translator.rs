//! Upstream body to OpenAI content translation
//!
//! [`ResponseTranslator`] consumes upstream lines one at a time and yields
//! the (rewritten) text a client should see. [`LineSplitter`] turns the raw
//! byte stream into those lines.

use super::buffer::PendingText;
use super::events::{StreamEvent, UpstreamLine, parse_line};
use super::rewrite::{FileMapping, LinkRewriter, LinkTarget};

/// How translated text is released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitMode {
    /// Release text as soon as it is safe to rewrite (SSE responses)
    Incremental,
    /// Collect everything and rewrite once at the end
    Aggregate,
}

/// Counters gathered while translating, for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationStats {
    pub text_chunks: usize,
    pub thinking_chunks: usize,
    pub emitted_chunks: usize,
    pub event_types: Vec<String>,
}

/// Per-response translation state
#[derive(Debug)]
pub struct ResponseTranslator {
    mode: EmitMode,
    rewriter: LinkRewriter,
    target: LinkTarget,
    files: FileMapping,
    pending: PendingText,
    aggregate: String,
    stats: TranslationStats,
}

impl ResponseTranslator {
    pub fn new(mode: EmitMode, rewriter: LinkRewriter, target: LinkTarget) -> Self {
        Self {
            mode,
            rewriter,
            target,
            files: FileMapping::new(),
            pending: PendingText::new(),
            aggregate: String::new(),
            stats: TranslationStats::default(),
        }
    }

    /// Feed one upstream line
    ///
    /// Returns text to send immediately. Always `None` in aggregate mode.
    pub fn feed_line(&mut self, line: &str) -> Option<String> {
        match parse_line(line) {
            UpstreamLine::EventType(event_type) => {
                self.stats.event_types.push(event_type);
                None
            }
            UpstreamLine::Data(event) => self.handle_event(event),
            UpstreamLine::Done | UpstreamLine::Other => None,
        }
    }

    fn handle_event(&mut self, event: StreamEvent) -> Option<String> {
        match event {
            StreamEvent::TextDelta(text) => {
                self.stats.text_chunks += 1;
                match self.mode {
                    EmitMode::Incremental => {
                        let ready = self.pending.push(&text)?;
                        self.emit(&ready)
                    }
                    EmitMode::Aggregate => {
                        self.aggregate.push_str(&text);
                        None
                    }
                }
            }
            StreamEvent::Thinking => {
                self.stats.thinking_chunks += 1;
                None
            }
            StreamEvent::Files(files) => {
                self.files.extend(files);
                None
            }
            StreamEvent::ContentError(error) => {
                tracing::warn!("Content error: {}", error);
                None
            }
            StreamEvent::Unrecognized => None,
        }
    }

    fn emit(&mut self, text: &str) -> Option<String> {
        let rewritten = self.rewriter.rewrite(text, &self.files, &self.target);
        if rewritten.is_empty() {
            return None;
        }
        self.stats.emitted_chunks += 1;
        Some(rewritten)
    }

    /// Release whatever text remains once the upstream body has ended
    ///
    /// In aggregate mode this is the whole response.
    pub fn finish(&mut self) -> Option<String> {
        match self.mode {
            EmitMode::Incremental => {
                let rest = self.pending.finish()?;
                self.emit(&rest)
            }
            EmitMode::Aggregate => {
                let full = std::mem::take(&mut self.aggregate);
                tracing::debug!(
                    "Event types found: {}",
                    self.stats.event_types.join(", ")
                );
                tracing::debug!(
                    "Extracted {} text chunks, {} thinking chunks, {} files, {} chars",
                    self.stats.text_chunks,
                    self.stats.thinking_chunks,
                    self.files.len(),
                    full.len()
                );
                self.emit(&full)
            }
        }
    }

    pub fn stats(&self) -> &TranslationStats {
        &self.stats
    }

    pub fn files(&self) -> &FileMapping {
        &self.files
    }
}

/// Splits a byte stream into `\n`-terminated lines
///
/// Splitting on the newline byte keeps multi-byte UTF-8 sequences that
/// straddle chunk boundaries intact.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Trailing data without a final newline
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}
