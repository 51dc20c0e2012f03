//! Upstream event stream handling
//!
//! Decoding of upstream lines, the pending-text buffer that keeps image links
//! whole, link rewriting and the translator tying them together.

mod buffer;
mod events;
mod rewrite;
mod translator;

pub use buffer::PendingText;
pub use events::{FileRef, StreamEvent, UpstreamLine, decode_event, parse_line};
pub use rewrite::{
    FileMapping, LinkRewriter, LinkTarget, SANDBOX_PREFIX, contains_sandbox_link,
    ends_with_partial_sandbox_link,
};
pub use translator::{EmitMode, LineSplitter, ResponseTranslator, TranslationStats};
