//! Holding back text that may end inside an image link
//!
//! A sandbox link can arrive split across several deltas. Rewriting it only
//! works on the complete link, so any text that ends partway through a
//! possible link is held until the link closes or turns out to be something
//! else.

use super::rewrite::{contains_sandbox_link, ends_with_partial_sandbox_link};

/// Text waiting to be flushed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PendingText {
    #[default]
    Empty,
    Pending(String),
}

impl PendingText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return the text that is ready to emit, if any
    pub fn push(&mut self, delta: &str) -> Option<String> {
        let mut buffer = match std::mem::take(self) {
            Self::Empty => String::new(),
            Self::Pending(text) => text,
        };
        buffer.push_str(delta);

        if buffer.is_empty() {
            return None;
        }

        if should_hold(&buffer) {
            tracing::trace!("Holding {} bytes for a possibly incomplete link", buffer.len());
            *self = Self::Pending(buffer);
            None
        } else {
            Some(buffer)
        }
    }

    /// Release whatever is left at end of stream
    pub fn finish(&mut self) -> Option<String> {
        match std::mem::take(self) {
            Self::Empty => None,
            Self::Pending(text) if text.is_empty() => None,
            Self::Pending(text) => Some(text),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// Held only while the buffer ends mid-link and has no complete link yet
fn should_hold(buffer: &str) -> bool {
    ends_with_partial_sandbox_link(buffer) && !contains_sandbox_link(buffer)
}
