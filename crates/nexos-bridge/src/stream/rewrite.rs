//! Link rewriting
//!
//! Generated files live behind the upstream's authenticated download
//! endpoint. Links to them are rewritten to this proxy's
//! `/v1/files/{chat}/{file}/download` relay so clients can fetch them.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

use super::events::FileRef;
use crate::error::{BridgeError, Result};

/// Path prefix of upstream sandbox files
pub const SANDBOX_PREFIX: &str = "sandbox:/mnt/output-data/";

/// A complete `![alt](sandbox:/mnt/output-data/<name>)` image link
pub(crate) static SANDBOX_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[([^\]]*)\]\(sandbox:/mnt/output-data/([^)]+)\)")
        .expect("valid sandbox link pattern")
});

/// Upstream filename to file id, for a single response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMapping {
    files: HashMap<String, String>,
}

impl FileMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, file_uuid: impl Into<String>) {
        self.files.insert(name.into(), file_uuid.into());
    }

    pub fn extend(&mut self, files: impl IntoIterator<Item = FileRef>) {
        for file in files {
            tracing::debug!("File mapping: {} -> {}", file.name, file.file_uuid);
            self.files.insert(file.name, file.file_uuid);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Where rewritten links point for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    /// Scheme and authority of this proxy, e.g. `http://localhost:3000`
    pub public_base: String,
    /// Chat the response belongs to
    pub chat_id: String,
}

impl LinkTarget {
    pub fn new(public_base: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            public_base: public_base.into().trim_end_matches('/').to_string(),
            chat_id: chat_id.into(),
        }
    }

    /// Proxied download URL for a file in `chat_id`
    pub fn download_url(&self, chat_id: &str, file_id: &str) -> String {
        format!("{}/v1/files/{chat_id}/{file_id}/download", self.public_base)
    }
}

/// Rewrites sandbox links and direct upstream download URLs
#[derive(Debug, Clone)]
pub struct LinkRewriter {
    upstream_download: Regex,
}

impl LinkRewriter {
    /// Build a rewriter for the given upstream base URL
    pub fn new(upstream_base_url: &str) -> Result<Self> {
        let base = regex::escape(upstream_base_url.trim_end_matches('/'));
        let upstream_download = Regex::new(&format!(
            r"{base}/api/chat/([^/\s()]+)/files/([^/\s()]+)/download"
        ))
        .map_err(|e| BridgeError::Config(format!("Invalid upstream base URL pattern: {e}")))?;

        Ok(Self { upstream_download })
    }

    /// Apply both rewrite passes to `text`
    ///
    /// Sandbox links whose filename is not in `files` are left untouched.
    pub fn rewrite(&self, text: &str, files: &FileMapping, target: &LinkTarget) -> String {
        if text.is_empty() {
            return String::new();
        }

        let text = rewrite_sandbox_links(text, files, target);

        self.upstream_download
            .replace_all(&text, |caps: &Captures<'_>| target.download_url(&caps[1], &caps[2]))
            .into_owned()
    }
}

fn rewrite_sandbox_links(text: &str, files: &FileMapping, target: &LinkTarget) -> String {
    SANDBOX_LINK
        .replace_all(text, |caps: &Captures<'_>| {
            let alt = &caps[1];
            let filename = &caps[2];
            match files.get(filename) {
                Some(file_uuid) => {
                    let url = target.download_url(&target.chat_id, file_uuid);
                    tracing::debug!("Replaced image link: {filename} -> {url}");
                    format!("![{alt}]({url})")
                }
                None => {
                    tracing::warn!("No file UUID found for: {filename}");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Whether `text` contains at least one complete sandbox image link
pub fn contains_sandbox_link(text: &str) -> bool {
    SANDBOX_LINK.is_match(text)
}

/// Whether `text` ends partway through something that may become a sandbox
/// image link, e.g. `![chart](sandbox:/mnt/out`
pub fn ends_with_partial_sandbox_link(text: &str) -> bool {
    if text.ends_with('!') {
        return true;
    }

    let Some(start) = text.rfind("![") else {
        return false;
    };
    let rest = &text[start + 2..];

    let Some(close) = rest.find(']') else {
        return !rest.contains('\n');
    };
    let after_alt = &rest[close + 1..];

    let Some(target) = after_alt.strip_prefix('(') else {
        return after_alt.is_empty();
    };
    if target.contains(')') {
        return false;
    }

    if target.len() <= SANDBOX_PREFIX.len() {
        SANDBOX_PREFIX.starts_with(target)
    } else {
        target.starts_with(SANDBOX_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPSTREAM: &str = "https://workspace.nexos.ai";

    fn target() -> LinkTarget {
        LinkTarget::new("http://localhost:3000", "chat-1")
    }

    fn mapping(pairs: &[(&str, &str)]) -> FileMapping {
        let mut files = FileMapping::new();
        for (name, uuid) in pairs {
            files.insert(*name, *uuid);
        }
        files
    }

    #[test]
    fn test_sandbox_link_rewritten_with_mapping() {
        let rewriter = LinkRewriter::new(UPSTREAM).unwrap();
        let out = rewriter.rewrite(
            "Here: ![alt](sandbox:/mnt/output-data/foo.png) done",
            &mapping(&[("foo.png", "X")]),
            &target(),
        );
        assert_eq!(
            out,
            "Here: ![alt](http://localhost:3000/v1/files/chat-1/X/download) done"
        );
    }

    #[test]
    fn test_sandbox_link_without_mapping_unchanged() {
        let rewriter = LinkRewriter::new(UPSTREAM).unwrap();
        let text = "![alt](sandbox:/mnt/output-data/foo.png)";
        assert_eq!(rewriter.rewrite(text, &FileMapping::new(), &target()), text);
    }

    #[test]
    fn test_multiple_links_partially_mapped() {
        let rewriter = LinkRewriter::new(UPSTREAM).unwrap();
        let out = rewriter.rewrite(
            "![a](sandbox:/mnt/output-data/a.png) ![b](sandbox:/mnt/output-data/b.png)",
            &mapping(&[("b.png", "B")]),
            &target(),
        );
        assert_eq!(
            out,
            "![a](sandbox:/mnt/output-data/a.png) ![b](http://localhost:3000/v1/files/chat-1/B/download)"
        );
    }

    #[test]
    fn test_upstream_download_url_rewritten() {
        let rewriter = LinkRewriter::new(UPSTREAM).unwrap();
        let out = rewriter.rewrite(
            "Get it at https://workspace.nexos.ai/api/chat/other-chat/files/F1/download now",
            &FileMapping::new(),
            &target(),
        );
        assert_eq!(
            out,
            "Get it at http://localhost:3000/v1/files/other-chat/F1/download now"
        );
    }

    #[test]
    fn test_upstream_download_url_inside_markdown() {
        let rewriter = LinkRewriter::new(UPSTREAM).unwrap();
        let out = rewriter.rewrite(
            "[report](https://workspace.nexos.ai/api/chat/c/files/f/download)",
            &FileMapping::new(),
            &target(),
        );
        assert_eq!(out, "[report](http://localhost:3000/v1/files/c/f/download)");
    }

    #[test]
    fn test_other_hosts_not_rewritten() {
        let rewriter = LinkRewriter::new(UPSTREAM).unwrap();
        let text = "https://evil.example/api/chat/c/files/f/download";
        assert_eq!(rewriter.rewrite(text, &FileMapping::new(), &target()), text);
    }

    #[test]
    fn test_base_url_is_escaped() {
        let rewriter = LinkRewriter::new("http://127.0.0.1:8080").unwrap();
        let text = "http://127a0a0a1:8080/api/chat/c/files/f/download";
        assert_eq!(rewriter.rewrite(text, &FileMapping::new(), &target()), text);
    }

    #[test]
    fn test_partial_link_detection() {
        for partial in [
            "see !",
            "see ![",
            "see ![chart",
            "see ![chart]",
            "see ![chart](",
            "see ![chart](sand",
            "see ![chart](sandbox:/mnt/output-",
            "see ![chart](sandbox:/mnt/output-data/",
            "see ![chart](sandbox:/mnt/output-data/foo.p",
        ] {
            assert!(ends_with_partial_sandbox_link(partial), "{partial:?}");
        }
    }

    #[test]
    fn test_not_partial_link() {
        for text in [
            "plain text",
            "done!  ",
            "![chart](sandbox:/mnt/output-data/foo.png)",
            "![chart](https://example.com/x",
            "![chart] and more",
            "![chart\nnext line",
        ] {
            assert!(!ends_with_partial_sandbox_link(text), "{text:?}");
        }
    }

    #[test]
    fn test_contains_complete_link() {
        assert!(contains_sandbox_link(
            "x ![a](sandbox:/mnt/output-data/a.png) y"
        ));
        assert!(!contains_sandbox_link("x ![a](sandbox:/mnt/output-data/"));
        assert!(!contains_sandbox_link("x ![a](sandbox:/mnt/output-data/)"));
    }
}
