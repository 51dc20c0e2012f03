//! Public model table
//!
//! Maps OpenAI-style model names onto nexos.ai handler ids and produces the
//! descriptors served by `GET /v1/models`.

use serde::{Deserialize, Serialize};

/// Creation timestamp reported for every model
pub const MODEL_CREATED: i64 = 1_677_610_602;

/// Model used when a request does not name one
pub const DEFAULT_MODEL: &str = "nexos-chat";

/// One public model and the upstream handler that serves it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelEntry {
    /// Public model name
    pub id: String,
    /// Upstream handler id; models without one use the default handler
    #[serde(default)]
    pub handler_id: Option<String>,
    /// Vendor tag shown in listings
    pub owned_by: String,
}

impl ModelEntry {
    fn new(id: &str, handler_id: Option<&str>, owned_by: &str) -> Self {
        Self {
            id: id.to_string(),
            handler_id: handler_id.map(str::to_string),
            owned_by: owned_by.to_string(),
        }
    }
}

/// OpenAI `model` object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelDescriptor {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

impl From<&ModelEntry> for ModelDescriptor {
    fn from(entry: &ModelEntry) -> Self {
        Self {
            id: entry.id.clone(),
            object: "model".to_string(),
            created: MODEL_CREATED,
            owned_by: entry.owned_by.clone(),
        }
    }
}

/// Immutable lookup table built at startup
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
    default_handler: String,
}

impl ModelRegistry {
    pub fn new(entries: Vec<ModelEntry>, default_handler: impl Into<String>) -> Self {
        Self {
            entries,
            default_handler: default_handler.into(),
        }
    }

    /// Handler id for `name`, or the default handler for unknown names
    pub fn resolve(&self, name: &str) -> &str {
        match self
            .entries
            .iter()
            .find(|entry| entry.id == name)
            .and_then(|entry| entry.handler_id.as_deref())
        {
            Some(handler) => handler,
            None => {
                tracing::warn!("Model '{name}' not found in mapping, using default handler");
                &self.default_handler
            }
        }
    }

    /// All entries in listing order
    pub fn list(&self) -> &[ModelEntry] {
        &self.entries
    }

    /// Listing descriptors for `GET /v1/models`
    pub fn descriptors(&self) -> Vec<ModelDescriptor> {
        self.entries.iter().map(ModelDescriptor::from).collect()
    }

    pub fn default_handler(&self) -> &str {
        &self.default_handler
    }
}

/// Built-in model table
pub fn default_models() -> Vec<ModelEntry> {
    vec![
        ModelEntry::new("claude-haiku-4-5", Some("dfb29932-cad7-4c5f-8189-d12eb9d0c3c9"), "anthropic"),
        ModelEntry::new("claude-opus-4-5", Some("49caf3e7-a347-4641-96da-6e4322cd03ab"), "anthropic"),
        ModelEntry::new("claude-opus-4-6", Some("4839e638-49d1-4c97-a1e5-0ad68b317c4b"), "anthropic"),
        ModelEntry::new("claude-sonnet-4-5", Some("bc62fe29-732e-4488-aad6-17c1ad5691f1"), "anthropic"),
        ModelEntry::new("claude-sonnet-4-6", Some("050aa16c-c1ec-441f-8428-bb13458c9af5"), "anthropic"),
        ModelEntry::new("gemini-2-5-flash", Some("ef863bf8-59b8-45b5-afa6-797512d7a110"), "google"),
        ModelEntry::new("gemini-2-5-pro", Some("1172df4f-78a7-4bea-9482-be290ee858f8"), "google"),
        ModelEntry::new("gemini-3-flash-preview", Some("2cc2f020-a66a-41b3-9ee2-2238631dab8a"), "google"),
        ModelEntry::new("gemini-3-pro-preview", Some("6ba58bb6-0b77-40a8-a016-26900cda074c"), "google"),
        ModelEntry::new("gemini-3-1-pro-preview", Some("7f888a48-2400-4221-8d0c-5d937a61cc7d"), "google"),
        ModelEntry::new("gpt-5", Some("5f15269e-e204-46c6-98d3-bbfd33fe400a"), "openai"),
        ModelEntry::new("gpt-5-1", Some("d8f4a97d-5c15-4914-a363-707bccab2d1a"), "openai"),
        ModelEntry::new("gpt-5-2", Some("0a47b187-6ea2-4c8e-8d18-fb32223be6a6"), "openai"),
        ModelEntry::new("grok-4-fast", Some("a128fc4e-f482-414c-963b-7939e90c3ecd"), "xai"),
        ModelEntry::new("grok-4-fast-reasoning", Some("4889733a-acd5-48da-b93a-4b1c39487fc2"), "xai"),
        ModelEntry::new("grok-4-1-fast", Some("81426542-20df-45b6-b7b0-56592d911900"), "xai"),
        ModelEntry::new("grok-4-1-fast-reasoning", Some("5a5d8b99-5d02-4a0e-9547-a4e38e0cd64b"), "xai"),
        ModelEntry::new("grok-code-fast-1", Some("6c1c9f9f-31c6-4e89-a93e-b0db4a8ee97e"), "xai"),
        ModelEntry::new("mistral-large-3", Some("b1e7d601-18c8-47af-a8f8-ab50f31b48de"), "mistral"),
        ModelEntry::new("mistral-medium-3", None, "mistral"),
        ModelEntry::new("mistral-medium-3-1", None, "mistral"),
        ModelEntry::new(DEFAULT_MODEL, Some("4839e638-49d1-4c97-a1e5-0ad68b317c4b"), "nexos"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_HANDLER: &str = "default-handler";

    fn registry() -> ModelRegistry {
        ModelRegistry::new(default_models(), DEFAULT_HANDLER)
    }

    #[test]
    fn test_resolve_known_model() {
        assert_eq!(
            registry().resolve("gpt-5"),
            "5f15269e-e204-46c6-98d3-bbfd33fe400a"
        );
        assert_eq!(
            registry().resolve("gemini-2-5-pro"),
            "1172df4f-78a7-4bea-9482-be290ee858f8"
        );
    }

    #[test]
    fn test_resolve_unknown_model_falls_back() {
        let registry = registry();
        for name in ["", "gpt-4", "GPT-5", "claude", "totally-unknown"] {
            assert_eq!(registry.resolve(name), DEFAULT_HANDLER, "name: {name:?}");
        }
    }

    #[test]
    fn test_resolve_listed_model_without_handler_falls_back() {
        assert_eq!(registry().resolve("mistral-medium-3"), DEFAULT_HANDLER);
    }

    #[test]
    fn test_default_model_is_mapped() {
        assert_eq!(
            registry().resolve(DEFAULT_MODEL),
            "4839e638-49d1-4c97-a1e5-0ad68b317c4b"
        );
    }

    #[test]
    fn test_list_preserves_order() {
        let registry = registry();
        let ids: Vec<&str> = registry.list().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"claude-haiku-4-5"));
        assert_eq!(ids.last(), Some(&DEFAULT_MODEL));
        assert_eq!(ids.len(), 22);
    }

    #[test]
    fn test_descriptor_shape() {
        let descriptors = registry().descriptors();
        let json = serde_json::to_value(&descriptors[0]).unwrap();
        assert_eq!(json["id"], "claude-haiku-4-5");
        assert_eq!(json["object"], "model");
        assert_eq!(json["created"], MODEL_CREATED);
        assert_eq!(json["owned_by"], "anthropic");
        assert!(json.get("handler_id").is_none());
    }

    #[test]
    fn test_model_ids_are_unique() {
        let models = default_models();
        let mut ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), models.len());
    }
}
