use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::{ChatId, ChatSource, CurrentChat, SessionStore};
use crate::error::{BridgeError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct PointerFile {
    #[serde(rename = "chatId", default)]
    chat_id: Option<String>,
}

/// Session store backed by a small JSON file
///
/// Writes go to a temporary sibling file which is then renamed over the
/// target, so readers see either the old or the new pointer.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
    default_chat_id: String,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>, default_chat_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_chat_id: default_chat_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_pointer(&self) -> Result<Option<String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let pointer: PointerFile = serde_json::from_str(&content)
            .map_err(|e| BridgeError::Serialization(format!("Invalid chat pointer file: {e}")))?;

        Ok(pointer.chat_id.filter(|id| !id.is_empty()))
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "current-chat.json".to_string());
        self.path
            .with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()))
    }

    async fn write_pointer(&self, chat_id: &str) -> Result<()> {
        let body = serde_json::to_string_pretty(&PointerFile {
            chat_id: Some(chat_id.to_string()),
        })
        .map_err(|e| BridgeError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.temp_path();
        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(body.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get_current(&self) -> CurrentChat {
        match self.read_pointer().await {
            Ok(Some(chat_id)) => CurrentChat {
                chat_id,
                source: ChatSource::File,
            },
            Ok(None) => CurrentChat {
                chat_id: self.default_chat_id.clone(),
                source: ChatSource::Config,
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read current chat ID from {}: {e}",
                    self.path.display()
                );
                CurrentChat {
                    chat_id: self.default_chat_id.clone(),
                    source: ChatSource::Config,
                }
            }
        }
    }

    async fn set_current(&self, chat_id: &ChatId) -> Result<()> {
        match self.write_pointer(chat_id.as_str()).await {
            Ok(()) => {
                tracing::info!("Current chat ID updated to: {chat_id}");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    "Failed to save current chat ID to {}: {e}",
                    self.path.display()
                );
                Err(BridgeError::Storage(format!(
                    "Failed to save current chat ID: {e}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DEFAULT_CHAT: &str = "default-chat";

    #[tokio::test]
    async fn test_missing_file_uses_default() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("current-chat.json"), DEFAULT_CHAT);

        let current = store.get_current().await;
        assert_eq!(current.chat_id, DEFAULT_CHAT);
        assert_eq!(current.source, ChatSource::Config);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("current-chat.json"), DEFAULT_CHAT);

        let chat_id = ChatId::try_from("new-chat").unwrap();
        store.set_current(&chat_id).await.unwrap();

        let current = store.get_current().await;
        assert_eq!(current.chat_id, "new-chat");
        assert_eq!(current.source, ChatSource::File);
    }

    #[tokio::test]
    async fn test_written_file_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current-chat.json");
        let store = FileSessionStore::new(&path, DEFAULT_CHAT);

        store
            .set_current(&ChatId::try_from("abc").unwrap())
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["chatId"], "abc");
    }

    #[tokio::test]
    async fn test_set_replaces_previous_value() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("current-chat.json"), DEFAULT_CHAT);

        store
            .set_current(&ChatId::try_from("first").unwrap())
            .await
            .unwrap();
        store
            .set_current(&ChatId::try_from("second").unwrap())
            .await
            .unwrap();

        assert_eq!(store.get_current().await.chat_id, "second");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_uses_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current-chat.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = FileSessionStore::new(&path, DEFAULT_CHAT);

        let current = store.get_current().await;
        assert_eq!(current.chat_id, DEFAULT_CHAT);
        assert_eq!(current.source, ChatSource::Config);
    }

    #[tokio::test]
    async fn test_file_without_chat_id_uses_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current-chat.json");
        std::fs::write(&path, r#"{"other": 1}"#).unwrap();
        let store = FileSessionStore::new(&path, DEFAULT_CHAT);

        assert_eq!(store.get_current().await.source, ChatSource::Config);
    }

    #[tokio::test]
    async fn test_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state").join("chat.json");
        let store = FileSessionStore::new(&path, DEFAULT_CHAT);

        store
            .set_current(&ChatId::try_from("nested-chat").unwrap())
            .await
            .unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_unwritable_location_reports_storage_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let store = FileSessionStore::new(blocker.join("chat.json"), DEFAULT_CHAT);

        let result = store.set_current(&ChatId::try_from("x").unwrap()).await;
        assert!(matches!(result, Err(BridgeError::Storage(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reads_never_see_partial_writes() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(FileSessionStore::new(
            dir.path().join("current-chat.json"),
            DEFAULT_CHAT,
        ));
        store
            .set_current(&ChatId::try_from("seed").unwrap())
            .await
            .unwrap();

        let mut writers = Vec::new();
        for writer in 0..8 {
            let store = store.clone();
            writers.push(tokio::spawn(async move {
                for i in 0..25 {
                    let chat_id = ChatId::try_from(format!("chat-{writer}-{i}")).unwrap();
                    store.set_current(&chat_id).await.unwrap();
                }
            }));
        }

        let mut readers = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            readers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..200 {
                    seen.push(store.get_current().await);
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        for writer in writers {
            writer.await.unwrap();
        }
        for reader in readers {
            for current in reader.await.unwrap() {
                assert_eq!(current.source, ChatSource::File, "read {current:?}");
                let id = current.chat_id.as_str();
                assert!(
                    id == "seed" || id.starts_with("chat-"),
                    "unexpected chat id {id}"
                );
            }
        }

        let last = store.get_current().await;
        assert_eq!(last.source, ChatSource::File);
        assert!(last.chat_id.ends_with("-24"));
    }

    #[test]
    fn test_current_chat_serialization() {
        let current = CurrentChat {
            chat_id: "abc".to_string(),
            source: ChatSource::File,
        };
        let json = serde_json::to_value(&current).unwrap();
        assert_eq!(json, serde_json::json!({"chatId": "abc", "source": "file"}));
    }
}
