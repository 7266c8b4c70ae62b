use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::storage::Store;

/// One JSON document per key under a data directory.
///
/// Writes go to a sibling temp file and are renamed into place, so a reader
/// never observes a half-written record.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub async fn open(base_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(base_dir).await.map_err(|e| {
            AppError::Persistence(format!(
                "Failed to create data dir {}: {e}",
                base_dir.display()
            ))
        })?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", encode_key(key)))
    }
}

/// Map an arbitrary key onto a flat, filesystem-safe file stem.
///
/// Anything outside `[A-Za-z0-9_-]` is percent-encoded byte by byte, so
/// distinct keys always get distinct stems.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::Persistence(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| AppError::Persistence(format!("Corrupt record at `{key}`: {e}")))
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec(&value)
            .map_err(|e| AppError::Persistence(format!("Failed to encode `{key}`: {e}")))?;

        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            AppError::Persistence(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            AppError::Persistence(format!("Failed to commit {}: {e}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_key_is_flat() {
        assert_eq!(encode_key("workflow:abc-1"), "workflow%3Aabc-1");
        assert_eq!(encode_key("deploy:pr:7"), "deploy%3Apr%3A7");
        assert!(!encode_key("../etc/passwd").contains('/'));
    }

    #[test]
    fn test_encode_key_keeps_non_ascii_keys_apart() {
        assert_eq!(encode_key("\u{1F600}"), "%F0%9F%98%80");
        assert_ne!(encode_key("\u{1F6}00"), encode_key("\u{1F600}"));
    }

    #[tokio::test]
    async fn test_non_ascii_keys_do_not_share_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::open(tmp.path()).await.unwrap();
        store.put("audit:\u{1F6}00", json!([1])).await.unwrap();
        store.put("audit:\u{1F600}", json!([2])).await.unwrap();
        assert_eq!(store.get("audit:\u{1F6}00").await.unwrap(), Some(json!([1])));
        assert_eq!(store.get("audit:\u{1F600}").await.unwrap(), Some(json!([2])));
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(tmp.path()).await.unwrap();
            store.put("workflow:1", json!({"status": "completed"})).await.unwrap();
        }
        let reopened = FileStore::open(tmp.path()).await.unwrap();
        assert_eq!(
            reopened.get("workflow:1").await.unwrap(),
            Some(json!({"status": "completed"}))
        );
        assert!(reopened.get("workflow:2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_persistence_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::open(tmp.path()).await.unwrap();
        std::fs::write(tmp.path().join("bad.json"), b"{not json").unwrap();
        let err = store.get("bad").await.unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
    }
}
