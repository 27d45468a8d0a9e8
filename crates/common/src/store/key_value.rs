use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::Mutex;

#[derive(thiserror::Error, Debug)]
pub enum KeyValueStoreError {
    #[error("key value store error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("key value store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("key value store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Local persisted credential storage: opaque string values, last write wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync + Debug {
    async fn get_item(&self, key: &str) -> Result<Option<String>, KeyValueStoreError>;

    async fn set_item(&self, key: &str, value: String) -> Result<(), KeyValueStoreError> {
        self.set_items(vec![(key.to_string(), value)]).await
    }

    /// Write several entries as a single unit; either all land or none do
    async fn set_items(&self, items: Vec<(String, String)>) -> Result<(), KeyValueStoreError>;

    async fn remove_item(&self, key: &str) -> Result<(), KeyValueStoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    inner: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> KeyValueStoreError {
    anyhow::anyhow!("failed to acquire lock: {}", e).into()
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, KeyValueStoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.get(key).cloned())
    }

    async fn set_items(&self, items: Vec<(String, String)>) -> Result<(), KeyValueStoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.extend(items);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), KeyValueStoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.remove(key);
        Ok(())
    }
}

/// A JSON object on disk. Writes go to a sibling temp file which is then
/// renamed over the old file, so a crash never leaves a partial map.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    pub async fn open(path: &Path) -> Result<Self, KeyValueStoreError> {
        let entries = match tokio::fs::read(path).await {
            Ok(data) if data.is_empty() => BTreeMap::new(),
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("opened key value store at {:?} ({} keys)", path, entries.len());
        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), KeyValueStoreError> {
        let data = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, KeyValueStoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set_items(&self, items: Vec<(String, String)>) -> Result<(), KeyValueStoreError> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.extend(items);
        self.flush(&next).await?;
        *entries = next;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), KeyValueStoreError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(key) {
            let mut next = entries.clone();
            next.remove(key);
            self.flush(&next).await?;
            *entries = next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_last_write_wins() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.get_item("ucan").await.unwrap(), None);
        store.set_item("ucan", "a".into()).await.unwrap();
        store.set_item("ucan", "b".into()).await.unwrap();
        assert_eq!(store.get_item("ucan").await.unwrap().as_deref(), Some("b"));
        store.remove_item("ucan").await.unwrap();
        assert_eq!(store.get_item("ucan").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_reopens() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("storage.json");
        {
            let store = FileKeyValueStore::open(&path).await.unwrap();
            store
                .set_items(vec![
                    ("readKey".into(), "k".into()),
                    ("ucan".into(), "t".into()),
                ])
                .await
                .unwrap();
        }
        let store = FileKeyValueStore::open(&path).await.unwrap();
        assert_eq!(store.get_item("readKey").await.unwrap().as_deref(), Some("k"));
        assert_eq!(store.get_item("ucan").await.unwrap().as_deref(), Some("t"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("storage.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            FileKeyValueStore::open(&path).await,
            Err(KeyValueStoreError::Corrupt(_))
        ));
    }
}
