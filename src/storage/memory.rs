use super::KvStore;
use crate::core::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Volatile key-value engine; the default for tests and ephemeral runs.
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Keys under `prefix` from an ordered map.
pub(crate) fn scan_ordered(entries: &BTreeMap<String, Vec<u8>>, prefix: &str) -> Vec<String> {
    entries
        .range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, _)| key.clone())
        .collect()
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(scan_ordered(&entries, prefix))
    }
}
