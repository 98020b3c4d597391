use crate::core::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Key-value storage engine trait - allows pluggable storage backends
///
/// Values are opaque bytes; records are JSON-encoded by the typed helpers on
/// `dyn KvStore`.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or replace the value stored under `key`
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete `key`, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// List all keys starting with `prefix`, in lexical order
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

impl dyn KvStore {
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, bytes).await
    }

    /// Load every record under `prefix`, skipping keys deleted mid-scan.
    pub async fn scan_json<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<(String, T)>> {
        let keys = self.scan_prefix(prefix).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.get_json::<T>(&key).await? {
                records.push((key, record));
            }
        }
        Ok(records)
    }
}
