use crate::core::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// In-process async mutex per storage key.
///
/// Serialises read-modify-write sequences (load record, mutate, persist) for a
/// single key while leaving unrelated keys fully concurrent. Entries are held
/// weakly and pruned once nobody holds or awaits them.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    slots: Arc<Mutex<HashMap<String, Weak<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> Result<OwnedMutexGuard<()>> {
        let slot = {
            let mut slots = self.slots.lock()?;
            if slots.len() >= PRUNE_THRESHOLD {
                slots.retain(|_, weak| weak.strong_count() > 0);
            }
            match slots.get(key).and_then(Weak::upgrade) {
                Some(slot) => slot,
                None => {
                    let slot = Arc::new(AsyncMutex::new(()));
                    slots.insert(key.to_string(), Arc::downgrade(&slot));
                    slot
                }
            }
        };
        Ok(slot.lock_owned().await)
    }

    /// Number of tracked keys, including stale ones not yet pruned.
    pub fn tracked(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialised() {
        let locks = KeyedLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = Arc::clone(&inside);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("account:alice").await.unwrap();
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("account:a").await.unwrap();
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("account:b")).await;
        assert!(b.is_ok());
    }
}
