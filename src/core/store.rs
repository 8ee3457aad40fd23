//! Flow State Store
//!
//! One durable key-value interface with a fast in-memory tier layered on
//! top. Redirect round-trips may land in a different execution context than
//! the one that wrote a record, so reads try the fast tier first and fall
//! back to the durable backend, back-filling the fast tier on a hit.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{FlowError, FlowResult, StorageError};

/// Durable key-value store interface.
#[async_trait]
pub trait DurableStore: Send + Sync + 'static {
    async fn put(&self, key: &str, value: String) -> FlowResult<()>;
    async fn get(&self, key: &str) -> FlowResult<Option<String>>;
    async fn delete(&self, key: &str) -> FlowResult<()>;
}

/// In-memory durable store for tests and single-process use.
#[derive(Default)]
pub struct InMemoryDurableStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn put(&self, key: &str, value: String) -> FlowResult<()> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> FlowResult<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> FlowResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Mock durable store with failure injection, for testing.
#[derive(Default)]
pub struct MockDurableStore {
    entries: Mutex<HashMap<String, String>>,
    fail_reads: Mutex<bool>,
    get_history: Mutex<Vec<String>>,
}

impl MockDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent reads fail.
    pub fn fail_reads(&self) -> &Self {
        *self.fail_reads.lock().unwrap() = true;
        self
    }

    /// Pre-populate an entry.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) -> &Self {
        self.entries.lock().unwrap().insert(key.into(), value.into());
        self
    }

    /// Keys requested so far.
    pub fn get_history(&self) -> Vec<String> {
        self.get_history.lock().unwrap().clone()
    }
}

#[async_trait]
impl DurableStore for MockDurableStore {
    async fn put(&self, key: &str, value: String) -> FlowResult<()> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> FlowResult<Option<String>> {
        self.get_history.lock().unwrap().push(key.to_string());
        if *self.fail_reads.lock().unwrap() {
            return Err(FlowError::Storage(StorageError::ReadFailed {
                message: "injected failure".to_string(),
            }));
        }
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> FlowResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Two-tier store: fast in-memory reads over a durable backend.
pub struct TieredFlowStore<S: DurableStore> {
    fast: Mutex<HashMap<String, String>>,
    durable: S,
}

impl<S: DurableStore> TieredFlowStore<S> {
    pub fn new(durable: S) -> Self {
        Self {
            fast: Mutex::new(HashMap::new()),
            durable,
        }
    }

    /// Fast-tier read only. Misses here do not consult the durable backend.
    pub fn get_fast(&self, key: &str) -> Option<String> {
        self.fast.lock().unwrap().get(key).cloned()
    }

    /// Write through both tiers.
    pub async fn put(&self, key: &str, value: String) -> FlowResult<()> {
        self.durable.put(key, value.clone()).await?;
        self.fast.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    /// Fast read first, durable on miss. A durable hit back-fills the fast
    /// tier for subsequent lookups in this context.
    pub async fn get(&self, key: &str) -> FlowResult<Option<String>> {
        if let Some(value) = self.get_fast(key) {
            return Ok(Some(value));
        }

        let value = self.durable.get(key).await?;
        if let Some(value) = &value {
            self.fast
                .lock()
                .unwrap()
                .insert(key.to_string(), value.clone());
        }
        Ok(value)
    }

    /// Remove from both tiers.
    pub async fn delete(&self, key: &str) -> FlowResult<()> {
        self.fast.lock().unwrap().remove(key);
        self.durable.delete(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get_fast() {
        let store = TieredFlowStore::new(InMemoryDurableStore::new());
        store.put("k", "v".to_string()).await.unwrap();
        assert_eq!(store.get_fast("k"), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_durable_fallback_backfills_fast_tier() {
        let durable = MockDurableStore::new();
        durable.insert("k", "durable-value");
        let store = TieredFlowStore::new(durable);

        // Fast tier is cold: the value was written in another context.
        assert_eq!(store.get_fast("k"), None);

        let value = store.get("k").await.unwrap();
        assert_eq!(value, Some("durable-value".to_string()));

        // Back-filled: the next fast read hits.
        assert_eq!(store.get_fast("k"), Some("durable-value".to_string()));
    }

    #[tokio::test]
    async fn test_fast_hit_skips_durable() {
        let durable = MockDurableStore::new();
        let store = TieredFlowStore::new(durable);
        store.put("k", "v".to_string()).await.unwrap();

        store.get("k").await.unwrap();
        // Only writes touch the durable tier; the read was served fast.
        assert!(store.durable.get_history().is_empty());
    }

    #[tokio::test]
    async fn test_durable_read_failure_propagates() {
        let durable = MockDurableStore::new();
        durable.fail_reads();
        let store = TieredFlowStore::new(durable);

        let err = store.get("missing").await.unwrap_err();
        assert!(matches!(err, FlowError::Storage(_)));
    }

    #[tokio::test]
    async fn test_delete_clears_both_tiers() {
        let store = TieredFlowStore::new(InMemoryDurableStore::new());
        store.put("k", "v".to_string()).await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
