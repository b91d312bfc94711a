//! Remote store abstraction.
//!
//! The engine only needs two calls: download an object with its remote
//! modification time, and upload (overwrite) an object getting the new
//! modification time back. Times are epoch milliseconds as assigned by the
//! store, never by the local clock.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StoreError;

/// A downloaded object and the store's modification time for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub data: Vec<u8>,
    pub modified_ms: i64,
}

/// Object storage shared by every host syncing the same account.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch `object`. A missing object is [`StoreError::NotFound`].
    async fn download(&self, object: &str) -> Result<RemoteObject, StoreError>;

    /// Write `data` to `object`, overwriting any previous version.
    ///
    /// Returns the modification time the store assigned.
    async fn upload(&self, data: Vec<u8>, object: &str) -> Result<i64, StoreError>;
}

/// In-process [`RemoteStore`] with a logical clock.
///
/// Every upload is stamped one tick after the newest time the store has seen,
/// so uploads are strictly ordered. Used by tests and offline experiments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<String, RemoteObject>,
    clock: i64,
    offline: bool,
    uploads: Vec<String>,
    downloads: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed `object` with an explicit modification time.
    pub fn insert(&self, object: &str, data: Vec<u8>, modified_ms: i64) {
        let mut state = self.state();
        state.clock = state.clock.max(modified_ms);
        state
            .objects
            .insert(object.to_string(), RemoteObject { data, modified_ms });
    }

    pub fn get(&self, object: &str) -> Option<RemoteObject> {
        self.state().objects.get(object).cloned()
    }

    /// While offline every call fails with [`StoreError::Offline`].
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Object names uploaded so far, in call order.
    pub fn uploads(&self) -> Vec<String> {
        self.state().uploads.clone()
    }

    /// Object names downloaded so far, in call order.
    pub fn downloads(&self) -> Vec<String> {
        self.state().downloads.clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn download(&self, object: &str) -> Result<RemoteObject, StoreError> {
        let mut state = self.state();
        if state.offline {
            return Err(StoreError::Offline);
        }
        state.downloads.push(object.to_string());
        state
            .objects
            .get(object)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                object: object.to_string(),
            })
    }

    async fn upload(&self, data: Vec<u8>, object: &str) -> Result<i64, StoreError> {
        let mut state = self.state();
        if state.offline {
            return Err(StoreError::Offline);
        }
        state.clock += 1;
        let modified_ms = state.clock;
        state.uploads.push(object.to_string());
        state
            .objects
            .insert(object.to_string(), RemoteObject { data, modified_ms });
        Ok(modified_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uploads_are_stamped_after_seeded_objects() {
        let store = MemoryStore::new();
        store.insert("data/a.zip", b"a".to_vec(), 1_000);
        let first = store.upload(b"b".to_vec(), "data/b.zip").await.unwrap();
        let second = store.upload(b"b2".to_vec(), "data/b.zip").await.unwrap();
        assert_eq!(first, 1_001);
        assert_eq!(second, 1_002);
        assert_eq!(store.get("data/b.zip").unwrap().data, b"b2");
        assert_eq!(store.uploads(), ["data/b.zip", "data/b.zip"]);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = MemoryStore::new();
        let err = store.download("configs.json").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { ref object } if object == "configs.json"));
    }

    #[tokio::test]
    async fn offline_store_rejects_calls() {
        let store = MemoryStore::new();
        store.insert("x", vec![], 1);
        store.set_offline(true);
        assert!(matches!(store.download("x").await, Err(StoreError::Offline)));
        assert!(matches!(store.upload(vec![], "x").await, Err(StoreError::Offline)));
        assert!(store.uploads().is_empty());
    }
}
