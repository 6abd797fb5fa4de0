use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::provider::{SnapshotStore, StoreFuture};

/// In-memory snapshot store for tests and embedded hosts.
///
/// Clones share the same storage. An optional quota caps the total number
/// of stored bytes; writes that would exceed it fail with
/// [`StoreError::QuotaExceeded`] and leave the previous value in place.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the total stored bytes.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Inserts a value directly, bypassing the quota.
    pub fn insert(&self, key: impl Into<String>, data: Vec<u8>) {
        self.entries.write().insert(key.into(), data);
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().get(key).cloned()
    }

    /// Total stored bytes.
    pub fn used(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.entries.read().len())
            .field("quota", &self.quota)
            .finish()
    }
}

impl SnapshotStore for MemoryStore {
    fn read(&self, key: &str) -> StoreFuture<Vec<u8>> {
        let entries = self.entries.clone();
        let key = key.to_owned();
        Box::pin(async move {
            let map = entries.read();
            map.get(&key).cloned().ok_or(StoreError::NotFound(key))
        })
    }

    fn exists(&self, key: &str) -> StoreFuture<bool> {
        let entries = self.entries.clone();
        let key = key.to_owned();
        Box::pin(async move { Ok(entries.read().contains_key(&key)) })
    }

    fn keys(&self) -> StoreFuture<Vec<String>> {
        let entries = self.entries.clone();
        Box::pin(async move {
            let mut keys: Vec<String> = entries.read().keys().cloned().collect();
            keys.sort();
            Ok(keys)
        })
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn write(&self, key: &str, data: Vec<u8>) -> StoreFuture<()> {
        let entries = self.entries.clone();
        let quota = self.quota;
        let key = key.to_owned();
        Box::pin(async move {
            let mut map = entries.write();
            if let Some(limit) = quota {
                let others: usize = map
                    .iter()
                    .filter(|(k, _)| **k != key)
                    .map(|(_, v)| v.len())
                    .sum();
                let size = others + data.len();
                if size > limit {
                    return Err(StoreError::QuotaExceeded { size, limit });
                }
            }
            map.insert(key, data);
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> StoreFuture<()> {
        let entries = self.entries.clone();
        let key = key.to_owned();
        Box::pin(async move {
            entries
                .write()
                .remove(&key)
                .ok_or(StoreError::NotFound(key))?;
            Ok(())
        })
    }
}
