use std::future::Future;
use std::pin::Pin;

use crate::StoreError;

/// A boxed, `Send` future returning a `Result`.
///
/// All [`SnapshotStore`] methods return this type so stores can be used
/// behind `Arc<dyn SnapshotStore>` and their futures spawned on any runtime.
pub type StoreFuture<T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send>>;

/// Key-value backend for persisted snapshots.
///
/// Values are opaque bytes. Keys are validated with
/// [`validate_key`](crate::validate_key) before they reach a store.
///
/// # Read vs Write
///
/// Every store implements the read operations. Write operations default to
/// [`StoreError::ReadOnly`]; writable stores override them and return
/// `false` from [`is_read_only()`](SnapshotStore::is_read_only).
pub trait SnapshotStore: Send + Sync + 'static {
    // --- Read operations (required) ---

    /// Reads the value stored under `key`.
    fn read(&self, key: &str) -> StoreFuture<Vec<u8>>;

    fn exists(&self, key: &str) -> StoreFuture<bool>;

    /// Lists stored keys, sorted.
    fn keys(&self) -> StoreFuture<Vec<String>>;

    // --- Write operations (optional, default returns ReadOnly) ---

    fn is_read_only(&self) -> bool {
        true
    }

    /// Stores `data` under `key`, replacing any previous value.
    fn write(&self, _key: &str, _data: Vec<u8>) -> StoreFuture<()> {
        Box::pin(async { Err(StoreError::ReadOnly) })
    }

    fn delete(&self, _key: &str) -> StoreFuture<()> {
        Box::pin(async { Err(StoreError::ReadOnly) })
    }
}
