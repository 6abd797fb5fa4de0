/// Errors raised by snapshot stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No entry is stored under the key.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),
    /// The key is empty or contains characters outside `[A-Za-z0-9._-]`.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// The store does not support write operations.
    #[error("store is read-only")]
    ReadOnly,
    #[error("storage quota exceeded: {size} bytes requested, {limit} allowed")]
    QuotaExceeded { size: usize, limit: usize },
    /// A store future was polled synchronously but was not ready.
    #[error("store operation did not complete synchronously")]
    WouldBlock,
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(err.to_string())
        } else {
            StoreError::Io(err)
        }
    }
}

/// Checks that `key` can be used as a storage key.
///
/// Keys double as file names in [`FileSystemStore`](crate::FileSystemStore),
/// so separators, dot-only names and anything outside `[A-Za-z0-9._-]` are
/// rejected.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("empty key".into()));
    }
    if key.chars().all(|c| c == '.') {
        return Err(StoreError::InvalidKey(format!("'{key}'")));
    }
    if let Some(c) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(StoreError::InvalidKey(format!(
            "'{key}' contains {c:?}"
        )));
    }
    Ok(())
}
