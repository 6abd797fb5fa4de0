use std::path::PathBuf;

use crate::provider::{SnapshotStore, StoreFuture};

const EXTENSION: &str = "json";

/// Stores each snapshot as `<root>/<key>.json`.
///
/// All I/O is blocking (`std::fs`) inside the returned futures. Writes go to
/// a temporary sibling file that is then renamed over the target, so a crash
/// mid-write leaves the previous snapshot intact.
///
/// The root directory is created on first write.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    root: PathBuf,
}

impl FileSystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Path of the file holding `key`.
    pub fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{EXTENSION}"))
    }
}

impl SnapshotStore for FileSystemStore {
    fn read(&self, key: &str) -> StoreFuture<Vec<u8>> {
        let path = self.path_of(key);
        Box::pin(async move { Ok(std::fs::read(path)?) })
    }

    fn exists(&self, key: &str) -> StoreFuture<bool> {
        let path = self.path_of(key);
        Box::pin(async move { Ok(path.is_file()) })
    }

    fn keys(&self) -> StoreFuture<Vec<String>> {
        let root = self.root.clone();
        Box::pin(async move {
            if !root.is_dir() {
                return Ok(Vec::new());
            }
            let mut keys = Vec::new();
            for entry in std::fs::read_dir(root)? {
                let path = entry?.path();
                if path.extension().is_some_and(|e| e == EXTENSION)
                    && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                {
                    keys.push(stem.to_owned());
                }
            }
            keys.sort();
            Ok(keys)
        })
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn write(&self, key: &str, data: Vec<u8>) -> StoreFuture<()> {
        let path = self.path_of(key);
        let tmp = self.root.join(format!(".{key}.{EXTENSION}.tmp"));
        let root = self.root.clone();
        Box::pin(async move {
            std::fs::create_dir_all(&root)?;
            std::fs::write(&tmp, data)?;
            if let Err(e) = std::fs::rename(&tmp, &path) {
                let _ = std::fs::remove_file(&tmp);
                return Err(e.into());
            }
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> StoreFuture<()> {
        let path = self.path_of(key);
        Box::pin(async move {
            std::fs::remove_file(path)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StoreError, poll_now};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stratum_store_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn write_creates_root_and_file() {
        let dir = temp_dir("write");
        let store = FileSystemStore::new(&dir);
        poll_now(store.write("snap", b"{\"version\":1}".to_vec())).unwrap();

        assert_eq!(std::fs::read(dir.join("snap.json")).unwrap(), b"{\"version\":1}");
        assert!(!dir.join(".snap.json.tmp").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn overwrite_replaces_contents() {
        let dir = temp_dir("overwrite");
        let store = FileSystemStore::new(&dir);
        poll_now(store.write("snap", b"first".to_vec())).unwrap();
        poll_now(store.write("snap", b"second".to_vec())).unwrap();
        assert_eq!(poll_now(store.read("snap")).unwrap(), b"second");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn read_missing_is_not_found() {
        let store = FileSystemStore::new(temp_dir("missing"));
        assert!(matches!(
            poll_now(store.read("nope")),
            Err(StoreError::NotFound(_))
        ));
        assert!(!poll_now(store.exists("nope")).unwrap());
    }

    #[test]
    fn keys_lists_json_files_only() {
        let dir = temp_dir("keys");
        let store = FileSystemStore::new(&dir);
        poll_now(store.write("b", vec![])).unwrap();
        poll_now(store.write("a", vec![])).unwrap();
        std::fs::write(dir.join("notes.txt"), b"x").unwrap();

        assert_eq!(poll_now(store.keys()).unwrap(), ["a", "b"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn keys_of_missing_root_is_empty() {
        let store = FileSystemStore::new(temp_dir("no_root"));
        assert!(poll_now(store.keys()).unwrap().is_empty());
    }

    #[test]
    fn delete_removes_file() {
        let dir = temp_dir("delete");
        let store = FileSystemStore::new(&dir);
        poll_now(store.write("snap", vec![1])).unwrap();
        poll_now(store.delete("snap")).unwrap();
        assert!(!dir.join("snap.json").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
