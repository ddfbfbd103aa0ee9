use super::pubsub::PubSub;
use super::{Backend, Capabilities, KeyOrder, Operation};
use crate::error::{StoreError, StoreResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Stores each record at `<root>/<key-with-dots-as-slashes><ext>`.
/// Metadata uses `.json`, raw blobs use `.blob`. Parent directories are
/// created on demand and pruned (up to, but not including, the root) on
/// removal. Writes go through a temp-then-rename so a failed write never
/// leaves a partial file behind.
pub struct DirectoryBackend {
    root: PathBuf,
    meta_ext: String,
    raw_ext: String,
    pubsub: PubSub,
}

impl DirectoryBackend {
    pub fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::BackendIo(e.to_string()))?;
        Ok(Self {
            root,
            meta_ext: ".json".to_string(),
            raw_ext: ".blob".to_string(),
            pubsub: PubSub::default(),
        })
    }

    fn path_for(&self, key: &str, ext: &str) -> PathBuf {
        let relative = key.replace('.', "/");
        self.root.join(format!("{relative}{ext}"))
    }

    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::BackendIo(e.to_string()))?;
        }
        let tmp = path.with_extension(format!(
            "{}.tmp",
            path.extension().and_then(|e| e.to_str()).unwrap_or("")
        ));
        let result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, path)?;
            Ok(())
        })();
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::BackendIo(e.to_string()));
        }
        Ok(())
    }

    /// Removes empty parent directories up to (but not including) the root.
    fn prune_empty_parents(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.root || !d.starts_with(&self.root) {
                break;
            }
            match fs::read_dir(d) {
                Ok(mut entries) => {
                    if entries.next().is_none() {
                        let _ = fs::remove_dir(d);
                        dir = d.parent();
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
    }
}

impl Backend for DirectoryBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            read: true,
            write: true,
            file: true,
            publish: true,
            raw: true,
            ..Default::default()
        }
    }

    fn add(&self, key: &str, data: serde_json::Value) -> StoreResult<()> {
        self.update(key, data)
    }

    fn update(&self, key: &str, data: serde_json::Value) -> StoreResult<()> {
        let path = self.path_for(key, &self.meta_ext);
        let bytes = serde_json::to_vec(&data).map_err(|e| StoreError::Malformed(e.to_string()))?;
        self.write_atomically(&path, &bytes)?;
        self.pubsub.publish(key, Operation::Update(data));
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key, &self.meta_ext);
        fs::remove_file(&path).map_err(|_| StoreError::NotFound(key.to_string()))?;
        self.prune_empty_parents(&path);
        self.pubsub.publish(key, Operation::Remove);
        Ok(())
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.path_for(key, &self.meta_ext).is_file())
    }

    fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        let path = self.path_for(key, &self.meta_ext);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| StoreError::BackendIo(e.to_string()))?;
        let value =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(Some(value))
    }

    fn keys(&self, prefix: &str, order: KeyOrder) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        collect_keys(&self.root, &self.root, &self.meta_ext, &mut keys)?;
        let mut keys: Vec<String> = keys.into_iter().filter(|k| k.starts_with(prefix)).collect();
        match order {
            KeyOrder::None | KeyOrder::Ascending => keys.sort(),
            KeyOrder::Descending => {
                keys.sort();
                keys.reverse();
            }
        }
        Ok(keys)
    }

    fn clear(&self) -> StoreResult<()> {
        for key in self.keys("", KeyOrder::None)? {
            let _ = self.remove(&key);
        }
        Ok(())
    }

    fn path(&self, key: &str) -> StoreResult<PathBuf> {
        Ok(self.path_for(key, &self.meta_ext))
    }

    fn has_raw_data(&self, key: &str, ext: &str) -> StoreResult<bool> {
        Ok(self.path_for(key, ext).is_file())
    }

    fn save_raw_data(&self, key: &str, ext: &str, data: &[u8]) -> StoreResult<()> {
        self.write_atomically(&self.path_for(key, ext), data)
    }

    fn stream_raw_data(&self, key: &str, ext: &str) -> StoreResult<Vec<u8>> {
        fs::read(self.path_for(key, ext)).map_err(|_| StoreError::NotFound(key.to_string()))
    }

    fn raw_data_path(&self, key: &str, ext: &str) -> StoreResult<PathBuf> {
        Ok(self.path_for(key, ext))
    }

    fn on_publish(&self, callback: super::PublishCallback) {
        self.pubsub.on_publish(callback);
    }

    fn subscribe(&self, key: &str, callback: super::PublishCallback) {
        self.pubsub.subscribe(key, callback);
    }

    fn unsubscribe(&self, key: &str) {
        self.pubsub.unsubscribe(key);
    }

    /// Re-applies a replayed operation without re-publishing it, so
    /// `MultiBackend` fan-out cannot recurse between peers.
    fn process(&self, key: &str, operation: Operation) -> StoreResult<()> {
        match operation {
            Operation::Add(data) | Operation::Update(data) => {
                let path = self.path_for(key, &self.meta_ext);
                let bytes =
                    serde_json::to_vec(&data).map_err(|e| StoreError::Malformed(e.to_string()))?;
                self.write_atomically(&path, &bytes)
            }
            Operation::Remove => {
                let path = self.path_for(key, &self.meta_ext);
                let _ = fs::remove_file(&path);
                self.prune_empty_parents(&path);
                Ok(())
            }
        }
    }
}

fn collect_keys(
    root: &Path,
    dir: &Path,
    ext: &str,
    out: &mut Vec<String>,
) -> StoreResult<()> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Ok(()),
    };
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::BackendIo(e.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            collect_keys(root, &path, ext, out)?;
        } else if path.to_string_lossy().ends_with(ext) {
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .trim_end_matches(ext)
                .replace(['/', '\\'], ".");
            out.push(relative);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn add_get_remove_round_trip() {
        let dir = tempdir().unwrap();
        let backend = DirectoryBackend::new(dir.path()).unwrap();
        backend.add("notes.n1", json!({"value": "x"})).unwrap();
        assert!(backend.has("notes.n1").unwrap());
        assert_eq!(
            backend.get("notes.n1").unwrap(),
            Some(json!({"value": "x"}))
        );
        backend.remove("notes.n1").unwrap();
        assert!(!backend.has("notes.n1").unwrap());
    }

    #[test]
    fn removal_prunes_empty_parent_directories_but_not_root() {
        let dir = tempdir().unwrap();
        let backend = DirectoryBackend::new(dir.path()).unwrap();
        backend.add("a.b.c", json!(1)).unwrap();
        assert!(dir.path().join("a").join("b").is_dir());
        backend.remove("a.b.c").unwrap();
        assert!(!dir.path().join("a").join("b").exists());
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn raw_data_round_trips_separately_from_metadata() {
        let dir = tempdir().unwrap();
        let backend = DirectoryBackend::new(dir.path()).unwrap();
        backend.save_raw_data("att.1", ".blob", b"hello").unwrap();
        assert!(backend.has_raw_data("att.1", ".blob").unwrap());
        assert_eq!(backend.stream_raw_data("att.1", ".blob").unwrap(), b"hello");
    }
}
