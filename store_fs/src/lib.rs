//! Filesystem-backed object store.
//!
//! Keys map directly to paths under a root directory (`votes/poll=x/...`
//! becomes `<root>/votes/poll=x/...`). Writes go through a temp file and
//! rename, so readers never observe a half-written object; there is still
//! no coordination between concurrent writers to the same key (last rename
//! wins), matching the store contract.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tally_store::{ObjectStore, StoreError};

/// An [`ObjectStore`] rooted at a local directory.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Open (creating if necessary) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty()
            || key.starts_with('/')
            || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    fn collect_keys(&self, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                self.collect_keys(&path, out)?;
            } else if let Ok(rel) = path.strip_prefix(&self.root) {
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push(key);
            }
        }
        Ok(())
    }
}

impl ObjectStore for FsObjectStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let tmp = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => path.with_file_name(format!("{name}.tmp~")),
            None => return Err(StoreError::InvalidKey(key.to_string())),
        };
        {
            let mut file =
                fs::File::create(&tmp).map_err(|e| StoreError::Backend(e.to_string()))?;
            file.write_all(bytes)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        fs::rename(&tmp, &path).map_err(|e| StoreError::Backend(e.to_string()))?;
        tracing::debug!(key, size = bytes.len(), "object written");
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        if self.root.exists() {
            let root = self.root.clone();
            self.collect_keys(&root, &mut keys)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        // In-flight temp files are not objects.
        keys.retain(|k| k.starts_with(prefix) && !k.ends_with(".tmp~"));
        keys.sort();
        Ok(keys)
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.path_for(key)?.is_file())
    }
}
