//! Key-value backends: the durable store collaborator and an in-memory stand-in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::AtlasResult;

/// Durable string-keyed storage. No internal locking, callers hold the store guard.
pub trait KvBackend: Send {
    fn get(&self, key: &str) -> AtlasResult<Option<String>>;
    fn put(&mut self, key: &str, value: &str) -> AtlasResult<()>;
    fn clear(&mut self) -> AtlasResult<()>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    entries: BTreeMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> AtlasResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> AtlasResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&mut self) -> AtlasResult<()> {
        self.entries.clear();
        Ok(())
    }
}

/// JSON file backend. Every mutation rewrites the file via temp + rename.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileBackend {
    pub fn open(path: impl Into<PathBuf>) -> AtlasResult<Self> {
        let path = path.into();
        let entries: BTreeMap<String, String> = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() { BTreeMap::new() } else { serde_json::from_str(&raw)? }
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "store file opened");
        Ok(Self { path, entries })
    }

    /// `$ATLAS_ROOT/<app>/store.json`, falling back to the platform data dir
    pub fn open_app(app: &str, root: Option<&Path>) -> AtlasResult<Self> {
        Self::open(store_path(app, root))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> AtlasResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&self.entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KvBackend for FileBackend {
    fn get(&self, key: &str) -> AtlasResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> AtlasResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn clear(&mut self) -> AtlasResult<()> {
        self.entries.clear();
        self.flush()
    }
}

pub fn store_path(app: &str, root: Option<&Path>) -> PathBuf {
    let root = root.map(Path::to_path_buf).unwrap_or_else(|| {
        std::env::var("ATLAS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
    });
    root.join(app).join("store.json")
}
