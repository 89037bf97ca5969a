//! Persistent Identity Store
//!
//! Typed records over a string key-value backend. The store performs no
//! locking of its own; every call happens while the caller holds the store
//! guard (see `coordinator::context`).
//!
//! # Reserved keys
//!
//! | Key | Content |
//! |-----|---------|
//! | `uid_list` | `;`-separated card keys in insertion order |
//! | `count` | number of registered cards |
//! | `cnt_<label>` | scan count (split layout only) |
//! | `<CARDKEY>` | encoded record |

mod backend;

pub use backend::{store_path, FileBackend, KvBackend, MemoryBackend};

use crate::core::record::{normalize_key, IdentityRecord, RecordLayout};
use crate::core::topics::keys;
use crate::error::{AtlasError, AtlasResult};

pub struct IdentityStore {
    backend: Box<dyn KvBackend>,
    layout: RecordLayout,
}

impl IdentityStore {
    pub fn new(backend: Box<dyn KvBackend>, layout: RecordLayout) -> Self {
        Self { backend, layout }
    }

    pub fn in_memory(layout: RecordLayout) -> Self {
        Self::new(Box::new(MemoryBackend::new()), layout)
    }

    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    /// `Ok(None)` when absent, `StoreCorruption` when present but undecodable.
    pub fn get(&self, key: &str) -> AtlasResult<Option<IdentityRecord>> {
        let key = normalize_key(key);
        let Some(value) = self.backend.get(&key)? else {
            return Ok(None);
        };
        let counter = match self.layout {
            RecordLayout::Combined => None,
            RecordLayout::Split => {
                let label = value.split('|').next().unwrap_or("").trim();
                self.backend.get(&RecordLayout::counter_key(label))?
            }
        };
        self.layout
            .decode(&key, &value, counter.as_deref())
            .map(Some)
            .map_err(|e| AtlasError::StoreCorruption { key, reason: e.to_string() })
    }

    /// Insert or overwrite. A new key is appended to the enumeration once.
    pub fn put(&mut self, record: &IdentityRecord) -> AtlasResult<()> {
        let key = normalize_key(&record.key);
        if key.is_empty() {
            return Err(AtlasError::StoreCorruption { key, reason: "empty card key".into() });
        }
        let value = self
            .layout
            .encode(record)
            .map_err(|e| AtlasError::InvalidRecord { key: key.clone(), reason: e.to_string() })?;
        self.backend.put(&key, &value)?;
        if self.layout == RecordLayout::Split {
            self.backend
                .put(&RecordLayout::counter_key(&record.owner_label), &record.scan_count.to_string())?;
        }

        let mut listed = self.enumerate_keys()?;
        if !listed.contains(&key) {
            listed.push(key);
            self.write_key_list(&listed)?;
        }
        Ok(())
    }

    /// Count a new registration under `label` starts from. Split-layout
    /// counters belong to the label, so a replacement card inherits them.
    pub fn starting_count(&self, label: &str) -> AtlasResult<u32> {
        if self.layout == RecordLayout::Combined {
            return Ok(0);
        }
        let counter_key = RecordLayout::counter_key(label.trim());
        match self.backend.get(&counter_key)? {
            None => Ok(0),
            Some(v) if v.trim().is_empty() => Ok(0),
            Some(v) => v.trim().parse().map_err(|_| AtlasError::StoreCorruption {
                key: counter_key,
                reason: format!("counter '{v}' is not a number"),
            }),
        }
    }

    pub fn has(&self, key: &str) -> AtlasResult<bool> {
        Ok(self.backend.get(&normalize_key(key))?.is_some())
    }

    /// Irreversible. Confirmation is the caller's concern.
    pub fn clear(&mut self) -> AtlasResult<()> {
        self.backend.clear()
    }

    /// Keys in registration order
    pub fn enumerate_keys(&self) -> AtlasResult<Vec<String>> {
        Ok(self
            .backend
            .get(keys::KEY_LIST)?
            .unwrap_or_default()
            .split(keys::KEY_LIST_SEPARATOR)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect())
    }

    pub fn len(&self) -> AtlasResult<usize> {
        Ok(self.enumerate_keys()?.len())
    }

    pub fn is_empty(&self) -> AtlasResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Every decodable record in registration order. Malformed entries are skipped.
    pub fn records(&self) -> AtlasResult<Vec<IdentityRecord>> {
        let mut out = Vec::new();
        for key in self.enumerate_keys()? {
            match self.get(&key) {
                Ok(Some(record)) => out.push(record),
                Ok(None) => tracing::warn!(key = %key, "listed key has no record"),
                Err(AtlasError::StoreCorruption { key, reason }) => {
                    tracing::warn!(key = %key, reason = %reason, "skipping malformed record")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    fn write_key_list(&mut self, listed: &[String]) -> AtlasResult<()> {
        let joined = listed.join(&keys::KEY_LIST_SEPARATOR.to_string());
        self.backend.put(keys::KEY_LIST, &joined)?;
        self.backend.put(keys::COUNT, &listed.len().to_string())
    }
}
