//! JSON-file sandbox store.
//!
//! [`JsonFileValueStore`] wraps an [`InMemoryValueStore`] and rewrites a JSON
//! document after every successful mutation. The document is written to a
//! temporary sibling and renamed over the real file, so a crash never leaves
//! a half-written store behind. A mutation whose document cannot be written
//! is undone in memory before the error is returned.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use twk_types::{Address, RawValue};

use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryValueStore;
use crate::traits::ValueStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    values: Vec<StoredValue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredValue {
    address: Address,
    value: RawValue,
}

/// A [`ValueStore`] persisted as a JSON document.
#[derive(Debug)]
pub struct JsonFileValueStore {
    path: PathBuf,
    inner: InMemoryValueStore,
    write_lock: Mutex<()>,
}

impl JsonFileValueStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let inner = if path.exists() {
            let text = fs::read_to_string(&path)?;
            let doc: StoreDocument = if text.trim().is_empty() {
                StoreDocument::default()
            } else {
                serde_json::from_str(&text)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?
            };
            InMemoryValueStore::with_values(doc.values.into_iter().map(|v| (v.address, v.value)))
        } else {
            InMemoryValueStore::new()
        };
        debug!(path = %path.display(), values = inner.len(), "opened sandbox store");
        Ok(Self {
            path,
            inner,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying in-memory store, for inspection.
    pub fn inner(&self) -> &InMemoryValueStore {
        &self.inner
    }

    /// Apply `change` to the in-memory values and write the document,
    /// putting `address` back to its previous state if the write fails.
    fn mutate(
        &self,
        address: &Address,
        change: impl FnOnce(&InMemoryValueStore) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.inner.read_raw(address)?;
        change(&self.inner)?;
        if let Err(e) = self.write_document() {
            let undo = match &previous {
                Some(value) => self.inner.write_raw(address, value),
                None => self.inner.delete(address),
            };
            if let Err(undo_err) = undo {
                warn!(address = %address, error = %undo_err, "failed to undo unsaved change");
            }
            return Err(e);
        }
        Ok(())
    }

    fn write_document(&self) -> StoreResult<()> {
        let doc = StoreDocument {
            values: self
                .inner
                .snapshot()
                .into_iter()
                .map(|(address, value)| StoredValue { address, value })
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&doc)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl ValueStore for JsonFileValueStore {
    fn read_raw(&self, address: &Address) -> StoreResult<Option<RawValue>> {
        self.inner.read_raw(address)
    }

    fn write_raw(&self, address: &Address, value: &RawValue) -> StoreResult<()> {
        self.mutate(address, |inner| inner.write_raw(address, value))
    }

    fn delete(&self, address: &Address) -> StoreResult<()> {
        self.mutate(address, |inner| inner.delete(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twk_types::RootNamespace;

    fn addr(name: &str) -> Address {
        Address::new(RootNamespace::CurrentUser, "Software\\Demo", name)
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileValueStore::open(dir.path().join("store.json")).unwrap();
        assert!(store.inner().is_empty());
    }

    #[test]
    fn mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileValueStore::open(&path).unwrap();
        store.write_integer(&addr("i"), 42).unwrap();
        store.write_text(&addr("t"), "a=1;b=2").unwrap();
        store.write_integer(&addr("gone"), 1).unwrap();
        store.delete(&addr("gone")).unwrap();
        drop(store);

        let reopened = JsonFileValueStore::open(&path).unwrap();
        assert_eq!(reopened.read_integer(&addr("i")).unwrap(), Some(42));
        assert_eq!(reopened.read_text(&addr("t")).unwrap().as_deref(), Some("a=1;b=2"));
        assert_eq!(reopened.read_raw(&addr("gone")).unwrap(), None);
    }

    #[test]
    fn failed_save_undoes_the_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonFileValueStore::open(&path).unwrap();
        store.write_integer(&addr("kept"), 1).unwrap();

        // A non-empty directory at the document path makes every save fail.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("block"), b"x").unwrap();

        assert!(store.write_integer(&addr("kept"), 2).is_err());
        assert_eq!(store.read_integer(&addr("kept")).unwrap(), Some(1));
        assert!(store.write_integer(&addr("new"), 5).is_err());
        assert_eq!(store.read_raw(&addr("new")).unwrap(), None);
        assert!(store.delete(&addr("kept")).is_err());
        assert_eq!(store.read_integer(&addr("kept")).unwrap(), Some(1));
    }

    #[test]
    fn corrupt_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{ not json").unwrap();
        let err = JsonFileValueStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
