//! In-memory value store for tests and sandboxed runs.
//!
//! [`InMemoryValueStore`] keeps all values in a `HashMap` behind a `RwLock`.
//! Two hooks let tests exercise the failure paths of the host store:
//! protected addresses reject writes and deletes with
//! [`StoreError::AccessDenied`], and a non-elevated store rejects every
//! mutation under a namespace that requires elevation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use twk_types::{Address, RawValue};

use crate::error::{StoreError, StoreResult};
use crate::traits::ValueStore;

/// An in-memory implementation of [`ValueStore`].
#[derive(Debug)]
pub struct InMemoryValueStore {
    values: RwLock<HashMap<Address, RawValue>>,
    protected: RwLock<HashSet<Address>>,
    elevated: AtomicBool,
}

impl InMemoryValueStore {
    /// Create an empty store that behaves as if the caller were elevated.
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            protected: RwLock::new(HashSet::new()),
            elevated: AtomicBool::new(true),
        }
    }

    /// Create a store pre-populated with `values`.
    pub fn with_values(values: impl IntoIterator<Item = (Address, RawValue)>) -> Self {
        let store = Self::new();
        store
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(values);
        store
    }

    /// Simulate an elevated or non-elevated caller.
    pub fn set_elevated(&self, elevated: bool) {
        self.elevated.store(elevated, Ordering::SeqCst);
    }

    /// Reject all writes and deletes to `address` as if protected by policy.
    pub fn protect(&self, address: Address) {
        self.protected
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address);
    }

    pub fn unprotect(&self, address: &Address) {
        self.protected
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address);
    }

    /// Number of values currently held.
    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A sorted copy of every value, for persistence and assertions.
    pub fn snapshot(&self) -> BTreeMap<Address, RawValue> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn check_writable(&self, address: &Address) -> StoreResult<()> {
        if address.root.requires_elevation() && !self.elevated.load(Ordering::SeqCst) {
            return Err(StoreError::AccessDenied(address.clone()));
        }
        let protected = self
            .protected
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if protected.contains(address) {
            return Err(StoreError::AccessDenied(address.clone()));
        }
        Ok(())
    }
}

impl Default for InMemoryValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueStore for InMemoryValueStore {
    fn read_raw(&self, address: &Address) -> StoreResult<Option<RawValue>> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(address).cloned())
    }

    fn write_raw(&self, address: &Address, value: &RawValue) -> StoreResult<()> {
        self.check_writable(address)?;
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(address.clone(), value.clone());
        Ok(())
    }

    fn delete(&self, address: &Address) -> StoreResult<()> {
        self.check_writable(address)?;
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        match values.remove(address) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(address.clone())),
        }
    }
}
