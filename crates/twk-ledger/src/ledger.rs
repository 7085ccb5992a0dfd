//! The in-memory ledger and its restore operations.

use tracing::{debug, error, info, warn};
use twk_store::{StoreError, StoreResult, ValueStore};
use twk_types::Address;

use crate::entry::LedgerEntry;
use crate::error::{LedgerError, Result};
use crate::file::LedgerFile;

/// Outcome of [`MutationLedger::restore_all`].
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Addresses restored, in the order they were restored.
    pub restored: Vec<Address>,
    /// Addresses whose restore failed, with the store error.
    pub failed: Vec<(Address, StoreError)>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered set of pre-images, at most one per address.
///
/// When backed by a [`LedgerFile`], every capture and every change to the
/// entry set is written through immediately. Persistence failures are logged
/// and do not abort the mutation that triggered them.
#[derive(Debug)]
pub struct MutationLedger {
    entries: Vec<LedgerEntry>,
    file: Option<LedgerFile>,
    load_error: Option<LedgerError>,
}

impl MutationLedger {
    /// A ledger with no durable backing.
    pub fn in_memory() -> Self {
        Self {
            entries: Vec::new(),
            file: None,
            load_error: None,
        }
    }

    /// Load the ledger stored in `file`.
    ///
    /// A file that fails verification is not trusted: the ledger starts
    /// empty and the error is kept for [`MutationLedger::load_error`].
    pub fn open(file: LedgerFile) -> Self {
        let (entries, load_error) = match file.load() {
            Ok(entries) => (entries, None),
            Err(e) => {
                error!(
                    path = %file.path().display(),
                    error = %e,
                    "ledger failed to load, starting with an empty ledger"
                );
                (Vec::new(), Some(e))
            }
        };
        let mut ledger = Self {
            entries: Vec::new(),
            file: Some(file),
            load_error,
        };
        // Collapse duplicates a hand-edited file might carry.
        for entry in entries {
            if !ledger.contains(&entry.address) {
                ledger.entries.push(entry);
            }
        }
        ledger
    }

    /// The error encountered while loading, if the file was rejected.
    pub fn load_error(&self) -> Option<&LedgerError> {
        self.load_error.as_ref()
    }

    pub fn file(&self) -> Option<&LedgerFile> {
        self.file.as_ref()
    }

    /// Entries in capture order.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, address: &Address) -> Option<&LedgerEntry> {
        self.entries.iter().rev().find(|e| &e.address == address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    /// Record the current value at `address` unless a pre-image is already
    /// held. Returns `true` if a new entry was added.
    ///
    /// The read must succeed before anything is recorded; callers must not
    /// mutate `address` when this returns an error.
    pub fn capture_if_absent(
        &mut self,
        store: &dyn ValueStore,
        address: &Address,
    ) -> StoreResult<bool> {
        if self.contains(address) {
            return Ok(false);
        }
        let current = store.read_raw(address)?;
        let entry = LedgerEntry::capture(address.clone(), current);
        debug!(address = %address, existed = entry.existed, "captured pre-image");
        self.entries.push(entry);
        self.persist_logged();
        Ok(true)
    }

    /// Drop the entry for `address`. Returns `true` if one was held.
    pub fn remove(&mut self, address: &Address) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.address != address);
        let removed = self.entries.len() != before;
        if removed {
            self.persist_logged();
        }
        removed
    }

    /// Replace the whole entry set. An empty set clears the ledger.
    pub fn replace_all(&mut self, entries: Vec<LedgerEntry>) {
        if entries.is_empty() {
            self.clear();
            return;
        }
        self.entries.clear();
        for entry in entries {
            if !self.contains(&entry.address) {
                self.entries.push(entry);
            }
        }
        self.persist_logged();
    }

    /// Forget every entry and delete the durable file.
    pub fn clear(&mut self) {
        self.entries.clear();
        if let Some(file) = &self.file {
            if let Err(e) = file.remove() {
                warn!(path = %file.path().display(), error = %e, "failed to remove ledger file");
            }
        }
    }

    /// Write the current entries to the durable file, if any.
    pub fn persist(&self) -> Result<()> {
        match &self.file {
            Some(file) => file.persist(&self.entries),
            None => Ok(()),
        }
    }

    fn persist_logged(&self) {
        if let Err(e) = self.persist() {
            warn!(error = %e, "ledger persist failed, in-memory state retained");
        }
    }

    /// Put `entry`'s pre-image back into the store.
    ///
    /// An entry recorded as absent is restored by deleting the value; a value
    /// that is already gone counts as restored.
    pub fn restore_entry(store: &dyn ValueStore, entry: &LedgerEntry) -> StoreResult<()> {
        match entry.raw_value() {
            Some(value) => store.write_raw(&entry.address, &value),
            None => match store.delete(&entry.address) {
                Err(e) if e.is_not_found() => Ok(()),
                other => other,
            },
        }
    }

    /// Restore every entry, newest first.
    ///
    /// When every restore succeeds the ledger is cleared and its file
    /// deleted. Otherwise only the failed entries are kept, in their
    /// original order, and persisted.
    pub fn restore_all(&mut self, store: &dyn ValueStore) -> RestoreReport {
        let mut report = RestoreReport::default();
        let mut kept = Vec::new();

        for entry in self.entries.iter().rev() {
            match Self::restore_entry(store, entry) {
                Ok(()) => report.restored.push(entry.address.clone()),
                Err(e) => {
                    warn!(address = %entry.address, error = %e, "restore failed");
                    report.failed.push((entry.address.clone(), e));
                    kept.push(entry.clone());
                }
            }
        }
        kept.reverse();

        info!(
            restored = report.restored.len(),
            failed = report.failed.len(),
            "restore-all finished"
        );
        self.replace_all(kept);
        report
    }
}

impl Default for MutationLedger {
    fn default() -> Self {
        Self::in_memory()
    }
}
