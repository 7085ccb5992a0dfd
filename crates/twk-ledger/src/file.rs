use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::codec::LedgerCodec;
use crate::entry::LedgerEntry;
use crate::error::{LedgerError, Result};

/// The durable home of a ledger.
///
/// Every persist writes the full encoding to a temporary sibling of the
/// ledger file and renames it over the real file. The real file is therefore
/// either the previous complete version or the new complete version, never a
/// mix. If the rename fails the temporary file is removed; temporary files
/// left by a crash are swept on the next load.
#[derive(Clone, Debug)]
pub struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read and verify the ledger. A missing file is an empty ledger.
    pub fn load(&self) -> Result<Vec<LedgerEntry>> {
        self.sweep_temporaries();
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let entries = LedgerCodec::decode_bytes(&bytes)?;
        debug!(path = %self.path.display(), entries = entries.len(), "ledger loaded");
        Ok(entries)
    }

    /// Atomically replace the ledger file with the encoding of `entries`.
    pub fn persist(&self, entries: &[LedgerEntry]) -> Result<()> {
        let content = LedgerCodec::encode(entries);
        self.write_atomic(content.as_bytes())
            .map_err(|source| LedgerError::Persist {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), entries = entries.len(), "ledger persisted");
        Ok(())
    }

    /// Delete the ledger file. Deleting a missing file succeeds.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Temporary files are named `<ledger file name>.<random>.tmp`.
    fn temp_prefix(&self) -> String {
        self.path
            .file_name()
            .map(|n| format!("{}.", n.to_string_lossy()))
            .unwrap_or_else(|| "ledger.".into())
    }

    fn is_temporary(&self, name: &str) -> bool {
        name.starts_with(&self.temp_prefix()) && name.ends_with(".tmp")
    }

    fn write_atomic(&self, bytes: &[u8]) -> io::Result<()> {
        let tmp = self.stage(bytes)?;
        // On failure the returned temp file is dropped, which deletes it.
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Write `bytes` to a synced temporary sibling of the ledger file.
    fn stage(&self, bytes: &[u8]) -> io::Result<NamedTempFile> {
        let dir = self.dir();
        fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(&self.temp_prefix())
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }

    fn sweep_temporaries(&self) {
        let Ok(listing) = fs::read_dir(self.dir()) else {
            return;
        };
        for entry in listing.flatten() {
            let name = entry.file_name();
            if !self.is_temporary(&name.to_string_lossy()) {
                continue;
            }
            let stale = entry.path();
            match fs::remove_file(&stale) {
                Ok(()) => debug!(file = %stale.display(), "removed stale ledger temp file"),
                Err(e) => warn!(
                    file = %stale.display(),
                    error = %e,
                    "could not remove stale ledger temp file"
                ),
            }
        }
    }
}
