//! Detection of tweaks reverted by something other than twk.
//!
//! At the end of a mutating session twk records which tweaks were applied in
//! a snapshot file:
//!
//! ```text
//! [Display]
//! fps_mpo
//! fps_transparency
//! [Input]
//! fps_vrr
//! ```
//!
//! On the next start each recorded tweak is reconciled again; one that is
//! now not applied, or only partially applied, has drifted.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use twk_types::DriftRecord;

use crate::catalog::Catalog;
use crate::error::EngineResult;

/// Applied tweak ids grouped by module, in catalog order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DriftSnapshot {
    sections: Vec<(String, Vec<String>)>,
}

impl DriftSnapshot {
    /// Record every applied tweak in `catalog`. Modules with nothing applied
    /// are left out.
    pub fn capture(catalog: &Catalog) -> Self {
        let sections = catalog
            .modules
            .iter()
            .filter_map(|m| {
                let applied: Vec<String> = m
                    .tweaks
                    .iter()
                    .filter(|t| t.status.is_applied())
                    .map(|t| t.id.clone())
                    .collect();
                (!applied.is_empty()).then(|| (m.name.clone(), applied))
            })
            .collect();
        Self { sections }
    }

    /// Parse snapshot text. Blank lines and ids that precede any section
    /// header are ignored.
    pub fn parse(text: &str) -> Self {
        let mut sections: Vec<(String, Vec<String>)> = Vec::new();
        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                sections.push((name.to_string(), Vec::new()));
            } else if let Some((_, ids)) = sections.last_mut() {
                ids.push(line.to_string());
            }
        }
        Self { sections }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (module, ids) in &self.sections {
            out.push('[');
            out.push_str(module);
            out.push_str("]\n");
            for id in ids {
                out.push_str(id);
                out.push('\n');
            }
        }
        out
    }

    pub fn sections(&self) -> &[(String, Vec<String>)] {
        &self.sections
    }

    /// Ids recorded for `module`, merged across repeated sections.
    pub fn ids(&self, module: &str) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|(name, _)| name == module)
            .flat_map(|(_, ids)| ids.iter().map(String::as_str))
            .collect()
    }

    pub fn applied_count(&self) -> usize {
        self.sections.iter().map(|(_, ids)| ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.applied_count() == 0
    }
}

/// Every tweak recorded in `snapshot` whose current status in `catalog` has
/// drifted. Tweaks no longer in the catalog are skipped.
pub fn detect_drift(snapshot: &DriftSnapshot, catalog: &Catalog) -> Vec<DriftRecord> {
    let mut drifted = Vec::new();
    for module in &catalog.modules {
        for id in snapshot.ids(&module.name) {
            let Some(tweak) = module.tweaks.iter().find(|t| t.id == id) else {
                continue;
            };
            if tweak.status.is_drifted() {
                drifted.push(DriftRecord {
                    module: module.name.clone(),
                    tweak_id: tweak.id.clone(),
                    tweak_name: tweak.name.clone(),
                });
            }
        }
    }
    drifted
}

/// Owner of the snapshot file.
#[derive(Clone, Debug)]
pub struct DriftDetector {
    path: PathBuf,
}

impl DriftDetector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the last snapshot. A missing file is an empty snapshot.
    pub fn load(&self) -> EngineResult<DriftSnapshot> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(DriftSnapshot::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DriftSnapshot::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the snapshot with the applied tweaks in `catalog`.
    pub fn save(&self, catalog: &Catalog) -> EngineResult<DriftSnapshot> {
        let snapshot = DriftSnapshot::capture(catalog);
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(snapshot.render().as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        info!(
            path = %self.path.display(),
            applied = snapshot.applied_count(),
            "drift snapshot saved"
        );
        Ok(snapshot)
    }

    /// Compare the last snapshot with the statuses in `catalog`.
    ///
    /// Never touches the store or the ledger. An unreadable snapshot is
    /// logged and treated as empty.
    pub fn detect(&self, catalog: &Catalog) -> Vec<DriftRecord> {
        let snapshot = match self.load() {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read drift snapshot");
                return Vec::new();
            }
        };
        let drifted = detect_drift(&snapshot, catalog);
        if !drifted.is_empty() {
            warn!(count = drifted.len(), "tweaks drifted since last snapshot");
        }
        drifted
    }
}
