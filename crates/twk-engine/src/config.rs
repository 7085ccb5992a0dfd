use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::{BuiltinCatalog, CatalogProvider, TomlCatalog};
use crate::error::{EngineError, EngineResult};

pub const CONFIG_FILE_NAME: &str = "twk.toml";
pub const LEDGER_FILE_NAME: &str = "backup.dat";
pub const SNAPSHOT_FILE_NAME: &str = "snapshot.dat";
pub const STORE_FILE_NAME: &str = "store.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwkConfig {
    /// Directory holding the ledger and drift snapshot.
    pub data_dir: PathBuf,
    /// Tweak catalog file; the built-in catalog when unset.
    pub catalog: Option<PathBuf>,
    /// Sandbox value store document; `<data_dir>/store.json` when unset.
    pub store: Option<PathBuf>,
    /// Whether to treat the process as elevated.
    pub elevated: bool,
}

impl Default for TwkConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".twk"),
            catalog: None,
            store: None,
            elevated: false,
        }
    }
}

impl TwkConfig {
    pub fn from_toml_str(source: &str) -> EngineResult<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|source| EngineError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit` if given, else `<data_dir>/twk.toml` if it exists,
    /// else the defaults with `data_dir` set.
    pub fn discover(explicit: Option<&Path>, data_dir: Option<&Path>) -> EngineResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let data_dir = data_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::default().data_dir);
        let candidate = data_dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Self::load(&candidate);
        }
        Ok(Self {
            data_dir,
            ..Self::default()
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE_NAME)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE_NAME)
    }

    pub fn store_path(&self) -> PathBuf {
        self.store
            .clone()
            .unwrap_or_else(|| self.data_dir.join(STORE_FILE_NAME))
    }

    pub fn catalog_provider(&self) -> Box<dyn CatalogProvider> {
        match &self.catalog {
            Some(path) => Box::new(TomlCatalog::new(path)),
            None => Box::new(BuiltinCatalog),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = TwkConfig::default();
        assert_eq!(c.data_dir, PathBuf::from(".twk"));
        assert_eq!(c.ledger_path(), PathBuf::from(".twk").join("backup.dat"));
        assert_eq!(c.snapshot_path(), PathBuf::from(".twk").join("snapshot.dat"));
        assert_eq!(c.store_path(), PathBuf::from(".twk").join("store.json"));
        assert!(!c.elevated);
        assert!(c.catalog.is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let c = TwkConfig::from_toml_str("elevated = true\nstore = \"/tmp/s.json\"\n").unwrap();
        assert!(c.elevated);
        assert_eq!(c.store_path(), PathBuf::from("/tmp/s.json"));
        assert_eq!(c.data_dir, PathBuf::from(".twk"));
    }

    #[test]
    fn discover_prefers_file_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let c = TwkConfig::discover(None, Some(dir.path())).unwrap();
        assert_eq!(c.data_dir, dir.path());

        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            format!("data_dir = {:?}\nelevated = true\n", dir.path().display().to_string()),
        )
        .unwrap();
        let c = TwkConfig::discover(None, Some(dir.path())).unwrap();
        assert!(c.elevated);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TwkConfig::discover(Some(&dir.path().join("nope.toml")), None).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
