//! Tweak catalogs.
//!
//! A catalog is an ordered list of modules, each an ordered list of tweaks.
//! Catalogs are TOML documents:
//!
//! ```toml
//! [[module]]
//! name = "Performance"
//!
//! [[module.tweak]]
//! id = "fps_transparency"
//! name = "Disable Transparency Effects"
//!
//! [[module.tweak.target]]
//! root = "HKCU"
//! path = 'Software\Microsoft\Windows\CurrentVersion\Themes\Personalize'
//! name = "EnableTransparency"
//! kind = "integer"
//! apply = 0
//! default = 1
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use twk_types::{Module, TargetSpec, Tweak, TweakStatus};

use crate::composite::token_key;
use crate::error::{EngineError, EngineResult};

const BUILTIN_CATALOG: &str = include_str!("../catalog/default.toml");

/// The loaded set of modules and tweaks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, rename = "module")]
    pub modules: Vec<Module>,
}

impl Catalog {
    pub fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    /// Parse and validate a TOML catalog.
    pub fn from_toml_str(source: &str) -> EngineResult<Self> {
        let catalog: Catalog = toml::from_str(source)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check the structural rules every catalog must satisfy:
    /// module names and tweak ids are unique, composite targets apply a
    /// `key=value` token, and declared commands are non-empty.
    pub fn validate(&self) -> EngineResult<()> {
        let mut modules = HashSet::new();
        let mut ids = HashSet::new();
        for module in &self.modules {
            if !modules.insert(module.name.to_ascii_lowercase()) {
                return Err(EngineError::Catalog(format!(
                    "duplicate module name {:?}",
                    module.name
                )));
            }
            for tweak in &module.tweaks {
                if tweak.id.is_empty() {
                    return Err(EngineError::Catalog(format!(
                        "tweak with empty id in module {:?}",
                        module.name
                    )));
                }
                if !ids.insert(tweak.id.as_str()) {
                    return Err(EngineError::Catalog(format!(
                        "duplicate tweak id {:?}",
                        tweak.id
                    )));
                }
                validate_tweak(tweak)?;
            }
        }
        Ok(())
    }

    /// Every `(module, tweak)` pair in catalog order.
    pub fn tweaks(&self) -> impl Iterator<Item = (&Module, &Tweak)> {
        self.modules
            .iter()
            .flat_map(|m| m.tweaks.iter().map(move |t| (m, t)))
    }

    pub fn tweak_count(&self) -> usize {
        self.modules.iter().map(|m| m.tweaks.len()).sum()
    }

    /// Module by name, ignoring ASCII case.
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn find_tweak(&self, id: &str) -> Option<(&Module, &Tweak)> {
        self.tweaks().find(|(_, t)| t.id == id)
    }

    pub fn tweak(&self, id: &str) -> Option<&Tweak> {
        self.find_tweak(id).map(|(_, t)| t)
    }

    pub fn tweak_mut(&mut self, id: &str) -> Option<&mut Tweak> {
        self.modules
            .iter_mut()
            .flat_map(|m| m.tweaks.iter_mut())
            .find(|t| t.id == id)
    }

    /// Current status of every tweak, keyed by id.
    pub fn statuses(&self) -> HashMap<String, TweakStatus> {
        self.tweaks()
            .map(|(_, t)| (t.id.clone(), t.status))
            .collect()
    }

    /// Overwrite tweak statuses from a map produced elsewhere.
    pub fn apply_statuses(&mut self, statuses: &HashMap<String, TweakStatus>) {
        for tweak in self.modules.iter_mut().flat_map(|m| m.tweaks.iter_mut()) {
            if let Some(status) = statuses.get(&tweak.id) {
                tweak.status = *status;
            }
        }
    }
}

fn validate_tweak(tweak: &Tweak) -> EngineResult<()> {
    for target in &tweak.targets {
        if let TargetSpec::Text {
            apply,
            composite: true,
            ..
        } = &target.spec
        {
            if !apply.contains('=') || token_key(apply).is_empty() {
                return Err(EngineError::Catalog(format!(
                    "tweak {:?}: composite target {} must apply a key=value token, got {:?}",
                    tweak.id, target.address, apply
                )));
            }
        }
    }
    if let Some(action) = &tweak.action {
        if action.apply.iter().chain(&action.revert).any(Vec::is_empty) {
            return Err(EngineError::Catalog(format!(
                "tweak {:?}: action declares an empty command",
                tweak.id
            )));
        }
    }
    Ok(())
}

/// Source of the tweak catalog, read once at startup.
pub trait CatalogProvider: Send + Sync {
    fn load(&self) -> EngineResult<Catalog>;
}

/// Catalog read from a TOML file.
#[derive(Clone, Debug)]
pub struct TomlCatalog {
    path: PathBuf,
}

impl TomlCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogProvider for TomlCatalog {
    fn load(&self) -> EngineResult<Catalog> {
        let text = fs::read_to_string(&self.path)?;
        let catalog: Catalog = toml::from_str(&text).map_err(|source| EngineError::Parse {
            path: self.path.clone(),
            source,
        })?;
        catalog.validate()?;
        debug!(path = %self.path.display(), tweaks = catalog.tweak_count(), "catalog loaded");
        Ok(catalog)
    }
}

/// The catalog compiled into the binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinCatalog;

impl CatalogProvider for BuiltinCatalog {
    fn load(&self) -> EngineResult<Catalog> {
        Catalog::from_toml_str(BUILTIN_CATALOG)
    }
}
