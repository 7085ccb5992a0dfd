use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Top-level hive of the host configuration store.
///
/// The string tags are part of the ledger file format and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RootNamespace {
    #[serde(rename = "HKLM")]
    LocalMachine,
    #[serde(rename = "HKCU")]
    CurrentUser,
    #[serde(rename = "HKCR")]
    ClassesRoot,
    #[serde(rename = "HKU")]
    Users,
}

impl RootNamespace {
    /// Short tag used on disk and in catalogs.
    pub fn tag(self) -> &'static str {
        match self {
            Self::LocalMachine => "HKLM",
            Self::CurrentUser => "HKCU",
            Self::ClassesRoot => "HKCR",
            Self::Users => "HKU",
        }
    }

    /// Parse a short tag. Returns `None` for anything unrecognised.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "HKLM" => Some(Self::LocalMachine),
            "HKCU" => Some(Self::CurrentUser),
            "HKCR" => Some(Self::ClassesRoot),
            "HKU" => Some(Self::Users),
            _ => None,
        }
    }

    /// Writes under this namespace fail for a non-elevated caller.
    pub fn requires_elevation(self) -> bool {
        matches!(self, Self::LocalMachine)
    }
}

impl fmt::Display for RootNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for RootNamespace {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| TypeError::UnknownRoot(s.to_string()))
    }
}

/// Location of a single named value in the store.
///
/// Equality is structural: two addresses are the same value iff root, path
/// and name all match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub root: RootNamespace,
    pub path: String,
    pub name: String,
}

impl Address {
    pub fn new(root: RootNamespace, path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            root,
            path: path.into(),
            name: name.into(),
        }
    }

    /// Path and value name without the root, as shown in progress output.
    pub fn short_name(&self) -> String {
        format!("{}\\{}", self.path, self.name)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\\{}\\{}", self.root, self.path, self.name)
    }
}
