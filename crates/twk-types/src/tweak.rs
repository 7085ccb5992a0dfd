use std::fmt;

use serde::{Deserialize, Serialize};

use crate::target::MutationTarget;

/// Reconciled state of a tweak against the live store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TweakStatus {
    /// Not yet reconciled, or the tweak has no store targets.
    #[default]
    Unknown,
    Applied,
    PartiallyApplied,
    NotApplied,
    /// The status probe itself failed.
    Error,
}

impl TweakStatus {
    /// Derive a status from satisfied / total target counts.
    pub fn from_counts(satisfied: usize, total: usize) -> Self {
        if total == 0 {
            Self::Unknown
        } else if satisfied == total {
            Self::Applied
        } else if satisfied == 0 {
            Self::NotApplied
        } else {
            Self::PartiallyApplied
        }
    }

    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }

    /// A previously applied tweak in this state has drifted.
    pub fn is_drifted(self) -> bool {
        matches!(self, Self::NotApplied | Self::PartiallyApplied)
    }
}

impl fmt::Display for TweakStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Applied => write!(f, "applied"),
            Self::PartiallyApplied => write!(f, "partial"),
            Self::NotApplied => write!(f, "not applied"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// How invasive a tweak is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Safe,
    Moderate,
    Advanced,
    Risky,
}

impl RiskLevel {
    pub fn description(self) -> &'static str {
        match self {
            Self::Safe => "SAFE - Easily reversible, no system impact",
            Self::Moderate => "MODERATE - Minor system changes, reversible",
            Self::Advanced => "ADVANCED - Significant changes, use with care",
            Self::Risky => "RISKY - Expert only, potential system issues",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Moderate => write!(f, "moderate"),
            Self::Advanced => write!(f, "advanced"),
            Self::Risky => write!(f, "risky"),
        }
    }
}

/// Non-store side effect declared by a catalog entry (service control,
/// cache clearing, ...). Each vector is an argv: program followed by args.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(default)]
    pub apply: Vec<Vec<String>>,
    #[serde(default)]
    pub revert: Vec<Vec<String>>,
}

/// A named unit of mutations with a derived status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweak {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub risk: RiskLevel,
    #[serde(default)]
    pub requires_reboot: bool,
    #[serde(default, rename = "target")]
    pub targets: Vec<MutationTarget>,
    #[serde(default)]
    pub action: Option<ActionSpec>,
    #[serde(skip)]
    pub status: TweakStatus,
}

impl Tweak {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        targets: Vec<MutationTarget>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            risk: RiskLevel::Safe,
            requires_reboot: false,
            targets,
            action: None,
            status: TweakStatus::Unknown,
        }
    }
}

/// A named group of tweaks, e.g. "Performance" or "Network".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "tweak")]
    pub tweaks: Vec<Tweak>,
}

impl Module {
    pub fn new(name: impl Into<String>, tweaks: Vec<Tweak>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tweaks,
        }
    }

    /// Whether any target in this module writes under an elevated namespace.
    pub fn requires_elevation(&self) -> bool {
        self.tweaks
            .iter()
            .flat_map(|t| &t.targets)
            .any(|t| t.address.root.requires_elevation())
    }
}

/// A tweak that was applied at the end of a previous session and no longer is.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriftRecord {
    pub module: String,
    pub tweak_id: String,
    pub tweak_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Address, RootNamespace};

    #[test]
    fn status_from_counts() {
        assert_eq!(TweakStatus::from_counts(0, 0), TweakStatus::Unknown);
        assert_eq!(TweakStatus::from_counts(2, 2), TweakStatus::Applied);
        assert_eq!(TweakStatus::from_counts(0, 3), TweakStatus::NotApplied);
        assert_eq!(TweakStatus::from_counts(1, 3), TweakStatus::PartiallyApplied);
    }

    #[test]
    fn drifted_states() {
        assert!(TweakStatus::NotApplied.is_drifted());
        assert!(TweakStatus::PartiallyApplied.is_drifted());
        assert!(!TweakStatus::Applied.is_drifted());
        assert!(!TweakStatus::Unknown.is_drifted());
        assert!(!TweakStatus::Error.is_drifted());
    }

    #[test]
    fn module_elevation_follows_targets() {
        let user = MutationTarget::integer(
            Address::new(RootNamespace::CurrentUser, "Software\\A", "x"),
            1,
            0,
        );
        let machine = MutationTarget::integer(
            Address::new(RootNamespace::LocalMachine, "SOFTWARE\\A", "x"),
            1,
            0,
        );
        let m = Module::new("Demo", vec![Tweak::new("a", "A", vec![user.clone()])]);
        assert!(!m.requires_elevation());
        let m = Module::new("Demo", vec![Tweak::new("a", "A", vec![user, machine])]);
        assert!(m.requires_elevation());
    }

    #[test]
    fn tweak_status_is_not_serialized() {
        let mut t = Tweak::new("a", "A", vec![]);
        t.status = TweakStatus::Applied;
        let back: Tweak = serde_json::from_str(&serde_json::to_string(&t).unwrap()).unwrap();
        assert_eq!(back.status, TweakStatus::Unknown);
    }
}
