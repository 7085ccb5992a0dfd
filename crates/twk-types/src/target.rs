//! Declared mutations of a single store address.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::value::{RawValue, ValueKind};

/// Separator between `key=value` tokens in a composite text value.
pub const COMPOSITE_DELIMITER: char = ';';

/// One declared mutation: where, what to write, how to recognise it, and how
/// to undo it when no pre-image was captured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationTarget {
    #[serde(flatten)]
    pub address: Address,
    #[serde(flatten)]
    pub spec: TargetSpec,
    /// Revert without a pre-image deletes the value instead of writing the default.
    #[serde(default)]
    pub delete_on_revert: bool,
}

/// Kind-specific apply / expected / default values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TargetSpec {
    Integer {
        apply: u32,
        /// Value certifying "applied"; defaults to `apply`.
        #[serde(default)]
        expected: Option<u32>,
        #[serde(default)]
        default: u32,
    },
    Text {
        apply: String,
        /// Exact match, or substring match when it contains `=`.
        #[serde(default)]
        expected: Option<String>,
        #[serde(default)]
        default: String,
        /// The value is a `;`-delimited list of `key=value` tokens and only
        /// the token keyed like `apply` is merged or removed.
        #[serde(default)]
        composite: bool,
    },
    Binary {
        apply: Vec<u8>,
        #[serde(default)]
        default: Vec<u8>,
    },
}

impl MutationTarget {
    pub fn new(address: Address, spec: TargetSpec) -> Self {
        Self {
            address,
            spec,
            delete_on_revert: false,
        }
    }

    pub fn integer(address: Address, apply: u32, default: u32) -> Self {
        Self::new(
            address,
            TargetSpec::Integer {
                apply,
                expected: None,
                default,
            },
        )
    }

    pub fn text(address: Address, apply: impl Into<String>, default: impl Into<String>) -> Self {
        Self::new(
            address,
            TargetSpec::Text {
                apply: apply.into(),
                expected: None,
                default: default.into(),
                composite: false,
            },
        )
    }

    /// A composite text target merging the single `key=value` token `token`.
    pub fn composite(address: Address, token: impl Into<String>) -> Self {
        let token = token.into();
        Self::new(
            address,
            TargetSpec::Text {
                expected: Some(token.clone()),
                apply: token,
                default: String::new(),
                composite: true,
            },
        )
    }

    pub fn binary(
        address: Address,
        apply: impl Into<Vec<u8>>,
        default: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(
            address,
            TargetSpec::Binary {
                apply: apply.into(),
                default: default.into(),
            },
        )
    }

    pub fn deleting_on_revert(mut self) -> Self {
        self.delete_on_revert = true;
        self
    }

    pub fn expecting_integer(mut self, value: u32) -> Self {
        if let TargetSpec::Integer { expected, .. } = &mut self.spec {
            *expected = Some(value);
        }
        self
    }

    pub fn expecting_text(mut self, value: impl Into<String>) -> Self {
        if let TargetSpec::Text { expected, .. } = &mut self.spec {
            *expected = Some(value.into());
        }
        self
    }

    pub fn kind(&self) -> ValueKind {
        match self.spec {
            TargetSpec::Integer { .. } => ValueKind::Integer,
            TargetSpec::Text { .. } => ValueKind::Text,
            TargetSpec::Binary { .. } => ValueKind::Binary,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.spec, TargetSpec::Text { composite: true, .. })
    }

    /// The value written by a plain (non-composite) apply.
    pub fn apply_value(&self) -> RawValue {
        match &self.spec {
            TargetSpec::Integer { apply, .. } => RawValue::integer(*apply),
            TargetSpec::Text { apply, .. } => RawValue::text(apply),
            TargetSpec::Binary { apply, .. } => RawValue::binary(apply.clone()),
        }
    }

    /// The value written on revert when the ledger holds no pre-image.
    pub fn default_value(&self) -> RawValue {
        match &self.spec {
            TargetSpec::Integer { default, .. } => RawValue::integer(*default),
            TargetSpec::Text { default, .. } => RawValue::text(default),
            TargetSpec::Binary { default, .. } => RawValue::binary(default.clone()),
        }
    }
}
