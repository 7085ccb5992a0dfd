//! Foundation types for twk.
//!
//! twk applies and reverts "tweaks": named groups of mutations against the
//! host's hierarchical configuration store. Every other twk crate depends on
//! `twk-types`.
//!
//! # Key Types
//!
//! - [`Address`]: (root namespace, path, name) of one value in the store
//! - [`RawValue`]: a value's kind plus its raw byte content
//! - [`MutationTarget`]: what to write on apply, how to recognise "applied",
//!   and what to do on revert
//! - [`Tweak`] / [`Module`]: catalog records with a derived [`TweakStatus`]
//! - [`DriftRecord`]: a tweak that was applied last session but no longer is

pub mod address;
pub mod error;
pub mod target;
pub mod tweak;
pub mod value;

pub use address::{Address, RootNamespace};
pub use error::TypeError;
pub use target::{MutationTarget, TargetSpec, COMPOSITE_DELIMITER};
pub use tweak::{ActionSpec, DriftRecord, Module, RiskLevel, Tweak, TweakStatus};
pub use value::{RawValue, ValueKind};
