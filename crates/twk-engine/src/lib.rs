//! Tweak engine for twk.
//!
//! Builds on the ledger and store crates to provide:
//!
//! - [`Catalog`] / [`CatalogProvider`] -- the modules and tweaks, loaded from TOML
//! - [`reconcile`] -- per-target "applied" checks and per-tweak status
//! - [`composite`] -- merge/removal of one `key=value` token in a delimited value
//! - [`Orchestrator`] -- apply, revert, batch, and bulk restore with pre-image capture
//! - [`DriftDetector`] -- snapshot of applied tweaks and detection of external reverts
//! - [`DriftMonitor`] -- the one-shot background drift check
//! - [`Session`] -- everything above wired together from a [`TwkConfig`]

pub mod actions;
pub mod catalog;
pub mod composite;
pub mod config;
pub mod drift;
pub mod elevation;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod reconcile;
pub mod session;

pub use actions::{ActionRegistry, CommandAction, TweakAction};
pub use catalog::{BuiltinCatalog, Catalog, CatalogProvider, TomlCatalog};
pub use config::TwkConfig;
pub use drift::{detect_drift, DriftDetector, DriftSnapshot};
pub use elevation::{ElevationProvider, StaticElevation};
pub use error::{ActionError, EngineError, EngineResult, FailReason};
pub use monitor::{DriftCheck, DriftMonitor};
pub use orchestrator::{BatchReport, Orchestrator, TweakOutcome};
pub use session::Session;
