//! Non-store side effects attached to tweaks.
//!
//! Some tweaks do more than write store values (service control, cache
//! flushing, power-plan changes). Such behaviour is a capability registered
//! under the tweak id in an [`ActionRegistry`]; the orchestrator looks it up
//! and runs it after the tweak's store targets.

use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::debug;
use twk_types::{ActionSpec, TweakStatus};

use crate::catalog::Catalog;
use crate::error::ActionError;

/// A side effect with apply and revert halves.
pub trait TweakAction: Send + Sync {
    fn apply(&self) -> Result<(), ActionError>;

    fn revert(&self) -> Result<(), ActionError>;

    /// Current status of the effect, if it can be observed.
    ///
    /// When this returns `Some`, it replaces the status derived from the
    /// tweak's store targets.
    fn probe(&self) -> Option<Result<TweakStatus, ActionError>> {
        None
    }
}

/// Runs declared command lines with the standard process API.
///
/// Every command in a list is run even if an earlier one fails; the first
/// failure is returned.
#[derive(Clone, Debug, Default)]
pub struct CommandAction {
    apply: Vec<Vec<String>>,
    revert: Vec<Vec<String>>,
}

impl CommandAction {
    pub fn new(apply: Vec<Vec<String>>, revert: Vec<Vec<String>>) -> Self {
        Self { apply, revert }
    }

    pub fn from_spec(spec: &ActionSpec) -> Self {
        Self::new(spec.apply.clone(), spec.revert.clone())
    }

    fn run_all(commands: &[Vec<String>]) -> Result<(), ActionError> {
        let mut first_error = None;
        for argv in commands {
            if let Err(e) = run(argv) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn run(argv: &[String]) -> Result<(), ActionError> {
    let (program, args) = argv.split_first().ok_or(ActionError::EmptyCommand)?;
    debug!(program = %program, args = ?args, "running action command");
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|source| ActionError::Spawn {
            program: program.clone(),
            source,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(ActionError::ExitStatus {
            program: program.clone(),
            status: status.to_string(),
        })
    }
}

impl TweakAction for CommandAction {
    fn apply(&self) -> Result<(), ActionError> {
        Self::run_all(&self.apply)
    }

    fn revert(&self) -> Result<(), ActionError> {
        Self::run_all(&self.revert)
    }
}

/// Tweak id to side-effect lookup.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn TweakAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a [`CommandAction`] for every tweak that declares one.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut registry = Self::new();
        for (_, tweak) in catalog.tweaks() {
            if let Some(spec) = &tweak.action {
                registry.register(tweak.id.clone(), CommandAction::from_spec(spec));
            }
        }
        registry
    }

    /// Register `action` under `tweak_id`, replacing any earlier one.
    pub fn register(&mut self, tweak_id: impl Into<String>, action: impl TweakAction + 'static) {
        self.actions.insert(tweak_id.into(), Arc::new(action));
    }

    pub fn get(&self, tweak_id: &str) -> Option<&dyn TweakAction> {
        self.actions.get(tweak_id).map(|a| a.as_ref())
    }

    pub fn contains(&self, tweak_id: &str) -> bool {
        self.actions.contains_key(tweak_id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.actions.keys().collect();
        ids.sort();
        f.debug_struct("ActionRegistry").field("tweaks", &ids).finish()
    }
}
