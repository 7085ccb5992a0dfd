//! Apply and revert of tweaks against the store, with pre-image capture.
//!
//! Every target of a tweak is attempted even when an earlier one fails, and
//! nothing already written is rolled back. The ledger is persisted after
//! each tweak regardless of outcome.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use twk_ledger::{MutationLedger, RestoreReport};
use twk_store::{StoreError, StoreResult, ValueStore};
use twk_types::{Address, MutationTarget, TargetSpec, Tweak};

use crate::actions::ActionRegistry;
use crate::composite;
use crate::elevation::ElevationProvider;
use crate::error::FailReason;

/// Result of applying or reverting one tweak.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TweakOutcome {
    pub tweak_id: String,
    pub tweak_name: String,
    pub success: bool,
    #[serde(serialize_with = "serialize_reason")]
    pub reason: Option<FailReason>,
    pub requires_reboot: bool,
}

fn serialize_reason<S: serde::Serializer>(
    reason: &Option<FailReason>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match reason {
        Some(r) => s.serialize_some(&r.to_string()),
        None => s.serialize_none(),
    }
}

/// Outcomes of a batch, in the order the tweaks were processed.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<TweakOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Whether any successfully processed tweak needs a reboot.
    pub fn requires_reboot(&self) -> bool {
        self.outcomes.iter().any(|o| o.success && o.requires_reboot)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Apply,
    Revert,
}

impl Direction {
    fn verb(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Revert => "revert",
        }
    }
}

/// Drives apply and revert for tweaks, owning the session's ledger.
pub struct Orchestrator {
    store: Arc<dyn ValueStore>,
    ledger: MutationLedger,
    elevation: Arc<dyn ElevationProvider>,
    actions: Arc<ActionRegistry>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ValueStore>,
        ledger: MutationLedger,
        elevation: Arc<dyn ElevationProvider>,
        actions: Arc<ActionRegistry>,
    ) -> Self {
        Self {
            store,
            ledger,
            elevation,
            actions,
        }
    }

    pub fn store(&self) -> &Arc<dyn ValueStore> {
        &self.store
    }

    pub fn ledger(&self) -> &MutationLedger {
        &self.ledger
    }

    pub fn actions(&self) -> &Arc<ActionRegistry> {
        &self.actions
    }

    pub fn is_elevated(&self) -> bool {
        self.elevation.is_elevated()
    }

    /// Capture pre-images and write every target's apply value, then run
    /// the tweak's action if one is registered.
    pub fn apply(&mut self, tweak: &Tweak) -> TweakOutcome {
        let mut failures = Vec::new();
        for target in &tweak.targets {
            if let Err(e) = self.apply_target(target) {
                warn!(
                    tweak = %tweak.id,
                    address = %target.address,
                    error = %e,
                    "target apply failed"
                );
                failures.push((target.address.clone(), e));
            }
        }
        self.persist_ledger();
        self.finish(tweak, Direction::Apply, failures)
    }

    /// Undo every target, then run the action's revert half.
    ///
    /// Per target the first applicable rule wins: composite targets drop
    /// their token; a held pre-image is restored exactly; otherwise the
    /// declared default is written, or the value deleted if so flagged.
    /// Ledger entries are left in place.
    pub fn revert(&mut self, tweak: &Tweak) -> TweakOutcome {
        let mut failures = Vec::new();
        for target in &tweak.targets {
            if let Err(e) = self.revert_target(target) {
                warn!(
                    tweak = %tweak.id,
                    address = %target.address,
                    error = %e,
                    "target revert failed"
                );
                failures.push((target.address.clone(), e));
            }
        }
        self.persist_ledger();
        self.finish(tweak, Direction::Revert, failures)
    }

    pub fn apply_batch<'a>(&mut self, tweaks: impl IntoIterator<Item = &'a Tweak>) -> BatchReport {
        let outcomes = tweaks.into_iter().map(|t| self.apply(t)).collect();
        let report = BatchReport { outcomes };
        info!(succeeded = report.succeeded(), failed = report.failed(), "batch apply finished");
        report
    }

    pub fn revert_batch<'a>(&mut self, tweaks: impl IntoIterator<Item = &'a Tweak>) -> BatchReport {
        let outcomes = tweaks.into_iter().map(|t| self.revert(t)).collect();
        let report = BatchReport { outcomes };
        info!(succeeded = report.succeeded(), failed = report.failed(), "batch revert finished");
        report
    }

    /// Restore every captured pre-image, newest first.
    ///
    /// A fully successful restore clears the ledger; otherwise the ledger
    /// keeps only the entries that failed.
    pub fn restore_all(&mut self) -> RestoreReport {
        let report = self.ledger.restore_all(self.store.as_ref());
        if report.is_complete() {
            info!(outcome = "success", restored = report.restored.len(), "all changes restored");
        } else {
            warn!(failed = report.failed.len(), "some changes could not be restored");
        }
        report
    }

    fn apply_target(&mut self, target: &MutationTarget) -> StoreResult<()> {
        let address = &target.address;
        // No write without a recorded pre-image.
        self.ledger.capture_if_absent(self.store.as_ref(), address)?;
        match &target.spec {
            TargetSpec::Text {
                apply,
                composite: true,
                ..
            } => {
                let existing = self.store.read_text(address)?.unwrap_or_default();
                let merged = composite::merge_token(&existing, apply);
                debug!(address = %address, value = %merged, "merging composite token");
                self.store.write_text(address, &merged)
            }
            _ => self.store.write_raw(address, &target.apply_value()),
        }
    }

    fn revert_target(&mut self, target: &MutationTarget) -> StoreResult<()> {
        let address = &target.address;
        if let TargetSpec::Text {
            apply,
            composite: true,
            ..
        } = &target.spec
        {
            let existing = match self.store.read_text(address)? {
                Some(v) if !v.is_empty() => v,
                _ => return Ok(()),
            };
            let remaining = composite::remove_token(&existing, composite::token_key(apply));
            return if remaining.is_empty() {
                self.delete_value(address)
            } else {
                self.store.write_text(address, &remaining)
            };
        }

        if let Some(entry) = self.ledger.get(address) {
            debug!(address = %address, existed = entry.existed, "restoring pre-image");
            return MutationLedger::restore_entry(self.store.as_ref(), entry);
        }

        if target.delete_on_revert {
            self.delete_value(address)
        } else {
            self.store.write_raw(address, &target.default_value())
        }
    }

    fn delete_value(&self, address: &Address) -> StoreResult<()> {
        match self.store.delete(address) {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    fn persist_ledger(&self) {
        if let Err(e) = self.ledger.persist() {
            warn!(error = %e, "ledger persist failed, continuing with in-memory ledger");
        }
    }

    fn finish(
        &self,
        tweak: &Tweak,
        direction: Direction,
        failures: Vec<(Address, StoreError)>,
    ) -> TweakOutcome {
        let mut reason = if failures.is_empty() {
            None
        } else {
            Some(self.classify(direction, &failures))
        };

        if let Some(action) = self.actions.get(&tweak.id) {
            let result = match direction {
                Direction::Apply => action.apply(),
                Direction::Revert => action.revert(),
            };
            if let Err(e) = result {
                warn!(tweak = %tweak.id, error = %e, "{} action failed", direction.verb());
                reason.get_or_insert(FailReason::Action(e.to_string()));
            }
        } else if tweak.targets.is_empty() {
            reason = Some(FailReason::NoTargets);
        }

        match &reason {
            None => info!(
                tweak = %tweak.id,
                outcome = "success",
                "{} {}",
                if direction == Direction::Apply { "applied" } else { "reverted" },
                tweak.name
            ),
            Some(r) => warn!(tweak = %tweak.id, reason = %r, "{} failed", direction.verb()),
        }

        TweakOutcome {
            tweak_id: tweak.id.clone(),
            tweak_name: tweak.name.clone(),
            success: reason.is_none(),
            reason,
            requires_reboot: tweak.requires_reboot,
        }
    }

    /// Most specific reason for a set of target failures.
    fn classify(&self, direction: Direction, failures: &[(Address, StoreError)]) -> FailReason {
        let elevated = self.elevation.is_elevated();
        if !elevated && failures.iter().any(|(a, _)| a.root.requires_elevation()) {
            FailReason::ElevationRequired {
                verb: direction.verb(),
            }
        } else if failures.iter().any(|(_, e)| e.is_access_denied()) {
            FailReason::ProtectedByPolicy
        } else {
            let detail = failures
                .first()
                .map(|(_, e)| e.to_string())
                .unwrap_or_default();
            FailReason::WriteFailed(detail)
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("ledger_entries", &self.ledger.len())
            .field("elevated", &self.elevation.is_elevated())
            .field("actions", &self.actions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use twk_ledger::LedgerFile;
    use twk_store::InMemoryValueStore;
    use twk_types::{RawValue, RootNamespace, TweakStatus};

    use crate::actions::testing::ScriptedAction;
    use crate::elevation::StaticElevation;
    use crate::reconcile::reconcile;

    fn user(name: &str) -> Address {
        Address::new(RootNamespace::CurrentUser, "Software\\Demo", name)
    }

    fn machine(name: &str) -> Address {
        Address::new(RootNamespace::LocalMachine, "SOFTWARE\\Demo", name)
    }

    struct Fixture {
        store: Arc<InMemoryValueStore>,
        orch: Orchestrator,
    }

    fn fixture_with(ledger: MutationLedger, elevated: bool, actions: ActionRegistry) -> Fixture {
        let store = Arc::new(InMemoryValueStore::new());
        store.set_elevated(elevated);
        let orch = Orchestrator::new(
            store.clone(),
            ledger,
            Arc::new(StaticElevation(elevated)),
            Arc::new(actions),
        );
        Fixture { store, orch }
    }

    fn fixture() -> Fixture {
        fixture_with(MutationLedger::in_memory(), true, ActionRegistry::new())
    }

    #[test]
    fn apply_then_revert_restores_existing_bytes() {
        let mut f = fixture();
        f.store.write_integer(&user("a"), 7).unwrap();
        let tweak = Tweak::new("t", "T", vec![MutationTarget::integer(user("a"), 1, 0)]);

        assert!(f.orch.apply(&tweak).success);
        assert_eq!(reconcile(f.store.as_ref(), &tweak), TweakStatus::Applied);
        assert_eq!(f.orch.ledger().len(), 1);

        assert!(f.orch.revert(&tweak).success);
        assert_eq!(f.store.read_raw(&user("a")).unwrap(), Some(RawValue::integer(7)));
        // Per-tweak revert keeps the pre-image.
        assert_eq!(f.orch.ledger().len(), 1);
    }

    #[test]
    fn apply_then_revert_deletes_value_that_did_not_exist() {
        let mut f = fixture();
        let tweak = Tweak::new("t", "T", vec![MutationTarget::text(user("s"), "on", "off")]);

        f.orch.apply(&tweak);
        assert_eq!(f.store.read_text(&user("s")).unwrap().as_deref(), Some("on"));
        f.orch.revert(&tweak);
        assert_eq!(f.store.read_raw(&user("s")).unwrap(), None);
        assert_eq!(reconcile(f.store.as_ref(), &tweak), TweakStatus::NotApplied);
    }

    #[test]
    fn revert_without_preimage_uses_default_or_delete() {
        let mut f = fixture();
        f.store.write_integer(&user("d"), 1).unwrap();
        f.store.write_integer(&user("x"), 1).unwrap();
        let tweak = Tweak::new(
            "t",
            "T",
            vec![
                MutationTarget::integer(user("d"), 1, 9),
                MutationTarget::integer(user("x"), 1, 0).deleting_on_revert(),
                MutationTarget::integer(user("never"), 1, 0).deleting_on_revert(),
            ],
        );

        let outcome = f.orch.revert(&tweak);
        assert!(outcome.success);
        assert_eq!(f.store.read_integer(&user("d")).unwrap(), Some(9));
        assert_eq!(f.store.read_raw(&user("x")).unwrap(), None);
        assert!(f.orch.ledger().is_empty());
    }

    #[test]
    fn composite_apply_and_revert() {
        let mut f = fixture();
        f.store.write_text(&user("c"), "a=1;b=2").unwrap();
        let tweak = Tweak::new("vrr", "VRR", vec![MutationTarget::composite(user("c"), "b=9")]);

        f.orch.apply(&tweak);
        assert_eq!(f.store.read_text(&user("c")).unwrap().as_deref(), Some("a=1;b=9"));
        assert_eq!(reconcile(f.store.as_ref(), &tweak), TweakStatus::Applied);

        f.orch.revert(&tweak);
        assert_eq!(f.store.read_text(&user("c")).unwrap().as_deref(), Some("a=1"));
    }

    #[test]
    fn composite_revert_of_last_token_deletes_value() {
        let mut f = fixture();
        let tweak = Tweak::new("vrr", "VRR", vec![MutationTarget::composite(user("c"), "b=9")]);
        f.orch.apply(&tweak);
        assert_eq!(f.store.read_text(&user("c")).unwrap().as_deref(), Some("b=9"));

        assert!(f.orch.revert(&tweak).success);
        assert_eq!(f.store.read_raw(&user("c")).unwrap(), None);
        // Reverting again with nothing there is a no-op.
        assert!(f.orch.revert(&tweak).success);
    }

    #[test]
    fn all_targets_attempted_after_failure() {
        let mut f = fixture();
        f.store.protect(user("p"));
        let tweak = Tweak::new(
            "t",
            "T",
            vec![
                MutationTarget::integer(user("p"), 1, 0),
                MutationTarget::integer(user("q"), 1, 0),
            ],
        );

        let outcome = f.orch.apply(&tweak);
        assert!(!outcome.success);
        assert_eq!(outcome.reason, Some(FailReason::ProtectedByPolicy));
        assert_eq!(f.store.read_integer(&user("q")).unwrap(), Some(1));
        assert_eq!(reconcile(f.store.as_ref(), &tweak), TweakStatus::PartiallyApplied);
        // Both pre-images were captured before the writes were attempted.
        assert_eq!(f.orch.ledger().len(), 2);
    }

    #[test]
    fn unelevated_machine_write_requires_elevation() {
        let mut f = fixture_with(MutationLedger::in_memory(), false, ActionRegistry::new());
        let tweak = Tweak::new(
            "t",
            "T",
            vec![
                MutationTarget::integer(user("u"), 1, 0),
                MutationTarget::integer(machine("m"), 1, 0),
            ],
        );
        let outcome = f.orch.apply(&tweak);
        assert_eq!(
            outcome.reason,
            Some(FailReason::ElevationRequired { verb: "apply" })
        );
        assert_eq!(f.store.read_integer(&user("u")).unwrap(), Some(1));
    }

    #[test]
    fn unelevated_machine_revert_names_revert() {
        let mut f = fixture_with(MutationLedger::in_memory(), false, ActionRegistry::new());
        let tweak = Tweak::new("t", "T", vec![MutationTarget::integer(machine("m"), 1, 0)]);
        let outcome = f.orch.revert(&tweak);
        assert!(!outcome.success);
        let reason = outcome.reason.unwrap();
        assert_eq!(reason, FailReason::ElevationRequired { verb: "revert" });
        assert!(reason.to_string().ends_with("to revert this tweak."));
    }

    #[test]
    fn unreadable_target_is_not_written() {
        struct Unreadable(InMemoryValueStore);
        impl ValueStore for Unreadable {
            fn read_raw(&self, address: &Address) -> StoreResult<Option<RawValue>> {
                Err(StoreError::Other {
                    address: address.clone(),
                    reason: "read refused".into(),
                })
            }
            fn write_raw(&self, address: &Address, value: &RawValue) -> StoreResult<()> {
                self.0.write_raw(address, value)
            }
            fn delete(&self, address: &Address) -> StoreResult<()> {
                self.0.delete(address)
            }
        }

        let store = Arc::new(Unreadable(InMemoryValueStore::new()));
        let mut orch = Orchestrator::new(
            store.clone(),
            MutationLedger::in_memory(),
            Arc::new(StaticElevation(true)),
            Arc::new(ActionRegistry::new()),
        );
        let tweak = Tweak::new("t", "T", vec![MutationTarget::integer(user("a"), 1, 0)]);
        let outcome = orch.apply(&tweak);
        assert!(matches!(outcome.reason, Some(FailReason::WriteFailed(_))));
        assert!(store.0.is_empty());
        assert!(orch.ledger().is_empty());
    }

    #[test]
    fn tweak_without_targets_or_action_fails() {
        let mut f = fixture();
        let outcome = f.orch.apply(&Tweak::new("empty", "Empty", vec![]));
        assert_eq!(outcome.reason, Some(FailReason::NoTargets));
    }

    #[test]
    fn action_runs_after_targets() {
        let scripted = Arc::new(ScriptedAction::default());
        let mut actions = ActionRegistry::new();
        actions.register("fx", scripted.clone());
        let mut f = fixture_with(MutationLedger::in_memory(), true, actions);

        let action_only = Tweak::new("fx", "Effect", vec![]);
        assert!(f.orch.apply(&action_only).success);
        assert!(f.orch.revert(&action_only).success);
        assert_eq!(scripted.applies.load(Ordering::SeqCst), 1);
        assert_eq!(scripted.reverts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_action_fails_tweak() {
        let scripted = Arc::new(ScriptedAction {
            fail_apply: true,
            ..Default::default()
        });
        let mut actions = ActionRegistry::new();
        actions.register("fx", scripted);
        let mut f = fixture_with(MutationLedger::in_memory(), true, actions);

        let tweak = Tweak::new("fx", "Effect", vec![MutationTarget::integer(user("a"), 1, 0)]);
        let outcome = f.orch.apply(&tweak);
        assert!(matches!(outcome.reason, Some(FailReason::Action(_))));
        assert_eq!(f.store.read_integer(&user("a")).unwrap(), Some(1));
    }

    #[test]
    fn batch_counts_and_reboot_flag() {
        let mut f = fixture();
        f.store.protect(user("bad"));
        let mut reboot = Tweak::new("r", "R", vec![MutationTarget::integer(user("r"), 1, 0)]);
        reboot.requires_reboot = true;
        let bad = Tweak::new("b", "B", vec![MutationTarget::integer(user("bad"), 1, 0)]);

        let report = f.orch.apply_batch([&reboot, &bad]);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.requires_reboot());
        assert_eq!(report.outcomes[0].tweak_id, "r");
    }

    #[test]
    fn bulk_restore_keeps_only_failed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.dat");
        let ledger = MutationLedger::open(LedgerFile::new(&path));
        let mut f = fixture_with(ledger, true, ActionRegistry::new());

        let tweaks: Vec<Tweak> = ["a", "b", "c", "d"]
            .iter()
            .map(|n| Tweak::new(*n, *n, vec![MutationTarget::integer(user(n), 1, 0)]))
            .collect();
        f.store.write_integer(&user("a"), 5).unwrap();
        f.orch.apply_batch(&tweaks);
        assert_eq!(f.orch.ledger().len(), 4);

        f.store.protect(user("b"));
        f.store.protect(user("d"));
        let report = f.orch.restore_all();
        assert_eq!(report.failed.len(), 2);
        assert_eq!(f.store.read_integer(&user("a")).unwrap(), Some(5));
        assert_eq!(f.store.read_raw(&user("c")).unwrap(), None);

        let kept: Vec<&Address> = f.orch.ledger().entries().iter().map(|e| &e.address).collect();
        assert_eq!(kept, vec![&user("b"), &user("d")]);
        assert_eq!(MutationLedger::open(LedgerFile::new(&path)).len(), 2);

        f.store.unprotect(&user("b"));
        f.store.unprotect(&user("d"));
        assert!(f.orch.restore_all().is_complete());
        assert!(f.orch.ledger().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn outcome_serializes_reason_text() {
        let outcome = TweakOutcome {
            tweak_id: "t".into(),
            tweak_name: "T".into(),
            success: false,
            reason: Some(FailReason::ElevationRequired { verb: "apply" }),
            requires_reboot: false,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json["reason"].as_str().unwrap().starts_with("Requires Administrator"));
    }
}
