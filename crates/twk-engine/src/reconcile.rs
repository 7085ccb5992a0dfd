//! Classification of tweaks against the live store.
//!
//! Reconciliation only reads. A read failure of any kind, a missing value,
//! or a value of the wrong kind all count as "not satisfied".

use tracing::{debug, warn};
use twk_store::ValueStore;
use twk_types::{MutationTarget, TargetSpec, Tweak, TweakStatus};

use crate::actions::ActionRegistry;
use crate::catalog::Catalog;

/// Whether `target` is currently in its applied state.
pub fn is_satisfied(store: &dyn ValueStore, target: &MutationTarget) -> bool {
    let address = &target.address;
    let result = match &target.spec {
        TargetSpec::Integer {
            apply, expected, ..
        } => store
            .read_integer(address)
            .map(|v| v == Some(expected.unwrap_or(*apply))),
        TargetSpec::Text {
            apply,
            expected,
            composite,
            ..
        } => store.read_text(address).map(|current| match current {
            Some(current) => text_matches(&current, apply, expected.as_deref(), *composite),
            None => false,
        }),
        TargetSpec::Binary { apply, .. } => store
            .read_binary(address)
            .map(|v| v.as_deref() == Some(apply.as_slice())),
    };
    result.unwrap_or_else(|e| {
        debug!(address = %address, error = %e, "read failed during reconcile");
        false
    })
}

/// Text comparison rule.
///
/// A non-empty expected string is compared exactly, unless it contains `=`,
/// in which case the current value need only contain it. With no expected
/// string the current value must equal the apply value, except for composite
/// targets, which look for their own token.
fn text_matches(current: &str, apply: &str, expected: Option<&str>, composite: bool) -> bool {
    let expected = match expected.filter(|e| !e.is_empty()) {
        Some(e) => Some(e),
        None if composite => Some(apply),
        None => None,
    };
    match expected {
        Some(e) if e.contains('=') => current.contains(e),
        Some(e) => current == e,
        None => current == apply,
    }
}

/// Status of a tweak derived from its store targets alone.
pub fn reconcile(store: &dyn ValueStore, tweak: &Tweak) -> TweakStatus {
    let total = tweak.targets.len();
    let satisfied = tweak
        .targets
        .iter()
        .filter(|t| is_satisfied(store, t))
        .count();
    TweakStatus::from_counts(satisfied, total)
}

/// Status of a tweak, letting a registered action's probe take precedence.
pub fn tweak_status(
    store: &dyn ValueStore,
    actions: &ActionRegistry,
    tweak: &Tweak,
) -> TweakStatus {
    match actions.get(&tweak.id).and_then(|a| a.probe()) {
        Some(Ok(status)) => status,
        Some(Err(e)) => {
            warn!(tweak = %tweak.id, error = %e, "status probe failed");
            TweakStatus::Error
        }
        None => reconcile(store, tweak),
    }
}

/// Recompute and store the status of every tweak in `catalog`.
pub fn refresh_statuses(store: &dyn ValueStore, actions: &ActionRegistry, catalog: &mut Catalog) {
    for tweak in catalog.modules.iter_mut().flat_map(|m| m.tweaks.iter_mut()) {
        tweak.status = tweak_status(store, actions, tweak);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use twk_store::InMemoryValueStore;
    use twk_types::{Address, Module, RawValue, RootNamespace};

    use crate::actions::testing::ScriptedAction;

    fn addr(name: &str) -> Address {
        Address::new(RootNamespace::CurrentUser, "Software\\Demo", name)
    }

    #[test]
    fn integer_compares_expected_or_apply() {
        let store = InMemoryValueStore::new();
        let t = MutationTarget::integer(addr("i"), 2, 0);
        assert!(!is_satisfied(&store, &t));
        store.write_integer(&addr("i"), 2).unwrap();
        assert!(is_satisfied(&store, &t));

        let t = MutationTarget::integer(addr("i"), 2, 0).expecting_integer(3);
        assert!(!is_satisfied(&store, &t));
    }

    #[test]
    fn wrong_kind_is_not_satisfied() {
        let store = InMemoryValueStore::new();
        store.write_text(&addr("i"), "2").unwrap();
        assert!(!is_satisfied(&store, &MutationTarget::integer(addr("i"), 2, 0)));
    }

    #[test]
    fn text_exact_and_substring_rules() {
        let store = InMemoryValueStore::new();
        store.write_text(&addr("t"), "a=1;VRROptimizeEnable=0").unwrap();

        let exact =
            MutationTarget::text(addr("t"), "x", "").expecting_text("a=1;VRROptimizeEnable=0");
        assert!(is_satisfied(&store, &exact));

        let loose = MutationTarget::text(addr("t"), "x", "").expecting_text("VRROptimizeEnable=0");
        assert!(is_satisfied(&store, &loose));

        let no_delim = MutationTarget::text(addr("t"), "x", "").expecting_text("a");
        assert!(!is_satisfied(&store, &no_delim));

        let by_apply = MutationTarget::text(addr("t"), "a=1;VRROptimizeEnable=0", "");
        assert!(is_satisfied(&store, &by_apply));
    }

    #[test]
    fn composite_without_expected_looks_for_its_token() {
        let store = InMemoryValueStore::new();
        store.write_text(&addr("c"), "a=1;b=9").unwrap();
        let mut t = MutationTarget::composite(addr("c"), "b=9");
        if let TargetSpec::Text { expected, .. } = &mut t.spec {
            *expected = None;
        }
        assert!(is_satisfied(&store, &t));
    }

    #[test]
    fn binary_compares_bytes() {
        let store = InMemoryValueStore::new();
        store.write_binary(&addr("b"), &[1, 2, 3]).unwrap();
        assert!(is_satisfied(&store, &MutationTarget::binary(addr("b"), vec![1, 2, 3], vec![])));
        assert!(!is_satisfied(&store, &MutationTarget::binary(addr("b"), vec![1, 2], vec![])));
    }

    #[test]
    fn status_counts_targets() {
        let store = InMemoryValueStore::with_values([(addr("a"), RawValue::integer(1))]);
        let tweak = Tweak::new(
            "t",
            "T",
            vec![
                MutationTarget::integer(addr("a"), 1, 0),
                MutationTarget::integer(addr("b"), 1, 0),
            ],
        );
        assert_eq!(reconcile(&store, &tweak), TweakStatus::PartiallyApplied);
        store.write_integer(&addr("b"), 1).unwrap();
        assert_eq!(reconcile(&store, &tweak), TweakStatus::Applied);
        store.delete(&addr("a")).unwrap();
        store.delete(&addr("b")).unwrap();
        assert_eq!(reconcile(&store, &tweak), TweakStatus::NotApplied);

        assert_eq!(reconcile(&store, &Tweak::new("e", "E", vec![])), TweakStatus::Unknown);
    }

    #[test]
    fn probe_overrides_reconciled_status() {
        let store = InMemoryValueStore::new();
        let scripted = Arc::new(ScriptedAction::default());
        *scripted.probe.lock().unwrap() = Some(Ok(TweakStatus::Applied));
        let mut actions = ActionRegistry::new();
        actions.register("probed", scripted.clone());

        let mut catalog = Catalog::new(vec![Module::new(
            "M",
            vec![
                Tweak::new("probed", "P", vec![]),
                Tweak::new("plain", "Q", vec![MutationTarget::integer(addr("q"), 1, 0)]),
            ],
        )]);
        refresh_statuses(&store, &actions, &mut catalog);
        assert_eq!(catalog.tweak("probed").unwrap().status, TweakStatus::Applied);
        assert_eq!(catalog.tweak("plain").unwrap().status, TweakStatus::NotApplied);

        *scripted.probe.lock().unwrap() = Some(Err("probe broke".into()));
        refresh_statuses(&store, &actions, &mut catalog);
        assert_eq!(catalog.tweak("probed").unwrap().status, TweakStatus::Error);
    }
}
