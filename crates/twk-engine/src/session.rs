//! High-level API tying catalog, store, ledger, and drift detection together.

use std::io;
use std::sync::Arc;

use tracing::{debug, info, warn};
use twk_ledger::{LedgerFile, MutationLedger, RestoreReport};
use twk_store::{JsonFileValueStore, ValueStore};
use twk_types::{DriftRecord, Tweak};

use crate::actions::ActionRegistry;
use crate::catalog::Catalog;
use crate::config::TwkConfig;
use crate::drift::{DriftDetector, DriftSnapshot};
use crate::elevation::{ElevationProvider, StaticElevation};
use crate::error::{EngineError, EngineResult};
use crate::monitor::{DriftCheck, DriftMonitor};
use crate::orchestrator::{BatchReport, Orchestrator};
use crate::reconcile::refresh_statuses;

/// One process's view of the tweak catalog and the store.
pub struct Session {
    catalog: Catalog,
    orchestrator: Orchestrator,
    detector: DriftDetector,
    /// Bumped by every apply, revert, and restore.
    generation: u64,
    /// Generation at which the last drift monitor was started.
    monitor_generation: Option<u64>,
}

impl Session {
    /// Open everything named by `config`: catalog, sandbox store, ledger.
    pub fn open(config: &TwkConfig) -> EngineResult<Self> {
        let catalog = config.catalog_provider().load()?;
        let store = JsonFileValueStore::open(config.store_path())?;
        // The sandbox rejects elevated-namespace writes like the host would.
        store.inner().set_elevated(config.elevated);
        let ledger = MutationLedger::open(LedgerFile::new(config.ledger_path()));
        info!(
            tweaks = catalog.tweak_count(),
            ledger_entries = ledger.len(),
            elevated = config.elevated,
            "session opened"
        );
        Ok(Self::new(
            catalog,
            Arc::new(store),
            ledger,
            Arc::new(StaticElevation(config.elevated)),
            DriftDetector::new(config.snapshot_path()),
        ))
    }

    /// Assemble a session from parts. Actions are registered from the
    /// catalog and statuses are reconciled immediately.
    pub fn new(
        catalog: Catalog,
        store: Arc<dyn ValueStore>,
        ledger: MutationLedger,
        elevation: Arc<dyn ElevationProvider>,
        detector: DriftDetector,
    ) -> Self {
        let actions = Arc::new(ActionRegistry::from_catalog(&catalog));
        Self::with_actions(catalog, store, ledger, elevation, actions, detector)
    }

    pub fn with_actions(
        catalog: Catalog,
        store: Arc<dyn ValueStore>,
        ledger: MutationLedger,
        elevation: Arc<dyn ElevationProvider>,
        actions: Arc<ActionRegistry>,
        detector: DriftDetector,
    ) -> Self {
        let mut session = Self {
            catalog,
            orchestrator: Orchestrator::new(store, ledger, elevation, actions),
            detector,
            generation: 0,
            monitor_generation: None,
        };
        session.refresh();
        session
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &MutationLedger {
        self.orchestrator.ledger()
    }

    pub fn is_elevated(&self) -> bool {
        self.orchestrator.is_elevated()
    }

    pub fn detector(&self) -> &DriftDetector {
        &self.detector
    }

    /// Reconcile every tweak against the store.
    pub fn refresh(&mut self) {
        refresh_statuses(
            self.orchestrator.store().as_ref(),
            self.orchestrator.actions(),
            &mut self.catalog,
        );
    }

    fn mutated(&mut self) {
        self.generation += 1;
        self.refresh();
    }

    fn lookup(&self, ids: &[String]) -> EngineResult<Vec<Tweak>> {
        ids.iter()
            .map(|id| {
                self.catalog
                    .tweak(id)
                    .cloned()
                    .ok_or_else(|| EngineError::UnknownTweak(id.clone()))
            })
            .collect()
    }

    fn module_tweaks(&self, name: &str) -> EngineResult<Vec<Tweak>> {
        self.catalog
            .module(name)
            .map(|m| m.tweaks.clone())
            .ok_or_else(|| EngineError::UnknownModule(name.to_string()))
    }

    /// Apply tweaks by id, in the order given. Unknown ids fail before
    /// anything is written.
    pub fn apply(&mut self, ids: &[String]) -> EngineResult<BatchReport> {
        let tweaks = self.lookup(ids)?;
        let report = self.orchestrator.apply_batch(&tweaks);
        self.mutated();
        Ok(report)
    }

    pub fn revert(&mut self, ids: &[String]) -> EngineResult<BatchReport> {
        let tweaks = self.lookup(ids)?;
        let report = self.orchestrator.revert_batch(&tweaks);
        self.mutated();
        Ok(report)
    }

    /// Apply every tweak of a module in catalog order.
    pub fn apply_module(&mut self, name: &str) -> EngineResult<BatchReport> {
        let tweaks = self.module_tweaks(name)?;
        let report = self.orchestrator.apply_batch(&tweaks);
        self.mutated();
        Ok(report)
    }

    pub fn revert_module(&mut self, name: &str) -> EngineResult<BatchReport> {
        let tweaks = self.module_tweaks(name)?;
        let report = self.orchestrator.revert_batch(&tweaks);
        self.mutated();
        Ok(report)
    }

    /// Restore every pre-image in the ledger.
    pub fn restore_all(&mut self) -> RestoreReport {
        let report = self.orchestrator.restore_all();
        self.mutated();
        report
    }

    pub fn detect_drift(&self) -> Vec<DriftRecord> {
        self.detector.detect(&self.catalog)
    }

    /// Detect drift and log every drifted tweak.
    ///
    /// Run this before any mutation: [`Session::finish`] overwrites the
    /// snapshot, after which the drift can no longer be seen.
    pub fn check_drift(&self) -> Vec<DriftRecord> {
        let drift = self.detect_drift();
        for d in &drift {
            warn!(
                module = %d.module,
                tweak = %d.tweak_id,
                "{} was reverted outside twk",
                d.tweak_name
            );
        }
        drift
    }

    /// Reconcile, then overwrite the snapshot with the applied tweaks.
    pub fn save_snapshot(&mut self) -> EngineResult<DriftSnapshot> {
        self.refresh();
        self.detector.save(&self.catalog)
    }

    /// Like [`Session::save_snapshot`] but only logs a failure.
    pub fn finish(&mut self) {
        if let Err(e) = self.save_snapshot() {
            warn!(error = %e, "failed to save drift snapshot");
        }
    }

    /// Start the background drift check on a copy of the catalog.
    pub fn spawn_drift_monitor(&mut self) -> io::Result<DriftMonitor> {
        let monitor = DriftMonitor::spawn(
            self.catalog.clone(),
            Arc::clone(self.orchestrator.store()),
            Arc::clone(self.orchestrator.actions()),
            self.detector.clone(),
        )?;
        self.monitor_generation = Some(self.generation);
        Ok(monitor)
    }

    /// Take the statuses produced by a background check.
    ///
    /// If tweaks were applied or reverted after the check started, its
    /// statuses may be stale and the catalog is reconciled again instead.
    pub fn absorb(&mut self, check: &DriftCheck) {
        if self.monitor_generation.take() == Some(self.generation) {
            self.catalog.apply_statuses(&check.statuses);
        } else {
            debug!("tweaks changed during the drift check, reconciling again");
            self.refresh();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tweaks", &self.catalog.tweak_count())
            .field("orchestrator", &self.orchestrator)
            .field("snapshot", &self.detector.path())
            .finish()
    }
}
