//! One-shot background drift check.
//!
//! [`DriftMonitor::spawn`] starts a single worker thread that reconciles a
//! copy of the catalog, runs drift detection, and hands the result back
//! through a flag and a mutex. The interactive thread calls
//! [`DriftMonitor::poll`] once per loop iteration; it never blocks and
//! yields the result at most once.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};
use twk_store::ValueStore;
use twk_types::{DriftRecord, TweakStatus};

use crate::actions::ActionRegistry;
use crate::catalog::Catalog;
use crate::drift::DriftDetector;
use crate::reconcile::refresh_statuses;

/// Result of a background drift check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DriftCheck {
    /// Fresh status of every tweak, keyed by id.
    pub statuses: HashMap<String, TweakStatus>,
    pub drift: Vec<DriftRecord>,
}

struct Handoff {
    ready: AtomicBool,
    result: Mutex<Option<DriftCheck>>,
}

pub struct DriftMonitor {
    handoff: Arc<Handoff>,
    worker: Option<JoinHandle<()>>,
}

impl DriftMonitor {
    pub fn spawn(
        mut catalog: Catalog,
        store: Arc<dyn ValueStore>,
        actions: Arc<ActionRegistry>,
        detector: DriftDetector,
    ) -> io::Result<Self> {
        let handoff = Arc::new(Handoff {
            ready: AtomicBool::new(false),
            result: Mutex::new(None),
        });
        let shared = Arc::clone(&handoff);
        let worker = thread::Builder::new()
            .name("twk-drift".into())
            .spawn(move || {
                refresh_statuses(store.as_ref(), &actions, &mut catalog);
                let drift = detector.detect(&catalog);
                debug!(drifted = drift.len(), "background drift check finished");
                let check = DriftCheck {
                    statuses: catalog.statuses(),
                    drift,
                };
                *shared.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(check);
                shared.ready.store(true, Ordering::Release);
            })?;
        Ok(Self {
            handoff,
            worker: Some(worker),
        })
    }

    /// Take the result if the worker has published it.
    pub fn poll(&self) -> Option<DriftCheck> {
        if self.handoff.ready.swap(false, Ordering::AcqRel) {
            self.handoff
                .result
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
        } else {
            None
        }
    }

    /// Whether the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Block until the worker exits, then take any unconsumed result.
    ///
    /// A panicked worker is logged and yields no result.
    pub fn wait(mut self) -> Option<DriftCheck> {
        if let Some(worker) = self.worker.take() {
            if let Err(panic) = worker.join() {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                warn!(panic = %message, "background drift check panicked");
                return None;
            }
        }
        self.poll()
    }
}

impl std::fmt::Debug for DriftMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriftMonitor")
            .field("ready", &self.handoff.ready.load(Ordering::Acquire))
            .field("finished", &self.is_finished())
            .finish()
    }
}
