//! Dispatch ledger: per-unit status bookkeeping for one run.
//!
//! Workers write `Running`/`Completed`/`Failed` as jobs execute. The
//! collecting thread writes `TimedOut`/`Cancelled` when it gives up on a unit.
//! Nothing in the dispatch path reads the ledger; it only feeds the run report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use volley_core::{Fault, Outcome};

/// Dispatch-order identifier of a unit within one ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u64);

/// Lifecycle status of a dispatched unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Queued,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl UnitStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, UnitStatus::Queued | UnitStatus::Running)
    }
}

/// Full state of one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: UnitId,
    /// What was dispatched, usually a metric id.
    pub label: String,
    pub status: UnitStatus,
    /// Wall-clock milliseconds the job ran on its worker, once it finished.
    pub elapsed_ms: Option<u64>,
    /// Fault message for units that did not produce a value.
    pub error: Option<String>,
    #[serde(skip)]
    started_at: Option<Instant>,
}

/// In-memory ledger shared between the dispatching thread and workers.
#[derive(Clone, Default)]
pub struct DispatchLedger {
    units: Arc<DashMap<UnitId, UnitRecord>>,
    next_id: Arc<AtomicU64>,
}

impl DispatchLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly dispatched unit as `Queued`.
    pub fn register(&self, label: impl Into<String>) -> UnitId {
        let id = UnitId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.units.insert(
            id,
            UnitRecord {
                id,
                label: label.into(),
                status: UnitStatus::Queued,
                elapsed_ms: None,
                error: None,
                started_at: None,
            },
        );
        id
    }

    pub fn mark_running(&self, id: UnitId) {
        if let Some(mut unit) = self.units.get_mut(&id) {
            unit.status = UnitStatus::Running;
            unit.started_at = Some(Instant::now());
        }
    }

    /// Record that the job returned on its worker.
    pub fn mark_finished(&self, id: UnitId, ok: bool) {
        if let Some(mut unit) = self.units.get_mut(&id) {
            unit.elapsed_ms = unit.started_at.map(|t| t.elapsed().as_millis() as u64);
            // The collector may already have given up on this unit.
            if !unit.status.is_terminal() {
                unit.status = if ok {
                    UnitStatus::Completed
                } else {
                    UnitStatus::Failed
                };
            }
        }
    }

    /// Record what the collector concluded about a unit.
    pub fn record_outcome<T>(&self, id: UnitId, outcome: &Outcome<T>) {
        if let Some(mut unit) = self.units.get_mut(&id) {
            match outcome {
                Ok(_) => unit.status = UnitStatus::Completed,
                Err(fault) => {
                    unit.status = match fault {
                        Fault::Business(_) => UnitStatus::Failed,
                        Fault::Timeout { .. } => UnitStatus::TimedOut,
                        Fault::Cancelled => UnitStatus::Cancelled,
                    };
                    unit.error = Some(fault.to_string());
                }
            }
        }
    }

    pub fn get(&self, id: UnitId) -> Option<UnitRecord> {
        self.units.get(&id).map(|u| u.clone())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Snapshot every unit in dispatch order.
    pub fn report(&self) -> RunReport {
        let mut units: Vec<UnitRecord> = self.units.iter().map(|u| u.value().clone()).collect();
        units.sort_by_key(|u| u.id);
        RunReport { units }
    }
}

/// Per-unit summary of one run, in dispatch order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub units: Vec<UnitRecord>,
}

impl RunReport {
    pub fn count(&self, status: UnitStatus) -> usize {
        self.units.iter().filter(|u| u.status == status).count()
    }

    pub fn all_completed(&self) -> bool {
        self.units.iter().all(|u| u.status == UnitStatus::Completed)
    }
}
