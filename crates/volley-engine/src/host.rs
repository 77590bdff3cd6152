//! Host engine interfaces.
//!
//! The host engine decides which metrics run and where their results go. It
//! looks up a [`CalculationStrategy`] for every metric through a
//! [`StrategyResolver`], runs it, and stores whatever slot comes back in the
//! [`ResultTable`]. The resolver is handed to each run, so the overlay hooks in
//! by passing its own for that run only. The host's lookup is never touched.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use volley_core::{BoxError, Fault};

use crate::deferred::DeferredResult;

/// Result payload of a metric calculation.
pub type MetricValue = serde_json::Value;

/// Key identifying one metric within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricId(pub String);

impl MetricId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user-supplied calculation over input data `D`.
pub trait Metric<D>: Send + Sync {
    fn id(&self) -> MetricId;
    fn calculate(&self, data: &D) -> Result<MetricValue, BoxError>;
}

/// Read-only run information handed to every strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalcContext {
    /// Free-form label of the run, used in logs.
    pub run_label: String,
    /// Engine-specific options strategies may consult.
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// How one metric is computed for a given engine.
pub trait CalculationStrategy<D>: Send + Sync {
    fn calculate(&self, ctx: &CalcContext, data: &Arc<D>) -> Result<ResultSlot, BoxError>;
}

/// Looks up the engine-specific strategy for a metric.
///
/// `None` means the engine has nothing special for it and the metric's own
/// `calculate` should be used.
pub trait StrategyResolver<D>: Send + Sync {
    fn resolve(&self, metric: &Arc<dyn Metric<D>>) -> Option<Arc<dyn CalculationStrategy<D>>>;
}

/// Runs a metric's own `calculate` inline.
pub struct MetricStrategy<D> {
    metric: Arc<dyn Metric<D>>,
}

impl<D> MetricStrategy<D> {
    pub fn new(metric: Arc<dyn Metric<D>>) -> Self {
        Self { metric }
    }
}

impl<D: Send + Sync> CalculationStrategy<D> for MetricStrategy<D> {
    fn calculate(&self, _ctx: &CalcContext, data: &Arc<D>) -> Result<ResultSlot, BoxError> {
        self.metric.calculate(data).map(ResultSlot::Ready)
    }
}

/// Resolver with no engine-specific strategies at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricOnlyResolver;

impl<D> StrategyResolver<D> for MetricOnlyResolver {
    fn resolve(&self, _metric: &Arc<dyn Metric<D>>) -> Option<Arc<dyn CalculationStrategy<D>>> {
        None
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// Failure marker stored in place of a metric's value.
#[derive(Debug, Clone)]
pub struct ErrorResult {
    fault: Fault,
}

impl ErrorResult {
    pub fn new(fault: Fault) -> Self {
        Self { fault }
    }

    pub fn fault(&self) -> &Fault {
        &self.fault
    }

    pub fn message(&self) -> String {
        self.fault.to_string()
    }
}

/// What a result table holds for one metric.
#[derive(Debug)]
pub enum ResultSlot {
    Ready(MetricValue),
    Failed(ErrorResult),
    /// Still running on an executor.
    Pending(DeferredResult<MetricValue>),
}

impl ResultSlot {
    pub fn value(&self) -> Option<&MetricValue> {
        match self {
            ResultSlot::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorResult> {
        match self {
            ResultSlot::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ResultSlot::Pending(_))
    }

    /// JSON view of a settled slot. Pending slots render as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ResultSlot::Ready(v) => v.clone(),
            ResultSlot::Failed(e) => serde_json::json!({ "error": e.message() }),
            ResultSlot::Pending(_) => serde_json::Value::Null,
        }
    }
}

/// Insertion-ordered results keyed by metric.
#[derive(Debug, Default)]
pub struct ResultTable {
    entries: Vec<(MetricId, ResultSlot)>,
    /// Position of each key in `entries`.
    index: HashMap<MetricId, usize>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a slot. Re-inserting a key replaces its slot in place.
    pub fn insert(&mut self, id: MetricId, slot: ResultSlot) {
        match self.index.get(&id) {
            Some(&at) => self.entries[at].1 = slot,
            None => {
                self.index.insert(id.clone(), self.entries.len());
                self.entries.push((id, slot));
            }
        }
    }

    pub fn get(&self, id: &MetricId) -> Option<&ResultSlot> {
        self.index.get(id).map(|&at| &self.entries[at].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricId, &ResultSlot)> {
        self.entries.iter().map(|(k, s)| (k, s))
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|(_, s)| s.is_pending()).count()
    }

    /// Take every entry out, leaving the table empty.
    pub fn drain(&mut self) -> Vec<(MetricId, ResultSlot)> {
        self.index.clear();
        std::mem::take(&mut self.entries)
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.entries
            .iter()
            .map(|(k, s)| (k.0.clone(), s.to_json()))
            .collect::<serde_json::Map<_, _>>()
            .into()
    }
}

impl FromIterator<(MetricId, ResultSlot)> for ResultTable {
    fn from_iter<I: IntoIterator<Item = (MetricId, ResultSlot)>>(iter: I) -> Self {
        let mut table = ResultTable::new();
        for (id, slot) in iter {
            table.insert(id, slot);
        }
        table
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Per-run state: what to compute and where results land.
pub struct RunContext<D> {
    pub metrics: Vec<Arc<dyn Metric<D>>>,
    pub calc: CalcContext,
    pub results: ResultTable,
}

impl<D> RunContext<D> {
    pub fn new(metrics: Vec<Arc<dyn Metric<D>>>) -> Self {
        Self {
            metrics,
            calc: CalcContext::default(),
            results: ResultTable::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.calc.run_label = label.into();
        self
    }
}

/// A host engine: runs every metric of a context and fills its result table.
///
/// Engines implement [`execute_metrics_with`](Engine::execute_metrics_with)
/// and resolve every strategy through the resolver it is given. Runs share no
/// lookup state, so any number of them may overlap on one engine.
pub trait Engine<D>: Send + Sync {
    /// The engine's own strategy lookup.
    fn resolver(&self) -> Arc<dyn StrategyResolver<D>>;

    /// Run every metric of `ctx`, resolving strategies through `resolver`.
    fn execute_metrics_with(
        &self,
        ctx: &mut RunContext<D>,
        data: &Arc<D>,
        resolver: &dyn StrategyResolver<D>,
    ) -> anyhow::Result<()>;

    /// Run every metric of `ctx` with the engine's own lookup.
    fn execute_metrics(&self, ctx: &mut RunContext<D>, data: &Arc<D>) -> anyhow::Result<()> {
        let resolver = self.resolver();
        self.execute_metrics_with(ctx, data, &*resolver)
    }
}
