//! Concurrent overlay for a host engine.
//!
//! [`ConcurrentEngine`] lets the host engine run exactly as it normally does,
//! with one change: the run is handed a resolver that answers every metric
//! with a [`FutureStrategy`]. That strategy dispatches the real calculation to
//! the executor and leaves a pending slot in the result table. Once the host
//! is done, the overlay collects every pending slot and writes the outcome
//! back in its place.
//!
//! The host's own resolver is only read, never replaced. Overlay runs, other
//! overlays sharing the same host, and direct host runs may all overlap.
//!
//! Cancellation on timeout is best effort. A calculation that already started
//! keeps its worker until it returns, even after its slot was marked failed.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use volley_core::config::BudgetPolicy;
use volley_core::{BoxError, Fault};

use crate::collector::{Finalization, PerUnitFinalization, SharedBudgetCollector};
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, EngineError};
use crate::executor::Executor;
use crate::handle::can_block_here;
use crate::host::{
    CalcContext, CalculationStrategy, Engine, ErrorResult, Metric, MetricId, MetricStrategy,
    MetricValue, ResultSlot, ResultTable, RunContext, StrategyResolver,
};
use crate::ledger::{DispatchLedger, RunReport, UnitId, UnitStatus};

pub struct ConcurrentEngine<D, E> {
    origin: Arc<E>,
    executor: Arc<dyn Executor<MetricValue>>,
    /// Budget each unit carries from dispatch.
    budget: Option<Duration>,
    finalization: Box<dyn Finalization<MetricValue>>,
    _data: PhantomData<fn(D)>,
}

impl<D, E> ConcurrentEngine<D, E>
where
    D: Send + Sync + 'static,
    E: Engine<D>,
{
    pub fn new(
        origin: Arc<E>,
        executor: Arc<dyn Executor<MetricValue>>,
        budget: Option<Duration>,
        finalization: Box<dyn Finalization<MetricValue>>,
    ) -> Self {
        Self {
            origin,
            executor,
            budget,
            finalization,
            _data: PhantomData,
        }
    }

    /// Overlay collecting with the stock strategy for `policy`.
    pub fn with_policy(
        origin: Arc<E>,
        executor: Arc<dyn Executor<MetricValue>>,
        timeout: Option<Duration>,
        policy: BudgetPolicy,
    ) -> Self {
        let finalization: Box<dyn Finalization<MetricValue>> = match policy {
            BudgetPolicy::Shared => Box::new(SharedBudgetCollector::new(timeout)),
            BudgetPolicy::PerUnit => Box::new(PerUnitFinalization),
        };
        Self::new(origin, executor, timeout, finalization)
    }

    /// The wrapped host engine, for anything the overlay does not override.
    pub fn origin(&self) -> &Arc<E> {
        &self.origin
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    /// Run every metric of `ctx` concurrently and fill its result table.
    ///
    /// Individual calculation failures, timeouts and cancellations end up as
    /// failed slots. An `Err` means the run itself broke: the host engine
    /// failed, the executor refused work, or a handle broke its contract.
    ///
    /// Collection blocks the calling thread. From async code this needs a
    /// multi-thread tokio runtime; on a current-thread runtime the run is
    /// refused with [`EngineError::BlockingContext`] before anything is
    /// dispatched.
    pub fn execute_all(
        &self,
        ctx: &mut RunContext<D>,
        data: &Arc<D>,
    ) -> Result<RunReport, EngineError> {
        let base = self.origin.resolver();
        self.run(ctx, data, &*base)
    }

    /// One run, with strategies looked up through `base` before dispatch.
    fn run(
        &self,
        ctx: &mut RunContext<D>,
        data: &Arc<D>,
        base: &dyn StrategyResolver<D>,
    ) -> Result<RunReport, EngineError> {
        if !can_block_here() {
            return Err(EngineError::BlockingContext);
        }
        let started = Instant::now();

        let dispatcher = Arc::new(Dispatcher::new(self.executor.clone(), self.budget));
        let refusal = Arc::new(Mutex::new(None));
        let intercept = DispatchingResolver {
            base,
            dispatcher: dispatcher.clone(),
            refusal: refusal.clone(),
        };

        if let Err(e) = self.origin.execute_metrics_with(ctx, data, &intercept) {
            abandon_pending(&mut ctx.results);
            return Err(EngineError::Host(e));
        }
        let refused = refusal.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(e) = refused {
            abandon_pending(&mut ctx.results);
            return Err(EngineError::Dispatch(e));
        }

        tracing::debug!(
            run = ctx.calc.run_label.as_str(),
            pending = ctx.results.pending_count(),
            "all units dispatched, collecting"
        );
        self.collect_into(&mut ctx.results, dispatcher.ledger())?;

        let report = dispatcher.ledger().report();
        tracing::info!(
            run = ctx.calc.run_label.as_str(),
            units = report.units.len(),
            failed = report.units.len() - report.count(UnitStatus::Completed),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "concurrent run finished"
        );
        Ok(report)
    }

    /// Replace every pending slot with its outcome, keeping table order.
    fn collect_into(
        &self,
        table: &mut ResultTable,
        ledger: &DispatchLedger,
    ) -> Result<(), EngineError> {
        let mut entries: Vec<(MetricId, Option<ResultSlot>)> = Vec::with_capacity(table.len());
        let mut pending = Vec::new();
        for (id, slot) in table.drain() {
            match slot {
                ResultSlot::Pending(deferred) => {
                    pending.push(deferred);
                    entries.push((id, None));
                }
                settled => entries.push((id, Some(settled))),
            }
        }

        let units: Vec<UnitId> = pending.iter().map(|d| d.unit()).collect();
        let expected = units.len();
        let outcomes = match self.finalization.finalize(pending) {
            Ok(outcomes) => outcomes,
            Err(e) => {
                *table = entries
                    .into_iter()
                    .map(|(id, slot)| (id, slot.unwrap_or_else(cancelled_slot)))
                    .collect();
                return Err(e);
            }
        };
        if outcomes.len() != expected {
            tracing::warn!(
                expected,
                got = outcomes.len(),
                "finalization returned the wrong number of outcomes"
            );
        }

        let mut outcomes = units.into_iter().zip(outcomes);
        *table = entries
            .into_iter()
            .map(|(id, slot)| {
                let slot = slot.unwrap_or_else(|| match outcomes.next() {
                    Some((unit, outcome)) => {
                        ledger.record_outcome(unit, &outcome);
                        match outcome {
                            Ok(value) => ResultSlot::Ready(value),
                            Err(fault) => {
                                tracing::warn!(metric = %id, error = %fault, "metric produced no value");
                                ResultSlot::Failed(ErrorResult::new(fault))
                            }
                        }
                    }
                    None => cancelled_slot(),
                });
                (id, slot)
            })
            .collect();
        Ok(())
    }
}

/// Forwarding so the overlay can stand wherever a host engine is expected.
impl<D, E> Engine<D> for ConcurrentEngine<D, E>
where
    D: Send + Sync + 'static,
    E: Engine<D>,
{
    fn resolver(&self) -> Arc<dyn StrategyResolver<D>> {
        self.origin.resolver()
    }

    fn execute_metrics_with(
        &self,
        ctx: &mut RunContext<D>,
        data: &Arc<D>,
        resolver: &dyn StrategyResolver<D>,
    ) -> anyhow::Result<()> {
        self.run(ctx, data, resolver)?;
        Ok(())
    }
}

fn cancelled_slot() -> ResultSlot {
    ResultSlot::Failed(ErrorResult::new(Fault::Cancelled))
}

/// Cancel whatever is still pending after a failed run.
fn abandon_pending(table: &mut ResultTable) {
    *table = table
        .drain()
        .into_iter()
        .map(|(id, slot)| match slot {
            ResultSlot::Pending(mut deferred) => {
                deferred.cancel();
                (id, cancelled_slot())
            }
            settled => (id, settled),
        })
        .collect();
}

// ── Interception ──────────────────────────────────────────────────────────────

/// Resolver handed to the host for one run.
struct DispatchingResolver<'a, D> {
    /// Lookup for the real strategies.
    base: &'a dyn StrategyResolver<D>,
    dispatcher: Arc<Dispatcher<MetricValue>>,
    /// First executor refusal of the run.
    refusal: Arc<Mutex<Option<DispatchError>>>,
}

impl<D: Send + Sync + 'static> StrategyResolver<D> for DispatchingResolver<'_, D> {
    fn resolve(&self, metric: &Arc<dyn Metric<D>>) -> Option<Arc<dyn CalculationStrategy<D>>> {
        let inner: Arc<dyn CalculationStrategy<D>> = match self.base.resolve(metric) {
            Some(strategy) => strategy,
            None => Arc::new(MetricStrategy::new(metric.clone())),
        };
        Some(Arc::new(FutureStrategy {
            metric: metric.id(),
            inner,
            dispatcher: self.dispatcher.clone(),
            refusal: self.refusal.clone(),
        }))
    }
}

/// Dispatches the wrapped strategy and returns a pending slot.
pub struct FutureStrategy<D> {
    metric: MetricId,
    inner: Arc<dyn CalculationStrategy<D>>,
    dispatcher: Arc<Dispatcher<MetricValue>>,
    refusal: Arc<Mutex<Option<DispatchError>>>,
}

impl<D: Send + Sync + 'static> CalculationStrategy<D> for FutureStrategy<D> {
    fn calculate(&self, ctx: &CalcContext, data: &Arc<D>) -> Result<ResultSlot, BoxError> {
        let inner = self.inner.clone();
        let ctx = ctx.clone();
        let data = data.clone();
        let job = move || -> Result<MetricValue, BoxError> {
            match inner.calculate(&ctx, &data)? {
                ResultSlot::Ready(value) => Ok(value),
                ResultSlot::Failed(err) => Err(Box::new(err.fault().clone())),
                ResultSlot::Pending(_) => Err("strategy returned an unresolved placeholder".into()),
            }
        };

        match self.dispatcher.dispatch(self.metric.as_str(), job) {
            Ok(deferred) => Ok(ResultSlot::Pending(deferred)),
            Err(e) => {
                self.refusal
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_or_insert_with(|| e.clone());
                Err(Box::new(e))
            }
        }
    }
}
