//! volley-engine: runs a host engine's metrics concurrently.
//!
//! A [`Dispatcher`] hands calculations to an [`Executor`] and returns
//! [`DeferredResult`] placeholders. A [`Finalization`] strategy later turns
//! those placeholders into outcomes under a time budget. [`ConcurrentEngine`]
//! wires both into any [`Engine`] by handing it a dispatching strategy lookup
//! for one run.

pub mod collector;
pub mod deferred;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod factory;
pub mod handle;
pub mod host;
pub mod ledger;
pub mod overlay;
pub mod sequential;

#[cfg(test)]
mod testing;

pub use collector::{Finalization, PerUnitFinalization, SharedBudgetCollector};
pub use deferred::{settle, DeferredResult};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, EngineError};
pub use executor::{submit_fn, Executor, Job, TokioExecutor};
pub use factory::ConcurrentEngineFactory;
pub use handle::{can_block_here, BoxHandle, TokioHandle, WorkHandle};
pub use host::{
    CalcContext, CalculationStrategy, Engine, ErrorResult, Metric, MetricId, MetricStrategy,
    MetricOnlyResolver, MetricValue, ResultSlot, ResultTable, RunContext, StrategyResolver,
};
pub use ledger::{DispatchLedger, RunReport, UnitId, UnitRecord, UnitStatus};
pub use overlay::{ConcurrentEngine, FutureStrategy};
pub use sequential::{SequentialEngine, StrategyRegistry};
