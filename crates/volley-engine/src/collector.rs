//! Result collection: waiting on many units under a time budget.
//!
//! Two strategies implement [`Finalization`]:
//!
//! - [`SharedBudgetCollector`] waits on units in input order and charges every
//!   wait to one budget. A unit that eats the whole budget leaves nothing for
//!   the ones after it; they report a timeout without blocking.
//! - [`PerUnitFinalization`] resolves each deferred result against the budget
//!   it was given at dispatch, independently of the others.
//!
//! Either way outcome `i` belongs to input `i`, whatever order the work
//! actually finished in, and one unit's fault never stops collection of the
//! rest.

use std::time::{Duration, Instant};

use volley_core::{Outcome, TimeBudget};

use crate::deferred::{settle, DeferredResult};
use crate::error::EngineError;
use crate::handle::WorkHandle;

/// Turns a batch of deferred results into outcomes, in input order.
pub trait Finalization<T>: Send + Sync {
    fn finalize(&self, units: Vec<DeferredResult<T>>) -> Result<Vec<Outcome<T>>, EngineError>;
}

/// One budget shared across every unit of a batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedBudgetCollector {
    timeout: Option<Duration>,
}

impl SharedBudgetCollector {
    /// `None` waits for each unit without limit.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Wait on bare handles, in order, charging each wait to the shared budget.
    pub fn collect<T, H, I>(&self, handles: I) -> Result<Vec<Outcome<T>>, EngineError>
    where
        H: WorkHandle<T>,
        I: IntoIterator<Item = H>,
    {
        let mut budget = TimeBudget::new(self.timeout);
        let mut outcomes = Vec::new();

        for (index, mut handle) in handles.into_iter().enumerate() {
            let started = Instant::now();
            let outcome = settle(&mut handle, budget.wait_bound())?;
            budget.consume(started.elapsed());

            if let Err(fault) = &outcome {
                tracing::debug!(index, error = %fault, "unit collected without a value");
            }
            outcomes.push(outcome);
        }

        if budget.is_exhausted() {
            tracing::warn!(units = outcomes.len(), "shared collection budget exhausted");
        }
        Ok(outcomes)
    }
}

impl<T: Send + 'static> Finalization<T> for SharedBudgetCollector {
    fn finalize(&self, units: Vec<DeferredResult<T>>) -> Result<Vec<Outcome<T>>, EngineError> {
        self.collect(units.into_iter().map(DeferredResult::into_handle))
    }
}

/// Every unit keeps the budget it was dispatched with.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerUnitFinalization;

impl<T: Send + 'static> Finalization<T> for PerUnitFinalization {
    fn finalize(&self, units: Vec<DeferredResult<T>>) -> Result<Vec<Outcome<T>>, EngineError> {
        units.into_iter().map(DeferredResult::resolve).collect()
    }
}
