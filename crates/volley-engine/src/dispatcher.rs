//! Work dispatcher: turns a synchronous calculation into a deferred result.

use std::sync::Arc;
use std::time::Duration;

use volley_core::{BoxError, Fault};

use crate::deferred::DeferredResult;
use crate::error::DispatchError;
use crate::executor::Executor;
use crate::ledger::DispatchLedger;

/// Submits jobs to an injected executor and tags each with a budget and a
/// ledger entry. `dispatch` never waits for the job.
pub struct Dispatcher<T> {
    executor: Arc<dyn Executor<T>>,
    budget: Option<Duration>,
    ledger: DispatchLedger,
}

impl<T: Send + 'static> Dispatcher<T> {
    pub fn new(executor: Arc<dyn Executor<T>>, budget: Option<Duration>) -> Self {
        Self::with_ledger(executor, budget, DispatchLedger::new())
    }

    pub fn with_ledger(
        executor: Arc<dyn Executor<T>>,
        budget: Option<Duration>,
        ledger: DispatchLedger,
    ) -> Self {
        Self {
            executor,
            budget,
            ledger,
        }
    }

    pub fn ledger(&self) -> &DispatchLedger {
        &self.ledger
    }

    /// Start `job` on the executor and return its placeholder at once.
    pub fn dispatch<F>(
        &self,
        label: impl Into<String>,
        job: F,
    ) -> Result<DeferredResult<T>, DispatchError>
    where
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
    {
        let label = label.into();
        let unit = self.ledger.register(label.clone());
        let ledger = self.ledger.clone();

        let handle = self.executor.submit(Box::new(move || {
            ledger.mark_running(unit);
            let result = job();
            ledger.mark_finished(unit, result.is_ok());
            result
        }));

        match handle {
            Ok(handle) => {
                tracing::debug!(unit = unit.0, label = %label, "unit dispatched");
                Ok(DeferredResult::new(unit, handle, self.budget))
            }
            Err(e) => {
                tracing::warn!(unit = unit.0, label = %label, error = %e, "executor refused unit");
                self.ledger.record_outcome::<()>(unit, &Err(Fault::Cancelled));
                Err(e)
            }
        }
    }
}
