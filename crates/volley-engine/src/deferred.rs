//! Deferred results: placeholders standing in for synchronous results.
//!
//! A [`DeferredResult`] is what a dispatched calculation hands back instead of
//! its value. It remembers the budget it was given and when it was dispatched;
//! neither changes afterwards. Resolving it consumes it.

use std::fmt;
use std::time::{Duration, Instant};

use volley_core::budget::remaining_since;
use volley_core::{Fault, Outcome};

use crate::error::EngineError;
use crate::handle::{can_block_here, BoxHandle, WorkHandle};
use crate::ledger::UnitId;

pub struct DeferredResult<T> {
    unit: UnitId,
    handle: BoxHandle<T>,
    budget: Option<Duration>,
    dispatched_at: Instant,
}

impl<T> DeferredResult<T> {
    pub fn new(unit: UnitId, handle: BoxHandle<T>, budget: Option<Duration>) -> Self {
        Self {
            unit,
            handle,
            budget,
            dispatched_at: Instant::now(),
        }
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    pub fn dispatched_at(&self) -> Instant {
        self.dispatched_at
    }

    /// Budget left once the time since dispatch is spent.
    pub fn remaining(&self) -> Option<Duration> {
        remaining_since(self.budget, self.dispatched_at)
    }

    /// Block for what is left of this unit's own budget and produce its outcome.
    pub fn resolve(mut self) -> Result<Outcome<T>, EngineError> {
        let bound = self.remaining();
        settle(&mut self.handle, bound)
    }

    /// Request cancellation without resolving.
    pub fn cancel(&mut self) -> bool {
        self.handle.cancel()
    }

    pub fn into_handle(self) -> BoxHandle<T> {
        self.handle
    }
}

impl<T> fmt::Debug for DeferredResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredResult")
            .field("unit", &self.unit)
            .field("budget", &self.budget)
            .field("dispatched_at", &self.dispatched_at)
            .finish_non_exhaustive()
    }
}

/// Query-then-fetch on one handle.
///
/// A timeout or cancellation requests cancellation of the work and becomes the
/// outcome. A business fault becomes the outcome as is. Only after success is
/// the value fetched, with a zero bound since the work is known complete; a
/// fault at that point is a broken handle and is returned as an error, as is
/// an attempt to wait on a current-thread runtime.
pub fn settle<T, H>(handle: &mut H, bound: Option<Duration>) -> Result<Outcome<T>, EngineError>
where
    H: WorkHandle<T> + ?Sized,
{
    if !can_block_here() {
        return Err(EngineError::BlockingContext);
    }
    match handle.query_failure(bound) {
        Err(wait) => {
            let cancelled = handle.cancel();
            tracing::debug!(error = %wait, cancelled, "unit did not complete, giving up");
            Ok(Err(Fault::from(wait)))
        }
        Ok(Some(fault)) => Ok(Err(fault)),
        Ok(None) => handle
            .fetch_value(Some(Duration::ZERO))
            .map(Ok)
            .map_err(EngineError::HandleContract),
    }
}
