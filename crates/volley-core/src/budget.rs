//! Wall-clock time budgets for bounded waits.
//!
//! A budget of `None` is unbounded: waits block until completion. A bounded
//! budget only ever shrinks, and once it hits zero every further wait is a
//! non-blocking check.

use std::time::{Duration, Instant};

/// Remaining seconds shared by a sequence of blocking waits.
///
/// Owned by exactly one collecting thread. Never increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    remaining: Option<Duration>,
}

impl TimeBudget {
    pub fn new(total: Option<Duration>) -> Self {
        Self { remaining: total }
    }

    pub fn bounded(total: Duration) -> Self {
        Self::new(Some(total))
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Bound for the next wait. `None` means wait without limit.
    pub fn wait_bound(&self) -> Option<Duration> {
        self.remaining
    }

    /// Subtract elapsed wall time, clamping at zero.
    pub fn consume(&mut self, elapsed: Duration) {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(elapsed);
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(Duration::ZERO)
    }
}

impl Default for TimeBudget {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// What is left of `budget` once the time since `started` is spent.
///
/// `max(budget - (now - started), 0)`, or `None` for an unbounded budget.
pub fn remaining_since(budget: Option<Duration>, started: Instant) -> Option<Duration> {
    budget.map(|total| total.saturating_sub(started.elapsed()))
}
