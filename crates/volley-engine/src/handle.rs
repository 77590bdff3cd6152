//! Work handles: blocking views onto units of work running elsewhere.
//!
//! A handle answers two questions, each under an optional wait bound: did the
//! work fail, and what is its value. Callers ask the first with the real
//! remaining budget and only ask the second, with a zero bound, after the
//! first reported success. The value fetch then never blocks.

use std::time::Duration;

use std::future::Future;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;

use volley_core::fault::ValueTaken;
use volley_core::{Fault, WaitError};

/// A unit of work running on an executor.
///
/// `bound` is `None` for an unlimited wait and `Some(Duration::ZERO)` for a
/// check that must not block.
pub trait WorkHandle<T>: Send {
    /// Wait up to `bound` for completion.
    ///
    /// `Ok(None)` if the work succeeded, `Ok(Some(fault))` if the calculation
    /// failed. Timeouts and cancellation are raised as [`WaitError`].
    fn query_failure(&mut self, bound: Option<Duration>) -> Result<Option<Fault>, WaitError>;

    /// Wait up to `bound` and take the value. Every failure mode, including
    /// the wait itself running out, comes back as a [`Fault`].
    fn fetch_value(&mut self, bound: Option<Duration>) -> Result<T, Fault>;

    /// Request cancellation. Best effort: work that already started may run
    /// to completion on its worker. Returns false if the work had settled.
    fn cancel(&mut self) -> bool;
}

pub type BoxHandle<T> = Box<dyn WorkHandle<T>>;

impl<T, H: WorkHandle<T> + ?Sized> WorkHandle<T> for Box<H> {
    fn query_failure(&mut self, bound: Option<Duration>) -> Result<Option<Fault>, WaitError> {
        (**self).query_failure(bound)
    }

    fn fetch_value(&mut self, bound: Option<Duration>) -> Result<T, Fault> {
        (**self).fetch_value(bound)
    }

    fn cancel(&mut self) -> bool {
        (**self).cancel()
    }
}

// ── Tokio-backed handle ───────────────────────────────────────────────────────

enum State<T> {
    Running(JoinHandle<Result<T, Fault>>),
    Settled(Result<T, Fault>),
    Drained,
}

/// Whether the calling thread may block waiting on work.
///
/// True outside any runtime and on multi-thread runtime threads, where waits
/// go through `block_in_place`. A current-thread runtime has no other thread
/// to hand its tasks to, so blocking there is refused.
pub fn can_block_here() -> bool {
    match Handle::try_current() {
        Ok(current) => current.runtime_flavor() == RuntimeFlavor::MultiThread,
        Err(_) => true,
    }
}

fn block_on<F: Future>(runtime: &Handle, future: F) -> F::Output {
    if Handle::try_current().is_ok() {
        tokio::task::block_in_place(|| runtime.block_on(future))
    } else {
        runtime.block_on(future)
    }
}

/// Handle to a task spawned on a tokio runtime.
///
/// Waits block the calling thread. Inside a multi-thread runtime they move off
/// the worker with `block_in_place` first; callers on a current-thread runtime
/// must check [`can_block_here`] before waiting.
pub struct TokioHandle<T> {
    runtime: Handle,
    state: State<T>,
}

impl<T: Send + 'static> TokioHandle<T> {
    pub fn new(runtime: Handle, join: JoinHandle<Result<T, Fault>>) -> Self {
        Self {
            runtime,
            state: State::Running(join),
        }
    }

    /// Block until the task settles or `bound` runs out.
    fn wait(&mut self, bound: Option<Duration>) -> Result<(), WaitError> {
        let State::Running(join) = &mut self.state else {
            return Ok(());
        };

        let joined = match bound {
            None => block_on(&self.runtime, join),
            // The timer has to be created inside the runtime.
            Some(limit) => block_on(&self.runtime, async {
                tokio::time::timeout(limit, &mut *join).await
            })
            .map_err(|_| WaitError::TimedOut(limit))?,
        };

        let settled = match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(Fault::Cancelled),
            Err(e) => Err(Fault::from_panic(e.into_panic())),
        };
        self.state = State::Settled(settled);
        Ok(())
    }
}

impl<T: Send + 'static> WorkHandle<T> for TokioHandle<T> {
    fn query_failure(&mut self, bound: Option<Duration>) -> Result<Option<Fault>, WaitError> {
        self.wait(bound)?;
        match &self.state {
            State::Settled(Err(Fault::Cancelled)) => Err(WaitError::Cancelled),
            State::Settled(Err(fault)) => Ok(Some(fault.clone())),
            State::Settled(Ok(_)) | State::Drained | State::Running(_) => Ok(None),
        }
    }

    fn fetch_value(&mut self, bound: Option<Duration>) -> Result<T, Fault> {
        self.wait(bound)?;
        match std::mem::replace(&mut self.state, State::Drained) {
            State::Settled(result) => result,
            State::Drained | State::Running(_) => Err(Fault::business(ValueTaken)),
        }
    }

    fn cancel(&mut self) -> bool {
        match &self.state {
            State::Running(join) if !join.is_finished() => {
                join.abort();
                true
            }
            _ => false,
        }
    }
}
