//! Executors: where dispatched calculations actually run.
//!
//! The core never spawns threads itself. It submits jobs to an injected
//! [`Executor`] and gets a [`WorkHandle`](crate::handle::WorkHandle) back
//! straight away.
//! [`TokioExecutor`] is the stock implementation: a semaphore bounds how many
//! jobs run at once, and each admitted job runs on the blocking pool.

use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;

use volley_core::config::ExecutorSettings;
use volley_core::{BoxError, Fault};

use crate::error::DispatchError;
use crate::handle::{BoxHandle, TokioHandle};

/// A synchronous calculation ready to be run elsewhere.
pub type Job<T> = Box<dyn FnOnce() -> Result<T, BoxError> + Send + 'static>;

/// Accepts jobs and starts them without blocking the caller.
///
/// No ordering or fairness is promised beyond best-effort FIFO. Failures of
/// the job itself surface later through the returned handle; an `Err` here
/// means the executor refused the work.
pub trait Executor<T>: Send + Sync {
    fn submit(&self, job: Job<T>) -> Result<BoxHandle<T>, DispatchError>;
}

/// Runs jobs on a tokio multi-thread runtime.
///
/// Cancelling a job that is still waiting for a worker slot stops it. A job
/// already running on the blocking pool cannot be interrupted: it keeps its
/// thread until it returns and its result is dropped. Dropping the last clone
/// of an executor that owns its runtime does not wait for such jobs.
#[derive(Clone)]
pub struct TokioExecutor {
    runtime: Handle,
    permits: Arc<Semaphore>,
    max_workers: usize,
    // Keeps an owned runtime alive for as long as any clone exists.
    _owned: Option<Arc<OwnedRuntime>>,
}

/// Runtime owned by an executor. Shut down in the background once the last
/// clone goes away: calculations still stuck on the blocking pool are left to
/// finish on their own instead of holding up the drop.
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
            tracing::debug!("executor runtime released");
        }
    }
}

impl TokioExecutor {
    /// Build an executor with its own runtime.
    pub fn new(max_workers: usize) -> std::io::Result<Self> {
        let max_workers = max_workers.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .max_blocking_threads(max_workers)
            .thread_name("volley-worker")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: handle,
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            _owned: Some(Arc::new(OwnedRuntime(Some(runtime)))),
        })
    }

    /// Run jobs on an existing runtime.
    pub fn with_handle(runtime: Handle, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            runtime,
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            _owned: None,
        }
    }

    pub fn from_settings(settings: &ExecutorSettings) -> std::io::Result<Self> {
        Self::new(settings.worker_count())
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Refuse further work. Jobs still waiting for a slot are cancelled.
    pub fn shutdown(&self) {
        self.permits.close();
        tracing::info!("executor shut down");
    }
}

impl<T: Send + 'static> Executor<T> for TokioExecutor {
    fn submit(&self, job: Job<T>) -> Result<BoxHandle<T>, DispatchError> {
        if self.permits.is_closed() {
            return Err(DispatchError::Closed);
        }

        let permits = self.permits.clone();
        let join = self.runtime.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| Fault::Cancelled)?;

            match tokio::task::spawn_blocking(job).await {
                Ok(result) => result.map_err(Fault::business),
                Err(e) if e.is_panic() => Err(Fault::from_panic(e.into_panic())),
                Err(_) => Err(Fault::Cancelled),
            }
        });

        Ok(Box::new(TokioHandle::new(self.runtime.clone(), join)))
    }
}

/// Any shared executor is an executor.
impl<T, X: Executor<T> + ?Sized> Executor<T> for Arc<X> {
    fn submit(&self, job: Job<T>) -> Result<BoxHandle<T>, DispatchError> {
        (**self).submit(job)
    }
}

/// Submit a closure without boxing it at the call site.
pub fn submit_fn<T, X, F>(executor: &X, f: F) -> Result<BoxHandle<T>, DispatchError>
where
    X: Executor<T> + ?Sized,
    F: FnOnce() -> Result<T, BoxError> + Send + 'static,
{
    executor.submit(Box::new(f))
}
