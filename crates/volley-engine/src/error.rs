use volley_core::Fault;

/// The executor would not accept a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("executor is shut down")]
    Closed,
    #[error("executor rejected work: {0}")]
    Rejected(String),
}

/// Failure of the dispatch/collect glue itself.
///
/// Per-unit faults never show up here; they become failure entries in the
/// result table.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    /// A handle reported success and then failed to hand over its value.
    #[error("work handle broke its contract after reporting success: {0}")]
    HandleContract(Fault),
    /// Waiting would block a current-thread tokio runtime.
    #[error("cannot wait for results on a current-thread tokio runtime")]
    BlockingContext,
    #[error("host engine failed: {0:#}")]
    Host(anyhow::Error),
}
