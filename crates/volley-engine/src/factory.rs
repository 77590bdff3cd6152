//! Lazily built, shared concurrent engine.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use volley_core::config::{BudgetPolicy, VolleyConfig};

use crate::executor::{Executor, TokioExecutor};
use crate::host::{Engine, MetricValue};
use crate::overlay::ConcurrentEngine;

/// Collection timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Builds a [`ConcurrentEngine`] on first use and hands out the same one
/// afterwards.
pub struct ConcurrentEngineFactory<D, E> {
    origin: Arc<E>,
    executor: Arc<dyn Executor<MetricValue>>,
    timeout: Option<Duration>,
    policy: BudgetPolicy,
    engine: OnceLock<Arc<ConcurrentEngine<D, E>>>,
}

impl<D, E> ConcurrentEngineFactory<D, E>
where
    D: Send + Sync + 'static,
    E: Engine<D>,
{
    pub fn new(origin: Arc<E>, executor: Arc<dyn Executor<MetricValue>>) -> Self {
        Self {
            origin,
            executor,
            timeout: Some(DEFAULT_TIMEOUT),
            policy: BudgetPolicy::default(),
            engine: OnceLock::new(),
        }
    }

    /// Factory with an owned [`TokioExecutor`] sized from `config`.
    pub fn from_config(origin: Arc<E>, config: &VolleyConfig) -> std::io::Result<Self> {
        let executor = TokioExecutor::from_settings(&config.executor)?;
        tracing::info!(
            max_workers = executor.max_workers(),
            timeout_secs = config.collection.timeout_secs,
            policy = ?config.collection.budget_policy,
            "concurrent engine configured"
        );
        Ok(Self::new(origin, Arc::new(executor))
            .with_timeout(config.collection.timeout())
            .with_policy(config.collection.budget_policy))
    }

    /// `None` collects without a time limit.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_policy(mut self, policy: BudgetPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn policy(&self) -> BudgetPolicy {
        self.policy
    }

    /// The engine, built on the first call.
    pub fn get(&self) -> Arc<ConcurrentEngine<D, E>> {
        self.engine
            .get_or_init(|| {
                Arc::new(ConcurrentEngine::with_policy(
                    self.origin.clone(),
                    self.executor.clone(),
                    self.timeout,
                    self.policy,
                ))
            })
            .clone()
    }
}
