//! Reference host engine: runs each metric's strategy inline, one after
//! another. This is the engine the concurrent overlay normally wraps.

use std::collections::HashMap;
use std::sync::Arc;

use volley_core::Fault;

use crate::host::{
    CalculationStrategy, Engine, ErrorResult, Metric, MetricId, MetricStrategy, ResultSlot,
    RunContext, StrategyResolver,
};

/// Engine-specific strategies registered per metric id.
pub struct StrategyRegistry<D> {
    strategies: HashMap<MetricId, Arc<dyn CalculationStrategy<D>>>,
}

impl<D> StrategyRegistry<D> {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    pub fn register(&mut self, id: MetricId, strategy: Arc<dyn CalculationStrategy<D>>) {
        self.strategies.insert(id, strategy);
    }
}

impl<D> Default for StrategyRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> StrategyResolver<D> for StrategyRegistry<D> {
    fn resolve(&self, metric: &Arc<dyn Metric<D>>) -> Option<Arc<dyn CalculationStrategy<D>>> {
        self.strategies.get(&metric.id()).cloned()
    }
}

pub struct SequentialEngine<D> {
    resolver: Arc<dyn StrategyResolver<D>>,
}

impl<D: Send + Sync + 'static> SequentialEngine<D> {
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(StrategyRegistry::<D>::new()))
    }

    pub fn with_resolver(resolver: Arc<dyn StrategyResolver<D>>) -> Self {
        Self { resolver }
    }
}

impl<D: Send + Sync + 'static> Default for SequentialEngine<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Send + Sync + 'static> Engine<D> for SequentialEngine<D> {
    fn resolver(&self) -> Arc<dyn StrategyResolver<D>> {
        self.resolver.clone()
    }

    fn execute_metrics_with(
        &self,
        ctx: &mut RunContext<D>,
        data: &Arc<D>,
        resolver: &dyn StrategyResolver<D>,
    ) -> anyhow::Result<()> {
        for metric in ctx.metrics.clone() {
            let id = metric.id();
            let strategy: Arc<dyn CalculationStrategy<D>> = match resolver.resolve(&metric) {
                Some(strategy) => strategy,
                None => Arc::new(MetricStrategy::new(metric.clone())),
            };

            let slot = match strategy.calculate(&ctx.calc, data) {
                Ok(slot) => slot,
                Err(e) => {
                    tracing::warn!(metric = %id, error = %e, "metric calculation failed");
                    ResultSlot::Failed(ErrorResult::new(Fault::business(e)))
                }
            };
            ctx.results.insert(id, slot);
        }

        tracing::debug!(
            run = ctx.calc.run_label.as_str(),
            metrics = ctx.metrics.len(),
            "metrics executed"
        );
        Ok(())
    }
}
