use crate::*;

use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use anyhow::{bail, Result};
use volley_core::config::{BudgetPolicy, VolleyConfig};
use volley_engine::{
    ConcurrentEngine, ConcurrentEngineFactory, Engine, EngineError, RunContext, SequentialEngine,
    StrategyResolver, UnitStatus,
};

fn overlay(
    workers: usize,
    timeout: Option<Duration>,
) -> (Arc<SequentialEngine<Data>>, ConcurrentEngine<Data, SequentialEngine<Data>>) {
    let origin = Arc::new(SequentialEngine::new());
    let engine = ConcurrentEngine::with_policy(
        origin.clone(),
        Arc::new(executor(workers)),
        timeout,
        BudgetPolicy::Shared,
    );
    (origin, engine)
}

#[test]
fn test_results_written_back_in_metric_order() -> Result<()> {
    let (_, engine) = overlay(4, Some(Duration::from_secs(5)));
    let mut ctx = RunContext::new(vec![
        slow("c", 300, "c"),
        slow("a", 10, "a"),
        Arc::new(Len),
        slow("b", 200, "b"),
    ]);

    let started = Instant::now();
    let report = engine.execute_all(&mut ctx, &Arc::new(vec![1, 2, 3]))?;

    // Run concurrently, not back to back.
    assert!(started.elapsed() < Duration::from_millis(450));
    let keys: Vec<_> = ctx.results.iter().map(|(k, _)| k.as_str().to_string()).collect();
    assert_eq!(keys, ["c", "a", "len", "b"]);
    assert_eq!(
        ctx.results.to_json(),
        serde_json::json!({ "c": "c", "a": "a", "len": 3, "b": "b" })
    );
    assert!(report.all_completed());
    assert_eq!(report.units.len(), 4);
    Ok(())
}

#[test]
fn test_failures_are_isolated_per_metric() -> Result<()> {
    let (_, engine) = overlay(2, None);
    let mut ctx = RunContext::new(vec![
        Arc::new(Raises { id: "bad", message: "x" }) as Arc<dyn Metric<Data>>,
        Arc::new(Panics),
        Arc::new(Len),
    ]);

    let report = engine.execute_all(&mut ctx, &Arc::new(vec![7]))?;

    let bad = ctx.results.get(&MetricId::new("bad")).and_then(|s| s.error());
    assert_eq!(bad.map(|e| e.message()).as_deref(), Some("x"));
    let panicked = ctx.results.get(&MetricId::new("panics")).and_then(|s| s.error());
    assert!(panicked.is_some());
    assert_eq!(
        ctx.results.get(&MetricId::new("len")).and_then(|s| s.value()),
        Some(&serde_json::json!(1))
    );
    assert_eq!(report.count(UnitStatus::Failed), 2);
    assert_eq!(report.count(UnitStatus::Completed), 1);
    Ok(())
}

#[test]
fn test_budget_exhaustion_through_the_overlay() -> Result<()> {
    let (_, engine) = overlay(1, Some(Duration::from_secs(1)));
    let mut ctx = RunContext::new(vec![
        slow("1", 900, "a"),
        slow("2", 500, "b"),
        slow("3", 500, "c"),
    ]);

    let report = engine.execute_all(&mut ctx, &Arc::new(vec![]))?;

    let slots: Vec<_> = ctx.results.iter().map(|(_, s)| s).collect();
    assert_eq!(slots[0].value(), Some(&serde_json::json!("a")));
    assert!(slots[1].error().is_some_and(|e| e.fault().is_timeout()));
    assert!(slots[2].error().is_some_and(|e| e.fault().is_timeout()));
    assert_eq!(report.count(UnitStatus::TimedOut), 2);
    Ok(())
}

#[test]
fn test_host_resolver_is_left_alone() -> Result<()> {
    let (origin, engine) = overlay(2, None);
    let before = origin.resolver();

    let mut ctx = RunContext::new(vec![Arc::new(Len) as Arc<dyn Metric<Data>>]);
    engine.execute_all(&mut ctx, &Arc::new(vec![]))?;
    assert!(Arc::ptr_eq(&origin.resolver(), &before));

    // Running twice through the same overlay behaves the same.
    engine.execute_all(&mut ctx, &Arc::new(vec![1]))?;
    assert!(Arc::ptr_eq(&origin.resolver(), &before));
    assert_eq!(
        ctx.results.get(&MetricId::new("len")).and_then(|s| s.value()),
        Some(&serde_json::json!(1))
    );
    Ok(())
}

#[test]
fn test_two_overlays_share_one_host() -> Result<()> {
    let origin = Arc::new(SequentialEngine::<Data>::new());
    let before = origin.resolver();
    let first = ConcurrentEngine::with_policy(
        origin.clone(),
        Arc::new(executor(2)),
        Some(Duration::from_secs(5)),
        BudgetPolicy::Shared,
    );
    let second = ConcurrentEngine::with_policy(
        origin.clone(),
        Arc::new(executor(2)),
        Some(Duration::from_secs(5)),
        BudgetPolicy::PerUnit,
    );

    // Both runs are inside their host phase at the same time.
    let (a, b) = thread::scope(|scope| {
        let a = scope.spawn(|| {
            let mut ctx = RunContext::new(vec![slow("a", 200, "a"), Arc::new(Len)]);
            first.execute_all(&mut ctx, &Arc::new(vec![1])).map(|_| ctx)
        });
        let b = scope.spawn(|| {
            let mut ctx =
                RunContext::new(vec![Arc::new(Len) as Arc<dyn Metric<Data>>, slow("b", 200, "b")]);
            second.execute_all(&mut ctx, &Arc::new(vec![1, 2])).map(|_| ctx)
        });
        (a.join(), b.join())
    });
    let a = a.map_err(|_| anyhow::anyhow!("first run panicked"))??;
    let b = b.map_err(|_| anyhow::anyhow!("second run panicked"))??;

    assert_eq!(a.results.pending_count(), 0);
    assert_eq!(b.results.pending_count(), 0);
    assert_eq!(a.results.to_json(), serde_json::json!({ "a": "a", "len": 1 }));
    assert_eq!(b.results.to_json(), serde_json::json!({ "len": 2, "b": "b" }));
    assert!(Arc::ptr_eq(&origin.resolver(), &before));
    Ok(())
}

#[test]
fn test_direct_host_run_during_overlay_run() -> Result<()> {
    let (origin, engine) = overlay(2, Some(Duration::from_secs(5)));

    thread::scope(|scope| -> Result<()> {
        let overlay_run = scope.spawn(|| {
            let mut ctx = RunContext::new(vec![slow("long", 400, "long"), Arc::new(Len)]);
            engine.execute_all(&mut ctx, &Arc::new(vec![])).map(|_| ctx)
        });

        // By now the overlay run is collecting.
        thread::sleep(Duration::from_millis(100));
        let mut direct = RunContext::new(vec![
            Arc::new(Len) as Arc<dyn Metric<Data>>,
            slow("quick", 10, "quick"),
        ]);
        origin.execute_metrics(&mut direct, &Arc::new(vec![5, 6, 7]))?;

        // The host on its own never leaves placeholders behind.
        assert_eq!(direct.results.pending_count(), 0);
        assert_eq!(direct.results.to_json(), serde_json::json!({ "len": 3, "quick": "quick" }));
        assert!(!overlay_run.is_finished());

        let overlaid = overlay_run
            .join()
            .map_err(|_| anyhow::anyhow!("overlay run panicked"))??;
        assert_eq!(overlaid.results.to_json(), serde_json::json!({ "long": "long", "len": 0 }));
        Ok(())
    })
}

/// Host engine that dispatches everything, then fails.
struct FailingHost {
    inner: SequentialEngine<Data>,
    intercepted: Mutex<bool>,
}

impl Engine<Data> for FailingHost {
    fn resolver(&self) -> Arc<dyn StrategyResolver<Data>> {
        self.inner.resolver()
    }

    fn execute_metrics_with(
        &self,
        ctx: &mut RunContext<Data>,
        data: &Arc<Data>,
        resolver: &dyn StrategyResolver<Data>,
    ) -> Result<()> {
        // The host's own registry is empty, so any strategy came from the overlay.
        let sample = slow("slow", 0, "slow");
        *self.intercepted.lock().unwrap() = resolver.resolve(&sample).is_some();
        self.inner.execute_metrics_with(ctx, data, resolver)?;
        bail!("host engine gave up")
    }
}

#[test]
fn test_pending_cancelled_after_host_failure() {
    let origin = Arc::new(FailingHost {
        inner: SequentialEngine::new(),
        intercepted: Mutex::new(false),
    });
    let before = origin.resolver();
    let engine = ConcurrentEngine::with_policy(
        origin.clone(),
        Arc::new(executor(1)),
        None,
        BudgetPolicy::Shared,
    );

    let mut ctx = RunContext::new(vec![slow("slow", 300, "slow")]);
    let err = engine.execute_all(&mut ctx, &Arc::new(vec![])).unwrap_err();

    assert!(matches!(err, EngineError::Host(_)));
    assert!(err.to_string().contains("host engine gave up"));

    assert!(*origin.intercepted.lock().unwrap(), "run used the host's own resolver");
    assert!(Arc::ptr_eq(&origin.resolver(), &before));

    // Nothing is left pending after a failed run.
    assert_eq!(ctx.results.pending_count(), 0);
    let slot = ctx.results.get(&MetricId::new("slow")).and_then(|s| s.error());
    assert!(slot.is_some_and(|e| e.fault().is_cancelled()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_from_async_code() -> Result<()> {
    let (_, engine) = overlay(2, Some(Duration::from_secs(5)));
    let mut ctx = RunContext::new(vec![slow("s", 50, "s"), Arc::new(Len)]);

    let report = engine.execute_all(&mut ctx, &Arc::new(vec![9]))?;

    assert!(report.all_completed());
    assert_eq!(ctx.results.to_json(), serde_json::json!({ "s": "s", "len": 1 }));
    Ok(())
}

#[tokio::test]
async fn test_current_thread_runtime_is_refused() {
    let (_, engine) = overlay(1, None);
    let mut ctx = RunContext::new(vec![slow("s", 10, "s")]);

    let err = engine.execute_all(&mut ctx, &Arc::new(vec![])).unwrap_err();

    assert!(matches!(err, EngineError::BlockingContext));
    assert!(ctx.results.is_empty());
}

#[test]
fn test_factory_engine_from_config() -> Result<()> {
    let mut config = VolleyConfig::default();
    config.executor.max_workers = 2;
    config.collection.timeout_secs = 5;

    let factory = ConcurrentEngineFactory::from_config(
        Arc::new(SequentialEngine::<Data>::new()),
        &config,
    )?;
    let engine = factory.get();
    assert!(Arc::ptr_eq(&engine, &factory.get()));

    let mut ctx = RunContext::new(vec![Arc::new(Len) as Arc<dyn Metric<Data>>, slow("s", 20, "s")]);
    let report = engine.execute_all(&mut ctx, &Arc::new(vec![1, 2]))?;
    assert!(report.all_completed());
    assert_eq!(ctx.results.to_json(), serde_json::json!({ "len": 2, "s": "s" }));
    Ok(())
}
