use crate::*;

use anyhow::Result;
use volley_core::config::{BudgetPolicy, VolleyConfig};
use volley_engine::{ConcurrentEngineFactory, RunContext, SequentialEngine, UnitStatus};

const PER_UNIT: &str = r#"
[executor]
max_workers = 4

[collection]
timeout_secs = 1
budget_policy = "per_unit"
"#;

#[test]
fn test_config_file_selects_policy() -> Result<()> {
    let config = VolleyConfig::parse(PER_UNIT)?;
    assert_eq!(config.executor.worker_count(), 4);
    assert_eq!(config.collection.budget_policy, BudgetPolicy::PerUnit);

    let factory =
        ConcurrentEngineFactory::from_config(Arc::new(SequentialEngine::<Data>::new()), &config)?;
    assert_eq!(factory.timeout(), Some(Duration::from_secs(1)));
    assert_eq!(factory.policy(), BudgetPolicy::PerUnit);

    // Each metric has a second from its own dispatch.
    let mut ctx = RunContext::new(vec![
        slow("a", 600, "a"),
        slow("b", 600, "b"),
        slow("c", 600, "c"),
    ]);
    let report = factory.get().execute_all(&mut ctx, &Arc::new(vec![]))?;
    assert_eq!(report.count(UnitStatus::Completed), 3);
    Ok(())
}

#[test]
fn test_unknown_policy_is_rejected() {
    let err = VolleyConfig::parse("[collection]\nbudget_policy = \"fastest\"\n").unwrap_err();
    assert!(err.to_string().contains("fastest"));
}

#[test]
fn test_zero_timeout_collects_without_limit() -> Result<()> {
    let config = VolleyConfig::parse("[collection]\ntimeout_secs = 0\n")?;
    let factory =
        ConcurrentEngineFactory::from_config(Arc::new(SequentialEngine::<Data>::new()), &config)?;
    assert_eq!(factory.timeout(), None);
    assert_eq!(factory.get().budget(), None);
    Ok(())
}
