//! volley-run: runs the demo metric preset over a table through the
//! concurrent engine and prints results and the run report as JSON.
//!
//! Usage: `volley-run [table.json]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use volley_core::config::VolleyConfig;
use volley_engine::{ConcurrentEngineFactory, RunContext, SequentialEngine};

mod metrics;
mod table;

use table::Table;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Load config
    if let Err(e) = VolleyConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = VolleyConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        VolleyConfig::default()
    });

    let (label, table) = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            let table = Table::load(&path)
                .with_context(|| format!("failed to load table {}", path.display()))?;
            (path.display().to_string(), table)
        }
        None => ("demo".to_string(), Table::demo()),
    };
    tracing::info!(
        source = %label,
        rows = table.rows(),
        columns = table.columns().len(),
        "volley-run starting"
    );

    let origin = Arc::new(SequentialEngine::<Table>::new());
    let factory = ConcurrentEngineFactory::from_config(origin, &config)
        .context("failed to start executor")?;
    let engine = factory.get();

    let mut ctx = RunContext::new(metrics::preset(&table)).with_label(label);
    let report = engine.execute_all(&mut ctx, &Arc::new(table))?;

    let output = serde_json::json!({
        "results": ctx.results.to_json(),
        "report": report,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
