//! Demo metrics over a [`Table`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use volley_core::BoxError;
use volley_engine::{Metric, MetricId, MetricValue};

use crate::table::{Column, Table};

/// Row, column and missing-cell counts for the whole table.
pub struct DatasetSummary;

impl Metric<Table> for DatasetSummary {
    fn id(&self) -> MetricId {
        MetricId::new("dataset_summary")
    }

    fn calculate(&self, table: &Table) -> Result<MetricValue, BoxError> {
        let missing: usize = table.columns().iter().map(Column::missing).sum();
        let numeric = table.columns().iter().filter(|c| c.is_numeric()).count();
        Ok(json!({
            "rows": table.rows(),
            "columns": table.columns().len(),
            "numeric_columns": numeric,
            "missing_cells": missing,
        }))
    }
}

/// Missing-value count and share per column.
pub struct MissingValues;

impl Metric<Table> for MissingValues {
    fn id(&self) -> MetricId {
        MetricId::new("missing_values")
    }

    fn calculate(&self, table: &Table) -> Result<MetricValue, BoxError> {
        let per_column: serde_json::Map<_, _> = table
            .columns()
            .iter()
            .map(|c| {
                let missing = c.missing();
                let share = if table.rows() == 0 {
                    0.0
                } else {
                    missing as f64 / table.rows() as f64
                };
                (c.name.clone(), json!({ "missing": missing, "share": share }))
            })
            .collect();
        Ok(per_column.into())
    }
}

/// Descriptive statistics of one column.
pub struct ColumnSummary {
    column: String,
}

impl ColumnSummary {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl Metric<Table> for ColumnSummary {
    fn id(&self) -> MetricId {
        MetricId::new(format!("column_summary:{}", self.column))
    }

    fn calculate(&self, table: &Table) -> Result<MetricValue, BoxError> {
        let column = table
            .column(&self.column)
            .ok_or_else(|| format!("column {:?} not found", self.column))?;
        if column.is_numeric() {
            numeric_summary(column)
        } else {
            Ok(categorical_summary(column))
        }
    }
}

fn numeric_summary(column: &Column) -> Result<MetricValue, BoxError> {
    let values: Vec<f64> = column.numbers().collect();
    if values.is_empty() {
        return Err(format!("column {:?} has no values", column.name).into());
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(json!({
        "kind": "numeric",
        "count": values.len(),
        "mean": mean,
        "std": variance.sqrt(),
        "min": min,
        "max": max,
    }))
}

fn categorical_summary(column: &Column) -> MetricValue {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in column.values.iter().filter(|v| !v.is_null()) {
        let key = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        *counts.entry(key).or_default() += 1;
    }
    // Ties go to the alphabetically first value.
    let most_common = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(value, count)| json!({ "value": value, "count": count }));
    json!({
        "kind": "categorical",
        "count": column.values.len() - column.missing(),
        "unique": counts.len(),
        "most_common": most_common,
    })
}

/// The preset run by the binary: dataset-wide metrics plus one summary per
/// column.
pub fn preset(table: &Table) -> Vec<Arc<dyn Metric<Table>>> {
    let mut metrics: Vec<Arc<dyn Metric<Table>>> =
        vec![Arc::new(DatasetSummary), Arc::new(MissingValues)];
    for column in table.columns() {
        metrics.push(Arc::new(ColumnSummary::new(column.name.clone())));
    }
    metrics
}
