//! Column-oriented in-memory table the demo metrics run over.
//!
//! On disk a table is a JSON object mapping column names to equally long
//! arrays. `null` marks a missing cell.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("failed to read {0}: {1}")]
    Read(String, std::io::Error),
    #[error("invalid table json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("column {column:?} has {got} rows, expected {expected}")]
    Ragged {
        column: String,
        expected: usize,
        got: usize,
    },
    #[error("column {column:?} is a {found}, expected an array")]
    NotAColumn { column: String, found: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn missing(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// True when every present cell is a number.
    pub fn is_numeric(&self) -> bool {
        let mut present = self.values.iter().filter(|v| !v.is_null()).peekable();
        present.peek().is_some() && present.all(Value::is_number)
    }

    pub fn numbers(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().filter_map(Value::as_f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, TableError> {
        let rows = columns.first().map_or(0, |c| c.values.len());
        if let Some(bad) = columns.iter().find(|c| c.values.len() != rows) {
            return Err(TableError::Ragged {
                column: bad.name.clone(),
                expected: rows,
                got: bad.values.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn from_json(text: &str) -> Result<Self, TableError> {
        let raw: serde_json::Map<String, Value> = serde_json::from_str(text)?;
        let mut columns = Vec::with_capacity(raw.len());
        for (name, values) in raw {
            let values = match values {
                Value::Array(values) => values,
                other => {
                    return Err(TableError::NotAColumn {
                        column: name,
                        found: json_kind(&other),
                    })
                }
            };
            columns.push(Column { name, values });
        }
        Self::from_columns(columns)
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TableError::Read(path.display().to_string(), e))?;
        Self::from_json(&text)
    }

    /// Small table used when no input file is given.
    pub fn demo() -> Self {
        let column = |name: &str, values: Value| Column {
            name: name.to_string(),
            values: match values {
                Value::Array(v) => v,
                _ => Vec::new(),
            },
        };
        Self {
            columns: vec![
                column("age", serde_json::json!([34, 27, null, 45, 31, 52])),
                column("city", serde_json::json!(["Oslo", "Lima", "Oslo", null, "Pune", "Oslo"])),
                column("score", serde_json::json!([0.82, 0.64, 0.91, 0.47, null, 0.73])),
            ],
            rows: 6,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
