//! Configuration system for Volley.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $VOLLEY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/volley/config.toml
//!   3. ~/.config/volley/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VolleyConfig {
    pub executor: ExecutorSettings,
    pub collection: CollectionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Max calculations running at once. 0 = available parallelism.
    pub max_workers: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSettings {
    /// Time allowed for collecting results, in seconds. 0 = unbounded.
    pub timeout_secs: u64,
    /// How the timeout is spread over dispatched units.
    pub budget_policy: BudgetPolicy,
}

/// How the collection timeout is accounted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPolicy {
    /// One budget consumed across all units in order. Slow early units
    /// starve later ones.
    #[default]
    Shared,
    /// Every unit gets the full timeout, counted from its own dispatch.
    PerUnit,
}

impl std::str::FromStr for BudgetPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(BudgetPolicy::Shared),
            "per_unit" => Ok(BudgetPolicy::PerUnit),
            other => Err(ConfigError::InvalidValue("budget_policy", other.to_string())),
        }
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self { max_workers: 0 }
    }
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            budget_policy: BudgetPolicy::Shared,
        }
    }
}

impl ExecutorSettings {
    /// Worker count with the 0 = auto rule applied.
    pub fn worker_count(&self) -> usize {
        if self.max_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.max_workers as usize
        }
    }
}

impl CollectionSettings {
    /// The collection timeout, `None` when unbounded.
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("volley")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid {0}: {1:?}")]
    InvalidValue(&'static str, String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl VolleyConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::parse(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            VolleyConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("VOLLEY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&VolleyConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply VOLLEY_* overrides read through `lookup`.
    fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("VOLLEY_EXECUTOR__MAX_WORKERS") {
            self.executor.max_workers = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("max_workers", v))?;
        }
        if let Some(v) = lookup("VOLLEY_COLLECTION__TIMEOUT_SECS") {
            self.collection.timeout_secs = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("timeout_secs", v))?;
        }
        if let Some(v) = lookup("VOLLEY_COLLECTION__BUDGET_POLICY") {
            self.collection.budget_policy = v.parse()?;
        }
        Ok(())
    }
}
