//! TOML run configuration.
//!
//! The file names the series to track (grouped by frequency), any derived
//! series, the dashboard layout and the FRED/store settings. CLI flags override
//! a few of these at run time (see `app`).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::data::RetryPolicy;
use crate::domain::{Frequency, GapPolicy, SeriesSpec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("missing FRED API key: set {0} in the environment or .env")]
    MissingApiKey(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fred: FredConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub series: Vec<SeriesSpec>,
    #[serde(default)]
    pub derived: Vec<DerivedSeries>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FredConfig {
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub lookback_days: u32,
}

impl Default for FredConfig {
    fn default() -> Self {
        Self {
            api_key_env: "FRED_API_KEY".to_string(),
            base_url: "https://api.stlouisfed.org/fred".to_string(),
            timeout_secs: 30,
            max_attempts: 3,
            backoff_ms: 500,
            lookback_days: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub gap_policy: GapPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Raw Data"),
            gap_policy: GapPolicy::Omit,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub dir: PathBuf,
    pub title: String,
    /// Number of lag columns after "Present".
    pub lags: usize,
    pub sections: Vec<DashboardSection>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("MacroDashboard Versions"),
            title: "Economic Dashboard".to_string(),
            lags: 4,
            sections: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardSection {
    pub title: String,
    #[serde(default)]
    pub rows: Vec<DashboardRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardRow {
    pub label: String,
    pub series: String,
    #[serde(default)]
    pub units: String,
}

/// A series computed as `numerator / (deflator / base)`.
#[derive(Debug, Clone, Deserialize)]
pub struct DerivedSeries {
    pub id: String,
    pub frequency: Frequency,
    pub numerator: String,
    pub deflator: String,
    #[serde(default = "default_base")]
    pub base: f64,
}

fn default_base() -> f64 {
    100.0
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&contents).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.series.is_empty() {
            return Err(ConfigError::Invalid("no [[series]] configured".into()));
        }
        if self.fred.max_attempts == 0 {
            return Err(ConfigError::Invalid("fred.max_attempts must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        let ids = self
            .series
            .iter()
            .map(|s| s.id.as_str())
            .chain(self.derived.iter().map(|d| d.id.as_str()));
        for id in ids {
            if id.trim().is_empty() {
                return Err(ConfigError::Invalid("series id must not be empty".into()));
            }
            if !seen.insert(id) {
                return Err(ConfigError::Invalid(format!("duplicate series id '{id}'")));
            }
        }

        for derived in &self.derived {
            for input in [&derived.numerator, &derived.deflator] {
                if self.frequency_of(input) != Some(derived.frequency) {
                    return Err(ConfigError::Invalid(format!(
                        "derived series '{}' needs '{input}' configured at frequency {}",
                        derived.id, derived.frequency
                    )));
                }
            }
            if !(derived.base.is_finite() && derived.base != 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "derived series '{}' has an invalid base",
                    derived.id
                )));
            }
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.fred.max_attempts,
            backoff: Duration::from_millis(self.fred.backoff_ms),
        }
    }

    /// Frequency of a fetched or derived series, if configured.
    pub fn frequency_of(&self, id: &str) -> Option<Frequency> {
        self.series
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.frequency)
            .or_else(|| self.derived.iter().find(|d| d.id == id).map(|d| d.frequency))
    }

    /// Frequencies that have at least one fetched or derived series, in canonical order.
    pub fn frequencies(&self) -> Vec<Frequency> {
        Frequency::ALL
            .into_iter()
            .filter(|f| self.series.iter().any(|s| s.frequency == *f) || self.derived.iter().any(|d| d.frequency == *f))
            .collect()
    }
}
