//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use macrodash::config::Config;
use macrodash::data::{FetchError, SeriesSource};
use macrodash::domain::{Observation, SeriesInfo};

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
}

pub fn obs(date: NaiveDate, value: f64) -> Observation {
    Observation::new(date, Some(value))
}

/// In-memory upstream: fixed histories plus scripted failures per series.
#[derive(Default)]
pub struct MemorySource {
    series: Mutex<HashMap<String, Vec<Observation>>>,
    failures: Mutex<HashMap<String, Vec<FetchError>>>,
    calls: Mutex<Vec<(String, Option<NaiveDate>)>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(self, id: &str, observations: Vec<Observation>) -> Self {
        self.set_series(id, observations);
        self
    }

    pub fn set_series(&self, id: &str, observations: Vec<Observation>) {
        self.series.lock().unwrap().insert(id.to_string(), observations);
    }

    /// Queue errors returned (in order) before the series responds normally.
    pub fn fail_with(&self, id: &str, errors: Vec<FetchError>) {
        self.failures.lock().unwrap().insert(id.to_string(), errors);
    }

    /// Start dates passed to `observations`, in call order.
    pub fn observation_calls(&self) -> Vec<(String, Option<NaiveDate>)> {
        self.calls.lock().unwrap().clone()
    }

    fn next_failure(&self, id: &str) -> Option<FetchError> {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.get_mut(id)?;
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    }

    fn history(&self, id: &str) -> Result<Vec<Observation>, FetchError> {
        self.series
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound { series_id: id.to_string() })
    }
}

impl SeriesSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn series_info(&self, series_id: &str) -> Result<SeriesInfo, FetchError> {
        if let Some(err) = self.next_failure(series_id) {
            return Err(err);
        }
        let history = self.history(series_id)?;
        Ok(SeriesInfo {
            id: series_id.to_string(),
            title: format!("{series_id} (memory)"),
            frequency_short: String::new(),
            last_updated: "2024-06-01 07:45:00-05".to_string(),
            observation_end: history.iter().map(|o| o.date).max(),
        })
    }

    fn observations(&self, series_id: &str, start: Option<NaiveDate>) -> Result<Vec<Observation>, FetchError> {
        self.calls.lock().unwrap().push((series_id.to_string(), start));
        if let Some(err) = self.next_failure(series_id) {
            return Err(err);
        }
        let history = self.history(series_id)?;
        Ok(history
            .into_iter()
            .filter(|o| start.is_none_or(|s| o.date >= s))
            .collect())
    }
}

/// Parse a config and point its directories into `root`.
pub fn config_in(root: &Path, toml_str: &str) -> Config {
    let mut config: Config = toml::from_str(toml_str).unwrap();
    config.store.data_dir = root.join("Raw Data");
    config.dashboard.dir = root.join("MacroDashboard Versions");
    config.fred.backoff_ms = 0;
    config.validate().unwrap();
    config
}
