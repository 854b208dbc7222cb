//! Dashboard rows and the JSON snapshot model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Config, DashboardRow, DashboardSection};
use crate::domain::{Frequency, Observation};
use crate::store::FrequencyDataset;

/// One dashboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardEntry {
    pub section: String,
    pub label: String,
    pub series_id: String,
    pub units: String,
    pub frequency: Option<Frequency>,
    pub latest_date: Option<NaiveDate>,
    /// Date upstream published the present value, when known.
    #[serde(default)]
    pub released: Option<NaiveDate>,
    pub present: Option<f64>,
    /// `lags[0]` is "Lag 1", one entry before the present value.
    pub lags: Vec<Option<f64>>,
    /// Set when the row could not be filled; shown as `ERR: ...`.
    pub error: Option<String>,
}

impl DashboardEntry {
    /// Replace whatever the row holds with an error.
    pub fn fail(&mut self, message: String) {
        self.latest_date = None;
        self.released = None;
        self.present = None;
        self.lags.iter_mut().for_each(|lag| *lag = None);
        self.error = Some(message);
    }
}

/// Machine-readable copy of a dashboard version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub version: String,
    pub sequence: u32,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub lags: usize,
    pub entries: Vec<DashboardEntry>,
}

impl DashboardSnapshot {
    /// Rows that could not be filled.
    pub fn errors(&self) -> impl Iterator<Item = &DashboardEntry> {
        self.entries.iter().filter(|e| e.error.is_some())
    }
}

/// The configured layout, or one section per frequency listing every
/// tracked series when none is configured.
pub fn resolve_sections(config: &Config) -> Vec<DashboardSection> {
    if !config.dashboard.sections.is_empty() {
        return config.dashboard.sections.clone();
    }

    config
        .frequencies()
        .into_iter()
        .map(|frequency| {
            let ids = config
                .series
                .iter()
                .filter(|s| s.frequency == frequency)
                .map(|s| s.id.clone())
                .chain(
                    config
                        .derived
                        .iter()
                        .filter(|d| d.frequency == frequency)
                        .map(|d| d.id.clone()),
                );
            DashboardSection {
                title: frequency.display_name().to_string(),
                rows: ids
                    .map(|id| DashboardRow {
                        label: id.clone(),
                        series: id,
                        units: String::new(),
                    })
                    .collect(),
            }
        })
        .collect()
}

/// Fill every layout row from the datasets.
///
/// A row whose series is absent from every dataset, or has no values yet,
/// gets an error instead of values; the other rows are unaffected.
pub fn build_entries(sections: &[DashboardSection], datasets: &[FrequencyDataset], lags: usize) -> Vec<DashboardEntry> {
    let mut entries = Vec::new();
    for section in sections {
        for row in &section.rows {
            let mut entry = DashboardEntry {
                section: section.title.clone(),
                label: row.label.clone(),
                series_id: row.series.clone(),
                units: row.units.clone(),
                frequency: None,
                latest_date: None,
                released: None,
                present: None,
                lags: vec![None; lags],
                error: None,
            };

            let found = datasets
                .iter()
                .find_map(|ds| ds.observations(&row.series).map(|obs| (ds.frequency(), obs)));
            match found {
                None => {
                    tracing::warn!(series_id = %row.series, "dashboard series not found in any dataset");
                    entry.error = Some(format!("series {} not found in any dataset", row.series));
                }
                Some((frequency, observations)) => {
                    entry.frequency = Some(frequency);
                    match recent_values(frequency, &observations, lags) {
                        Some((latest, window)) => {
                            entry.latest_date = Some(latest.date);
                            entry.released = latest.released;
                            entry.present = window[0];
                            entry.lags = window[1..].to_vec();
                        }
                        None => {
                            tracing::warn!(series_id = %row.series, "dashboard series has no values");
                            entry.error = Some(format!("series {} has no values", row.series));
                        }
                    }
                }
            }
            entries.push(entry);
        }
    }
    entries
}

/// Latest entry with a value, plus the window ending there, newest first.
///
/// The window has `lags + 1` slots; short histories leave the oldest slots
/// empty. Daily series drop "no data" entries first so lags count trading
/// days rather than holidays.
fn recent_values(
    frequency: Frequency,
    observations: &[Observation],
    lags: usize,
) -> Option<(Observation, Vec<Option<f64>>)> {
    let observations: Vec<&Observation> = if frequency == Frequency::Daily {
        observations.iter().filter(|o| o.value.is_some()).collect()
    } else {
        observations.iter().collect()
    };

    let last = observations.iter().rposition(|o| o.value.is_some())?;
    let window = (0..=lags)
        .map(|k| last.checked_sub(k).and_then(|i| observations[i].value))
        .collect();
    Some((*observations[last], window))
}
