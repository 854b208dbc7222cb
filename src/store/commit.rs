//! Apply a fetch batch to the on-disk datasets.
//!
//! Datasets are processed one frequency at a time: load, merge every fetched
//! series in request order, recompute derived series, save. This is the only
//! writer, so each series is updated by exactly one owner even when fetching
//! ran in parallel. A failed save affects only that frequency's series; the
//! files on disk keep their previous contents.

use chrono::{DateTime, Utc};

use super::csv_store::FrequencyStore;
use super::dataset::MergeStats;
use crate::config::DerivedSeries;
use crate::data::FetchReport;
use crate::domain::{FetchOutcome, Frequency, GapPolicy};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    Merged(MergeStats),
    NoNewData,
    Derived { values: usize },
    FetchFailed(String),
    WriteFailed(String),
}

impl StoreOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StoreOutcome::FetchFailed(_) | StoreOutcome::WriteFailed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStoreResult {
    pub series_id: String,
    pub frequency: Frequency,
    pub outcome: StoreOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct StoreReport {
    pub results: Vec<SeriesStoreResult>,
}

impl StoreReport {
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn has_write_failures(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(r.outcome, StoreOutcome::WriteFailed(_)))
    }
}

pub fn commit_fetches(
    store: &FrequencyStore,
    fetches: &FetchReport,
    derived: &[DerivedSeries],
    policy: GapPolicy,
    now: DateTime<Utc>,
) -> StoreReport {
    let mut report = StoreReport::default();

    for frequency in Frequency::ALL {
        let batch: Vec<_> = fetches
            .results
            .iter()
            .filter(|r| r.spec.frequency == frequency)
            .collect();
        let derived_here: Vec<_> = derived.iter().filter(|d| d.frequency == frequency).collect();
        if batch.is_empty() && derived_here.is_empty() {
            continue;
        }

        let start = report.results.len();
        let mut dataset = match store.load(frequency) {
            Ok(dataset) => dataset,
            Err(err) => {
                tracing::error!(frequency = %frequency, error = %err, "failed to load dataset");
                let ids = batch
                    .iter()
                    .map(|f| f.spec.id.clone())
                    .chain(derived_here.iter().map(|d| d.id.clone()));
                for series_id in ids {
                    report.results.push(SeriesStoreResult {
                        series_id,
                        frequency,
                        outcome: StoreOutcome::WriteFailed(err.to_string()),
                    });
                }
                continue;
            }
        };

        let mut dirty = false;
        for fetch in &batch {
            let id = fetch.spec.id.as_str();
            let outcome = match &fetch.result {
                Ok(outcome) => {
                    let updated = outcome.info().map(|i| i.last_updated.clone());
                    dirty = true;
                    match outcome {
                        FetchOutcome::NewData { observations, .. } => {
                            let stats = dataset.merge(id, observations, policy);
                            dataset.record_fetch(id, updated, now);
                            tracing::info!(
                                series_id = id,
                                inserted = stats.inserted,
                                updated = stats.updated,
                                unchanged = stats.unchanged,
                                filled = stats.filled,
                                "merged"
                            );
                            StoreOutcome::Merged(stats)
                        }
                        FetchOutcome::NoNewData { .. } => {
                            if dataset.contains(id) {
                                dataset.record_fetch(id, updated, now);
                            }
                            StoreOutcome::NoNewData
                        }
                    }
                }
                Err(err) => StoreOutcome::FetchFailed(err.to_string()),
            };
            report.results.push(SeriesStoreResult {
                series_id: id.to_string(),
                frequency,
                outcome,
            });
        }

        for d in &derived_here {
            let values = dataset.apply_derived(d);
            dirty = true;
            report.results.push(SeriesStoreResult {
                series_id: d.id.clone(),
                frequency,
                outcome: StoreOutcome::Derived { values },
            });
        }

        if !dirty {
            continue;
        }

        if let Err(err) = store.save(&dataset) {
            tracing::error!(frequency = %frequency, error = %err, "failed to save dataset");
            for result in &mut report.results[start..] {
                if !result.outcome.is_failure() {
                    result.outcome = StoreOutcome::WriteFailed(err.to_string());
                }
            }
        }
    }

    report
}
