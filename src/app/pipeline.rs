//! The fetch → store → dashboard workflow, shared by every subcommand.
//!
//! Each stage runs to completion before the next one starts. Functions here
//! take the upstream source and the clock as arguments so the whole pipeline
//! can run against an in-memory source in tests.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::dashboard::{
    DashboardEntry, DashboardError, PublishedVersion, VersionStore, build_entries, render_workbook, resolve_sections,
};
use crate::data::{FetchReport, FetchRequest, Fetcher, SeriesSource};
use crate::domain::{Frequency, GapPolicy, SeriesSpec};
use crate::error::{AppError, EXIT_PARTIAL, EXIT_WRITE};
use crate::store::{FrequencyDataset, FrequencyStore, StoreReport, commit_fetches};

/// Run-time knobs for the fetch stage.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub gap_policy: GapPolicy,
    pub jobs: usize,
    /// Ignore the stored since-dates and refetch full histories.
    pub full: bool,
}

impl FetchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            gap_policy: config.store.gap_policy,
            jobs: 1,
            full: false,
        }
    }
}

/// Outputs of the fetch and store stages.
#[derive(Debug, Clone)]
pub struct FetchStoreRun {
    pub fetches: FetchReport,
    pub store: StoreReport,
}

/// Everything a single `macrodash update` produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub fetch_store: Option<FetchStoreRun>,
    pub dashboard: Option<Result<DashboardRun, String>>,
}

#[derive(Debug, Clone)]
pub struct DashboardRun {
    pub published: PublishedVersion,
    /// `(series id, message)` for rows that could not be filled.
    pub errors: Vec<(String, String)>,
    /// Datasets that could not be read; their rows carry the error.
    pub unreadable: Vec<(Frequency, String)>,
}

impl RunOutput {
    /// Ids of series that failed in any stage, sorted.
    pub fn failed_series(&self) -> BTreeSet<&str> {
        let mut failed = BTreeSet::new();
        if let Some(run) = &self.fetch_store {
            failed.extend(
                run.store
                    .results
                    .iter()
                    .filter(|r| r.outcome.is_failure())
                    .map(|r| r.series_id.as_str()),
            );
        }
        if let Some(Ok(run)) = &self.dashboard {
            failed.extend(run.errors.iter().map(|(id, _)| id.as_str()));
        }
        failed
    }

    /// Map the run's per-series results to the process outcome.
    ///
    /// Write failures take precedence over per-series fetch or layout errors.
    pub fn status(&self) -> Result<(), AppError> {
        if self.fetch_store.as_ref().is_some_and(|run| run.store.has_write_failures()) {
            return Err(AppError::new(EXIT_WRITE, "one or more datasets failed to save"));
        }
        match &self.dashboard {
            Some(Err(err)) => {
                return Err(AppError::new(EXIT_WRITE, format!("dashboard write failed: {err}")));
            }
            Some(Ok(run)) if !run.unreadable.is_empty() => {
                let codes: Vec<&str> = run.unreadable.iter().map(|(f, _)| f.code()).collect();
                return Err(AppError::new(
                    EXIT_WRITE,
                    format!("unreadable datasets: {}", codes.join(", ")),
                ));
            }
            _ => {}
        }
        let failed = self.failed_series();
        if !failed.is_empty() {
            return Err(AppError::new(
                EXIT_PARTIAL,
                format!("{} series failed: {}", failed.len(), failed.into_iter().collect::<Vec<_>>().join(", ")),
            ));
        }
        Ok(())
    }
}

/// Fetch every configured series and commit the results to the store.
pub fn run_fetch_store(
    config: &Config,
    source: &dyn SeriesSource,
    options: &FetchOptions,
    now: DateTime<Utc>,
) -> FetchStoreRun {
    let store = FrequencyStore::new(&config.store.data_dir);
    let requests = build_requests(&store, &config.series, options.full);

    let fetcher = Fetcher::new(source, config.retry_policy())
        .with_lookback_days(config.fred.lookback_days)
        .with_jobs(options.jobs);
    let fetches = fetcher.fetch_batch(&requests);

    let store_report = commit_fetches(&store, &fetches, &config.derived, options.gap_policy, now);
    FetchStoreRun {
        fetches,
        store: store_report,
    }
}

/// Build the dashboard from the stored datasets and publish a new version.
///
/// A dataset that cannot be read fails only the rows of its series; the
/// version is still written from the others.
pub fn run_dashboard(config: &Config, now: DateTime<Utc>) -> Result<DashboardRun, AppError> {
    let store = FrequencyStore::new(&config.store.data_dir);
    let mut datasets = Vec::new();
    let mut unreadable = Vec::new();
    for frequency in config.frequencies() {
        match store.load(frequency) {
            Ok(dataset) => datasets.push(dataset),
            Err(err) => {
                tracing::error!(frequency = %frequency, error = %err, "cannot read dataset for the dashboard");
                unreadable.push((frequency, err.to_string()));
            }
        }
    }

    let sections = resolve_sections(config);
    let mut entries = build_entries(&sections, &datasets, config.dashboard.lags);
    for entry in &mut entries {
        let Some(frequency) = config.frequency_of(&entry.series_id) else {
            continue;
        };
        if let Some((_, err)) = unreadable.iter().find(|(f, _)| *f == frequency) {
            entry.frequency = Some(frequency);
            entry.fail(format!("{} dataset unreadable: {err}", frequency.display_name()));
        }
    }
    let errors = entries
        .iter()
        .filter_map(|e| e.error.as_ref().map(|msg| (e.series_id.clone(), msg.clone())))
        .collect();

    let versions = VersionStore::new(&config.dashboard.dir);
    let published = publish(&versions, config, entries, now)?;
    Ok(DashboardRun {
        published,
        errors,
        unreadable,
    })
}

fn publish(
    versions: &VersionStore,
    config: &Config,
    entries: Vec<DashboardEntry>,
    now: DateTime<Utc>,
) -> Result<PublishedVersion, DashboardError> {
    let snapshot = versions.prepare(&config.dashboard.title, config.dashboard.lags, entries, now)?;
    let workbook = render_workbook(&snapshot)?;
    versions.publish(&snapshot, &workbook)
}

/// Fetch, store, then write the dashboard.
///
/// Per-series failures never stop the later stages. The dashboard is written
/// even when some series failed to fetch, so it reflects everything that did.
pub fn run_update(
    config: &Config,
    source: &dyn SeriesSource,
    options: &FetchOptions,
    now: DateTime<Utc>,
) -> RunOutput {
    let fetch_store = run_fetch_store(config, source, options, now);
    let dashboard = run_dashboard(config, now).map_err(|err| {
        tracing::error!(error = %err, "dashboard write failed");
        err.to_string()
    });

    RunOutput {
        fetch_store: Some(fetch_store),
        dashboard: Some(dashboard),
    }
}

/// One request per configured series, with its since-date from the store.
fn build_requests(store: &FrequencyStore, series: &[SeriesSpec], full: bool) -> Vec<FetchRequest> {
    let mut datasets: BTreeMap<Frequency, FrequencyDataset> = BTreeMap::new();
    let mut requests = Vec::with_capacity(series.len());
    for spec in series {
        let since = if full {
            None
        } else {
            let dataset = datasets.entry(spec.frequency).or_insert_with(|| {
                store.load(spec.frequency).unwrap_or_else(|err| {
                    tracing::warn!(
                        frequency = %spec.frequency,
                        error = %err,
                        "cannot read dataset, fetching full history"
                    );
                    FrequencyDataset::new(spec.frequency)
                })
            });
            dataset.last_date(&spec.id)
        };
        requests.push(FetchRequest {
            spec: spec.clone(),
            since,
        });
    }
    requests
}
