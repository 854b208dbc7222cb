//! Batch fetch orchestration.
//!
//! Fetches every requested series independently: a failure for one series is
//! recorded in its result and never aborts the batch. Transient failures are
//! retried with exponential backoff up to `RetryPolicy::max_attempts`.

use std::time::Duration;

use chrono::NaiveDate;
use rand::Rng;
use rayon::prelude::*;

use crate::data::source::{FetchError, SeriesSource};
use crate::domain::{FetchOutcome, SeriesSpec};

/// Upper bound on a single backoff sleep, including `Retry-After` hints.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Bounded retry for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    /// Base delay; doubles on every retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32, err: &FetchError) -> Duration {
        if let FetchError::RateLimited {
            retry_after_secs: Some(secs),
        } = err
        {
            return Duration::from_secs(*secs).min(MAX_BACKOFF);
        }
        if self.backoff.is_zero() {
            return Duration::ZERO;
        }
        let exp = self.backoff.saturating_mul(1u32 << (attempt - 1).min(16));
        let jitter_ms = (self.backoff.as_millis() as u64 / 4).max(1);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
        (exp + jitter).min(MAX_BACKOFF)
    }
}

/// One series to fetch, with the store's last recorded date if any.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub spec: SeriesSpec,
    pub since: Option<NaiveDate>,
}

/// Fetch result for one series.
#[derive(Debug, Clone)]
pub struct SeriesFetch {
    pub spec: SeriesSpec,
    pub since: Option<NaiveDate>,
    /// Requests made, retries included.
    pub attempts: u32,
    pub result: Result<FetchOutcome, FetchError>,
}

/// Fetch results for a whole batch, in request order.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub results: Vec<SeriesFetch>,
}

impl FetchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&SeriesSpec, &FetchError)> {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (&r.spec, e)))
    }
}

pub struct Fetcher<'a> {
    source: &'a dyn SeriesSource,
    retry: RetryPolicy,
    lookback_days: u32,
    jobs: usize,
}

impl<'a> Fetcher<'a> {
    pub fn new(source: &'a dyn SeriesSource, retry: RetryPolicy) -> Self {
        Self {
            source,
            retry,
            lookback_days: 0,
            jobs: 1,
        }
    }

    /// Re-read this many days before the since-date to pick up revisions.
    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    /// Fetch on a worker pool of this size (1 = sequential).
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn fetch_batch(&self, requests: &[FetchRequest]) -> FetchReport {
        tracing::info!(
            source = self.source.name(),
            series = requests.len(),
            jobs = self.jobs,
            "fetching batch"
        );

        let results = if self.jobs > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build() {
                Ok(pool) => pool.install(|| requests.par_iter().map(|r| self.fetch_one(r)).collect()),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to build fetch pool, fetching sequentially");
                    requests.iter().map(|r| self.fetch_one(r)).collect()
                }
            }
        } else {
            requests.iter().map(|r| self.fetch_one(r)).collect()
        };

        let report = FetchReport { results };
        for (spec, err) in report.failures() {
            tracing::warn!(series_id = %spec.id, error = %err, "series skipped");
        }
        report
    }

    pub fn fetch_one(&self, request: &FetchRequest) -> SeriesFetch {
        let mut attempts = 0;
        let result = self.fetch_outcome(request, &mut attempts);
        match &result {
            Ok(FetchOutcome::NewData { observations, .. }) => tracing::info!(
                series_id = %request.spec.id,
                observations = observations.len(),
                attempts,
                "fetched"
            ),
            Ok(FetchOutcome::NoNewData { .. }) => {
                tracing::info!(series_id = %request.spec.id, "no new data")
            }
            Err(_) => {}
        }
        SeriesFetch {
            spec: request.spec.clone(),
            since: request.since,
            attempts,
            result,
        }
    }

    fn fetch_outcome(&self, request: &FetchRequest, attempts: &mut u32) -> Result<FetchOutcome, FetchError> {
        let id = request.spec.id.as_str();
        let info = self.with_retry(id, attempts, || self.source.series_info(id))?;

        if let (Some(since), Some(end), 0) = (request.since, info.observation_end, self.lookback_days) {
            if end <= since {
                return Ok(FetchOutcome::NoNewData { info: Some(info) });
            }
        }

        let start = request.since.and_then(|since| {
            since.checked_add_signed(chrono::Duration::days(1 - i64::from(self.lookback_days)))
        });
        let raw = self.with_retry(id, attempts, || self.source.observations(id, start))?;

        let mut observations = request.spec.frequency.normalize(raw);
        if let Some(start) = start {
            let first = request.spec.frequency.period_start(start);
            observations.retain(|o| o.date >= first);
        }

        if observations.is_empty() {
            Ok(FetchOutcome::NoNewData { info: Some(info) })
        } else {
            Ok(FetchOutcome::NewData {
                info: Some(info),
                observations,
            })
        }
    }

    fn with_retry<T>(
        &self,
        series_id: &str,
        attempts: &mut u32,
        mut op: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            *attempts += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt, &err);
                    tracing::warn!(
                        series_id,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "transient fetch failure, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}
