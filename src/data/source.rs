//! Upstream series source trait and structured fetch errors.
//!
//! The `SeriesSource` trait abstracts over where observations come from so the
//! fetcher can run against FRED in production and an in-memory source in tests.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{Observation, SeriesInfo};

/// Per-series fetch failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("series not found upstream: {series_id}")]
    NotFound { series_id: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by provider")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("provider returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("request rejected: {0}")]
    BadRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::RateLimited { .. } => true,
            FetchError::Upstream { status, .. } => *status >= 500,
            FetchError::NotFound { .. } | FetchError::BadRequest(_) | FetchError::InvalidResponse(_) => {
                false
            }
        }
    }
}

/// A read-only time-series query interface keyed by series identifier.
pub trait SeriesSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Metadata for a series, including its most recent observation date.
    fn series_info(&self, series_id: &str) -> Result<SeriesInfo, FetchError>;

    /// Observations on or after `start` (all history when `None`), ascending.
    /// Each carries its release date when the source knows it.
    fn observations(
        &self,
        series_id: &str,
        start: Option<NaiveDate>,
    ) -> Result<Vec<Observation>, FetchError>;
}
