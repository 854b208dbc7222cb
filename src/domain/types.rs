//! Shared domain types.
//!
//! These types are kept small and serializable so they can be:
//!
//! - passed between the fetch, store and dashboard stages
//! - persisted in the dataset sidecars and dashboard snapshots
//! - read back for status reports

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Sampling interval of a series.
///
/// Parses from either the long name or the short code (`"MONTHLY"`, `"M"`),
/// case-insensitively. Serializes as the short code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl Frequency {
    pub const ALL: [Frequency; 5] = [
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Monthly,
        Frequency::Quarterly,
        Frequency::Annual,
    ];

    /// Short code used in file names and on the dashboard.
    pub fn code(self) -> &'static str {
        match self {
            Frequency::Daily => "D",
            Frequency::Weekly => "W",
            Frequency::Monthly => "M",
            Frequency::Quarterly => "Q",
            Frequency::Annual => "A",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
            Frequency::Monthly => "Monthly",
            Frequency::Quarterly => "Quarterly",
            Frequency::Annual => "Annual",
        }
    }

    /// Normalize a date to the start of the period that contains it.
    ///
    /// Daily and weekly dates are kept as published; FRED stamps weekly
    /// series with their week-ending date.
    pub fn period_start(self, date: NaiveDate) -> NaiveDate {
        let month = match self {
            Frequency::Daily | Frequency::Weekly => return date,
            Frequency::Monthly => date.month(),
            Frequency::Quarterly => (date.month0() / 3) * 3 + 1,
            Frequency::Annual => 1,
        };
        NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
    }

    /// The period that follows `date`.
    ///
    /// Daily steps skip weekends, so filling gaps never invents
    /// non-business days.
    pub fn next_period(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Frequency::Daily => {
                let mut next = date.checked_add_signed(Duration::days(1))?;
                while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
                    next = next.checked_add_signed(Duration::days(1))?;
                }
                Some(next)
            }
            Frequency::Weekly => date.checked_add_signed(Duration::days(7)),
            Frequency::Monthly => date.checked_add_months(Months::new(1)),
            Frequency::Quarterly => date.checked_add_months(Months::new(3)),
            Frequency::Annual => date.checked_add_months(Months::new(12)),
        }
    }

    /// Map observations onto period starts, sorted by date.
    ///
    /// When several observations land in the same period the latest one wins.
    pub fn normalize(self, mut observations: Vec<Observation>) -> Vec<Observation> {
        observations.sort_by_key(|o| o.date);
        let mut out: Vec<Observation> = Vec::with_capacity(observations.len());
        for obs in observations {
            let date = self.period_start(obs.date);
            match out.last_mut() {
                Some(last) if last.date == date => {
                    last.value = obs.value;
                    last.released = obs.released;
                }
                _ => out.push(Observation { date, ..obs }),
            }
        }
        out
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DAILY" | "D" => Ok(Frequency::Daily),
            "WEEKLY" | "W" => Ok(Frequency::Weekly),
            "MONTHLY" | "M" => Ok(Frequency::Monthly),
            "QUARTERLY" | "Q" => Ok(Frequency::Quarterly),
            "ANNUAL" | "A" | "Y" => Ok(Frequency::Annual),
            _ => Err(format!("unsupported frequency: {s}")),
        }
    }
}

impl TryFrom<String> for Frequency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Frequency> for String {
    fn from(value: Frequency) -> Self {
        value.code().to_string()
    }
}

/// How the store treats periods with no observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GapPolicy {
    /// Missing periods are simply absent from the dataset.
    #[default]
    Omit,
    /// Every missing period between a series' first and last date gets an
    /// explicit "no data" entry.
    Placeholder,
}

/// A single dated value. `value` is `None` for a missing release.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: Option<f64>,
    /// Date upstream published the current value for this period.
    #[serde(default)]
    pub released: Option<NaiveDate>,
}

impl Observation {
    pub fn new(date: NaiveDate, value: Option<f64>) -> Self {
        Self {
            date,
            value,
            released: None,
        }
    }

    pub fn released_on(mut self, released: NaiveDate) -> Self {
        self.released = Some(released);
        self
    }
}

/// A configured series: identifier plus the dataset it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub id: String,
    pub frequency: Frequency,
}

/// Upstream metadata about a series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesInfo {
    pub id: String,
    pub title: String,
    pub frequency_short: String,
    /// Upstream update timestamp, kept verbatim.
    pub last_updated: String,
    /// Date of the most recent observation upstream.
    pub observation_end: Option<NaiveDate>,
}

/// Result of fetching one series.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Observations at or after the requested start date, normalized to
    /// period starts.
    NewData {
        info: Option<SeriesInfo>,
        observations: Vec<Observation>,
    },
    /// Upstream has nothing after the since-date.
    NoNewData { info: Option<SeriesInfo> },
}

impl FetchOutcome {
    pub fn info(&self) -> Option<&SeriesInfo> {
        match self {
            FetchOutcome::NewData { info, .. } | FetchOutcome::NoNewData { info } => info.as_ref(),
        }
    }

    pub fn observations(&self) -> &[Observation] {
        match self {
            FetchOutcome::NewData { observations, .. } => observations,
            FetchOutcome::NoNewData { .. } => &[],
        }
    }
}
