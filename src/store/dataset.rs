//! In-memory frequency dataset.
//!
//! One `FrequencyDataset` holds every series of a single frequency, keyed by
//! series id, each as a date-ordered map. Using `BTreeMap` for both levels makes
//! the "strictly increasing, unique dates" invariant structural and keeps the
//! serialized form deterministic. Release dates are kept in a parallel map
//! with the same keys.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DerivedSeries;
use crate::domain::{Frequency, GapPolicy, Observation};

/// Per-series bookkeeping persisted next to the values file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesMeta {
    /// Latest date stored for the series.
    pub last_date: Option<NaiveDate>,
    /// Stored entries, "no data" markers included.
    pub observations: usize,
    /// Upstream update timestamp seen on the last successful fetch.
    #[serde(default)]
    pub upstream_last_updated: Option<String>,
    #[serde(default)]
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Counts from merging one batch of observations into a series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// "No data" markers added by the placeholder gap policy.
    pub filled: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyDataset {
    frequency: Frequency,
    series: BTreeMap<String, BTreeMap<NaiveDate, Option<f64>>>,
    released: BTreeMap<String, BTreeMap<NaiveDate, NaiveDate>>,
    meta: BTreeMap<String, SeriesMeta>,
}

impl FrequencyDataset {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            series: BTreeMap::new(),
            released: BTreeMap::new(),
            meta: BTreeMap::new(),
        }
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn contains(&self, series_id: &str) -> bool {
        self.series.contains_key(series_id)
    }

    /// Series ids in sorted order.
    pub fn series_ids(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Date-ordered entries for a series.
    pub fn observations(&self, series_id: &str) -> Option<Vec<Observation>> {
        let released = self.released.get(series_id);
        self.series.get(series_id).map(|entries| {
            entries
                .iter()
                .map(|(date, value)| Observation {
                    date: *date,
                    value: *value,
                    released: released.and_then(|r| r.get(date).copied()),
                })
                .collect()
        })
    }

    /// The date to fetch after on the next run.
    pub fn last_date(&self, series_id: &str) -> Option<NaiveDate> {
        self.series
            .get(series_id)
            .and_then(|entries| entries.keys().next_back().copied())
    }

    pub fn meta(&self, series_id: &str) -> Option<&SeriesMeta> {
        self.meta.get(series_id)
    }

    pub(crate) fn all_meta(&self) -> &BTreeMap<String, SeriesMeta> {
        &self.meta
    }

    pub(crate) fn entries(&self) -> &BTreeMap<String, BTreeMap<NaiveDate, Option<f64>>> {
        &self.series
    }

    pub(crate) fn release_dates(&self) -> &BTreeMap<String, BTreeMap<NaiveDate, NaiveDate>> {
        &self.released
    }

    /// Insert a single entry while loading from disk.
    pub(crate) fn load_entry(&mut self, series_id: &str, date: NaiveDate, value: Option<f64>) {
        self.series
            .entry(series_id.to_string())
            .or_default()
            .insert(date, value);
    }

    /// Attach a release date to an entry loaded from disk. Dates with no
    /// stored entry are ignored.
    pub(crate) fn load_release(&mut self, series_id: &str, date: NaiveDate, released: NaiveDate) -> bool {
        if !self.series.get(series_id).is_some_and(|e| e.contains_key(&date)) {
            return false;
        }
        self.released
            .entry(series_id.to_string())
            .or_default()
            .insert(date, released);
        true
    }

    /// Attach persisted metadata; counts and dates are recomputed from the data.
    pub(crate) fn load_meta(&mut self, series_id: &str, meta: SeriesMeta) {
        self.meta.insert(series_id.to_string(), meta);
        self.refresh_meta(series_id);
    }

    /// Merge observations by date. A value already stored for a date is
    /// overwritten: a re-published value is an upstream correction. A known
    /// release date replaces the stored one; an unknown one keeps it.
    pub fn merge(&mut self, series_id: &str, observations: &[Observation], policy: GapPolicy) -> MergeStats {
        let mut stats = MergeStats::default();
        if observations.is_empty() && !self.contains(series_id) {
            return stats;
        }
        let entries = self.series.entry(series_id.to_string()).or_default();

        for obs in observations {
            match entries.insert(obs.date, obs.value) {
                None => stats.inserted += 1,
                Some(old) if old == obs.value => stats.unchanged += 1,
                Some(_) => stats.updated += 1,
            }
            if let Some(released) = obs.released {
                self.released
                    .entry(series_id.to_string())
                    .or_default()
                    .insert(obs.date, released);
            }
        }

        if policy == GapPolicy::Placeholder {
            stats.filled = fill_gaps(self.frequency, entries);
        }

        self.refresh_meta(series_id);
        stats
    }

    /// Record a successful fetch (including one that found nothing new).
    pub fn record_fetch(&mut self, series_id: &str, upstream_last_updated: Option<String>, at: DateTime<Utc>) {
        let meta = self.meta.entry(series_id.to_string()).or_default();
        if upstream_last_updated.is_some() {
            meta.upstream_last_updated = upstream_last_updated;
        }
        meta.last_fetched_at = Some(at);
    }

    /// Recompute a deflated series from its stored inputs.
    ///
    /// Dates where either input is missing, or the deflator is zero, are
    /// skipped. A derived value is released with the later of its inputs.
    /// Returns the number of values produced.
    pub fn apply_derived(&mut self, derived: &DerivedSeries) -> usize {
        let computed: BTreeMap<NaiveDate, Option<f64>> = match (
            self.series.get(&derived.numerator),
            self.series.get(&derived.deflator),
        ) {
            (Some(num), Some(defl)) => num
                .iter()
                .filter_map(|(date, n)| {
                    let n = (*n)?;
                    let d = (*defl.get(date)?)?;
                    if d == 0.0 {
                        return None;
                    }
                    let v = n / (d / derived.base);
                    v.is_finite().then_some((*date, Some(v)))
                })
                .collect(),
            _ => BTreeMap::new(),
        };

        let released: BTreeMap<NaiveDate, NaiveDate> = computed
            .keys()
            .filter_map(|date| {
                let of = |id: &str| self.released.get(id).and_then(|r| r.get(date).copied());
                of(&derived.numerator).max(of(&derived.deflator)).map(|r| (*date, r))
            })
            .collect();

        let count = computed.len();
        self.released.remove(&derived.id);
        if computed.is_empty() {
            self.series.remove(&derived.id);
            self.meta.remove(&derived.id);
        } else {
            self.series.insert(derived.id.clone(), computed);
            if !released.is_empty() {
                self.released.insert(derived.id.clone(), released);
            }
            self.refresh_meta(&derived.id);
        }
        count
    }

    fn refresh_meta(&mut self, series_id: &str) {
        let Some(entries) = self.series.get(series_id) else {
            return;
        };
        let meta = self.meta.entry(series_id.to_string()).or_default();
        meta.last_date = entries.keys().next_back().copied();
        meta.observations = entries.len();
    }
}

/// Insert "no data" markers for every missing period between stored dates.
fn fill_gaps(frequency: Frequency, entries: &mut BTreeMap<NaiveDate, Option<f64>>) -> usize {
    let dates: Vec<NaiveDate> = entries.keys().copied().collect();
    let mut filled = 0;
    for pair in dates.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let mut cursor = frequency.next_period(from);
        while let Some(date) = cursor {
            if date >= to {
                break;
            }
            entries.insert(date, None);
            filled += 1;
            cursor = frequency.next_period(date);
        }
    }
    filled
}
