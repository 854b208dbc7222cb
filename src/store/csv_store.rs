//! Flat-file persistence for frequency datasets.
//!
//! Layout, one set of files per frequency:
//!
//! - `{data_dir}/{CODE}_Values.csv`: wide table, `date` then one column per
//!   series (sorted by id). An empty cell means "no entry"; `.` is an explicit
//!   "no data" entry.
//! - `{data_dir}/{CODE}_Dates.csv`: same shape, holding the date upstream
//!   published each stored value. An empty cell means the date is unknown.
//! - `{data_dir}/{CODE}_meta.json`: per-series metadata sidecar.
//!
//! Writes go through `write_atomic`, so a failed save leaves the previous
//! files intact.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::dataset::{FrequencyDataset, SeriesMeta};
use super::{StoreError, write_atomic};
use crate::domain::Frequency;

const DATE_HEADER: &str = "date";
const NO_DATA: &str = ".";

#[derive(Debug, Serialize, Deserialize)]
struct DatasetMeta {
    frequency: Frequency,
    series: BTreeMap<String, SeriesMeta>,
}

/// Summary row for `macrodash status`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStatus {
    pub frequency: Frequency,
    pub series_id: String,
    pub observations: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub last_fetched_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct FrequencyStore {
    data_dir: PathBuf,
}

impl FrequencyStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn values_path(&self, frequency: Frequency) -> PathBuf {
        self.data_dir.join(format!("{}_Values.csv", frequency.code()))
    }

    pub fn dates_path(&self, frequency: Frequency) -> PathBuf {
        self.data_dir.join(format!("{}_Dates.csv", frequency.code()))
    }

    pub fn meta_path(&self, frequency: Frequency) -> PathBuf {
        self.data_dir.join(format!("{}_meta.json", frequency.code()))
    }

    /// Load a dataset. A frequency with no files yet loads as empty.
    pub fn load(&self, frequency: Frequency) -> Result<FrequencyDataset, StoreError> {
        let mut dataset = FrequencyDataset::new(frequency);

        let values_path = self.values_path(frequency);
        if values_path.exists() {
            read_values(&values_path, &mut dataset)?;
        }

        let dates_path = self.dates_path(frequency);
        if dates_path.exists() {
            read_dates(&dates_path, &mut dataset)?;
        }

        let meta_path = self.meta_path(frequency);
        let mut sidecar = BTreeMap::new();
        if meta_path.exists() {
            let raw = fs::read_to_string(&meta_path).map_err(|source| StoreError::Io {
                path: meta_path.clone(),
                source,
            })?;
            let meta: DatasetMeta = serde_json::from_str(&raw).map_err(|source| StoreError::Meta {
                path: meta_path.clone(),
                source,
            })?;
            if meta.frequency != frequency {
                return Err(StoreError::Format {
                    path: meta_path,
                    message: format!("sidecar is for frequency {}", meta.frequency),
                });
            }
            sidecar = meta.series;
        }

        let ids: Vec<String> = dataset.series_ids().map(str::to_string).collect();
        for id in ids {
            let series_meta = sidecar.remove(&id).unwrap_or_default();
            dataset.load_meta(&id, series_meta);
        }

        Ok(dataset)
    }

    /// Persist a dataset: values first, then release dates, then the sidecar.
    pub fn save(&self, dataset: &FrequencyDataset) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir).map_err(|source| StoreError::Io {
            path: self.data_dir.clone(),
            source,
        })?;

        let values_path = self.values_path(dataset.frequency());
        let bytes = render_values(dataset).map_err(|source| StoreError::Csv {
            path: values_path.clone(),
            source,
        })?;
        write_atomic(&values_path, &bytes).map_err(|source| StoreError::Io {
            path: values_path.clone(),
            source,
        })?;

        let dates_path = self.dates_path(dataset.frequency());
        let bytes = render_dates(dataset).map_err(|source| StoreError::Csv {
            path: dates_path.clone(),
            source,
        })?;
        write_atomic(&dates_path, &bytes).map_err(|source| StoreError::Io {
            path: dates_path.clone(),
            source,
        })?;

        let meta_path = self.meta_path(dataset.frequency());
        let meta = DatasetMeta {
            frequency: dataset.frequency(),
            series: dataset.all_meta().clone(),
        };
        let json = serde_json::to_vec_pretty(&meta).map_err(|source| StoreError::Meta {
            path: meta_path.clone(),
            source,
        })?;
        write_atomic(&meta_path, &json).map_err(|source| StoreError::Io {
            path: meta_path.clone(),
            source,
        })?;

        tracing::debug!(
            frequency = %dataset.frequency(),
            path = %values_path.display(),
            series = dataset.all_meta().len(),
            "dataset saved"
        );
        Ok(())
    }

    /// Per-series summary for every dataset present on disk.
    pub fn status(&self) -> Result<Vec<SeriesStatus>, StoreError> {
        let mut out = Vec::new();
        for frequency in Frequency::ALL {
            if !self.values_path(frequency).exists() {
                continue;
            }
            let dataset = self.load(frequency)?;
            for id in dataset.series_ids() {
                let entries = &dataset.entries()[id];
                out.push(SeriesStatus {
                    frequency,
                    series_id: id.to_string(),
                    observations: entries.len(),
                    first_date: entries.keys().next().copied(),
                    last_date: entries.keys().next_back().copied(),
                    last_fetched_at: dataset.meta(id).and_then(|m| m.last_fetched_at),
                });
            }
        }
        Ok(out)
    }
}

fn read_values(path: &Path, dataset: &mut FrequencyDataset) -> Result<(), StoreError> {
    read_wide(path, |id, date, cell, line| {
        let value = match cell {
            "" => return Ok(()),
            NO_DATA => None,
            raw => Some(
                raw.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| format!("line {line}: invalid value '{raw}' for {id}"))?,
            ),
        };
        dataset.load_entry(id, date, value);
        Ok(())
    })
}

fn read_dates(path: &Path, dataset: &mut FrequencyDataset) -> Result<(), StoreError> {
    let mut orphans = 0usize;
    read_wide(path, |id, date, cell, line| {
        if cell.is_empty() {
            return Ok(());
        }
        let released = parse_date(cell).map_err(|e| format!("line {line}: invalid release date '{cell}' for {id}: {e}"))?;
        if !dataset.load_release(id, date, released) {
            orphans += 1;
        }
        Ok(())
    })?;
    if orphans > 0 {
        tracing::debug!(path = %path.display(), orphans, "ignoring release dates without a stored value");
    }
    Ok(())
}

/// Walk a wide `date,<series…>` table, calling `on_cell` for every cell.
fn read_wide(
    path: &Path,
    mut on_cell: impl FnMut(&str, NaiveDate, &str, usize) -> Result<(), String>,
) -> Result<(), StoreError> {
    let csv_err = |source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let format_err = |message: String| StoreError::Format {
        path: path.to_path_buf(),
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();
    if headers.get(0) != Some(DATE_HEADER) {
        return Err(format_err(format!("first column must be '{DATE_HEADER}'")));
    }
    let series: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    let mut unique = BTreeSet::new();
    for id in &series {
        if !unique.insert(id.as_str()) {
            return Err(format_err(format!("duplicate column '{id}'")));
        }
    }

    let mut prev: Option<NaiveDate> = None;
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let line = i + 2;
        let raw_date = record.get(0).unwrap_or_default();
        let date = parse_date(raw_date).map_err(|e| format_err(format!("line {line}: invalid date '{raw_date}': {e}")))?;
        if prev.is_some_and(|p| p >= date) {
            return Err(format_err(format!("line {line}: dates must be strictly increasing")));
        }
        prev = Some(date);

        for (id, cell) in series.iter().zip(record.iter().skip(1)) {
            on_cell(id, date, cell, line).map_err(format_err)?;
        }
    }

    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
}

fn render_values(dataset: &FrequencyDataset) -> Result<Vec<u8>, csv::Error> {
    render_wide(dataset.entries(), |value| match value {
        None => NO_DATA.to_string(),
        Some(v) => v.to_string(),
    })
}

fn render_dates(dataset: &FrequencyDataset) -> Result<Vec<u8>, csv::Error> {
    render_wide(dataset.release_dates(), |released| released.format("%Y-%m-%d").to_string())
}

/// One row per date present in any series; absent cells are left empty.
fn render_wide<T>(
    table: &BTreeMap<String, BTreeMap<NaiveDate, T>>,
    cell: impl Fn(&T) -> String,
) -> Result<Vec<u8>, csv::Error> {
    let dates: BTreeSet<NaiveDate> = table.values().flat_map(|m| m.keys().copied()).collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec![DATE_HEADER.to_string()];
    header.extend(table.keys().cloned());
    writer.write_record(&header)?;

    for date in dates {
        let mut row = Vec::with_capacity(header.len());
        row.push(date.format("%Y-%m-%d").to_string());
        for series in table.values() {
            row.push(series.get(&date).map(&cell).unwrap_or_default());
        }
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}
