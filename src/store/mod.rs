//! Frequency store: durable, frequency-grouped observation datasets.
//!
//! - in-memory merge + gap policy (`dataset`)
//! - CSV/JSON persistence (`csv_store`)
//! - applying a fetch batch to the datasets (`commit`)

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod commit;
pub mod csv_store;
pub mod dataset;

pub use commit::{StoreOutcome, StoreReport, commit_fetches};
pub use csv_store::{FrequencyStore, SeriesStatus};
pub use dataset::{FrequencyDataset, MergeStats, SeriesMeta};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },

    #[error("metadata error in {}: {source}", path.display())]
    Meta {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("malformed dataset {}: {message}", path.display())]
    Format { path: PathBuf, message: String },
}

/// Write `bytes` to `path` via a sibling `.tmp` file and a rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let mut file = File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp_path);
    })
}
