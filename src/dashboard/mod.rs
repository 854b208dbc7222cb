//! Dashboard writer: turns the frequency datasets into a versioned workbook.
//!
//! - row extraction (latest date, present value, lags) in `snapshot`
//! - `.xlsx` rendering in `workbook`
//! - version history and the `current` copy in `versions`

use std::path::PathBuf;

use thiserror::Error;

pub mod snapshot;
pub mod versions;
pub mod workbook;

pub use snapshot::{DashboardEntry, DashboardSnapshot, build_entries, resolve_sections};
pub use versions::{PublishedVersion, VersionInfo, VersionStore};
pub use workbook::render_workbook;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to render workbook: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("snapshot error in {}: {source}", path.display())]
    Snapshot {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("dashboard version already exists: {0}")]
    VersionExists(String),

    #[error("unknown dashboard version: {0}")]
    UnknownVersion(String),
}
