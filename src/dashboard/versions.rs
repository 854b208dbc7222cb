//! Dashboard version history.
//!
//! ```text
//! {dir}/versions/{id}.xlsx   immutable
//! {dir}/versions/{id}.json   immutable snapshot, also the listing index
//! {dir}/current.xlsx         atomically replaced copy of the newest version
//! {dir}/current.json
//! ```
//!
//! Ids are `v{seq:04}-{YYYYmmddTHHMMSSZ}`; the sequence keeps ids ordered
//! even when two runs share a timestamp.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::DashboardError;
use super::snapshot::{DashboardEntry, DashboardSnapshot};
use crate::store::write_atomic;

pub const CURRENT: &str = "current";

#[derive(Debug, Clone, PartialEq)]
pub struct VersionInfo {
    pub id: String,
    pub sequence: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub workbook: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedVersion {
    pub id: String,
    pub workbook: PathBuf,
    pub current: PathBuf,
}

pub struct VersionStore {
    dir: PathBuf,
}

impl VersionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.dir.join("versions")
    }

    pub fn current_workbook(&self) -> PathBuf {
        self.dir.join(format!("{CURRENT}.xlsx"))
    }

    fn current_snapshot(&self) -> PathBuf {
        self.dir.join(format!("{CURRENT}.json"))
    }

    /// Every stored version, oldest first.
    pub fn list(&self) -> Result<Vec<VersionInfo>, DashboardError> {
        let dir = self.versions_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let read = fs::read_dir(&dir).map_err(|source| DashboardError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut out = Vec::new();
        for item in read {
            let item = item.map_err(|source| DashboardError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(sequence) = parse_sequence(id) else {
                tracing::debug!(path = %path.display(), "ignoring unrecognized file in version history");
                continue;
            };
            out.push(VersionInfo {
                id: id.to_string(),
                sequence,
                created_at: parse_timestamp(id),
                workbook: dir.join(format!("{id}.xlsx")),
            });
        }
        out.sort_by_key(|v| v.sequence);
        Ok(out)
    }

    /// Assign the next version id to a new snapshot.
    pub fn prepare(
        &self,
        title: &str,
        lags: usize,
        entries: Vec<DashboardEntry>,
        created_at: DateTime<Utc>,
    ) -> Result<DashboardSnapshot, DashboardError> {
        let mut latest = self.list()?.last().map_or(0, |v| v.sequence);
        if self.current_snapshot().exists() {
            latest = latest.max(read_snapshot(&self.current_snapshot())?.sequence);
        }
        let sequence = latest + 1;
        Ok(DashboardSnapshot {
            version: version_id(sequence, created_at),
            sequence,
            created_at,
            title: title.to_string(),
            lags,
            entries,
        })
    }

    /// Store a new version and point `current` at it.
    ///
    /// The version files are written create-new, so an existing version is
    /// never touched. If `current` belongs to a version missing from the
    /// history it is archived first.
    pub fn publish(&self, snapshot: &DashboardSnapshot, workbook: &[u8]) -> Result<PublishedVersion, DashboardError> {
        let versions_dir = self.versions_dir();
        fs::create_dir_all(&versions_dir).map_err(|source| DashboardError::Io {
            path: versions_dir.clone(),
            source,
        })?;

        self.archive_current()?;

        let json = serde_json::to_vec_pretty(snapshot).map_err(|source| DashboardError::Snapshot {
            path: self.current_snapshot(),
            source,
        })?;

        let workbook_path = versions_dir.join(format!("{}.xlsx", snapshot.version));
        let snapshot_path = versions_dir.join(format!("{}.json", snapshot.version));
        // The snapshot goes last: a version is listed only once both files exist.
        create_new(&workbook_path, workbook, &snapshot.version)?;
        if let Err(err) = create_new(&snapshot_path, &json, &snapshot.version) {
            // An unlisted workbook would block this sequence number forever.
            if let Err(cleanup) = fs::remove_file(&workbook_path) {
                tracing::warn!(path = %workbook_path.display(), error = %cleanup, "failed to remove partial version");
            }
            return Err(err);
        }

        let current = self.current_workbook();
        replace(&current, workbook)?;
        replace(&self.current_snapshot(), &json)?;

        tracing::info!(
            version = %snapshot.version,
            rows = snapshot.entries.len(),
            errors = snapshot.errors().count(),
            path = %workbook_path.display(),
            "dashboard version written"
        );

        Ok(PublishedVersion {
            id: snapshot.version.clone(),
            workbook: workbook_path,
            current,
        })
    }

    /// Load a version's snapshot by id, or `current`.
    pub fn load(&self, id: &str) -> Result<DashboardSnapshot, DashboardError> {
        let path = if id == CURRENT {
            self.current_snapshot()
        } else if is_version_id(id) {
            self.versions_dir().join(format!("{id}.json"))
        } else {
            return Err(DashboardError::UnknownVersion(id.to_string()));
        };
        if !path.exists() {
            return Err(DashboardError::UnknownVersion(id.to_string()));
        }
        read_snapshot(&path)
    }

    fn archive_current(&self) -> Result<(), DashboardError> {
        let current_json = self.current_snapshot();
        if !current_json.exists() {
            return Ok(());
        }
        let snapshot = read_snapshot(&current_json)?;
        let archived = self.versions_dir().join(format!("{}.json", snapshot.version));
        if archived.exists() {
            return Ok(());
        }

        tracing::warn!(version = %snapshot.version, "archiving current dashboard missing from history");
        let current_xlsx = self.current_workbook();
        let target = self.versions_dir().join(format!("{}.xlsx", snapshot.version));
        if current_xlsx.exists() && !target.exists() {
            let bytes = fs::read(&current_xlsx).map_err(|source| DashboardError::Io {
                path: current_xlsx.clone(),
                source,
            })?;
            create_new(&target, &bytes, &snapshot.version)?;
        }
        let bytes = fs::read(&current_json).map_err(|source| DashboardError::Io {
            path: current_json.clone(),
            source,
        })?;
        create_new(&archived, &bytes, &snapshot.version)
    }
}

pub fn version_id(sequence: u32, created_at: DateTime<Utc>) -> String {
    format!("v{sequence:04}-{}", created_at.format("%Y%m%dT%H%M%SZ"))
}

/// Whether `id` has the `v{seq}-{timestamp}` shape and names nothing outside
/// the versions directory.
fn is_version_id(id: &str) -> bool {
    parse_sequence(id).is_some() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn parse_sequence(id: &str) -> Option<u32> {
    let (seq, _) = id.strip_prefix('v')?.split_once('-')?;
    seq.parse().ok()
}

fn parse_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let (_, stamp) = id.split_once('-')?;
    chrono::NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%SZ")
        .ok()
        .map(|t| t.and_utc())
}

fn read_snapshot(path: &Path) -> Result<DashboardSnapshot, DashboardError> {
    let raw = fs::read_to_string(path).map_err(|source| DashboardError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| DashboardError::Snapshot {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a file that must not exist yet.
fn create_new(path: &Path, bytes: &[u8], version: &str) -> Result<(), DashboardError> {
    let io_err = |source| DashboardError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(DashboardError::VersionExists(version.to_string()));
        }
        Err(err) => return Err(io_err(err)),
    };
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)
}

fn replace(path: &Path, bytes: &[u8]) -> Result<(), DashboardError> {
    write_atomic(path, bytes).map_err(|source| DashboardError::Io {
        path: path.to_path_buf(),
        source,
    })
}
