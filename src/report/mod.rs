//! Formatted terminal output.
//!
//! Formatting lives in one place so the pipeline code stays free of
//! presentation and output changes stay localized.

use crate::app::pipeline::RunOutput;
use crate::dashboard::{DashboardSnapshot, VersionInfo};
use crate::store::{SeriesStatus, StoreOutcome};

/// Per-series outcome of a run, then the dashboard version written.
pub fn format_run_summary(run: &RunOutput) -> String {
    let mut out = String::new();

    out.push_str("=== macrodash ===\n");

    if let Some(fetch_store) = &run.fetch_store {
        out.push_str(&format!(
            "Fetched: {} ok, {} failed\n",
            fetch_store.fetches.succeeded(),
            fetch_store.fetches.failed()
        ));
        out.push('\n');
        out.push_str(&format!("{:<22} {:<4} {}\n", "Series", "Freq", "Result"));
        for result in &fetch_store.store.results {
            out.push_str(&format!(
                "{:<22} {:<4} {}\n",
                result.series_id,
                result.frequency.code(),
                describe_outcome(&result.outcome)
            ));
        }
        out.push('\n');
    }

    match &run.dashboard {
        Some(Ok(dashboard)) => {
            out.push_str(&format!("Dashboard: {}\n", dashboard.published.id));
            out.push_str(&format!("  workbook: {}\n", dashboard.published.workbook.display()));
            out.push_str(&format!("  current : {}\n", dashboard.published.current.display()));
            for (frequency, err) in &dashboard.unreadable {
                out.push_str(&format!("  UNREADABLE {}: {err}\n", frequency.code()));
            }
            for (series_id, err) in &dashboard.errors {
                out.push_str(&format!("  ERR {series_id}: {err}\n"));
            }
        }
        Some(Err(err)) => out.push_str(&format!("Dashboard: FAILED ({err})\n")),
        None => {}
    }

    out
}

fn describe_outcome(outcome: &StoreOutcome) -> String {
    match outcome {
        StoreOutcome::Merged(stats) => {
            let mut text = format!(
                "+{} new, {} revised, {} unchanged",
                stats.inserted, stats.updated, stats.unchanged
            );
            if stats.filled > 0 {
                text.push_str(&format!(", {} gaps marked", stats.filled));
            }
            text
        }
        StoreOutcome::NoNewData => "no new data".to_string(),
        StoreOutcome::Derived { values } => format!("derived ({values} values)"),
        StoreOutcome::FetchFailed(err) => format!("FAILED: {err}"),
        StoreOutcome::WriteFailed(err) => format!("WRITE FAILED: {err}"),
    }
}

/// Table of stored series.
pub fn format_status(rows: &[SeriesStatus]) -> String {
    if rows.is_empty() {
        return "No datasets stored yet.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<4} {:<22} {:>6} {:<10} {:<10} {}\n",
        "Freq", "Series", "Obs", "First", "Last", "Fetched"
    ));
    for row in rows {
        out.push_str(&format!(
            "{:<4} {:<22} {:>6} {:<10} {:<10} {}\n",
            row.frequency.code(),
            row.series_id,
            row.observations,
            fmt_opt(row.first_date),
            fmt_opt(row.last_date),
            row.last_fetched_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        ));
    }
    out
}

pub fn format_versions(versions: &[VersionInfo]) -> String {
    if versions.is_empty() {
        return "No dashboard versions yet.\n".to_string();
    }

    let mut out = String::new();
    for version in versions {
        let created = version
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default();
        out.push_str(&format!("{:<26} {created}\n", version.id));
    }
    out
}

/// One dashboard version as a plain-text table.
pub fn format_snapshot(snapshot: &DashboardSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} ({})\n", snapshot.title, snapshot.version));
    out.push_str(&format!(
        "Created: {}\n\n",
        snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    let mut header = format!(
        "{:<28} {:<18} {:<4} {:<12} {:<12} {:>12}",
        "Indicator", "Series", "Freq", "Latest Date", "Released", "Present"
    );
    for k in 1..=snapshot.lags {
        header.push_str(&format!(" {:>12}", format!("Lag {k}")));
    }
    out.push_str(header.trim_end());
    out.push('\n');

    let mut section: Option<&str> = None;
    for entry in &snapshot.entries {
        if section != Some(entry.section.as_str()) {
            out.push_str(&format!("[{}]\n", entry.section));
            section = Some(entry.section.as_str());
        }

        let freq = entry.frequency.map(|f| f.code()).unwrap_or("");
        if let Some(err) = &entry.error {
            out.push_str(&format!(
                "{:<28} {:<18} {:<4} ERR: {err}\n",
                entry.label, entry.series_id, freq
            ));
            continue;
        }

        let mut line = format!(
            "{:<28} {:<18} {:<4} {:<12} {:<12} {:>12}",
            entry.label,
            entry.series_id,
            freq,
            fmt_opt(entry.latest_date),
            fmt_opt(entry.released),
            fmt_value(entry.present)
        );
        for lag in &entry.lags {
            line.push_str(&format!(" {:>12}", fmt_value(*lag)));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn fmt_value(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::dashboard::DashboardEntry;
    use crate::domain::Frequency;

    #[test]
    fn snapshot_table_shows_values_and_errors() {
        let snapshot = DashboardSnapshot {
            version: "v0003-20240601T120000Z".into(),
            sequence: 3,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            title: "Economic Dashboard".into(),
            lags: 1,
            entries: vec![
                DashboardEntry {
                    section: "Rates".into(),
                    label: "10Y".into(),
                    series_id: "DGS10".into(),
                    units: "%".into(),
                    frequency: Some(Frequency::Daily),
                    latest_date: NaiveDate::from_ymd_opt(2024, 5, 31),
                    released: NaiveDate::from_ymd_opt(2024, 6, 3),
                    present: Some(4.5),
                    lags: vec![Some(4.55)],
                    error: None,
                },
                DashboardEntry {
                    section: "Rates".into(),
                    label: "Gone".into(),
                    series_id: "NOPE".into(),
                    units: String::new(),
                    frequency: None,
                    latest_date: None,
                    released: None,
                    present: None,
                    lags: vec![None],
                    error: Some("series NOPE not found in any dataset".into()),
                },
            ],
        };

        let text = format_snapshot(&snapshot);

        assert!(text.starts_with("Economic Dashboard (v0003-20240601T120000Z)\n"));
        assert!(text.contains("[Rates]\n"));
        assert!(text.contains("2024-05-31"));
        assert!(text.contains("2024-06-03"));
        assert!(text.contains("4.5000"));
        assert!(text.contains("4.5500"));
        assert!(text.contains("ERR: series NOPE not found in any dataset"));
    }

    #[test]
    fn empty_status_has_a_message() {
        assert_eq!(format_status(&[]), "No datasets stored yet.\n");
    }
}
