//! End-to-end pipeline runs against an in-memory source.

mod common;

use std::fs;

use common::{MemorySource, at, config_in, d, obs};
use macrodash::app::pipeline::{FetchOptions, run_dashboard, run_fetch_store, run_update};
use macrodash::dashboard::VersionStore;
use macrodash::data::FetchError;
use macrodash::domain::{Frequency, GapPolicy, Observation};
use macrodash::error::{EXIT_PARTIAL, EXIT_WRITE};
use macrodash::store::{FrequencyStore, StoreOutcome};

const CONFIG: &str = r#"
[[series]]
id = "UNRATE"
frequency = "M"

[[series]]
id = "DGS10"
frequency = "D"

[[dashboard.sections]]
title = "Labor"
rows = [ { label = "Unemployment", series = "UNRATE", units = "%" } ]

[[dashboard.sections]]
title = "Rates"
rows = [ { label = "10Y Treasury", series = "DGS10", units = "%" } ]
"#;

fn options(policy: GapPolicy) -> FetchOptions {
    FetchOptions {
        gap_policy: policy,
        jobs: 1,
        full: false,
    }
}

fn unrate() -> Vec<Observation> {
    vec![obs(d(2024, 1, 1), 3.7), obs(d(2024, 2, 1), 3.9), obs(d(2024, 3, 1), 3.8)]
}

fn dgs10() -> Vec<Observation> {
    vec![
        obs(d(2024, 2, 28), 4.27),
        obs(d(2024, 2, 29), 4.25),
        Observation::new(d(2024, 3, 1), None),
    ]
}

#[test]
fn refetching_identical_data_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), CONFIG);
    let source = MemorySource::new().with_series("UNRATE", unrate()).with_series("DGS10", dgs10());
    let store = FrequencyStore::new(&config.store.data_dir);

    run_fetch_store(&config, &source, &options(GapPolicy::Omit), at(1, 9));
    let first_csv = fs::read(store.values_path(Frequency::Monthly)).unwrap();
    let first = store.load(Frequency::Monthly).unwrap();

    let run = run_fetch_store(&config, &source, &options(GapPolicy::Omit), at(2, 9));

    assert!(run.store.results.iter().all(|r| r.outcome == StoreOutcome::NoNewData));
    assert_eq!(fs::read(store.values_path(Frequency::Monthly)).unwrap(), first_csv);
    let second = store.load(Frequency::Monthly).unwrap();
    assert_eq!(second.observations("UNRATE"), first.observations("UNRATE"));

    // A full refetch rewrites the same values.
    let full = FetchOptions {
        full: true,
        ..options(GapPolicy::Omit)
    };
    run_fetch_store(&config, &source, &full, at(3, 9));
    assert_eq!(fs::read(store.values_path(Frequency::Monthly)).unwrap(), first_csv);
}

#[test]
fn incremental_fetch_appends_after_last_recorded_date() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(
        dir.path(),
        r#"
[[series]]
id = "X"
frequency = "D"
"#,
    );
    let source = MemorySource::new().with_series("X", vec![obs(d(2023, 1, 30), 8.0), obs(d(2023, 1, 31), 9.0)]);
    run_fetch_store(&config, &source, &options(GapPolicy::Omit), at(1, 9));

    source.set_series(
        "X",
        vec![
            obs(d(2023, 1, 30), 8.0),
            obs(d(2023, 1, 31), 9.0),
            obs(d(2023, 2, 1), 10.0),
            obs(d(2023, 2, 2), 11.0),
        ],
    );
    run_fetch_store(&config, &source, &options(GapPolicy::Omit), at(2, 9));

    let calls = source.observation_calls();
    assert_eq!(calls.last().unwrap(), &("X".to_string(), Some(d(2023, 2, 1))));

    let dataset = FrequencyStore::new(&config.store.data_dir).load(Frequency::Daily).unwrap();
    assert_eq!(dataset.last_date("X"), Some(d(2023, 2, 2)));
    assert_eq!(
        dataset.observations("X").unwrap(),
        vec![
            obs(d(2023, 1, 30), 8.0),
            obs(d(2023, 1, 31), 9.0),
            obs(d(2023, 2, 1), 10.0),
            obs(d(2023, 2, 2), 11.0),
        ]
    );
}

#[test]
fn calendar_gaps_follow_the_gap_policy() {
    let history = vec![obs(d(2024, 1, 1), 3.7), obs(d(2024, 4, 1), 3.9)];

    for (policy, expected) in [
        (GapPolicy::Omit, "date,UNRATE\n2024-01-01,3.7\n2024-04-01,3.9\n"),
        (
            GapPolicy::Placeholder,
            "date,UNRATE\n2024-01-01,3.7\n2024-02-01,.\n2024-03-01,.\n2024-04-01,3.9\n",
        ),
    ] {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(
            dir.path(),
            r#"
[[series]]
id = "UNRATE"
frequency = "M"
"#,
        );
        let source = MemorySource::new().with_series("UNRATE", history.clone());

        let run = run_update(&config, &source, &options(policy), at(1, 9));

        assert!(run.status().is_ok(), "{policy:?}");
        let csv = fs::read_to_string(FrequencyStore::new(&config.store.data_dir).values_path(Frequency::Monthly))
            .unwrap();
        assert_eq!(csv, expected, "{policy:?}");
    }
}

#[test]
fn failing_series_does_not_block_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(
        dir.path(),
        r#"
[fred]
max_attempts = 3

[[series]]
id = "UNRATE"
frequency = "M"

[[series]]
id = "GONE"
frequency = "M"

[[series]]
id = "DGS10"
frequency = "D"

[[dashboard.sections]]
title = "Mixed"
rows = [
    { label = "Unemployment", series = "UNRATE" },
    { label = "Removed", series = "GONE" },
    { label = "10Y Treasury", series = "DGS10" },
]
"#,
    );
    let source = MemorySource::new().with_series("UNRATE", unrate()).with_series("DGS10", dgs10());
    source.fail_with("DGS10", vec![FetchError::Network("connection reset".into())]);

    let run = run_update(&config, &source, &options(GapPolicy::Omit), at(1, 9));

    let fetches = &run.fetch_store.as_ref().unwrap().fetches;
    assert_eq!(fetches.succeeded(), 2);
    let dgs10_fetch = fetches.results.iter().find(|r| r.spec.id == "DGS10").unwrap();
    assert_eq!(dgs10_fetch.attempts, 3);

    let failed: Vec<&str> = run.failed_series().into_iter().collect();
    assert_eq!(failed, vec!["GONE"]);
    assert_eq!(run.status().unwrap_err().exit_code(), EXIT_PARTIAL);

    let snapshot = VersionStore::new(&config.dashboard.dir).load("current").unwrap();
    let row = |id: &str| snapshot.entries.iter().find(|e| e.series_id == id).unwrap();
    assert_eq!(row("UNRATE").present, Some(3.8));
    assert_eq!(row("DGS10").present, Some(4.25));
    assert_eq!(row("DGS10").latest_date, Some(d(2024, 2, 29)));
    assert!(row("GONE").error.as_deref().unwrap().contains("not found"));
}

#[test]
fn new_dashboard_version_keeps_the_prior_one() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), CONFIG);
    let source = MemorySource::new().with_series("UNRATE", unrate()).with_series("DGS10", dgs10());

    let first = run_update(&config, &source, &options(GapPolicy::Omit), at(1, 9));
    let first_id = first.dashboard.unwrap().unwrap().published.id;
    let versions = VersionStore::new(&config.dashboard.dir);
    let first_snapshot = versions.load(&first_id).unwrap();
    let first_workbook = fs::read(versions.versions_dir().join(format!("{first_id}.xlsx"))).unwrap();

    let mut newer = unrate();
    newer.push(obs(d(2024, 4, 1), 3.9));
    source.set_series("UNRATE", newer);
    let second = run_update(&config, &source, &options(GapPolicy::Omit), at(2, 9));
    let second_id = second.dashboard.unwrap().unwrap().published.id;

    assert_ne!(first_id, second_id);
    let listed: Vec<String> = versions.list().unwrap().into_iter().map(|v| v.id).collect();
    assert_eq!(listed, vec![first_id.clone(), second_id.clone()]);
    assert_eq!(versions.load(&first_id).unwrap(), first_snapshot);
    assert_eq!(
        fs::read(versions.versions_dir().join(format!("{first_id}.xlsx"))).unwrap(),
        first_workbook
    );

    let current = versions.load("current").unwrap();
    assert_eq!(current.version, second_id);
    let unrate_row = current.entries.iter().find(|e| e.series_id == "UNRATE").unwrap();
    assert_eq!(unrate_row.present, Some(3.9));
    assert_eq!(unrate_row.lags[0], Some(3.8));
}

#[test]
fn derived_series_are_recomputed_after_merge() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(
        dir.path(),
        r#"
[[series]]
id = "CES0500000003"
frequency = "M"

[[series]]
id = "PCEPI"
frequency = "M"

[[derived]]
id = "RCES0500000003*"
frequency = "M"
numerator = "CES0500000003"
deflator = "PCEPI"
"#,
    );
    let source = MemorySource::new()
        .with_series("CES0500000003", vec![obs(d(2024, 1, 1), 34.5), obs(d(2024, 2, 1), 34.6)])
        .with_series("PCEPI", vec![obs(d(2024, 1, 1), 115.0)]);

    let run = run_update(&config, &source, &options(GapPolicy::Omit), at(1, 9));

    assert!(run.status().is_ok());
    let dataset = FrequencyStore::new(&config.store.data_dir).load(Frequency::Monthly).unwrap();
    let real = dataset.observations("RCES0500000003*").unwrap();
    assert_eq!(real.len(), 1);
    assert!((real[0].value.unwrap() - 30.0).abs() < 1e-9);

    let snapshot = VersionStore::new(&config.dashboard.dir).load("current").unwrap();
    assert!(snapshot.entries.iter().any(|e| e.series_id == "RCES0500000003*" && e.error.is_none()));
}

#[test]
fn unwritable_store_is_a_write_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), CONFIG);
    // A plain file where the data directory should be.
    fs::write(&config.store.data_dir, "not a directory").unwrap();
    let source = MemorySource::new().with_series("UNRATE", unrate()).with_series("DGS10", dgs10());

    let run = run_update(&config, &source, &options(GapPolicy::Omit), at(1, 9));

    assert!(run.fetch_store.as_ref().unwrap().store.has_write_failures());
    assert_eq!(run.status().unwrap_err().exit_code(), EXIT_WRITE);
    assert_eq!(fs::read_to_string(&config.store.data_dir).unwrap(), "not a directory");
}

#[test]
fn dashboard_from_an_empty_store_reports_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), CONFIG);

    let run = run_dashboard(&config, at(1, 9)).unwrap();

    assert_eq!(run.errors.len(), 2);
    assert!(run.published.workbook.exists());
    assert!(run.published.current.exists());
}

#[test]
fn unreadable_dataset_fails_only_its_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), CONFIG);
    let store = FrequencyStore::new(&config.store.data_dir);
    fs::create_dir_all(&config.store.data_dir).unwrap();
    let corrupt = "date,DGS10\n2024-01-03,4.0\n2024-01-02,3.9\n";
    fs::write(store.values_path(Frequency::Daily), corrupt).unwrap();
    let source = MemorySource::new().with_series("UNRATE", unrate()).with_series("DGS10", dgs10());

    let run = run_update(&config, &source, &options(GapPolicy::Omit), at(1, 9));

    let dashboard = run.dashboard.as_ref().unwrap().as_ref().unwrap();
    assert_eq!(dashboard.unreadable.len(), 1);
    assert_eq!(dashboard.unreadable[0].0, Frequency::Daily);
    assert_eq!(run.status().unwrap_err().exit_code(), EXIT_WRITE);
    assert_eq!(fs::read_to_string(store.values_path(Frequency::Daily)).unwrap(), corrupt);

    let snapshot = VersionStore::new(&config.dashboard.dir).load("current").unwrap();
    assert_eq!(snapshot.version, dashboard.published.id);
    let row = |id: &str| snapshot.entries.iter().find(|e| e.series_id == id).unwrap();
    assert_eq!(row("UNRATE").present, Some(3.8));
    assert!(row("UNRATE").error.is_none());
    let dgs10_err = row("DGS10").error.as_deref().unwrap();
    assert!(dgs10_err.starts_with("Daily dataset unreadable"), "{dgs10_err}");
    assert!(dgs10_err.contains("strictly increasing"), "{dgs10_err}");
}

#[test]
fn dashboard_write_failure_outranks_series_failures() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(
        dir.path(),
        r#"
[[series]]
id = "UNRATE"
frequency = "M"

[[series]]
id = "GONE"
frequency = "M"
"#,
    );
    // A plain file where the dashboard directory should be.
    fs::write(&config.dashboard.dir, "not a directory").unwrap();
    let source = MemorySource::new().with_series("UNRATE", unrate());

    let run = run_update(&config, &source, &options(GapPolicy::Omit), at(1, 9));

    assert!(matches!(run.dashboard, Some(Err(_))));
    assert!(run.failed_series().contains("GONE"));
    assert_eq!(run.status().unwrap_err().exit_code(), EXIT_WRITE);

    let csv = fs::read_to_string(FrequencyStore::new(&config.store.data_dir).values_path(Frequency::Monthly)).unwrap();
    assert_eq!(csv, "date,UNRATE\n2024-01-01,3.7\n2024-02-01,3.9\n2024-03-01,3.8\n");
    assert_eq!(fs::read_to_string(&config.dashboard.dir).unwrap(), "not a directory");
}

#[test]
fn release_dates_reach_the_store_and_the_dashboard() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), CONFIG);
    let released = vec![
        obs(d(2024, 1, 1), 3.7).released_on(d(2024, 2, 2)),
        obs(d(2024, 2, 1), 3.9).released_on(d(2024, 3, 8)),
        obs(d(2024, 3, 1), 3.8).released_on(d(2024, 4, 5)),
    ];
    let source = MemorySource::new().with_series("UNRATE", released).with_series("DGS10", dgs10());

    let run = run_update(&config, &source, &options(GapPolicy::Omit), at(1, 9));

    assert!(run.status().is_ok());
    let store = FrequencyStore::new(&config.store.data_dir);
    assert_eq!(
        fs::read_to_string(store.dates_path(Frequency::Monthly)).unwrap(),
        "date,UNRATE\n2024-01-01,2024-02-02\n2024-02-01,2024-03-08\n2024-03-01,2024-04-05\n"
    );

    let snapshot = VersionStore::new(&config.dashboard.dir).load("current").unwrap();
    let row = |id: &str| snapshot.entries.iter().find(|e| e.series_id == id).unwrap();
    assert_eq!(row("UNRATE").latest_date, Some(d(2024, 3, 1)));
    assert_eq!(row("UNRATE").released, Some(d(2024, 4, 5)));
    assert_eq!(row("DGS10").released, None);
}
