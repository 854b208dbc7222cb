//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - loads the run configuration
//! - runs the fetch/store/dashboard pipeline
//! - prints summaries and maps outcomes to exit codes

use chrono::Utc;
use clap::Parser;

use crate::cli::{Cli, Command, FetchArgs, LogFormat, ShowArgs};
use crate::config::{Config, load_config};
use crate::dashboard::VersionStore;
use crate::data::FredClient;
use crate::error::{AppError, EXIT_CONFIG};
use crate::store::FrequencyStore;

pub mod pipeline;

use pipeline::{FetchOptions, RunOutput};

const SUBCOMMANDS: [&str; 7] = ["update", "fetch", "dashboard", "status", "versions", "show", "help"];

/// Entry point for the `macrodash` binary.
pub fn run() -> Result<(), AppError> {
    // A bare `macrodash` (or one with only flags) means `macrodash update`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = Cli::parse_from(argv);
    init_tracing(&cli.log_level, cli.log_format)?;

    let config = load_config(&cli.config)?;
    tracing::debug!(config = %cli.config.display(), series = config.series.len(), "config loaded");

    match cli.command {
        Command::Update(args) => handle_update(&config, &args),
        Command::Fetch(args) => handle_fetch(&config, &args),
        Command::Dashboard => handle_dashboard(&config),
        Command::Status => handle_status(&config),
        Command::Versions => handle_versions(&config),
        Command::Show(args) => handle_show(&config, &args),
    }
}

/// Install the global `tracing` subscriber. Logs go to stderr so stdout
/// carries only the human-facing summaries.
pub fn init_tracing(log_level: &str, log_format: LogFormat) -> Result<(), AppError> {
    let filter = std::env::var("MACRODASH_LOG").unwrap_or_else(|_| log_level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|err| AppError::new(EXIT_CONFIG, format!("invalid log filter: {err}")))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let installed = match log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|err| AppError::new(EXIT_CONFIG, format!("failed to initialize logging: {err}")))
}

fn handle_update(config: &Config, args: &FetchArgs) -> Result<(), AppError> {
    let client = FredClient::from_config(&config.fred)?;
    let options = fetch_options(config, args);

    let run = pipeline::run_update(config, &client, &options, Utc::now());

    println!("{}", crate::report::format_run_summary(&run));
    run.status()
}

fn handle_fetch(config: &Config, args: &FetchArgs) -> Result<(), AppError> {
    let client = FredClient::from_config(&config.fred)?;
    let options = fetch_options(config, args);

    let run = RunOutput {
        fetch_store: Some(pipeline::run_fetch_store(config, &client, &options, Utc::now())),
        dashboard: None,
    };

    println!("{}", crate::report::format_run_summary(&run));
    run.status()
}

fn handle_dashboard(config: &Config) -> Result<(), AppError> {
    let dashboard = pipeline::run_dashboard(config, Utc::now())?;
    let run = RunOutput {
        fetch_store: None,
        dashboard: Some(Ok(dashboard)),
    };

    println!("{}", crate::report::format_run_summary(&run));
    run.status()
}

fn handle_status(config: &Config) -> Result<(), AppError> {
    let rows = FrequencyStore::new(&config.store.data_dir).status()?;
    print!("{}", crate::report::format_status(&rows));
    Ok(())
}

fn handle_versions(config: &Config) -> Result<(), AppError> {
    let versions = VersionStore::new(&config.dashboard.dir).list()?;
    print!("{}", crate::report::format_versions(&versions));
    Ok(())
}

fn handle_show(config: &Config, args: &ShowArgs) -> Result<(), AppError> {
    let snapshot = VersionStore::new(&config.dashboard.dir).load(&args.version)?;
    print!("{}", crate::report::format_snapshot(&snapshot));
    Ok(())
}

/// Config values with CLI overrides applied.
pub fn fetch_options(config: &Config, args: &FetchArgs) -> FetchOptions {
    let mut options = FetchOptions::from_config(config);
    if let Some(policy) = args.gap_policy {
        options.gap_policy = policy;
    }
    options.jobs = args.jobs.max(1);
    options.full = args.full;
    options
}

/// Rewrite argv so `macrodash` defaults to `macrodash update`.
///
/// Rules:
/// - `macrodash`                       -> `macrodash update`
/// - `macrodash --jobs 4 ...`          -> `macrodash update --jobs 4 ...`
/// - `macrodash --help/--version/-h`   -> unchanged
/// - any argv naming a subcommand      -> unchanged
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1) else {
        argv.push("update".to_string());
        return argv;
    };

    if matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version") {
        return argv;
    }
    if argv.iter().skip(1).any(|a| SUBCOMMANDS.contains(&a.as_str())) {
        return argv;
    }

    argv.insert(1, "update".to_string());
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GapPolicy;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_runs_update() {
        assert_eq!(rewrite_args(args(&["macrodash"])), args(&["macrodash", "update"]));
        assert_eq!(
            rewrite_args(args(&["macrodash", "--jobs", "4"])),
            args(&["macrodash", "update", "--jobs", "4"])
        );
    }

    #[test]
    fn explicit_subcommands_and_help_are_untouched() {
        let status = args(&["macrodash", "--config", "x.toml", "status"]);
        assert_eq!(rewrite_args(status.clone()), status);
        let help = args(&["macrodash", "--help"]);
        assert_eq!(rewrite_args(help.clone()), help);
    }

    #[test]
    fn cli_flags_override_config() {
        let config: Config = toml::from_str(
            r#"
[store]
gap_policy = "omit"

[[series]]
id = "UNRATE"
frequency = "M"
"#,
        )
        .unwrap();
        let cli_args = FetchArgs {
            gap_policy: Some(GapPolicy::Placeholder),
            jobs: 0,
            full: true,
        };

        let options = fetch_options(&config, &cli_args);

        assert_eq!(options.gap_policy, GapPolicy::Placeholder);
        assert_eq!(options.jobs, 1);
        assert!(options.full);
    }
}
