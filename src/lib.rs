//! `macrodash` library crate.
//!
//! The binary is a thin wrapper around this library so that:
//!
//! - the fetch, store and dashboard stages are testable without spawning processes
//! - the pipeline can run against any `SeriesSource`
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod domain;
pub mod error;
pub mod report;
pub mod store;
