//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - sampling frequencies and their period arithmetic (`Frequency`)
//! - observations and per-series fetch outcomes (`Observation`, `FetchOutcome`)
//! - the store's gap policy (`GapPolicy`)

pub mod types;

pub use types::*;
