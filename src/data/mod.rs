//! Upstream data: the FRED client and the batch fetcher.

pub mod fetcher;
pub mod fred;
pub mod source;

pub use fetcher::{FetchReport, FetchRequest, Fetcher, RetryPolicy, SeriesFetch};
pub use fred::FredClient;
pub use source::{FetchError, SeriesSource};
