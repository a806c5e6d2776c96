//! tidewatch-loadgen — synthetic HTTP traffic at a target aggregate rate.
//!
//! # Architecture
//!
//! ```text
//! LoadGenerator
//!   ├── split_rate(rps, workers) → per-worker rates
//!   ├── Worker × N (one task each)
//!   │   ├── batch of `rate` GETs per second, each bounded by the timeout
//!   │   └── StatsAggregator::record(RequestResult)
//!   ├── Reporter task (cumulative status every interval)
//!   └── ShutdownSignal observed at every loop boundary
//! ```
//!
//! Rate control is approximate: each worker fires its batch back-to-back
//! and sleeps out the rest of the second. Bursts within a second are
//! expected.

pub mod fetch;
pub mod generator;
pub mod reporter;
pub mod scheduler;
pub mod stats;
pub mod target;
pub mod worker;

pub use fetch::{ErrorKind, Fetch, FetchError, FetchResponse, HttpFetcher, RequestResult};
pub use generator::{LoadGenerator, LoadPlan, LoadReport};
pub use reporter::{StatusLine, run_reporter};
pub use scheduler::{split_rate, tick_interval};
pub use stats::{AggregateStats, FinalSummary, LatencySummary, StatsAggregator};
pub use target::normalize_target;
pub use worker::{Worker, WorkerReport};
