//! Stats aggregator — concurrent accumulation of request outcomes.
//!
//! Counters are atomics; the running latency summary and per-kind error
//! counts sit behind a mutex held only for a constant-size update. No lock
//! is held across a request, and a snapshot copies a fixed amount of state
//! however long the run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::fetch::{ErrorKind, RequestResult};

#[derive(Default)]
struct Detail {
    latency: LatencySummary,
    error_counts: BTreeMap<ErrorKind, u64>,
}

/// Running latency aggregate over successful requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySummary {
    pub count: u64,
    pub total: Duration,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

impl LatencySummary {
    pub fn record(&mut self, latency: Duration) {
        self.count += 1;
        self.total = self.total.saturating_add(latency);
        self.min = Some(self.min.map_or(latency, |m| m.min(latency)));
        self.max = Some(self.max.map_or(latency, |m| m.max(latency)));
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        let nanos = self.total.as_nanos() / u128::from(self.count);
        Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }
}

pub struct StatsAggregator {
    total: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
    bytes_received: AtomicU64,
    detail: Mutex<Detail>,
    start_time: Instant,
    end_time: OnceLock<Instant>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    /// Start a new aggregation window at the current instant.
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            detail: Mutex::new(Detail::default()),
            start_time: Instant::now(),
            end_time: OnceLock::new(),
        }
    }

    /// Record one request outcome. Results arriving after [`finish`] are
    /// dropped and `false` is returned.
    ///
    /// [`finish`]: StatsAggregator::finish
    pub async fn record(&self, result: RequestResult) -> bool {
        if self.is_finished() {
            debug!(success = result.success, "result arrived after stop, dropped");
            return false;
        }

        self.total.fetch_add(1, Ordering::Relaxed);
        if result.success {
            self.success.fetch_add(1, Ordering::Relaxed);
            self.bytes_received
                .fetch_add(result.content_length, Ordering::Relaxed);
            self.detail.lock().await.latency.record(result.latency);
        } else {
            self.failure.fetch_add(1, Ordering::Relaxed);
            let kind = result.error_kind.unwrap_or(ErrorKind::Other);
            *self.detail.lock().await.error_counts.entry(kind).or_insert(0) += 1;
        }
        true
    }

    /// Freeze the window. Only the first call sets the end time.
    pub fn finish(&self) {
        let _ = self.end_time.set(Instant::now());
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.get().is_some()
    }

    pub fn total_requests(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Point-in-time copy for reporting.
    pub async fn snapshot(&self) -> AggregateStats {
        let detail = self.detail.lock().await;
        let latency = detail.latency;
        let error_counts = detail.error_counts.clone();
        drop(detail);

        AggregateStats {
            total_requests: self.total.load(Ordering::Relaxed),
            success_count: self.success.load(Ordering::Relaxed),
            failure_count: self.failure.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            latency,
            error_counts,
            start_time: self.start_time,
            end_time: self.end_time.get().copied(),
        }
    }
}

/// A consistent-enough copy of the aggregate; reads between fields may be
/// slightly skewed while workers are still running.
#[derive(Debug, Clone)]
pub struct AggregateStats {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub bytes_received: u64,
    pub latency: LatencySummary,
    pub error_counts: BTreeMap<ErrorKind, u64>,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
}

impl AggregateStats {
    /// Time from start to the end time, or to now while still running.
    pub fn elapsed(&self) -> Duration {
        self.end_time
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.start_time)
    }

    /// Cumulative requests per second since start.
    pub fn requests_per_second(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.total_requests as f64 / secs
        } else {
            0.0
        }
    }

    /// Percentage of requests that succeeded; 0 when none were sent.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_requests as f64 * 100.0
        }
    }

    pub fn mean_latency(&self) -> Option<Duration> {
        self.latency.mean()
    }

    pub fn min_latency(&self) -> Option<Duration> {
        self.latency.min
    }

    pub fn max_latency(&self) -> Option<Duration> {
        self.latency.max
    }

    pub fn summary(&self) -> FinalSummary<'_> {
        FinalSummary(self)
    }
}

/// Final statistics block.
pub struct FinalSummary<'a>(&'a AggregateStats);

impl fmt::Display for FinalSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.0;
        writeln!(f, "Final Statistics:")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "Total time: {:.1} seconds", stats.elapsed().as_secs_f64())?;
        writeln!(f, "Total requests: {}", stats.total_requests)?;
        writeln!(f, "Average RPS: {:.1}", stats.requests_per_second())?;
        writeln!(f, "Successful requests: {}", stats.success_count)?;
        writeln!(f, "Failed requests: {}", stats.failure_count)?;
        writeln!(f, "Success rate: {:.1}%", stats.success_rate())?;

        if let (Some(mean), Some(min), Some(max)) =
            (stats.mean_latency(), stats.min_latency(), stats.max_latency())
        {
            writeln!(f, "Response times:")?;
            writeln!(f, "  Average: {:.3}s", mean.as_secs_f64())?;
            writeln!(f, "  Min: {:.3}s", min.as_secs_f64())?;
            writeln!(f, "  Max: {:.3}s", max.as_secs_f64())?;
        }

        if !stats.error_counts.is_empty() {
            writeln!(f, "Errors:")?;
            for (kind, count) in &stats.error_counts {
                writeln!(f, "  {kind}: {count}")?;
            }
        }
        Ok(())
    }
}
