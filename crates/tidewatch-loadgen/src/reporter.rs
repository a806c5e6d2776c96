//! Periodic status reporting.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use tidewatch_core::ShutdownSignal;

use crate::stats::{AggregateStats, StatsAggregator};

/// One-line cumulative status: totals and rates since start, not a
/// sliding window.
pub struct StatusLine<'a>(pub &'a AggregateStats);

impl fmt::Display for StatusLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.0;
        let mean = stats.mean_latency().unwrap_or_default();
        write!(
            f,
            "Stats: {} requests, {:.1} RPS, {:.1}% success, {:.3}s avg response",
            stats.total_requests,
            stats.requests_per_second(),
            stats.success_rate(),
            mean.as_secs_f64()
        )
    }
}

/// Emit a snapshot every `interval` until shutdown. Snapshots with no
/// requests yet are skipped.
pub async fn run_reporter<R>(
    stats: Arc<StatsAggregator>,
    interval: Duration,
    mut shutdown: ShutdownSignal,
    mut emit: R,
) where
    R: FnMut(&AggregateStats) + Send,
{
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.triggered() => break,
        }
        if shutdown.is_triggered() {
            break;
        }
        let snapshot = stats.snapshot().await;
        if snapshot.total_requests > 0 {
            emit(&snapshot);
        }
    }
    debug!("stats reporter stopped");
}
