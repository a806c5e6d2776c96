//! Worker — issues its share of the target rate, one batch per second.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use tidewatch_core::ShutdownSignal;

use crate::fetch::{ErrorKind, Fetch, RequestResult};
use crate::scheduler::tick_interval;
use crate::stats::StatsAggregator;

const BATCH_PERIOD: Duration = Duration::from_secs(1);

/// What a worker did before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    pub rate: u32,
    pub batches: u64,
    pub requests: u64,
}

pub struct Worker<F> {
    id: usize,
    rate: u32,
    timeout: Duration,
    fetcher: Arc<F>,
    stats: Arc<StatsAggregator>,
}

impl<F: Fetch> Worker<F> {
    pub fn new(
        id: usize,
        rate: u32,
        timeout: Duration,
        fetcher: Arc<F>,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        Self {
            id,
            rate,
            timeout,
            fetcher,
            stats,
        }
    }

    /// Issue one request, bounded by the timeout, and time it.
    async fn request_once(&self) -> RequestResult {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.fetcher.fetch()).await {
            Ok(Ok(resp)) => {
                RequestResult::success(resp.status, started.elapsed(), resp.content_length)
            }
            Ok(Err(e)) => {
                trace!(worker = self.id, error = %e, "request failed");
                RequestResult::failure(e.kind, started.elapsed())
            }
            Err(_) => {
                trace!(worker = self.id, timeout_ms = self.timeout.as_millis() as u64, "request timed out");
                RequestResult::failure(ErrorKind::Timeout, started.elapsed())
            }
        }
    }

    /// Run until shutdown. Each iteration sends `rate` requests back to back
    /// and then sleeps out the rest of the second. Shutdown is observed at
    /// the top of each iteration, between requests, and during the sleep.
    pub async fn run_loop(self, mut shutdown: ShutdownSignal) -> WorkerReport {
        let mut report = WorkerReport {
            id: self.id,
            rate: self.rate,
            batches: 0,
            requests: 0,
        };

        if self.rate == 0 {
            debug!(worker = self.id, "no rate assigned, idle until shutdown");
            shutdown.triggered().await;
            return report;
        }

        debug!(
            worker = self.id,
            rate = self.rate,
            nominal_interval_ms = tick_interval(self.rate).map(|d| d.as_millis() as u64),
            "worker started"
        );

        'batches: loop {
            if shutdown.is_triggered() {
                break;
            }
            let batch_start = Instant::now();

            for _ in 0..self.rate {
                if shutdown.is_triggered() {
                    break 'batches;
                }
                let result = self.request_once().await;
                self.stats.record(result).await;
                report.requests += 1;
            }
            report.batches += 1;

            let remaining = BATCH_PERIOD.saturating_sub(batch_start.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = shutdown.triggered() => break,
            }
        }

        debug!(
            worker = self.id,
            batches = report.batches,
            requests = report.requests,
            "worker stopped"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use tidewatch_core::ShutdownCoordinator;

    use super::*;
    use crate::fetch::{FetchError, FetchResponse};

    /// Answers instantly (or after `delay`) and counts calls.
    struct StubFetcher {
        delay: Duration,
        calls: AtomicU64,
        fail_with: Option<ErrorKind>,
    }

    impl StubFetcher {
        fn instant() -> Arc<Self> {
            Arc::new(Self {
                delay: Duration::ZERO,
                calls: AtomicU64::new(0),
                fail_with: None,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                calls: AtomicU64::new(0),
                fail_with: None,
            })
        }
    }

    impl Fetch for StubFetcher {
        async fn fetch(&self) -> Result<FetchResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.fail_with {
                Some(kind) => Err(FetchError::new(kind, "stubbed")),
                None => Ok(FetchResponse {
                    status: 200,
                    content_length: 11,
                }),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sends_rate_per_second() {
        let stats = Arc::new(StatsAggregator::new());
        let fetcher = StubFetcher::instant();
        let shutdown = ShutdownCoordinator::new();
        let worker = Worker::new(0, 5, Duration::from_secs(30), fetcher.clone(), stats.clone());
        let handle = tokio::spawn(worker.run_loop(shutdown.subscribe()));

        // Batches at t = 0, 1, 2, 3.
        tokio::time::sleep(Duration::from_millis(3500)).await;
        shutdown.trigger();
        let report = handle.await.unwrap();

        assert_eq!(report.batches, 4);
        assert_eq!(report.requests, 20);
        assert_eq!(stats.total_requests(), 20);
        assert_eq!(fetcher.calls.load(Ordering::Relaxed), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_requests_are_classified_as_timeout() {
        let stats = Arc::new(StatsAggregator::new());
        let shutdown = ShutdownCoordinator::new();
        let worker = Worker::new(
            0,
            1,
            Duration::from_secs(2),
            StubFetcher::slow(Duration::from_secs(60)),
            stats.clone(),
        );
        let handle = tokio::spawn(worker.run_loop(shutdown.subscribe()));

        // Shutdown lands while the first request is still in flight; it is
        // allowed to finish (and time out) but no second one starts.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        shutdown.trigger();
        handle.await.unwrap();

        let snap = stats.snapshot().await;
        assert_eq!(snap.total_requests, 1);
        assert_eq!(snap.error_counts[&ErrorKind::Timeout], 1);
        assert!(snap.latency.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_errors_keep_the_worker_running() {
        let stats = Arc::new(StatsAggregator::new());
        let shutdown = ShutdownCoordinator::new();
        let fetcher = Arc::new(StubFetcher {
            delay: Duration::ZERO,
            calls: AtomicU64::new(0),
            fail_with: Some(ErrorKind::ConnectionError),
        });
        let worker = Worker::new(0, 2, Duration::from_secs(1), fetcher, stats.clone());
        let handle = tokio::spawn(worker.run_loop(shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown.trigger();
        let report = handle.await.unwrap();

        assert_eq!(report.requests, 6);
        let snap = stats.snapshot().await;
        assert_eq!(snap.failure_count, 6);
        assert_eq!(snap.error_counts[&ErrorKind::ConnectionError], 6);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_worker_sends_nothing() {
        let stats = Arc::new(StatsAggregator::new());
        let fetcher = StubFetcher::instant();
        let shutdown = ShutdownCoordinator::new();
        let worker = Worker::new(3, 0, Duration::from_secs(1), fetcher.clone(), stats.clone());
        let handle = tokio::spawn(worker.run_loop(shutdown.subscribe()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!handle.is_finished());
        shutdown.trigger();
        let report = handle.await.unwrap();

        assert_eq!(report.requests, 0);
        assert_eq!(fetcher.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_batches_after_shutdown() {
        let stats = Arc::new(StatsAggregator::new());
        let fetcher = StubFetcher::instant();
        let shutdown = ShutdownCoordinator::new();
        let worker = Worker::new(0, 3, Duration::from_secs(1), fetcher.clone(), stats.clone());
        let handle = tokio::spawn(worker.run_loop(shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        shutdown.trigger();
        handle.await.unwrap();
        let at_stop = fetcher.calls.load(Ordering::Relaxed);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fetcher.calls.load(Ordering::Relaxed), at_stop);
        assert_eq!(at_stop, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn already_triggered_shutdown_sends_nothing() {
        let stats = Arc::new(StatsAggregator::new());
        let fetcher = StubFetcher::instant();
        let shutdown = ShutdownCoordinator::new();
        shutdown.trigger();

        let worker = Worker::new(0, 10, Duration::from_secs(1), fetcher.clone(), stats);
        let report = worker.run_loop(shutdown.subscribe()).await;
        assert_eq!(report.requests, 0);
        assert_eq!(report.batches, 0);
    }
}
