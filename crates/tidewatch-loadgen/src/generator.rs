//! Load generator orchestration: start workers and the reporter together,
//! wait for the duration or a shutdown, then collect.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tidewatch_core::{LoadConfig, ShutdownCoordinator};

use crate::fetch::Fetch;
use crate::reporter::{StatusLine, run_reporter};
use crate::scheduler::split_rate;
use crate::stats::{AggregateStats, StatsAggregator};
use crate::worker::{Worker, WorkerReport};

type StatusCallback = Box<dyn FnMut(&AggregateStats) + Send>;

/// Run parameters, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPlan {
    pub rps: u32,
    pub workers: usize,
    pub timeout: Duration,
    /// `None` runs until shutdown.
    pub duration: Option<Duration>,
    pub report_interval: Duration,
    /// Per-worker wait after shutdown before giving up on it.
    pub join_timeout: Duration,
}

impl LoadPlan {
    pub fn from_config(config: &LoadConfig) -> Self {
        Self {
            rps: config.rps,
            workers: config.workers as usize,
            timeout: config.timeout(),
            duration: config.duration(),
            report_interval: config.report_interval(),
            join_timeout: config.join_timeout(),
        }
    }
}

/// Everything the run produced.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub stats: AggregateStats,
    /// Reports from workers that stopped within the join timeout.
    pub workers: Vec<WorkerReport>,
    /// Workers abandoned after the join timeout.
    pub abandoned: usize,
}

pub struct LoadGenerator<F> {
    plan: LoadPlan,
    fetcher: Arc<F>,
    shutdown: ShutdownCoordinator,
    on_status: Option<StatusCallback>,
}

impl<F: Fetch> LoadGenerator<F> {
    pub fn new(plan: LoadPlan, fetcher: F, shutdown: ShutdownCoordinator) -> Self {
        Self {
            plan,
            fetcher: Arc::new(fetcher),
            shutdown,
            on_status: None,
        }
    }

    /// Receive each periodic snapshot. Without a callback status lines are
    /// logged.
    pub fn with_status_callback<C>(mut self, callback: C) -> Self
    where
        C: FnMut(&AggregateStats) + Send + 'static,
    {
        self.on_status = Some(Box::new(callback));
        self
    }

    pub async fn run(self) -> LoadReport {
        let plan = self.plan;
        let rates = split_rate(plan.rps, plan.workers);
        let stats = Arc::new(StatsAggregator::new());

        info!(
            rps = plan.rps,
            workers = plan.workers,
            timeout_secs = plan.timeout.as_secs_f64(),
            duration_secs = plan.duration.map(|d| d.as_secs()),
            "starting load generation"
        );

        let handles: Vec<JoinHandle<WorkerReport>> = rates
            .into_iter()
            .enumerate()
            .map(|(id, rate)| {
                let worker = Worker::new(
                    id,
                    rate,
                    plan.timeout,
                    self.fetcher.clone(),
                    stats.clone(),
                );
                tokio::spawn(worker.run_loop(self.shutdown.subscribe()))
            })
            .collect();

        let emit = self.on_status.unwrap_or_else(|| {
            Box::new(|s: &AggregateStats| info!("{}", StatusLine(s))) as StatusCallback
        });
        let reporter = tokio::spawn(run_reporter(
            stats.clone(),
            plan.report_interval,
            self.shutdown.subscribe(),
            emit,
        ));

        let mut signal = self.shutdown.subscribe();
        match plan.duration {
            Some(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {
                        info!(secs = duration.as_secs_f64(), "run duration elapsed");
                    }
                    _ = signal.triggered() => {}
                }
            }
            None => signal.triggered().await,
        }

        self.shutdown.trigger();
        stats.finish();
        info!("stopping load generation");

        let mut workers = Vec::new();
        let mut abandoned = 0;
        for (id, mut handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout(plan.join_timeout, &mut handle).await {
                Ok(Ok(report)) => workers.push(report),
                Ok(Err(e)) => {
                    warn!(worker = id, error = %e, "worker task failed");
                }
                Err(_) => {
                    warn!(
                        worker = id,
                        join_timeout_secs = plan.join_timeout.as_secs_f64(),
                        "worker did not stop in time, abandoning it"
                    );
                    handle.abort();
                    abandoned += 1;
                }
            }
        }

        if tokio::time::timeout(plan.join_timeout, reporter).await.is_err() {
            debug!("stats reporter did not stop in time");
        }

        LoadReport {
            stats: stats.snapshot().await,
            workers,
            abandoned,
        }
    }
}
