//! Control loop — polls the metric, runs the decision engine, and mutates
//! capacity one step at a time.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use tidewatch_core::{AgentConfig, CapacityState, MetricSample};

use crate::hysteresis::{DecisionEngine, HysteresisCounters, ScalingAction, ScalingDecision};
use crate::provider::{CapacitySink, MetricSource};

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A provider read failed; counters were left as they were.
    Skipped { error: String },
    /// The engine decided not to act (in band, or awaiting confirmation).
    NoAction { decision: ScalingDecision },
    /// The engine fired but capacity already sits at the relevant bound.
    AtBound { decision: ScalingDecision, capacity: u32 },
    /// A mutation was requested from the sink.
    Scaled { decision: ScalingDecision, from: u32, to: u32 },
    /// The sink rejected the mutation.
    MutationFailed { decision: ScalingDecision, error: String },
}

/// Owns the hysteresis counters across ticks. Single-threaded: one tick
/// runs to completion before the next starts.
pub struct ControlLoop<M, C> {
    engine: DecisionEngine,
    counters: HysteresisCounters,
    metrics: M,
    capacity: C,
    min_capacity: u32,
    max_capacity: u32,
    metric_window: Duration,
}

impl<M: MetricSource, C: CapacitySink> ControlLoop<M, C> {
    pub fn new(
        engine: DecisionEngine,
        metrics: M,
        capacity: C,
        min_capacity: u32,
        max_capacity: u32,
    ) -> Self {
        Self {
            engine,
            counters: HysteresisCounters::default(),
            metrics,
            capacity,
            min_capacity,
            max_capacity,
            metric_window: Duration::from_secs(300),
        }
    }

    pub fn from_config(
        config: &AgentConfig,
        metrics: M,
        capacity: C,
    ) -> Result<Self, tidewatch_core::ConfigError> {
        config.validate()?;
        let engine = DecisionEngine::from_config(config)?;
        Ok(Self::new(
            engine,
            metrics,
            capacity,
            config.min_capacity,
            config.max_capacity,
        )
        .with_metric_window(config.metric_window()))
    }

    pub fn with_metric_window(mut self, window: Duration) -> Self {
        self.metric_window = window;
        self
    }

    pub fn counters(&self) -> HysteresisCounters {
        self.counters
    }

    /// Run one tick: read, decide, and mutate if needed.
    pub fn tick(&mut self) -> TickOutcome {
        let sample = match self.metrics.average_rate(self.metric_window) {
            Ok(value) => MetricSample::new(value),
            Err(e) => {
                error!(
                    error = %e,
                    high = self.counters.consecutive_high,
                    low = self.counters.consecutive_low,
                    "failed to read request rate, skipping tick"
                );
                return TickOutcome::Skipped { error: e.to_string() };
            }
        };

        let current = match self.capacity.current_capacity() {
            Ok(current) => current,
            Err(e) => {
                error!(
                    error = %e,
                    rate = sample.value,
                    "failed to read current capacity, skipping tick"
                );
                return TickOutcome::Skipped { error: e.to_string() };
            }
        };
        // Bound checks only; the step is taken from the sink's own value,
        // which may sit outside the agent's bounds.
        let state = CapacityState::new(current, self.min_capacity, self.max_capacity);

        info!(
            rate = sample.value,
            capacity = current,
            "status: {:.1} req/min, capacity: {current}",
            sample.value
        );

        let (decision, counters) = self.engine.decide(sample.value, self.counters);
        self.counters = counters;

        let target = match decision.action {
            ScalingAction::NoAction => {
                info!(reason = %decision.reason, "no action");
                return TickOutcome::NoAction { decision };
            }
            ScalingAction::ScaleUp if state.at_max() => {
                info!(
                    reason = %decision.reason,
                    max = state.max(),
                    "cannot scale up: already at max capacity"
                );
                return TickOutcome::AtBound { decision, capacity: current };
            }
            ScalingAction::ScaleDown if state.at_min() => {
                info!(
                    reason = %decision.reason,
                    min = state.min(),
                    "cannot scale down: already at min capacity"
                );
                return TickOutcome::AtBound { decision, capacity: current };
            }
            ScalingAction::ScaleUp => current.saturating_add(1),
            ScalingAction::ScaleDown => current.saturating_sub(1),
        };

        match self.capacity.set_desired_capacity(target, true) {
            Ok(()) => {
                info!(
                    action = %decision.action,
                    reason = %decision.reason,
                    from = current,
                    to = target,
                    "scaling {}: {current} -> {target} instances",
                    if decision.action == ScalingAction::ScaleUp { "up" } else { "down" },
                );
                TickOutcome::Scaled {
                    decision,
                    from: current,
                    to: target,
                }
            }
            Err(e) => {
                error!(
                    action = %decision.action,
                    error = %e,
                    capacity = current,
                    up_threshold = self.engine.up_threshold(),
                    down_threshold = self.engine.down_threshold(),
                    "capacity change failed"
                );
                TickOutcome::MutationFailed {
                    decision,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Tick every `interval` until the shutdown signal fires. The first
    /// tick runs immediately.
    pub async fn run(&mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            up_threshold = self.engine.up_threshold(),
            down_threshold = self.engine.down_threshold(),
            min = self.min_capacity,
            max = self.max_capacity,
            "control loop started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("shutdown sender dropped");
                    }
                    break;
                }
            }
        }

        info!("control loop stopped");
    }
}
