//! Scaling decision engine — threshold comparison with consecutive-reading
//! confirmation.

use std::fmt;

use tidewatch_core::{AgentConfig, ConfigError};

/// Consecutive same-direction readings seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HysteresisCounters {
    pub consecutive_high: u32,
    pub consecutive_low: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingAction {
    ScaleUp,
    ScaleDown,
    NoAction,
}

impl fmt::Display for ScalingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingAction::ScaleUp => write!(f, "SCALE_UP"),
            ScalingAction::ScaleDown => write!(f, "SCALE_DOWN"),
            ScalingAction::NoAction => write!(f, "NO_ACTION"),
        }
    }
}

/// Outcome of one decision: what to do and why.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingDecision {
    pub action: ScalingAction,
    pub reason: String,
}

impl ScalingDecision {
    fn new(action: ScalingAction, reason: String) -> Self {
        Self { action, reason }
    }
}

/// Thresholds and confirmation counts. Stateless: counters are passed in
/// and returned by [`DecisionEngine::decide`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionEngine {
    up_threshold: f64,
    down_threshold: f64,
    up_confirmations: u32,
    down_confirmations: u32,
}

impl DecisionEngine {
    /// Engine with the default confirmation counts (2 up, 3 down).
    pub fn new(up_threshold: f64, down_threshold: f64) -> Result<Self, ConfigError> {
        Self::with_confirmations(up_threshold, down_threshold, 2, 3)
    }

    pub fn with_confirmations(
        up_threshold: f64,
        down_threshold: f64,
        up_confirmations: u32,
        down_confirmations: u32,
    ) -> Result<Self, ConfigError> {
        if up_threshold <= down_threshold || up_threshold.is_nan() || down_threshold.is_nan() {
            return Err(ConfigError::InvalidThresholds {
                up: up_threshold,
                down: down_threshold,
            });
        }
        if up_confirmations == 0 || down_confirmations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "confirmations",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            up_threshold,
            down_threshold,
            up_confirmations,
            down_confirmations,
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, ConfigError> {
        Self::with_confirmations(
            config.scale_up_threshold,
            config.scale_down_threshold,
            config.up_confirmations,
            config.down_confirmations,
        )
    }

    pub fn up_threshold(&self) -> f64 {
        self.up_threshold
    }

    pub fn down_threshold(&self) -> f64 {
        self.down_threshold
    }

    /// Map one reading and the prior counters to a decision and the
    /// updated counters.
    pub fn decide(
        &self,
        value: f64,
        counters: HysteresisCounters,
    ) -> (ScalingDecision, HysteresisCounters) {
        if value > self.up_threshold {
            let high = counters.consecutive_high.saturating_add(1);
            if high >= self.up_confirmations {
                let reason = format!(
                    "High traffic: {value:.1} req/min > {}",
                    self.up_threshold
                );
                return (
                    ScalingDecision::new(ScalingAction::ScaleUp, reason),
                    HysteresisCounters::default(),
                );
            }
            let reason = format!(
                "High traffic detected, waiting for confirmation... ({high}/{})",
                self.up_confirmations
            );
            let next = HysteresisCounters {
                consecutive_high: high,
                consecutive_low: 0,
            };
            return (ScalingDecision::new(ScalingAction::NoAction, reason), next);
        }

        if value < self.down_threshold {
            let low = counters.consecutive_low.saturating_add(1);
            if low >= self.down_confirmations {
                let reason = format!(
                    "Low traffic: {value:.1} req/min < {}",
                    self.down_threshold
                );
                return (
                    ScalingDecision::new(ScalingAction::ScaleDown, reason),
                    HysteresisCounters::default(),
                );
            }
            let reason = format!(
                "Low traffic detected, waiting for confirmation... ({low}/{})",
                self.down_confirmations
            );
            let next = HysteresisCounters {
                consecutive_high: 0,
                consecutive_low: low,
            };
            return (ScalingDecision::new(ScalingAction::NoAction, reason), next);
        }

        (
            ScalingDecision::new(
                ScalingAction::NoAction,
                format!("Normal traffic: {value:.1} req/min"),
            ),
            HysteresisCounters::default(),
        )
    }
}
