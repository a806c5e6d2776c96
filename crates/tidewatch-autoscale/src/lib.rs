//! tidewatch-autoscale — metric-driven capacity control with hysteresis.
//!
//! Each tick the control loop reads the trailing-window request rate,
//! feeds it to the decision engine, and asks the capacity sink for a
//! ±1 change when the engine fires.
//!
//! # Decision rule
//!
//! ```text
//! value > up_threshold    → high += 1, low = 0; ScaleUp when high >= 2
//! value < down_threshold  → low  += 1, high = 0; ScaleDown when low >= 3
//! otherwise               → high = low = 0; NoAction
//! ```
//!
//! A counter resets after its action fires. Scale-down needs one more
//! confirming reading than scale-up, so the fleet shrinks more cautiously
//! than it grows. A failed tick leaves both counters untouched.

pub mod controller;
pub mod hysteresis;
pub mod provider;

pub use controller::{ControlLoop, TickOutcome};
pub use hysteresis::{DecisionEngine, HysteresisCounters, ScalingAction, ScalingDecision};
pub use provider::{
    CapacitySink, MetricSource, ProviderError, ProviderResult, StoreProvider, metric_dimension,
};
