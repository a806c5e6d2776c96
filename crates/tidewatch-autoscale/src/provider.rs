//! Metric and capacity providers consumed by the control loop.
//!
//! The traits are the only surface the loop sees. `StoreProvider` is the
//! local implementation backed by the embedded state store.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, warn};

use tidewatch_state::{StateError, StateStore};

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A failed metric read or capacity read/mutation. Always recoverable:
/// the loop skips the tick and tries again at the next one.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("capacity group not found: {0}")]
    GroupNotFound(String),

    #[error("metric read failed: {0}")]
    Metric(String),

    #[error("capacity request failed: {0}")]
    Capacity(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

/// Supplies the traffic rate for a trailing window.
pub trait MetricSource {
    /// Average requests per minute over the last `window`. An empty window
    /// yields `0.0`, not an error.
    fn average_rate(&self, window: Duration) -> ProviderResult<f64>;
}

/// Reports and adjusts the desired capacity of a group.
pub trait CapacitySink {
    fn current_capacity(&self) -> ProviderResult<u32>;

    /// Request a new desired capacity. The sink clamps to its own bounds.
    fn set_desired_capacity(&self, desired: u32, honor_cooldown: bool) -> ProviderResult<()>;
}

/// Provider backed by the local state store: datapoints for the metric and
/// a capacity group for the sink.
#[derive(Clone)]
pub struct StoreProvider {
    state: StateStore,
    group: String,
    dimension: String,
}

impl StoreProvider {
    /// `load_balancer` may be a full ARN; it is reduced to its metric
    /// dimension (see [`metric_dimension`]).
    pub fn new(state: StateStore, group: &str, load_balancer: &str) -> Self {
        Self {
            state,
            group: group.to_string(),
            dimension: metric_dimension(load_balancer),
        }
    }

    pub fn dimension(&self) -> &str {
        &self.dimension
    }
}

impl MetricSource for StoreProvider {
    fn average_rate(&self, window: Duration) -> ProviderResult<f64> {
        let since = epoch_secs().saturating_sub(window.as_secs());
        let points = self.state.list_datapoints_since(&self.dimension, since)?;
        if points.is_empty() {
            warn!(load_balancer = %self.dimension, "no datapoints found in window");
            return Ok(0.0);
        }
        let total: f64 = points.iter().map(|p| p.sum).sum();
        let average = total / points.len() as f64;
        debug!(
            load_balancer = %self.dimension,
            datapoints = points.len(),
            average,
            "metric read"
        );
        Ok(average)
    }
}

impl CapacitySink for StoreProvider {
    fn current_capacity(&self) -> ProviderResult<u32> {
        self.state
            .get_group(&self.group)?
            .map(|g| g.desired)
            .ok_or_else(|| ProviderError::GroupNotFound(self.group.clone()))
    }

    fn set_desired_capacity(&self, desired: u32, honor_cooldown: bool) -> ProviderResult<()> {
        let group = self
            .state
            .set_desired_capacity(&self.group, desired)
            .map_err(|e| match e {
                StateError::NotFound(_) => ProviderError::GroupNotFound(self.group.clone()),
                other => ProviderError::State(other),
            })?;
        debug!(
            group = %self.group,
            requested = desired,
            desired = group.desired,
            honor_cooldown,
            "desired capacity updated"
        );
        Ok(())
    }
}

/// Reduce a load balancer identifier to the dimension datapoints are
/// recorded under.
///
/// `arn:...:loadbalancer/app/<name>/<id>` becomes `app/<name>/<id>`. Any
/// other identifier with a `/` falls back to its last segment; plain names
/// pass through.
pub fn metric_dimension(load_balancer: &str) -> String {
    let parts: Vec<&str> = load_balancer.split('/').collect();
    if parts.len() >= 4 && parts[0].ends_with("loadbalancer") {
        return format!("app/{}/{}", parts[2], parts[3]);
    }
    if parts.len() == 3 && parts[0] == "app" {
        return load_balancer.to_string();
    }
    parts
        .last()
        .map(|s| s.to_string())
        .unwrap_or_else(|| load_balancer.to_string())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
