//! Records persisted by the state store.

use serde::{Deserialize, Serialize};

/// A capacity group: a fleet whose desired instance count the agent adjusts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityGroup {
    pub name: String,
    /// Instance count the fleet is asked to converge toward.
    pub desired: u32,
    pub min: u32,
    pub max: u32,
    /// Unix timestamp of the last change to `desired`.
    pub updated_at: u64,
}

impl CapacityGroup {
    /// Clamp `desired` into the group's bounds.
    pub fn clamp(&self, desired: u32) -> u32 {
        desired.clamp(self.min.min(self.max), self.max.max(self.min))
    }
}

/// Number of requests a load balancer served in one reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub load_balancer: String,
    /// Unix timestamp of the period start.
    pub epoch: u64,
    /// Request count summed over the period.
    pub sum: f64,
}

impl Datapoint {
    pub fn table_key(&self) -> String {
        datapoint_key(&self.load_balancer, self.epoch)
    }
}

pub(crate) fn datapoint_key(load_balancer: &str, epoch: u64) -> String {
    format!("{load_balancer}:{epoch:020}")
}

/// Exclusive upper bound for all datapoint keys of `load_balancer`.
pub(crate) fn datapoint_key_end(load_balancer: &str) -> String {
    // ';' sorts directly after ':'.
    format!("{load_balancer};")
}
