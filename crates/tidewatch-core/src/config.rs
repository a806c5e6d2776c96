//! tidewatch.toml configuration parser.
//!
//! Both sections are optional in the file; every field has a default that
//! matches the CLI. Command-line flags are applied on top of the parsed file
//! and `validate()` runs last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TidewatchConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub load: LoadConfig,
}

/// Settings for the capacity-control agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Capacity group whose desired capacity is adjusted.
    pub group: String,
    /// Load balancer whose request count drives decisions.
    pub load_balancer: String,
    /// Requests per minute above which traffic counts as high.
    pub scale_up_threshold: f64,
    /// Requests per minute below which traffic counts as low.
    pub scale_down_threshold: f64,
    pub min_capacity: u32,
    pub max_capacity: u32,
    /// Seconds between control-loop ticks.
    pub check_interval_secs: u64,
    /// Trailing window the metric is averaged over, in minutes.
    pub metric_window_mins: u64,
    /// Consecutive high readings required before scaling up.
    pub up_confirmations: u32,
    /// Consecutive low readings required before scaling down.
    pub down_confirmations: u32,
    pub log_file: Option<PathBuf>,
    pub data_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            group: String::new(),
            load_balancer: String::new(),
            scale_up_threshold: 120.0,
            scale_down_threshold: 60.0,
            min_capacity: 1,
            max_capacity: 4,
            check_interval_secs: 60,
            metric_window_mins: 5,
            up_confirmations: 2,
            down_confirmations: 3,
            log_file: None,
            data_dir: PathBuf::from("/var/lib/tidewatch"),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group.trim().is_empty() {
            return Err(ConfigError::MissingField("group"));
        }
        if self.load_balancer.trim().is_empty() {
            return Err(ConfigError::MissingField("load-balancer"));
        }
        if !self.scale_up_threshold.is_finite() || !self.scale_down_threshold.is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "thresholds",
                reason: "must be finite numbers".to_string(),
            });
        }
        if self.scale_up_threshold <= self.scale_down_threshold {
            return Err(ConfigError::InvalidThresholds {
                up: self.scale_up_threshold,
                down: self.scale_down_threshold,
            });
        }
        if self.min_capacity >= self.max_capacity {
            return Err(ConfigError::InvalidCapacityBounds {
                min: self.min_capacity,
                max: self.max_capacity,
            });
        }
        positive("check-interval", self.check_interval_secs)?;
        positive("metric-window", self.metric_window_mins)?;
        positive("up-confirmations", u64::from(self.up_confirmations))?;
        positive("down-confirmations", u64::from(self.down_confirmations))?;
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn metric_window(&self) -> Duration {
        Duration::from_secs(self.metric_window_mins * 60)
    }
}

/// Settings for the load generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub url: String,
    /// Aggregate requests per second across all workers.
    pub rps: u32,
    /// Run time in seconds; `None` runs until interrupted.
    pub duration_secs: Option<u64>,
    pub workers: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Seconds between periodic status lines.
    pub report_interval_secs: u64,
    /// How long to wait for each worker to exit after shutdown.
    pub join_timeout_secs: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            rps: 0,
            duration_secs: None,
            workers: 10,
            timeout_secs: 30,
            report_interval_secs: 10,
            join_timeout_secs: 5,
        }
    }
}

impl LoadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingField("url"));
        }
        if self.rps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "requests per second",
                reason: "must be positive".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "number of workers",
                reason: "must be positive".to_string(),
            });
        }
        positive("timeout", self.timeout_secs)?;
        positive("report-interval", self.report_interval_secs)?;
        if self.duration_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "duration",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

impl TidewatchConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

fn positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must be positive".to_string(),
        });
    }
    Ok(())
}
