use std::path::PathBuf;

use clap::Args;
use tracing::{info, warn};

use tidewatch_autoscale::{ControlLoop, StoreProvider};
use tidewatch_core::{AgentConfig, ShutdownCoordinator, TidewatchConfig};

use super::open_store;

#[derive(Debug, Default, Args)]
pub struct AgentArgs {
    /// Capacity group to manage.
    #[arg(long, alias = "asg-name")]
    pub group: Option<String>,
    /// Load balancer name or ARN whose request count drives scaling.
    #[arg(long, alias = "alb-arn")]
    pub load_balancer: Option<String>,
    /// Requests per minute above which to scale up [default: 120].
    #[arg(long)]
    pub scale_up_threshold: Option<f64>,
    /// Requests per minute below which to scale down [default: 60].
    #[arg(long)]
    pub scale_down_threshold: Option<f64>,
    /// [default: 1]
    #[arg(long)]
    pub min_capacity: Option<u32>,
    /// [default: 4]
    #[arg(long)]
    pub max_capacity: Option<u32>,
    /// Seconds between checks [default: 60].
    #[arg(long, value_name = "SECS")]
    pub check_interval: Option<u64>,
    /// Append logs to this file as well as the console.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    /// Data directory holding the state store [default: /var/lib/tidewatch].
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// TOML config file; flags override its `[agent]` section.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl AgentArgs {
    /// Merge the config file (if any) with the flags and validate.
    pub fn resolve(&self) -> anyhow::Result<AgentConfig> {
        let mut config = match &self.config {
            Some(path) => TidewatchConfig::from_file(path)?.agent,
            None => AgentConfig::default(),
        };

        if let Some(group) = &self.group {
            config.group = group.clone();
        }
        if let Some(lb) = &self.load_balancer {
            config.load_balancer = lb.clone();
        }
        if let Some(v) = self.scale_up_threshold {
            config.scale_up_threshold = v;
        }
        if let Some(v) = self.scale_down_threshold {
            config.scale_down_threshold = v;
        }
        if let Some(v) = self.min_capacity {
            config.min_capacity = v;
        }
        if let Some(v) = self.max_capacity {
            config.max_capacity = v;
        }
        if let Some(v) = self.check_interval {
            config.check_interval_secs = v;
        }
        if let Some(path) = &self.log_file {
            config.log_file = Some(path.clone());
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

pub async fn run(config: AgentConfig) -> anyhow::Result<()> {
    info!(
        group = %config.group,
        load_balancer = %config.load_balancer,
        scale_up_threshold = config.scale_up_threshold,
        scale_down_threshold = config.scale_down_threshold,
        min = config.min_capacity,
        max = config.max_capacity,
        "starting capacity agent"
    );

    let state = open_store(&config.data_dir)?;
    if state.get_group(&config.group)?.is_none() {
        warn!(
            group = %config.group,
            "capacity group not found in store; ticks will be skipped until it exists \
             (create it with `tidewatch group init`)"
        );
    }

    let provider = StoreProvider::new(state, &config.group, &config.load_balancer);
    info!(dimension = provider.dimension(), "metric dimension resolved");
    let mut control = ControlLoop::from_config(&config, provider.clone(), provider)?;

    let shutdown = ShutdownCoordinator::new();
    shutdown.trigger_on_os_signal();

    control
        .run(config.check_interval(), shutdown.receiver())
        .await;

    info!("capacity agent stopped");
    Ok(())
}
