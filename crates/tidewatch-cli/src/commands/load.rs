use std::path::PathBuf;

use clap::Args;
use tracing::warn;

use tidewatch_core::{LoadConfig, ShutdownCoordinator, TidewatchConfig};
use tidewatch_loadgen::{HttpFetcher, LoadGenerator, LoadPlan, StatusLine, normalize_target};

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Target URL or load balancer DNS name; `http://` is assumed.
    pub url: String,
    /// Aggregate requests per second.
    pub rps: u32,
    /// Seconds to run; runs until interrupted when omitted.
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,
    /// Concurrent workers [default: 10].
    #[arg(long, alias = "threads")]
    pub workers: Option<u32>,
    /// Per-request timeout in seconds [default: 30].
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
    /// Seconds between status lines [default: 10].
    #[arg(long, value_name = "SECS")]
    pub report_interval: Option<u64>,
    /// TOML config file; flags override its `[load]` section.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl LoadArgs {
    pub fn resolve(&self) -> anyhow::Result<LoadConfig> {
        let mut config = match &self.config {
            Some(path) => TidewatchConfig::from_file(path)?.load,
            None => LoadConfig::default(),
        };

        config.url = self.url.clone();
        config.rps = self.rps;
        if self.duration.is_some() {
            config.duration_secs = self.duration;
        }
        if let Some(v) = self.workers {
            config.workers = v;
        }
        if let Some(v) = self.timeout {
            config.timeout_secs = v;
        }
        if let Some(v) = self.report_interval {
            config.report_interval_secs = v;
        }

        config.validate()?;
        // Surface a bad target before any worker starts.
        normalize_target(&config.url)?;
        Ok(config)
    }
}

pub async fn run(config: LoadConfig) -> anyhow::Result<()> {
    let uri = normalize_target(&config.url)?;

    println!("Load generator initialized");
    println!("Target URL: {uri}");
    println!("Target RPS: {}", config.rps);
    println!("Workers: {}", config.workers);
    match config.duration_secs {
        Some(secs) => println!("Duration: {secs}s"),
        None => println!("Duration: until interrupted (Ctrl+C to stop)"),
    }
    println!("Timeout: {}s", config.timeout_secs);

    let shutdown = ShutdownCoordinator::new();
    shutdown.trigger_on_os_signal();

    let report = LoadGenerator::new(
        LoadPlan::from_config(&config),
        HttpFetcher::new(uri)?,
        shutdown,
    )
    .with_status_callback(|stats| println!("{}", StatusLine(stats)))
    .run()
    .await;

    if report.abandoned > 0 {
        warn!(
            workers = report.abandoned,
            "some workers did not stop in time and were abandoned"
        );
    }

    println!();
    print!("{}", report.stats.summary());
    Ok(())
}
