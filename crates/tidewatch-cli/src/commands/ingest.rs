use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::bail;
use clap::Args;
use tracing::{debug, info};

use tidewatch_autoscale::metric_dimension;
use tidewatch_state::{Datapoint, StateStore};

use super::{StoreArgs, open_store};

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Load balancer name or ARN the count belongs to.
    pub load_balancer: String,
    /// Request count for the period.
    pub sum: f64,
    /// Period start as a unix timestamp; defaults to now.
    #[arg(long)]
    pub epoch: Option<u64>,
    /// Drop this load balancer's datapoints older than this many hours.
    #[arg(long, default_value_t = 24)]
    pub retain_hours: u64,
    #[command(flatten)]
    pub store: StoreArgs,
}

pub fn run(args: IngestArgs) -> anyhow::Result<()> {
    let state = open_store(&args.store.data_dir)?;
    let now = now_secs();
    let point = record(
        &state,
        &args.load_balancer,
        args.sum,
        args.epoch.unwrap_or(now),
    )?;
    let pruned = state.prune_datapoints(
        &point.load_balancer,
        retention_cutoff(now, args.retain_hours),
    )?;
    if pruned > 0 {
        debug!(load_balancer = %point.load_balancer, pruned, "expired datapoints removed");
    }
    println!(
        "Recorded {} requests for {} at {}",
        point.sum, point.load_balancer, point.epoch
    );
    Ok(())
}

/// Store one datapoint under the load balancer's metric dimension.
pub fn record(
    state: &StateStore,
    load_balancer: &str,
    sum: f64,
    epoch: u64,
) -> anyhow::Result<Datapoint> {
    if !sum.is_finite() || sum < 0.0 {
        bail!("request count must be a non-negative number, got {sum}");
    }
    let point = Datapoint {
        load_balancer: metric_dimension(load_balancer),
        epoch,
        sum,
    };
    state.put_datapoint(&point)?;
    info!(load_balancer = %point.load_balancer, epoch, sum, "datapoint recorded");
    Ok(point)
}

/// Oldest epoch kept; retention longer than the clock reaches keeps everything.
fn retention_cutoff(now: u64, retain_hours: u64) -> u64 {
    now.saturating_sub(retain_hours.saturating_mul(3600))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tidewatch_autoscale::{MetricSource, StoreProvider};

    use super::*;

    const ARN: &str =
        "arn:aws:elasticloadbalancing:us-east-1:123456789012:loadbalancer/app/web-alb/50dc6c495c0c9188";

    #[test]
    fn arn_is_stored_under_its_dimension() {
        let state = StateStore::open_in_memory().unwrap();
        let point = record(&state, ARN, 1500.0, 1_000).unwrap();
        assert_eq!(point.load_balancer, "app/web-alb/50dc6c495c0c9188");

        let stored = state
            .list_datapoints_since("app/web-alb/50dc6c495c0c9188", 0)
            .unwrap();
        assert_eq!(stored, vec![point]);
    }

    #[test]
    fn retention_cutoff_saturates() {
        assert_eq!(retention_cutoff(100_000, 24), 100_000 - 86_400);
        assert_eq!(retention_cutoff(100_000, 0), 100_000);
        assert_eq!(retention_cutoff(100_000, u64::MAX), 0);
        assert_eq!(retention_cutoff(100_000, u64::MAX / 3600 + 1), 0);
    }

    #[test]
    fn huge_retention_keeps_every_point() {
        let dir = tempfile::tempdir().unwrap();
        let args = IngestArgs {
            load_balancer: "lb".to_string(),
            sum: 5.0,
            epoch: None,
            retain_hours: u64::MAX,
            store: StoreArgs {
                data_dir: dir.path().to_path_buf(),
            },
        };
        {
            let state = open_store(&args.store.data_dir).unwrap();
            record(&state, "lb", 1.0, 1).unwrap();
        }

        run(args).unwrap();

        let state = open_store(dir.path()).unwrap();
        assert_eq!(state.list_datapoints_since("lb", 0).unwrap().len(), 2);
    }

    #[test]
    fn negative_counts_are_rejected() {
        let state = StateStore::open_in_memory().unwrap();
        assert!(record(&state, "lb", -1.0, 1).is_err());
        assert!(record(&state, "lb", f64::NAN, 1).is_err());
    }

    #[test]
    fn ingested_points_feed_the_metric_source() {
        let state = StateStore::open_in_memory().unwrap();
        let now = now_secs();
        record(&state, ARN, 100.0, now - 120).unwrap();
        record(&state, ARN, 200.0, now - 60).unwrap();
        // Outside a five-minute window.
        record(&state, ARN, 9_000.0, now - 3_600).unwrap();

        let provider = StoreProvider::new(state, "web", ARN);
        let rate = provider.average_rate(Duration::from_secs(300)).unwrap();
        assert!((rate - 150.0).abs() < 1e-9);
    }
}
