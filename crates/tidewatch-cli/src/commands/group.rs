use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::bail;
use clap::Subcommand;
use tracing::info;

use tidewatch_state::{CapacityGroup, StateStore};

use super::{StoreArgs, open_store};

#[derive(Debug, Subcommand)]
pub enum GroupAction {
    /// Create or replace a capacity group.
    Init {
        name: String,
        #[arg(long, default_value_t = 1)]
        min: u32,
        #[arg(long, default_value_t = 4)]
        max: u32,
        /// Initial desired capacity; defaults to `min`.
        #[arg(long)]
        desired: Option<u32>,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Show one group, or every group when no name is given.
    Show {
        name: Option<String>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
        #[command(flatten)]
        store: StoreArgs,
    },
}

pub fn run(action: GroupAction) -> anyhow::Result<()> {
    match action {
        GroupAction::Init {
            name,
            min,
            max,
            desired,
            store,
        } => {
            let state = open_store(&store.data_dir)?;
            let group = init_group(&state, &name, min, max, desired)?;
            println!(
                "Capacity group {} ready: desired {} (min {}, max {})",
                group.name, group.desired, group.min, group.max
            );
            Ok(())
        }
        GroupAction::Show {
            name,
            format,
            store,
        } => {
            let state = open_store(&store.data_dir)?;
            let groups = match name {
                Some(name) => match state.get_group(&name)? {
                    Some(group) => vec![group],
                    None => bail!("capacity group not found: {name}"),
                },
                None => state.list_groups()?,
            };
            print!("{}", render(&groups, &format)?);
            Ok(())
        }
    }
}

pub fn init_group(
    state: &StateStore,
    name: &str,
    min: u32,
    max: u32,
    desired: Option<u32>,
) -> anyhow::Result<CapacityGroup> {
    if name.trim().is_empty() {
        bail!("group name must not be empty");
    }
    if min > max {
        bail!("min ({min}) must not exceed max ({max})");
    }

    let mut group = CapacityGroup {
        name: name.to_string(),
        desired: 0,
        min,
        max,
        updated_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
    };
    group.desired = group.clamp(desired.unwrap_or(min));
    state.put_group(&group)?;
    info!(group = %group.name, desired = group.desired, min, max, "capacity group stored");
    Ok(group)
}

fn render(groups: &[CapacityGroup], format: &str) -> anyhow::Result<String> {
    match format {
        "json" => Ok(format!("{}\n", serde_json::to_string_pretty(groups)?)),
        "text" => {
            if groups.is_empty() {
                return Ok("No capacity groups.\n".to_string());
            }
            let mut out = String::new();
            for g in groups {
                out.push_str(&format!(
                    "{}: desired {} (min {}, max {}), updated at {}\n",
                    g.name, g.desired, g.min, g.max, g.updated_at
                ));
            }
            Ok(out)
        }
        other => bail!("unknown format: {other} (expected text or json)"),
    }
}
