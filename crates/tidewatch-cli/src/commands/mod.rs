pub mod agent;
pub mod group;
pub mod ingest;
pub mod load;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use tracing::info;

use tidewatch_state::StateStore;

pub const DEFAULT_DATA_DIR: &str = "/var/lib/tidewatch";
const DB_FILE: &str = "tidewatch.redb";

/// Location of the local state store.
#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Data directory holding the state store.
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,
}

/// Open (creating if needed) the store under `data_dir`.
pub fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    let db_path = data_dir.join(DB_FILE);
    let store = StateStore::open(&db_path)
        .with_context(|| format!("failed to open state store {}", db_path.display()))?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}
