//! StateStore — redb-backed persistence for capacity groups and datapoints.
//!
//! Supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(GROUPS).map_err(map_err!(Table))?;
        txn.open_table(DATAPOINTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Capacity groups ────────────────────────────────────────────

    /// Insert or replace a capacity group. `desired` is clamped to the bounds.
    pub fn put_group(&self, group: &CapacityGroup) -> StateResult<()> {
        let mut group = group.clone();
        group.desired = group.clamp(group.desired);
        let value = serde_json::to_vec(&group).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
            table
                .insert(group.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(group = %group.name, desired = group.desired, "capacity group stored");
        Ok(())
    }

    pub fn get_group(&self, name: &str) -> StateResult<Option<CapacityGroup>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let group: CapacityGroup =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(group))
            }
            None => Ok(None),
        }
    }

    pub fn list_groups(&self) -> StateResult<Vec<CapacityGroup>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let group: CapacityGroup =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(group);
        }
        Ok(results)
    }

    /// Set a group's desired capacity, clamped to its bounds.
    ///
    /// Read and write happen in one write transaction. Returns the stored
    /// group; `NotFound` if the group does not exist.
    pub fn set_desired_capacity(&self, name: &str, desired: u32) -> StateResult<CapacityGroup> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let group = {
            let mut table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
            let mut group: CapacityGroup = match table.get(name).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("capacity group {name}"))),
            };
            let clamped = group.clamp(desired);
            if clamped != group.desired {
                group.desired = clamped;
                group.updated_at = epoch_secs();
            }
            let value = serde_json::to_vec(&group).map_err(map_err!(Serialize))?;
            table
                .insert(name, value.as_slice())
                .map_err(map_err!(Write))?;
            group
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(group = %name, requested = desired, desired = group.desired, "desired capacity set");
        Ok(group)
    }

    // ── Datapoints ─────────────────────────────────────────────────

    /// Record a datapoint. A datapoint for the same period is replaced.
    pub fn put_datapoint(&self, point: &Datapoint) -> StateResult<()> {
        let key = point.table_key();
        let value = serde_json::to_vec(point).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DATAPOINTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Datapoints for a load balancer with `epoch >= since`, oldest first.
    pub fn list_datapoints_since(
        &self,
        load_balancer: &str,
        since: u64,
    ) -> StateResult<Vec<Datapoint>> {
        let start = datapoint_key(load_balancer, since);
        let end = datapoint_key_end(load_balancer);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DATAPOINTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let point: Datapoint =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(point);
        }
        Ok(results)
    }

    /// Delete datapoints for a load balancer older than `before`.
    /// Returns the number removed.
    pub fn prune_datapoints(&self, load_balancer: &str, before: u64) -> StateResult<u32> {
        let start = datapoint_key(load_balancer, 0);
        let end = datapoint_key(load_balancer, before);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed = {
            let mut table = txn.open_table(DATAPOINTS).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table
                .range(start.as_str()..end.as_str())
                .map_err(map_err!(Read))?
            {
                let (key, _) = entry.map_err(map_err!(Read))?;
                keys.push(key.value().to_string());
            }
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            keys.len() as u32
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%load_balancer, removed, "datapoints pruned");
        Ok(removed)
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
