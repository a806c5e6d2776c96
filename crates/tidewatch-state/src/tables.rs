//! redb table definitions.

use redb::TableDefinition;

/// Capacity groups keyed by group name.
pub const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");

/// Request-count datapoints keyed by `{load_balancer}:{epoch:020}`.
pub const DATAPOINTS: TableDefinition<&str, &[u8]> = TableDefinition::new("datapoints");
