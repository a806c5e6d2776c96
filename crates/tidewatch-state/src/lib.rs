//! tidewatch-state — embedded state store for the local capacity provider.
//!
//! Backed by [redb](https://docs.rs/redb). Holds capacity groups and the
//! per-load-balancer request-count datapoints the agent averages over.
//!
//! Values are JSON-serialized into `&[u8]` columns. Datapoint keys are
//! `{load_balancer}:{epoch}` with the epoch zero-padded, so a key range
//! scan returns one load balancer's datapoints in time order.
//!
//! `StateStore` is `Clone + Send + Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
