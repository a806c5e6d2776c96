//! tidewatch-core — configuration, shared types, and the shutdown signal
//! used by both the capacity agent and the load generator.

pub mod config;
pub mod error;
pub mod shutdown;
pub mod types;

pub use config::{AgentConfig, LoadConfig, TidewatchConfig};
pub use error::ConfigError;
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use types::*;
