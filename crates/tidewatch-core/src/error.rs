//! Configuration errors. Every variant is fatal and surfaces before any
//! monitoring or load generation starts.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("scale-up-threshold ({up}) must be greater than scale-down-threshold ({down})")]
    InvalidThresholds { up: f64, down: f64 },

    #[error("min-capacity ({min}) must be less than max-capacity ({max})")]
    InvalidCapacityBounds { min: u32, max: u32 },

    #[error("missing required setting: {0}")]
    MissingField(&'static str),

    #[error("{field} {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme: {0} (only http and https targets are supported)")]
    UnsupportedScheme(String),

    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
