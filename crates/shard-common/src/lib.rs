//! # shard-common
//!
//! Shared utilities for gateway shards: client configuration and telemetry.

pub mod config;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    ClientConfig, ConfigError, GatewaySettings, LogLevel, RateLimitSettings, ReconnectSettings,
    ShardSettings,
};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
