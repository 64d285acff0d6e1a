//! Common utilities and types shared across minipd

pub mod config;
pub mod error;
pub mod metrics;
pub mod tracing_middleware;
pub mod utils;

pub use config::{ClusterConfig, Config, ServerConfig};
pub use error::{Error, Result};
pub use metrics::MetricsRegistry;
pub use utils::{format_key, format_range, parse_key};
