//! # minipd
//!
//! Region directory and split coordinator for a range-sharded key-value
//! store:
//! - Keyspace index mapping every key to exactly one region
//! - Epoch-based rejection of stale region reports
//! - Heartbeat ingestion from the stores that host regions
//! - Two-phase split protocol (ask for ids, report the finished split)
//! - HTTP/JSON API for stores, Prometheus metrics

#![allow(clippy::result_large_err)]
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             Region directory             │
//! │  RegionCluster (RwLock<RegionIndex>)     │
//! │   - heartbeats: epoch-checked upserts    │
//! │   - ask split: ids, no state change      │
//! │   - report split: parent -> children     │
//! └───────────┬──────────────────────────────┘
//!             │ HTTP/JSON
//!   ┌─────────┴──────────┬──────────────┐
//!   │                    │              │
//! ┌─▼──────────┐   ┌─────▼──────┐   ┌───▼──────────┐
//! │ Store 1    │   │ Store 2    │   │ Store 3      │
//! │ [-inf, b)  │   │ [b, k)     │   │ [k, +inf)    │
//! └────────────┘   └────────────┘   └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! minipd serve \
//!   --node-id pd-1 \
//!   --bind 0.0.0.0:2379 \
//!   --bootstrap-stores 1,2,3
//! ```
//!
//! ```bash
//! # Which region owns key "user42"?
//! curl http://localhost:2379/pd/region_by_key/757365723432
//! ```

pub mod common;
pub mod coordinator;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use coordinator::{Coordinator, RegionCluster};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
