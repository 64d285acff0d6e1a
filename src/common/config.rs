//! Configuration for minipd
//!
//! Values come from (lowest to highest priority) built-in defaults, an
//! optional TOML file, `MINIPD__*` environment variables and CLI flags.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node ID (unique identifier)
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Logging level, used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,
}

fn default_node_id() -> String {
    "pd-1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            log_level: default_log_level(),
            server: ServerConfig::default(),
            cluster: ClusterConfig::default(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the store-facing API
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 2379))
}
fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Region directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Stores replicating the first region; empty means the directory is
    /// rebuilt from heartbeats instead.
    #[serde(default)]
    pub bootstrap_stores: Vec<u64>,

    /// First id handed out by the local id allocator
    #[serde(default = "default_id_alloc_start")]
    pub id_alloc_start: u64,

    /// Upper bound for AskBatchSplit's split count
    #[serde(default = "default_max_batch_split")]
    pub max_batch_split: usize,

    /// How often an allocated id that collides with a live region is redrawn
    #[serde(default = "default_alloc_retries")]
    pub alloc_retries: usize,
}

fn default_id_alloc_start() -> u64 {
    1
}
fn default_max_batch_split() -> usize {
    64
}
fn default_alloc_retries() -> usize {
    3
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            bootstrap_stores: Vec::new(),
            id_alloc_start: default_id_alloc_start(),
            max_batch_split: default_max_batch_split(),
            alloc_retries: default_alloc_retries(),
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.id_alloc_start == 0 {
            return Err(crate::Error::InvalidConfig(
                "id_alloc_start must be at least 1".into(),
            ));
        }
        if self.max_batch_split == 0 {
            return Err(crate::Error::InvalidConfig(
                "max_batch_split must be at least 1".into(),
            ));
        }
        let mut stores = self.bootstrap_stores.clone();
        stores.sort_unstable();
        stores.dedup();
        if stores.len() != self.bootstrap_stores.len() {
            return Err(crate::Error::InvalidConfig(
                "bootstrap_stores contains duplicates".into(),
            ));
        }
        if stores.contains(&0) {
            return Err(crate::Error::InvalidConfig("store id 0 is reserved".into()));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from an optional TOML file and the environment.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("MINIPD")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("cluster.bootstrap_stores")
                .try_parsing(true),
        );
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.node_id.is_empty() {
            return Err(crate::Error::InvalidConfig("node_id must not be empty".into()));
        }
        if self.server.max_body_bytes == 0 {
            return Err(crate::Error::InvalidConfig(
                "server.max_body_bytes must be positive".into(),
            ));
        }
        self.cluster.validate()
    }
}
