//! Region directory and split coordination
//!
//! The coordinator is responsible for:
//! - Tracking which region owns every key (keyspace index)
//! - Rejecting stale or conflicting reports (epoch validation)
//! - Applying store heartbeats
//! - The two-phase split protocol (ask, then report)

pub mod cluster;
pub mod epoch;
pub mod heartbeat;
pub mod http;
pub mod id_alloc;
pub mod index;
pub mod region;
pub mod server;
pub mod split;

pub use cluster::RegionCluster;
pub use server::Coordinator;
