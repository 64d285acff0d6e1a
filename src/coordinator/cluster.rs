//! Cluster facade
//!
//! `RegionCluster` is the single owner of the keyspace index. Every request
//! handler gets a handle to it; mutations take the write lock for the whole
//! logical operation, reads share the read lock and therefore never see a
//! half-applied split. The id allocator is only called with no lock held.

use crate::common::config::ClusterConfig;
use crate::common::metrics::MetricsRegistry;
use crate::common::{Error, Result};
use crate::coordinator::epoch;
use crate::coordinator::heartbeat::{self, HeartbeatChange};
use crate::coordinator::id_alloc::IdAllocator;
use crate::coordinator::index::RegionIndex;
use crate::coordinator::region::{Peer, Region, RegionEpoch, RegionId, StoreId};
use crate::coordinator::split::{self, SplitAllocation};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Epoch of the region created at bootstrap
pub const BOOTSTRAP_EPOCH: RegionEpoch = RegionEpoch {
    conf_ver: 1,
    version: 1,
};

pub struct RegionCluster {
    index: RwLock<RegionIndex>,
    id_alloc: Arc<dyn IdAllocator>,
    config: ClusterConfig,
    metrics: Arc<MetricsRegistry>,
}

impl RegionCluster {
    pub fn new(config: ClusterConfig, id_alloc: Arc<dyn IdAllocator>) -> Self {
        Self {
            index: RwLock::new(RegionIndex::new()),
            id_alloc,
            config,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    // === Lifecycle ===

    /// Create the first region, spanning the whole keyspace, replicated on
    /// `stores`.
    pub fn bootstrap(&self, stores: &[StoreId]) -> Result<Region> {
        if stores.is_empty() {
            return Err(Error::InvalidRequest("bootstrap needs at least one store".into()));
        }
        if self.is_bootstrapped() {
            return Err(Error::AlreadyBootstrapped);
        }
        let id = self.id_alloc.alloc()?;
        let peers = stores
            .iter()
            .map(|&store_id| Ok(Peer::new(self.id_alloc.alloc()?, store_id)))
            .collect::<Result<Vec<_>>>()?;

        let mut region = Region::new(id, Vec::new(), Vec::new()).with_peers(peers);
        region.epoch = BOOTSTRAP_EPOCH;
        self.bootstrap_region(region.clone())?;
        Ok(region)
    }

    /// Install an explicit first region. It must span the whole keyspace.
    pub fn bootstrap_region(&self, region: Region) -> Result<()> {
        region.check_shape()?;
        if !region.spans_keyspace() {
            return Err(Error::InvalidRegion(format!(
                "bootstrap region must span the keyspace, got {}",
                region.range_display()
            )));
        }
        let mut index = self.index.write();
        if !index.is_empty() {
            return Err(Error::AlreadyBootstrapped);
        }
        info!(region_id = region.id, stores = ?region.store_ids(), "Cluster bootstrapped");
        index.put(region);
        self.metrics.regions.set(index.len() as u64);
        Ok(())
    }

    pub fn is_bootstrapped(&self) -> bool {
        !self.index.read().is_empty()
    }

    // === Heartbeats ===

    /// Apply a region heartbeat reported by `leader`.
    ///
    /// `Ok` means the report was applied. Stale and mismatching reports are
    /// returned as errors and leave the directory untouched; the reporting
    /// store should refresh its view.
    pub fn handle_region_heartbeat(&self, region: Region, leader: Peer) -> Result<()> {
        self.metrics.heartbeats_total.inc();
        let region_id = region.id;
        let version = region.epoch.version;
        let conf_ver = region.epoch.conf_ver;

        let result = {
            let mut index = self.index.write();
            let result = heartbeat::apply_heartbeat(&mut index, region, leader);
            self.metrics.regions.set(index.len() as u64);
            result
        };

        match result {
            Ok(change) => {
                self.metrics.heartbeats_accepted.inc();
                match change {
                    HeartbeatChange::Updated { previous } => debug!(
                        region_id,
                        conf_ver,
                        version,
                        previous = %previous.epoch,
                        "Region epoch advanced"
                    ),
                    HeartbeatChange::LeaderChanged { previous } => debug!(
                        region_id,
                        leader = leader.id,
                        previous = ?previous.map(|p| p.id),
                        "Region leader changed"
                    ),
                    HeartbeatChange::Discovered => {
                        self.metrics.regions_discovered.inc();
                        info!(region_id, conf_ver, version, "Discovered region from heartbeat");
                    }
                }
                Ok(())
            }
            Err(e) => Err(self.reject("region_heartbeat", e)),
        }
    }

    // === Split: ask ===

    /// Reserve ids for splitting `region` in two.
    pub fn handle_ask_split(&self, region: &Region) -> Result<SplitAllocation> {
        self.metrics.asks_total.inc();
        let result = self
            .check_split_parent(region)
            .and_then(|peer_count| self.allocate_fresh(peer_count));
        let allocation = result.map_err(|e| self.reject("ask_split", e))?;
        info!(
            region_id = region.id,
            new_region_id = allocation.new_region_id,
            "Reserved ids for split"
        );
        Ok(allocation)
    }

    /// Reserve ids for splitting `region` into `split_count + 1` regions.
    pub fn handle_ask_batch_split(&self, region: &Region, split_count: usize) -> Result<Vec<SplitAllocation>> {
        self.metrics.asks_total.inc();
        let result = self.check_batch_count(split_count).and_then(|_| {
            let peer_count = self.check_split_parent(region)?;
            (0..split_count)
                .map(|_| self.allocate_fresh(peer_count))
                .collect::<Result<Vec<_>>>()
        });
        let allocations = result.map_err(|e| self.reject("ask_batch_split", e))?;
        info!(
            region_id = region.id,
            split_count,
            "Reserved ids for batch split"
        );
        Ok(allocations)
    }

    fn check_batch_count(&self, split_count: usize) -> Result<()> {
        if split_count == 0 || split_count > self.config.max_batch_split {
            return Err(Error::InvalidRequest(format!(
                "split count {} outside 1..={}",
                split_count, self.config.max_batch_split
            )));
        }
        Ok(())
    }

    fn check_split_parent(&self, region: &Region) -> Result<usize> {
        let index = self.index.read();
        if index.is_empty() {
            return Err(Error::NotBootstrapped);
        }
        epoch::validate(&index, region)?;
        // one new peer per replica the directory knows about
        Ok(epoch::locate(&index, region).map_or(region.peers.len(), |current| current.peers.len()))
    }

    /// Allocate outside the lock, then make sure the region id is not live.
    fn allocate_fresh(&self, peer_count: usize) -> Result<SplitAllocation> {
        for attempt in 0..=self.config.alloc_retries {
            let allocation = split::allocate(self.id_alloc.as_ref(), peer_count)?;
            self.metrics
                .ids_allocated
                .add(1 + allocation.new_peer_ids.len() as u64);
            if !self.index.read().contains_id(allocation.new_region_id) {
                return Ok(allocation);
            }
            warn!(
                new_region_id = allocation.new_region_id,
                attempt, "Allocator returned a live region id, redrawing"
            );
        }
        Err(Error::AllocationFailure(format!(
            "allocator kept returning live region ids after {} retries",
            self.config.alloc_retries
        )))
    }

    // === Split: report ===

    /// Commit a finished two-way split. `left` must precede `right` in key
    /// order.
    pub fn handle_report_split(&self, left: Region, right: Region) -> Result<Vec<Region>> {
        self.commit_split("report_split", vec![left, right])
    }

    /// Commit a finished split into any number of children, given in key
    /// order.
    pub fn handle_report_batch_split(&self, regions: Vec<Region>) -> Result<Vec<Region>> {
        self.commit_split("report_batch_split", regions)
    }

    fn commit_split(&self, op: &'static str, children: Vec<Region>) -> Result<Vec<Region>> {
        let mut index = self.index.write();
        let plan = match split::plan_split(&index, &children) {
            Ok(plan) => plan,
            Err(e) => return Err(self.reject(op, e)),
        };

        let parent_id = plan.parent.id;
        if let Err(e) = index.replace(parent_id, plan.children.clone()) {
            // Validated children that cannot be placed mean the index itself
            // is corrupt.
            error!(parent_id, error = %e, "Keyspace index rejected a validated split");
            panic!("keyspace index corrupted while splitting region {}: {}", parent_id, e);
        }
        self.metrics.regions.set(index.len() as u64);
        drop(index);

        self.metrics.splits_committed.inc();
        self.metrics
            .split_children_committed
            .add(plan.children.len() as u64);
        info!(
            parent_id,
            parent_version = plan.parent.epoch.version,
            children = ?plan.children.iter().map(|c| c.id).collect::<Vec<_>>(),
            "Split committed"
        );
        Ok(plan.children)
    }

    // === Validation ===

    /// Read-only check that `region` exactly matches the directory's record:
    /// same id, same range, same epoch.
    pub fn validate_request_region(&self, region: &Region) -> Result<()> {
        // id 0 would fall back to a start-key lookup
        if region.id == 0 {
            return Err(self.reject(
                "validate_request_region",
                Error::UnknownRegion("region id 0".into()),
            ));
        }
        let index = self.index.read();
        let result = epoch::validate(&index, region).and_then(|_| match epoch::locate(&index, region) {
            Some(current) if current.epoch != region.epoch => Err(Error::EpochAhead {
                region_id: current.id,
                current: current.epoch,
                requested: region.epoch,
            }),
            _ => Ok(()),
        });
        drop(index);
        result.map_err(|e| self.reject("validate_request_region", e))
    }

    // === Queries ===

    pub fn get_region(&self, id: RegionId) -> Option<Region> {
        self.index.read().get(id).cloned()
    }

    pub fn get_region_by_key(&self, key: &[u8]) -> Option<Region> {
        self.index.read().lookup(key).cloned()
    }

    /// Regions intersecting `[start_key, end_key)` in key order; `limit` 0
    /// means no limit.
    pub fn scan_regions(&self, start_key: &[u8], end_key: &[u8], limit: usize) -> Vec<Region> {
        let index = self.index.read();
        let regions = index.lookup_range(start_key, end_key).into_iter().cloned();
        if limit == 0 {
            regions.collect()
        } else {
            regions.take(limit).collect()
        }
    }

    /// Consistent snapshot of every region, in key order
    pub fn regions(&self) -> Vec<Region> {
        self.index.read().iter().cloned().collect()
    }

    pub fn region_count(&self) -> usize {
        self.index.read().len()
    }

    pub fn check_partition(&self) -> Result<()> {
        self.index.read().check_partition()
    }

    fn reject(&self, op: &'static str, e: Error) -> Error {
        self.metrics.record_rejection(&e);
        if e.is_benign() {
            debug!(op, kind = e.kind(), error = %e, "Request rejected");
        } else {
            warn!(op, kind = e.kind(), error = %e, "Request rejected");
        }
        e
    }
}
