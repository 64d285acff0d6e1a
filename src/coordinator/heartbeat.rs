//! Region heartbeat ingestion

use crate::common::{Error, Result};
use crate::coordinator::epoch::{self, EpochCheck};
use crate::coordinator::index::RegionIndex;
use crate::coordinator::region::{Peer, Region};

/// What an accepted heartbeat did to the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatChange {
    /// Newer epoch replaced the stored record
    Updated { previous: Region },
    /// Same epoch, new leader
    LeaderChanged { previous: Option<Peer> },
    /// Region was not known and overlaps nothing
    Discovered,
}

/// Apply one store's report for one region.
///
/// Rejections leave the index untouched; a replay of the stored record is
/// rejected as stale.
pub fn apply_heartbeat(index: &mut RegionIndex, mut region: Region, leader: Peer) -> Result<HeartbeatChange> {
    if !region.peers.contains(&leader) {
        return Err(Error::InvalidRegion(format!(
            "region {} leader peer {} (store {}) is not a member",
            region.id, leader.id, leader.store_id
        )));
    }
    region.leader = Some(leader);
    region.check_shape()?;

    let Some(current) = epoch::locate(index, &region).cloned() else {
        return discover(index, region);
    };
    match epoch::classify(&current, &region) {
        EpochCheck::Ok => {}
        EpochCheck::StaleEpoch => return Err(epoch::stale_epoch(&current, &region)),
        EpochCheck::RangeMismatch | EpochCheck::UnknownRegion => {
            return Err(epoch::range_mismatch(&current, &region))
        }
    }

    if region.epoch.conf_ver == current.epoch.conf_ver && !same_peers(&current.peers, &region.peers) {
        // membership changed without a conf_ver bump
        return Err(epoch::stale_epoch(&current, &region));
    }

    let change = if region.epoch == current.epoch {
        if current.leader == region.leader {
            return Err(epoch::stale_epoch(&current, &region));
        }
        HeartbeatChange::LeaderChanged {
            previous: current.leader,
        }
    } else {
        HeartbeatChange::Updated { previous: current }
    };

    index.put(region);
    Ok(change)
}

fn discover(index: &mut RegionIndex, region: Region) -> Result<HeartbeatChange> {
    if let Some(existing) = index.lookup_range(&region.start_key, &region.end_key).first() {
        return Err(Error::RangeMismatch {
            region_id: existing.id,
            current: existing.range_display(),
            requested: region.range_display(),
        });
    }
    index.put(region);
    Ok(HeartbeatChange::Discovered)
}

fn same_peers(a: &[Peer], b: &[Peer]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by_key(|p| p.id);
    b.sort_by_key(|p| p.id);
    a == b
}
