//! Two-phase split protocol
//!
//! *Ask* reserves ids for a split the data plane is about to execute and
//! never touches the directory. *Report* commits finished splits: the parent
//! record is swapped for its children in one step once the children pass the
//! ordering and epoch checks below. Nothing about outstanding asks is
//! remembered; report-time validation is the only gate.

use crate::common::utils::{format_key, format_range};
use crate::common::{Error, Result};
use crate::coordinator::epoch;
use crate::coordinator::id_alloc::IdAllocator;
use crate::coordinator::index::RegionIndex;
use crate::coordinator::region::{PeerId, Region, RegionEpoch, RegionId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ids reserved for one prospective child region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAllocation {
    pub new_region_id: RegionId,
    /// One per replica of the parent, in the parent's peer order
    pub new_peer_ids: Vec<PeerId>,
}

/// Draw a region id plus `peer_count` peer ids.
pub fn allocate(alloc: &dyn IdAllocator, peer_count: usize) -> Result<SplitAllocation> {
    let new_region_id = alloc.alloc()?;
    let new_peer_ids = (0..peer_count)
        .map(|_| alloc.alloc())
        .collect::<Result<Vec<_>>>()?;
    Ok(SplitAllocation {
        new_region_id,
        new_peer_ids,
    })
}

/// A validated split, ready for [`RegionIndex::replace`]
#[derive(Debug, Clone)]
pub struct SplitPlan {
    pub parent: Region,
    pub children: Vec<Region>,
}

/// Children must be well-formed, distinct and contiguous in the order given.
pub fn check_split_order(children: &[Region]) -> Result<()> {
    if children.len() < 2 {
        return Err(Error::SplitOrderingViolation(format!(
            "split needs at least two children, got {}",
            children.len()
        )));
    }

    let mut ids = HashSet::with_capacity(children.len());
    for child in children {
        child.check_shape()?;
        if !ids.insert(child.id) {
            return Err(Error::InvalidRegion(format!(
                "region id {} appears twice in one split",
                child.id
            )));
        }
    }

    for (i, pair) in children.windows(2).enumerate() {
        let (left, right) = (&pair[0], &pair[1]);
        if left.end_key.is_empty() {
            return Err(Error::SplitOrderingViolation(format!(
                "child {} (region {}) ends at +inf but is followed by region {}",
                i, left.id, right.id
            )));
        }
        if left.end_key != right.start_key {
            return Err(Error::SplitOrderingViolation(format!(
                "region {} ends at {} but next region {} starts at {}",
                left.id,
                format_key(&left.end_key),
                right.id,
                format_key(&right.start_key)
            )));
        }
    }
    Ok(())
}

/// Validate a split report against the directory and compute the records
/// that will replace the parent.
pub fn plan_split(index: &RegionIndex, children: &[Region]) -> Result<SplitPlan> {
    check_split_order(children)?;
    let (first, last) = match (children.first(), children.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(Error::SplitOrderingViolation("empty split".into())),
    };

    // Replay of a split that is already in the directory
    let committed = children
        .iter()
        .all(|c| index.get(c.id).is_some_and(|r| r.same_range(c)));
    if committed {
        if let Some(current) = index.get(first.id) {
            return Err(epoch::stale_epoch(current, first));
        }
    }

    let parent = index.lookup(&first.start_key).ok_or_else(|| {
        Error::UnknownRegion(format!(
            "no region covers split start {}",
            format_key(&first.start_key)
        ))
    })?;

    for child in children {
        if child.epoch.is_stale_against(&parent.epoch) {
            return Err(Error::StaleEpoch {
                region_id: parent.id,
                current: parent.epoch,
                requested: child.epoch,
            });
        }
    }

    if parent.start_key != first.start_key || parent.end_key != last.end_key {
        return Err(Error::SplitOrderingViolation(format!(
            "children cover {} but parent region {} covers {}",
            format_range(&first.start_key, &last.end_key),
            parent.id,
            parent.range_display()
        )));
    }

    for child in children {
        if child.id != parent.id && index.contains_id(child.id) {
            return Err(Error::RegionIdInUse(child.id));
        }
    }

    check_child_peers(parent, children)?;

    let version = parent.epoch.version.checked_add(1).ok_or_else(|| {
        Error::InvalidRegion(format!(
            "region {} is at the last version {} and cannot split",
            parent.id, parent.epoch.version
        ))
    })?;
    let children = children
        .iter()
        .map(|child| {
            let mut committed = child.clone();
            committed.epoch = RegionEpoch {
                conf_ver: child.epoch.conf_ver.max(parent.epoch.conf_ver),
                version: child.epoch.version.max(version),
            };
            // only the child keeping the parent's id can get here without peers
            if committed.peers.is_empty() {
                committed.peers = parent.peers.clone();
            }
            if committed
                .leader
                .is_some_and(|leader| !committed.peers.contains(&leader))
            {
                committed.leader = None;
            }
            committed
        })
        .collect();

    Ok(SplitPlan {
        parent: parent.clone(),
        children,
    })
}

/// Every child other than the one keeping the parent's id carries its own
/// replicas, with peer ids not used by the parent or by a sibling.
fn check_child_peers(parent: &Region, children: &[Region]) -> Result<()> {
    let mut taken: HashSet<PeerId> = parent.peers.iter().map(|p| p.id).collect();
    if let Some(kept) = children.iter().find(|c| c.id == parent.id) {
        taken.extend(kept.peers.iter().map(|p| p.id));
    }
    for child in children.iter().filter(|c| c.id != parent.id) {
        if child.peers.is_empty() {
            return Err(Error::InvalidRegion(format!(
                "new region {} reported without peers",
                child.id
            )));
        }
        for peer in &child.peers {
            if !taken.insert(peer.id) {
                return Err(Error::InvalidRegion(format!(
                    "peer {} of new region {} already belongs to another region",
                    peer.id, child.id
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::id_alloc::LocalIdAllocator;
    use crate::coordinator::region::Peer;

    fn index_with(region: Region) -> RegionIndex {
        let mut index = RegionIndex::new();
        index.put(region);
        index
    }

    #[test]
    fn test_allocate() {
        let alloc = LocalIdAllocator::new(100);
        let a = allocate(&alloc, 3).unwrap();
        assert_eq!(a.new_region_id, 100);
        assert_eq!(a.new_peer_ids, vec![101, 102, 103]);
    }

    #[test]
    fn test_allocate_propagates_exhaustion() {
        let alloc = LocalIdAllocator::with_limit(1, 3);
        assert!(matches!(allocate(&alloc, 3), Err(Error::AllocationFailure(_))));
    }

    #[test]
    fn test_order_accepts_contiguous_pair() {
        let left = Region::new(1, "a", "b");
        let right = Region::new(2, "b", "c");
        check_split_order(&[left, right]).unwrap();
    }

    #[test]
    fn test_order_rejects_swapped_pair() {
        let left = Region::new(1, "a", "b");
        let right = Region::new(2, "b", "c");
        assert!(matches!(
            check_split_order(&[right, left]),
            Err(Error::SplitOrderingViolation(_))
        ));
    }

    #[test]
    fn test_order_rejects_gap_overlap_and_singletons() {
        let gap = [Region::new(1, "a", "b"), Region::new(2, "c", "d")];
        assert!(check_split_order(&gap).is_err());

        let overlap = [Region::new(1, "a", "c"), Region::new(2, "b", "d")];
        assert!(check_split_order(&overlap).is_err());

        let unbounded_middle = [Region::new(1, "a", ""), Region::new(2, "", "d")];
        assert!(check_split_order(&unbounded_middle).is_err());

        assert!(check_split_order(&[Region::new(1, "a", "b")]).is_err());
    }

    #[test]
    fn test_order_rejects_duplicate_ids() {
        let children = [
            Region::new(1, "", "a"),
            Region::new(2, "a", "b"),
            Region::new(3, "b", "c"),
            Region::new(3, "c", ""),
        ];
        assert!(matches!(
            check_split_order(&children),
            Err(Error::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_plan_bumps_version_and_inherits_peers() {
        let parent = Region::new(1, "", "")
            .with_epoch(3, 5)
            .with_peers(vec![Peer::new(10, 1), Peer::new(11, 2)]);
        let index = index_with(parent);

        let right_peers = vec![Peer::new(20, 1), Peer::new(21, 2)];
        let plan = plan_split(
            &index,
            &[
                Region::new(1, "", "k").with_epoch(3, 5),
                Region::new(2, "k", "")
                    .with_epoch(3, 5)
                    .with_peers(right_peers.clone()),
            ],
        )
        .unwrap();
        assert_eq!(plan.parent.id, 1);
        for child in &plan.children {
            assert_eq!(child.epoch, RegionEpoch::new(3, 6));
        }
        assert_eq!(plan.children[0].peers, vec![Peer::new(10, 1), Peer::new(11, 2)]);
        assert_eq!(plan.children[1].peers, right_peers);
    }

    #[test]
    fn test_plan_new_child_needs_own_peers() {
        let parent = Region::new(1, "", "")
            .with_epoch(1, 1)
            .with_peers(vec![Peer::new(10, 1), Peer::new(11, 2)]);
        let index = index_with(parent.clone());

        let without = plan_split(
            &index,
            &[Region::new(1, "", "k").with_epoch(1, 2), Region::new(2, "k", "").with_epoch(1, 2)],
        );
        assert!(matches!(without, Err(Error::InvalidRegion(_))));

        let borrowed = plan_split(
            &index,
            &[
                Region::new(1, "", "k").with_epoch(1, 2),
                Region::new(2, "k", "")
                    .with_epoch(1, 2)
                    .with_peers(parent.peers.clone()),
            ],
        );
        assert!(matches!(borrowed, Err(Error::InvalidRegion(_))));

        let shared = plan_split(
            &index,
            &[
                Region::new(1, "", "f").with_epoch(1, 2),
                Region::new(2, "f", "k")
                    .with_epoch(1, 2)
                    .with_peers(vec![Peer::new(20, 1)]),
                Region::new(3, "k", "")
                    .with_epoch(1, 2)
                    .with_peers(vec![Peer::new(20, 1)]),
            ],
        );
        assert!(matches!(shared, Err(Error::InvalidRegion(_))));
    }

    #[test]
    fn test_plan_rejects_exhausted_version() {
        let index = index_with(Region::new(1, "", "").with_epoch(1, u64::MAX));
        let err = plan_split(
            &index,
            &[
                Region::new(1, "", "k").with_epoch(1, u64::MAX),
                Region::new(2, "k", "")
                    .with_epoch(1, u64::MAX)
                    .with_peers(vec![Peer::new(20, 1)]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidRegion(_)));
    }

    #[test]
    fn test_plan_keeps_higher_reported_version() {
        let index = index_with(Region::new(1, "", "").with_epoch(1, 1));
        let plan = plan_split(
            &index,
            &[
                Region::new(1, "", "k").with_epoch(1, 4),
                Region::new(2, "k", "")
                    .with_epoch(1, 4)
                    .with_peers(vec![Peer::new(20, 1)]),
            ],
        )
        .unwrap();
        assert!(plan.children.iter().all(|c| c.epoch.version == 4));
    }

    #[test]
    fn test_plan_rejects_stale_children() {
        let index = index_with(Region::new(1, "", "").with_epoch(2, 3));
        let err = plan_split(
            &index,
            &[Region::new(1, "", "k").with_epoch(2, 2), Region::new(2, "k", "").with_epoch(2, 2)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::StaleEpoch { region_id: 1, .. }));
    }

    #[test]
    fn test_plan_rejects_partial_cover() {
        let index = index_with(Region::new(1, "", "").with_epoch(1, 1));
        let err = plan_split(
            &index,
            &[Region::new(1, "", "k").with_epoch(1, 2), Region::new(2, "k", "x").with_epoch(1, 2)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::SplitOrderingViolation(_)));
    }

    #[test]
    fn test_plan_rejects_live_child_id() {
        let mut index = RegionIndex::new();
        index.put(Region::new(1, "", "m").with_epoch(1, 1));
        index.put(Region::new(2, "m", "").with_epoch(1, 1));
        let err = plan_split(
            &index,
            &[Region::new(1, "", "f").with_epoch(1, 2), Region::new(2, "f", "m").with_epoch(1, 2)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::RegionIdInUse(2)));
    }

    #[test]
    fn test_plan_unknown_parent() {
        let index = RegionIndex::new();
        let err = plan_split(&index, &[Region::new(1, "a", "b"), Region::new(2, "b", "c")]).unwrap_err();
        assert!(matches!(err, Error::UnknownRegion(_)));
    }
}
