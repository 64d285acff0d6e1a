//! Split protocol tests: ask for ids, report the finished split

use minipd::common::ClusterConfig;
use minipd::coordinator::id_alloc::LocalIdAllocator;
use minipd::coordinator::region::{Peer, Region};
use minipd::coordinator::split::SplitAllocation;
use minipd::{Error, RegionCluster};
use std::collections::HashSet;
use std::sync::Arc;

fn cluster() -> RegionCluster {
    RegionCluster::new(ClusterConfig::default(), Arc::new(LocalIdAllocator::new(1)))
}

fn peers_for(parent: &Region, alloc: &SplitAllocation) -> Vec<Peer> {
    alloc
        .new_peer_ids
        .iter()
        .zip(parent.store_ids())
        .map(|(&id, store_id)| Peer::new(id, store_id))
        .collect()
}

/// Directory holding `[-inf, a)`, `[a, c)`, `[c, +inf)`; returns `[a, c)`.
fn three_regions(cluster: &RegionCluster) -> Region {
    let root = cluster.bootstrap(&[1, 2, 3]).unwrap();
    let ids = cluster.handle_ask_batch_split(&root, 2).unwrap();
    let children = vec![
        Region::new(root.id, "", "a")
            .with_epoch(1, 2)
            .with_peers(root.peers.clone()),
        Region::new(ids[0].new_region_id, "a", "c")
            .with_epoch(1, 2)
            .with_peers(peers_for(&root, &ids[0])),
        Region::new(ids[1].new_region_id, "c", "")
            .with_epoch(1, 2)
            .with_peers(peers_for(&root, &ids[1])),
    ];
    let committed = cluster.handle_report_batch_split(children).unwrap();
    committed[1].clone()
}

#[test]
fn test_report_split_commits_two_children() {
    let cluster = cluster();
    let root = cluster.bootstrap(&[1, 2, 3]).unwrap();
    let ids = cluster.handle_ask_split(&root).unwrap();

    let left = Region::new(root.id, "", "m").with_epoch(1, 2);
    let right = Region::new(ids.new_region_id, "m", "")
        .with_epoch(1, 2)
        .with_peers(peers_for(&root, &ids));
    let committed = cluster.handle_report_split(left, right).unwrap();

    assert_eq!(committed.len(), 2);
    assert_eq!(cluster.region_count(), 2);
    assert_eq!(cluster.get_region_by_key(b"a").unwrap().id, root.id);
    assert_eq!(cluster.get_region_by_key(b"m").unwrap().id, ids.new_region_id);
    // the left child inherits the parent's replicas
    assert_eq!(cluster.get_region(root.id).unwrap().peers, root.peers);
    cluster.check_partition().unwrap();
    assert_eq!(cluster.metrics().splits_committed.get(), 1);
}

#[test]
fn test_swapped_report_leaves_parent_unchanged() {
    let cluster = cluster();
    let parent = three_regions(&cluster);
    let before = cluster.regions();

    let left = Region::new(parent.id, "a", "b").with_epoch(1, 3);
    let right = Region::new(100, "b", "c").with_epoch(1, 3);
    let err = cluster.handle_report_split(right, left).unwrap_err();

    assert!(matches!(err, Error::SplitOrderingViolation(_)));
    assert!(err.is_structural());
    assert_eq!(cluster.get_region(parent.id).unwrap(), parent);
    assert!(cluster.get_region(100).is_none());
    assert_eq!(cluster.regions(), before);
    assert_eq!(cluster.metrics().rejections("split_ordering_violation"), 1);
}

#[test]
fn test_batch_split_into_four() {
    let cluster = cluster();
    let root = cluster.bootstrap(&[1, 2, 3]).unwrap();
    let ids = cluster.handle_ask_batch_split(&root, 3).unwrap();

    let children = vec![
        Region::new(root.id, "", "a").with_epoch(1, 1),
        Region::new(ids[0].new_region_id, "a", "b")
            .with_epoch(1, 1)
            .with_peers(peers_for(&root, &ids[0])),
        Region::new(ids[1].new_region_id, "b", "c")
            .with_epoch(1, 1)
            .with_peers(peers_for(&root, &ids[1])),
        Region::new(ids[2].new_region_id, "c", "")
            .with_epoch(1, 1)
            .with_peers(peers_for(&root, &ids[2])),
    ];
    cluster.handle_report_batch_split(children).unwrap();

    let regions = cluster.regions();
    assert_eq!(regions.len(), 4);
    let ranges: Vec<(&[u8], &[u8])> = regions
        .iter()
        .map(|r| (r.start_key.as_slice(), r.end_key.as_slice()))
        .collect();
    assert_eq!(
        ranges,
        vec![
            (&b""[..], &b"a"[..]),
            (&b"a"[..], &b"b"[..]),
            (&b"b"[..], &b"c"[..]),
            (&b"c"[..], &b""[..]),
        ]
    );
    let mut peer_ids = HashSet::new();
    for region in &regions {
        assert!(region.epoch.version > root.epoch.version, "{}", region);
        assert_eq!(region.store_ids(), vec![1, 2, 3]);
        for peer in &region.peers {
            assert!(peer_ids.insert(peer.id), "peer {} in two regions", peer.id);
        }
    }
    cluster.check_partition().unwrap();
}

#[test]
fn test_replayed_report_is_stale() {
    let cluster = cluster();
    let root = cluster.bootstrap(&[1]).unwrap();
    let ids = cluster.handle_ask_split(&root).unwrap();

    let children = vec![
        Region::new(root.id, "", "m").with_epoch(1, 2),
        Region::new(ids.new_region_id, "m", "")
            .with_epoch(1, 2)
            .with_peers(peers_for(&root, &ids)),
    ];
    cluster.handle_report_batch_split(children.clone()).unwrap();
    let snapshot = cluster.regions();

    let err = cluster.handle_report_batch_split(children).unwrap_err();
    assert!(matches!(err, Error::StaleEpoch { .. }));
    assert!(err.is_benign());
    assert_eq!(cluster.regions(), snapshot);
}

#[test]
fn test_report_from_old_parent_epoch_is_stale() {
    let cluster = cluster();
    let root = cluster.bootstrap(&[1]).unwrap();
    let ids = cluster.handle_ask_split(&root).unwrap();
    cluster
        .handle_report_split(
            Region::new(root.id, "", "m").with_epoch(1, 2),
            Region::new(ids.new_region_id, "m", "")
                .with_epoch(1, 2)
                .with_peers(peers_for(&root, &ids)),
        )
        .unwrap();

    // A store that missed the first split reports a different one
    let err = cluster
        .handle_report_split(
            Region::new(root.id, "", "f").with_epoch(1, 1),
            Region::new(200, "f", "").with_epoch(1, 1),
        )
        .unwrap_err();
    assert!(matches!(err, Error::StaleEpoch { .. }));
    assert!(cluster.get_region(200).is_none());
}

#[test]
fn test_report_rejects_gap_and_short_cover() {
    let cluster = cluster();
    let parent = three_regions(&cluster);

    let gap = cluster.handle_report_split(
        Region::new(parent.id, "a", "b").with_epoch(1, 3),
        Region::new(100, "bb", "c").with_epoch(1, 3),
    );
    assert!(matches!(gap, Err(Error::SplitOrderingViolation(_))));

    let overshoot = cluster.handle_report_split(
        Region::new(parent.id, "a", "b").with_epoch(1, 3),
        Region::new(100, "b", "d").with_epoch(1, 3),
    );
    assert!(matches!(overshoot, Err(Error::SplitOrderingViolation(_))));

    let single = cluster.handle_report_batch_split(vec![parent.clone()]);
    assert!(matches!(single, Err(Error::SplitOrderingViolation(_))));

    assert_eq!(cluster.get_region(parent.id).unwrap(), parent);
    cluster.check_partition().unwrap();
}

#[test]
fn test_report_rejects_live_child_id() {
    let cluster = cluster();
    let parent = three_regions(&cluster);
    let neighbour = cluster.get_region_by_key(b"").unwrap();

    let err = cluster
        .handle_report_split(
            Region::new(parent.id, "a", "b").with_epoch(1, 3),
            Region::new(neighbour.id, "b", "c").with_epoch(1, 3),
        )
        .unwrap_err();
    assert!(matches!(err, Error::RegionIdInUse(id) if id == neighbour.id));
    assert_eq!(cluster.get_region(neighbour.id).unwrap(), neighbour);
}

#[test]
fn test_report_rejects_duplicate_child_ids() {
    let cluster = cluster();
    let parent = three_regions(&cluster);

    let err = cluster
        .handle_report_split(
            Region::new(300, "a", "b").with_epoch(1, 3),
            Region::new(300, "b", "c").with_epoch(1, 3),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRegion(_)));
    assert_eq!(cluster.get_region(parent.id).unwrap(), parent);
}

#[test]
fn test_ask_returns_fresh_ids_without_mutation() {
    let cluster = cluster();
    let parent = three_regions(&cluster);
    let before = cluster.regions();

    let mut live: HashSet<u64> = HashSet::new();
    for region in &before {
        live.insert(region.id);
        live.extend(region.peers.iter().map(|p| p.id));
    }

    let mut seen = HashSet::new();
    for _ in 0..20 {
        let a = cluster.handle_ask_split(&parent).unwrap();
        assert_eq!(a.new_peer_ids.len(), parent.peers.len());
        for id in std::iter::once(a.new_region_id).chain(a.new_peer_ids) {
            assert!(!live.contains(&id), "id {} is already live", id);
            assert!(seen.insert(id), "id {} handed out twice", id);
        }
    }
    for a in cluster.handle_ask_batch_split(&parent, 5).unwrap() {
        assert!(seen.insert(a.new_region_id));
    }

    assert_eq!(cluster.regions(), before);
}

#[test]
fn test_ask_with_stale_or_unknown_parent() {
    let cluster = cluster();
    let root = cluster.bootstrap(&[1]).unwrap();
    let ids = cluster.handle_ask_split(&root).unwrap();
    cluster
        .handle_report_split(
            Region::new(root.id, "", "m").with_epoch(1, 2),
            Region::new(ids.new_region_id, "m", "")
                .with_epoch(1, 2)
                .with_peers(peers_for(&root, &ids)),
        )
        .unwrap();

    // still holding the pre-split record
    assert!(matches!(
        cluster.handle_ask_split(&root),
        Err(Error::StaleEpoch { .. })
    ));
    assert!(matches!(
        cluster.handle_ask_split(&Region::new(999, "x", "y").with_epoch(1, 1)),
        Err(Error::UnknownRegion(_))
    ));
}

#[test]
fn test_new_child_without_own_peers_is_rejected() {
    let cluster = cluster();
    let root = cluster.bootstrap(&[1, 2, 3]).unwrap();
    let ids = cluster.handle_ask_split(&root).unwrap();

    let err = cluster
        .handle_report_split(
            Region::new(root.id, "", "m").with_epoch(1, 2),
            Region::new(ids.new_region_id, "m", "").with_epoch(1, 2),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRegion(_)));

    let err = cluster
        .handle_report_split(
            Region::new(root.id, "", "m").with_epoch(1, 2),
            Region::new(ids.new_region_id, "m", "")
                .with_epoch(1, 2)
                .with_peers(root.peers.clone()),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRegion(_)));

    assert_eq!(cluster.regions(), vec![root]);
}

#[test]
fn test_split_at_last_version_is_rejected() {
    let cluster = cluster();
    let root = cluster.bootstrap(&[1]).unwrap();
    let mut exhausted = root.clone();
    exhausted.epoch.version = u64::MAX;
    cluster
        .handle_region_heartbeat(exhausted.clone(), root.peers[0])
        .unwrap();
    let ids = cluster.handle_ask_split(&exhausted).unwrap();

    let err = cluster
        .handle_report_split(
            Region::new(root.id, "", "m").with_epoch(1, u64::MAX),
            Region::new(ids.new_region_id, "m", "")
                .with_epoch(1, u64::MAX)
                .with_peers(peers_for(&root, &ids)),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRegion(_)));
    assert_eq!(cluster.region_count(), 1);
    cluster.check_partition().unwrap();
}
