//! Region records
//!
//! A region owns the half-open key range `[start_key, end_key)`. An empty
//! `start_key` is the minimum key, an empty `end_key` is the maximum key.

use crate::common::utils::format_range;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The ID of a region
pub type RegionId = u64;
/// The ID of a store
pub type StoreId = u64;
/// The ID of a single replica of a region
pub type PeerId = u64;

/// Region epoch.
///
/// `conf_ver` increments on every membership change, `version` on every
/// range change (split).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionEpoch {
    pub conf_ver: u64,
    pub version: u64,
}

impl RegionEpoch {
    pub fn new(conf_ver: u64, version: u64) -> Self {
        Self { conf_ver, version }
    }

    /// True when either component is behind `current`.
    pub fn is_stale_against(&self, current: &RegionEpoch) -> bool {
        self.conf_ver < current.conf_ver || self.version < current.version
    }
}

impl fmt::Display for RegionEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(conf_ver: {}, version: {})", self.conf_ver, self.version)
    }
}

/// One replica of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub store_id: StoreId,
}

impl Peer {
    pub fn new(id: PeerId, store_id: StoreId) -> Self {
        Self { id, store_id }
    }
}

/// Region record as held by the directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    #[serde(with = "hex_key", default)]
    pub start_key: Vec<u8>,
    #[serde(with = "hex_key", default)]
    pub end_key: Vec<u8>,
    #[serde(default)]
    pub epoch: RegionEpoch,
    #[serde(default)]
    pub peers: Vec<Peer>,
    /// Last leader reported through a heartbeat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<Peer>,
}

impl Region {
    pub fn new(id: RegionId, start_key: impl Into<Vec<u8>>, end_key: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            start_key: start_key.into(),
            end_key: end_key.into(),
            ..Default::default()
        }
    }

    pub fn with_epoch(mut self, conf_ver: u64, version: u64) -> Self {
        self.epoch = RegionEpoch::new(conf_ver, version);
        self
    }

    pub fn with_peers(mut self, peers: Vec<Peer>) -> Self {
        self.peers = peers;
        self
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_slice() && (self.end_key.is_empty() || key < self.end_key.as_slice())
    }

    pub fn same_range(&self, other: &Region) -> bool {
        self.start_key == other.start_key && self.end_key == other.end_key
    }

    /// Does `[start_key, end_key)` intersect this region?
    pub fn overlaps(&self, start_key: &[u8], end_key: &[u8]) -> bool {
        let starts_before_end = end_key.is_empty() || self.start_key.as_slice() < end_key;
        let ends_after_start = self.end_key.is_empty() || self.end_key.as_slice() > start_key;
        starts_before_end && ends_after_start
    }

    pub fn spans_keyspace(&self) -> bool {
        self.start_key.is_empty() && self.end_key.is_empty()
    }

    pub fn range_display(&self) -> String {
        format_range(&self.start_key, &self.end_key)
    }

    pub fn store_ids(&self) -> Vec<StoreId> {
        self.peers.iter().map(|p| p.store_id).collect()
    }

    /// Structural sanity: a real id, a non-empty range and a leader that is
    /// one of the peers.
    pub fn check_shape(&self) -> crate::Result<()> {
        if self.id == 0 {
            return Err(crate::Error::InvalidRegion("region id must be non-zero".into()));
        }
        if !self.end_key.is_empty() && self.start_key >= self.end_key {
            return Err(crate::Error::InvalidRegion(format!(
                "region {} has empty range {}",
                self.id,
                self.range_display()
            )));
        }
        if let Some(leader) = &self.leader {
            if !self.peers.contains(leader) {
                return Err(crate::Error::InvalidRegion(format!(
                    "region {} leader {} is not one of its peers",
                    self.id, leader.id
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "region {} {} epoch {}",
            self.id,
            self.range_display(),
            self.epoch
        )
    }
}

/// Hex encoding for keys in JSON bodies
pub mod hex_key {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
