//! Keyspace index
//!
//! Ordered map from start key to the region owning `[start_key, end_key)`,
//! with a secondary id index. Callers hold the directory lock around every
//! logical operation, so each method observes and leaves a consistent map.

use crate::common::utils::{format_key, format_range};
use crate::common::{Error, Result};
use crate::coordinator::region::{Region, RegionId};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

#[derive(Debug, Default, Clone)]
pub struct RegionIndex {
    by_start: BTreeMap<Vec<u8>, Region>,
    by_id: HashMap<RegionId, Vec<u8>>,
}

impl RegionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        let start = self.by_id.get(&id)?;
        self.by_start.get(start)
    }

    pub fn contains_id(&self, id: RegionId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Region owning `key`, if any.
    pub fn lookup(&self, key: &[u8]) -> Option<&Region> {
        let (_, region) = self
            .by_start
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
            .next_back()?;
        region.contains(key).then_some(region)
    }

    /// Regions intersecting `[start_key, end_key)`, in key order.
    pub fn lookup_range(&self, start_key: &[u8], end_key: &[u8]) -> Vec<&Region> {
        // The region containing start_key may begin before it.
        let from = match self.lookup(start_key) {
            Some(region) => region.start_key.clone(),
            None => start_key.to_vec(),
        };
        self.by_start
            .range::<[u8], _>((Bound::Included(from.as_slice()), Bound::Unbounded))
            .map(|(_, region)| region)
            .take_while(|region| end_key.is_empty() || region.start_key.as_slice() < end_key)
            .filter(|region| region.overlaps(start_key, end_key))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.by_start.values()
    }

    /// Insert or replace `region`, keyed by its start key.
    ///
    /// Any record with the same id or an overlapping range is removed and
    /// returned.
    pub fn put(&mut self, region: Region) -> Vec<Region> {
        let mut displaced: Vec<RegionId> = self
            .lookup_range(&region.start_key, &region.end_key)
            .into_iter()
            .map(|r| r.id)
            .collect();
        if self.by_id.contains_key(&region.id) && !displaced.contains(&region.id) {
            displaced.push(region.id);
        }

        let removed = displaced
            .into_iter()
            .filter_map(|id| self.remove(id))
            .collect();

        self.by_id.insert(region.id, region.start_key.clone());
        self.by_start.insert(region.start_key.clone(), region);
        removed
    }

    pub fn remove(&mut self, id: RegionId) -> Option<Region> {
        let start = self.by_id.remove(&id)?;
        self.by_start.remove(&start)
    }

    /// Replace `parent_id` by `children` in one step.
    ///
    /// Children must be sorted, contiguous and cover exactly the parent's
    /// range, and no other record may overlap them. The index is untouched
    /// when any of this does not hold.
    pub fn replace(&mut self, parent_id: RegionId, children: Vec<Region>) -> Result<Region> {
        let parent = self
            .get(parent_id)
            .ok_or_else(|| Error::Internal(format!("split parent {} not indexed", parent_id)))?;

        let (first, last) = match (children.first(), children.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(Error::Internal("split without children".into())),
        };
        if first.start_key != parent.start_key || last.end_key != parent.end_key {
            return Err(Error::Internal(format!(
                "children span {} but parent {} covers {}",
                format_range(&first.start_key, &last.end_key),
                parent_id,
                parent.range_display()
            )));
        }
        for pair in children.windows(2) {
            if pair[0].end_key != pair[1].start_key || pair[0].end_key.is_empty() {
                return Err(Error::Internal(format!(
                    "children not contiguous at {}",
                    format_key(&pair[0].end_key)
                )));
            }
        }
        for child in &children {
            if child.id != parent_id && self.by_id.contains_key(&child.id) {
                return Err(Error::Internal(format!("child id {} already indexed", child.id)));
            }
        }
        let intruders: Vec<RegionId> = self
            .lookup_range(&parent.start_key, &parent.end_key)
            .into_iter()
            .map(|r| r.id)
            .filter(|id| *id != parent_id)
            .collect();
        if !intruders.is_empty() {
            return Err(Error::Internal(format!(
                "regions {:?} overlap split parent {}",
                intruders, parent_id
            )));
        }

        let parent = self
            .remove(parent_id)
            .ok_or_else(|| Error::Internal(format!("split parent {} vanished", parent_id)))?;
        for child in children {
            self.by_id.insert(child.id, child.start_key.clone());
            self.by_start.insert(child.start_key.clone(), child);
        }
        Ok(parent)
    }

    /// Verify the records form an exact partition of the keyspace.
    pub fn check_partition(&self) -> Result<()> {
        let mut expected_start: &[u8] = &[];
        let mut reached_end = false;
        for region in self.by_start.values() {
            if reached_end {
                return Err(Error::Internal(format!(
                    "{} starts after a region ending at +inf",
                    region
                )));
            }
            if region.start_key.as_slice() != expected_start {
                return Err(Error::Internal(format!(
                    "{} starts at {} but previous region ends at {}",
                    region,
                    format_key(&region.start_key),
                    format_key(expected_start)
                )));
            }
            if region.end_key.is_empty() {
                reached_end = true;
            } else if region.end_key <= region.start_key {
                return Err(Error::Internal(format!("{} has an empty range", region)));
            }
            expected_start = &region.end_key;
        }
        if !reached_end {
            return Err(Error::Internal(format!(
                "keyspace not covered from {}",
                format_key(expected_start)
            )));
        }
        if self.by_id.len() != self.by_start.len() {
            return Err(Error::Internal("id index out of sync".into()));
        }
        Ok(())
    }
}
