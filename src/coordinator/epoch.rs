//! Epoch validation
//!
//! Every mutating request is checked here before it touches the index: the
//! request's `(id, conf_ver, version)` acts as a compare-and-swap token
//! against the directory's current record.

use crate::common::{Error, Result};
use crate::coordinator::index::RegionIndex;
use crate::coordinator::region::Region;

/// Outcome of comparing a candidate region with the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochCheck {
    Ok,
    StaleEpoch,
    UnknownRegion,
    RangeMismatch,
}

/// Find the record a candidate refers to: by id, or by start key when the
/// caller does not know the id.
pub fn locate<'a>(index: &'a RegionIndex, candidate: &Region) -> Option<&'a Region> {
    if candidate.id == 0 {
        index.lookup(&candidate.start_key)
    } else {
        index.get(candidate.id)
    }
}

/// Compare a candidate with the current record for the same region.
pub fn classify(current: &Region, candidate: &Region) -> EpochCheck {
    if candidate.epoch.is_stale_against(&current.epoch) {
        EpochCheck::StaleEpoch
    } else if !current.same_range(candidate) {
        EpochCheck::RangeMismatch
    } else {
        EpochCheck::Ok
    }
}

pub fn check_region(index: &RegionIndex, candidate: &Region) -> EpochCheck {
    match locate(index, candidate) {
        Some(current) => classify(current, candidate),
        None => EpochCheck::UnknownRegion,
    }
}

/// Like [`check_region`], but turns rejections into typed errors.
pub fn validate(index: &RegionIndex, candidate: &Region) -> Result<()> {
    let Some(current) = locate(index, candidate) else {
        return Err(unknown_region(candidate));
    };
    match classify(current, candidate) {
        EpochCheck::Ok => Ok(()),
        EpochCheck::StaleEpoch => Err(stale_epoch(current, candidate)),
        EpochCheck::RangeMismatch => Err(range_mismatch(current, candidate)),
        EpochCheck::UnknownRegion => Err(unknown_region(candidate)),
    }
}

pub(crate) fn unknown_region(candidate: &Region) -> Error {
    if candidate.id == 0 {
        Error::UnknownRegion(format!("no region covers {}", candidate.range_display()))
    } else {
        Error::UnknownRegion(format!("region {}", candidate.id))
    }
}

pub(crate) fn stale_epoch(current: &Region, candidate: &Region) -> Error {
    Error::StaleEpoch {
        region_id: current.id,
        current: current.epoch,
        requested: candidate.epoch,
    }
}

pub(crate) fn range_mismatch(current: &Region, candidate: &Region) -> Error {
    Error::RangeMismatch {
        region_id: current.id,
        current: current.range_display(),
        requested: candidate.range_display(),
    }
}
