//! Error types for minipd

use crate::coordinator::region::{RegionEpoch, RegionId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Region Directory Errors ===
    #[error("Stale epoch for region {region_id}: current {current}, requested {requested}")]
    StaleEpoch {
        region_id: RegionId,
        current: RegionEpoch,
        requested: RegionEpoch,
    },

    #[error("Epoch ahead of directory for region {region_id}: current {current}, requested {requested}")]
    EpochAhead {
        region_id: RegionId,
        current: RegionEpoch,
        requested: RegionEpoch,
    },

    #[error("Unknown region: {0}")]
    UnknownRegion(String),

    #[error("Range mismatch for region {region_id}: current {current}, requested {requested}")]
    RangeMismatch {
        region_id: RegionId,
        current: String,
        requested: String,
    },

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    // === Split Errors ===
    #[error("Split ordering violation: {0}")]
    SplitOrderingViolation(String),

    #[error("Region id {0} is already in use")]
    RegionIdInUse(RegionId),

    #[error("ID allocation failed: {0}")]
    AllocationFailure(String),

    // === Cluster Errors ===
    #[error("Cluster is already bootstrapped")]
    AlreadyBootstrapped,

    #[error("Cluster is not bootstrapped")]
    NotBootstrapped,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable label for responses and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::StaleEpoch { .. } => "stale_epoch",
            Error::EpochAhead { .. } => "epoch_ahead",
            Error::UnknownRegion(_) => "unknown_region",
            Error::RangeMismatch { .. } => "range_mismatch",
            Error::InvalidRegion(_) => "invalid_region",
            Error::SplitOrderingViolation(_) => "split_ordering_violation",
            Error::RegionIdInUse(_) => "region_id_in_use",
            Error::AllocationFailure(_) => "allocation_failure",
            Error::AlreadyBootstrapped => "already_bootstrapped",
            Error::NotBootstrapped => "not_bootstrapped",
            Error::InvalidRequest(_) => "invalid_request",
            Error::InvalidConfig(_) => "invalid_config",
            Error::Internal(_) => "internal",
        }
    }

    /// Expected under normal churn: the caller's view is simply behind (or
    /// ahead of) the directory.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Error::StaleEpoch { .. } | Error::EpochAhead { .. } | Error::UnknownRegion(_)
        )
    }

    /// Structural disagreement that should alert.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::RangeMismatch { .. }
                | Error::SplitOrderingViolation(_)
                | Error::RegionIdInUse(_)
                | Error::InvalidRegion(_)
        )
    }

    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::EpochAhead { .. } | Error::AllocationFailure(_) | Error::NotBootstrapped
        )
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::UnknownRegion(_) => StatusCode::NOT_FOUND,
            Error::StaleEpoch { .. }
            | Error::EpochAhead { .. }
            | Error::RangeMismatch { .. }
            | Error::RegionIdInUse(_)
            | Error::AlreadyBootstrapped => StatusCode::CONFLICT,
            Error::InvalidRegion(_)
            | Error::SplitOrderingViolation(_)
            | Error::InvalidRequest(_)
            | Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::AllocationFailure(_) | Error::NotBootstrapped => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
