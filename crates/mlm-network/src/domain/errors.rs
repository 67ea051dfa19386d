//! # Error Types
//!
//! Failures of the network builder and its collaborators.

use thiserror::Error;

use super::entities::ExternalId;
use super::sync_run::{SyncStatus, SyncType};

/// Network builder errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// A query against the external source failed.
    #[error("Source query failed: {0}")]
    Source(String),

    /// A read or write against the reporting store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A sync run was asked to move along an edge its state machine lacks.
    #[error("Invalid transition for {sync_type}: {from} -> {to}")]
    InvalidTransition {
        sync_type: SyncType,
        from: SyncStatus,
        to: SyncStatus,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Affiliate not found: {0}")]
    AffiliateNotFound(ExternalId),

    /// A built network broke one of its structural rules.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

impl NetworkError {
    /// Whether the failure came from the external source.
    pub fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }
}

/// Result alias for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
