//! Error types for the history tree
//!
//! Every failure surfaced to callers is one of the kinds below. Backend
//! driver errors are classified into these kinds before they leave the
//! engine. We use `thiserror` for `Display` and `Error` implementations.

use crate::types::{RangeId, ShardId};
use thiserror::Error;

/// Result type alias for history operations
pub type HistoryResult<T> = std::result::Result<T, HistoryError>;

/// Error kinds surfaced by history operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// The caller no longer holds the shard lease
    #[error("Shard {shard_id} ownership lost: request range id {request_range_id}, current {current_range_id:?}")]
    ShardOwnershipLost {
        /// Shard the request targeted
        shard_id: ShardId,
        /// Range id presented by the caller
        request_range_id: RangeId,
        /// Range id currently recorded for the shard, if any
        current_range_id: Option<RangeId>,
    },

    /// Causal chain mismatch or conflicting write
    #[error("Conflict: {reason}")]
    Conflict {
        /// What conflicted
        reason: String,
    },

    /// Branch or requested window absent
    #[error("Not found: {what}")]
    NotFound {
        /// What was missing
        what: String,
    },

    /// Deadline exceeded; safe to retry
    #[error("Operation {operation} timed out")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
    },

    /// Payload over the configured size limit
    #[error("Transaction size {size} exceeds limit {limit}")]
    TransactionSizeLimit {
        /// Serialized size of the rejected batch
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// Stored history is structurally inconsistent
    #[error("Data loss: {reason}")]
    DataLoss {
        /// What was inconsistent
        reason: String,
    },

    /// Malformed token or payload
    #[error("Deserialization error: {reason}")]
    Deserialization {
        /// Decoder message
        reason: String,
    },

    /// Bad fork point, trim watermark, or request field
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong
        reason: String,
    },

    /// Backend temporarily unavailable; safe to retry
    #[error("Unavailable: {reason}")]
    Unavailable {
        /// Backend message
        reason: String,
    },
}

impl HistoryError {
    /// Create a conflict error
    pub fn conflict(reason: impl Into<String>) -> Self {
        HistoryError::Conflict {
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        HistoryError::NotFound { what: what.into() }
    }

    /// Create a data-loss error
    pub fn data_loss(reason: impl Into<String>) -> Self {
        HistoryError::DataLoss {
            reason: reason.into(),
        }
    }

    /// Create a deserialization error
    pub fn deserialization(reason: impl Into<String>) -> Self {
        HistoryError::Deserialization {
            reason: reason.into(),
        }
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        HistoryError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        HistoryError::Unavailable {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same request can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HistoryError::Timeout { .. } | HistoryError::Unavailable { .. }
        )
    }

    /// Whether the caller must refetch state before deciding to retry
    pub fn is_conflict(&self) -> bool {
        matches!(self, HistoryError::Conflict { .. })
    }

    /// Whether the error indicates corrupted stored history
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            HistoryError::DataLoss { .. } | HistoryError::Deserialization { .. }
        )
    }

    /// Stable code for the error kind
    pub fn error_code(&self) -> &'static str {
        match self {
            HistoryError::ShardOwnershipLost { .. } => "ShardOwnershipLost",
            HistoryError::Conflict { .. } => "Conflict",
            HistoryError::NotFound { .. } => "NotFound",
            HistoryError::Timeout { .. } => "Timeout",
            HistoryError::TransactionSizeLimit { .. } => "TransactionSizeLimit",
            HistoryError::DataLoss { .. } => "DataLoss",
            HistoryError::Deserialization { .. } => "Deserialization",
            HistoryError::InvalidArgument { .. } => "InvalidArgument",
            HistoryError::Unavailable { .. } => "Unavailable",
        }
    }
}

impl From<bincode::Error> for HistoryError {
    fn from(e: bincode::Error) -> Self {
        HistoryError::deserialization(e.to_string())
    }
}
