//! Core types for the branching history tree
//!
//! This crate defines the foundational types used throughout the system:
//! - TreeId / BranchId: Identifiers for trees and branches
//! - AncestorRange: Immutable slice of an ancestor branch
//! - HistoryEvent: Unit of history stored inside node batches
//! - BranchToken: Opaque caller handle and its codec
//! - HistoryError: Error taxonomy shared by every layer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod token;
pub mod types;

pub use error::{HistoryError, HistoryResult};
pub use token::{validate_ancestors, BranchInfo, BranchToken, TOKEN_FORMAT_VERSION};
pub use types::{
    AncestorRange, BranchId, EventId, HistoryEvent, NodeId, RangeId, RetentionHints, ShardId,
    TransactionId, TreeId, EMPTY_TRANSACTION_ID, FIRST_EVENT_ID, MAX_NODE_ID,
};
