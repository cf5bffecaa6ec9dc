//! Core types for the history tree
//!
//! This module defines the foundational types:
//! - TreeId / BranchId: Unique identifiers for history trees and branches
//! - AncestorRange: Immutable `[begin, end)` slice of another branch's nodes
//! - RetentionHints: Opaque retention metadata carried on every branch
//! - HistoryEvent: A single event inside a node batch

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Node identifier within a branch. Equals the first event id of the batch.
pub type NodeId = i64;

/// Version stamp distinguishing competing writes to the same node.
pub type TransactionId = i64;

/// Event identifier within a workflow history.
pub type EventId = i64;

/// Shard lease token. Bumped on every ownership change.
pub type RangeId = i64;

/// Shard identifier.
pub type ShardId = i32;

/// Id of the first event of every history
pub const FIRST_EVENT_ID: EventId = 1;

/// Transaction id that precedes the first batch of a tree
pub const EMPTY_TRANSACTION_ID: TransactionId = 0;

/// Upper bound used when a range has no end (a branch's own range).
pub const MAX_NODE_ID: NodeId = i64::MAX;

/// Unique identifier for a history tree
///
/// A tree is the set of all branches descending from a single root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeId(Uuid);

impl TreeId {
    /// Create a new random TreeId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a TreeId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse a TreeId from its string representation
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the raw bytes of this TreeId
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for TreeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a branch within a tree
///
/// Branch ids are globally unique, so a branch id alone is enough to
/// partition node storage. The tree id still travels with it for addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchId(Uuid);

impl BranchId {
    /// Create a new random BranchId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a BranchId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse a BranchId from a string representation
    ///
    /// Accepts standard UUID format (with or without hyphens).
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the raw bytes of this BranchId
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for BranchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable `[begin, end)` slice of an ancestor branch's nodes
///
/// Fixed at fork time. The ancestor branch may keep growing past `end`
/// without affecting descendants that reference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AncestorRange {
    /// Branch owning the nodes
    pub branch_id: BranchId,
    /// First node id included
    pub begin_node_id: NodeId,
    /// First node id excluded
    pub end_node_id: NodeId,
}

impl AncestorRange {
    /// Create a new ancestor range
    pub fn new(branch_id: BranchId, begin_node_id: NodeId, end_node_id: NodeId) -> Self {
        Self {
            branch_id,
            begin_node_id,
            end_node_id,
        }
    }

    /// Check whether `node_id` falls inside this range
    #[inline]
    pub fn contains(&self, node_id: NodeId) -> bool {
        node_id >= self.begin_node_id && node_id < self.end_node_id
    }

    /// Check whether the range covers no node ids
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin_node_id >= self.end_node_id
    }

    /// Intersect with `[min, max)`; returns None when nothing remains
    pub fn clip(&self, min: NodeId, max: NodeId) -> Option<AncestorRange> {
        let clipped = AncestorRange {
            branch_id: self.branch_id,
            begin_node_id: self.begin_node_id.max(min),
            end_node_id: self.end_node_id.min(max),
        };
        if clipped.is_empty() {
            None
        } else {
            Some(clipped)
        }
    }
}

impl fmt::Display for AncestorRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}, {})",
            self.branch_id, self.begin_node_id, self.end_node_id
        )
    }
}

/// Retention hints attached when a branch is created
///
/// Stored and returned verbatim. No expiry policy is derived from them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetentionHints {
    /// Timeout of a single run
    pub run_timeout: Option<Duration>,
    /// Timeout of the whole execution chain
    pub execution_timeout: Option<Duration>,
    /// How long closed history is kept
    pub retention: Option<Duration>,
}

impl RetentionHints {
    /// Hints with only a retention duration set
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            retention: Some(retention),
            ..Self::default()
        }
    }
}

/// A single history event
///
/// The payload is opaque to this crate; only `event_id` and `version`
/// participate in batch validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Position of the event in the linear history (starts at 1)
    pub event_id: EventId,
    /// Failover version the event was written under
    pub version: i64,
    /// Event kind name
    pub event_type: String,
    /// Serialized event attributes
    pub payload: Vec<u8>,
}

impl HistoryEvent {
    /// Create a new event
    pub fn new(
        event_id: EventId,
        version: i64,
        event_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            event_id,
            version,
            event_type: event_type.into(),
            payload,
        }
    }
}
