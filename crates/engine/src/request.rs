//! Request and response types for history operations
//!
//! Branch tokens and page tokens travel as opaque bytes. Callers obtain them
//! from earlier responses and never build them by hand.

use chrono::{DateTime, Utc};
use historytree_core::{
    BranchId, EventId, HistoryEvent, NodeId, RangeId, ShardId, TransactionId, TreeId,
};

/// Append a batch of events to a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendHistoryNodesRequest {
    /// Shard the caller owns
    pub shard_id: ShardId,
    /// Caller's lease on the shard
    pub range_id: RangeId,
    /// Encoded branch token
    pub branch_token: Vec<u8>,
    /// Contiguous events; the first event id becomes the node id
    pub events: Vec<HistoryEvent>,
    /// Version stamp of this write
    pub transaction_id: TransactionId,
    /// Transaction id of the preceding batch
    pub prev_transaction_id: TransactionId,
    /// Create the branch row before writing
    pub is_new_branch: bool,
    /// Annotation stored on a newly created branch
    pub info: String,
}

/// Append an already serialized batch to a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendRawHistoryNodesRequest {
    /// Shard the caller owns
    pub shard_id: ShardId,
    /// Caller's lease on the shard
    pub range_id: RangeId,
    /// Encoded branch token
    pub branch_token: Vec<u8>,
    /// Node id (first event id of the serialized batch)
    pub node_id: NodeId,
    /// Serialized batch
    pub blob: Vec<u8>,
    /// Version stamp of this write
    pub transaction_id: TransactionId,
    /// Transaction id of the preceding batch
    pub prev_transaction_id: TransactionId,
    /// Create the branch row before writing
    pub is_new_branch: bool,
    /// Annotation stored on a newly created branch
    pub info: String,
}

/// Result of an append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendHistoryNodesResponse {
    /// Serialized bytes written
    pub size: usize,
    /// Node the batch was written to
    pub node_id: NodeId,
}

/// Read a window of a branch's linear history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadHistoryBranchRequest {
    /// Shard the branch belongs to
    pub shard_id: ShardId,
    /// Encoded branch token
    pub branch_token: Vec<u8>,
    /// First event id included
    pub min_event_id: EventId,
    /// First event id excluded
    pub max_event_id: EventId,
    /// Batches per page; 0 means the configured default
    pub page_size: usize,
    /// Empty for the first page
    pub next_page_token: Vec<u8>,
}

impl ReadHistoryBranchRequest {
    /// First-page request for `[min_event_id, max_event_id)`
    pub fn new(
        shard_id: ShardId,
        branch_token: Vec<u8>,
        min_event_id: EventId,
        max_event_id: EventId,
        page_size: usize,
    ) -> Self {
        Self {
            shard_id,
            branch_token,
            min_event_id,
            max_event_id,
            page_size,
            next_page_token: Vec::new(),
        }
    }

    /// Same request resumed at `token`
    pub fn with_page_token(mut self, token: Vec<u8>) -> Self {
        self.next_page_token = token;
        self
    }
}

/// One page of events
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadHistoryBranchResponse {
    /// Events in history order (descending for reverse reads)
    pub events: Vec<HistoryEvent>,
    /// Empty when the window is exhausted
    pub next_page_token: Vec<u8>,
    /// Serialized bytes behind the returned events
    pub size: usize,
}

/// A batch annotated with its version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryBatch {
    /// Node the batch is stored at
    pub node_id: NodeId,
    /// Version of the batch
    pub transaction_id: TransactionId,
    /// Decoded events
    pub events: Vec<HistoryEvent>,
}

/// One page of batches
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadHistoryBranchByBatchResponse {
    /// Batches in increasing node order
    pub batches: Vec<HistoryBatch>,
    /// Empty when the window is exhausted
    pub next_page_token: Vec<u8>,
    /// Serialized bytes behind the returned batches
    pub size: usize,
}

/// A batch as stored, without decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHistoryNode {
    /// Node the batch is stored at
    pub node_id: NodeId,
    /// Version of the batch
    pub transaction_id: TransactionId,
    /// Serialized events
    pub blob: Vec<u8>,
}

/// One page of raw batches
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadRawHistoryBranchResponse {
    /// Batches in increasing node order
    pub nodes: Vec<RawHistoryNode>,
    /// Empty when the window is exhausted
    pub next_page_token: Vec<u8>,
    /// Total blob bytes returned
    pub size: usize,
}

/// Create a branch sharing history with a source branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkHistoryBranchRequest {
    /// Shard the caller owns
    pub shard_id: ShardId,
    /// Caller's lease on the shard
    pub range_id: RangeId,
    /// Namespace recorded on the new branch
    pub namespace_id: String,
    /// Encoded token of the source branch
    pub fork_branch_token: Vec<u8>,
    /// First node not inherited by the new branch
    pub fork_node_id: NodeId,
    /// Annotation stored on the new branch
    pub info: String,
    /// Run the new branch belongs to
    pub new_run_id: String,
}

/// Result of a fork
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkHistoryBranchResponse {
    /// Encoded token of the new branch
    pub new_branch_token: Vec<u8>,
}

/// Roll a branch back to a committed watermark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimHistoryBranchRequest {
    /// Shard the caller owns
    pub shard_id: ShardId,
    /// Caller's lease on the shard
    pub range_id: RangeId,
    /// Encoded branch token
    pub branch_token: Vec<u8>,
    /// Watermark node
    pub node_id: NodeId,
    /// Watermark version
    pub transaction_id: TransactionId,
}

/// Result of a trim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrimHistoryBranchResponse {
    /// Node versions removed
    pub nodes_deleted: usize,
}

/// Delete a branch and reclaim unreferenced history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteHistoryBranchRequest {
    /// Shard the caller owns
    pub shard_id: ShardId,
    /// Caller's lease on the shard
    pub range_id: RangeId,
    /// Encoded branch token
    pub branch_token: Vec<u8>,
}

/// Result of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteHistoryBranchResponse {
    /// Node versions removed
    pub nodes_deleted: usize,
}

/// Page through every branch of every tree
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetAllHistoryTreeBranchesRequest {
    /// Branches per page; 0 means the configured default
    pub page_size: usize,
    /// Empty for the first page
    pub next_page_token: Vec<u8>,
}

/// Metadata of one branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryBranchDetail {
    /// Tree the branch belongs to
    pub tree_id: TreeId,
    /// The branch
    pub branch_id: BranchId,
    /// Encoded branch token
    pub branch_token: Vec<u8>,
    /// When the branch was created
    pub fork_time: DateTime<Utc>,
    /// Annotation recorded at creation
    pub info: String,
}

/// One page of branch metadata
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetAllHistoryTreeBranchesResponse {
    /// Branches ordered by `(tree_id, branch_id)`
    pub branches: Vec<HistoryBranchDetail>,
    /// Empty when every branch has been returned
    pub next_page_token: Vec<u8>,
}

/// Every live branch of one tree
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetHistoryTreeResponse {
    /// Encoded tokens, ordered by branch id
    pub branch_tokens: Vec<Vec<u8>>,
}
