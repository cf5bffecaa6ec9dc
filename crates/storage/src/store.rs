//! Logical storage contract for history trees
//!
//! Two logical tables back every history tree:
//!
//! | Table      | Key                                          | Value                          |
//! |------------|----------------------------------------------|--------------------------------|
//! | `branches` | `(tree_id, branch_id)`                       | ancestor chain + branch info   |
//! | `nodes`    | `(tree_id, branch_id, node_id, txn_id)`      | serialized event batch         |
//!
//! Any backend (relational, key-value, in-memory) implements [`HistoryStore`].
//! The engine owns all history semantics: version selection, reference
//! counting, fencing. Backends only store rows and answer range queries.
//!
//! # Node Ordering
//!
//! Range reads return rows ordered by `node_id` ascending, and for equal
//! node ids by `transaction_id` descending (newest version first).

use chrono::{DateTime, Utc};
use historytree_core::{BranchId, BranchToken, HistoryError, NodeId, TransactionId, TreeId};
use thiserror::Error;

/// Result type alias for backend operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by a backend driver
///
/// Never surfaced directly; the engine converts them into
/// [`HistoryError`] kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend did not answer in time
    #[error("Backend timeout during {0}")]
    Timeout(String),

    /// Backend temporarily unreachable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Backend returned rows that violate the storage contract
    #[error("Backend corruption: {0}")]
    Corrupt(String),
}

impl From<StoreError> for HistoryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Timeout(_) => HistoryError::Timeout {
                operation: "storage",
            },
            StoreError::Unavailable(reason) => HistoryError::unavailable(reason),
            StoreError::Corrupt(reason) => HistoryError::data_loss(reason),
        }
    }
}

/// A row of the `branches` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRecord {
    /// Token describing the branch (identity, ancestors, retention)
    pub token: BranchToken,
    /// Free-form caller annotation recorded at creation
    pub info: String,
    /// When the branch was created
    pub fork_time: DateTime<Utc>,
}

impl BranchRecord {
    /// Create a record stamped with the current time
    pub fn new(token: BranchToken, info: impl Into<String>) -> Self {
        Self {
            token,
            info: info.into(),
            fork_time: Utc::now(),
        }
    }

    /// Tree id of the branch
    pub fn tree_id(&self) -> TreeId {
        self.token.tree_id
    }

    /// Branch id of the branch
    pub fn branch_id(&self) -> BranchId {
        self.token.branch_id
    }
}

/// A row of the `nodes` table: one version of a node batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// First event id of the batch
    pub node_id: NodeId,
    /// Version stamp of this write
    pub transaction_id: TransactionId,
    /// Transaction id of the batch this write chained onto
    pub prev_transaction_id: TransactionId,
    /// Serialized events
    pub data: Vec<u8>,
}

impl NodeRecord {
    /// Create a node record
    pub fn new(
        node_id: NodeId,
        transaction_id: TransactionId,
        prev_transaction_id: TransactionId,
        data: Vec<u8>,
    ) -> Self {
        Self {
            node_id,
            transaction_id,
            prev_transaction_id,
            data,
        }
    }
}

/// Outcome of a conditional node insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The version did not exist and was written
    Inserted,
    /// A version with the same `(node_id, transaction_id)` already exists
    Duplicate(NodeRecord),
}

/// Range query over one branch's nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeQuery {
    /// First node id included
    pub min_node_id: NodeId,
    /// First node id excluded
    pub max_node_id: NodeId,
    /// Resume strictly after this `(node_id, transaction_id)` in read order
    pub after: Option<(NodeId, TransactionId)>,
    /// Maximum number of rows returned
    pub limit: usize,
}

impl NodeQuery {
    /// Query every version in `[min, max)`
    pub fn range(min_node_id: NodeId, max_node_id: NodeId, limit: usize) -> Self {
        Self {
            min_node_id,
            max_node_id,
            after: None,
            limit,
        }
    }

    /// Resume after a previously returned row
    pub fn after(mut self, node_id: NodeId, transaction_id: TransactionId) -> Self {
        self.after = Some((node_id, transaction_id));
        self
    }
}

/// Backend contract for history tree persistence
///
/// Every method is a single round-trip. Implementations must be safe to
/// call concurrently; single-row writes must be atomic.
pub trait HistoryStore: Send + Sync {
    /// Insert or replace a branch row
    fn upsert_branch(&self, record: BranchRecord) -> StoreResult<()>;

    /// Fetch a branch row
    fn get_branch(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
    ) -> StoreResult<Option<BranchRecord>>;

    /// All branch rows of a tree
    fn tree_branches(&self, tree_id: TreeId) -> StoreResult<Vec<BranchRecord>>;

    /// Remove a branch row; returns whether it existed
    fn delete_branch(&self, tree_id: TreeId, branch_id: BranchId) -> StoreResult<bool>;

    /// Page through all branch rows ordered by `(tree_id, branch_id)`
    fn scan_branches(
        &self,
        after: Option<(TreeId, BranchId)>,
        limit: usize,
    ) -> StoreResult<Vec<BranchRecord>>;

    /// Insert a node version unless the same `(node_id, transaction_id)` exists
    fn insert_node(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
        node: NodeRecord,
    ) -> StoreResult<InsertOutcome>;

    /// Fetch one node version
    fn get_node(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
        node_id: NodeId,
        transaction_id: TransactionId,
    ) -> StoreResult<Option<NodeRecord>>;

    /// Highest transaction id stored on any node in `[min_node_id, before_node_id)`
    fn max_transaction_before(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
        min_node_id: NodeId,
        before_node_id: NodeId,
    ) -> StoreResult<Option<TransactionId>>;

    /// Range read in node order (see module docs)
    fn read_nodes(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
        query: NodeQuery,
    ) -> StoreResult<Vec<NodeRecord>>;

    /// Delete every version of every node with `node_id >= from_node_id`
    fn delete_nodes_from(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
        from_node_id: NodeId,
    ) -> StoreResult<usize>;

    /// Delete one node version; returns whether it existed
    fn delete_node_version(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
        node_id: NodeId,
        transaction_id: TransactionId,
    ) -> StoreResult<bool>;

    /// Drop the tree's remaining metadata once it holds no branches and no nodes
    fn drop_tree_if_empty(&self, tree_id: TreeId) -> StoreResult<bool>;
}
