//! In-memory history store
//!
//! DashMap keyed by TreeId, hash maps and ordered maps within.
//!
//! # Design
//!
//! - DashMap: 16-way sharded by default, lock-free reads
//! - Per-TreeId shards: different executions never contend
//! - FxHashMap: O(1) branch lookups inside a tree
//! - BTreeMap per branch: ordered node ids for range reads
//! - NodeVersions: every version of a node, newest first
//!
//! A tree shard exists while it holds branch rows or node rows. Once both
//! are gone, `drop_tree_if_empty` removes the shard itself.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use dashmap::DashMap;
use historytree_core::{BranchId, NodeId, TransactionId, TreeId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::store::{
    BranchRecord, HistoryStore, InsertOutcome, NodeQuery, NodeRecord, StoreError, StoreResult,
};

/// All versions of one node
///
/// Versions are kept newest first (descending transaction id), so the
/// current version is always the first entry.
#[derive(Debug, Clone, Default)]
pub struct NodeVersions {
    versions: BTreeMap<Reverse<TransactionId>, NodeRecord>,
}

impl NodeVersions {
    /// Create a version set holding a single version
    pub fn new(record: NodeRecord) -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(Reverse(record.transaction_id), record);
        Self { versions }
    }

    /// Insert a version unless its transaction id already exists
    pub fn insert(&mut self, record: NodeRecord) -> InsertOutcome {
        match self.versions.get(&Reverse(record.transaction_id)) {
            Some(existing) => InsertOutcome::Duplicate(existing.clone()),
            None => {
                self.versions.insert(Reverse(record.transaction_id), record);
                InsertOutcome::Inserted
            }
        }
    }

    /// The version with the greatest transaction id
    #[inline]
    pub fn latest(&self) -> Option<&NodeRecord> {
        self.versions.values().next()
    }

    /// A specific version
    pub fn get(&self, transaction_id: TransactionId) -> Option<&NodeRecord> {
        self.versions.get(&Reverse(transaction_id))
    }

    /// Remove a specific version
    pub fn remove(&mut self, transaction_id: TransactionId) -> Option<NodeRecord> {
        self.versions.remove(&Reverse(transaction_id))
    }

    /// Versions, newest first
    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.versions.values()
    }

    /// Number of versions stored
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Check if no version remains
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

type BranchNodes = BTreeMap<NodeId, NodeVersions>;

/// Rows of a single tree
#[derive(Debug, Default)]
pub struct TreeShard {
    branches: FxHashMap<BranchId, BranchRecord>,
    nodes: FxHashMap<BranchId, BranchNodes>,
}

impl TreeShard {
    /// Number of branch rows
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Number of node versions across all branches
    pub fn node_version_count(&self) -> usize {
        self.nodes
            .values()
            .flat_map(|nodes| nodes.values())
            .map(NodeVersions::version_count)
            .sum()
    }

    /// Check if the shard holds no rows at all
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty() && self.nodes.values().all(BTreeMap::is_empty)
    }
}

/// In-memory [`HistoryStore`]
///
/// # Thread Safety
///
/// All operations are thread-safe. Writes lock only the target tree's shard;
/// different trees never contend.
///
/// # Fault Injection
///
/// `inject_failure` arms a one-shot error returned by the next call, so
/// tests can exercise the engine's error classification.
/// `inject_failure_after` lets a number of calls succeed first, which
/// interrupts a multi-step operation partway through.
pub struct InMemoryHistoryStore {
    shards: DashMap<TreeId, TreeShard>,
    fault: Mutex<Option<(usize, StoreError)>>,
}

impl InMemoryHistoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            shards: DashMap::new(),
            fault: Mutex::new(None),
        }
    }

    /// Make the next store call fail with `err`
    pub fn inject_failure(&self, err: StoreError) {
        self.inject_failure_after(0, err);
    }

    /// Let `calls` store calls succeed, then fail the next one with `err`
    pub fn inject_failure_after(&self, calls: usize, err: StoreError) {
        *self.fault.lock() = Some((calls, err));
    }

    fn take_fault(&self) -> StoreResult<()> {
        let mut fault = self.fault.lock();
        if let Some((remaining, _)) = fault.as_mut() {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(());
            }
        }
        match fault.take() {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of trees with any remaining rows
    pub fn tree_count(&self) -> usize {
        self.shards.len()
    }

    /// Check if a tree shard exists
    pub fn has_tree(&self, tree_id: &TreeId) -> bool {
        self.shards.contains_key(tree_id)
    }

    /// Number of node versions stored for a branch
    pub fn node_version_count(&self, tree_id: TreeId, branch_id: BranchId) -> usize {
        self.shards
            .get(&tree_id)
            .and_then(|shard| {
                shard
                    .nodes
                    .get(&branch_id)
                    .map(|nodes| nodes.values().map(NodeVersions::version_count).sum())
            })
            .unwrap_or(0)
    }

    /// Total node versions across every tree
    pub fn total_node_versions(&self) -> usize {
        self.shards
            .iter()
            .map(|entry| entry.value().node_version_count())
            .sum()
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryHistoryStore")
            .field("tree_count", &self.tree_count())
            .field("total_node_versions", &self.total_node_versions())
            .finish()
    }
}

/// Whether `(node_id, txn_id)` sorts strictly after `cursor` in read order
#[inline]
fn is_after(
    node_id: NodeId,
    txn_id: TransactionId,
    cursor: Option<(NodeId, TransactionId)>,
) -> bool {
    match cursor {
        None => true,
        Some((cursor_node, cursor_txn)) => {
            node_id > cursor_node || (node_id == cursor_node && txn_id < cursor_txn)
        }
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn upsert_branch(&self, record: BranchRecord) -> StoreResult<()> {
        self.take_fault()?;
        let tree_id = record.tree_id();
        let mut shard = self.shards.entry(tree_id).or_default();
        shard.branches.insert(record.branch_id(), record);
        Ok(())
    }

    fn get_branch(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
    ) -> StoreResult<Option<BranchRecord>> {
        self.take_fault()?;
        Ok(self
            .shards
            .get(&tree_id)
            .and_then(|shard| shard.branches.get(&branch_id).cloned()))
    }

    fn tree_branches(&self, tree_id: TreeId) -> StoreResult<Vec<BranchRecord>> {
        self.take_fault()?;
        Ok(self
            .shards
            .get(&tree_id)
            .map(|shard| {
                let mut branches: Vec<_> = shard.branches.values().cloned().collect();
                branches.sort_by_key(|record| record.branch_id());
                branches
            })
            .unwrap_or_default())
    }

    fn delete_branch(&self, tree_id: TreeId, branch_id: BranchId) -> StoreResult<bool> {
        self.take_fault()?;
        Ok(self
            .shards
            .get_mut(&tree_id)
            .map(|mut shard| shard.branches.remove(&branch_id).is_some())
            .unwrap_or(false))
    }

    fn scan_branches(
        &self,
        after: Option<(TreeId, BranchId)>,
        limit: usize,
    ) -> StoreResult<Vec<BranchRecord>> {
        self.take_fault()?;
        // Collect + sort; scans are administrative, not on the hot path.
        let mut rows: Vec<BranchRecord> = self
            .shards
            .iter()
            .flat_map(|entry| entry.value().branches.values().cloned().collect::<Vec<_>>())
            .filter(|record| match after {
                None => true,
                Some(cursor) => (record.tree_id(), record.branch_id()) > cursor,
            })
            .collect();
        rows.sort_by_key(|record| (record.tree_id(), record.branch_id()));
        rows.truncate(limit);
        Ok(rows)
    }

    fn insert_node(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
        node: NodeRecord,
    ) -> StoreResult<InsertOutcome> {
        self.take_fault()?;
        let mut shard = self.shards.entry(tree_id).or_default();
        let nodes = shard.nodes.entry(branch_id).or_default();
        trace!(
            target: "historytree::store",
            tree_id = %tree_id,
            branch_id = %branch_id,
            node_id = node.node_id,
            txn_id = node.transaction_id,
            "insert node"
        );
        match nodes.get_mut(&node.node_id) {
            Some(versions) => Ok(versions.insert(node)),
            None => {
                nodes.insert(node.node_id, NodeVersions::new(node));
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    fn get_node(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
        node_id: NodeId,
        transaction_id: TransactionId,
    ) -> StoreResult<Option<NodeRecord>> {
        self.take_fault()?;
        Ok(self.shards.get(&tree_id).and_then(|shard| {
            shard
                .nodes
                .get(&branch_id)
                .and_then(|nodes| nodes.get(&node_id))
                .and_then(|versions| versions.get(transaction_id).cloned())
        }))
    }

    fn max_transaction_before(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
        min_node_id: NodeId,
        before_node_id: NodeId,
    ) -> StoreResult<Option<TransactionId>> {
        self.take_fault()?;
        if min_node_id >= before_node_id {
            return Ok(None);
        }
        Ok(self.shards.get(&tree_id).and_then(|shard| {
            shard.nodes.get(&branch_id).and_then(|nodes| {
                nodes
                    .range(min_node_id..before_node_id)
                    .filter_map(|(_, versions)| versions.latest())
                    .map(|row| row.transaction_id)
                    .max()
            })
        }))
    }

    fn read_nodes(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
        query: NodeQuery,
    ) -> StoreResult<Vec<NodeRecord>> {
        self.take_fault()?;
        if query.min_node_id >= query.max_node_id || query.limit == 0 {
            return Ok(Vec::new());
        }
        let Some(shard) = self.shards.get(&tree_id) else {
            return Ok(Vec::new());
        };
        let Some(nodes) = shard.nodes.get(&branch_id) else {
            return Ok(Vec::new());
        };
        let rows = nodes
            .range(query.min_node_id..query.max_node_id)
            .flat_map(|(_, versions)| versions.iter())
            .filter(|row| is_after(row.node_id, row.transaction_id, query.after))
            .take(query.limit)
            .cloned()
            .collect();
        Ok(rows)
    }

    fn delete_nodes_from(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
        from_node_id: NodeId,
    ) -> StoreResult<usize> {
        self.take_fault()?;
        let Some(mut shard) = self.shards.get_mut(&tree_id) else {
            return Ok(0);
        };
        let Some(nodes) = shard.nodes.get_mut(&branch_id) else {
            return Ok(0);
        };
        let removed = nodes.split_off(&from_node_id);
        let count = removed.values().map(NodeVersions::version_count).sum();
        if nodes.is_empty() {
            shard.nodes.remove(&branch_id);
        }
        Ok(count)
    }

    fn delete_node_version(
        &self,
        tree_id: TreeId,
        branch_id: BranchId,
        node_id: NodeId,
        transaction_id: TransactionId,
    ) -> StoreResult<bool> {
        self.take_fault()?;
        let Some(mut shard) = self.shards.get_mut(&tree_id) else {
            return Ok(false);
        };
        let Some(nodes) = shard.nodes.get_mut(&branch_id) else {
            return Ok(false);
        };
        let Some(versions) = nodes.get_mut(&node_id) else {
            return Ok(false);
        };
        let removed = versions.remove(transaction_id).is_some();
        if versions.is_empty() {
            nodes.remove(&node_id);
        }
        if nodes.is_empty() {
            shard.nodes.remove(&branch_id);
        }
        Ok(removed)
    }

    fn drop_tree_if_empty(&self, tree_id: TreeId) -> StoreResult<bool> {
        self.take_fault()?;
        Ok(self
            .shards
            .remove_if(&tree_id, |_, shard| shard.is_empty())
            .is_some())
    }
}
