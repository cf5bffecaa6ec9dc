//! BranchGC: deleting a branch and reclaiming unreferenced history
//!
//! Reference counting is a scan of the tree's live branch rows, never a
//! stored counter. Every live branch references its own nodes without bound
//! and each of its ancestor ranges up to that range's end. The deletion
//! chain (own range, then ancestors leaf to root) is walked until it hits a
//! branch that is still referenced:
//!
//! ```text
//! B1: own [1, inf)
//! B2: [B1 1..4] + own [4, inf)
//!
//! delete B1 -> B1 referenced by B2 up to 4: drop B1 nodes >= 4, stop
//! delete B2 -> B2 unreferenced: drop all B2 nodes
//!              B1 (row gone) unreferenced: drop B1 nodes >= 1
//! ```

use crate::manager::HistoryManager;
use crate::request::{DeleteHistoryBranchRequest, DeleteHistoryBranchResponse};
use historytree_core::{BranchId, BranchToken, HistoryResult, NodeId, MAX_NODE_ID};
use historytree_storage::BranchRecord;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

/// Highest node id (exclusive) each branch is referenced up to
pub(crate) fn referenced_ends(live: &[BranchRecord]) -> FxHashMap<BranchId, NodeId> {
    let mut used: FxHashMap<BranchId, NodeId> = FxHashMap::default();
    for record in live {
        used.insert(record.branch_id(), MAX_NODE_ID);
        for range in &record.token.ancestors {
            let end = used.entry(range.branch_id).or_insert(range.end_node_id);
            *end = (*end).max(range.end_node_id);
        }
    }
    used
}

impl HistoryManager {
    /// Delete a branch and every node no other branch still references
    ///
    /// Deleting a branch that is already gone succeeds and removes nothing,
    /// so callers may retry freely.
    pub fn delete_history_branch(
        &self,
        req: DeleteHistoryBranchRequest,
    ) -> HistoryResult<DeleteHistoryBranchResponse> {
        let deadline = self.deadline("delete_history_branch");
        self.check_lease(req.shard_id, req.range_id)?;

        let requested = BranchToken::decode(&req.branch_token)?;
        let tree_id = requested.tree_id;
        let branch_id = requested.branch_id;

        let lock = self.commit_lock(branch_id);
        let guard = lock.lock();

        deadline.check()?;
        let chain = match self.store.get_branch(tree_id, branch_id)? {
            Some(record) => record.token,
            None => requested,
        };

        deadline.check()?;
        let row_deleted = self.store.delete_branch(tree_id, branch_id)?;

        deadline.check()?;
        let live = self.store.tree_branches(tree_id)?;
        let used = referenced_ends(&live);

        let mut nodes_deleted = 0;
        for range in chain.ranges_for_read().iter().rev() {
            deadline.check()?;
            match used.get(&range.branch_id) {
                Some(&end) => {
                    if end < MAX_NODE_ID {
                        nodes_deleted += self.store.delete_nodes_from(
                            tree_id,
                            range.branch_id,
                            end.max(range.begin_node_id),
                        )?;
                    }
                    debug!(
                        target: "historytree::gc",
                        tree_id = %tree_id,
                        branch_id = %range.branch_id,
                        referenced_until = end,
                        "Stopped at referenced branch"
                    );
                    break;
                }
                None => {
                    nodes_deleted += self.store.delete_nodes_from(
                        tree_id,
                        range.branch_id,
                        range.begin_node_id,
                    )?;
                }
            }
        }

        deadline.check()?;
        let tree_dropped = self.store.drop_tree_if_empty(tree_id)?;

        drop(guard);
        self.remove_commit_lock(&branch_id);
        self.metrics.record_delete(nodes_deleted);
        info!(
            target: "historytree::gc",
            tree_id = %tree_id,
            branch_id = %branch_id,
            row_deleted,
            nodes_deleted,
            tree_dropped,
            "Deleted branch"
        );
        Ok(DeleteHistoryBranchResponse { nodes_deleted })
    }
}
