//! BranchTrimmer: rolling a branch back to a committed watermark

use crate::manager::HistoryManager;
use crate::request::{TrimHistoryBranchRequest, TrimHistoryBranchResponse};
use historytree_core::{BranchToken, HistoryError, HistoryResult, MAX_NODE_ID};
use historytree_storage::NodeQuery;
use tracing::info;

impl HistoryManager {
    /// Keep exactly the watermark version at `node_id` and nothing after it
    ///
    /// Every other version at the watermark node and every version of every
    /// later node on the own range is deleted. Re-running with the same
    /// watermark deletes nothing.
    ///
    /// Fails with `InvalidArgument` when the watermark is not on the own
    /// range or was never committed, and with `Conflict` when another branch
    /// inherits nodes the trim would remove.
    pub fn trim_history_branch(
        &self,
        req: TrimHistoryBranchRequest,
    ) -> HistoryResult<TrimHistoryBranchResponse> {
        let deadline = self.deadline("trim_history_branch");
        self.check_lease(req.shard_id, req.range_id)?;

        let requested = BranchToken::decode(&req.branch_token)?;
        let token = self.require_branch(&deadline, &requested)?.token;
        let tree_id = token.tree_id;
        let branch_id = token.branch_id;

        if req.node_id < token.own_begin_node_id() || req.node_id >= MAX_NODE_ID {
            return Err(HistoryError::invalid_argument(format!(
                "watermark node {} lies outside own range [{}, {})",
                req.node_id,
                token.own_begin_node_id(),
                MAX_NODE_ID
            )));
        }

        let lock = self.commit_lock(branch_id);
        let _guard = lock.lock();

        deadline.check()?;
        if self
            .store
            .get_node(tree_id, branch_id, req.node_id, req.transaction_id)?
            .is_none()
        {
            return Err(HistoryError::invalid_argument(format!(
                "watermark ({}, {}) not found on branch {}",
                req.node_id, req.transaction_id, branch_id
            )));
        }

        deadline.check()?;
        for other in self.store.tree_branches(tree_id)? {
            let inherited = other
                .token
                .ancestors
                .iter()
                .filter(|range| range.branch_id == branch_id)
                .any(|range| range.end_node_id > req.node_id);
            if inherited {
                return Err(HistoryError::conflict(format!(
                    "branch {} inherits nodes of branch {} beyond node {}",
                    other.branch_id(),
                    branch_id,
                    req.node_id
                )));
            }
        }

        deadline.check()?;
        let mut nodes_deleted = self
            .store
            .delete_nodes_from(tree_id, branch_id, req.node_id + 1)?;

        deadline.check()?;
        let versions = self.store.read_nodes(
            tree_id,
            branch_id,
            NodeQuery::range(req.node_id, req.node_id + 1, usize::MAX),
        )?;
        for version in versions
            .iter()
            .filter(|version| version.transaction_id != req.transaction_id)
        {
            deadline.check()?;
            if self.store.delete_node_version(
                tree_id,
                branch_id,
                version.node_id,
                version.transaction_id,
            )? {
                nodes_deleted += 1;
            }
        }

        self.metrics.record_trim(nodes_deleted);
        info!(
            target: "historytree::trim",
            tree_id = %tree_id,
            branch_id = %branch_id,
            node_id = req.node_id,
            txn_id = req.transaction_id,
            nodes_deleted,
            "Trimmed branch"
        );
        Ok(TrimHistoryBranchResponse { nodes_deleted })
    }
}
