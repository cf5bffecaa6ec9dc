//! BranchForker: copy-on-write branch creation
//!
//! Forking writes one branch row and no event data. The new branch's chain
//! is the source chain clipped at the fork point, plus the source's own
//! range up to the fork point:
//!
//! ```text
//! source  B1: own [1, inf)              fork at 4
//! new     B2: [B1 1..4] + own [4, inf)
//!
//! source  B2: [B1 1..4] + own [4, inf)  fork at 6
//! new     B3: [B1 1..4] [B2 4..6] + own [6, inf)
//! ```

use crate::manager::HistoryManager;
use crate::request::{ForkHistoryBranchRequest, ForkHistoryBranchResponse};
use historytree_core::{
    AncestorRange, BranchToken, HistoryError, HistoryResult, NodeId, FIRST_EVENT_ID,
};
use historytree_storage::BranchRecord;
use tracing::info;

/// Ancestor chain of a branch forked from `source` at `fork_node_id`
pub(crate) fn forked_ancestors(source: &BranchToken, fork_node_id: NodeId) -> Vec<AncestorRange> {
    let own_begin = source.own_begin_node_id();
    if fork_node_id <= own_begin {
        return source
            .ancestors
            .iter()
            .take_while(|range| range.begin_node_id < fork_node_id)
            .map(|range| {
                AncestorRange::new(
                    range.branch_id,
                    range.begin_node_id,
                    range.end_node_id.min(fork_node_id),
                )
            })
            .collect();
    }
    let mut ancestors = source.ancestors.clone();
    ancestors.push(AncestorRange::new(
        source.branch_id,
        own_begin,
        fork_node_id,
    ));
    ancestors
}

impl HistoryManager {
    /// Create a branch sharing the source's history before `fork_node_id`
    ///
    /// `fork_node_id` must be the node id of a committed batch visible
    /// through the source branch; that batch and everything after it are not
    /// inherited. Returns the new branch's token.
    pub fn fork_history_branch(
        &self,
        req: ForkHistoryBranchRequest,
    ) -> HistoryResult<ForkHistoryBranchResponse> {
        let deadline = self.deadline("fork_history_branch");
        self.check_lease(req.shard_id, req.range_id)?;

        if req.fork_node_id <= FIRST_EVENT_ID {
            return Err(HistoryError::invalid_argument(format!(
                "fork node {} must be greater than {}",
                req.fork_node_id, FIRST_EVENT_ID
            )));
        }
        let requested = BranchToken::decode(&req.fork_branch_token)?;
        let source = self.require_branch(&deadline, &requested)?.token;

        let visible = self.last_visible_node(
            &deadline,
            &source,
            req.fork_node_id.saturating_add(1),
        )?;
        if visible != Some(req.fork_node_id) {
            return Err(HistoryError::invalid_argument(format!(
                "no batch visible at node {} on branch {}",
                req.fork_node_id, source.branch_id
            )));
        }

        let ancestors = forked_ancestors(&source, req.fork_node_id);
        if ancestors.len() > self.config.max_ancestor_depth {
            return Err(HistoryError::invalid_argument(format!(
                "fork would create {} ancestor ranges, limit is {}",
                ancestors.len(),
                self.config.max_ancestor_depth
            )));
        }

        let token = BranchToken::new(
            req.namespace_id,
            source.workflow_id.clone(),
            req.new_run_id,
            source.tree_id,
            None,
            ancestors,
            source.retention,
        );
        let new_branch_token = token.encode()?;

        deadline.check()?;
        self.store.upsert_branch(BranchRecord::new(token.clone(), req.info))?;
        self.metrics.record_fork();
        info!(
            target: "historytree::fork",
            tree_id = %token.tree_id,
            source_branch_id = %source.branch_id,
            branch_id = %token.branch_id,
            fork_node_id = req.fork_node_id,
            ancestors = token.ancestors.len(),
            "Forked branch"
        );
        Ok(ForkHistoryBranchResponse { new_branch_token })
    }
}
