//! TreeScanner: paging through branch metadata of every tree

use crate::manager::HistoryManager;
use crate::request::{
    GetAllHistoryTreeBranchesRequest, GetAllHistoryTreeBranchesResponse, HistoryBranchDetail,
};
use historytree_core::{BranchId, HistoryError, HistoryResult, TreeId};
use tracing::debug;

fn decode_scan_token(token: &[u8]) -> HistoryResult<Option<(TreeId, BranchId)>> {
    if token.is_empty() {
        return Ok(None);
    }
    let key: (TreeId, BranchId) = bincode::deserialize(token)
        .map_err(|e| HistoryError::invalid_argument(format!("malformed page token: {}", e)))?;
    Ok(Some(key))
}

impl HistoryManager {
    /// Page through every branch row, ordered by `(tree_id, branch_id)`
    ///
    /// Read-only. Branches created or deleted during a scan may or may not
    /// appear; pagination itself stays stable.
    pub fn get_all_history_tree_branches(
        &self,
        req: GetAllHistoryTreeBranchesRequest,
    ) -> HistoryResult<GetAllHistoryTreeBranchesResponse> {
        let deadline = self.deadline("get_all_history_tree_branches");
        let after = decode_scan_token(&req.next_page_token)?;
        let page_size = self.config.effective_page_size(req.page_size);

        deadline.check()?;
        let rows = self.store.scan_branches(after, page_size)?;

        let next_page_token = match rows.last() {
            Some(last) if rows.len() == page_size => {
                bincode::serialize(&(last.tree_id(), last.branch_id()))?
            }
            _ => Vec::new(),
        };
        let branches = rows
            .into_iter()
            .map(|record| {
                Ok(HistoryBranchDetail {
                    tree_id: record.tree_id(),
                    branch_id: record.branch_id(),
                    branch_token: record.token.encode()?,
                    fork_time: record.fork_time,
                    info: record.info,
                })
            })
            .collect::<HistoryResult<Vec<_>>>()?;

        debug!(
            target: "historytree::scan",
            branches = branches.len(),
            more = !next_page_token.is_empty(),
            "Scanned branch page"
        );
        Ok(GetAllHistoryTreeBranchesResponse {
            branches,
            next_page_token,
        })
    }
}
