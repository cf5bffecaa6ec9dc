//! NodeWriter: appending event batches to a branch
//!
//! A write lands at `(branch, node_id, transaction_id)` and never replaces an
//! existing version. Causal chaining rejects writers whose view of the
//! preceding batch is stale:
//!
//! ```text
//! own range:   [n1 @ t10] [n4 @ t11]  <- append n6 must carry prev = t11
//! ```
//!
//! The current batch preceding a node is the one holding the highest
//! transaction id below it across every range of the branch. Batches left
//! behind by a rewrite carry lower ids and never win.

use crate::manager::{Deadline, HistoryManager};
use crate::request::{
    AppendHistoryNodesRequest, AppendHistoryNodesResponse, AppendRawHistoryNodesRequest,
};
use historytree_core::{
    BranchToken, HistoryError, HistoryEvent, HistoryResult, NodeId, TransactionId,
    EMPTY_TRANSACTION_ID, FIRST_EVENT_ID, MAX_NODE_ID,
};
use historytree_storage::{BranchRecord, InsertOutcome, NodeRecord};
use tracing::{debug, warn};

/// A batch ready to be written, after request-specific validation
struct PendingNode {
    token: BranchToken,
    node_id: NodeId,
    blob: Vec<u8>,
    transaction_id: TransactionId,
    prev_transaction_id: TransactionId,
    is_new_branch: bool,
    info: String,
}

/// Check a batch is non-empty, contiguous, and single-version
pub(crate) fn validate_batch(events: &[HistoryEvent]) -> Result<(), String> {
    let first = events.first().ok_or("empty event batch")?;
    if first.event_id < FIRST_EVENT_ID {
        return Err(format!("event id {} below {}", first.event_id, FIRST_EVENT_ID));
    }
    for (offset, event) in events.iter().enumerate() {
        if first.event_id.checked_add(offset as i64) != Some(event.event_id) {
            return Err(format!(
                "event ids not contiguous after {}: got {} at offset {}",
                first.event_id, event.event_id, offset
            ));
        }
        if event.version != first.version {
            return Err(format!(
                "mixed versions in batch: {} and {}",
                first.version, event.version
            ));
        }
    }
    Ok(())
}

impl HistoryManager {
    /// Append a batch of events to a branch
    ///
    /// The node id is the first event's id. Fails with `ShardOwnershipLost`
    /// on a stale lease, `NotFound` when the branch does not exist and
    /// `is_new_branch` is false, `Conflict` when `prev_transaction_id` does
    /// not match the preceding batch, and `TransactionSizeLimit` for
    /// oversized batches.
    pub fn append_history_nodes(
        &self,
        req: AppendHistoryNodesRequest,
    ) -> HistoryResult<AppendHistoryNodesResponse> {
        let deadline = self.deadline("append_history_nodes");
        self.check_lease(req.shard_id, req.range_id)?;

        validate_batch(&req.events).map_err(HistoryError::invalid_argument)?;
        let token = BranchToken::decode(&req.branch_token)?;
        let node_id = req.events[0].event_id;
        let blob = self.codec.encode(&req.events)?;

        self.append_node(
            &deadline,
            PendingNode {
                token,
                node_id,
                blob,
                transaction_id: req.transaction_id,
                prev_transaction_id: req.prev_transaction_id,
                is_new_branch: req.is_new_branch,
                info: req.info,
            },
        )
    }

    /// Append an already serialized batch to a branch
    ///
    /// Same contract as [`append_history_nodes`](Self::append_history_nodes);
    /// the blob is stored as given.
    pub fn append_raw_history_nodes(
        &self,
        req: AppendRawHistoryNodesRequest,
    ) -> HistoryResult<AppendHistoryNodesResponse> {
        let deadline = self.deadline("append_raw_history_nodes");
        self.check_lease(req.shard_id, req.range_id)?;

        if req.blob.is_empty() {
            return Err(HistoryError::invalid_argument("empty raw blob"));
        }
        if req.node_id < FIRST_EVENT_ID {
            return Err(HistoryError::invalid_argument(format!(
                "node id {} below {}",
                req.node_id, FIRST_EVENT_ID
            )));
        }
        let token = BranchToken::decode(&req.branch_token)?;

        self.append_node(
            &deadline,
            PendingNode {
                token,
                node_id: req.node_id,
                blob: req.blob,
                transaction_id: req.transaction_id,
                prev_transaction_id: req.prev_transaction_id,
                is_new_branch: req.is_new_branch,
                info: req.info,
            },
        )
    }

    fn append_node(
        &self,
        deadline: &Deadline,
        node: PendingNode,
    ) -> HistoryResult<AppendHistoryNodesResponse> {
        // Own ranges end at MAX_NODE_ID exclusive
        if node.node_id >= MAX_NODE_ID {
            return Err(HistoryError::invalid_argument(format!(
                "node id {} must be below {}",
                node.node_id, MAX_NODE_ID
            )));
        }
        if node.transaction_id <= EMPTY_TRANSACTION_ID {
            return Err(HistoryError::invalid_argument(format!(
                "transaction id {} must be positive",
                node.transaction_id
            )));
        }
        if node.transaction_id <= node.prev_transaction_id {
            return Err(HistoryError::invalid_argument(format!(
                "transaction id {} does not exceed previous {}",
                node.transaction_id, node.prev_transaction_id
            )));
        }
        let size = node.blob.len();
        if size > self.config.transaction_size_limit {
            return Err(HistoryError::TransactionSizeLimit {
                size,
                limit: self.config.transaction_size_limit,
            });
        }

        let tree_id = node.token.tree_id;
        let branch_id = node.token.branch_id;
        let lock = self.commit_lock(branch_id);
        let _guard = lock.lock();

        deadline.check()?;
        let (token, create_branch) = match self.store.get_branch(tree_id, branch_id)? {
            Some(record) => (record.token, false),
            None if node.is_new_branch => (node.token.clone(), true),
            None => {
                return Err(HistoryError::not_found(format!(
                    "branch {} of tree {}",
                    branch_id, tree_id
                )))
            }
        };

        let own_begin = token.own_begin_node_id();
        if node.node_id < own_begin {
            return Err(HistoryError::invalid_argument(format!(
                "node {} lies in an ancestor range; own range starts at {}",
                node.node_id, own_begin
            )));
        }

        deadline.check()?;
        if let Some(existing) = self
            .store
            .get_node(tree_id, branch_id, node.node_id, node.transaction_id)?
        {
            return self.resolve_duplicate(&existing, &node.blob, size);
        }

        let expected_prev = self.preceding_transaction_id(deadline, &token, node.node_id)?;
        if node.prev_transaction_id != expected_prev {
            self.metrics.record_conflict();
            warn!(
                target: "historytree::append",
                tree_id = %tree_id,
                branch_id = %branch_id,
                node_id = node.node_id,
                txn_id = node.transaction_id,
                prev_txn_id = node.prev_transaction_id,
                expected_prev_txn_id = expected_prev,
                "Causal chain mismatch"
            );
            return Err(HistoryError::conflict(format!(
                "prev transaction id {} does not match {} preceding node {}",
                node.prev_transaction_id, expected_prev, node.node_id
            )));
        }

        // The branch row lands only once every check has passed
        if create_branch {
            deadline.check()?;
            self.store.upsert_branch(BranchRecord::new(token.clone(), node.info.clone()))?;
            debug!(
                target: "historytree::append",
                tree_id = %tree_id,
                branch_id = %branch_id,
                ancestors = token.ancestors.len(),
                "Created branch"
            );
        }

        deadline.check()?;
        let record = NodeRecord::new(
            node.node_id,
            node.transaction_id,
            node.prev_transaction_id,
            node.blob,
        );
        match self.store.insert_node(tree_id, branch_id, record.clone())? {
            InsertOutcome::Inserted => {}
            InsertOutcome::Duplicate(existing) => {
                return self.resolve_duplicate(&existing, &record.data, size);
            }
        }

        self.metrics.record_append(size);
        debug!(
            target: "historytree::append",
            tree_id = %tree_id,
            branch_id = %branch_id,
            node_id = node.node_id,
            txn_id = node.transaction_id,
            size,
            "Appended batch"
        );
        Ok(AppendHistoryNodesResponse {
            size,
            node_id: node.node_id,
        })
    }

    /// Same `(node_id, transaction_id)` already stored: a retry or a clash
    fn resolve_duplicate(
        &self,
        existing: &NodeRecord,
        blob: &[u8],
        size: usize,
    ) -> HistoryResult<AppendHistoryNodesResponse> {
        if existing.data == blob {
            debug!(
                target: "historytree::append",
                node_id = existing.node_id,
                txn_id = existing.transaction_id,
                "Duplicate append treated as retry"
            );
            return Ok(AppendHistoryNodesResponse {
                size,
                node_id: existing.node_id,
            });
        }
        self.metrics.record_conflict();
        warn!(
            target: "historytree::append",
            node_id = existing.node_id,
            txn_id = existing.transaction_id,
            "Different payload under an existing version"
        );
        Err(HistoryError::conflict(format!(
            "node {} already has a different batch at transaction {}",
            existing.node_id, existing.transaction_id
        )))
    }

    /// Transaction id of the current batch immediately before `node_id`
    pub(crate) fn preceding_transaction_id(
        &self,
        deadline: &Deadline,
        token: &BranchToken,
        node_id: NodeId,
    ) -> HistoryResult<TransactionId> {
        let mut preceding = EMPTY_TRANSACTION_ID;
        for range in token.ranges_for_read() {
            let before = node_id.min(range.end_node_id);
            if range.begin_node_id >= before {
                continue;
            }
            deadline.check()?;
            if let Some(txn_id) = self.store.max_transaction_before(
                token.tree_id,
                range.branch_id,
                range.begin_node_id,
                before,
            )? {
                preceding = preceding.max(txn_id);
            }
        }
        Ok(preceding)
    }
}
