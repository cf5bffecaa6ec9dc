//! HistoryReader: reconstructing a branch's linear history
//!
//! A branch is read as its ancestor ranges (root to leaf) followed by its
//! own range, each clipped to the requested `[min_event_id, max_event_id)`
//! window. Rows arrive ordered by `(node_id asc, transaction_id desc)`, and
//! one running `(last_node_id, last_transaction_id)` cursor spans all
//! ranges:
//!
//! - a row with a transaction id below the last accepted one is stale and
//!   skipped (shadowed versions, leftovers from before a rewrite);
//! - an accepted row must advance the node id, else the history is corrupt.
//!
//! Decoded reads additionally require every batch to continue exactly where
//! the previous one ended.

use crate::append::validate_batch;
use crate::manager::{Deadline, HistoryManager};
use crate::request::{
    HistoryBatch, RawHistoryNode, ReadHistoryBranchByBatchResponse, ReadHistoryBranchRequest,
    ReadHistoryBranchResponse, ReadRawHistoryBranchResponse,
};
use historytree_core::{
    AncestorRange, BranchToken, EventId, HistoryError, HistoryResult, NodeId, TransactionId,
    EMPTY_TRANSACTION_ID, FIRST_EVENT_ID, MAX_NODE_ID,
};
use historytree_storage::{NodeQuery, NodeRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Resume position of a forward read, carried in the page token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ReadCursor {
    range_index: u32,
    last_node_id: NodeId,
    last_transaction_id: TransactionId,
    last_event_id: EventId,
}

impl ReadCursor {
    fn start(min_event_id: EventId) -> Self {
        Self {
            range_index: 0,
            last_node_id: 0,
            last_transaction_id: EMPTY_TRANSACTION_ID,
            last_event_id: min_event_id - 1,
        }
    }

    fn resume(token: &[u8], min_event_id: EventId, range_count: usize) -> HistoryResult<Self> {
        if token.is_empty() {
            return Ok(Self::start(min_event_id));
        }
        let cursor: ReadCursor = bincode::deserialize(token)
            .map_err(|e| HistoryError::invalid_argument(format!("malformed page token: {}", e)))?;
        if cursor.range_index as usize > range_count {
            return Err(HistoryError::invalid_argument(
                "page token does not match the requested window",
            ));
        }
        Ok(cursor)
    }

    fn encode(&self) -> HistoryResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

/// Resume position of a reverse read: emit nodes strictly below this id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct ReverseCursor {
    before_node_id: NodeId,
}

impl ReverseCursor {
    fn resume(token: &[u8]) -> HistoryResult<Self> {
        if token.is_empty() {
            return Ok(Self {
                before_node_id: MAX_NODE_ID,
            });
        }
        bincode::deserialize(token)
            .map_err(|e| HistoryError::invalid_argument(format!("malformed page token: {}", e)))
    }
}

/// Version-selected rows for one page
struct SelectedPage {
    nodes: Vec<NodeRecord>,
    cursor: ReadCursor,
    exhausted: bool,
}

/// A decoded batch and the size of its blob
struct DecodedBatch {
    batch: HistoryBatch,
    size: usize,
}

/// Branch and clipped ranges a read walks
struct ReadPlan {
    token: BranchToken,
    ranges: Vec<AncestorRange>,
}

impl HistoryManager {
    /// Read a page of events in increasing event id order
    ///
    /// Fails with `NotFound` when the branch does not exist or the first
    /// page is empty, and with `DataLoss` when the stored history has gaps.
    pub fn read_history_branch(
        &self,
        req: ReadHistoryBranchRequest,
    ) -> HistoryResult<ReadHistoryBranchResponse> {
        let page = self.read_by_batch("read_history_branch", &req)?;
        Ok(ReadHistoryBranchResponse {
            events: page
                .batches
                .into_iter()
                .flat_map(|batch| batch.events)
                .collect(),
            next_page_token: page.next_page_token,
            size: page.size,
        })
    }

    /// Read a page of batches annotated with their transaction ids
    pub fn read_history_branch_by_batch(
        &self,
        req: ReadHistoryBranchRequest,
    ) -> HistoryResult<ReadHistoryBranchByBatchResponse> {
        self.read_by_batch("read_history_branch_by_batch", &req)
    }

    /// Read a page of stored blobs without decoding them
    pub fn read_raw_history_branch(
        &self,
        req: ReadHistoryBranchRequest,
    ) -> HistoryResult<ReadRawHistoryBranchResponse> {
        let deadline = self.deadline("read_raw_history_branch");
        let plan = self.plan_read(&deadline, &req)?;
        let cursor =
            ReadCursor::resume(&req.next_page_token, req.min_event_id, plan.ranges.len())?;
        let page_size = self.config.effective_page_size(req.page_size);

        let page = self.select_nodes(&deadline, &plan, cursor, page_size)?;
        if req.next_page_token.is_empty() && page.nodes.is_empty() {
            return Err(window_not_found(&plan.token, &req));
        }

        let size = page.nodes.iter().map(|node| node.data.len()).sum();
        let next_page_token = next_token(&page)?;
        self.metrics.record_read(page.nodes.len());
        Ok(ReadRawHistoryBranchResponse {
            nodes: page
                .nodes
                .into_iter()
                .map(|node| RawHistoryNode {
                    node_id: node.node_id,
                    transaction_id: node.transaction_id,
                    blob: node.data,
                })
                .collect(),
            next_page_token,
            size,
        })
    }

    /// Read a page of events in decreasing event id order
    ///
    /// Every page resolves the whole window forward and then walks it
    /// backwards, so reverse pages always agree with a forward read.
    pub fn read_history_branch_reverse(
        &self,
        req: ReadHistoryBranchRequest,
    ) -> HistoryResult<ReadHistoryBranchResponse> {
        let deadline = self.deadline("read_history_branch_reverse");
        let plan = self.plan_read(&deadline, &req)?;
        let reverse = ReverseCursor::resume(&req.next_page_token)?;
        let page_size = self.config.effective_page_size(req.page_size);

        let mut cursor = ReadCursor::start(req.min_event_id);
        let mut window = Vec::new();
        loop {
            let page = self.select_nodes(&deadline, &plan, cursor, self.config.max_page_size)?;
            cursor = page.cursor;
            let exhausted = page.exhausted;
            window.extend(self.decode_batches(page.nodes, &mut cursor.last_event_id)?);
            if exhausted {
                break;
            }
        }

        let mut remaining = window
            .into_iter()
            .rev()
            .filter(|decoded| decoded.batch.node_id < reverse.before_node_id)
            .peekable();
        let mut events = Vec::new();
        let mut size = 0;
        let mut emitted = 0;
        let mut last_node_id = reverse.before_node_id;
        while emitted < page_size {
            let Some(decoded) = remaining.next() else {
                break;
            };
            last_node_id = decoded.batch.node_id;
            size += decoded.size;
            events.extend(decoded.batch.events.into_iter().rev());
            emitted += 1;
        }

        if req.next_page_token.is_empty() && emitted == 0 {
            return Err(window_not_found(&plan.token, &req));
        }
        let next_page_token = if remaining.peek().is_some() {
            bincode::serialize(&ReverseCursor {
                before_node_id: last_node_id,
            })?
        } else {
            Vec::new()
        };

        self.metrics.record_read(emitted);
        debug!(
            target: "historytree::read",
            tree_id = %plan.token.tree_id,
            branch_id = %plan.token.branch_id,
            batches = emitted,
            "Reverse read page"
        );
        Ok(ReadHistoryBranchResponse {
            events,
            next_page_token,
            size,
        })
    }

    fn read_by_batch(
        &self,
        operation: &'static str,
        req: &ReadHistoryBranchRequest,
    ) -> HistoryResult<ReadHistoryBranchByBatchResponse> {
        let deadline = self.deadline(operation);
        let plan = self.plan_read(&deadline, req)?;
        let cursor =
            ReadCursor::resume(&req.next_page_token, req.min_event_id, plan.ranges.len())?;
        let page_size = self.config.effective_page_size(req.page_size);

        let mut page = self.select_nodes(&deadline, &plan, cursor, page_size)?;
        if req.next_page_token.is_empty() && page.nodes.is_empty() {
            return Err(window_not_found(&plan.token, req));
        }
        let nodes = std::mem::take(&mut page.nodes);
        let decoded = self.decode_batches(nodes, &mut page.cursor.last_event_id)?;
        let next_page_token = next_token(&page)?;

        self.metrics.record_read(decoded.len());
        debug!(
            target: "historytree::read",
            tree_id = %plan.token.tree_id,
            branch_id = %plan.token.branch_id,
            batches = decoded.len(),
            last_event_id = page.cursor.last_event_id,
            "Read page"
        );
        Ok(ReadHistoryBranchByBatchResponse {
            size: decoded.iter().map(|d| d.size).sum(),
            batches: decoded.into_iter().map(|d| d.batch).collect(),
            next_page_token,
        })
    }

    /// Validate the window and resolve the branch's ranges inside it
    fn plan_read(
        &self,
        deadline: &Deadline,
        req: &ReadHistoryBranchRequest,
    ) -> HistoryResult<ReadPlan> {
        if req.min_event_id < FIRST_EVENT_ID || req.min_event_id >= req.max_event_id {
            return Err(HistoryError::invalid_argument(format!(
                "invalid event window [{}, {})",
                req.min_event_id, req.max_event_id
            )));
        }
        let requested = BranchToken::decode(&req.branch_token)?;
        let token = self.require_branch(deadline, &requested)?.token;
        let ranges = token
            .ranges_for_read()
            .iter()
            .filter_map(|range| range.clip(req.min_event_id, req.max_event_id))
            .collect();
        Ok(ReadPlan { token, ranges })
    }

    /// Node id of the last batch a read of `token` selects below `before`
    pub(crate) fn last_visible_node(
        &self,
        deadline: &Deadline,
        token: &BranchToken,
        before: NodeId,
    ) -> HistoryResult<Option<NodeId>> {
        let plan = ReadPlan {
            token: token.clone(),
            ranges: token
                .ranges_for_read()
                .iter()
                .filter_map(|range| range.clip(FIRST_EVENT_ID, before))
                .collect(),
        };
        let mut cursor = ReadCursor::start(FIRST_EVENT_ID);
        loop {
            let page = self.select_nodes(deadline, &plan, cursor, self.config.max_page_size)?;
            cursor = page.cursor;
            if page.exhausted {
                break;
            }
        }
        Ok((cursor.last_node_id >= FIRST_EVENT_ID).then_some(cursor.last_node_id))
    }

    /// Walk ranges from the cursor, selecting up to `page_size` current versions
    fn select_nodes(
        &self,
        deadline: &Deadline,
        plan: &ReadPlan,
        mut cursor: ReadCursor,
        page_size: usize,
    ) -> HistoryResult<SelectedPage> {
        let fetch_limit = page_size + 1;
        let mut nodes = Vec::with_capacity(page_size);

        while (cursor.range_index as usize) < plan.ranges.len() {
            let range = plan.ranges[cursor.range_index as usize];
            let begin = range
                .begin_node_id
                .max(cursor.last_node_id.saturating_add(1));
            let mut after = None;
            loop {
                deadline.check()?;
                let mut query = NodeQuery::range(begin, range.end_node_id, fetch_limit);
                if let Some((node_id, txn_id)) = after {
                    query = query.after(node_id, txn_id);
                }
                let rows = self
                    .store
                    .read_nodes(plan.token.tree_id, range.branch_id, query)?;
                let range_done = rows.len() < fetch_limit;

                for row in rows {
                    after = Some((row.node_id, row.transaction_id));
                    if row.transaction_id < cursor.last_transaction_id {
                        continue;
                    }
                    if row.node_id <= cursor.last_node_id {
                        warn!(
                            target: "historytree::read",
                            tree_id = %plan.token.tree_id,
                            branch_id = %range.branch_id,
                            node_id = row.node_id,
                            last_node_id = cursor.last_node_id,
                            "Node id did not advance"
                        );
                        return Err(HistoryError::data_loss(format!(
                            "node {} on branch {} does not advance past node {}",
                            row.node_id, range.branch_id, cursor.last_node_id
                        )));
                    }
                    cursor.last_node_id = row.node_id;
                    cursor.last_transaction_id = row.transaction_id;
                    nodes.push(row);
                    if nodes.len() == page_size {
                        return Ok(SelectedPage {
                            nodes,
                            cursor,
                            exhausted: false,
                        });
                    }
                }
                if range_done {
                    break;
                }
            }
            cursor.range_index += 1;
        }

        Ok(SelectedPage {
            nodes,
            cursor,
            exhausted: true,
        })
    }

    /// Decode batches and check continuity from `last_event_id`
    fn decode_batches(
        &self,
        nodes: Vec<NodeRecord>,
        last_event_id: &mut EventId,
    ) -> HistoryResult<Vec<DecodedBatch>> {
        let mut decoded = Vec::with_capacity(nodes.len());
        for node in nodes {
            let events = self.codec.decode(&node.data)?;
            validate_batch(&events).map_err(|reason| {
                HistoryError::data_loss(format!("node {}: {}", node.node_id, reason))
            })?;
            let first = events[0].event_id;
            if first != node.node_id {
                return Err(HistoryError::data_loss(format!(
                    "node {} holds a batch starting at event {}",
                    node.node_id, first
                )));
            }
            if first != *last_event_id + 1 {
                warn!(
                    target: "historytree::read",
                    node_id = node.node_id,
                    expected_event_id = *last_event_id + 1,
                    "Gap in history"
                );
                return Err(HistoryError::data_loss(format!(
                    "expected event {}, found batch starting at {}",
                    *last_event_id + 1,
                    first
                )));
            }
            *last_event_id = events[events.len() - 1].event_id;
            decoded.push(DecodedBatch {
                size: node.data.len(),
                batch: HistoryBatch {
                    node_id: node.node_id,
                    transaction_id: node.transaction_id,
                    events,
                },
            });
        }
        Ok(decoded)
    }
}

fn next_token(page: &SelectedPage) -> HistoryResult<Vec<u8>> {
    if page.exhausted {
        Ok(Vec::new())
    } else {
        page.cursor.encode()
    }
}

fn window_not_found(token: &BranchToken, req: &ReadHistoryBranchRequest) -> HistoryError {
    HistoryError::not_found(format!(
        "events [{}, {}) on branch {}",
        req.min_event_id, req.max_event_id, token.branch_id
    ))
}
