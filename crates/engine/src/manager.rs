//! History manager: the entry point for every history tree operation
//!
//! The manager owns the collaborators every operation needs (backend, event
//! codec, lease fence) plus in-process state (per-branch commit locks and
//! metrics). The operations themselves live in sibling modules as further
//! `impl HistoryManager` blocks:
//!
//! - `append`: AppendHistoryNodes, AppendRawHistoryNodes
//! - `read`: ReadHistoryBranch and its Reverse, ByBatch, Raw variants
//! - `fork`: ForkHistoryBranch
//! - `trim`: TrimHistoryBranch
//! - `gc`: DeleteHistoryBranch
//! - `scan`: GetAllHistoryTreeBranches

use crate::config::HistoryConfig;
use crate::fence::{LeaseFence, ShardRegistry};
use crate::metrics::{HistoryMetrics, MetricsSnapshot};
use crate::request::GetHistoryTreeResponse;
use dashmap::DashMap;
use historytree_core::{
    BranchId, BranchInfo, BranchToken, HistoryError, HistoryResult, RangeId, RetentionHints,
    ShardId, TreeId,
};
use historytree_storage::{BincodeEventCodec, BranchRecord, EventCodec, HistoryStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Expiry point of a single operation
///
/// Checked before each backend round-trip. Without a configured timeout the
/// deadline never expires.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    operation: &'static str,
    expires_at: Option<Instant>,
}

impl Deadline {
    /// Deadline `timeout` from now, or unbounded
    pub fn after(operation: &'static str, timeout: Option<Duration>) -> Self {
        Self {
            operation,
            expires_at: timeout.map(|t| Instant::now() + t),
        }
    }

    /// A deadline that never expires
    pub fn unbounded(operation: &'static str) -> Self {
        Self::after(operation, None)
    }

    /// Fail with `Timeout` once expired
    pub fn check(&self) -> HistoryResult<()> {
        match self.expires_at {
            Some(at) if Instant::now() >= at => Err(HistoryError::Timeout {
                operation: self.operation,
            }),
            _ => Ok(()),
        }
    }
}

/// Manager for branching event history trees
///
/// Thread-safe: share it behind an `Arc`. Cross-process exclusion comes from
/// the lease fence; within a process, appends and trims on the same branch
/// serialize on a per-branch commit lock.
pub struct HistoryManager {
    pub(crate) store: Arc<dyn HistoryStore>,
    pub(crate) codec: Arc<dyn EventCodec>,
    pub(crate) fence: LeaseFence,
    pub(crate) config: HistoryConfig,
    pub(crate) metrics: HistoryMetrics,
    commit_locks: DashMap<BranchId, Arc<Mutex<()>>>,
}

impl HistoryManager {
    /// Create a manager using the bincode event codec
    ///
    /// Fails with `InvalidArgument` if the configuration does not validate.
    pub fn new(
        store: Arc<dyn HistoryStore>,
        registry: Arc<dyn ShardRegistry>,
        config: HistoryConfig,
    ) -> HistoryResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            codec: Arc::new(BincodeEventCodec),
            fence: LeaseFence::new(registry),
            config,
            metrics: HistoryMetrics::new(),
            commit_locks: DashMap::new(),
        })
    }

    /// Replace the event codec
    pub fn with_codec(mut self, codec: Arc<dyn EventCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Snapshot of operation counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Identifier of the event codec in use
    pub fn codec_id(&self) -> &str {
        self.codec.codec_id()
    }

    /// Token for a fresh root branch in a fresh tree
    ///
    /// No I/O happens: the branch row is created by the first append with
    /// `is_new_branch` set.
    pub fn new_history_branch(
        &self,
        namespace_id: &str,
        workflow_id: &str,
        run_id: &str,
        retention: RetentionHints,
    ) -> HistoryResult<Vec<u8>> {
        let token = BranchToken::new(
            namespace_id,
            workflow_id,
            run_id,
            TreeId::new(),
            None,
            Vec::new(),
            retention,
        );
        debug!(
            target: "historytree::append",
            tree_id = %token.tree_id,
            branch_id = %token.branch_id,
            "New history branch token"
        );
        token.encode()
    }

    /// Addressing information carried by a token
    pub fn parse_history_branch_info(&self, branch_token: &[u8]) -> HistoryResult<BranchInfo> {
        Ok(BranchToken::decode(branch_token)?.info())
    }

    /// Tokens of every live branch of a tree
    pub fn get_history_tree(&self, tree_id: TreeId) -> HistoryResult<GetHistoryTreeResponse> {
        let deadline = self.deadline("get_history_tree");
        deadline.check()?;
        let mut records = self.store.tree_branches(tree_id)?;
        records.sort_by_key(|record| record.branch_id());
        let branch_tokens = records
            .iter()
            .map(|record| record.token.encode())
            .collect::<HistoryResult<Vec<_>>>()?;
        Ok(GetHistoryTreeResponse { branch_tokens })
    }

    pub(crate) fn deadline(&self, operation: &'static str) -> Deadline {
        Deadline::after(operation, self.config.operation_timeout())
    }

    /// Lease check that also counts rejections
    pub(crate) fn check_lease(&self, shard_id: ShardId, range_id: RangeId) -> HistoryResult<()> {
        self.fence.check(shard_id, range_id).map_err(|e| {
            self.metrics.record_fencing_rejection();
            e
        })
    }

    /// Stored branch row, or `NotFound`
    pub(crate) fn require_branch(
        &self,
        deadline: &Deadline,
        token: &BranchToken,
    ) -> HistoryResult<BranchRecord> {
        deadline.check()?;
        self.store
            .get_branch(token.tree_id, token.branch_id)?
            .ok_or_else(|| {
                HistoryError::not_found(format!(
                    "branch {} of tree {}",
                    token.branch_id, token.tree_id
                ))
            })
    }

    pub(crate) fn commit_lock(&self, branch_id: BranchId) -> Arc<Mutex<()>> {
        self.commit_locks
            .entry(branch_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) fn remove_commit_lock(&self, branch_id: &BranchId) {
        self.commit_locks.remove(branch_id);
    }

    #[cfg(test)]
    pub(crate) fn commit_lock_count(&self) -> usize {
        self.commit_locks.len()
    }
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("codec", &self.codec.codec_id())
            .field("config", &self.config)
            .field("commit_locks", &self.commit_locks.len())
            .finish_non_exhaustive()
    }
}
