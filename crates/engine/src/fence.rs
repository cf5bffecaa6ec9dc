//! Shard lease fencing
//!
//! Every mutating call presents `(shard_id, range_id)`. The fence compares
//! the range id against the lease currently recorded for the shard and
//! rejects the call before any mutation when they differ.
//!
//! Lease acquisition itself happens elsewhere; this module only consumes the
//! current lease through [`ShardRegistry`].

use dashmap::DashMap;
use historytree_core::{HistoryError, HistoryResult, RangeId, ShardId};
use std::sync::Arc;
use tracing::warn;

/// Source of truth for shard ownership
pub trait ShardRegistry: Send + Sync {
    /// Lease currently owning the shard, or None when nobody owns it
    fn current_lease(&self, shard_id: ShardId) -> Option<RangeId>;
}

/// Highest lease ever issued for a shard and whether it is still held
#[derive(Debug, Clone, Copy, Default)]
struct ShardLease {
    range_id: RangeId,
    owned: bool,
}

/// In-process shard registry
///
/// Leases increase monotonically per shard. Each [`acquire`](Self::acquire)
/// models an ownership change and invalidates every earlier range id, even
/// across a [`release`](Self::release).
#[derive(Debug, Default)]
pub struct InMemoryShardRegistry {
    leases: DashMap<ShardId, ShardLease>,
}

impl InMemoryShardRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a shard, returning the new lease
    pub fn acquire(&self, shard_id: ShardId) -> RangeId {
        let mut lease = self.leases.entry(shard_id).or_default();
        lease.range_id += 1;
        lease.owned = true;
        lease.range_id
    }

    /// Record an externally assigned lease
    ///
    /// Fails with `InvalidArgument` when `range_id` would reissue or go
    /// below a lease already handed out for the shard.
    pub fn set_lease(&self, shard_id: ShardId, range_id: RangeId) -> HistoryResult<()> {
        let mut lease = self.leases.entry(shard_id).or_default();
        let reissue = range_id == lease.range_id && !lease.owned;
        if range_id < lease.range_id || reissue {
            return Err(HistoryError::invalid_argument(format!(
                "lease {} for shard {} does not advance past {}",
                range_id, shard_id, lease.range_id
            )));
        }
        lease.range_id = range_id;
        lease.owned = true;
        Ok(())
    }

    /// Forget the shard's owner; every later check fails until re-acquired
    pub fn release(&self, shard_id: ShardId) {
        if let Some(mut lease) = self.leases.get_mut(&shard_id) {
            lease.owned = false;
        }
    }
}

impl ShardRegistry for InMemoryShardRegistry {
    fn current_lease(&self, shard_id: ShardId) -> Option<RangeId> {
        self.leases
            .get(&shard_id)
            .filter(|lease| lease.owned)
            .map(|lease| lease.range_id)
    }
}

/// Validates caller leases against a [`ShardRegistry`]
#[derive(Clone)]
pub struct LeaseFence {
    registry: Arc<dyn ShardRegistry>,
}

impl LeaseFence {
    /// Create a fence over a registry
    pub fn new(registry: Arc<dyn ShardRegistry>) -> Self {
        Self { registry }
    }

    /// Fail with `ShardOwnershipLost` unless `range_id` is the shard's current lease
    pub fn check(&self, shard_id: ShardId, range_id: RangeId) -> HistoryResult<()> {
        let current = self.registry.current_lease(shard_id);
        if current == Some(range_id) {
            return Ok(());
        }
        warn!(
            target: "historytree::fence",
            shard_id,
            request_range_id = range_id,
            current_range_id = ?current,
            "Rejected request from stale shard owner"
        );
        Err(HistoryError::ShardOwnershipLost {
            shard_id,
            request_range_id: range_id,
            current_range_id: current,
        })
    }
}

impl std::fmt::Debug for LeaseFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseFence").finish_non_exhaustive()
    }
}
