//! historytree - Branching, append-only event history store
//!
//! Each workflow run's history is a tree of branches. A branch is a chain of
//! inherited ancestor ranges followed by its own writable range; forks share
//! history without copying it, and shadowed versions let a writer replace a
//! batch without losing the old one.
//!
//! # Quick Start
//!
//! ```
//! use historytree::{
//!     AppendHistoryNodesRequest, HistoryConfig, HistoryEvent, HistoryManager,
//!     InMemoryHistoryStore, InMemoryShardRegistry, ReadHistoryBranchRequest, RetentionHints,
//! };
//! use std::sync::Arc;
//!
//! let registry = Arc::new(InMemoryShardRegistry::new());
//! let lease = registry.acquire(1);
//! let manager = HistoryManager::new(
//!     Arc::new(InMemoryHistoryStore::new()),
//!     registry,
//!     HistoryConfig::default(),
//! )?;
//!
//! let token = manager.new_history_branch("ns", "wf", "run", RetentionHints::default())?;
//! manager.append_history_nodes(AppendHistoryNodesRequest {
//!     shard_id: 1,
//!     range_id: lease,
//!     branch_token: token.clone(),
//!     events: vec![HistoryEvent::new(1, 1, "started", vec![])],
//!     transaction_id: 1,
//!     prev_transaction_id: 0,
//!     is_new_branch: true,
//!     info: String::new(),
//! })?;
//!
//! let page = manager.read_history_branch(ReadHistoryBranchRequest::new(1, token, 1, 2, 0))?;
//! assert_eq!(page.events.len(), 1);
//! # Ok::<(), historytree::HistoryError>(())
//! ```
//!
//! # Architecture
//!
//! - `historytree-core`: identifiers, branch token codec, error taxonomy
//! - `historytree-storage`: backend contract, in-memory backend, event codecs
//! - `historytree-engine`: lease fencing and every history operation

pub use historytree_core::{
    AncestorRange, BranchId, BranchInfo, BranchToken, EventId, HistoryError, HistoryEvent,
    HistoryResult, NodeId, RangeId, RetentionHints, ShardId, TransactionId, TreeId,
    EMPTY_TRANSACTION_ID, FIRST_EVENT_ID, MAX_NODE_ID,
};
pub use historytree_engine::*;
pub use historytree_storage::{
    BincodeEventCodec, BranchRecord, CodecError, EventCodec, HistoryStore, InMemoryHistoryStore,
    InsertOutcome, NodeQuery, NodeRecord, StoreError, StoreResult,
};
