//! History engine for branching event histories
//!
//! This crate orchestrates the lower layers:
//! - HistoryManager: entry point for every operation
//! - Lease fencing: rejects mutations from stale shard owners
//! - NodeWriter, HistoryReader, BranchForker, BranchTrimmer, BranchGC,
//!   TreeScanner: the operations, one module each
//! - Configuration and metrics
//!
//! The engine is the only component that knows about:
//! - Ancestor chains and version selection
//! - Causal chaining of appends
//! - Reference counting during deletion

#![warn(missing_docs)]
#![warn(clippy::all)]

mod append;
pub mod config;
pub mod fence;
mod fork;
mod gc;
pub mod manager;
pub mod metrics;
mod read;
pub mod request;
mod scan;
mod trim;

pub use config::{ConfigError, HistoryConfig, CONFIG_FILE_NAME};
pub use fence::{InMemoryShardRegistry, LeaseFence, ShardRegistry};
pub use manager::{Deadline, HistoryManager};
pub use metrics::{HistoryMetrics, MetricsSnapshot};
pub use request::{
    AppendHistoryNodesRequest, AppendHistoryNodesResponse, AppendRawHistoryNodesRequest,
    DeleteHistoryBranchRequest, DeleteHistoryBranchResponse, ForkHistoryBranchRequest,
    ForkHistoryBranchResponse, GetAllHistoryTreeBranchesRequest,
    GetAllHistoryTreeBranchesResponse, GetHistoryTreeResponse, HistoryBatch,
    HistoryBranchDetail, RawHistoryNode, ReadHistoryBranchByBatchResponse,
    ReadHistoryBranchRequest, ReadHistoryBranchResponse, ReadRawHistoryBranchResponse,
    TrimHistoryBranchRequest, TrimHistoryBranchResponse,
};
