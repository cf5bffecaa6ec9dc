//! Storage layer for history trees
//!
//! This crate implements the persistence side of the history tree:
//! - HistoryStore: Backend contract over the `branches` and `nodes` tables
//! - InMemoryHistoryStore: DashMap-sharded backend, one shard per tree
//! - NodeVersions: Every version of a node, newest first
//! - EventCodec: Swappable event batch serialization
//!
//! The storage layer has no notion of ancestry, fencing, or shadowing.
//! Those belong to the engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod memory;
pub mod store;

pub use codec::{BincodeEventCodec, CodecError, EventCodec};
pub use memory::{InMemoryHistoryStore, NodeVersions, TreeShard};
pub use store::{
    BranchRecord, HistoryStore, InsertOutcome, NodeQuery, NodeRecord, StoreError, StoreResult,
};
