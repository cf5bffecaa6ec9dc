//! Branch token codec
//!
//! A branch token is the only handle callers hold for a branch. It carries
//! the execution identity, the tree and branch ids, the ancestor chain
//! (root to leaf), and retention hints.
//!
//! # Wire Format
//!
//! ```text
//! +---------+---------------------------+
//! | version | bincode(BranchTokenBody)  |
//! | 1 byte  | fixint, no trailing bytes |
//! +---------+---------------------------+
//! ```
//!
//! Decoding is pure and rejects anything that is not exactly one well-formed
//! body of a known version.

use crate::error::{HistoryError, HistoryResult};
use crate::types::{
    AncestorRange, BranchId, NodeId, RetentionHints, TreeId, FIRST_EVENT_ID, MAX_NODE_ID,
};
use bincode::Options;
use serde::{Deserialize, Serialize};

/// Current token format version
pub const TOKEN_FORMAT_VERSION: u8 = 1;

/// Upper bound on an encoded token, guards decode allocations
pub const MAX_TOKEN_SIZE: u64 = 64 * 1024;

/// Opaque, serializable handle addressing one branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchToken {
    /// Namespace owning the execution
    pub namespace_id: String,
    /// Workflow id of the execution
    pub workflow_id: String,
    /// Run id the branch belongs to
    pub run_id: String,
    /// Tree the branch lives in
    pub tree_id: TreeId,
    /// The branch itself
    pub branch_id: BranchId,
    /// Ancestor chain, root to leaf
    pub ancestors: Vec<AncestorRange>,
    /// Opaque retention metadata
    pub retention: RetentionHints,
}

/// Parsed addressing information of a branch token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    /// Tree the branch lives in
    pub tree_id: TreeId,
    /// The branch itself
    pub branch_id: BranchId,
    /// Ancestor chain, root to leaf
    pub ancestors: Vec<AncestorRange>,
    /// First node id of the branch's own range
    pub own_begin_node_id: NodeId,
}

fn codec_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .with_limit(MAX_TOKEN_SIZE)
}

impl BranchToken {
    /// Build a token. A fresh branch id is generated when `branch_id` is None.
    pub fn new(
        namespace_id: impl Into<String>,
        workflow_id: impl Into<String>,
        run_id: impl Into<String>,
        tree_id: TreeId,
        branch_id: Option<BranchId>,
        ancestors: Vec<AncestorRange>,
        retention: RetentionHints,
    ) -> Self {
        Self {
            namespace_id: namespace_id.into(),
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
            tree_id,
            branch_id: branch_id.unwrap_or_default(),
            ancestors,
            retention,
        }
    }

    /// First node id of this branch's own writable range
    ///
    /// 1 for a root branch, the fork point for a forked branch.
    pub fn own_begin_node_id(&self) -> NodeId {
        self.ancestors
            .last()
            .map(|range| range.end_node_id)
            .unwrap_or(FIRST_EVENT_ID)
    }

    /// The branch's own range as an open-ended range
    pub fn own_range(&self) -> AncestorRange {
        AncestorRange::new(self.branch_id, self.own_begin_node_id(), MAX_NODE_ID)
    }

    /// Ancestor ranges followed by the own range, root to leaf
    pub fn ranges_for_read(&self) -> Vec<AncestorRange> {
        let mut ranges = Vec::with_capacity(self.ancestors.len() + 1);
        ranges.extend(self.ancestors.iter().copied());
        ranges.push(self.own_range());
        ranges
    }

    /// Addressing view of the token
    pub fn info(&self) -> BranchInfo {
        BranchInfo {
            tree_id: self.tree_id,
            branch_id: self.branch_id,
            ancestors: self.ancestors.clone(),
            own_begin_node_id: self.own_begin_node_id(),
        }
    }

    /// Serialize the token
    pub fn encode(&self) -> HistoryResult<Vec<u8>> {
        let body = codec_options().serialize(self)?;
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(TOKEN_FORMAT_VERSION);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Deserialize and validate a token
    pub fn decode(bytes: &[u8]) -> HistoryResult<Self> {
        let (version, body) = bytes
            .split_first()
            .ok_or_else(|| HistoryError::deserialization("empty branch token"))?;
        if *version != TOKEN_FORMAT_VERSION {
            return Err(HistoryError::deserialization(format!(
                "unsupported branch token version {}",
                version
            )));
        }
        let token: BranchToken = codec_options().deserialize(body)?;
        validate_ancestors(&token.ancestors)?;
        Ok(token)
    }
}

/// Check that a chain starts at the first node and is gapless
pub fn validate_ancestors(ancestors: &[AncestorRange]) -> HistoryResult<()> {
    let mut expected_begin = FIRST_EVENT_ID;
    for range in ancestors {
        if range.begin_node_id != expected_begin {
            return Err(HistoryError::deserialization(format!(
                "ancestor range {} does not start at node {}",
                range, expected_begin
            )));
        }
        if range.is_empty() {
            return Err(HistoryError::deserialization(format!(
                "ancestor range {} is empty",
                range
            )));
        }
        expected_begin = range.end_node_id;
    }
    Ok(())
}
