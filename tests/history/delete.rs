//! BranchGC Tests
//!
//! Reference-safe deletion, cascading reclamation, and idempotence.

use crate::common::*;
use historytree::{HistoryError, StoreError};

#[test]
fn delete_reference_safety() {
    let h = TestHistory::new();
    let b1 = seeded_branch(&h);
    let b2 = h.fork(&b1, 4).unwrap();
    h.append(&b2, events(4, 5, "b"), 12, 10).unwrap();
    let tree_id = h.token(&b1).tree_id;
    let b1_id = h.token(&b1).branch_id;

    assert_eq!(h.delete(&b1).unwrap(), 1);
    // b1 keeps only node 1, which b2 still inherits
    assert_eq!(h.store.node_version_count(tree_id, b1_id), 1);
    assert_eq!(
        h.read_tags(&b2, 1, 6).unwrap(),
        [expected("a", 1, 3), expected("b", 4, 5)].concat()
    );

    assert_eq!(h.delete(&b2).unwrap(), 2);
    assert_eq!(h.store.total_node_versions(), 0);
    assert!(!h.store.has_tree(&tree_id));

    for token in [&b1, &b2] {
        let err = h.read_events(token, 1, 6, 0).unwrap_err();
        assert!(matches!(err, HistoryError::NotFound { .. }));
    }
}

#[test]
fn gc_idempotence() {
    let h = TestHistory::new();
    let b1 = seeded_branch(&h);
    let b2 = h.fork(&b1, 4).unwrap();
    h.append(&b2, events(4, 5, "b"), 12, 10).unwrap();

    h.delete(&b1).unwrap();
    let versions = h.store.total_node_versions();
    assert_eq!(h.delete(&b1).unwrap(), 0);
    assert_eq!(h.store.total_node_versions(), versions);
    assert_eq!(
        h.read_tags(&b2, 1, 6).unwrap(),
        [expected("a", 1, 3), expected("b", 4, 5)].concat()
    );
}

#[test]
fn delete_middle_of_chain_cascades_to_reference() {
    let h = TestHistory::new();
    let b1 = seeded_branch(&h);
    let b2 = h.fork(&b1, 4).unwrap();
    h.append(&b2, events(4, 5, "b"), 12, 10).unwrap();
    h.append(&b2, events(6, 7, "b"), 13, 12).unwrap();
    let b3 = h.fork(&b2, 6).unwrap();
    h.append(&b3, events(6, 6, "c"), 14, 12).unwrap();

    h.delete(&b1).unwrap();
    h.delete(&b2).unwrap();
    // b2's node 6 is exclusive to b2; node 4 is still inherited by b3
    let tree_id = h.token(&b2).tree_id;
    assert_eq!(h.store.node_version_count(tree_id, h.token(&b2).branch_id), 1);
    assert_eq!(
        h.read_tags(&b3, 1, 100).unwrap(),
        [expected("a", 1, 3), expected("b", 4, 5), expected("c", 6, 6)].concat()
    );

    h.delete(&b3).unwrap();
    assert_eq!(h.store.total_node_versions(), 0);
    assert_eq!(h.store.tree_count(), 0);
}

#[test]
fn sibling_forks_share_ancestor_until_last_is_deleted() {
    let h = TestHistory::new();
    let b1 = seeded_branch(&h);
    let left = h.fork(&b1, 4).unwrap();
    let right = h.fork(&b1, 4).unwrap();
    h.delete(&b1).unwrap();

    h.delete(&left).unwrap();
    assert_eq!(h.read_tags(&right, 1, 100).unwrap(), expected("a", 1, 3));

    h.delete(&right).unwrap();
    assert_eq!(h.store.tree_count(), 0);
}

#[test]
fn delete_leaves_other_trees_alone() {
    let h = TestHistory::new();
    let first = seeded_branch(&h);
    let second = seeded_branch(&h);
    h.delete(&first).unwrap();
    assert_eq!(h.store.tree_count(), 1);
    assert_eq!(h.read_tags(&second, 1, 6).unwrap(), expected("a", 1, 5));
}

#[test]
fn delete_counts_in_metrics() {
    let h = TestHistory::new();
    let b1 = seeded_branch(&h);
    h.delete(&b1).unwrap();
    let snap = h.manager.metrics();
    assert_eq!(snap.deletes, 1);
    assert_eq!(snap.nodes_deleted, 2);
}

#[test]
fn interrupted_delete_finishes_on_retry() {
    let h = TestHistory::new();
    let b1 = seeded_branch(&h);
    let b2 = h.fork(&b1, 4).unwrap();
    h.append(&b2, events(4, 5, "b"), 12, 10).unwrap();
    let tree_id = h.token(&b1).tree_id;
    h.delete(&b1).unwrap();

    // Row lookup and row removal succeed, the reference scan fails
    h.store.inject_failure_after(2, StoreError::Unavailable("connection reset".into()));
    let err = h.delete(&b2).unwrap_err();
    assert!(matches!(err, HistoryError::Unavailable { .. }));
    assert!(h.manager.get_history_tree(tree_id).unwrap().branch_tokens.is_empty());
    assert_eq!(h.store.total_node_versions(), 2);

    // The row is gone, so the retry walks the chain carried by the token
    assert_eq!(h.delete(&b2).unwrap(), 2);
    assert_eq!(h.store.total_node_versions(), 0);
    assert!(!h.store.has_tree(&tree_id));
}
