//! NodeWriter Tests
//!
//! Causal chaining, shadowing writes, idempotent retries, and validation.

use crate::common::*;
use historytree::{
    AppendHistoryNodesRequest, AppendRawHistoryNodesRequest, BincodeEventCodec, EventCodec,
    HistoryConfig, HistoryError, HistoryEvent,
};

#[test]
fn linear_round_trip() {
    let h = TestHistory::new();
    let token = h.new_branch();
    let written = events(1, 3, "a");
    h.append(&token, written.clone(), 10, 0).unwrap();

    let read = h.read_events(&token, 1, 4, 0).unwrap();
    assert_eq!(read, written);
}

#[test]
fn append_size_matches_codec_output() {
    let h = TestHistory::new();
    let token = h.new_branch();
    let batch = events(1, 3, "a");
    let expected_size = BincodeEventCodec.encode(&batch).unwrap().len();

    let resp = h.append(&token, batch, 10, 0).unwrap();
    assert_eq!(resp.size, expected_size);
    assert_eq!(resp.node_id, 1);
}

#[test]
fn chain_must_name_preceding_batch() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);

    // Preceding batch of node 6 is node 4 at txn 11
    let err = h.append(&token, events(6, 6, "a"), 12, 10).unwrap_err();
    assert!(err.is_conflict());
    h.append(&token, events(6, 6, "a"), 12, 11).unwrap();
    assert_eq!(h.read_tags(&token, 1, 7).unwrap(), expected("a", 1, 6));
}

#[test]
fn rejected_append_leaves_no_trace() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    let info = h.token(&token);
    let before = h.store.node_version_count(info.tree_id, info.branch_id);

    assert!(h.append(&token, events(6, 6, "x"), 12, 3).is_err());
    assert_eq!(h.store.node_version_count(info.tree_id, info.branch_id), before);
}

#[test]
fn rejected_first_append_creates_no_branch() {
    let h = TestHistory::new();
    let token = h.new_branch();
    let tree_id = h.token(&token).tree_id;

    let err = h
        .manager
        .append_history_nodes(AppendHistoryNodesRequest {
            shard_id: SHARD,
            range_id: h.lease,
            branch_token: token.clone(),
            events: events(1, 3, "a"),
            transaction_id: 10,
            prev_transaction_id: 5,
            is_new_branch: true,
            info: "integration".into(),
        })
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(h.manager.get_history_tree(tree_id).unwrap().branch_tokens.is_empty());
    assert_eq!(h.store.tree_count(), 0);

    h.append(&token, events(1, 3, "a"), 10, 0).unwrap();
    assert_eq!(h.manager.get_history_tree(tree_id).unwrap().branch_tokens.len(), 1);
}

#[test]
fn rewrite_keeps_old_version_in_storage() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    h.append(&token, events(4, 5, "b"), 12, 10).unwrap();

    let info = h.token(&token);
    assert_eq!(h.store.node_version_count(info.tree_id, info.branch_id), 3);
    assert_eq!(
        h.read_tags(&token, 1, 6).unwrap(),
        [expected("a", 1, 3), expected("b", 4, 5)].concat()
    );
}

#[test]
fn retry_after_success_is_noop() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    let resp = h.append(&token, events(4, 5, "a"), 11, 10).unwrap();
    assert_eq!(resp.node_id, 4);

    let info = h.token(&token);
    assert_eq!(h.store.node_version_count(info.tree_id, info.branch_id), 2);
    assert_eq!(h.manager.metrics().appends, 2);
}

#[test]
fn same_key_different_payload_is_conflict() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    let err = h.append(&token, events(4, 5, "z"), 11, 10).unwrap_err();
    assert!(err.is_conflict());
}

#[test]
fn append_to_unknown_branch_is_not_found() {
    let h = TestHistory::new();
    let token = h.new_branch();
    // prev != 0 means the helper does not create the branch
    let err = h.append(&token, events(1, 3, "a"), 10, 5).unwrap_err();
    assert!(matches!(err, HistoryError::NotFound { .. }));
}

#[test]
fn batch_validation() {
    let h = TestHistory::new();
    let token = h.new_branch();

    assert!(matches!(
        h.append(&token, Vec::new(), 10, 0).unwrap_err(),
        HistoryError::InvalidArgument { .. }
    ));

    let gap = vec![
        HistoryEvent::new(1, 1, "e", vec![]),
        HistoryEvent::new(3, 1, "e", vec![]),
    ];
    assert!(matches!(
        h.append(&token, gap, 10, 0).unwrap_err(),
        HistoryError::InvalidArgument { .. }
    ));

    let mixed = vec![
        HistoryEvent::new(1, 1, "e", vec![]),
        HistoryEvent::new(2, 2, "e", vec![]),
    ];
    assert!(matches!(
        h.append(&token, mixed, 10, 0).unwrap_err(),
        HistoryError::InvalidArgument { .. }
    ));
}

#[test]
fn oversized_batch_rejected() {
    let h = TestHistory::with_config(HistoryConfig {
        transaction_size_limit: 128,
        ..HistoryConfig::default()
    });
    let token = h.new_branch();
    let big = vec![HistoryEvent::new(1, 1, "big", vec![7u8; 1024])];
    let err = h.append(&token, big, 10, 0).unwrap_err();
    assert!(matches!(err, HistoryError::TransactionSizeLimit { limit: 128, .. }));
    assert!(!err.is_retryable());
}

#[test]
fn raw_append_interoperates_with_decoded_reads() {
    let h = TestHistory::new();
    let token = h.new_branch();
    let batch = events(1, 2, "raw");
    let blob = BincodeEventCodec.encode(&batch).unwrap();

    h.manager
        .append_raw_history_nodes(AppendRawHistoryNodesRequest {
            shard_id: SHARD,
            range_id: h.lease,
            branch_token: token.clone(),
            node_id: 1,
            blob,
            transaction_id: 3,
            prev_transaction_id: 0,
            is_new_branch: true,
            info: String::new(),
        })
        .unwrap();

    assert_eq!(h.read_events(&token, 1, 3, 0).unwrap(), batch);
}

#[test]
fn append_into_ancestor_range_rejected() {
    let h = TestHistory::new();
    let b1 = seeded_branch(&h);
    let b2 = h.fork(&b1, 4).unwrap();
    let err = h.append(&b2, events(2, 3, "x"), 20, 10).unwrap_err();
    assert!(matches!(err, HistoryError::InvalidArgument { .. }));
}

#[test]
fn append_after_longer_rewrite_skips_stale_batch() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    h.append(&token, events(6, 7, "a"), 12, 11).unwrap();
    // Rewrite from node 4 with a longer batch; node 6 at txn 12 is now stale
    h.append(&token, events(4, 7, "b"), 13, 10).unwrap();

    let err = h.append(&token, events(8, 8, "b"), 14, 12).unwrap_err();
    assert!(err.is_conflict());
    h.append(&token, events(8, 8, "b"), 14, 13).unwrap();

    assert_eq!(
        h.read_tags(&token, 1, 10).unwrap(),
        [expected("a", 1, 3), expected("b", 4, 8)].concat()
    );
}
