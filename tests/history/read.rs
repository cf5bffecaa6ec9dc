//! HistoryReader Tests
//!
//! Version selection across ancestor ranges, pagination, reverse and raw
//! variants, and corruption detection.

use crate::common::*;
use historytree::{
    AppendRawHistoryNodesRequest, BincodeEventCodec, EventCodec, HistoryError,
    ReadHistoryBranchRequest, StoreError,
};

#[test]
fn shadowing_law() {
    let h = TestHistory::new();
    let token = h.new_branch();
    h.append(&token, events(1, 3, "a"), 10, 0).unwrap();
    h.append(&token, events(4, 5, "b"), 11, 10).unwrap();
    h.append(&token, events(4, 5, "c"), 12, 10).unwrap();

    assert_eq!(h.read_tags(&token, 4, 6).unwrap(), expected("c", 4, 5));
}

#[test]
fn by_batch_reports_transaction_ids() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    h.append(&token, events(6, 8, "a"), 12, 11).unwrap();

    let batches = h.read_batches(&token, 1, 9).unwrap();
    let keys: Vec<_> = batches
        .iter()
        .map(|b| (b.node_id, b.transaction_id, b.events.len()))
        .collect();
    assert_eq!(keys, vec![(1, 10, 3), (4, 11, 2), (6, 12, 3)]);
}

#[test]
fn every_page_size_yields_same_history() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    h.append(&token, events(6, 6, "a"), 12, 11).unwrap();
    h.append(&token, events(7, 9, "a"), 13, 12).unwrap();

    for page_size in 1..=5 {
        assert_eq!(
            tags(&h.read_events(&token, 1, 10, page_size).unwrap()),
            expected("a", 1, 9),
            "page size {}",
            page_size
        );
    }
}

#[test]
fn window_is_batch_aligned() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    h.append(&token, events(6, 6, "a"), 12, 11).unwrap();

    // A batch starting inside the window is returned whole
    assert_eq!(h.read_tags(&token, 4, 5).unwrap(), expected("a", 4, 5));
    assert_eq!(h.read_tags(&token, 4, 7).unwrap(), expected("a", 4, 6));
}

#[test]
fn window_beyond_history_not_found() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    let err = h.read_events(&token, 100, 200, 0).unwrap_err();
    assert!(matches!(err, HistoryError::NotFound { .. }));
}

#[test]
fn reverse_read_mirrors_forward_read() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    h.append(&token, events(4, 5, "b"), 12, 10).unwrap();
    h.append(&token, events(6, 7, "b"), 13, 12).unwrap();

    let forward = h.read_tags(&token, 1, 8).unwrap();

    let mut backward = Vec::new();
    let mut request = ReadHistoryBranchRequest::new(SHARD, token.clone(), 1, 8, 1);
    loop {
        let page = h.manager.read_history_branch_reverse(request.clone()).unwrap();
        backward.extend(tags(&page.events));
        if page.next_page_token.is_empty() {
            break;
        }
        request = request.with_page_token(page.next_page_token);
    }
    backward.reverse();
    assert_eq!(backward, forward);
}

#[test]
fn raw_read_returns_selected_blobs() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    h.append(&token, events(4, 5, "b"), 12, 10).unwrap();

    let page = h
        .manager
        .read_raw_history_branch(ReadHistoryBranchRequest::new(SHARD, token, 1, 6, 0))
        .unwrap();
    let keys: Vec<_> = page
        .nodes
        .iter()
        .map(|n| (n.node_id, n.transaction_id))
        .collect();
    assert_eq!(keys, vec![(1, 10), (4, 12)]);
    assert_eq!(
        BincodeEventCodec.decode(&page.nodes[1].blob).unwrap(),
        events(4, 5, "b")
    );
    assert_eq!(
        page.size,
        page.nodes.iter().map(|n| n.blob.len()).sum::<usize>()
    );
}

#[test]
fn mismatched_blob_is_data_loss() {
    let h = TestHistory::new();
    let token = h.new_branch();
    h.append(&token, events(1, 3, "a"), 10, 0).unwrap();
    // Node 4 claims to hold events starting at 9
    h.manager
        .append_raw_history_nodes(AppendRawHistoryNodesRequest {
            shard_id: SHARD,
            range_id: h.lease,
            branch_token: token.clone(),
            node_id: 4,
            blob: BincodeEventCodec.encode(&events(9, 9, "x")).unwrap(),
            transaction_id: 11,
            prev_transaction_id: 10,
            is_new_branch: false,
            info: String::new(),
        })
        .unwrap();

    let err = h.read_events(&token, 1, 10, 0).unwrap_err();
    assert!(matches!(err, HistoryError::DataLoss { .. }));
}

#[test]
fn stale_leftover_after_rewrite_is_hidden() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    h.append(&token, events(6, 6, "a"), 12, 11).unwrap();
    // Rewrite node 4 at a newer txn; node 6 at txn 12 predates it
    h.append(&token, events(4, 5, "b"), 13, 10).unwrap();

    assert_eq!(
        h.read_tags(&token, 1, 10).unwrap(),
        [expected("a", 1, 3), expected("b", 4, 5)].concat()
    );
}

#[test]
fn backend_timeout_is_classified() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    h.store.inject_failure(StoreError::Timeout("read_nodes".into()));
    let err = h.read_events(&token, 1, 6, 0).unwrap_err();
    assert!(matches!(err, HistoryError::Timeout { .. }));
    assert!(err.is_retryable());
    assert_eq!(h.read_tags(&token, 1, 6).unwrap(), expected("a", 1, 5));
}
