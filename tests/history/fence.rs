//! Shard Lease Fence Tests
//!
//! Only the current lease holder may mutate; stale owners are rejected
//! before any change reaches storage.

use crate::common::*;
use historytree::{HistoryError, ShardRegistry};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn exactly_one_of_two_owners_succeeds() {
    let h = TestHistory::new();
    let token = h.new_branch();
    let stale = h.lease;
    let current = h.registry.acquire(SHARD);

    let old_owner = h.append_as(stale, &token, events(1, 3, "old"), 10, 0);
    let new_owner = h.append_as(current, &token, events(1, 3, "new"), 10, 0);

    assert!(matches!(
        old_owner.unwrap_err(),
        HistoryError::ShardOwnershipLost {
            shard_id: SHARD,
            current_range_id: Some(_),
            ..
        }
    ));
    assert!(new_owner.is_ok());
    assert_eq!(h.read_tags(&token, 1, 4).unwrap(), expected("new", 1, 3));
}

#[test]
fn concurrent_owners_race() {
    let h = TestHistory::new();
    let token = h.new_branch();
    let stale = h.lease;
    let current = h.registry.acquire(SHARD);
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [(stale, "old"), (current, "new")]
        .into_iter()
        .map(|(range_id, tag)| {
            let manager = Arc::clone(&h.manager);
            let barrier = Arc::clone(&barrier);
            let token = token.clone();
            thread::spawn(move || {
                barrier.wait();
                manager.append_history_nodes(historytree::AppendHistoryNodesRequest {
                    shard_id: SHARD,
                    range_id,
                    branch_token: token,
                    events: events(1, 3, tag),
                    transaction_id: 10,
                    prev_transaction_id: 0,
                    is_new_branch: true,
                    info: String::new(),
                })
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let fenced = results
        .iter()
        .filter(|r| matches!(r, Err(HistoryError::ShardOwnershipLost { .. })))
        .count();
    assert_eq!((ok, fenced), (1, 1));
}

#[test]
fn every_mutation_is_fenced() {
    let h = TestHistory::new();
    let b1 = seeded_branch(&h);
    let b2 = h.fork(&b1, 4).unwrap();
    h.registry.acquire(SHARD);

    let fenced = |r: Result<usize, HistoryError>| {
        matches!(r, Err(HistoryError::ShardOwnershipLost { .. }))
    };
    assert!(fenced(h.append(&b1, events(6, 6, "a"), 12, 11).map(|r| r.size)));
    assert!(fenced(h.fork(&b1, 4).map(|t| t.len())));
    assert!(fenced(h.trim(&b1, 4, 11)));
    assert!(fenced(h.delete(&b2)));
    assert_eq!(h.manager.metrics().fencing_rejections, 4);

    // Reads are not fenced
    assert_eq!(h.read_tags(&b1, 1, 6).unwrap(), expected("a", 1, 5));
}

#[test]
fn released_shard_rejects_everyone() {
    let h = TestHistory::new();
    let token = h.new_branch();
    h.registry.release(SHARD);
    assert_eq!(h.registry.current_lease(SHARD), None);

    let err = h.append(&token, events(1, 1, "a"), 1, 0).unwrap_err();
    assert!(matches!(
        err,
        HistoryError::ShardOwnershipLost {
            current_range_id: None,
            ..
        }
    ));
    assert_eq!(h.store.tree_count(), 0);
}

#[test]
fn failover_then_handoff_race_caught_by_chaining() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);

    // New owner takes over and extends history
    let lease = h.registry.acquire(SHARD);
    h.append_as(lease, &token, events(6, 6, "new"), 20, 11).unwrap();

    // A writer holding the new lease but unaware of node 6
    let err = h
        .append_as(lease, &token, events(7, 7, "late"), 21, 11)
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(
        h.read_tags(&token, 1, 100).unwrap(),
        [expected("a", 1, 5), expected("new", 6, 6)].concat()
    );
}

#[test]
fn reacquired_shard_fences_previous_owner() {
    let h = TestHistory::new();
    let token = seeded_branch(&h);
    let old = h.lease;

    h.registry.release(SHARD);
    let new = h.registry.acquire(SHARD);
    assert!(new > old);

    let err = h
        .append_as(old, &token, events(6, 6, "old"), 12, 11)
        .unwrap_err();
    assert!(matches!(err, HistoryError::ShardOwnershipLost { .. }));
    h.append_as(new, &token, events(6, 6, "new"), 12, 11).unwrap();
    assert_eq!(
        h.read_tags(&token, 1, 7).unwrap(),
        [expected("a", 1, 5), expected("new", 6, 6)].concat()
    );
}
