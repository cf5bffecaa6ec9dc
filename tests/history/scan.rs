//! TreeScanner Tests

use crate::common::*;
use historytree::{GetAllHistoryTreeBranchesRequest, HistoryError};
use std::collections::BTreeSet;

fn scan_all(h: &TestHistory, page_size: usize) -> Vec<historytree::HistoryBranchDetail> {
    let mut out = Vec::new();
    let mut next_page_token = Vec::new();
    loop {
        let page = h
            .manager
            .get_all_history_tree_branches(GetAllHistoryTreeBranchesRequest {
                page_size,
                next_page_token,
            })
            .unwrap();
        out.extend(page.branches);
        if page.next_page_token.is_empty() {
            return out;
        }
        next_page_token = page.next_page_token;
    }
}

#[test]
fn scan_covers_all_trees_and_forks() {
    let h = TestHistory::new();
    let mut want = BTreeSet::new();
    for _ in 0..3 {
        let b1 = seeded_branch(&h);
        let b2 = h.fork(&b1, 4).unwrap();
        want.insert(h.token(&b1).branch_id);
        want.insert(h.token(&b2).branch_id);
    }

    for page_size in [1, 2, 4, 0] {
        let details = scan_all(&h, page_size);
        let got: BTreeSet<_> = details.iter().map(|d| d.branch_id).collect();
        assert_eq!(got, want, "page size {}", page_size);
        assert_eq!(details.len(), want.len());
    }
}

#[test]
fn scan_order_is_stable() {
    let h = TestHistory::new();
    for _ in 0..4 {
        seeded_branch(&h);
    }
    let keys: Vec<_> = scan_all(&h, 1)
        .iter()
        .map(|d| (d.tree_id, d.branch_id))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn scan_details_round_trip_tokens() {
    let h = TestHistory::new();
    let b1 = seeded_branch(&h);
    let b2 = h.fork(&b1, 4).unwrap();

    for detail in scan_all(&h, 0) {
        let token = h.token(&detail.branch_token);
        assert_eq!(token.branch_id, detail.branch_id);
        if detail.branch_id == h.token(&b2).branch_id {
            assert_eq!(detail.info, "fork");
            assert_eq!(token.ancestors.len(), 1);
        } else {
            assert_eq!(detail.info, "integration");
        }
    }
}

#[test]
fn scan_skips_deleted_branches() {
    let h = TestHistory::new();
    let keep = seeded_branch(&h);
    let gone = seeded_branch(&h);
    h.delete(&gone).unwrap();

    let details = scan_all(&h, 0);
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].branch_id, h.token(&keep).branch_id);
}

#[test]
fn scan_rejects_foreign_token() {
    let h = TestHistory::new();
    let err = h
        .manager
        .get_all_history_tree_branches(GetAllHistoryTreeBranchesRequest {
            page_size: 1,
            next_page_token: b"garbage".to_vec(),
        })
        .unwrap_err();
    assert!(matches!(err, HistoryError::InvalidArgument { .. }));
}
