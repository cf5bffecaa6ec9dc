//! Configuration Tests

use crate::common::*;
use historytree::{HistoryConfig, HistoryError, HistoryManager, CONFIG_FILE_NAME};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn manager_from_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "default_page_size = 1\nmax_page_size = 2\n").unwrap();
    let config = HistoryConfig::from_file(&path).unwrap();

    let h = TestHistory::with_config(config);
    let token = seeded_branch(&h);
    h.append(&token, events(6, 6, "a"), 12, 11).unwrap();

    // page_size 0 means one batch per page
    let first = h
        .manager
        .read_history_branch(historytree::ReadHistoryBranchRequest::new(
            SHARD,
            token.clone(),
            1,
            10,
            0,
        ))
        .unwrap();
    assert_eq!(tags(&first.events), expected("a", 1, 3));

    // oversized requests are capped at two batches
    let capped = h
        .manager
        .read_history_branch(historytree::ReadHistoryBranchRequest::new(
            SHARD, token, 1, 10, 500,
        ))
        .unwrap();
    assert_eq!(tags(&capped.events), expected("a", 1, 5));
    assert!(!capped.next_page_token.is_empty());
}

#[test]
fn invalid_config_refused_by_manager() {
    let h = TestHistory::new();
    let config = HistoryConfig {
        max_page_size: 1,
        default_page_size: 10,
        ..HistoryConfig::default()
    };
    let result = HistoryManager::new(h.store.clone(), h.registry.clone(), config);
    assert!(matches!(result, Err(HistoryError::InvalidArgument { .. })));
}

#[test]
fn zero_timeout_times_out_every_operation() {
    let h = TestHistory::with_config(HistoryConfig {
        operation_timeout_ms: Some(0),
        ..HistoryConfig::default()
    });
    let token = h.new_branch();
    let err = h.append(&token, events(1, 1, "a"), 1, 0).unwrap_err();
    assert!(matches!(err, HistoryError::Timeout { .. }));
    let err = h.read_events(&token, 1, 2, 0).unwrap_err();
    assert!(matches!(err, HistoryError::Timeout { .. }));
    let err = h.delete(&token).unwrap_err();
    assert!(matches!(err, HistoryError::Timeout { .. }));
}

#[test]
fn generous_timeout_does_not_interfere() {
    let h = TestHistory::with_config(HistoryConfig {
        operation_timeout_ms: Some(60_000),
        ..HistoryConfig::default()
    });
    let token = seeded_branch(&h);
    assert_eq!(h.read_tags(&token, 1, 6).unwrap(), expected("a", 1, 5));
}

#[test]
fn custom_codec_is_used() {
    let h = TestHistory::new();
    let manager = HistoryManager::new(
        h.store.clone(),
        h.registry.clone(),
        HistoryConfig::default(),
    )
    .unwrap()
    .with_codec(Arc::new(historytree::BincodeEventCodec));
    assert_eq!(manager.codec_id(), "bincode");
}
