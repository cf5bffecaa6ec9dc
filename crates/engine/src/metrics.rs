//! Operation counters for the history manager
//!
//! All counters use Relaxed ordering: they are observational only and never
//! synchronize other memory.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, owned by a [`HistoryManager`](crate::HistoryManager)
#[derive(Debug, Default)]
pub struct HistoryMetrics {
    appends: AtomicU64,
    bytes_appended: AtomicU64,
    conflicts: AtomicU64,
    fencing_rejections: AtomicU64,
    reads: AtomicU64,
    batches_read: AtomicU64,
    forks: AtomicU64,
    trims: AtomicU64,
    nodes_trimmed: AtomicU64,
    deletes: AtomicU64,
    nodes_deleted: AtomicU64,
}

impl HistoryMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_append(&self, bytes: usize) {
        self.appends.fetch_add(1, Ordering::Relaxed);
        self.bytes_appended
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fencing_rejection(&self) {
        self.fencing_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self, batches: usize) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.batches_read
            .fetch_add(batches as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_fork(&self) {
        self.forks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_trim(&self, nodes: usize) {
        self.trims.fetch_add(1, Ordering::Relaxed);
        self.nodes_trimmed.fetch_add(nodes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self, nodes: usize) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.nodes_deleted.fetch_add(nodes as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            appends: self.appends.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            fencing_rejections: self.fencing_rejections.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            batches_read: self.batches_read.load(Ordering::Relaxed),
            forks: self.forks.load(Ordering::Relaxed),
            trims: self.trims.load(Ordering::Relaxed),
            nodes_trimmed: self.nodes_trimmed.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            nodes_deleted: self.nodes_deleted.load(Ordering::Relaxed),
        }
    }
}

/// History operation statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Successful appends (decoded and raw)
    pub appends: u64,
    /// Serialized bytes written by appends
    pub bytes_appended: u64,
    /// Appends rejected by causal-chain or payload conflicts
    pub conflicts: u64,
    /// Mutations rejected by the lease fence
    pub fencing_rejections: u64,
    /// Read pages served
    pub reads: u64,
    /// Batches returned across all read pages
    pub batches_read: u64,
    /// Branches created by fork
    pub forks: u64,
    /// Trim calls completed
    pub trims: u64,
    /// Node versions removed by trims
    pub nodes_trimmed: u64,
    /// Delete calls completed
    pub deletes: u64,
    /// Node versions removed by deletes
    pub nodes_deleted: u64,
}

impl MetricsSnapshot {
    /// Mean batches per read page
    pub fn batches_per_read(&self) -> f64 {
        if self.reads > 0 {
            self.batches_read as f64 / self.reads as f64
        } else {
            0.0
        }
    }
}
