// # Reporting Telemetry
//
// Counters for the reporting engine: requests raised, worker passes, react
// calls, and reported volume broken down by order. Counters are updated
// lock-free from the hot paths and exported as a serializable snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::buddy::types::MAX_ORDER;
use crate::reporting::batch::Batch;

#[derive(Debug)]
pub(crate) struct ReportingStats {
    /// Zones pushed over the high-water mark
    requests: AtomicU64,
    /// Worker passes over the zone list
    cycles: AtomicU64,
    /// Batches delivered to the backend
    react_calls: AtomicU64,
    /// Extents reported, per order
    blocks_reported: [AtomicU64; MAX_ORDER],
    /// Total bytes reported
    bytes_reported: AtomicU64,
    /// Extents skipped because isolation refused them
    isolation_skips: AtomicU64,
}

impl ReportingStats {
    pub(crate) fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            react_calls: AtomicU64::new(0),
            blocks_reported: std::array::from_fn(|_| AtomicU64::new(0)),
            bytes_reported: AtomicU64::new(0),
            isolation_skips: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_react(&self, batch: &Batch) {
        self.react_calls.fetch_add(1, Ordering::Relaxed);
        for entry in batch {
            self.blocks_reported[entry.order].fetch_add(1, Ordering::Relaxed);
            self.bytes_reported
                .fetch_add(entry.bytes as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_isolation_skip(&self) {
        self.isolation_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ReportingStatsSnapshot {
        let blocks_reported: Vec<u64> = self
            .blocks_reported
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .collect();
        ReportingStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            react_calls: self.react_calls.load(Ordering::Relaxed),
            total_blocks_reported: blocks_reported.iter().sum(),
            blocks_reported,
            bytes_reported: self.bytes_reported.load(Ordering::Relaxed),
            isolation_skips: self.isolation_skips.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the reporting counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingStatsSnapshot {
    pub requests: u64,
    pub cycles: u64,
    pub react_calls: u64,
    pub total_blocks_reported: u64,
    /// Indexed by order
    pub blocks_reported: Vec<u64>,
    pub bytes_reported: u64,
    pub isolation_skips: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buddy::types::{Migratetype, PAGE_SIZE};

    #[test]
    fn test_react_accounting() {
        let stats = ReportingStats::new();
        let mut batch = Batch::try_with_capacity(4).unwrap();
        batch.push(0, 9, Migratetype::Movable);
        batch.push(512, 9, Migratetype::Movable);
        batch.push(1024, 10, Migratetype::Movable);

        stats.record_react(&batch);
        stats.record_request();
        stats.record_cycle();
        stats.record_isolation_skip();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.react_calls, 1);
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.cycles, 1);
        assert_eq!(snapshot.isolation_skips, 1);
        assert_eq!(snapshot.blocks_reported[9], 2);
        assert_eq!(snapshot.blocks_reported[10], 1);
        assert_eq!(snapshot.total_blocks_reported, 3);
        assert_eq!(
            snapshot.bytes_reported,
            (2 * (PAGE_SIZE << 9) + (PAGE_SIZE << 10)) as u64
        );
    }
}
