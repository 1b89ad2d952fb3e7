// # Report Batch
//
// A fixed-capacity sequence of isolated free extents on its way to the
// backend. While an extent sits in the batch it is on no free list and
// cannot be allocated; the scanner owns the batch for the whole cycle and
// the backend borrows it for the duration of one `react` call.

use crate::buddy::types::{order_bytes, Migratetype};
use crate::error::{AerationError, Result};

/// One isolated free extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchEntry {
    /// Base PFN of the extent
    pub pfn: u64,
    /// Free-list order the extent was pulled from
    pub order: usize,
    /// Migratetype to restore when the extent is returned
    pub migratetype: Migratetype,
    /// Extent length in bytes
    pub bytes: usize,
}

/// Batch storage handed to the backend, at most `capacity` entries per
/// `react` call.
#[derive(Debug)]
pub struct Batch {
    entries: Vec<BatchEntry>,
    capacity: usize,
}

impl Batch {
    /// Allocate storage for `capacity` entries up front.
    pub(crate) fn try_with_capacity(capacity: usize) -> Result<Self> {
        let mut entries = Vec::new();
        entries.try_reserve_exact(capacity).map_err(|e| {
            AerationError::OutOfMemory(format!("Batch allocation of {capacity} entries failed: {e}"))
        })?;
        Ok(Self { entries, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    /// Total bytes covered by the batch.
    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|entry| entry.bytes).sum()
    }

    pub(crate) fn push(&mut self, pfn: u64, order: usize, migratetype: Migratetype) {
        debug_assert!(!self.is_full());
        self.entries.push(BatchEntry {
            pfn,
            order,
            migratetype,
            bytes: order_bytes(order),
        });
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a BatchEntry;
    type IntoIter = std::slice::Iter<'a, BatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
