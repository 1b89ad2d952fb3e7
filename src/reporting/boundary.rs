// # Free-List Boundary Index
//
// Partitions each eligible free list into an unreported prefix and a
// reported suffix. One slot is kept per `(order, migratetype)` pair for
// orders at or above the reporting minimum; a slot either names the first
// reported block on its list or is empty when the list carries no reported
// blocks. All mutations happen under the owning zone's lock.
//
// The index stays exact for as long as a reporting backend is registered:
// the drain path installs freshly reported blocks, the allocation path
// retreats past blocks it removes, and shutdown clears every slot.

use crate::buddy::types::{Migratetype, MAX_ORDER};

/// Insertion point for a block entering a free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertPosition {
    /// Front of the list, ahead of everything.
    Head,
    /// Immediately before the named block; `None` appends at the tail.
    Before(Option<u32>),
}

/// Reported/unreported partition pointers for one zone.
#[derive(Debug)]
pub(crate) struct BoundaryIndex {
    min_order: usize,
    /// `slots[order - min_order][migratetype]`, offset of the first
    /// reported block or `None`
    slots: Vec<[Option<u32>; Migratetype::COUNT]>,
}

impl BoundaryIndex {
    pub(crate) fn new(min_order: usize) -> Self {
        let orders = MAX_ORDER.saturating_sub(min_order);
        Self {
            min_order,
            slots: vec![[None; Migratetype::COUNT]; orders],
        }
    }

    /// Whether blocks of `order` are tracked by the index.
    pub(crate) fn covers(&self, order: usize) -> bool {
        order >= self.min_order && order < MAX_ORDER
    }

    /// First reported block on the `(order, migratetype)` list.
    pub(crate) fn slot(&self, order: usize, mt: Migratetype) -> Option<u32> {
        debug_assert!(self.covers(order));
        self.slots[order - self.min_order][mt.index()]
    }

    /// Record `idx` as the new first reported block on its list.
    pub(crate) fn install(&mut self, order: usize, mt: Migratetype, idx: u32) {
        debug_assert!(self.covers(order));
        self.slots[order - self.min_order][mt.index()] = Some(idx);
    }

    /// Pull the boundary back across `idx` before it leaves the list.
    ///
    /// `next` is the block that followed `idx`; because reported blocks form
    /// a suffix, it is either another reported block or the end of the list.
    pub(crate) fn retreat(&mut self, order: usize, mt: Migratetype, idx: u32, next: Option<u32>) {
        debug_assert!(self.covers(order));
        let slot = &mut self.slots[order - self.min_order][mt.index()];
        if *slot == Some(idx) {
            *slot = next;
        }
    }

    /// Clear every slot.
    pub(crate) fn reset(&mut self) {
        for per_order in &mut self.slots {
            *per_order = [None; Migratetype::COUNT];
        }
    }

    /// True when no list carries a reported block.
    pub(crate) fn is_empty(&self) -> bool {
        self.slots
            .iter()
            .all(|per_order| per_order.iter().all(|slot| slot.is_none()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: usize = 9;

    #[test]
    fn test_new_index_is_empty() {
        let index = BoundaryIndex::new(MIN);
        assert!(index.is_empty());
        assert!(index.covers(MIN));
        assert!(index.covers(MAX_ORDER - 1));
        assert!(!index.covers(MIN - 1));
        assert_eq!(index.slot(MIN, Migratetype::Movable), None);
    }

    #[test]
    fn test_install_and_retreat() {
        let mut index = BoundaryIndex::new(MIN);

        index.install(MIN, Migratetype::Movable, 7);
        assert_eq!(index.slot(MIN, Migratetype::Movable), Some(7));
        // other lists untouched
        assert_eq!(index.slot(MIN, Migratetype::Unmovable), None);

        // newer reported block becomes the boundary
        index.install(MIN, Migratetype::Movable, 3);
        assert_eq!(index.slot(MIN, Migratetype::Movable), Some(3));

        // removing a non-boundary block leaves the slot alone
        index.retreat(MIN, Migratetype::Movable, 7, None);
        assert_eq!(index.slot(MIN, Migratetype::Movable), Some(3));

        // removing the boundary block hands the slot to its successor
        index.retreat(MIN, Migratetype::Movable, 3, Some(9));
        assert_eq!(index.slot(MIN, Migratetype::Movable), Some(9));

        index.retreat(MIN, Migratetype::Movable, 9, None);
        assert!(index.is_empty());
    }

    #[test]
    fn test_reset_clears_all_slots() {
        let mut index = BoundaryIndex::new(MIN);
        index.install(MIN, Migratetype::Movable, 1);
        index.install(MAX_ORDER - 1, Migratetype::Unmovable, 2);
        index.reset();
        assert!(index.is_empty());
    }
}
