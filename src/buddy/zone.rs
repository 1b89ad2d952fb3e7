// # Zone Free-List Management
//
// A zone spans a contiguous PFN range and owns one free list per
// `(order, migratetype)` pair. Lists are intrusive: membership links live in
// the per-frame metadata and name other frames by their zone offset, so the
// zone never holds owning references into itself.
//
// The zone also carries the reporting-side state that must sit under the
// same lock as the lists: the boundary index partitioning each list into
// unreported and reported regions, per-order reported counters, and the
// request/active flags driven by the reporting controller.
//
// ## Locking
//
// Every list, counter, flag, and frame mutation happens under the single
// per-zone mutex. The reporting scanner releases that mutex only while the
// backend callback runs.

use parking_lot::{Mutex, MutexGuard};

use crate::buddy::page::PageFrame;
use crate::buddy::types::{
    order_pages, Migratetype, OrderStats, ZoneConfig, ZoneStats, MAX_ORDER, PAGEBLOCK_ORDER,
};
use crate::error::{AerationError, Result};
use crate::reporting::boundary::{BoundaryIndex, InsertPosition};

/// One free list: head/tail offsets into the zone's frame arena.
#[derive(Debug, Clone, Copy, Default)]
struct FreeList {
    head: Option<u32>,
    tail: Option<u32>,
}

/// Free lists for one order, plus the block count across migratetypes.
#[derive(Debug, Default)]
struct FreeArea {
    lists: [FreeList; Migratetype::COUNT],
    nr_free: u64,
}

/// Lock-guarded portion of a zone.
pub(crate) struct ZoneState {
    frames: Vec<PageFrame>,
    free_area: Vec<FreeArea>,
    /// Migratetype per pageblock
    pageblock_mt: Vec<Migratetype>,
    /// Reported/unreported partition of each eligible free list
    boundary: BoundaryIndex,
    /// Reported blocks per order, across all migratetypes
    reported: [u64; MAX_ORDER],
    /// Zone crossed the high-water mark and awaits the worker
    pub(crate) reporting_requested: bool,
    /// A scan cycle is running; freed blocks join the tail of the
    /// unreported region instead of the list head
    pub(crate) reporting_active: bool,
    /// Total free pages on all lists
    free_pages: u64,
    /// Isolation requests may not take the zone below this many free pages
    watermark_min: u64,
}

impl ZoneState {
    fn new(pages: u64, min_order: usize, watermark_min: u64) -> Self {
        let nblocks = pages.div_ceil(1 << PAGEBLOCK_ORDER) as usize;
        Self {
            frames: vec![PageFrame::default(); pages as usize],
            free_area: (0..MAX_ORDER).map(|_| FreeArea::default()).collect(),
            pageblock_mt: vec![Migratetype::Movable; nblocks],
            boundary: BoundaryIndex::new(min_order),
            reported: [0; MAX_ORDER],
            reporting_requested: false,
            reporting_active: false,
            free_pages: 0,
            watermark_min,
        }
    }

    pub(crate) fn pageblock_migratetype_at(&self, idx: u32) -> Migratetype {
        self.pageblock_mt[idx as usize >> PAGEBLOCK_ORDER]
    }

    pub(crate) fn set_pageblock_migratetype_at(&mut self, idx: u32, mt: Migratetype) {
        self.pageblock_mt[idx as usize >> PAGEBLOCK_ORDER] = mt;
    }

    fn frame(&self, idx: u32) -> &PageFrame {
        &self.frames[idx as usize]
    }

    // ------------------------------------------------------------------
    // Intrusive list primitives
    // ------------------------------------------------------------------

    fn link_at_head(&mut self, order: usize, mt: Migratetype, idx: u32) {
        let old_head = self.free_area[order].lists[mt.index()].head;
        self.frames[idx as usize].prev = None;
        self.frames[idx as usize].next = old_head;
        match old_head {
            Some(h) => self.frames[h as usize].prev = Some(idx),
            None => self.free_area[order].lists[mt.index()].tail = Some(idx),
        }
        self.free_area[order].lists[mt.index()].head = Some(idx);
    }

    fn link_at_tail(&mut self, order: usize, mt: Migratetype, idx: u32) {
        let old_tail = self.free_area[order].lists[mt.index()].tail;
        self.frames[idx as usize].prev = old_tail;
        self.frames[idx as usize].next = None;
        match old_tail {
            Some(t) => self.frames[t as usize].next = Some(idx),
            None => self.free_area[order].lists[mt.index()].head = Some(idx),
        }
        self.free_area[order].lists[mt.index()].tail = Some(idx);
    }

    fn link_before(&mut self, order: usize, mt: Migratetype, at: Option<u32>, idx: u32) {
        let Some(at_idx) = at else {
            self.link_at_tail(order, mt, idx);
            return;
        };
        let at_prev = self.frames[at_idx as usize].prev;
        self.frames[idx as usize].prev = at_prev;
        self.frames[idx as usize].next = Some(at_idx);
        self.frames[at_idx as usize].prev = Some(idx);
        match at_prev {
            Some(p) => self.frames[p as usize].next = Some(idx),
            None => self.free_area[order].lists[mt.index()].head = Some(idx),
        }
    }

    fn unlink(&mut self, order: usize, mt: Migratetype, idx: u32) {
        let prev = self.frames[idx as usize].prev;
        let next = self.frames[idx as usize].next;
        match prev {
            Some(p) => self.frames[p as usize].next = next,
            None => self.free_area[order].lists[mt.index()].head = next,
        }
        match next {
            Some(n) => self.frames[n as usize].prev = prev,
            None => self.free_area[order].lists[mt.index()].tail = prev,
        }
        self.frames[idx as usize].clear_links();
    }

    // ------------------------------------------------------------------
    // Allocator primitives
    // ------------------------------------------------------------------

    /// Insertion point for a newly freed, unreported block.
    ///
    /// While a scan cycle is active, unreported blocks join the tail of the
    /// unreported region (just before the boundary) so the scanner's head
    /// pull sees older blocks first; otherwise they take the list head.
    pub(crate) fn unreported_tail(&self, order: usize, mt: Migratetype) -> InsertPosition {
        if self.reporting_active && self.boundary.covers(order) {
            InsertPosition::Before(self.boundary.slot(order, mt))
        } else {
            InsertPosition::Head
        }
    }

    /// Put a block on its free list. The caller is the free path; the block
    /// must not already be on a list.
    pub(crate) fn insert_free_block(&mut self, idx: u32, order: usize) -> Result<()> {
        if self.frames[idx as usize].buddy {
            return Err(AerationError::InvalidOperation(format!(
                "Double free of block at zone offset {idx}"
            )));
        }
        let mt = self.pageblock_migratetype_at(idx);
        match self.unreported_tail(order, mt) {
            InsertPosition::Head => self.link_at_head(order, mt, idx),
            InsertPosition::Before(at) => self.link_before(order, mt, at, idx),
        }
        let frame = &mut self.frames[idx as usize];
        frame.buddy = true;
        frame.order = order as u8;
        self.free_area[order].nr_free += 1;
        self.free_pages += order_pages(order);
        Ok(())
    }

    /// Pop the head block of `(order, migratetype)`, if any.
    pub(crate) fn take_free_block(&mut self, order: usize, mt: Migratetype) -> Option<u32> {
        let head = self.free_area[order].lists[mt.index()].head?;
        self.remove_free_block(head, order, mt);
        Some(head)
    }

    fn remove_free_block(&mut self, idx: u32, order: usize, mt: Migratetype) {
        if self.frames[idx as usize].reported {
            self.clear_reported(idx, order, mt);
        }
        self.unlink(order, mt, idx);
        self.frames[idx as usize].buddy = false;
        self.free_area[order].nr_free -= 1;
        self.free_pages -= order_pages(order);
    }

    /// Drop the Reported flag of a block that is leaving its free list,
    /// pulling the boundary back across it first.
    pub(crate) fn clear_reported(&mut self, idx: u32, order: usize, mt: Migratetype) {
        let next = self.frames[idx as usize].next;
        if self.boundary.covers(order) {
            self.boundary.retreat(order, mt, idx, next);
        }
        self.frames[idx as usize].reported = false;
        self.reported[order] -= 1;
    }

    /// Detach a free block from its list without rebalancing, refusing when
    /// the zone would drop below its watermark. The frame keeps its order
    /// so the block can be returned to the same list later.
    pub(crate) fn isolate_block(&mut self, idx: u32, order: usize) -> bool {
        let frame = &self.frames[idx as usize];
        if !frame.buddy || frame.order as usize != order {
            return false;
        }
        if self.free_pages < order_pages(order) + self.watermark_min {
            return false;
        }
        let mt = self.pageblock_migratetype_at(idx);
        self.remove_free_block(idx, order, mt);
        true
    }

    /// Return an isolated block to its free list as Reported, restoring its
    /// migratetype and installing it as the new boundary.
    pub(crate) fn put_reported_block(&mut self, idx: u32, order: usize, mt: Migratetype) {
        debug_assert!(self.boundary.covers(order));
        self.set_pageblock_migratetype_at(idx, mt);
        let at = self.boundary.slot(order, mt);
        self.link_before(order, mt, at, idx);
        let frame = &mut self.frames[idx as usize];
        frame.buddy = true;
        frame.order = order as u8;
        frame.reported = true;
        self.boundary.install(order, mt, idx);
        self.reported[order] += 1;
        self.free_area[order].nr_free += 1;
        self.free_pages += order_pages(order);
    }

    /// First unreported block on `(order, migratetype)`, without removing it.
    ///
    /// Reported blocks form a suffix of the list, so a reported head means
    /// the list holds nothing left to pull.
    pub(crate) fn peek_unreported(&self, order: usize, mt: Migratetype) -> Option<u32> {
        let head = self.free_area[order].lists[mt.index()].head?;
        if self.frames[head as usize].reported {
            None
        } else {
            Some(head)
        }
    }

    /// Free blocks at `order` not yet handed to the backend.
    pub(crate) fn unreported_blocks(&self, order: usize) -> u64 {
        self.free_area[order].nr_free - self.reported[order]
    }

    /// Whether any eligible list still holds an unreported block.
    pub(crate) fn has_unreported_eligible(&self, min_order: usize) -> bool {
        for order in (min_order..MAX_ORDER).rev() {
            for mt in Migratetype::DESCENDING {
                if mt.is_isolate() {
                    continue;
                }
                if self.peek_unreported(order, mt).is_some() {
                    return true;
                }
            }
        }
        false
    }

    /// Forget all reporting state: flags, counters, and boundaries.
    /// Free-list contents and ordering are left untouched.
    pub(crate) fn teardown_reporting(&mut self) {
        for frame in &mut self.frames {
            frame.reported = false;
        }
        self.reported = [0; MAX_ORDER];
        self.boundary.reset();
        self.reporting_requested = false;
        self.reporting_active = false;
    }
}

/// A contiguous PFN range with segregated free lists.
pub struct Zone {
    id: usize,
    name: String,
    base_pfn: u64,
    end_pfn: u64,
    state: Mutex<ZoneState>,
}

impl Zone {
    pub(crate) fn new(id: usize, config: &ZoneConfig, min_order: usize, watermark_min: u64) -> Self {
        Self {
            id,
            name: config.name.clone(),
            base_pfn: config.base_pfn,
            end_pfn: config.base_pfn + config.pages,
            state: Mutex::new(ZoneState::new(config.pages, min_order, watermark_min)),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_pfn(&self) -> u64 {
        self.base_pfn
    }

    pub fn end_pfn(&self) -> u64 {
        self.end_pfn
    }

    pub fn spanned_pages(&self) -> u64 {
        self.end_pfn - self.base_pfn
    }

    pub fn contains(&self, pfn: u64) -> bool {
        pfn >= self.base_pfn && pfn < self.end_pfn
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ZoneState> {
        self.state.lock()
    }

    pub(crate) fn offset_of(&self, pfn: u64) -> u32 {
        debug_assert!(self.contains(pfn));
        (pfn - self.base_pfn) as u32
    }

    pub(crate) fn pfn_of(&self, idx: u32) -> u64 {
        self.base_pfn + idx as u64
    }

    /// Migratetype of the pageblock containing `pfn`.
    pub fn pageblock_migratetype(&self, pfn: u64) -> Migratetype {
        self.lock().pageblock_migratetype_at(self.offset_of(pfn))
    }

    pub fn get_stats(&self) -> ZoneStats {
        let state = self.lock();
        ZoneStats {
            name: self.name.clone(),
            base_pfn: self.base_pfn,
            end_pfn: self.end_pfn,
            free_pages: state.free_pages,
            orders: (0..MAX_ORDER)
                .map(|order| OrderStats {
                    order,
                    free_blocks: state.free_area[order].nr_free,
                    reported_blocks: state.reported[order],
                })
                .collect(),
            reporting_requested: state.reporting_requested,
            reporting_active: state.reporting_active,
        }
    }

    /// Walk every free list and reconcile links, flags, counters, and
    /// boundary slots. Used by the test suites; any inconsistency is a bug.
    pub fn validate(&self) -> Result<()> {
        let state = self.lock();
        let mut seen = vec![false; state.frames.len()];
        let mut free_pages = 0u64;

        for order in 0..MAX_ORDER {
            let mut blocks = 0u64;
            let mut reported_blocks = 0u64;

            for mt in Migratetype::DESCENDING {
                let list = state.free_area[order].lists[mt.index()];
                let mut cur = list.head;
                let mut prev: Option<u32> = None;
                let mut last: Option<u32> = None;
                let mut first_reported: Option<u32> = None;

                while let Some(idx) = cur {
                    let frame = state.frame(idx);
                    if seen[idx as usize] {
                        return Err(self.corrupt(format!("offset {idx} on two lists")));
                    }
                    seen[idx as usize] = true;
                    if !frame.buddy {
                        return Err(self.corrupt(format!("offset {idx} listed but not free")));
                    }
                    if frame.order as usize != order {
                        return Err(self.corrupt(format!(
                            "offset {idx} order {} on order-{order} list",
                            frame.order
                        )));
                    }
                    if frame.prev != prev {
                        return Err(self.corrupt(format!("offset {idx} has a broken prev link")));
                    }
                    if frame.reported {
                        if first_reported.is_none() {
                            first_reported = Some(idx);
                        }
                        reported_blocks += 1;
                    } else if first_reported.is_some() {
                        return Err(self.corrupt(format!(
                            "unreported offset {idx} after the reported boundary"
                        )));
                    }
                    blocks += 1;
                    prev = cur;
                    last = cur;
                    cur = frame.next;
                }

                if list.tail != last {
                    return Err(self.corrupt(format!(
                        "order {order} {mt} list tail does not match its last node"
                    )));
                }
                if state.boundary.covers(order) {
                    let slot = state.boundary.slot(order, mt);
                    if slot != first_reported {
                        return Err(self.corrupt(format!(
                            "order {order} {mt} boundary {slot:?} != first reported {first_reported:?}"
                        )));
                    }
                } else if first_reported.is_some() {
                    return Err(self.corrupt(format!(
                        "reported block below the minimum order on order {order} {mt}"
                    )));
                }
            }

            if state.free_area[order].nr_free != blocks {
                return Err(self.corrupt(format!(
                    "order {order} nr_free {} != walked {blocks}",
                    state.free_area[order].nr_free
                )));
            }
            if state.reported[order] != reported_blocks {
                return Err(self.corrupt(format!(
                    "order {order} reported {} != walked {reported_blocks}",
                    state.reported[order]
                )));
            }
            free_pages += blocks * order_pages(order);
        }

        if state.free_pages != free_pages {
            return Err(self.corrupt(format!(
                "free_pages {} != walked {free_pages}",
                state.free_pages
            )));
        }
        Ok(())
    }

    fn corrupt(&self, detail: String) -> AerationError {
        AerationError::Internal(format!("Zone '{}': {detail}", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_zone(pages: u64, watermark: u64) -> Zone {
        let config = ZoneConfig::new("test", 0, pages);
        Zone::new(0, &config, PAGEBLOCK_ORDER, watermark)
    }

    #[test]
    fn test_free_and_take_round_trip() {
        let zone = test_zone(8192, 0);
        {
            let mut state = zone.lock();
            state.insert_free_block(0, 9).unwrap();
            state.insert_free_block(512, 9).unwrap();
            assert_eq!(state.unreported_blocks(9), 2);
        }
        zone.validate().unwrap();

        let mut state = zone.lock();
        // head insertion: the most recently freed block comes back first
        assert_eq!(state.take_free_block(9, Migratetype::Movable), Some(512));
        assert_eq!(state.take_free_block(9, Migratetype::Movable), Some(0));
        assert_eq!(state.take_free_block(9, Migratetype::Movable), None);
        assert_eq!(state.unreported_blocks(9), 0);
    }

    #[test]
    fn test_double_free_is_rejected() {
        let zone = test_zone(1024, 0);
        let mut state = zone.lock();
        state.insert_free_block(0, 9).unwrap();
        assert!(state.insert_free_block(0, 9).is_err());
    }

    #[test]
    fn test_isolate_respects_watermark() {
        let zone = test_zone(2048, 400);
        let mut state = zone.lock();
        state.insert_free_block(0, 9).unwrap();
        state.insert_free_block(512, 9).unwrap();
        // 1024 free; the second pull would leave 512 < 400 + 512
        assert!(state.isolate_block(0, 9));
        assert!(!state.isolate_block(512, 9));
    }

    #[test]
    fn test_isolate_rejects_wrong_order_and_non_free() {
        let zone = test_zone(2048, 0);
        let mut state = zone.lock();
        state.insert_free_block(0, 9).unwrap();
        assert!(!state.isolate_block(0, 10));
        assert!(!state.isolate_block(512, 9));
        assert!(state.isolate_block(0, 9));
        // already isolated
        assert!(!state.isolate_block(0, 9));
    }

    #[test]
    fn test_reported_blocks_form_a_suffix() {
        let zone = test_zone(8192, 0);
        {
            let mut state = zone.lock();
            for i in 0..4u32 {
                state.insert_free_block(i * 512, 9).unwrap();
            }
            // isolate two blocks and return them reported
            assert!(state.isolate_block(0, 9));
            assert!(state.isolate_block(512, 9));
            state.put_reported_block(0, 9, Migratetype::Movable);
            state.put_reported_block(512, 9, Migratetype::Movable);
            assert_eq!(state.unreported_blocks(9), 2);
            // the head pull never returns a reported block
            let peeked = state.peek_unreported(9, Migratetype::Movable).unwrap();
            assert!(!state.frame(peeked).reported);
        }
        zone.validate().unwrap();
    }

    #[test]
    fn test_taking_reported_head_retreats_boundary() {
        let zone = test_zone(8192, 0);
        {
            let mut state = zone.lock();
            state.insert_free_block(0, 9).unwrap();
            state.insert_free_block(512, 9).unwrap();
            assert!(state.isolate_block(0, 9));
            assert!(state.isolate_block(512, 9));
            state.put_reported_block(0, 9, Migratetype::Movable);
            state.put_reported_block(512, 9, Migratetype::Movable);

            // both blocks reported; the head is the boundary itself
            let head = state.take_free_block(9, Migratetype::Movable).unwrap();
            assert_eq!(head, 512);
            assert_eq!(state.reported[9], 1);
        }
        zone.validate().unwrap();

        let mut state = zone.lock();
        let head = state.take_free_block(9, Migratetype::Movable).unwrap();
        assert_eq!(head, 0);
        assert_eq!(state.reported[9], 0);
        assert!(state.boundary.is_empty());
    }

    #[test]
    fn test_active_insertion_joins_unreported_tail() {
        let zone = test_zone(8192, 0);
        let mut state = zone.lock();
        state.insert_free_block(0, 9).unwrap();
        assert!(state.isolate_block(0, 9));
        state.put_reported_block(0, 9, Migratetype::Movable);

        state.reporting_active = true;
        state.insert_free_block(512, 9).unwrap();
        state.insert_free_block(1024, 9).unwrap();
        state.reporting_active = false;

        // pull order: oldest unreported first, reported block last
        assert_eq!(state.take_free_block(9, Migratetype::Movable), Some(512));
        assert_eq!(state.take_free_block(9, Migratetype::Movable), Some(1024));
        assert_eq!(state.take_free_block(9, Migratetype::Movable), Some(0));
    }

    #[test]
    fn test_teardown_clears_reporting_state() {
        let zone = test_zone(8192, 0);
        {
            let mut state = zone.lock();
            state.insert_free_block(0, 9).unwrap();
            assert!(state.isolate_block(0, 9));
            state.put_reported_block(0, 9, Migratetype::Movable);
            state.reporting_requested = true;
            state.teardown_reporting();
            assert_eq!(state.reported[9], 0);
            assert!(state.boundary.is_empty());
            assert!(!state.reporting_requested);
            // the block itself stays free
            assert_eq!(state.unreported_blocks(9), 1);
        }
        zone.validate().unwrap();
    }

    #[test]
    fn test_migratetype_segregation() {
        let zone = test_zone(8192, 0);
        let mut state = zone.lock();
        state.set_pageblock_migratetype_at(0, Migratetype::Unmovable);
        state.insert_free_block(0, 9).unwrap();
        state.insert_free_block(512, 9).unwrap();

        assert_eq!(state.take_free_block(9, Migratetype::Unmovable), Some(0));
        assert_eq!(state.take_free_block(9, Migratetype::Unmovable), None);
        assert_eq!(state.take_free_block(9, Migratetype::Movable), Some(512));
    }
}
